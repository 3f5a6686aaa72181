use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::domain::Generation;

/// Source of truth for which run is current. Generations are never reused,
/// so a run that has been superseded stays stale for good.
#[derive(Debug, Default)]
pub struct RunGenerationTracker {
    current: AtomicU64,
}

impl RunGenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current.load(Ordering::SeqCst) == generation.0
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;

    #[test]
    fn test_begin_is_strictly_increasing() {
        let tracker = RunGenerationTracker::new();
        let generations: Vec<_> = (0..100).map(|_| tracker.begin()).collect();

        assert!(generations.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(tracker.current(), Generation(100));
    }

    #[test]
    fn test_only_latest_is_current() {
        let tracker = RunGenerationTracker::new();
        let first = tracker.begin();
        assert!(tracker.is_current(first));

        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
    }

    #[test]
    fn test_trackers_are_independent() {
        let a = RunGenerationTracker::new();
        let b = RunGenerationTracker::new();
        a.begin();
        a.begin();

        assert_eq!(b.begin(), Generation(1));
        assert_eq!(a.current(), Generation(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_begin_never_repeats() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move { (0..250).map(|_| tracker.begin()).collect::<Vec<_>>() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let generations = handle.await.unwrap();
            assert!(generations.windows(2).all(|w| w[0] < w[1]));
            for generation in generations {
                assert!(seen.insert(generation), "duplicate generation {generation}");
            }
        }

        assert_eq!(seen.len(), 2000);
        assert_eq!(tracker.current(), Generation(2000));
    }
}
