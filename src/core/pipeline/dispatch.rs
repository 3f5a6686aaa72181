use std::sync::Arc;

use tokio::sync::oneshot;

use crate::core::{
    domain::{Generation, RunOutcome},
    generation::RunGenerationTracker,
};

/// Invoked once with the outcome of a run that is still current.
pub type CompletionCallback = Box<dyn FnOnce(RunOutcome) + Send + 'static>;

/// Callback that resolves the returned receiver. The receiver errors out
/// if the run was superseded and the callback dropped.
pub fn completion_channel() -> (CompletionCallback, oneshot::Receiver<RunOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: CompletionCallback = Box::new(move |outcome| {
        if tx.send(outcome).is_err() {
            tracing::debug!("Completion receiver dropped");
        }
    });
    (callback, rx)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NoCallback,
    Stale,
}

#[derive(Clone, Debug)]
pub struct ResultDispatcher {
    tracker: Arc<RunGenerationTracker>,
}

impl ResultDispatcher {
    pub fn new(tracker: Arc<RunGenerationTracker>) -> Self {
        Self { tracker }
    }

    #[tracing::instrument(skip(self, outcome, on_complete))]
    pub fn dispatch(
        &self,
        generation: Generation,
        outcome: RunOutcome,
        on_complete: Option<CompletionCallback>,
    ) -> Delivery {
        let Some(on_complete) = on_complete else {
            return Delivery::NoCallback;
        };

        if !self.tracker.is_current(generation) {
            tracing::trace!("Dropping outcome of superseded run");
            return Delivery::Stale;
        }

        tracing::debug!(success = outcome.is_success(), "Delivering outcome");
        on_complete(outcome);
        Delivery::Delivered
    }
}
