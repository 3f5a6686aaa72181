use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

use crate::core::{domain::Generation, generation::RunGenerationTracker};

/// Receives output chunks of the current run as they are written.
pub type LiveOutput = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone, Debug)]
struct Gate {
    generation: Generation,
    tracker: Arc<RunGenerationTracker>,
}

#[derive(Debug, Default)]
struct Buffers {
    output: Vec<u8>,
    // Trailing bytes of a UTF-8 sequence split across writes.
    pending: Vec<u8>,
}

impl Buffers {
    fn accept(&mut self, chunk: &[u8]) -> String {
        self.output.extend_from_slice(chunk);
        self.pending.extend_from_slice(chunk);

        let split = self.pending.len() - incomplete_tail(&self.pending);
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;
        text
    }
}

/// Length of a UTF-8 sequence at the end of `bytes` that was started but
/// not finished.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    let Some(lead) = (start..bytes.len())
        .rev()
        .find(|&i| bytes[i] & 0b1100_0000 != 0b1000_0000)
    else {
        return 0;
    };

    let width = match bytes[lead] {
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => 1,
    };
    let have = bytes.len() - lead;
    if have < width
        && std::str::from_utf8(&bytes[lead..]).is_err_and(|e| e.error_len().is_none())
    {
        have
    } else {
        0
    }
}

/// Output endpoint of one run. Every accepted write lands in the run's
/// buffer first and is then offered to the live consumer. Once a newer run
/// has started, writes are swallowed without buffering or forwarding.
///
/// A multibyte character split across writes is forwarded whole with the
/// write that completes it.
///
/// Clones share the same buffer, so the engine can own a writer while the
/// session keeps a handle for [`StreamingSink::snapshot`].
#[derive(Clone)]
pub struct StreamingSink {
    gate: Option<Gate>,
    buf: Arc<Mutex<Buffers>>,
    live: Option<LiveOutput>,
}

impl StreamingSink {
    pub fn new(
        generation: Generation,
        tracker: Arc<RunGenerationTracker>,
        live: Option<LiveOutput>,
    ) -> Self {
        Self {
            gate: Some(Gate {
                generation,
                tracker,
            }),
            buf: Arc::default(),
            live,
        }
    }

    /// Sink for the synchronous mode: nothing can supersede it and nothing
    /// is streamed.
    pub fn detached() -> Self {
        Self {
            gate: None,
            buf: Arc::default(),
            live: None,
        }
    }

    pub fn generation(&self) -> Option<Generation> {
        self.gate.as_ref().map(|gate| gate.generation)
    }

    pub fn is_current(&self) -> bool {
        self.gate
            .as_ref()
            .is_none_or(|gate| gate.tracker.is_current(gate.generation))
    }

    pub fn snapshot(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf.output).into_owned()
    }
}

impl Write for StreamingSink {
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        if !self.is_current() {
            return Ok(chunk.len());
        }

        let text = self
            .buf
            .lock()
            .map_err(|_| io::Error::other("output buffer poisoned"))?
            .accept(chunk);

        match &self.live {
            Some(live) if !text.is_empty() => live(&text),
            _ => {}
        }

        Ok(chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for StreamingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSink")
            .field("generation", &self.generation())
            .field("buffered", &self.buf.try_lock().map(|b| b.output.len()).ok())
            .field("live", &self.live.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_consumer() -> (LiveOutput, Arc<Mutex<Vec<String>>>) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let sink_chunks = chunks.clone();
        let live: LiveOutput = Arc::new(move |chunk: &str| {
            sink_chunks.lock().unwrap().push(chunk.to_string());
        });
        (live, chunks)
    }

    #[test]
    fn test_writes_are_buffered_and_forwarded_in_order() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let (live, chunks) = collecting_consumer();
        let mut sink = StreamingSink::new(tracker.begin(), tracker.clone(), Some(live));

        assert_eq!(sink.write(b"A").unwrap(), 1);
        assert_eq!(sink.write(b"B").unwrap(), 1);

        assert_eq!(sink.snapshot(), "AB");
        assert_eq!(*chunks.lock().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_stale_writes_are_swallowed() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let (live, chunks) = collecting_consumer();
        let mut sink = StreamingSink::new(tracker.begin(), tracker.clone(), Some(live));

        sink.write_all(b"before").unwrap();
        tracker.begin();
        assert_eq!(sink.write(b"after").unwrap(), 5);

        assert!(!sink.is_current());
        assert_eq!(sink.snapshot(), "before");
        assert_eq!(*chunks.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn test_empty_chunk_is_not_forwarded() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let (live, chunks) = collecting_consumer();
        let mut sink = StreamingSink::new(tracker.begin(), tracker, Some(live));

        assert_eq!(sink.write(b"").unwrap(), 0);
        assert!(chunks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_buffer_is_visible_when_chunk_is_forwarded() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_slot: Arc<Mutex<Option<StreamingSink>>> = Arc::default();

        let live: LiveOutput = {
            let seen = seen.clone();
            let sink_slot = sink_slot.clone();
            Arc::new(move |chunk: &str| {
                let snapshot = sink_slot.lock().unwrap().as_ref().unwrap().snapshot();
                seen.lock().unwrap().push((chunk.to_string(), snapshot));
            })
        };
        let mut sink = StreamingSink::new(tracker.begin(), tracker, Some(live));
        *sink_slot.lock().unwrap() = Some(sink.clone());

        sink.write_all(b"x").unwrap();
        sink.write_all(b"y").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("x".to_string(), "x".to_string()),
                ("y".to_string(), "xy".to_string())
            ]
        );
    }

    #[test]
    fn test_clones_share_buffer() {
        let mut writer = StreamingSink::detached();
        let reader = writer.clone();

        writeln!(writer, "hello").unwrap();

        assert!(reader.is_current());
        assert_eq!(reader.generation(), None);
        assert_eq!(reader.snapshot(), "hello\n");
    }

    #[test]
    fn test_invalid_utf8_is_forwarded_lossily() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let (live, chunks) = collecting_consumer();
        let mut sink = StreamingSink::new(tracker.begin(), tracker, Some(live));

        sink.write_all(&[b'o', b'k', 0xff]).unwrap();

        assert_eq!(*chunks.lock().unwrap(), vec!["ok\u{fffd}"]);
        assert_eq!(sink.snapshot(), "ok\u{fffd}");
    }

    #[test]
    fn test_split_character_is_forwarded_whole() {
        let tracker = Arc::new(RunGenerationTracker::new());
        let (live, chunks) = collecting_consumer();
        let mut sink = StreamingSink::new(tracker.begin(), tracker, Some(live));

        assert_eq!(sink.write(&[b'a', 0xc3]).unwrap(), 2);
        assert_eq!(sink.write(&[0xa9]).unwrap(), 1);
        sink.write_all(&"€".as_bytes()[..1]).unwrap();
        sink.write_all(&"€".as_bytes()[1..]).unwrap();

        assert_eq!(*chunks.lock().unwrap(), vec!["a", "é", "€"]);
        assert_eq!(sink.snapshot(), "aé€");
    }

    #[test]
    fn test_incomplete_tail_detection() {
        assert_eq!(incomplete_tail(b""), 0);
        assert_eq!(incomplete_tail(b"abc"), 0);
        assert_eq!(incomplete_tail(&[b'a', 0xc3]), 1);
        assert_eq!(incomplete_tail(&[0xe2, 0x82]), 2);
        assert_eq!(incomplete_tail(&[0xf0, 0x9f, 0x98]), 3);
        assert_eq!(incomplete_tail("é".as_bytes()), 0);
        assert_eq!(incomplete_tail(&[b'o', 0xff]), 0);
        assert_eq!(incomplete_tail(&[0x80, 0x80]), 0);
    }
}
