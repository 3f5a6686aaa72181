use std::{fmt, sync::Arc};

use crate::core::{
    domain::RunOutcome,
    pipeline::{
        dispatch::CompletionCallback,
        session::{ExecutionSession, Submission},
    },
    sink::LiveOutput,
};

pub type HostFunction = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// A value as passed in by the host.
#[derive(Clone)]
pub enum HostValue {
    Undefined,
    Json(serde_json::Value),
    Function(HostFunction),
}

impl HostValue {
    pub fn string(s: impl Into<String>) -> Self {
        HostValue::Json(serde_json::Value::String(s.into()))
    }

    pub fn function(f: impl Fn(serde_json::Value) + Send + Sync + 'static) -> Self {
        HostValue::Function(Arc::new(f))
    }

    /// String form of the value, the way the host would coerce it.
    pub fn to_source(&self) -> String {
        match self {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Json(serde_json::Value::String(s)) => s.clone(),
            HostValue::Json(value) => value.to_string(),
            HostValue::Function(_) => "function".to_string(),
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => f.write_str("Undefined"),
            HostValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            HostValue::Function(_) => f.write_str("Function"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("Wrong number of arguments, expected: 1-2 got: {0}")]
    WrongArity(usize),
}

/// Entry point the host calls with `(source)` or `(source, onComplete)`.
///
/// Without a completion callback and without a stream function the call
/// runs synchronously and returns the outcome object. Otherwise it returns
/// `{"async": true}` right away and the outcome goes to the callback.
#[derive(Clone, Debug)]
pub struct HostBridge {
    session: ExecutionSession,
    stream_output: Option<StreamFunction>,
}

#[derive(Clone)]
struct StreamFunction(LiveOutput);

impl fmt::Debug for StreamFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamFunction")
    }
}

impl HostBridge {
    pub fn new(session: ExecutionSession) -> Self {
        Self {
            session,
            stream_output: None,
        }
    }

    /// Registers the function that receives live output of the current run.
    pub fn with_stream_output(mut self, stream_output: LiveOutput) -> Self {
        self.stream_output = Some(StreamFunction(stream_output));
        self
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self, args: Vec<HostValue>) -> serde_json::Value {
        let source = match validate_args(&args) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("Rejected call: {}", e);
                return RunOutcome::failure(e.to_string(), "").to_json();
            }
        };

        let on_complete = args.get(1).and_then(HostValue::as_function).cloned();
        if on_complete.is_none() && self.stream_output.is_none() {
            return self.session.run_to_completion(&source).await.to_json();
        }

        let mut submission = Submission::new(source);
        if let Some(StreamFunction(live)) = &self.stream_output {
            submission = submission.live_output(live.clone());
        }
        if let Some(on_complete) = on_complete {
            let callback: CompletionCallback =
                Box::new(move |outcome: RunOutcome| on_complete(outcome.to_json()));
            submission = submission.on_complete(callback);
        }

        self.session.submit(submission).ack.to_json()
    }
}

fn validate_args(args: &[HostValue]) -> Result<String, BridgeError> {
    match args {
        [source] | [source, _] => Ok(source.to_source()),
        _ => Err(BridgeError::WrongArity(args.len())),
    }
}
