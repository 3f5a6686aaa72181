use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{
    constants::{COMPILE_FAILED_MSG, EXECUTION_FAILED_MSG, PANIC_MSG_PREFIX},
    core::{
        domain::{Ack, Run, RunOutcome, RunState},
        generation::RunGenerationTracker,
        pipeline::dispatch::{CompletionCallback, Delivery, ResultDispatcher},
        sink::{LiveOutput, StreamingSink},
        traits::engine::Engine,
    },
};

/// One piece of code to run, plus where its output and outcome should go.
pub struct Submission {
    pub source: String,
    pub live_output: Option<LiveOutput>,
    pub on_complete: Option<CompletionCallback>,
}

impl Submission {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            live_output: None,
            on_complete: None,
        }
    }

    pub fn live_output(mut self, live_output: LiveOutput) -> Self {
        self.live_output = Some(live_output);
        self
    }

    pub fn on_complete(mut self, on_complete: CompletionCallback) -> Self {
        self.on_complete = Some(on_complete);
        self
    }
}

pub struct Accepted {
    pub ack: Ack,
    pub task: JoinHandle<Delivery>,
}

/// Runs submissions against an engine. The most recently submitted run is
/// the only one allowed to stream output or report completion; older runs
/// keep executing but their effects are suppressed.
#[derive(Clone, Debug)]
pub struct ExecutionSession {
    engine: Arc<dyn Engine>,
    tracker: Arc<RunGenerationTracker>,
    dispatcher: ResultDispatcher,
}

impl ExecutionSession {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_tracker(engine, Arc::new(RunGenerationTracker::new()))
    }

    pub fn with_tracker(engine: Arc<dyn Engine>, tracker: Arc<RunGenerationTracker>) -> Self {
        Self {
            engine,
            dispatcher: ResultDispatcher::new(tracker.clone()),
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<RunGenerationTracker> {
        &self.tracker
    }

    /// Starts a new generation and spawns the run onto the tokio runtime.
    /// Returns before the engine has done any work.
    pub fn submit(&self, submission: Submission) -> Accepted {
        let generation = self.tracker.begin();
        let run = Run::accept(&submission.source, Some(generation));
        let sink = StreamingSink::new(generation, self.tracker.clone(), submission.live_output);
        tracing::info!(run_id = %run.id, %generation, "Run accepted");

        let span = tracing::info_span!("run", run_id = %run.id, %generation);
        let engine = self.engine.clone();
        let tracker = self.tracker.clone();
        let dispatcher = self.dispatcher.clone();
        let on_complete = submission.on_complete;

        let task = tokio::spawn(
            async move {
                let (run, outcome) = run_guarded(engine, run, sink).await;

                if !tracker.is_current(generation) {
                    tracing::trace!("Run superseded, abandoning outcome");
                    return Delivery::Stale;
                }

                tracing::info!(
                    state = ?run.state,
                    success = outcome.is_success(),
                    elapsed_ms = run.elapsed_ms(),
                    "Run finished"
                );
                dispatcher.dispatch(generation, outcome, on_complete)
            }
            .instrument(span),
        );

        Accepted {
            ack: Ack { generation },
            task,
        }
    }

    /// Runs on the caller's task without generation tracking or streaming.
    #[tracing::instrument(skip(self))]
    pub async fn run_to_completion(&self, source: &str) -> RunOutcome {
        let run = Run::accept(source, None);
        let (run, outcome) = run_guarded(self.engine.clone(), run, StreamingSink::detached()).await;
        tracing::info!(
            run_id = %run.id,
            state = ?run.state,
            success = outcome.is_success(),
            elapsed_ms = run.elapsed_ms(),
            "Run finished"
        );
        outcome
    }
}

/// Panics raised by the engine, or by a host callable it writes through,
/// end up as a failed outcome instead of unwinding into the runtime.
async fn run_guarded(engine: Arc<dyn Engine>, run: Run, sink: StreamingSink) -> (Run, RunOutcome) {
    let run = run.change_state(RunState::Running);

    match AssertUnwindSafe(run_body(engine.as_ref(), &run.source, &sink))
        .catch_unwind()
        .await
    {
        Ok(outcome) => (run.change_state(RunState::Completed), outcome),
        Err(payload) => {
            let detail = panic_detail(payload.as_ref());
            tracing::error!(run_id = %run.id, "Run panicked: {}", detail);
            (
                run.change_state(RunState::Faulted),
                RunOutcome::failure(format!("{PANIC_MSG_PREFIX}: {detail}"), String::new()),
            )
        }
    }
}

async fn run_body(engine: &dyn Engine, source: &str, sink: &StreamingSink) -> RunOutcome {
    tracing::debug!("Start compiling");
    let program = match engine.compile(source, sink.clone(), sink.clone()).await {
        Ok(program) => program,
        Err(e) => {
            tracing::debug!("Compilation failed: {}", e);
            return RunOutcome::failure(format!("{COMPILE_FAILED_MSG}: {e}"), sink.snapshot());
        }
    };

    tracing::debug!("Start executing: {:?}", program);
    match engine.execute(program).await {
        Ok(value) => {
            tracing::debug!("Execution result: {:?}", value);
            RunOutcome::success(sink.snapshot())
        }
        Err(e) => {
            tracing::debug!("Execution failed: {}", e);
            RunOutcome::failure(EXECUTION_FAILED_MSG, sink.snapshot())
        }
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
