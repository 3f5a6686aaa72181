use std::{io::Write, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::core::{
    domain::{Program, Value},
    sink::StreamingSink,
    traits::engine::{CompileError, Engine, ExecutionError},
};

/// Engine driven by comma separated tokens instead of real code:
///
/// - `!msg` anywhere fails compilation with `msg`
/// - `wait` parks the program until [`EngineStub::release`] is called
/// - `fail` stops with a non-zero exit
/// - `boom` panics inside the engine
/// - anything else is written to stdout as one chunk
#[derive(Debug)]
pub struct EngineStub {
    programs: DashMap<Uuid, (Vec<String>, StreamingSink)>,
    gate: Semaphore,
    parked: Notify,
    delay: Duration,
}

impl EngineStub {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            programs: DashMap::new(),
            gate: Semaphore::new(0),
            parked: Notify::new(),
            delay,
        })
    }

    /// Lets one parked `wait` continue.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    /// Resolves once some program has reached a `wait` token.
    pub async fn parked(&self) {
        self.parked.notified().await;
    }
}

#[async_trait::async_trait]
impl Engine for EngineStub {
    #[tracing::instrument(skip(self, _stderr))]
    async fn compile(
        &self,
        source: &str,
        stdout: StreamingSink,
        _stderr: StreamingSink,
    ) -> Result<Program, CompileError> {
        let tokens: Vec<String> = source
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        if let Some(msg) = tokens.iter().find_map(|token| token.strip_prefix('!')) {
            return Err(CompileError::Internal {
                msg: msg.to_string(),
            });
        }

        let program = Program { id: Uuid::new_v4() };
        self.programs.insert(program.id, (tokens, stdout));
        Ok(program)
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, program: Program) -> Result<Value, ExecutionError> {
        let (_, (tokens, mut stdout)) = self
            .programs
            .remove(&program.id)
            .ok_or(ExecutionError::UnknownProgram(program.id))?;

        for token in tokens {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match token.as_str() {
                "wait" => {
                    self.parked.notify_one();
                    self.gate
                        .acquire()
                        .await
                        .map_err(|e| ExecutionError::Internal { msg: e.to_string() })?
                        .forget();
                }
                "fail" => return Err(ExecutionError::Exit(1)),
                "boom" => panic!("stub engine fault"),
                text => stdout
                    .write_all(text.as_bytes())
                    .map_err(|e| ExecutionError::Internal { msg: e.to_string() })?,
            }
        }

        Ok(Value::Nil)
    }
}
