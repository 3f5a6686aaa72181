use crate::core::{
    domain::{Program, Value},
    sink::StreamingSink,
};

/// Compiles and executes submitted code. Output produced while compiling or
/// executing goes to the writers handed to `compile`.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Engine: std::fmt::Debug + Send + Sync {
    async fn compile(
        &self,
        source: &str,
        stdout: StreamingSink,
        stderr: StreamingSink,
    ) -> Result<Program, CompileError>;

    async fn execute(&self, program: Program) -> Result<Value, ExecutionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("{line}:{column}: {msg}")]
    Syntax {
        line: usize,
        column: usize,
        msg: String,
    },
    #[error("{msg}")]
    Internal { msg: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("exit status {0}")]
    Exit(i64),
    #[error("panic: {0}")]
    Panicked(String),
    #[error("program {0} is not compiled")]
    UnknownProgram(uuid::Uuid),
    #[error("{msg}")]
    Internal { msg: String },
}
