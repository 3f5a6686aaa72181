use std::{io::Write, time::Duration};

use dashmap::DashMap;
use itertools::Itertools;
use uuid::Uuid;

use crate::{
    core::{
        domain::{Program, Value},
        sink::StreamingSink,
        traits::engine::{CompileError, Engine, ExecutionError},
    },
    script::parser::{self, Stmt, Stream},
};

#[derive(Debug)]
struct Compiled {
    stmts: Vec<Stmt>,
    stdout: StreamingSink,
    stderr: StreamingSink,
}

/// Engine for the small statement language in [`parser`]. Compiled
/// programs are kept until executed, so each program runs at most once.
#[derive(Debug, Default)]
pub struct ScriptEngine {
    programs: DashMap<Uuid, Compiled>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Engine for ScriptEngine {
    #[tracing::instrument(skip(self, stdout, stderr))]
    async fn compile(
        &self,
        source: &str,
        stdout: StreamingSink,
        stderr: StreamingSink,
    ) -> Result<Program, CompileError> {
        let stmts = parser::parse(source)?;
        tracing::debug!("Parsed {} statements", stmts.len());

        let program = Program { id: Uuid::new_v4() };
        self.programs.insert(
            program.id,
            Compiled {
                stmts,
                stdout,
                stderr,
            },
        );
        Ok(program)
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, program: Program) -> Result<Value, ExecutionError> {
        let (_, mut compiled) = self
            .programs
            .remove(&program.id)
            .ok_or(ExecutionError::UnknownProgram(program.id))?;

        for stmt in &compiled.stmts {
            match stmt {
                Stmt::Print {
                    stream,
                    args,
                    newline,
                } => {
                    let text = if *newline {
                        format!("{}\n", args.iter().join(" "))
                    } else {
                        args.iter().join("")
                    };
                    let out = match stream {
                        Stream::Stdout => &mut compiled.stdout,
                        Stream::Stderr => &mut compiled.stderr,
                    };
                    out.write_all(text.as_bytes())
                        .map_err(|e| ExecutionError::Internal { msg: e.to_string() })?;
                }
                Stmt::Sleep(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                Stmt::Exit(0) => return Ok(Value::Exit(0)),
                Stmt::Exit(code) => return Err(ExecutionError::Exit(*code)),
                Stmt::Panic(msg) => {
                    writeln!(compiled.stderr, "panic: {msg}")
                        .map_err(|e| ExecutionError::Internal { msg: e.to_string() })?;
                    return Err(ExecutionError::Panicked(msg.clone()));
                }
            }
        }

        Ok(Value::Nil)
    }
}
