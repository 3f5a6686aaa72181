use std::path::PathBuf;

use clap::Parser;

/// Runs snippets through the built-in script engine.
///
/// Every line read from stdin is submitted as a new run; a newer line
/// supersedes whatever is still running. Live output goes to stdout and the
/// outcome of the latest run is printed as JSON when it finishes.
#[derive(Debug, Clone, Parser)]
#[command(name = "snippet-runner", version)]
pub struct Config {
    /// Run each snippet to completion before reading the next one, without
    /// live output.
    #[arg(long, env = "SNIPPET_RUNNER_SYNC")]
    pub sync: bool,

    /// Submit the whole file as a single snippet instead of reading stdin.
    #[arg(long, env = "SNIPPET_RUNNER_FILE")]
    pub file: Option<PathBuf>,
}
