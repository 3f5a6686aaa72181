//! A tiny statement language used as the built-in engine. Programs are
//! call statements separated by newlines or `;`:
//!
//! ```text
//! println("hello", 42)   // space separated, newline terminated
//! print("no newline")
//! eprintln("to stderr")
//! sleep(250)             // milliseconds
//! exit(1)                // non-zero exit is an execution error
//! panic("message")
//! ```

pub mod engine;
pub mod parser;
