pub mod bridge;
pub mod config;
pub mod constants;
pub mod core;
pub mod script;

#[cfg(test)]
mod stubs;
