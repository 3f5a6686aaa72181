pub const COMPILE_FAILED_MSG: &str = "failed to compile code";
pub const EXECUTION_FAILED_MSG: &str = "code exited with error";
pub const PANIC_MSG_PREFIX: &str = "Panic";
