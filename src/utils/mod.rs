//! Shared utilities: error types and command-line switches

pub mod command_line;
pub mod error;

pub use command_line::{CommandLine, SharedCommandLine};
pub use error::{LifecycleError, ResultCode, ScriptError, ShellError, Result};
