//! Error types for the Hearth shell

use thiserror::Error;

use crate::lifecycle::{HostCallback, LifecycleState};

/// Main error type for shell operations
#[derive(Debug, Error)]
pub enum ShellError {
    /// Host drove the lifecycle out of its legal order
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
    /// Script bootstrap or evaluation failed
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    /// A required directory could not be resolved or created
    #[error("Path error: {0}")]
    Path(String),
    /// Preference store failure
    #[error("Preferences error: {0}")]
    Prefs(String),
    /// Signal or exception-filter installation failed
    #[error("Platform error: {0}")]
    Platform(String),
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Lifecycle ordering violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A callback arrived while the controller was in the wrong phase
    #[error("{callback:?} invoked in state {state:?}")]
    OutOfOrder {
        state: LifecycleState,
        callback: HostCallback,
    },
    /// The sequence already finished
    #[error("{callback:?} invoked after shutdown completed")]
    Finished { callback: HostCallback },
}

/// Script-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Uncaught error thrown while running bootstrap code
    #[error("uncaught error during bootstrap: {0}")]
    Bootstrap(String),
    /// Error thrown from a callback run by the loop pump
    #[error("uncaught error in task: {0}")]
    Task(String),
    /// Environment used before it was created or bound
    #[error("runtime environment not ready: {0}")]
    NotReady(&'static str),
}

/// Structured result codes, mapped to the process exit status by `main`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    /// Required data (paths, user data directory) is unavailable
    MissingData = 7,
    /// Bootstrap script threw
    BootstrapFailed = 8,
    /// Pre-early-initialization could not install process handlers
    PreEarlyInitFailed = 9,
    /// Host drove the lifecycle out of order
    LifecycleViolation = 10,
}

impl ResultCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl ShellError {
    /// Result code reported to the host entry point for this error
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Lifecycle(_) => ResultCode::LifecycleViolation,
            Self::Script(_) => ResultCode::BootstrapFailed,
            Self::Platform(_) => ResultCode::PreEarlyInitFailed,
            Self::Path(_) | Self::Prefs(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ResultCode::MissingData
            }
        }
    }
}

/// Convenience Result type for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;
