//! # Hearth - embeddable application shell
//!
//! Hosts a script runtime inside a multi-phase browser-process lifecycle.
//!
//! ## Architecture
//!
//! - **lifecycle**: phase state machine, controller, destruction callbacks, host driver
//! - **runtime**: script environment holder and the runtime bindings bridge
//! - **message_loop**: single-threaded cooperative dispatcher with timers
//! - **memory**: idle release and memory-pressure signals
//! - **host**: surrogate host process, profiles, local state, worker queues
//! - **crash**: crash-reporter client and its toggle
//! - **platform**: POSIX signal handling and the panic filter
//! - **config**: resolved shell configuration
//! - **utils**: error types and command-line parsing

pub mod config;
pub mod crash;
pub mod host;
pub mod lifecycle;
pub mod memory;
pub mod message_loop;
pub mod platform;
pub mod runtime;
pub mod utils;

pub use config::ShellConfig;
pub use lifecycle::{Collaborators, HostDriver, LifecycleController};
pub use utils::{Result, ResultCode, ShellError};

/// Shell version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Hearth";
