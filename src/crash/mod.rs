//! Crash reporting
//!
//! The client owns the enable/disable toggle and the process switches that
//! carry it; the backend that actually handles crashes is opaque.

pub mod backend;
pub mod client;

pub use backend::{CrashBackend, LoggingCrashBackend};
pub use client::CrashReporterClient;
