//! Memory management hooks
//!
//! Two signals funnel into the same "release free memory" action:
//! - the idle timer, on a fixed period
//! - memory-pressure notifications from the OS (here: a sysinfo poller)
//!
//! This module provides the action and the signal plumbing; the lifecycle
//! controller decides when each is live.

pub mod pressure;
pub mod release;

pub use pressure::{
    ManualPressureSource, MemoryPressureLevel, MemoryPressureListener, MemoryPressureSource,
    SystemMemoryMonitor,
};
pub use release::{AllocatorReleaser, MemoryReleaser};
