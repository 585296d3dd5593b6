//! Process lifecycle
//!
//! The host drives nine phase callbacks in a fixed order. [`state`] holds
//! the legal-order table, [`controller`] the per-phase work, [`destruction`]
//! the cleanup registry run after the main loop, [`hooks`] the per-target
//! platform work, and [`driver`] a host that invokes every phase in turn.

pub mod controller;
pub mod destruction;
pub mod driver;
pub mod hooks;
pub mod state;

pub use controller::{Collaborators, LifecycleController, MainParts, RUNTIME_TASK_SOURCE};
pub use destruction::{DestructionRegistry, DestructionToken};
pub use driver::HostDriver;
pub use hooks::{PlatformHook, PlatformHooks};
pub use state::{HostCallback, LifecycleState};
