//! Embedded script runtime
//!
//! Provides the script-runtime environment holder (a Boa context with
//! enter/exit bracketing and a deliberate-leak release), the bridge that
//! builds and pumps the runtime environment, and the native bindings the
//! bridge attaches to `process`.

mod bindings;
mod bridge;
mod environment;

pub use bindings::{ENGINE_VERSION, NativeBindings};
pub use bridge::{RuntimeBridge, RuntimeEnv};
pub use environment::{ScriptEnvironment, ScriptEnvironmentHolder, ScriptValue};
