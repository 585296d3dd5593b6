//! Bridge between the host and the embedded runtime's own loop
//!
//! The bridge builds the runtime environment (the `process` object plus the
//! bootstrap graph) inside a [`ScriptEnvironment`], and exposes the runtime's
//! pending work as a pollable source. The host loop pumps it once per
//! iteration; neither side ever blocks waiting on the other.

use boa_engine::{
    JsObject, JsString, JsValue as BoaJsValue, js_string, object::ObjectInitializer,
    property::Attribute,
};
use log::{debug, error, info, trace};

use super::bindings::NativeBindings;
use super::environment::ScriptEnvironment;
use crate::message_loop::SourceStatus;
use crate::utils::{Result, ScriptError};

const BOOTSTRAP_SOURCE: &str = include_str!("bootstrap.js");

/// Bootstrap functions the bridge drives directly.
/// Held by reference so scripts that rebind `process` cannot detach the pump.
#[derive(Debug, Clone)]
struct LoopHooks {
    tick_callback: JsObject,
    pending_ticks: JsObject,
    exit_request: JsObject,
}

impl LoopHooks {
    fn capture(process: &JsObject, env: &mut ScriptEnvironment) -> Result<Self> {
        let context = env.context_mut();
        let mut lookup = |name: JsString| -> Result<JsObject> {
            let value = process
                .get(name.clone(), context)
                .map_err(|e| ScriptError::Bootstrap(e.to_string()))?;
            value.as_callable().ok_or_else(|| {
                ScriptError::Bootstrap(format!(
                    "bootstrap did not install process.{}",
                    name.to_std_string_escaped()
                ))
                .into()
            })
        };
        Ok(Self {
            tick_callback: lookup(js_string!("_tickCallback"))?,
            pending_ticks: lookup(js_string!("_pendingTicks"))?,
            exit_request: lookup(js_string!("_exitRequest"))?,
        })
    }
}

/// A runtime execution environment bound to one script context
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    process: JsObject,
    hooks: Option<LoopHooks>,
}

impl RuntimeEnv {
    /// The `process` object bindings are attached to
    pub fn process_object(&self) -> &JsObject {
        &self.process
    }

    /// Whether the bootstrap has run against this environment
    pub fn is_loaded(&self) -> bool {
        self.hooks.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    Uninitialized,
    Initialized,
    Prepared,
    Running,
    Stopped,
}

/// Creates, bootstraps and pumps the embedded runtime environment
#[derive(Debug)]
pub struct RuntimeBridge {
    state: BridgeState,
    uv_env: Option<RuntimeEnv>,
    bootstrapped: bool,
    pumps: u64,
}

impl RuntimeBridge {
    pub fn new() -> Self {
        Self {
            state: BridgeState::Uninitialized,
            uv_env: None,
            bootstrapped: false,
            pumps: 0,
        }
    }

    /// Prepare the runtime's loop structures. Call exactly once.
    pub fn initialize(&mut self) {
        assert_eq!(
            self.state,
            BridgeState::Uninitialized,
            "runtime bridge initialized twice"
        );
        self.state = BridgeState::Initialized;
        debug!("Runtime bridge initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.state != BridgeState::Uninitialized
    }

    /// Create the `process`-centred environment inside `env`
    pub fn create_environment(&mut self, env: &mut ScriptEnvironment) -> Result<RuntimeEnv> {
        assert!(
            self.is_initialized(),
            "runtime bridge must be initialized before creating an environment"
        );
        assert!(
            env.is_entered(),
            "script environment must be entered before creating a runtime environment"
        );

        let context = env.context_mut();
        let process = ObjectInitializer::new(context)
            .property(
                js_string!("type"),
                js_string!("browser"),
                Attribute::READONLY | Attribute::ENUMERABLE,
            )
            .property(
                js_string!("pid"),
                BoaJsValue::from(std::process::id()),
                Attribute::READONLY | Attribute::ENUMERABLE,
            )
            .build();

        context
            .register_global_property(
                js_string!("process"),
                process.clone(),
                Attribute::WRITABLE | Attribute::CONFIGURABLE,
            )
            .map_err(|e| ScriptError::Bootstrap(e.to_string()))?;

        Ok(RuntimeEnv {
            process,
            hooks: None,
        })
    }

    /// Attach host-specific native bindings to the environment's `process`
    pub fn bind_natives(&mut self, env: &mut ScriptEnvironment, runtime_env: &RuntimeEnv) -> Result<()> {
        assert!(env.is_entered(), "bindings attached outside the script environment");
        NativeBindings::bind_to(runtime_env.process_object(), env.context_mut())
            .map_err(|e| ScriptError::Bootstrap(e.to_string()))?;
        Ok(())
    }

    /// Run the bootstrap graph inside the environment and capture the
    /// loop functions it installs on `process`
    pub fn load_environment(&mut self, env: &mut ScriptEnvironment, runtime_env: &mut RuntimeEnv) -> Result<()> {
        assert!(env.is_entered(), "bootstrap run outside the script environment");

        let bootstrap = env
            .eval(BOOTSTRAP_SOURCE)
            .map_err(|e| ScriptError::Bootstrap(e.to_string()))?;
        let context = env.context_mut();
        let global = context.global_object();
        let function = bootstrap
            .as_callable()
            .ok_or_else(|| ScriptError::Bootstrap("bootstrap did not evaluate to a function".into()))?;
        function
            .call(
                &BoaJsValue::undefined(),
                &[runtime_env.process_object().clone().into(), global.into()],
                context,
            )
            .map_err(|e| ScriptError::Bootstrap(e.to_string()))?;

        runtime_env.hooks = Some(LoopHooks::capture(runtime_env.process_object(), env)?);
        self.bootstrapped = true;
        info!("Runtime environment bootstrapped");
        Ok(())
    }

    /// Evaluate an application script after bootstrap
    pub fn load_script(&mut self, env: &mut ScriptEnvironment, name: &str, source: &str) -> Result<()> {
        if !self.bootstrapped {
            return Err(ScriptError::NotReady("bootstrap has not run").into());
        }
        info!("Loading application script {}", name);
        env.eval(source)
            .map_err(|e| ScriptError::Bootstrap(format!("{}: {}", name, e)))?;
        Ok(())
    }

    /// Associate the bootstrap environment with the loop wrapper
    pub fn set_uv_env(&mut self, runtime_env: RuntimeEnv) {
        self.uv_env = Some(runtime_env);
    }

    pub fn uv_env(&self) -> Option<&RuntimeEnv> {
        self.uv_env.as_ref()
    }

    pub fn prepare_message_loop(&mut self) {
        assert_eq!(
            self.state,
            BridgeState::Initialized,
            "message loop prepared out of order"
        );
        self.state = BridgeState::Prepared;
    }

    /// Start accepting pumps from the host loop
    pub fn run_message_loop(&mut self) {
        assert_eq!(
            self.state,
            BridgeState::Prepared,
            "message loop run before being prepared"
        );
        self.state = BridgeState::Running;
        debug!("Runtime loop attached to host loop");
    }

    pub fn stop_message_loop(&mut self) {
        if self.state == BridgeState::Running {
            self.state = BridgeState::Stopped;
            debug!("Runtime loop detached after {} pumps", self.pumps);
        }
    }

    pub fn is_loop_running(&self) -> bool {
        self.state == BridgeState::Running
    }

    fn hooks(&self) -> Option<LoopHooks> {
        self.uv_env.as_ref().and_then(|runtime_env| runtime_env.hooks.clone())
    }

    /// Run whatever runtime work is ready without blocking
    pub fn pump(&mut self, env: &mut ScriptEnvironment) -> Result<SourceStatus> {
        if !self.is_loop_running() {
            return Ok(SourceStatus::Idle);
        }
        let Some(hooks) = self.hooks() else {
            return Ok(SourceStatus::Idle);
        };
        self.pumps += 1;

        Self::run_microtasks(env);
        let ran = hooks
            .tick_callback
            .call(&BoaJsValue::undefined(), &[], env.context_mut())
            .map_err(|e| ScriptError::Task(e.to_string()))?;
        Self::run_microtasks(env);

        match ran.as_number() {
            Some(count) if count > 0.0 => Ok(SourceStatus::Progressed),
            _ => Ok(SourceStatus::Idle),
        }
    }

    fn run_microtasks(env: &mut ScriptEnvironment) {
        match env.context_mut().run_jobs() {
            Ok(()) => trace!("Runtime job queue drained"),
            Err(e) => error!("Uncaught error in runtime job: {}", e),
        }
    }

    pub fn has_pending_work(&self, env: &mut ScriptEnvironment) -> bool {
        let Some(hooks) = self.hooks() else {
            return false;
        };
        hooks
            .pending_ticks
            .call(&BoaJsValue::undefined(), &[], env.context_mut())
            .ok()
            .and_then(|v| v.as_number())
            .is_some_and(|n| n > 0.0)
    }

    /// Exit code requested by script through `process.exit`
    pub fn exit_request(&self, env: &mut ScriptEnvironment) -> Option<i32> {
        let hooks = self.hooks()?;
        let context = env.context_mut();
        let requested = hooks
            .exit_request
            .call(&BoaJsValue::undefined(), &[], context)
            .ok()?;
        if requested.is_null_or_undefined() {
            return None;
        }
        match requested.to_i32(context) {
            Ok(code) => Some(code),
            Err(e) => {
                error!("Unusable exit code from script: {}", e);
                Some(0)
            }
        }
    }

    pub fn pump_count(&self) -> u64 {
        self.pumps
    }
}

impl Default for RuntimeBridge {
    fn default() -> Self {
        Self::new()
    }
}
