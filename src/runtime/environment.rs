//! Script-runtime environment holder using the Boa engine

use boa_engine::{Context, JsError, JsValue as BoaJsValue, Source};
use log::{debug, info, trace};

/// Plain-Rust view of a script value
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object,
}

/// An isolated script execution context with enter/exit bracketing
pub struct ScriptEnvironment {
    context: Context,
    enter_depth: u32,
    message_loop_attached: bool,
    low_memory_notifications: u64,
}

impl ScriptEnvironment {
    /// Allocate a fresh context. Engine allocation failure aborts.
    pub fn create() -> Self {
        info!("Creating script environment");
        Self {
            context: Context::default(),
            enter_depth: 0,
            message_loop_attached: false,
            low_memory_notifications: 0,
        }
    }

    /// Make this environment the active one; calls nest
    pub fn enter(&mut self) {
        self.enter_depth += 1;
        trace!("Script environment entered (depth {})", self.enter_depth);
    }

    /// Leave the innermost enter scope
    pub fn exit(&mut self) {
        assert!(self.enter_depth > 0, "script environment exited without being entered");
        self.enter_depth -= 1;
        trace!("Script environment exited (depth {})", self.enter_depth);
    }

    pub fn is_entered(&self) -> bool {
        self.enter_depth > 0
    }

    pub fn enter_depth(&self) -> u32 {
        self.enter_depth
    }

    pub fn on_message_loop_created(&mut self) {
        self.message_loop_attached = true;
    }

    pub fn on_message_loop_destroying(&mut self) {
        self.message_loop_attached = false;
    }

    pub fn is_message_loop_attached(&self) -> bool {
        self.message_loop_attached
    }

    /// Ask the engine to drop caches and collect garbage now
    pub fn notify_low_memory(&mut self) {
        self.low_memory_notifications += 1;
        debug!("Low-memory notification delivered to script environment");
        boa_gc::force_collect();
    }

    pub fn low_memory_notifications(&self) -> u64 {
        self.low_memory_notifications
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Evaluate `code` in this environment
    pub fn eval(&mut self, code: &str) -> Result<BoaJsValue, JsError> {
        self.context.eval(Source::from_bytes(code))
    }

    /// Evaluate `code` and convert the result
    pub fn eval_value(&mut self, code: &str) -> Result<ScriptValue, JsError> {
        let value = self.eval(code)?;
        Ok(Self::convert_value(&value, &mut self.context))
    }

    fn convert_value(value: &BoaJsValue, context: &mut Context) -> ScriptValue {
        if value.is_undefined() {
            ScriptValue::Undefined
        } else if value.is_null() {
            ScriptValue::Null
        } else if let Some(b) = value.as_boolean() {
            ScriptValue::Boolean(b)
        } else if let Some(n) = value.as_number() {
            ScriptValue::Number(n)
        } else if let Some(s) = value.as_string() {
            ScriptValue::String(s.to_std_string_escaped())
        } else if let Ok(object) = value.to_object(context) {
            if object.is_array() {
                let length = object
                    .get(boa_engine::js_string!("length"), context)
                    .ok()
                    .and_then(|len| len.as_number())
                    .unwrap_or(0.0);
                let mut items = Vec::new();
                for i in 0..(length as u32) {
                    if let Ok(item) = object.get(i, context) {
                        items.push(Self::convert_value(&item, context));
                    }
                }
                ScriptValue::Array(items)
            } else {
                ScriptValue::Object
            }
        } else {
            ScriptValue::Undefined
        }
    }
}

/// Owns the optional script environment for the controller
///
/// The environment is never destroyed on the shutdown path. [`release`]
/// forgets it, because a graceful engine teardown can block forever
/// draining background tasks and the process is exiting anyway.
///
/// [`release`]: ScriptEnvironmentHolder::release
#[derive(Default)]
pub struct ScriptEnvironmentHolder {
    env: Option<ScriptEnvironment>,
    released: bool,
}

impl ScriptEnvironmentHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the environment and enter it
    pub fn create(&mut self) -> &mut ScriptEnvironment {
        assert!(self.env.is_none(), "script environment already created");
        let mut env = ScriptEnvironment::create();
        env.enter();
        self.env.insert(env)
    }

    pub fn is_alive(&self) -> bool {
        self.env.is_some()
    }

    pub fn was_released(&self) -> bool {
        self.released
    }

    pub fn get(&self) -> Option<&ScriptEnvironment> {
        self.env.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut ScriptEnvironment> {
        self.env.as_mut()
    }

    /// Best-effort hint; a no-op when there is no live environment
    pub fn notify_low_memory(&mut self) -> bool {
        match self.env.as_mut() {
            Some(env) => {
                env.notify_low_memory();
                true
            }
            None => false,
        }
    }

    /// Forget the environment without running its teardown
    pub fn release(&mut self) {
        if let Some(env) = self.env.take() {
            info!("Releasing script environment without teardown");
            std::mem::forget(env);
            self.released = true;
        }
    }
}
