//! Native bindings attached to the bootstrap `process` object

use boa_engine::{
    Context, JsArgs, JsObject, JsResult, JsString, JsValue as BoaJsValue, NativeFunction,
    js_string, object::ObjectInitializer, property::Attribute,
};
use sysinfo::System;

/// Version string reported for the embedded engine
pub const ENGINE_VERSION: &str = "boa 0.21";

/// Host-specific functions and objects injected into `process`
pub struct NativeBindings;

impl NativeBindings {
    /// Attach every host binding to `process`
    pub fn bind_to(process: &JsObject, context: &mut Context) -> JsResult<()> {
        let versions = ObjectInitializer::new(context)
            .property(
                js_string!("hearth"),
                JsString::from(crate::VERSION),
                Attribute::READONLY | Attribute::ENUMERABLE,
            )
            .property(
                js_string!("boa"),
                JsString::from(ENGINE_VERSION),
                Attribute::READONLY | Attribute::ENUMERABLE,
            )
            .build();
        process.create_data_property_or_throw(js_string!("versions"), versions, context)?;

        let log_fn = NativeFunction::from_copy_closure(|_this, args, ctx| {
            let message = join_args(args, ctx)?;
            log::info!(target: "hearth::script", "{}", message);
            Ok(BoaJsValue::undefined())
        });
        Self::define_function(process, "log", log_fn, context)?;

        let warn_fn = NativeFunction::from_copy_closure(|_this, args, ctx| {
            let message = join_args(args, ctx)?;
            log::warn!(target: "hearth::script", "{}", message);
            Ok(BoaJsValue::undefined())
        });
        Self::define_function(process, "warn", warn_fn, context)?;

        let memory_info_fn = NativeFunction::from_copy_closure(|_this, _args, ctx| {
            let mut system = System::new();
            system.refresh_memory();
            let info = ObjectInitializer::new(ctx)
                .property(
                    js_string!("total"),
                    BoaJsValue::from((system.total_memory() / 1024) as f64),
                    Attribute::all(),
                )
                .property(
                    js_string!("free"),
                    BoaJsValue::from((system.available_memory() / 1024) as f64),
                    Attribute::all(),
                )
                .property(
                    js_string!("swapTotal"),
                    BoaJsValue::from((system.total_swap() / 1024) as f64),
                    Attribute::all(),
                )
                .build();
            Ok(info.into())
        });
        Self::define_function(process, "getSystemMemoryInfo", memory_info_fn, context)?;

        Ok(())
    }

    fn define_function(
        target: &JsObject,
        name: &str,
        function: NativeFunction,
        context: &mut Context,
    ) -> JsResult<()> {
        let function = function.to_js_function(context.realm());
        target.create_data_property_or_throw(JsString::from(name), function, context)?;
        Ok(())
    }
}

fn join_args(args: &[BoaJsValue], ctx: &mut Context) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for index in 0..args.len() {
        let part = args.get_or_undefined(index).to_string(ctx)?;
        parts.push(part.to_std_string_escaped());
    }
    Ok(parts.join(" "))
}
