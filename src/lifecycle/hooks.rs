//! Platform hook table
//!
//! Platform-specific work (signal handlers, exception filters) is registered
//! against the phase it belongs to. The controller runs whatever is
//! registered for each phase and stays platform-neutral itself.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use super::state::HostCallback;
use crate::utils::Result;

/// A hook run at the start of a phase
pub type PlatformHook = Box<dyn Fn() -> Result<()>>;

#[derive(Default)]
pub struct PlatformHooks {
    hooks: BTreeMap<HostCallback, Vec<(&'static str, PlatformHook)>>,
}

impl PlatformHooks {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The hooks this target needs
    pub fn for_current_target() -> Self {
        #[allow(unused_mut)]
        let mut hooks = Self::new();

        #[cfg(unix)]
        {
            use crate::platform;
            hooks.register(
                HostCallback::PreEarlyInitialization,
                "sigchld",
                Box::new(platform::install_sigchld_handler),
            );
            hooks.register(
                HostCallback::PostMainMessageLoopStart,
                "shutdown-signals",
                Box::new(platform::install_shutdown_signal_handlers),
            );
            hooks.register(
                HostCallback::PostMainMessageLoopRun,
                "restore-shutdown-signals",
                Box::new(platform::restore_shutdown_signal_handlers),
            );
        }

        #[cfg(windows)]
        hooks.register(
            HostCallback::PreMainMessageLoopStart,
            "exception-filter",
            Box::new(crate::platform::install_exception_filter),
        );

        hooks
    }

    pub fn register(&mut self, phase: HostCallback, name: &'static str, hook: PlatformHook) {
        self.hooks.entry(phase).or_default().push((name, hook));
    }

    pub fn has_hooks(&self, phase: HostCallback) -> bool {
        self.hooks.get(&phase).is_some_and(|hooks| !hooks.is_empty())
    }

    /// Run the hooks for `phase` in registration order, stopping at the
    /// first failure. Returns how many ran.
    pub fn run(&self, phase: HostCallback) -> Result<usize> {
        let Some(hooks) = self.hooks.get(&phase) else {
            return Ok(0);
        };
        for (name, hook) in hooks {
            debug!("Running platform hook {} for {}", name, phase.name());
            hook()?;
        }
        Ok(hooks.len())
    }
}

impl fmt::Debug for PlatformHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (phase, hooks) in &self.hooks {
            let names: Vec<&str> = hooks.iter().map(|(name, _)| *name).collect();
            map.entry(phase, &names);
        }
        map.finish()
    }
}
