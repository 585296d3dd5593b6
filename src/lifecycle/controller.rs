//! Browser-process lifecycle controller
//!
//! Sequences the host's phase callbacks against the embedded runtime:
//!
//! - PreCreateThreads builds the surrogate host process and starts crash reporting
//! - PreMainMessageLoopRun creates and enters the script environment, bootstraps
//!   the runtime, and arms the idle timer and memory-pressure listener before
//!   the loop accepts external work
//! - PostMainMessageLoopRun exits the environment, runs destruction callbacks
//!   and starts host teardown while worker threads are still alive
//! - PostDestroyThreads hands the host process to the shutdown sequence and
//!   releases (leaks) the script environment
//!
//! All phase logic runs on the thread that created the controller.

use std::cell::Cell;
use std::fs;

use log::{debug, error, info, warn};

use super::destruction::{DestructionRegistry, DestructionToken};
use super::hooks::PlatformHooks;
use super::state::{HostCallback, LifecycleState};
use crate::config::ShellConfig;
use crate::crash::{CrashBackend, CrashReporterClient, LoggingCrashBackend};
use crate::host::{
    HostProcess, ProfileRef, RestartFlags, ShellGeolocationDelegate, ShutdownSequence,
};
use crate::memory::{
    AllocatorReleaser, ManualPressureSource, MemoryPressureLevel, MemoryPressureListener,
    MemoryPressureSource, MemoryReleaser, SystemMemoryMonitor,
};
use crate::message_loop::{Clock, MessageLoop, QuitHandle, SourceStatus, SystemClock, TimerId};
use crate::platform;
use crate::runtime::{RuntimeBridge, ScriptEnvironment, ScriptEnvironmentHolder};
use crate::utils::{Result, ScriptError, SharedCommandLine, ShellError};

/// Task source name the runtime pump is registered under
pub const RUNTIME_TASK_SOURCE: &str = "runtime";

thread_local! {
    static CONTROLLER_ALIVE: Cell<bool> = const { Cell::new(false) };
}

/// Pluggable collaborators the controller drives
pub struct Collaborators {
    pub releaser: Box<dyn MemoryReleaser>,
    pub pressure_source: Box<dyn MemoryPressureSource>,
    pub crash_backend: Box<dyn CrashBackend>,
    pub clock: Box<dyn Clock>,
    pub platform_hooks: PlatformHooks,
}

impl Collaborators {
    /// Real allocator, system memory monitor and this target's platform hooks
    pub fn for_current_target(config: &ShellConfig) -> Self {
        let pressure_source: Box<dyn MemoryPressureSource> = if config.system_memory_monitor {
            Box::new(SystemMemoryMonitor::new())
        } else {
            Box::new(ManualPressureSource::new())
        };
        Self {
            releaser: Box::new(AllocatorReleaser::new()),
            pressure_source,
            crash_backend: Box::new(LoggingCrashBackend::new()),
            clock: Box::new(SystemClock),
            platform_hooks: PlatformHooks::for_current_target(),
        }
    }

    /// No platform hooks and a hand-fired pressure source
    pub fn for_testing() -> Self {
        Self {
            releaser: Box::new(AllocatorReleaser::new()),
            pressure_source: Box::new(ManualPressureSource::new()),
            crash_backend: Box::new(LoggingCrashBackend::new()),
            clock: Box::new(SystemClock),
            platform_hooks: PlatformHooks::new(),
        }
    }
}

/// State the main loop's tasks operate on
pub struct MainParts {
    config: ShellConfig,
    command_line: SharedCommandLine,
    state: LifecycleState,
    host: Option<Box<HostProcess>>,
    crash_reporter: CrashReporterClient,
    script_env: ScriptEnvironmentHolder,
    bridge: RuntimeBridge,
    registry: DestructionRegistry,
    releaser: Box<dyn MemoryReleaser>,
    pressure_source: Box<dyn MemoryPressureSource>,
    platform_hooks: PlatformHooks,
    active_profile: Option<ProfileRef>,
    shutdown: ShutdownSequence,
    restart_last_session: bool,
    exit_code: Option<i32>,
    quit: Option<QuitHandle>,
}

impl MainParts {
    /// Timer-driven: hand free allocator pages back to the OS
    pub fn idle_handler(&mut self) {
        debug!("Idle handler releasing free memory");
        self.releaser.release_free_memory();
    }

    /// Respond to a pressure signal unless shutdown has begun
    pub fn on_memory_pressure(&mut self, level: MemoryPressureLevel) {
        if self.is_shutting_down() {
            debug!("Ignoring {} memory pressure during shutdown", level.as_str());
            return;
        }

        info!("Handling {} memory pressure", level.as_str());
        self.releaser.release_free_memory();
        self.script_env.notify_low_memory();
    }

    /// True once PostMainMessageLoopRun has begun or the host is tearing down
    pub fn is_shutting_down(&self) -> bool {
        self.state >= LifecycleState::PostMainMessageLoopRun
            || self.host.as_ref().is_some_and(|host| host.is_shutting_down())
    }

    /// Record the process exit code; fails until the main loop has started
    pub fn set_exit_code(&mut self, code: i32) -> bool {
        match self.exit_code.as_mut() {
            Some(slot) => {
                *slot = code;
                true
            }
            None => false,
        }
    }

    /// Exit code recorded so far, `0` if none
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }

    /// The surrogate host process, if it exists
    pub fn host(&self) -> Option<&HostProcess> {
        self.host.as_deref()
    }

    /// Mutable access to the host process, if it exists
    pub fn host_mut(&mut self) -> Option<&mut HostProcess> {
        self.host.as_deref_mut()
    }

    /// The live script environment, if one was created
    pub fn script_environment(&mut self) -> Option<&mut ScriptEnvironment> {
        self.script_env.get_mut()
    }

    /// Quit the main loop after the current task
    pub fn quit(&self) {
        match &self.quit {
            Some(quit) => quit.quit(),
            None => warn!("Quit requested before the main loop exists"),
        }
    }

    /// One cooperative slice of runtime work
    fn pump_runtime(&mut self) -> SourceStatus {
        let Some(env) = self.script_env.get_mut() else {
            return SourceStatus::Idle;
        };

        let status = match self.bridge.pump(env) {
            Ok(status) => status,
            // Only report progress when ticks behind the failed one are still queued.
            Err(e) => {
                error!("{}", e);
                if self.bridge.has_pending_work(env) {
                    SourceStatus::Progressed
                } else {
                    SourceStatus::Idle
                }
            }
        };

        if let Some(code) = self.bridge.exit_request(env) {
            info!("Script requested exit with code {}", code);
            self.set_exit_code(code);
            self.quit();
        }
        status
    }

    fn expect_host(&mut self) -> Result<&mut HostProcess> {
        self.host
            .as_deref_mut()
            .ok_or_else(|| ShellError::Other("host process has not been created".into()))
    }

    /// Create, enter and bootstrap the script environment
    fn start_runtime(&mut self) -> Result<()> {
        let env = self.script_env.create();
        self.bridge.initialize();

        let mut runtime_env = self.bridge.create_environment(env)?;
        self.bridge.bind_natives(env, &runtime_env)?;
        self.bridge.load_environment(env, &mut runtime_env)?;

        if let Some(path) = self.config.app_script.clone() {
            let source = fs::read_to_string(&path).map_err(|e| {
                ScriptError::Bootstrap(format!("cannot read {}: {}", path.display(), e))
            })?;
            self.bridge
                .load_script(env, &path.display().to_string(), &source)?;
        }

        self.bridge.set_uv_env(runtime_env);
        Ok(())
    }
}

/// Owns the main loop and the state its tasks run against.
/// One per thread; a second concurrent instance panics.
pub struct LifecycleController {
    message_loop: MessageLoop<MainParts>,
    parts: MainParts,
    idle_timer: Option<TimerId>,
}

impl LifecycleController {
    /// Build a controller in the `Created` state.
    ///
    /// Panics if another controller is alive on this thread. The check is
    /// per thread, so parallel test threads may each own one.
    pub fn new(config: ShellConfig, command_line: SharedCommandLine, collaborators: Collaborators) -> Self {
        CONTROLLER_ALIVE.with(|alive| {
            assert!(!alive.get(), "cannot have two lifecycle controllers");
            alive.set(true);
        });

        let Collaborators {
            releaser,
            pressure_source,
            crash_backend,
            clock,
            platform_hooks,
        } = collaborators;

        let crash_reporter = CrashReporterClient::new(command_line.clone(), crash_backend);

        Self {
            message_loop: MessageLoop::with_clock(clock),
            parts: MainParts {
                config,
                command_line,
                state: LifecycleState::Created,
                host: None,
                crash_reporter,
                script_env: ScriptEnvironmentHolder::new(),
                bridge: RuntimeBridge::new(),
                registry: DestructionRegistry::new(),
                releaser,
                pressure_source,
                platform_hooks,
                active_profile: None,
                shutdown: ShutdownSequence::new(),
                restart_last_session: false,
                exit_code: None,
                quit: None,
            },
            idle_timer: None,
        }
    }

    /// Last host callback this controller accepted
    pub fn state(&self) -> LifecycleState {
        self.parts.state
    }

    /// Resolved shell configuration
    pub fn config(&self) -> &ShellConfig {
        &self.parts.config
    }

    /// State the loop's tasks run against
    pub fn parts(&self) -> &MainParts {
        &self.parts
    }

    /// Mutable access to the loop's task state
    pub fn parts_mut(&mut self) -> &mut MainParts {
        &mut self.parts
    }

    /// The main message loop, for posting work from the host side
    pub fn message_loop_mut(&mut self) -> &mut MessageLoop<MainParts> {
        &mut self.message_loop
    }

    /// Run ready loop work without blocking; returns items processed
    pub fn run_until_idle(&mut self) -> usize {
        self.message_loop.run_until_idle(&mut self.parts)
    }

    fn enter(&mut self, callback: HostCallback) -> Result<()> {
        self.parts.state = self.parts.state.advance(callback)?;
        info!("{}", callback.name());
        self.parts.platform_hooks.run(callback)?;
        Ok(())
    }

    /// Invoke one host callback by name
    pub fn dispatch(&mut self, callback: HostCallback) -> Result<()> {
        match callback {
            HostCallback::PreEarlyInitialization => self.pre_early_initialization(),
            HostCallback::PostEarlyInitialization => self.post_early_initialization(),
            HostCallback::PreCreateThreads => self.pre_create_threads(),
            HostCallback::PreMainMessageLoopStart => self.pre_main_message_loop_start(),
            HostCallback::PostMainMessageLoopStart => self.post_main_message_loop_start(),
            HostCallback::PreMainMessageLoopRun => self.pre_main_message_loop_run(),
            HostCallback::MainMessageLoopRun => self.main_message_loop_run().map(|_| ()),
            HostCallback::PostMainMessageLoopRun => self.post_main_message_loop_run(),
            HostCallback::PostDestroyThreads => self.post_destroy_threads(),
        }
    }

    /// Runs the PreEarlyInitialization platform hooks
    pub fn pre_early_initialization(&mut self) -> Result<()> {
        self.enter(HostCallback::PreEarlyInitialization)
    }

    /// Runs the PostEarlyInitialization platform hooks
    pub fn post_early_initialization(&mut self) -> Result<()> {
        self.enter(HostCallback::PostEarlyInitialization)
    }

    /// Create the host process and local state, then start crash reporting
    pub fn pre_create_threads(&mut self) -> Result<()> {
        self.enter(HostCallback::PreCreateThreads)?;
        let parts = &mut self.parts;

        if parts.config.user_data_dir.as_os_str().is_empty() {
            return Err(ShellError::Path("user data directory is not set".into()));
        }

        let mut host = HostProcess::new(&parts.config)?;
        if let Some(flag) = parts.config.enable_profiling.as_deref() {
            host.init_tracking(flag);
        }
        host.set_geolocation_delegate(Box::new(ShellGeolocationDelegate));
        host.pre_create_threads(&parts.command_line.borrow())?;
        parts.host = Some(Box::new(host));

        parts.crash_reporter.init_crash_reporting();
        Ok(())
    }

    /// Runs the PreMainMessageLoopStart platform hooks
    pub fn pre_main_message_loop_start(&mut self) -> Result<()> {
        self.enter(HostCallback::PreMainMessageLoopStart)
    }

    /// Watch the shutdown-signal flag and expose the quit handle
    pub fn post_main_message_loop_start(&mut self) -> Result<()> {
        self.enter(HostCallback::PostMainMessageLoopStart)?;
        self.message_loop.watch_quit_flag(platform::shutdown_flag());
        self.parts.quit = Some(self.message_loop.quit_handle());
        Ok(())
    }

    /// Start the runtime, arm the idle timer and pressure listener, and
    /// attach the runtime pump to the loop
    pub fn pre_main_message_loop_run(&mut self) -> Result<()> {
        self.enter(HostCallback::PreMainMessageLoopRun)?;
        self.parts.expect_host()?.pre_main_message_loop_run();

        self.parts.start_runtime()?;

        let period = self.parts.config.idle_gc_period;
        self.idle_timer = Some(
            self.message_loop
                .start_repeating_timer(period, |parts: &mut MainParts| parts.idle_handler()),
        );

        let poster = self.message_loop.remote_poster();
        let listener = MemoryPressureListener::new(move |level| {
            poster.post_task(move |parts: &mut MainParts| parts.on_memory_pressure(level));
        });
        if let Err(e) = self.parts.pressure_source.subscribe(listener) {
            warn!("Memory pressure monitoring unavailable: {}", e);
        }

        let user_data_dir = self.parts.config.user_data_dir.clone();
        if let Err(e) = fs::create_dir_all(&user_data_dir) {
            warn!("Cannot create {}: {}", user_data_dir.display(), e);
        }

        let profile = match self.parts.expect_host()?.profile_manager() {
            Some(manager) => Some(manager.get_active_user_profile()?),
            None => None,
        };
        self.parts.active_profile = profile;

        let parts = &mut self.parts;
        if let Some(env) = parts.script_env.get_mut() {
            env.on_message_loop_created();
        }
        parts.bridge.prepare_message_loop();
        parts.bridge.run_message_loop();
        self.message_loop
            .add_task_source(RUNTIME_TASK_SOURCE, |parts: &mut MainParts| parts.pump_runtime());
        self.message_loop
            .set_exit_when_idle(self.parts.config.exit_when_idle);
        Ok(())
    }

    /// Run the main loop to completion; returns the exit code
    pub fn main_message_loop_run(&mut self) -> Result<i32> {
        self.enter(HostCallback::MainMessageLoopRun)?;
        self.parts.exit_code = Some(0);
        if self.parts.quit.is_none() {
            self.parts.quit = Some(self.message_loop.quit_handle());
        }

        self.message_loop.run(&mut self.parts);

        let code = self.parts.exit_code();
        info!("Main loop exited with code {}", code);
        Ok(code)
    }

    /// Exit the environment, run destruction callbacks, start host teardown
    pub fn post_main_message_loop_run(&mut self) -> Result<()> {
        self.enter(HostCallback::PostMainMessageLoopRun)?;
        let parts = &mut self.parts;

        parts.active_profile = None;
        parts.bridge.stop_message_loop();
        if let Some(env) = parts.script_env.get_mut() {
            env.on_message_loop_destroying();
            env.exit();
        }

        parts.registry.run_all();

        let host = parts
            .host
            .as_deref_mut()
            .ok_or_else(|| ShellError::Other("host process has not been created".into()))?;
        parts.restart_last_session = parts.shutdown.pre_threads_stop(host);
        host.start_tear_down();
        Ok(())
    }

    /// Finish shutdown and release the script environment
    pub fn post_destroy_threads(&mut self) -> Result<()> {
        self.enter(HostCallback::PostDestroyThreads)?;
        let parts = &mut self.parts;

        let flags = if parts.restart_last_session {
            RestartFlags::RestartLastSession
        } else {
            RestartFlags::NoFlags
        };

        parts.pressure_source.unsubscribe();
        if let Some(timer) = self.idle_timer.take() {
            self.message_loop.stop_timer(timer);
        }

        let mut host = parts
            .host
            .take()
            .ok_or_else(|| ShellError::Other("host process has not been created".into()))?;
        host.post_destroy_threads();
        parts.shutdown.post_threads_stop(host, flags);

        parts.script_env.release();
        Ok(())
    }

    /// Register cleanup to run after the main loop exits
    pub fn register_destruction_callback(&self, callback: impl FnOnce() + 'static) -> DestructionToken {
        self.parts.registry.register(callback)
    }

    /// See [`MainParts::set_exit_code`]
    pub fn set_exit_code(&mut self, code: i32) -> bool {
        self.parts.set_exit_code(code)
    }

    /// Exit code recorded by the host or by script
    pub fn exit_code(&self) -> i32 {
        self.parts.exit_code()
    }

    /// Run the idle handler as if the timer fired
    pub fn idle_handler(&mut self) {
        self.parts.idle_handler();
    }

    /// Deliver a pressure signal directly, bypassing the loop
    pub fn on_memory_pressure(&mut self, level: MemoryPressureLevel) {
        self.parts.on_memory_pressure(level);
    }

    /// See [`MainParts::is_shutting_down`]
    pub fn is_shutting_down(&self) -> bool {
        self.parts.is_shutting_down()
    }

    /// Flush profile and local-state writes ahead of a session end
    pub fn end_session(&mut self) -> bool {
        match self.parts.host.as_deref_mut() {
            Some(host) => host.end_session(),
            None => {
                warn!("Session ended before the host process exists");
                false
            }
        }
    }

    /// Persist the crash-reporting choice in local state or on the command line
    pub fn set_crash_reporting_enabled(&mut self, enabled: bool) {
        let parts = &mut self.parts;
        let local_state = parts.host.as_deref_mut().and_then(HostProcess::local_state_mut);
        parts.crash_reporter.set_crash_reporting_enabled(local_state, enabled);
    }

    /// Current crash-reporting choice
    pub fn is_crash_reporting_enabled(&self) -> bool {
        let local_state = self.parts.host.as_deref().and_then(HostProcess::local_state);
        self.parts.crash_reporter.is_crash_reporting_enabled(local_state)
    }

    /// The crash reporter client
    pub fn crash_reporter_mut(&mut self) -> &mut CrashReporterClient {
        &mut self.parts.crash_reporter
    }

    /// Whether a script environment exists and has not been released
    pub fn is_script_environment_alive(&self) -> bool {
        self.parts.script_env.is_alive()
    }

    /// Whether the script environment is currently entered
    pub fn is_script_environment_entered(&self) -> bool {
        self.parts.script_env.get().is_some_and(ScriptEnvironment::is_entered)
    }

    /// Whether the script environment has been released
    pub fn was_script_environment_released(&self) -> bool {
        self.parts.script_env.was_released()
    }

    /// Low-memory notifications delivered to the runtime
    pub fn low_memory_notifications(&self) -> u64 {
        self.parts
            .script_env
            .get()
            .map(ScriptEnvironment::low_memory_notifications)
            .unwrap_or(0)
    }

    /// Whether the idle timer is armed
    pub fn is_idle_timer_running(&self) -> bool {
        self.idle_timer
            .is_some_and(|timer| self.message_loop.is_timer_running(timer))
    }

    /// Whether the pressure listener is subscribed
    pub fn is_memory_pressure_subscribed(&self) -> bool {
        self.parts.pressure_source.is_subscribed()
    }

    /// Whether the controller holds the active user profile
    pub fn has_active_profile(&self) -> bool {
        self.parts.active_profile.is_some()
    }

    /// Whether the runtime pump is attached to the main loop
    pub fn is_runtime_pumping(&self) -> bool {
        self.parts.bridge.is_loop_running() && self.message_loop.has_task_source(RUNTIME_TASK_SOURCE)
    }

    /// Whether the shutdown sequence has finished
    pub fn shutdown_complete(&self) -> bool {
        self.parts.shutdown.is_complete()
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        // Never tear the script engine down on the way out.
        self.parts.script_env.release();
        CONTROLLER_ALIVE.with(|alive| alive.set(false));
    }
}
