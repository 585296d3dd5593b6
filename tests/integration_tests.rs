//! Integration tests for the Hearth shell
//!
//! These drive the lifecycle controller through the public API the way a
//! host would, with a hand-fired pressure source and no platform hooks.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hearth::config::ShellConfig;
use hearth::lifecycle::{
    Collaborators, DestructionRegistry, DestructionToken, HostCallback, HostDriver,
    LifecycleController, LifecycleState,
};
use hearth::memory::{ManualPressureSource, MemoryPressureLevel, MemoryReleaser};
use hearth::utils::{CommandLine, ResultCode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Releaser that counts calls through a shared counter
struct CountingReleaser(Arc<AtomicUsize>);

impl MemoryReleaser for CountingReleaser {
    fn release_free_memory(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    controller: LifecycleController,
    releases: Arc<AtomicUsize>,
    pressure: ManualPressureSource,
}

fn harness(dir: &Path) -> Harness {
    harness_with_config(ShellConfig::for_testing(dir))
}

fn harness_with_config(config: ShellConfig) -> Harness {
    let releases = Arc::new(AtomicUsize::new(0));
    let pressure = ManualPressureSource::new();

    let mut collaborators = Collaborators::for_testing();
    collaborators.releaser = Box::new(CountingReleaser(Arc::clone(&releases)));
    collaborators.pressure_source = Box::new(pressure.clone());

    let controller = LifecycleController::new(
        config,
        CommandLine::new("hearth").into_shared(),
        collaborators,
    );
    Harness {
        controller,
        releases,
        pressure,
    }
}

fn advance_to(controller: &mut LifecycleController, last: HostCallback) {
    for callback in HostCallback::ORDER {
        controller.dispatch(callback).unwrap();
        if callback == last {
            return;
        }
    }
}

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_startup_through_pre_loop_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreMainMessageLoopRun);

        assert_eq!(h.controller.state(), LifecycleState::PreMainMessageLoopRun);
        assert!(h.controller.is_script_environment_alive());
        assert!(h.controller.is_script_environment_entered());
        assert!(h.controller.is_idle_timer_running());
        assert!(h.controller.is_memory_pressure_subscribed());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_full_run_releases_env_and_completes_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::Ok);
        assert!(h.controller.shutdown_complete());
        assert!(h.controller.was_script_environment_released());
        assert!(!h.controller.is_script_environment_alive());
        assert!(!h.controller.is_memory_pressure_subscribed());
        assert!(h.controller.parts().host().is_none());
    }

    #[test]
    fn test_destruction_callbacks_run_before_host_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::MainMessageLoopRun);

        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let seen = Rc::clone(&seen);
            h.controller.register_destruction_callback(move || seen.borrow_mut().push(n));
        }
        assert!(seen.borrow().is_empty());

        h.controller.post_main_message_loop_run().unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert!(h.controller.is_shutting_down());
        assert!(!h.controller.is_script_environment_entered());
        assert!(!h.controller.has_active_profile());
    }

    #[test]
    fn test_repeated_phase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        h.controller.pre_early_initialization().unwrap();
        let err = h.controller.pre_early_initialization().unwrap_err();
        assert_eq!(err.result_code(), ResultCode::LifecycleViolation);
    }

    #[test]
    fn test_script_exit_code_becomes_process_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.js");
        std::fs::write(&script, "process.nextTick(function () { process.exit(5); });").unwrap();
        let mut config = ShellConfig::for_testing(dir.path());
        config.app_script = Some(script);
        let mut h = harness_with_config(config);

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::Ok);
        assert_eq!(h.controller.exit_code(), 5);
    }

    #[test]
    fn test_string_exit_code_is_coerced() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.js");
        std::fs::write(
            &script,
            "process.exitCode = '3'; process.nextTick(function () { process.exit(); });",
        )
        .unwrap();
        let mut config = ShellConfig::for_testing(dir.path());
        config.app_script = Some(script);
        let mut h = harness_with_config(config);

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::Ok);
        assert_eq!(h.controller.exit_code(), 3);
    }

    #[test]
    fn test_rebinding_process_global_lets_loop_go_idle() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.js");
        std::fs::write(&script, "process = undefined;").unwrap();
        let mut config = ShellConfig::for_testing(dir.path());
        config.app_script = Some(script);
        let mut h = harness_with_config(config);

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::Ok);
        assert!(h.controller.shutdown_complete());
        assert_eq!(h.controller.state(), LifecycleState::PostDestroyThreads);
    }

    #[test]
    fn test_failing_last_tick_lets_loop_go_idle() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.js");
        std::fs::write(
            &script,
            "process.nextTick(function () { throw new Error('late failure'); });",
        )
        .unwrap();
        let mut config = ShellConfig::for_testing(dir.path());
        config.app_script = Some(script);
        let mut h = harness_with_config(config);

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::Ok);
        assert!(h.controller.shutdown_complete());
    }

    #[test]
    fn test_missing_app_script_aborts_before_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShellConfig::for_testing(dir.path());
        config.app_script = Some(dir.path().join("missing.js"));
        let mut h = harness_with_config(config);

        assert_eq!(HostDriver::run(&mut h.controller), ResultCode::BootstrapFailed);
        assert!(h.controller.state() < LifecycleState::MainMessageLoopRun);
    }
}

mod memory_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pressure_signal_reaches_runtime_through_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreMainMessageLoopRun);

        assert!(h.pressure.fire(MemoryPressureLevel::Critical));
        assert_eq!(h.releases.load(Ordering::SeqCst), 0);

        h.controller.run_until_idle();
        assert_eq!(h.releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.low_memory_notifications(), 1);
    }

    #[test]
    fn test_pressure_after_shutdown_began_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PostMainMessageLoopRun);

        let before = h.releases.load(Ordering::SeqCst);
        h.controller.on_memory_pressure(MemoryPressureLevel::Critical);
        assert_eq!(h.releases.load(Ordering::SeqCst), before);
        assert_eq!(h.controller.low_memory_notifications(), 0);
    }

    #[test]
    fn test_pressure_before_runtime_exists_skips_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreCreateThreads);

        h.controller.on_memory_pressure(MemoryPressureLevel::Moderate);
        h.controller.idle_handler();
        assert_eq!(h.releases.load(Ordering::SeqCst), 2);
        assert!(!h.controller.is_script_environment_alive());
    }

    #[test]
    fn test_idle_handler_never_notifies_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreMainMessageLoopRun);

        h.controller.idle_handler();
        assert_eq!(h.releases.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.low_memory_notifications(), 0);
    }
}

mod registry_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_peer_deregistered_mid_run() {
        let registry = DestructionRegistry::new();
        let ran = Rc::new(RefCell::new(Vec::new()));
        let third: Rc<RefCell<Option<DestructionToken>>> = Rc::new(RefCell::new(None));

        let ran1 = Rc::clone(&ran);
        registry.register(move || ran1.borrow_mut().push(1));

        let ran2 = Rc::clone(&ran);
        let third2 = Rc::clone(&third);
        registry.register(move || {
            ran2.borrow_mut().push(2);
            if let Some(token) = third2.borrow().as_ref() {
                token.unregister();
            }
        });

        let ran3 = Rc::clone(&ran);
        *third.borrow_mut() = Some(registry.register(move || ran3.borrow_mut().push(3)));

        assert_eq!(registry.run_all(), 2);
        assert_eq!(*ran.borrow(), vec![1, 2]);
    }
}

mod shutdown_tests {
    use super::*;
    use hearth::host::{WorkerQueue, flush_worker_queues};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_flush_returns_after_timeout_when_a_queue_hangs() {
        let fast_a = WorkerQueue::spawn("fast-a").unwrap();
        let fast_b = WorkerQueue::spawn("fast-b").unwrap();
        let stuck = WorkerQueue::spawn("stuck").unwrap();

        let (release_tx, release_rx) = mpsc::channel::<()>();
        stuck.post_task(move || {
            let _ = release_rx.recv();
        });

        let timeout = Duration::from_millis(200);
        let start = Instant::now();
        let completed = flush_worker_queues(&[fast_a.handle(), fast_b.handle(), stuck.handle()], timeout);
        let elapsed = start.elapsed();

        assert!(!completed);
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(5));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_end_session_flushes_writers() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreMainMessageLoopRun);
        assert!(h.controller.end_session());
    }
}

mod crash_reporting_tests {
    use super::*;

    #[test]
    fn test_toggle_round_trip_from_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());

        h.controller.set_crash_reporting_enabled(true);
        assert!(h.controller.is_crash_reporting_enabled());
        h.controller.set_crash_reporting_enabled(false);
        assert!(!h.controller.is_crash_reporting_enabled());
    }

    #[test]
    fn test_toggle_round_trip_from_local_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness(dir.path());
        advance_to(&mut h.controller, HostCallback::PreCreateThreads);

        assert!(!h.controller.is_crash_reporting_enabled());
        h.controller.set_crash_reporting_enabled(true);
        assert!(h.controller.is_crash_reporting_enabled());
        h.controller.set_crash_reporting_enabled(false);
        assert!(!h.controller.is_crash_reporting_enabled());
    }
}

proptest! {
    /// Only the documented order is ever accepted
    #[test]
    fn test_only_documented_order_accepted(picks in prop::collection::vec(0usize..9, 0..30)) {
        let mut state = LifecycleState::Created;
        let mut accepted = Vec::new();
        for pick in picks {
            let callback = HostCallback::ORDER[pick];
            match state.advance(callback) {
                Ok(next) => {
                    prop_assert_eq!(Some(callback), state.next_callback());
                    accepted.push(callback);
                    state = next;
                }
                Err(_) => prop_assert_ne!(Some(callback), state.next_callback()),
            }
        }
        prop_assert_eq!(&accepted[..], &HostCallback::ORDER[..accepted.len()]);
    }

    /// Every callback not removed before its turn runs, in order
    #[test]
    fn test_registry_survives_deregistration(
        targets in prop::collection::vec(prop::option::of(0usize..12), 1..12)
    ) {
        let registry = DestructionRegistry::new();
        let count = targets.len();
        let tokens: Rc<RefCell<Vec<DestructionToken>>> = Rc::new(RefCell::new(Vec::new()));
        let ran = Rc::new(RefCell::new(Vec::new()));

        for (i, target) in targets.iter().copied().enumerate() {
            let tokens_in = Rc::clone(&tokens);
            let ran = Rc::clone(&ran);
            let token = registry.register(move || {
                ran.borrow_mut().push(i);
                if let Some(t) = target.filter(|t| *t < count) {
                    tokens_in.borrow()[t].unregister();
                }
            });
            tokens.borrow_mut().push(token);
        }

        registry.run_all();

        // Replay the removals to compute who should have run.
        let mut removed = vec![false; count];
        let mut expected = Vec::new();
        for i in 0..count {
            if removed[i] {
                continue;
            }
            expected.push(i);
            if let Some(t) = targets[i].filter(|t| *t < count) {
                removed[t] = true;
            }
        }
        prop_assert_eq!(ran.borrow().clone(), expected);
    }
}
