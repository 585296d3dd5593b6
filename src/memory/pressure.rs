//! Memory-pressure levels, listeners and sources
//!
//! Pressure Levels (by share of system memory still available):
//! - None: 15% or more available
//! - Moderate: under 15% available
//! - Critical: under 5% available

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use sysinfo::System;

use crate::utils::Result;

/// How often the system monitor samples memory
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MODERATE_AVAILABLE_RATIO: f64 = 0.15;
const CRITICAL_AVAILABLE_RATIO: f64 = 0.05;

/// Memory pressure levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryPressureLevel {
    None,
    Moderate,
    Critical,
}

impl MemoryPressureLevel {
    /// Determine pressure from available and total system memory
    pub fn from_available(available: u64, total: u64) -> Self {
        if total == 0 {
            return Self::None;
        }
        let ratio = available as f64 / total as f64;
        if ratio < CRITICAL_AVAILABLE_RATIO {
            Self::Critical
        } else if ratio < MODERATE_AVAILABLE_RATIO {
            Self::Moderate
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Moderate => "moderate",
            Self::Critical => "critical",
        }
    }
}

/// Receives pressure notifications; may be called from any thread
#[derive(Clone)]
pub struct MemoryPressureListener {
    callback: Arc<dyn Fn(MemoryPressureLevel) + Send + Sync>,
}

impl MemoryPressureListener {
    pub fn new(callback: impl Fn(MemoryPressureLevel) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn notify(&self, level: MemoryPressureLevel) {
        (self.callback)(level);
    }
}

impl fmt::Debug for MemoryPressureListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPressureListener").finish_non_exhaustive()
    }
}

/// Something that raises memory-pressure signals
pub trait MemoryPressureSource {
    /// Start delivering signals to `listener`, replacing any previous one
    fn subscribe(&mut self, listener: MemoryPressureListener) -> Result<()>;
    fn unsubscribe(&mut self);
    fn is_subscribed(&self) -> bool;
}

/// Source fired by hand; clones share the subscription
#[derive(Debug, Clone, Default)]
pub struct ManualPressureSource {
    listener: Rc<RefCell<Option<MemoryPressureListener>>>,
}

impl ManualPressureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `level` to the subscriber; returns false when nobody listens
    pub fn fire(&self, level: MemoryPressureLevel) -> bool {
        let listener = self.listener.borrow().clone();
        match listener {
            Some(listener) => {
                listener.notify(level);
                true
            }
            None => false,
        }
    }
}

impl MemoryPressureSource for ManualPressureSource {
    fn subscribe(&mut self, listener: MemoryPressureListener) -> Result<()> {
        *self.listener.borrow_mut() = Some(listener);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.listener.borrow_mut().take();
    }

    fn is_subscribed(&self) -> bool {
        self.listener.borrow().is_some()
    }
}

/// Polls system memory on a background thread and signals level changes
pub struct SystemMemoryMonitor {
    poll_interval: Duration,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SystemMemoryMonitor {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_tx: None,
            handle: None,
        }
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Sample the current level once
    pub fn read_level() -> MemoryPressureLevel {
        let mut system = System::new();
        system.refresh_memory();
        MemoryPressureLevel::from_available(system.available_memory(), system.total_memory())
    }
}

impl Default for SystemMemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPressureSource for SystemMemoryMonitor {
    fn subscribe(&mut self, listener: MemoryPressureListener) -> Result<()> {
        self.unsubscribe();

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poll_interval = self.poll_interval;

        let handle = thread::Builder::new()
            .name("memory-pressure".to_string())
            .spawn(move || {
                info!("Memory pressure monitor started");
                let mut system = System::new();
                let mut last_level = MemoryPressureLevel::None;

                loop {
                    system.refresh_memory();
                    let level = MemoryPressureLevel::from_available(
                        system.available_memory(),
                        system.total_memory(),
                    );

                    if level != last_level {
                        info!(
                            "Memory pressure changed: {} -> {} ({} of {} bytes available)",
                            last_level.as_str(),
                            level.as_str(),
                            system.available_memory(),
                            system.total_memory()
                        );
                        if level > MemoryPressureLevel::None {
                            listener.notify(level);
                        }
                        last_level = level;
                    }

                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }

                info!("Memory pressure monitor stopped");
            })?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Memory pressure monitor thread panicked");
            }
            debug!("Memory pressure monitor joined");
        }
    }

    fn is_subscribed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for SystemMemoryMonitor {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
