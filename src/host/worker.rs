//! Background worker queues and end-of-session rundown
//!
//! Worker queues persist data off the main thread (local state, profile
//! writes). At end of session the main thread posts a rundown task to each
//! queue and waits, up to a fixed deadline, for all of them to drain.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::utils::Result;

/// Unit of work run on a worker thread
pub type WorkerTask = Box<dyn FnOnce() + Send>;

enum WorkerMessage {
    Task(WorkerTask),
    Quit,
}

/// Cloneable, thread-safe handle for posting to a worker queue
#[derive(Clone)]
pub struct WorkerHandle {
    name: Arc<str>,
    sender: Sender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a task; returns false once the worker has shut down
    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(WorkerMessage::Task(Box::new(task))).is_ok()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").field("name", &self.name).finish()
    }
}

/// A named background thread running posted tasks in FIFO order
pub struct WorkerQueue {
    handle: WorkerHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerQueue {
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<WorkerMessage>();
        let thread_name = name.to_string();

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("Worker {} started", thread_name);
                for message in receiver {
                    match message {
                        WorkerMessage::Task(task) => task(),
                        WorkerMessage::Quit => break,
                    }
                }
                debug!("Worker {} stopped", thread_name);
            })?;

        Ok(Self {
            handle: WorkerHandle {
                name: Arc::from(name),
                sender,
            },
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn post_task(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.handle.post_task(task)
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Run everything already posted, then stop and join the thread
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.sender.send(WorkerMessage::Quit);
            if thread.join().is_err() {
                warn!("Worker {} panicked", self.handle.name());
            }
        }
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Counts outstanding rundown tasks across worker queues
///
/// The count starts at one so it cannot reach zero before
/// [`timed_wait_until`](Self::timed_wait_until) drops that initial hold.
pub struct RundownCounter {
    count: Mutex<usize>,
    drained: Condvar,
}

impl RundownCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(1),
            drained: Condvar::new(),
        })
    }

    /// Post a rundown task behind everything already queued on `worker`
    pub fn post(self: &Arc<Self>, worker: &WorkerHandle) {
        {
            let mut count = self.lock_count();
            debug_assert!(*count > 0, "rundown task posted after the wait finished");
            *count += 1;
        }

        let counter = Arc::clone(self);
        if !worker.post_task(move || counter.decrement()) {
            warn!("Worker {} is gone; skipping its rundown", worker.name());
            self.decrement();
        }
    }

    fn decrement(&self) {
        let mut count = self.lock_count();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn lock_count(&self) -> std::sync::MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until every rundown task ran or `deadline` passed.
    /// Returns true when all completed. Call once.
    pub fn timed_wait_until(&self, deadline: Instant) -> bool {
        self.decrement();

        let mut count = self.lock_count();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = match self.drained.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Post a rundown to every queue and block for at most `timeout`.
/// Returns true when all queues drained in time.
pub fn flush_worker_queues(workers: &[WorkerHandle], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let counter = RundownCounter::new();
    for worker in workers {
        counter.post(worker);
    }

    let completed = counter.timed_wait_until(deadline);
    if completed {
        info!("Flushed {} worker queues", workers.len());
    } else {
        warn!(
            "Worker queues did not drain within {:?}; continuing shutdown",
            timeout
        );
    }
    completed
}
