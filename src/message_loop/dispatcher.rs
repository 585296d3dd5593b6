//! Task queue, timers and task-source polling

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::clock::{Clock, SystemClock};

/// Task posted from the main thread
pub type LocalTask<C> = Box<dyn FnOnce(&mut C)>;
/// Task posted from any thread
pub type RemoteTask<C> = Box<dyn FnOnce(&mut C) + Send>;

type TimerTask<C> = Box<dyn FnMut(&mut C)>;

/// Longest the loop sleeps before re-checking quit flags
const MAX_IDLE_WAIT: Duration = Duration::from_millis(100);
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Result of polling a task source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// The source ran some work and may have more
    Progressed,
    /// Nothing was ready
    Idle,
}

/// A pollable source of work, pumped once per loop iteration
pub trait TaskSource<C> {
    fn poll(&mut self, ctx: &mut C) -> SourceStatus;
}

impl<C, F> TaskSource<C> for F
where
    F: FnMut(&mut C) -> SourceStatus,
{
    fn poll(&mut self, ctx: &mut C) -> SourceStatus {
        self(ctx)
    }
}

/// Main-thread handle for posting tasks
pub struct LocalPoster<C> {
    queue: Rc<RefCell<VecDeque<LocalTask<C>>>>,
}

impl<C> Clone for LocalPoster<C> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<C> LocalPoster<C> {
    pub fn post_task(&self, task: impl FnOnce(&mut C) + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }
}

/// Thread-safe handle for posting tasks into the loop
pub struct RemotePoster<C> {
    sender: Sender<RemoteTask<C>>,
}

impl<C> Clone for RemotePoster<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> RemotePoster<C> {
    /// Post a task; returns false once the loop is gone
    pub fn post_task(&self, task: impl FnOnce(&mut C) + Send + 'static) -> bool {
        self.sender.send(Box::new(task)).is_ok()
    }
}

/// Requests the loop to stop after the current task
#[derive(Debug, Clone, Default)]
pub struct QuitHandle {
    flag: Rc<Cell<bool>>,
}

impl QuitHandle {
    pub fn quit(&self) {
        self.flag.set(true);
    }

    pub fn is_quit_requested(&self) -> bool {
        self.flag.get()
    }

    fn reset(&self) {
        self.flag.set(false);
    }
}

/// Identifies a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

struct Timer<C> {
    deadline: Instant,
    period: Option<Duration>,
    task: TimerTask<C>,
}

struct RegisteredSource<C> {
    name: &'static str,
    source: Box<dyn TaskSource<C>>,
}

/// Single-threaded cooperative message loop
pub struct MessageLoop<C: 'static> {
    clock: Box<dyn Clock>,
    queue: Rc<RefCell<VecDeque<LocalTask<C>>>>,
    remote_tx: Sender<RemoteTask<C>>,
    remote_rx: Receiver<RemoteTask<C>>,
    timers: BTreeMap<TimerId, Timer<C>>,
    next_timer_id: u64,
    sources: Vec<RegisteredSource<C>>,
    quit: QuitHandle,
    external_quit: Option<&'static AtomicBool>,
    exit_when_idle: bool,
    running: bool,
}

impl<C: 'static> MessageLoop<C> {
    /// Create a loop driven by the system clock
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        let (remote_tx, remote_rx) = mpsc::channel();
        Self {
            clock,
            queue: Rc::new(RefCell::new(VecDeque::new())),
            remote_tx,
            remote_rx,
            timers: BTreeMap::new(),
            next_timer_id: 1,
            sources: Vec::new(),
            quit: QuitHandle::default(),
            external_quit: None,
            exit_when_idle: false,
            running: false,
        }
    }

    pub fn poster(&self) -> LocalPoster<C> {
        LocalPoster {
            queue: Rc::clone(&self.queue),
        }
    }

    pub fn remote_poster(&self) -> RemotePoster<C> {
        RemotePoster {
            sender: self.remote_tx.clone(),
        }
    }

    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }

    pub fn post_task(&self, task: impl FnOnce(&mut C) + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Run `task` once after `delay`
    pub fn post_delayed_task(&mut self, delay: Duration, task: impl FnOnce(&mut C) + 'static) -> TimerId {
        let mut task = Some(task);
        self.insert_timer(delay, None, Box::new(move |ctx: &mut C| {
            if let Some(task) = task.take() {
                task(ctx);
            }
        }))
    }

    /// Run `task` every `period` until stopped
    pub fn start_repeating_timer(&mut self, period: Duration, task: impl FnMut(&mut C) + 'static) -> TimerId {
        let period = period.max(MIN_TIMER_PERIOD);
        self.insert_timer(period, Some(period), Box::new(task))
    }

    fn insert_timer(&mut self, delay: Duration, period: Option<Duration>, task: TimerTask<C>) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        self.timers.insert(
            id,
            Timer {
                deadline: self.clock.now() + delay,
                period,
                task,
            },
        );
        id
    }

    /// Cancel a timer; returns whether it was still scheduled
    pub fn stop_timer(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn is_timer_running(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn add_task_source(&mut self, name: &'static str, source: impl TaskSource<C> + 'static) {
        debug!("Task source registered: {}", name);
        self.sources.push(RegisteredSource {
            name,
            source: Box::new(source),
        });
    }

    pub fn has_task_source(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.name == name)
    }

    /// Return from [`run`](Self::run) as soon as no work is ready
    pub fn set_exit_when_idle(&mut self, exit_when_idle: bool) {
        self.exit_when_idle = exit_when_idle;
    }

    /// Quit when `flag` becomes true (set from a signal handler)
    pub fn watch_quit_flag(&mut self, flag: &'static AtomicBool) {
        self.external_quit = Some(flag);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run until quit is requested
    pub fn run(&mut self, ctx: &mut C) {
        assert!(!self.running, "message loop is not reentrant");
        self.running = true;
        self.quit.reset();
        debug!("Message loop running");

        while !self.should_quit() {
            if self.run_once(ctx) > 0 {
                continue;
            }
            if self.exit_when_idle {
                debug!("Message loop idle, exiting");
                break;
            }
            self.wait_for_work(ctx);
        }

        self.running = false;
        debug!("Message loop stopped");
    }

    /// Run every ready task, due timer and source until nothing is ready.
    /// Returns the number of work items processed.
    pub fn run_until_idle(&mut self, ctx: &mut C) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_once(ctx);
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    fn should_quit(&self) -> bool {
        self.quit.is_quit_requested()
            || self
                .external_quit
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false)
    }

    fn run_once(&mut self, ctx: &mut C) -> usize {
        let mut ran = 0;

        while let Ok(task) = self.remote_rx.try_recv() {
            task(ctx);
            ran += 1;
        }

        // Tasks posted by these tasks wait for the next pass.
        let pending = self.queue.borrow().len();
        for _ in 0..pending {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task(ctx);
                    ran += 1;
                }
                None => break,
            }
        }

        ran += self.fire_due_timers(ctx);

        for registered in &mut self.sources {
            if registered.source.poll(ctx) == SourceStatus::Progressed {
                trace!("Task source {} made progress", registered.name);
                ran += 1;
            }
        }

        ran
    }

    fn fire_due_timers(&mut self, ctx: &mut C) -> usize {
        let now = self.clock.now();
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(id, timer)| (timer.deadline, *id))
            .collect();
        due.sort();

        let mut fired = 0;
        for (_, id) in due {
            let Some(mut timer) = self.timers.remove(&id) else {
                continue;
            };
            (timer.task)(ctx);
            fired += 1;

            if let Some(period) = timer.period {
                let next = timer.deadline + period;
                timer.deadline = if next <= now { now + period } else { next };
                self.timers.insert(id, timer);
            }
        }
        fired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|timer| timer.deadline).min()
    }

    fn wait_for_work(&mut self, ctx: &mut C) {
        let now = self.clock.now();
        let wait = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(MAX_IDLE_WAIT)
            .min(MAX_IDLE_WAIT);

        match self.remote_rx.recv_timeout(wait) {
            Ok(task) => task(ctx),
            Err(RecvTimeoutError::Timeout) => {}
            // The loop keeps its own sender, so this cannot disconnect.
            Err(RecvTimeoutError::Disconnected) => {}
        }
    }
}

impl<C: 'static> Default for MessageLoop<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_loop::ManualClock;

    #[derive(Default)]
    struct Ctx {
        log: Vec<&'static str>,
        ticks: u32,
    }

    #[test]
    fn test_posted_tasks_run_in_order() {
        let mut message_loop = MessageLoop::<Ctx>::new();
        let mut ctx = Ctx::default();
        message_loop.post_task(|c| c.log.push("a"));
        message_loop.post_task(|c| c.log.push("b"));
        message_loop.poster().post_task(|c| c.log.push("c"));

        assert_eq!(message_loop.run_until_idle(&mut ctx), 3);
        assert_eq!(ctx.log, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remote_poster_from_other_thread() {
        let mut message_loop = MessageLoop::<Ctx>::new();
        let poster = message_loop.remote_poster();
        std::thread::spawn(move || {
            assert!(poster.post_task(|c: &mut Ctx| c.log.push("remote")));
        })
        .join()
        .unwrap();

        let mut ctx = Ctx::default();
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.log, vec!["remote"]);
    }

    #[test]
    fn test_repeating_timer_with_manual_clock() {
        let clock = ManualClock::new();
        let mut message_loop = MessageLoop::<Ctx>::with_clock(Box::new(clock.clone()));
        let id = message_loop.start_repeating_timer(Duration::from_secs(60), |c| c.ticks += 1);
        let mut ctx = Ctx::default();

        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.ticks, 0);

        clock.advance(Duration::from_secs(60));
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.ticks, 1);

        clock.advance(Duration::from_secs(60));
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.ticks, 2);

        assert!(message_loop.stop_timer(id));
        assert!(!message_loop.is_timer_running(id));
        clock.advance(Duration::from_secs(120));
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.ticks, 2);
    }

    #[test]
    fn test_delayed_task_fires_once() {
        let clock = ManualClock::new();
        let mut message_loop = MessageLoop::<Ctx>::with_clock(Box::new(clock.clone()));
        let id = message_loop.post_delayed_task(Duration::from_millis(10), |c| c.log.push("late"));
        let mut ctx = Ctx::default();

        clock.advance(Duration::from_millis(10));
        message_loop.run_until_idle(&mut ctx);
        clock.advance(Duration::from_millis(10));
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.log, vec!["late"]);
        assert!(!message_loop.is_timer_running(id));
    }

    #[test]
    fn test_task_source_polled_until_idle() {
        let mut message_loop = MessageLoop::<Ctx>::new();
        message_loop.add_task_source("counter", |c: &mut Ctx| {
            if c.ticks < 3 {
                c.ticks += 1;
                SourceStatus::Progressed
            } else {
                SourceStatus::Idle
            }
        });
        assert!(message_loop.has_task_source("counter"));

        let mut ctx = Ctx::default();
        message_loop.run_until_idle(&mut ctx);
        assert_eq!(ctx.ticks, 3);
    }

    #[test]
    fn test_quit_from_task_stops_run() {
        let mut message_loop = MessageLoop::<Ctx>::new();
        let quit = message_loop.quit_handle();
        let poster = message_loop.poster();
        message_loop.post_task(move |c| {
            c.log.push("first");
            quit.quit();
            poster.post_task(|c| c.log.push("never"));
        });

        let mut ctx = Ctx::default();
        message_loop.run(&mut ctx);
        assert_eq!(ctx.log, vec!["first"]);
        assert!(!message_loop.is_running());
    }

    #[test]
    fn test_exit_when_idle() {
        let mut message_loop = MessageLoop::<Ctx>::new();
        message_loop.set_exit_when_idle(true);
        message_loop.start_repeating_timer(Duration::from_secs(3600), |c| c.ticks += 1);
        message_loop.post_task(|c| c.log.push("only"));

        let mut ctx = Ctx::default();
        message_loop.run(&mut ctx);
        assert_eq!(ctx.log, vec!["only"]);
        assert_eq!(ctx.ticks, 0);
    }

    #[test]
    fn test_external_quit_flag() {
        static FLAG: AtomicBool = AtomicBool::new(false);
        let mut message_loop = MessageLoop::<Ctx>::new();
        message_loop.watch_quit_flag(&FLAG);
        let poster = message_loop.remote_poster();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            poster.post_task(|c: &mut Ctx| c.log.push("before quit"));
            FLAG.store(true, Ordering::SeqCst);
        });

        let mut ctx = Ctx::default();
        message_loop.run(&mut ctx);
        handle.join().unwrap();
        assert!(FLAG.load(Ordering::SeqCst));
    }
}
