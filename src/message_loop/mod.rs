//! Host message loop
//!
//! A single-threaded cooperative dispatcher that owns the main thread while
//! the shell runs. Work reaches it in four ways:
//! - tasks posted from the main thread
//! - tasks posted from other threads through a [`RemotePoster`]
//! - one-shot and repeating timers
//! - task sources polled once per iteration (the embedded runtime's loop)
//!
//! Every task receives `&mut C`, the loop's context, so handlers never need
//! shared mutable state of their own.

mod clock;
mod dispatcher;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{
    LocalPoster, LocalTask, MessageLoop, QuitHandle, RemotePoster, RemoteTask, SourceStatus,
    TaskSource, TimerId,
};
