//! Phase state machine
//!
//! The host invokes nine callbacks, each exactly once and in the order of
//! [`HostCallback::ORDER`]. The controller's state is the last callback it
//! accepted, or [`LifecycleState::Created`] before the first one.

use crate::utils::LifecycleError;

/// Phase-entry callbacks the host invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostCallback {
    PreEarlyInitialization,
    PostEarlyInitialization,
    PreCreateThreads,
    PreMainMessageLoopStart,
    PostMainMessageLoopStart,
    PreMainMessageLoopRun,
    MainMessageLoopRun,
    PostMainMessageLoopRun,
    PostDestroyThreads,
}

impl HostCallback {
    /// The only legal invocation order
    pub const ORDER: [HostCallback; 9] = [
        HostCallback::PreEarlyInitialization,
        HostCallback::PostEarlyInitialization,
        HostCallback::PreCreateThreads,
        HostCallback::PreMainMessageLoopStart,
        HostCallback::PostMainMessageLoopStart,
        HostCallback::PreMainMessageLoopRun,
        HostCallback::MainMessageLoopRun,
        HostCallback::PostMainMessageLoopRun,
        HostCallback::PostDestroyThreads,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PreEarlyInitialization => "PreEarlyInitialization",
            Self::PostEarlyInitialization => "PostEarlyInitialization",
            Self::PreCreateThreads => "PreCreateThreads",
            Self::PreMainMessageLoopStart => "PreMainMessageLoopStart",
            Self::PostMainMessageLoopStart => "PostMainMessageLoopStart",
            Self::PreMainMessageLoopRun => "PreMainMessageLoopRun",
            Self::MainMessageLoopRun => "MainMessageLoopRun",
            Self::PostMainMessageLoopRun => "PostMainMessageLoopRun",
            Self::PostDestroyThreads => "PostDestroyThreads",
        }
    }

    fn entered_state(self) -> LifecycleState {
        match self {
            Self::PreEarlyInitialization => LifecycleState::PreEarlyInitialization,
            Self::PostEarlyInitialization => LifecycleState::PostEarlyInitialization,
            Self::PreCreateThreads => LifecycleState::PreCreateThreads,
            Self::PreMainMessageLoopStart => LifecycleState::PreMainMessageLoopStart,
            Self::PostMainMessageLoopStart => LifecycleState::PostMainMessageLoopStart,
            Self::PreMainMessageLoopRun => LifecycleState::PreMainMessageLoopRun,
            Self::MainMessageLoopRun => LifecycleState::MainMessageLoopRun,
            Self::PostMainMessageLoopRun => LifecycleState::PostMainMessageLoopRun,
            Self::PostDestroyThreads => LifecycleState::PostDestroyThreads,
        }
    }
}

/// Where the process is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Created,
    PreEarlyInitialization,
    PostEarlyInitialization,
    PreCreateThreads,
    PreMainMessageLoopStart,
    PostMainMessageLoopStart,
    PreMainMessageLoopRun,
    MainMessageLoopRun,
    PostMainMessageLoopRun,
    PostDestroyThreads,
}

impl LifecycleState {
    /// The callback this state accepts next, if any
    pub fn next_callback(self) -> Option<HostCallback> {
        let index = match self {
            Self::Created => 0,
            Self::PreEarlyInitialization => 1,
            Self::PostEarlyInitialization => 2,
            Self::PreCreateThreads => 3,
            Self::PreMainMessageLoopStart => 4,
            Self::PostMainMessageLoopStart => 5,
            Self::PreMainMessageLoopRun => 6,
            Self::MainMessageLoopRun => 7,
            Self::PostMainMessageLoopRun => 8,
            Self::PostDestroyThreads => return None,
        };
        Some(HostCallback::ORDER[index])
    }

    /// Validate `callback` against the legal order and return the new state
    pub fn advance(self, callback: HostCallback) -> Result<LifecycleState, LifecycleError> {
        match self.next_callback() {
            None => Err(LifecycleError::Finished { callback }),
            Some(expected) if expected == callback => Ok(callback.entered_state()),
            Some(_) => Err(LifecycleError::OutOfOrder {
                state: self,
                callback,
            }),
        }
    }

    pub fn is_finished(self) -> bool {
        self == Self::PostDestroyThreads
    }
}
