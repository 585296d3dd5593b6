//! Host process surrogate and the services it owns

pub mod browser_process;
pub mod geolocation;
pub mod prefs;
pub mod profile;
pub mod shutdown;
pub mod worker;

pub use browser_process::{HostProcess, HostService, TrackingStatus};
pub use geolocation::{AccessTokenStore, GeolocationDelegate, ShellGeolocationDelegate};
pub use prefs::{PrefService, names as pref_names};
pub use profile::{DEFAULT_PROFILE_NAME, ExitType, Profile, ProfileManager, ProfileRef};
pub use shutdown::{RestartFlags, ShutdownSequence};
pub use worker::{RundownCounter, WorkerHandle, WorkerQueue, WorkerTask, flush_worker_queues};
