//! Returning free heap pages to the operating system

use log::trace;

/// Gives unused allocator memory back to the OS
#[cfg_attr(test, mockall::automock)]
pub trait MemoryReleaser {
    fn release_free_memory(&mut self);
}

/// Releases memory held by the process allocator
#[derive(Debug, Default)]
pub struct AllocatorReleaser {
    releases: u64,
}

impl AllocatorReleaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of release requests served
    pub fn releases(&self) -> u64 {
        self.releases
    }
}

impl MemoryReleaser for AllocatorReleaser {
    fn release_free_memory(&mut self) {
        self.releases += 1;

        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            // SAFETY: malloc_trim has no preconditions; 0 keeps no extra padding.
            let trimmed = unsafe { nix::libc::malloc_trim(0) };
            trace!("malloc_trim released memory: {}", trimmed != 0);
        }

        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        trace!("Allocator has no release hook on this platform");
    }
}
