//! Main-thread affinity guard
//!
//! GPU objects belong to the thread that created the context. The guard
//! remembers its construction thread; violations panic in debug builds and
//! are logged and skipped in release builds.

use std::thread::{self, ThreadId};

/// Captures the constructing thread and verifies later calls happen there.
#[derive(Debug)]
pub struct ThreadGuard {
    owner: ThreadId,
}

impl ThreadGuard {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// True when the calling thread is the owning thread
    #[inline]
    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Verify the calling thread. Panics in debug builds on violation;
    /// in release builds logs an error and returns false so the caller
    /// can skip the operation.
    pub fn check(&self, operation: &str) -> bool {
        if self.is_owner() {
            return true;
        }
        debug_assert!(
            false,
            "GPU operation '{operation}' called off the device thread"
        );
        log::error!(
            "GPU operation '{}' called from {:?}, expected device thread {:?}; skipping",
            operation,
            thread::current().id(),
            self.owner
        );
        false
    }
}

impl Default for ThreadGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_thread_passes() {
        let guard = ThreadGuard::new();
        assert!(guard.is_owner());
        assert!(guard.check("test"));
    }

    #[test]
    fn test_other_thread_detected() {
        let guard = ThreadGuard::new();
        let is_owner = thread::scope(|s| s.spawn(|| guard.is_owner()).join().unwrap());
        assert!(!is_owner);
    }
}
