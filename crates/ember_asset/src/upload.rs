//! Two-stage upload lifecycle for GPU-backed resources
//!
//! Workers build CPU-side data and observe the state without locking; only
//! the device thread transitions into `Uploading` and beyond. Transitions
//! are one-way: NotUploaded -> Uploading -> Uploaded | Failed.

use std::sync::atomic::{AtomicU32, Ordering};

/// Upload lifecycle stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UploadState {
    NotUploaded,
    Uploading,
    Uploaded,
    Failed,
}

impl UploadState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NotUploaded,
            1 => Self::Uploading,
            2 => Self::Uploaded,
            _ => Self::Failed,
        }
    }

    fn raw(self) -> u32 {
        match self {
            Self::NotUploaded => 0,
            Self::Uploading => 1,
            Self::Uploaded => 2,
            Self::Failed => 3,
        }
    }
}

/// Atomic cell holding an [`UploadState`], readable from any thread.
#[derive(Debug)]
pub struct UploadStateCell(AtomicU32);

impl UploadStateCell {
    pub fn new() -> Self {
        Self(AtomicU32::new(UploadState::NotUploaded.raw()))
    }

    pub fn get(&self) -> UploadState {
        UploadState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Attempt a forward transition. Returns false (and leaves the cell
    /// untouched) when `from` is not the current state or when the move
    /// would regress the lifecycle.
    pub fn transition(&self, from: UploadState, to: UploadState) -> bool {
        let legal = matches!(
            (from, to),
            (UploadState::NotUploaded, UploadState::Uploading)
                | (UploadState::Uploading, UploadState::Uploaded)
                | (UploadState::Uploading, UploadState::Failed)
        );
        if !legal {
            return false;
        }
        self.0
            .compare_exchange(from.raw(), to.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_uploaded(&self) -> bool {
        self.get() == UploadState::Uploaded
    }
}

impl Default for UploadStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let cell = UploadStateCell::new();
        assert_eq!(cell.get(), UploadState::NotUploaded);
        assert!(cell.transition(UploadState::NotUploaded, UploadState::Uploading));
        assert!(cell.transition(UploadState::Uploading, UploadState::Uploaded));
        assert!(cell.is_uploaded());
    }

    #[test]
    fn test_no_regression() {
        let cell = UploadStateCell::new();
        cell.transition(UploadState::NotUploaded, UploadState::Uploading);
        cell.transition(UploadState::Uploading, UploadState::Failed);
        // Failed is terminal
        assert!(!cell.transition(UploadState::Failed, UploadState::Uploading));
        assert!(!cell.transition(UploadState::Uploading, UploadState::Uploaded));
        assert_eq!(cell.get(), UploadState::Failed);
    }

    #[test]
    fn test_stale_from_rejected() {
        let cell = UploadStateCell::new();
        assert!(!cell.transition(UploadState::Uploading, UploadState::Uploaded));
        assert_eq!(cell.get(), UploadState::NotUploaded);
    }
}
