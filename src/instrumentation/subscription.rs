//! Release-once subscription guard shared by the session and the diagnostic bus.

use std::fmt;
use std::sync::{Mutex, PoisonError};

type Release = Box<dyn FnOnce() + Send>;

/// Owns the right to stop receiving events.
///
/// The release action runs exactly once: on the first call to
/// [`release`](Self::release) or when the guard is dropped, whichever comes
/// first.
pub struct Subscription {
    release: Mutex<Option<Release>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Stop receiving events. Later calls are no-ops.
    pub fn release(&self) {
        let action = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_released(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.is_released())
            .finish()
    }
}
