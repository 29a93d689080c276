//! Advisory cancellation for a batch of operations. Checked between
//! operations in a transaction, not pre-empted mid-operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable, shareable cancellation flag plus the reason it was raised.
/// Cloning shares the same underlying flag: cancelling any clone cancels
/// all of them.
#[derive(Clone, Default)]
pub struct Cancel {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: parking_lot::Mutex<Option<String>>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        *self.inner.reason.lock() = Some(reason.into());
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> crate::error::CResult<()> {
        if self.is_cancelled() {
            let reason = self.inner.reason.lock().clone().unwrap_or_default();
            return Err(crate::error::Error::Cancelled(reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncancelled_check_passes() {
        let c = Cancel::new();
        assert!(c.check().is_ok());
    }

    #[test]
    fn cancelled_check_fails() {
        let c = Cancel::new();
        c.cancel("shutting down");
        let err = c.check().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let c = Cancel::new();
        let clone = c.clone();
        clone.cancel("stop");
        assert!(c.is_cancelled());
    }
}
