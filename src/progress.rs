//! Progress reporting and cooperative cancellation.
//!
//! Long-running entry points take a `&dyn ProgressListener`. They announce the
//! amount of work, report increments and call
//! [`ProgressListener::check_for_cancel`] at fixed points; a listener that wants
//! the computation to stop returns [`SplitNetError::Canceled`] from there.

use crate::error::{Result, SplitNetError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub trait ProgressListener {
    fn set_maximum(&self, maximum: u64);
    fn set_progress(&self, value: u64);
    fn increment(&self);
    fn check_for_cancel(&self) -> Result<()>;
}

/// Listener that ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn set_maximum(&self, _maximum: u64) {}
    fn set_progress(&self, _value: u64) {}
    fn increment(&self) {}
    fn check_for_cancel(&self) -> Result<()> {
        Ok(())
    }
}

/// Thread-safe listener backed by atomics.
///
/// Clones share state, so one clone can be handed to a worker while another
/// stays with the caller to [`cancel`](CancelToken::cancel) or poll progress.
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    canceled: AtomicBool,
    maximum: AtomicU64,
    progress: AtomicU64,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Relaxed)
    }

    pub fn maximum(&self) -> u64 {
        self.inner.maximum.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> u64 {
        self.inner.progress.load(Ordering::Relaxed)
    }
}

impl ProgressListener for CancelToken {
    fn set_maximum(&self, maximum: u64) {
        self.inner.maximum.store(maximum, Ordering::Relaxed);
    }

    fn set_progress(&self, value: u64) {
        self.inner.progress.store(value, Ordering::Relaxed);
    }

    fn increment(&self) {
        self.inner.progress.fetch_add(1, Ordering::Relaxed);
    }

    fn check_for_cancel(&self) -> Result<()> {
        if self.is_canceled() {
            Err(SplitNetError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_never_cancels() {
        let p = NoProgress;
        p.set_maximum(10);
        p.increment();
        assert!(p.check_for_cancel().is_ok());
    }

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let worker = token.clone();
        worker.set_maximum(5);
        worker.increment();
        worker.increment();
        assert_eq!(token.maximum(), 5);
        assert_eq!(token.progress(), 2);
        assert!(worker.check_for_cancel().is_ok());

        token.cancel();
        let err = worker.check_for_cancel().unwrap_err();
        assert!(err.is_canceled());
    }
}
