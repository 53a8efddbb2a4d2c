//! Cooperative cancellation for long-running cascades.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CoreError;

/// Cooperative cancellation flag shared between a caller and a running cascade.
///
/// Clones observe the same flag. The engine polls it between per-node steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`CoreError::Cancelled`] once cancellation was requested
    pub fn check(&self, operation: &str) -> Result<(), CoreError> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }
}
