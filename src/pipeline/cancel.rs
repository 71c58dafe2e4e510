//! Cooperative cancellation shared between the CLI signal handler and the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Checked by the execution loop before each stage. An in-flight backend call
/// is never interrupted; it completes or times out first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}
