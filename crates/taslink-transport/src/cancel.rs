use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared, clonable shutdown flag.
///
/// Once cancelled a token stays cancelled. Long-running loops check it before
/// starting new I/O; blocking waits pair it with their own wake-up mechanism.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
