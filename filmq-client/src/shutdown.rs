//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared between the signal handler and the session.
///
/// The session polls it between frames; an in-flight frame transfer is never
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_shared_across_clones() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        assert!(!shutdown.is_triggered());

        handle.trigger();
        assert!(shutdown.is_triggered());
        assert!(handle.is_triggered());
    }
}
