//! Cooperative cancellation.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A shareable "halt requested" flag.  The interpreter polls it before each command
/// and at each loop iteration; a host may clone the handle onto another thread (say, a
/// watchdog that enforces a wall-clock timeout) and request a halt from there.
///
/// ```
/// use ember::Interp;
///
/// let mut interp = Interp::new();
/// interp.halt_handle().request();
/// let err = interp.eval("set a 1", &mut ()).unwrap_err();
/// assert_eq!(err.value().as_str(), "eval canceled");
///
/// // The flag is cleared once the cancellation reaches the top level.
/// assert!(interp.eval("set a 1", &mut ()).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HaltHandle {
    flag: Arc<AtomicBool>,
}

impl HaltHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the interpreter to stop at the next poll point.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_across_threads() {
        let handle = HaltHandle::new();
        let remote = handle.clone();

        std::thread::spawn(move || remote.request())
            .join()
            .expect("thread");

        assert!(handle.is_requested());
        handle.reset();
        assert!(!handle.is_requested());
    }
}
