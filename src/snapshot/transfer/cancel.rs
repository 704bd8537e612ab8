use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How often blocked halves of a transfer look at their [`CancelScope`].
pub static POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared by both halves of one transfer. Whichever half fails first
/// cancels it, the other half notices and stops.
#[derive(Debug, Default)]
pub struct CancelScope {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` for the call that actually cancelled the scope.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.lock();
        let first = !*cancelled;
        *cancelled = true;
        self.changed.notify_all();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleeps up to `timeout`, waking early on cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let cancelled = self.lock();
        let (cancelled, _) = self
            .changed
            .wait_timeout_while(cancelled, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_only_first_cancel_reports_first() {
        let scope = CancelScope::new();
        assert!(!scope.is_cancelled());
        assert!(scope.check().is_ok());
        assert!(scope.cancel());
        assert!(!scope.cancel());
        assert!(scope.is_cancelled());
        assert!(matches!(scope.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_wait_timeout_times_out() {
        let scope = CancelScope::new();
        assert!(!scope.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let scope = CancelScope::new();
        let start = Instant::now();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                scope.cancel();
            });
            assert!(scope.wait_timeout(Duration::from_secs(30)));
        });
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
