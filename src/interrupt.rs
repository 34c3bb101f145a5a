//! Cancellation shared by a client, the streams it opens and its agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Signal {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable interrupt flag that also wakes tasks waiting on it.
///
/// Raising it from any clone is seen by every other clone. A raised handle
/// stays raised until [`clear`](InterruptHandle::clear).
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    signal: Arc<Signal>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every task waiting in
    /// [`interrupted`](InterruptHandle::interrupted).
    pub fn interrupt(&self) {
        self.signal.raised.store(true, Ordering::SeqCst);
        self.signal.notify.notify_waiters();
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal.raised.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.signal.raised.store(false, Ordering::SeqCst);
    }

    /// Resolve once the flag is raised. Returns at once if it already is.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.signal.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a raise in between is not missed.
            notified.as_mut().enable();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raised_handle_resolves_immediately() {
        let handle = InterruptHandle::new();
        handle.interrupt();
        tokio::time::timeout(Duration::from_millis(100), handle.interrupted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_waiter_is_woken_by_clone() {
        let handle = InterruptHandle::new();
        let raiser = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            raiser.interrupt();
        });

        tokio::time::timeout(Duration::from_secs(2), handle.interrupted())
            .await
            .unwrap();
        assert!(handle.is_interrupted());
    }

    #[test]
    fn test_clear() {
        let handle = InterruptHandle::new();
        handle.interrupt();
        handle.clear();
        assert!(!handle.is_interrupted());
    }
}
