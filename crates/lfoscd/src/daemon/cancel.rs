//! Cooperative cancellation shared by the daemon and its listeners.

use std::sync::Arc;

use tokio::sync::watch;

/// Level-triggered cancellation flag.
///
/// Blocking workers poll [`CancelToken::is_cancelled`] between iterations;
/// async workers await [`CancelObserver::cancelled`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Builds an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Cancels every clone of the token. Repeated calls have no effect.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Future-friendly view of the token.
    #[must_use]
    pub fn observer(&self) -> CancelObserver {
        CancelObserver {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Awaitable handle on a [`CancelToken`].
#[derive(Debug)]
pub struct CancelObserver {
    receiver: watch::Receiver<bool>,
}

impl CancelObserver {
    /// Resolves once the token is cancelled.
    pub async fn cancelled(mut self) {
        // The sender lives as long as any token clone, so an error only means
        // the token was dropped and nothing is left to cancel.
        let _ = self.receiver.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_observe_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn observers_wake_on_cancel() {
        let token = CancelToken::new();
        let observer = token.observer();
        let waiter = tokio::spawn(observer.cancelled());
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("observer woke")
            .expect("observer task");
    }

    #[tokio::test]
    async fn late_observers_resolve_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.observer().cancelled())
            .await
            .expect("already cancelled");
    }
}
