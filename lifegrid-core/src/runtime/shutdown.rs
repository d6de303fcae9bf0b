//! Graceful shutdown handling
//!
//! A Quit or Terminate request flips the signal; the server loop in each
//! binary waits on it and drains in-flight calls before returning.

use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown signal shared between request handlers and the serving loop
///
/// Receivers that subscribe after the signal fired still observe it.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create a new, untriggered signal
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    /// Whether shutdown has been triggered
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // Err means the sender is gone, which cannot happen while self holds it
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.wait().await;
            42
        });

        signal.shutdown();

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_late_waiter_sees_signal() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), signal.wait())
            .await
            .expect("late waiter should not block");
    }
}
