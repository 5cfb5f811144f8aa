use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Cooperative cancellation signal shared by the consumption loop, its
/// fetches and publishes. Clones observe the same signal.
#[derive(Clone, Debug)]
pub struct Context {
    shutdown: Arc<AtomicBool>,
    notifier: broadcast::Sender<()>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(1);
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            notifier,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Triggers cancellation. Repeated calls are no-ops.
    pub fn cancel(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.notifier.send(());
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        // Subscribe before checking the flag so a concurrent cancel is never missed.
        let mut receiver = self.notifier.subscribe();
        if self.is_cancelled() {
            return;
        }
        let _ = receiver.recv().await;
    }
}
