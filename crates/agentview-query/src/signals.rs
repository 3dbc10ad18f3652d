//! Environmental revalidation triggers
//!
//! The host (UI shell, CLI, test) publishes focus/reconnect events here;
//! fetch controllers subscribe and revalidate according to their options.

use tokio::sync::broadcast;

/// Environmental event that may warrant a refetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Host regained foreground focus
    Focus,
    /// Network connectivity restored
    Reconnect,
}

/// Broadcast hub for revalidation signals
#[derive(Debug, Clone)]
pub struct RevalidationSignals {
    sender: broadcast::Sender<Signal>,
}

impl RevalidationSignals {
    /// Create hub buffering up to `capacity` undelivered signals per subscriber
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a signal; returns the number of subscribers reached
    pub fn notify(&self, signal: Signal) -> usize {
        let reached = self.sender.send(signal).unwrap_or(0);
        tracing::debug!(?signal, reached, "revalidation signal");
        reached
    }

    /// Host regained focus
    #[inline]
    pub fn notify_focus(&self) -> usize {
        self.notify(Signal::Focus)
    }

    /// Connectivity restored
    #[inline]
    pub fn notify_reconnect(&self) -> usize {
        self.notify(Signal::Reconnect)
    }

    /// Subscribe to future signals
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RevalidationSignals {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_without_subscribers_is_harmless() {
        let signals = RevalidationSignals::default();
        assert_eq!(signals.notify_focus(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_signals() {
        let signals = RevalidationSignals::default();
        let mut rx = signals.subscribe();

        assert_eq!(signals.notify_reconnect(), 1);
        assert_eq!(rx.recv().await.unwrap(), Signal::Reconnect);
    }
}
