use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Wake-up for inventory changes.
///
/// Every subscriber owns a one-slot channel. A notify that finds the slot
/// occupied is dropped: the pending wake-up already covers it, and readers
/// always re-read the registry rather than trusting a payload.
#[derive(Debug, Default)]
pub struct ChangeSignal {
    subscribers: Mutex<Vec<mpsc::Sender<()>>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<()> {
        let (sender, receiver) = mpsc::channel(1);
        let mut subscribers = self.subscribers.lock().expect("poisoned");
        subscribers.retain(|existing| !existing.is_closed());
        subscribers.push(sender);
        receiver
    }

    /// Wake every live subscriber, pruning ones whose receiver is gone.
    /// Returns how many subscribers remain.
    pub fn notify(&self) -> usize {
        let mut subscribers = self.subscribers.lock().expect("poisoned");
        subscribers.retain(|sender| match sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Closed(())) => false,
        });
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn notifications_coalesce_into_one_wakeup() {
        let signal = ChangeSignal::new();
        let mut receiver = signal.subscribe();

        signal.notify();
        signal.notify();
        signal.notify();

        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn every_subscriber_is_woken() {
        let signal = ChangeSignal::new();
        let mut first = signal.subscribe();
        let mut second = signal.subscribe();

        assert_eq!(signal.notify(), 2);

        assert!(first.try_recv().is_ok());
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let signal = ChangeSignal::new();
        let kept = signal.subscribe();
        drop(signal.subscribe());
        assert_eq!(signal.subscriber_count(), 2);

        assert_eq!(signal.notify(), 1);
        assert_eq!(signal.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn subscribe_prunes_closed_sessions_without_a_notify() {
        let signal = ChangeSignal::new();
        for _ in 0..10 {
            drop(signal.subscribe());
        }
        let live = signal.subscribe();
        assert_eq!(signal.subscriber_count(), 1);
        drop(live);
    }

    #[test]
    fn no_wakeup_without_notify() {
        let signal = ChangeSignal::new();
        let mut receiver = signal.subscribe();
        assert!(receiver.try_recv().is_err());
    }
}
