use std::collections::HashMap;

use tokio::{
    sync::{oneshot, Mutex},
    time::Instant,
};

use crate::error::ProbeError;

/// Identifies one in-flight echo request.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct CorrelationKey {
    pub identifier: u16,
    pub sequence: u16,
}

impl CorrelationKey {
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
        }
    }
}

/// What the receive loop observed for a request, `None` for a plain echo reply.
pub(crate) type Completion = Option<ProbeError>;

/// How a registered request ended.
#[derive(Debug)]
pub(crate) enum Resolution {
    Replied,
    Rejected(ProbeError),
    TimedOut,
}

/// The requester's half of a table entry.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    receiver: oneshot::Receiver<Completion>,
}

impl PendingRequest {
    /// Waits for the completion signal until `deadline`.
    pub(crate) async fn wait_until(self, deadline: Instant) -> Resolution {
        match tokio::time::timeout_at(deadline, self.receiver).await {
            Ok(Ok(None)) => Resolution::Replied,
            Ok(Ok(Some(cause))) => Resolution::Rejected(cause),
            // Only the owning probe removes its entry, so the sender is never
            // dropped unsignalled while someone waits on it.
            Ok(Err(_)) | Err(_) => Resolution::TimedOut,
        }
    }
}

/// Directory of in-flight requests shared between probe tasks and the receive loop.
///
/// Each entry holds the sending half of a one-shot channel. Sending never
/// blocks and tolerates a requester that already stopped listening, so late
/// replies are absorbed without any coordination with the requester.
#[derive(Debug, Default)]
pub(crate) struct CorrelationTable {
    pending: Mutex<HashMap<CorrelationKey, Option<oneshot::Sender<Completion>>>>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh entry for `key`.
    ///
    /// # Panics
    /// If an entry for `key` is still registered, which would mean two probes
    /// share an identifier and sequence number at the same time.
    pub(crate) async fn register(&self, key: CorrelationKey) -> PendingRequest {
        let (sender, receiver) = oneshot::channel();
        let previous = self.pending.lock().await.insert(key, Some(sender));
        assert!(previous.is_none(), "request {key:?} is already in flight");
        PendingRequest { receiver }
    }

    /// Signals the entry for `key`, returns whether anything was signalled.
    ///
    /// Returns `false` for unknown keys and for entries that were already
    /// signalled, e.g. a duplicated reply.
    pub(crate) async fn complete(&self, key: &CorrelationKey, completion: Completion) -> bool {
        let sender = self
            .pending
            .lock()
            .await
            .get_mut(key)
            .and_then(Option::take);
        match sender {
            Some(sender) => {
                let _ = sender.send(completion);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn remove(&self, key: &CorrelationKey) {
        self.pending.lock().await.remove(key);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Per-endpoint sequence numbers, keyed by requester identifier.
#[derive(Debug, Default)]
pub(crate) struct SequenceCounters {
    counters: Mutex<HashMap<u16, u16>>,
}

impl SequenceCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Advances the counter of `identifier` and returns the new value.
    pub(crate) async fn next(&self, identifier: u16) -> u16 {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(identifier).or_insert(0);
        *counter = counter.wrapping_add(1);
        *counter
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn test_complete_wakes_requester() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(1, 1);
        let pending = table.register(key).await;
        assert!(table.complete(&key, None).await);
        let resolution = pending
            .wait_until(Instant::now() + Duration::from_secs(1))
            .await;
        assert!(matches!(resolution, Resolution::Replied));
        table.remove(&key).await;
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn test_complete_carries_cause() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(2, 9);
        let pending = table.register(key).await;
        assert!(
            table
                .complete(&key, Some(ProbeError::DestinationUnreachable { code: 1 }))
                .await
        );
        let resolution = pending
            .wait_until(Instant::now() + Duration::from_secs(1))
            .await;
        assert!(matches!(
            resolution,
            Resolution::Rejected(ProbeError::DestinationUnreachable { code: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_completions() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(3, 3);
        assert!(!table.complete(&key, None).await);

        let _pending = table.register(key).await;
        assert!(table.complete(&key, None).await);
        assert!(!table.complete(&key, None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_reply() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(4, 1);
        let pending = table.register(key).await;
        let resolution = pending
            .wait_until(Instant::now() + Duration::from_millis(200))
            .await;
        assert!(matches!(resolution, Resolution::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_after_timeout_does_not_block() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(5, 1);
        let pending = table.register(key).await;
        let resolution = pending
            .wait_until(Instant::now() + Duration::from_millis(10))
            .await;
        assert!(matches!(resolution, Resolution::TimedOut));

        // The requester stopped listening but has not removed its entry yet.
        assert!(table.complete(&key, None).await);
        table.remove(&key).await;
        assert!(!table.complete(&key, None).await);

        // The key is reusable once the entry is gone.
        let _pending = table.register(key).await;
        assert_eq!(table.len().await, 1);
        assert!(table.complete(&key, None).await);
    }

    #[tokio::test]
    #[should_panic(expected = "already in flight")]
    async fn test_duplicate_registration_panics() {
        let table = CorrelationTable::new();
        let key = CorrelationKey::new(6, 1);
        let _first = table.register(key).await;
        let _second = table.register(key).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_stay_unique() {
        let table = Arc::new(CorrelationTable::new());
        let counters = Arc::new(SequenceCounters::new());
        let tasks: Vec<_> = (0..512u16)
            .map(|n| {
                let table = Arc::clone(&table);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    let identifier = n % 4;
                    let key = CorrelationKey::new(identifier, counters.next(identifier).await);
                    let pending = table.register(key).await;
                    if n % 2 == 0 {
                        table.complete(&key, None).await;
                    }
                    pending
                        .wait_until(Instant::now() + Duration::from_millis(20))
                        .await;
                    table.remove(&key).await;
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn test_sequence_counters_are_independent() {
        let counters = SequenceCounters::new();
        assert_eq!(counters.next(0).await, 1);
        assert_eq!(counters.next(0).await, 2);
        assert_eq!(counters.next(1).await, 1);
        assert_eq!(counters.next(0).await, 3);
    }

    #[tokio::test]
    async fn test_sequence_counter_wraps() {
        let counters = SequenceCounters::new();
        for expected in 1..=u16::MAX {
            assert_eq!(counters.next(7).await, expected);
        }
        assert_eq!(counters.next(7).await, 0);
        assert_eq!(counters.next(7).await, 1);
    }
}
