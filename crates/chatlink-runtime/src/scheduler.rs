//! Sync Scheduler
//!
//! Turns intents into bounded, retryable, cancellable units of work. Each
//! unit is identified by a [`TaskKey`]; scheduling a key that is already in
//! flight coalesces into the existing task instead of issuing a duplicate
//! request, which also serializes requests within one key.
//!
//! Worker tasks never touch the stores. They report a [`TaskCompletion`] on
//! the outcome channel and the engine task applies it, so an aborted task
//! can never leave a partial merge behind. A generation counter guards the
//! other half of that invariant: completions from cancelled or superseded
//! tasks fail the [`SyncScheduler::finish`] check and are discarded.

use chatlink_core::{
    Backend, FriendRecord, IntentKind, MessageRecord, RetryConfig, StatusRecord, Timestamp,
    TransportError, Username,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Task Identity
// ----------------------------------------------------------------------------

/// Logical identity of a scheduled unit of work, used for coalescing and
/// cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Friend-list refresh. Never cancelled by peer switches.
    FriendList,
    /// Optimistic friend add awaiting backend confirmation.
    AddFriend(Username),
    /// History fetch for one peer.
    History(Username),
    /// One optimistic send. Never cancelled by peer switches.
    Send(Uuid),
    /// Backend availability probe.
    Probe,
}

// ----------------------------------------------------------------------------
// Task Outcomes
// ----------------------------------------------------------------------------

/// Payload of a completed unit of work.
#[derive(Debug)]
pub enum TaskOutcome {
    FriendsFetched {
        result: Result<Vec<FriendRecord>, TransportError>,
    },
    FriendAdded {
        username: Username,
        result: Result<FriendRecord, TransportError>,
    },
    HistoryFetched {
        peer: Username,
        requested_limit: usize,
        /// Intent the fetch was issued for, for failure attribution.
        origin: IntentKind,
        result: Result<Vec<MessageRecord>, TransportError>,
    },
    MessageSent {
        peer: Username,
        local_id: Uuid,
        result: Result<MessageRecord, TransportError>,
    },
    StatusProbed {
        result: Result<StatusRecord, TransportError>,
    },
}

/// A completed unit of work, reported to the engine task.
#[derive(Debug)]
pub struct TaskCompletion {
    pub key: TaskKey,
    pub generation: u64,
    pub outcome: TaskOutcome,
}

pub type OutcomeSender = tokio::sync::mpsc::Sender<TaskCompletion>;
pub type OutcomeReceiver = tokio::sync::mpsc::Receiver<TaskCompletion>;

/// Create the bounded outcome channel (workers → engine).
pub fn create_outcome_channel(buffer_size: usize) -> (OutcomeSender, OutcomeReceiver) {
    tokio::sync::mpsc::channel(buffer_size)
}

// ----------------------------------------------------------------------------
// Retry Loop
// ----------------------------------------------------------------------------

/// Run `op` until it succeeds, fails terminally, or exhausts the configured
/// attempts. Only transient failures are retried; each attempt carries its
/// own transport timeout budget.
pub async fn run_with_retry<T, F, Fut>(retry: &RetryConfig, mut op: F) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff_for_attempt(attempt);
                debug!(%err, attempt, ?delay, "transient transport failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct InFlight {
    handle: JoinHandle<()>,
    generation: u64,
}

/// Statistics for scheduled work.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub spawned: u64,
    pub coalesced: u64,
    pub cancelled: u64,
}

/// Coordinates background fetch, send, and probe tasks.
pub struct SyncScheduler {
    backend: Arc<dyn Backend>,
    retry: RetryConfig,
    outcome_sender: OutcomeSender,
    in_flight: HashMap<TaskKey, InFlight>,
    next_generation: u64,
    stats: SchedulerStats,
}

impl SyncScheduler {
    pub fn new(backend: Arc<dyn Backend>, retry: RetryConfig, outcome_sender: OutcomeSender) -> Self {
        Self {
            backend,
            retry,
            outcome_sender,
            in_flight: HashMap::new(),
            next_generation: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Whether a task with this key is currently in flight.
    pub fn is_in_flight(&self, key: &TaskKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Number of tasks currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Schedule a friend-list refresh. Returns false when coalesced into an
    /// in-flight refresh.
    pub fn schedule_friend_list(&mut self) -> bool {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        self.spawn(TaskKey::FriendList, async move {
            let result = run_with_retry(&retry, || {
                let backend = Arc::clone(&backend);
                async move { backend.list_friends().await }
            })
            .await;
            TaskOutcome::FriendsFetched { result }
        })
    }

    /// Schedule the backend call behind an optimistic friend add.
    pub fn schedule_add_friend(&mut self, username: Username) -> bool {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let call_username = username.clone();
        self.spawn(TaskKey::AddFriend(username.clone()), async move {
            let result = run_with_retry(&retry, || {
                let backend = Arc::clone(&backend);
                let username = call_username.clone();
                async move { backend.add_friend(&username).await }
            })
            .await;
            TaskOutcome::FriendAdded { username, result }
        })
    }

    /// Schedule a history page fetch for `peer`. Coalesces with any in-flight
    /// fetch for the same peer.
    pub fn schedule_history(
        &mut self,
        peer: Username,
        limit: usize,
        before: Option<Timestamp>,
        origin: IntentKind,
    ) -> bool {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let call_peer = peer.clone();
        self.spawn(TaskKey::History(peer.clone()), async move {
            let result = run_with_retry(&retry, || {
                let backend = Arc::clone(&backend);
                let peer = call_peer.clone();
                async move { backend.fetch_messages(&peer, limit, before).await }
            })
            .await;
            TaskOutcome::HistoryFetched {
                peer,
                requested_limit: limit,
                origin,
                result,
            }
        })
    }

    /// Schedule the backend send behind an optimistic message.
    pub fn schedule_send(&mut self, peer: Username, local_id: Uuid, text: String) -> bool {
        let backend = Arc::clone(&self.backend);
        let retry = self.retry.clone();
        let call_peer = peer.clone();
        self.spawn(TaskKey::Send(local_id), async move {
            let result = run_with_retry(&retry, move || {
                let backend = Arc::clone(&backend);
                let peer = call_peer.clone();
                let text = text.clone();
                async move { backend.send_message(&peer, &text).await }
            })
            .await;
            TaskOutcome::MessageSent {
                peer,
                local_id,
                result,
            }
        })
    }

    /// Schedule an availability probe. Single attempt: the next tick probes
    /// again anyway.
    pub fn schedule_probe(&mut self) -> bool {
        let backend = Arc::clone(&self.backend);
        self.spawn(TaskKey::Probe, async move {
            let result = backend.status().await;
            TaskOutcome::StatusProbed { result }
        })
    }

    /// Cancel the in-flight task for `key`, if any. The task is aborted and
    /// its completion, if already queued, will fail the [`Self::finish`]
    /// check.
    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        match self.in_flight.remove(key) {
            Some(task) => {
                task.handle.abort();
                self.stats.cancelled += 1;
                debug!(?key, "cancelled in-flight task");
                true
            }
            None => false,
        }
    }

    /// Cancel a redundant history fetch for `peer` (on peer switch).
    pub fn cancel_history(&mut self, peer: &Username) -> bool {
        self.cancel(&TaskKey::History(peer.clone()))
    }

    /// Acknowledge a completion. Returns true when the completion belongs to
    /// the current in-flight task for its key; false means the task was
    /// cancelled or superseded and the completion must be discarded without
    /// touching any store.
    pub fn finish(&mut self, key: &TaskKey, generation: u64) -> bool {
        match self.in_flight.get(key) {
            Some(task) if task.generation == generation => {
                self.in_flight.remove(key);
                true
            }
            _ => false,
        }
    }

    fn spawn<F>(&mut self, key: TaskKey, work: F) -> bool
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        if self.in_flight.contains_key(&key) {
            self.stats.coalesced += 1;
            debug!(?key, "coalescing into in-flight task");
            return false;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let sender = self.outcome_sender.clone();
        let completion_key = key.clone();

        let handle = tokio::spawn(async move {
            let outcome = work.await;
            let _ = sender
                .send(TaskCompletion {
                    key: completion_key,
                    generation,
                    outcome,
                })
                .await;
        });

        self.in_flight.insert(key, InFlight { handle, generation });
        self.stats.spawned += 1;
        true
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        for task in self.in_flight.values() {
            task.handle.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = run_with_retry(&fast_retry(3), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TransportError::ConnectionRefused)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts_on_persistent_timeouts() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = run_with_retry(&fast_retry(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Timeout { timeout_ms: 1 }) }
        })
        .await;

        assert!(matches!(result, Err(TransportError::Timeout { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, _> = run_with_retry(&fast_retry(3), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                Err(TransportError::Status {
                    code: 404,
                    detail: "missing".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finish_rejects_cancelled_generation() {
        struct NeverBackend;

        #[async_trait::async_trait]
        impl Backend for NeverBackend {
            async fn status(&self) -> Result<StatusRecord, TransportError> {
                futures::future::pending().await
            }
            async fn list_friends(&self) -> Result<Vec<FriendRecord>, TransportError> {
                futures::future::pending().await
            }
            async fn add_friend(&self, _: &Username) -> Result<FriendRecord, TransportError> {
                futures::future::pending().await
            }
            async fn fetch_messages(
                &self,
                _: &Username,
                _: usize,
                _: Option<Timestamp>,
            ) -> Result<Vec<MessageRecord>, TransportError> {
                futures::future::pending().await
            }
            async fn send_message(
                &self,
                _: &Username,
                _: &str,
            ) -> Result<MessageRecord, TransportError> {
                futures::future::pending().await
            }
        }

        let (outcome_sender, _outcome_receiver) = create_outcome_channel(8);
        let mut scheduler =
            SyncScheduler::new(Arc::new(NeverBackend), fast_retry(1), outcome_sender);

        let peer = Username::new("alice").unwrap();
        assert!(scheduler.schedule_history(peer.clone(), 10, None, IntentKind::SelectPeer));
        assert!(scheduler.is_in_flight(&TaskKey::History(peer.clone())));

        // Coalesce while in flight.
        assert!(!scheduler.schedule_history(peer.clone(), 10, None, IntentKind::SelectPeer));

        // Cancel, then a late completion for the old generation is rejected.
        assert!(scheduler.cancel_history(&peer));
        assert!(!scheduler.finish(&TaskKey::History(peer.clone()), 1));

        // A fresh schedule gets a fresh generation that does finish.
        assert!(scheduler.schedule_history(peer.clone(), 10, None, IntentKind::SelectPeer));
        assert!(scheduler.finish(&TaskKey::History(peer), 2));
    }
}
