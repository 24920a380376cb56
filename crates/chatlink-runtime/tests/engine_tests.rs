//! Integration tests for the sync engine
//!
//! Drives a full [`ClientRuntime`] against a scripted stub backend and
//! observes the notification stream: optimistic updates, reconciliation,
//! coalescing, retry exhaustion, and availability reporting.

use chatlink_core::{
    Backend, EngineConfig, FriendRecord, FriendStatus, Intent, IntentKind, IntentSender,
    MessageRecord, MessageState, Notification, NotificationReceiver, ServerId, StatusRecord,
    SystemTimeSource, TimeSource, Timestamp, TransportError, Username,
};
use chatlink_runtime::ClientRuntime;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Stub Backend
// ----------------------------------------------------------------------------

/// Scripted backend with call counters for coalescing and retry assertions.
#[derive(Default)]
struct StubBackend {
    friends: Mutex<Vec<FriendRecord>>,
    messages: Mutex<HashMap<String, Vec<MessageRecord>>>,
    fail_sends_with: Option<TransportError>,
    fail_add_friend_with: Option<TransportError>,
    history_delay: Option<Duration>,
    next_id: AtomicI64,
    list_friends_calls: AtomicU32,
    fetch_calls: AtomicU32,
    send_calls: AtomicU32,
    last_before: Mutex<Option<Timestamp>>,
}

impl StubBackend {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    fn with_friends(self, names: &[&str]) -> Self {
        *self.friends.lock().unwrap() = names
            .iter()
            .map(|n| FriendRecord {
                username: n.to_string(),
            })
            .collect();
        self
    }

    fn with_history(self, peer: &str, records: Vec<MessageRecord>) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(peer.to_string(), records);
        self
    }

    fn failing_sends(mut self, err: TransportError) -> Self {
        self.fail_sends_with = Some(err);
        self
    }

    fn failing_add_friend(mut self, err: TransportError) -> Self {
        self.fail_add_friend_with = Some(err);
        self
    }

    fn with_history_delay(mut self, delay: Duration) -> Self {
        self.history_delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl Backend for StubBackend {
    async fn status(&self) -> Result<StatusRecord, TransportError> {
        Ok(StatusRecord {
            status: "ok".to_string(),
            username: Some("me".to_string()),
        })
    }

    async fn list_friends(&self) -> Result<Vec<FriendRecord>, TransportError> {
        self.list_friends_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn add_friend(&self, username: &Username) -> Result<FriendRecord, TransportError> {
        if let Some(err) = &self.fail_add_friend_with {
            return Err(err.clone());
        }
        let record = FriendRecord {
            username: username.as_str().to_string(),
        };
        self.friends.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn fetch_messages(
        &self,
        peer: &Username,
        limit: usize,
        before: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_before.lock().unwrap() = before;
        if let Some(delay) = self.history_delay {
            tokio::time::sleep(delay).await;
        }
        let messages = self.messages.lock().unwrap();
        let mut page: Vec<MessageRecord> = messages
            .get(peer.as_str())
            .map(|m| m.clone())
            .unwrap_or_default();
        if let Some(before) = before {
            page.retain(|m| m.sent_at < before);
        }
        page.sort_by_key(|m| std::cmp::Reverse(m.sent_at));
        page.truncate(limit);
        Ok(page)
    }

    async fn send_message(
        &self,
        to: &Username,
        text: &str,
    ) -> Result<MessageRecord, TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fail_sends_with {
            return Err(err.clone());
        }
        let record = MessageRecord {
            id: ServerId::Int(self.next_id.fetch_add(1, Ordering::SeqCst)),
            from: "me".to_string(),
            to: to.as_str().to_string(),
            text: text.to_string(),
            sent_at: SystemTimeSource.now(),
        };
        self.messages
            .lock()
            .unwrap()
            .entry(to.as_str().to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }
}

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn incoming(peer: &str, id: i64, text: &str, sent_at: u64) -> MessageRecord {
    MessageRecord {
        id: ServerId::Int(id),
        from: peer.to_string(),
        to: "me".to_string(),
        text: text.to_string(),
        sent_at: Timestamp::from_millis(sent_at),
    }
}

fn start_runtime(
    stub: Arc<StubBackend>,
) -> (ClientRuntime, IntentSender, NotificationReceiver) {
    let mut runtime = ClientRuntime::new(stub, EngineConfig::testing());
    runtime.start().expect("runtime should start");
    let intents = runtime.intent_sender().unwrap().clone();
    let notifications = runtime.take_notification_receiver().unwrap();
    (runtime, intents, notifications)
}

/// Receive notifications until `pred` matches, returning the match and
/// everything seen before it.
async fn wait_for<F>(
    notifications: &mut NotificationReceiver,
    mut pred: F,
) -> (Notification, Vec<Notification>)
where
    F: FnMut(&Notification) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let notification = timeout(Duration::from_secs(2), notifications.recv())
            .await
            .expect("notification should arrive within timeout")
            .expect("notification channel should stay open");
        if pred(&notification) {
            return (notification, seen);
        }
        seen.push(notification);
    }
}

fn last_friend_list(seen: &[Notification]) -> Option<&Vec<chatlink_core::Friend>> {
    seen.iter().rev().find_map(|n| match n {
        Notification::FriendsChanged { friends } => Some(friends),
        _ => None,
    })
}

// ----------------------------------------------------------------------------
// Startup and Friend Reconciliation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_startup_reports_connected_and_reconciles_friends() {
    let stub = Arc::new(StubBackend::new().with_friends(&["alice", "bob"]));
    let (_runtime, _intents, mut notifications) = start_runtime(stub);

    let (changed, seen) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::FriendsChanged { .. })
    })
    .await;

    let Notification::FriendsChanged { friends } = changed else {
        unreachable!()
    };
    assert_eq!(friends.len(), 2);
    assert!(friends.iter().all(|f| f.status == FriendStatus::Confirmed));

    // The connected indicator flips on the first successful exchange; probe
    // and friend-list completions race, so it may precede or follow.
    let already_connected = seen
        .iter()
        .any(|n| matches!(n, Notification::BackendStatusChanged { connected: true }));
    if !already_connected {
        wait_for(&mut notifications, |n| {
            matches!(n, Notification::BackendStatusChanged { connected: true })
        })
        .await;
    }
}

#[tokio::test]
async fn test_add_friend_shows_pending_then_confirmed() {
    let stub = Arc::new(StubBackend::new());
    let (_runtime, intents, mut notifications) = start_runtime(stub);

    intents
        .send(Intent::AddFriend {
            username: "alice".to_string(),
        })
        .await
        .unwrap();

    let (pending, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::FriendsChanged { friends }
            if friends.iter().any(|f| f.username.as_str() == "alice"))
    })
    .await;
    let Notification::FriendsChanged { friends } = pending else {
        unreachable!()
    };
    assert_eq!(friends[0].status, FriendStatus::Pending);

    wait_for(&mut notifications, |n| {
        matches!(n, Notification::FriendsChanged { friends }
            if friends.iter().any(|f| {
                f.username.as_str() == "alice" && f.status == FriendStatus::Confirmed
            }))
    })
    .await;
}

#[tokio::test]
async fn test_add_friend_conflict_rolls_back_pending_entry() {
    let stub = Arc::new(StubBackend::new().failing_add_friend(TransportError::Status {
        code: 409,
        detail: "friend already exists".to_string(),
    }));
    let (_runtime, intents, mut notifications) = start_runtime(stub);

    intents
        .send(Intent::AddFriend {
            username: "alice".to_string(),
        })
        .await
        .unwrap();

    let (failed, seen) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::OperationFailed { intent: IntentKind::AddFriend, .. })
    })
    .await;

    let Notification::OperationFailed { reason, .. } = failed else {
        unreachable!()
    };
    assert!(reason.contains("already a friend"), "reason: {reason}");

    // The rollback notification precedes the failure; no pending entry lingers.
    let friends = last_friend_list(&seen).expect("rollback should publish a friend list");
    assert!(friends.iter().all(|f| f.username.as_str() != "alice"));
}

#[tokio::test]
async fn test_rejects_invalid_username_without_backend_call() {
    let stub = Arc::new(StubBackend::new());
    let (_runtime, intents, mut notifications) = start_runtime(Arc::clone(&stub));

    intents
        .send(Intent::AddFriend {
            username: "not a name".to_string(),
        })
        .await
        .unwrap();

    let (failed, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::OperationFailed { intent: IntentKind::AddFriend, .. })
    })
    .await;
    let Notification::OperationFailed { reason, .. } = failed else {
        unreachable!()
    };
    assert!(reason.contains("invalid username"), "reason: {reason}");
}

// ----------------------------------------------------------------------------
// Peer Selection and History
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_select_peer_loads_history() {
    let stub = Arc::new(StubBackend::new().with_history(
        "alice",
        vec![incoming("alice", 1, "hello", 1_000), incoming("alice", 2, "again", 2_000)],
    ));
    let (_runtime, intents, mut notifications) = start_runtime(stub);

    intents
        .send(Intent::SelectPeer {
            peer: Username::new("alice").unwrap(),
        })
        .await
        .unwrap();

    let (changed, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. } if !messages.is_empty())
    })
    .await;

    let Notification::ConversationChanged { messages, .. } = changed else {
        unreachable!()
    };
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "hello");
    assert!(messages.iter().all(|m| m.state == MessageState::Confirmed));
}

#[tokio::test]
async fn test_concurrent_selects_coalesce_into_one_fetch() {
    let stub = Arc::new(
        StubBackend::new()
            .with_history("alice", vec![incoming("alice", 1, "hello", 1_000)])
            .with_history_delay(Duration::from_millis(150)),
    );
    let (_runtime, intents, mut notifications) = start_runtime(Arc::clone(&stub));

    let peer = Username::new("alice").unwrap();
    intents
        .send(Intent::SelectPeer { peer: peer.clone() })
        .await
        .unwrap();
    intents.send(Intent::SelectPeer { peer }).await.unwrap();

    wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. } if !messages.is_empty())
    })
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stub.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_load_older_messages_pages_from_cursor() {
    // Exactly one full page (testing page_size = 10) so has_more stays true.
    let first_page: Vec<MessageRecord> = (0..10)
        .map(|i| incoming("alice", 100 + i, "newer", 50_000 + i as u64 * 1_000))
        .collect();
    let mut all = first_page;
    all.push(incoming("alice", 1, "oldest", 1_000));
    let stub = Arc::new(StubBackend::new().with_history("alice", all));
    let (_runtime, intents, mut notifications) = start_runtime(Arc::clone(&stub));

    intents
        .send(Intent::SelectPeer {
            peer: Username::new("alice").unwrap(),
        })
        .await
        .unwrap();

    wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. } if messages.len() == 10)
    })
    .await;

    intents.send(Intent::LoadOlderMessages).await.unwrap();

    let (changed, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. } if messages.len() == 11)
    })
    .await;

    // The second fetch was bounded by the oldest loaded timestamp.
    assert_eq!(
        *stub.last_before.lock().unwrap(),
        Some(Timestamp::from_millis(50_000))
    );
    let Notification::ConversationChanged { messages, .. } = changed else {
        unreachable!()
    };
    assert_eq!(messages[0].text, "oldest");
}

// ----------------------------------------------------------------------------
// Optimistic Send
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_send_is_optimistic_then_confirmed() {
    let stub = Arc::new(StubBackend::new());
    let (_runtime, intents, mut notifications) = start_runtime(stub);

    intents
        .send(Intent::SelectPeer {
            peer: Username::new("alice").unwrap(),
        })
        .await
        .unwrap();
    intents
        .send(Intent::SendMessage {
            text: "hi there".to_string(),
        })
        .await
        .unwrap();

    // Optimistic projection lands at the tail immediately, state pending.
    let (optimistic, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. } if !messages.is_empty())
    })
    .await;
    let Notification::ConversationChanged { messages, .. } = optimistic else {
        unreachable!()
    };
    assert_eq!(messages.last().unwrap().state, MessageState::Pending);
    assert_eq!(messages.last().unwrap().text, "hi there");

    // The send response then promotes it.
    wait_for(&mut notifications, |n| {
        matches!(n, Notification::ConversationChanged { messages, .. }
            if messages.last().is_some_and(|m| m.state == MessageState::Confirmed))
    })
    .await;
}

#[tokio::test]
async fn test_send_timeouts_exhaust_retries_with_one_failure_notification() {
    let stub = Arc::new(
        StubBackend::new().failing_sends(TransportError::Timeout { timeout_ms: 250 }),
    );
    let (_runtime, intents, mut notifications) = start_runtime(Arc::clone(&stub));

    intents
        .send(Intent::SelectPeer {
            peer: Username::new("alice").unwrap(),
        })
        .await
        .unwrap();
    intents
        .send(Intent::SendMessage {
            text: "lost".to_string(),
        })
        .await
        .unwrap();

    let (failed, seen) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::OperationFailed { intent: IntentKind::SendMessage, .. })
    })
    .await;

    // Retried to exhaustion: testing config allows 3 attempts total.
    assert_eq!(stub.send_calls.load(Ordering::SeqCst), 3);

    let Notification::OperationFailed { reason, .. } = failed else {
        unreachable!()
    };
    assert!(reason.contains("timed out"), "reason: {reason}");

    // No duplicate failure notifications snuck in earlier.
    assert!(seen
        .iter()
        .all(|n| !matches!(n, Notification::OperationFailed { .. })));

    // The message is kept in the cache, marked failed; that snapshot was
    // published just before the failure notification.
    let failed_snapshot = seen
        .iter()
        .rev()
        .find_map(|n| match n {
            Notification::ConversationChanged { messages, .. } => Some(messages),
            _ => None,
        })
        .expect("failure should publish the conversation");
    assert_eq!(failed_snapshot.last().unwrap().state, MessageState::Failed);
}

#[tokio::test]
async fn test_send_without_selection_fails_immediately() {
    let stub = Arc::new(StubBackend::new());
    let (_runtime, intents, mut notifications) = start_runtime(Arc::clone(&stub));

    intents
        .send(Intent::SendMessage {
            text: "orphan".to_string(),
        })
        .await
        .unwrap();

    let (failed, _) = wait_for(&mut notifications, |n| {
        matches!(n, Notification::OperationFailed { intent: IntentKind::SendMessage, .. })
    })
    .await;
    let Notification::OperationFailed { reason, .. } = failed else {
        unreachable!()
    };
    assert!(reason.contains("no conversation"), "reason: {reason}");
    assert_eq!(stub.send_calls.load(Ordering::SeqCst), 0);
}
