//! Conversation History Cache
//!
//! Per-peer cache of message history with a pagination cursor per peer.
//! Tracks locally-sent-but-unconfirmed messages and reconciles them against
//! backend-reported history pages.
//!
//! Reconciling an optimistic message with a server record is heuristic: a
//! pending outgoing local is promoted by the first unmatched server record
//! with the same text whose timestamp lands within the configured tolerance
//! window, oldest first. The window and deadline are configuration, not
//! constants.

use crate::backend::MessageRecord;
use crate::config::SyncConfig;
use crate::types::{
    ConversationCursor, Direction, Message, MessageId, MessageState, SystemTimeSource, TimeSource,
    Timestamp, Username,
};
use std::collections::HashMap;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Merge Outcome
// ----------------------------------------------------------------------------

/// Result of merging one backend history page into the cache.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Whether the cached history changed at all.
    pub changed: bool,
    /// Local ids promoted to confirmed by this merge.
    pub confirmed: Vec<Uuid>,
    /// Server messages inserted as new entries.
    pub inserted: usize,
    /// Local ids that passed the confirmation deadline and were marked failed.
    pub expired: Vec<Uuid>,
}

// ----------------------------------------------------------------------------
// Conversation
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Conversation {
    /// Sorted by `sent_at` ascending; ties keep insertion order.
    messages: Vec<Message>,
    cursor: ConversationCursor,
    /// Whether at least one history page has been merged.
    synced: bool,
}

impl Conversation {
    /// Insert keeping sort order; equal timestamps go after existing entries.
    fn insert_sorted(&mut self, message: Message) {
        let at = self
            .messages
            .partition_point(|m| m.sent_at <= message.sent_at);
        self.messages.insert(at, message);
    }

    fn contains_server_id(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    fn position_of_local(&self, local_id: Uuid) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.local_id() == Some(local_id))
    }
}

// ----------------------------------------------------------------------------
// Conversation Store
// ----------------------------------------------------------------------------

/// Per-peer message history cache with optimistic-send reconciliation.
///
/// Mutated only on the engine task's serialized apply path. An unconfirmed
/// outgoing message is never discarded until it is confirmed or marked failed.
#[derive(Debug)]
pub struct ConversationStore<T: TimeSource = SystemTimeSource> {
    conversations: HashMap<Username, Conversation>,
    config: SyncConfig,
    time_source: T,
}

impl ConversationStore<SystemTimeSource> {
    /// Create a store on the wall clock.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_time_source(config, SystemTimeSource)
    }
}

impl<T: TimeSource> ConversationStore<T> {
    /// Create a store with a custom time source.
    pub fn with_time_source(config: SyncConfig, time_source: T) -> Self {
        Self {
            conversations: HashMap::new(),
            config,
            time_source,
        }
    }

    /// Cached history for `peer`, sorted by `sent_at` ascending, stable for
    /// equal timestamps by insertion order. Never touches the network.
    pub fn history(&self, peer: &Username) -> &[Message] {
        self.conversations
            .get(peer)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Owned snapshot of the cached history for `peer`.
    pub fn snapshot(&self, peer: &Username) -> Vec<Message> {
        self.history(peer).to_vec()
    }

    /// Pagination cursor for `peer`.
    pub fn cursor(&self, peer: &Username) -> ConversationCursor {
        self.conversations
            .get(peer)
            .map(|c| c.cursor.clone())
            .unwrap_or_default()
    }

    /// Whether at least one history page for `peer` has been merged.
    pub fn is_synced(&self, peer: &Username) -> bool {
        self.conversations.get(peer).map(|c| c.synced).unwrap_or(false)
    }

    /// `before` bound for the next-older history page, if pagination has
    /// started.
    pub fn next_page_before(&self, peer: &Username) -> Option<Timestamp> {
        self.conversations
            .get(peer)
            .and_then(|c| c.cursor.oldest_loaded_at)
    }

    /// Create a `Pending` outgoing message and return its temporary id.
    pub fn append_optimistic(&mut self, peer: &Username, text: String) -> Uuid {
        let message = Message::optimistic(peer.clone(), text, self.time_source.now());
        let local_id = message
            .local_id()
            .expect("optimistic messages carry a local id");
        self.conversations
            .entry(peer.clone())
            .or_default()
            .insert_sorted(message);
        local_id
    }

    /// Merge a backend history page into the cache.
    ///
    /// `requested_limit` is the page size that was asked for; a short page
    /// clears `has_more`. Matched pending locals are promoted and adopt the
    /// backend id and timestamp; unmatched server records insert as new
    /// confirmed messages, deduplicated by backend id; pending locals past the
    /// confirmation deadline are marked failed.
    pub fn merge_fetched(
        &mut self,
        peer: &Username,
        mut records: Vec<MessageRecord>,
        requested_limit: usize,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let page_len = records.len();

        // Oldest-first so the tie-break favors the oldest candidates.
        records.sort_by_key(|r| r.sent_at);

        let conversation = self.conversations.entry(peer.clone()).or_default();

        for record in records {
            let server_id = MessageId::Server(record.id.clone());
            if conversation.contains_server_id(&server_id) {
                continue;
            }

            let direction = record.direction_for(peer);
            let matched = if direction == Direction::Outgoing {
                Self::match_pending(conversation, &record, self.config.confirm_window)
            } else {
                None
            };

            match matched {
                Some(at) => {
                    let mut message = conversation.messages.remove(at);
                    if let Some(local_id) = message.local_id() {
                        outcome.confirmed.push(local_id);
                    }
                    message.id = server_id;
                    message.state = MessageState::Confirmed;
                    message.sent_at = record.sent_at;
                    conversation.insert_sorted(message);
                }
                None => {
                    conversation.insert_sorted(Message {
                        id: server_id,
                        peer: peer.clone(),
                        direction,
                        text: record.text,
                        sent_at: record.sent_at,
                        state: MessageState::Confirmed,
                    });
                    outcome.inserted += 1;
                }
            }
            outcome.changed = true;
        }

        // Cursor bookkeeping.
        let oldest_in_cache = conversation.messages.first().map(|m| m.sent_at);
        let cursor = &mut conversation.cursor;
        cursor.oldest_loaded_at = match (cursor.oldest_loaded_at, oldest_in_cache) {
            (Some(prev), Some(seen)) => Some(prev.min(seen)),
            (prev, seen) => prev.or(seen),
        };
        if page_len < requested_limit {
            cursor.has_more = false;
        }
        conversation.synced = true;

        // Locals that outlived the deadline will not be confirmed by this
        // page or any later one.
        let now = self.time_source.now();
        outcome
            .expired
            .extend(Self::expire_conversation(conversation, now, self.config.confirm_deadline));
        outcome.changed |= !outcome.expired.is_empty();

        outcome
    }

    /// First unmatched pending outgoing local, oldest first, with the same
    /// text and a timestamp within the tolerance window.
    fn match_pending(
        conversation: &Conversation,
        record: &MessageRecord,
        window: core::time::Duration,
    ) -> Option<usize> {
        conversation.messages.iter().position(|m| {
            m.state == MessageState::Pending
                && m.direction == Direction::Outgoing
                && m.text == record.text
                && m.sent_at.abs_diff(record.sent_at) <= window
        })
    }

    /// Promote a pending local directly from a successful send response.
    ///
    /// If a history page already merged the same backend record, the
    /// duplicate local projection is dropped instead. Returns false if the
    /// local id is unknown (already promoted, failed, or never existed).
    pub fn confirm_local(&mut self, peer: &Username, local_id: Uuid, record: &MessageRecord) -> bool {
        let Some(conversation) = self.conversations.get_mut(peer) else {
            return false;
        };
        let Some(at) = conversation.position_of_local(local_id) else {
            return false;
        };

        let server_id = MessageId::Server(record.id.clone());
        if conversation.contains_server_id(&server_id) {
            conversation.messages.remove(at);
            return true;
        }

        let mut message = conversation.messages.remove(at);
        message.id = server_id;
        message.state = MessageState::Confirmed;
        message.sent_at = record.sent_at;
        conversation.insert_sorted(message);
        true
    }

    /// Explicit failure transition for an unrecoverable send. Returns false
    /// if the local id is unknown.
    pub fn mark_failed(&mut self, peer: &Username, local_id: Uuid) -> bool {
        let Some(conversation) = self.conversations.get_mut(peer) else {
            return false;
        };
        match conversation.position_of_local(local_id) {
            Some(at) => {
                conversation.messages[at].state = MessageState::Failed;
                true
            }
            None => false,
        }
    }

    /// Sweep every conversation for pending locals past the confirmation
    /// deadline and mark them failed.
    pub fn expire_pending(&mut self) -> Vec<(Username, Uuid)> {
        let now = self.time_source.now();
        let deadline = self.config.confirm_deadline;
        let mut expired = Vec::new();
        for (peer, conversation) in &mut self.conversations {
            for local_id in Self::expire_conversation(conversation, now, deadline) {
                expired.push((peer.clone(), local_id));
            }
        }
        expired
    }

    fn expire_conversation(
        conversation: &mut Conversation,
        now: Timestamp,
        deadline: core::time::Duration,
    ) -> Vec<Uuid> {
        let mut expired = Vec::new();
        for message in &mut conversation.messages {
            if message.state == MessageState::Pending && now.since(message.sent_at) > deadline {
                message.state = MessageState::Failed;
                if let Some(local_id) = message.local_id() {
                    expired.push(local_id);
                }
            }
        }
        expired
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
