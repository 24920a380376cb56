//! Core types for the chatlink sync engine
//!
//! This module defines the fundamental types used throughout the engine,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Username
// ----------------------------------------------------------------------------

/// Maximum accepted username length in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Validated username, the unique immutable key for friends and conversations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Validate and construct a username.
    ///
    /// Input is trimmed; the result must be non-empty, at most
    /// [`MAX_USERNAME_LEN`] characters, and consist of alphanumerics plus
    /// `-`, `_`, and `.`.
    pub fn new(raw: &str) -> Result<Self, crate::DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(crate::DomainError::InvalidUsername {
                reason: "username is empty".into(),
            });
        }
        if trimmed.chars().count() > MAX_USERNAME_LEN {
            return Err(crate::DomainError::InvalidUsername {
                reason: format!("username exceeds {} characters", MAX_USERNAME_LEN),
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(crate::DomainError::InvalidUsername {
                reason: "username contains invalid characters".into(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = crate::EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s)?)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Epoch timestamp in milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from epoch milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the timestamp as epoch milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Absolute distance between two timestamps.
    pub fn abs_diff(&self, other: Timestamp) -> Duration {
        Duration::from_millis(self.0.abs_diff(other.0))
    }

    /// Duration elapsed since `earlier`, saturating at zero.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of current time, abstracted so stores are deterministic under test.
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of [`TimeSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

// ----------------------------------------------------------------------------
// Friends
// ----------------------------------------------------------------------------

/// Confirmation state of a friend entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendStatus {
    /// Added locally, not yet echoed back by the backend.
    Pending,
    /// Reported by the backend.
    Confirmed,
}

impl fmt::Display for FriendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FriendStatus::Pending => write!(f, "pending"),
            FriendStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// A friend as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub username: Username,
    pub status: FriendStatus,
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Backend-assigned message identifier; the wire format allows either an
/// integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerId::Int(id) => write!(f, "{}", id),
            ServerId::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Identifier for a cached message: a local temporary id until the backend
/// assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    /// Locally generated id for an unconfirmed optimistic message.
    Local(Uuid),
    /// Backend-assigned id for a confirmed message.
    Server(ServerId),
}

impl MessageId {
    /// Generate a fresh local id.
    pub fn new_local() -> Self {
        Self::Local(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Local(id) => write!(f, "local:{}", id),
            MessageId::Server(id) => write!(f, "{}", id),
        }
    }
}

/// Direction of a message relative to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Delivery state of a cached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Local optimistic projection, awaiting backend confirmation.
    Pending,
    /// Reported (or echoed back) by the backend.
    Confirmed,
    /// Send retries exhausted or confirmation deadline passed.
    Failed,
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageState::Pending => write!(f, "pending"),
            MessageState::Confirmed => write!(f, "confirmed"),
            MessageState::Failed => write!(f, "failed"),
        }
    }
}

/// A message in a conversation cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// The peer this conversation is with (not necessarily the sender).
    pub peer: Username,
    pub direction: Direction,
    pub text: String,
    pub sent_at: Timestamp,
    pub state: MessageState,
}

impl Message {
    /// Build the optimistic local projection of an outgoing message.
    pub fn optimistic(peer: Username, text: String, sent_at: Timestamp) -> Self {
        Self {
            id: MessageId::new_local(),
            peer,
            direction: Direction::Outgoing,
            text,
            sent_at,
            state: MessageState::Pending,
        }
    }

    /// Local id of this message, if it has not been confirmed yet.
    pub fn local_id(&self) -> Option<Uuid> {
        match self.id {
            MessageId::Local(id) => Some(id),
            MessageId::Server(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Pagination cursor
// ----------------------------------------------------------------------------

/// Per-peer pagination state for history fetches, owned by the conversation
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationCursor {
    /// Timestamp of the oldest message loaded so far; `None` before the first
    /// page.
    pub oldest_loaded_at: Option<Timestamp>,
    /// Whether older pages may remain on the backend.
    pub has_more: bool,
}

impl Default for ConversationCursor {
    fn default() -> Self {
        Self {
            oldest_loaded_at: None,
            has_more: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
