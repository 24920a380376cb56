//! Backend Service Boundary
//!
//! The local backend service owns the peer-to-peer transport and all
//! cryptography; this client only speaks a fixed request/response protocol to
//! it. This module defines that boundary: the [`Backend`] trait implemented by
//! transport adapters, and the field-keyed wire records the protocol carries.
//!
//! The trait lives here so the engine can be driven by stub backends in tests
//! while production wires in the HTTP adapter.

use crate::types::{Direction, ServerId, Timestamp, Username};
use crate::TransportError;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Wire Records
// ----------------------------------------------------------------------------

/// Health payload from `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: String,
    /// Username this backend node is registered as, when it knows yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A friend as reported by `GET /friends` and `POST /friends`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRecord {
    pub username: String,
}

/// A message as reported by `GET /messages` and `POST /messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: ServerId,
    pub from: String,
    pub to: String,
    pub text: String,
    /// Epoch milliseconds.
    pub sent_at: Timestamp,
}

impl MessageRecord {
    /// Direction of this record within the conversation with `peer`: the
    /// record is incoming when the peer is its sender.
    pub fn direction_for(&self, peer: &Username) -> Direction {
        if self.from == peer.as_str() {
            Direction::Incoming
        } else {
            Direction::Outgoing
        }
    }
}

/// Structured error body carried by 4xx/5xx responses, when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ----------------------------------------------------------------------------
// Backend Trait
// ----------------------------------------------------------------------------

/// Request/response operations against the local backend service.
///
/// Implementations own connection reuse and the per-request timeout, and
/// perform no retries: retry policy belongs to the scheduler. No domain
/// semantics live behind this trait; callers interpret the records.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `GET /status`: health check, used for the availability indicator.
    async fn status(&self) -> Result<StatusRecord, TransportError>;

    /// `GET /friends`: the full friend list.
    async fn list_friends(&self) -> Result<Vec<FriendRecord>, TransportError>;

    /// `POST /friends`: add a friend by username.
    async fn add_friend(&self, username: &Username) -> Result<FriendRecord, TransportError>;

    /// `GET /messages?peer=&limit=&before=`: a page of history with `peer`,
    /// bounded above by `before` when present.
    async fn fetch_messages(
        &self,
        peer: &Username,
        limit: usize,
        before: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, TransportError>;

    /// `POST /messages`: send a message; the response echoes the accepted
    /// record with its backend-assigned id.
    async fn send_message(
        &self,
        to: &Username,
        text: &str,
    ) -> Result<MessageRecord, TransportError>;
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
