//! chatlink Core
//!
//! Domain layer of the chatlink client synchronization engine: the types,
//! configuration, error taxonomy, backend boundary, channel protocol, and
//! the friend/conversation caches. No network IO lives here; the backend is
//! reached only through the [`Backend`] trait, and all store mutation happens
//! on the engine task's serialized apply path.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod backend;
pub mod channel;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod friends;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use backend::{Backend, ErrorBody, FriendRecord, MessageRecord, StatusRecord};
pub use channel::{
    create_intent_channel, create_notification_channel, ChannelError, Intent, IntentKind,
    IntentReceiver, IntentSender, NonBlockingSend, Notification, NotificationReceiver,
    NotificationSender,
};
pub use config::{ChannelConfig, EngineConfig, RetryConfig, SyncConfig, TransportConfig};
pub use conversation::{ConversationStore, MergeOutcome};
pub use errors::{DomainError, EngineError, EngineResult, Result, TransportError};
pub use friends::FriendStore;
pub use types::{
    ConversationCursor, Direction, Friend, FriendStatus, Message, MessageId, MessageState,
    ServerId, SystemTimeSource, TimeSource, Timestamp, Username,
};
