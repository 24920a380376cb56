//! Channel Communication Protocol Types
//!
//! Defines the typed protocol between the presentation layer and the engine
//! task: intents flow in, notifications flow out. The presentation layer
//! re-renders on notifications and never polls the stores directly.

use crate::config::ChannelConfig;
use crate::types::{Friend, Message, Username};
use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Intent: Presentation → Engine
// ----------------------------------------------------------------------------

/// User intents sent from the presentation layer to the engine task.
///
/// Intent sends return immediately; outcomes are reported on the notification
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Intent {
    /// Make `peer` the active conversation.
    SelectPeer { peer: Username },
    /// Send a message to the active peer.
    SendMessage { text: String },
    /// Add a friend by (not yet validated) username.
    AddFriend { username: String },
    /// Force a friend-list refresh.
    RefreshFriends,
    /// Fetch the next-older history page for the active peer.
    LoadOlderMessages,
    /// Shut down the engine gracefully.
    Shutdown,
}

impl Intent {
    /// The kind tag used to attribute failures to their originating intent.
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::SelectPeer { .. } => IntentKind::SelectPeer,
            Intent::SendMessage { .. } => IntentKind::SendMessage,
            Intent::AddFriend { .. } => IntentKind::AddFriend,
            Intent::RefreshFriends => IntentKind::RefreshFriends,
            Intent::LoadOlderMessages => IntentKind::LoadOlderMessages,
            Intent::Shutdown => IntentKind::Shutdown,
        }
    }
}

/// Discriminant-only view of [`Intent`], carried by failure notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    SelectPeer,
    SendMessage,
    AddFriend,
    RefreshFriends,
    LoadOlderMessages,
    Shutdown,
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::SelectPeer => write!(f, "select peer"),
            IntentKind::SendMessage => write!(f, "send message"),
            IntentKind::AddFriend => write!(f, "add friend"),
            IntentKind::RefreshFriends => write!(f, "refresh friends"),
            IntentKind::LoadOlderMessages => write!(f, "load older messages"),
            IntentKind::Shutdown => write!(f, "shutdown"),
        }
    }
}

// ----------------------------------------------------------------------------
// Notification: Engine → Presentation
// ----------------------------------------------------------------------------

/// State-change notifications sent from the engine task to the presentation
/// layer. Snapshot payloads keep reads consistent: the UI never observes a
/// partially applied store mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    /// The friend list changed; carries a full ordered snapshot.
    FriendsChanged { friends: Vec<Friend> },
    /// A conversation changed; carries the full cached history for `peer`.
    ConversationChanged {
        peer: Username,
        messages: Vec<Message>,
    },
    /// Backend availability flipped.
    BackendStatusChanged { connected: bool },
    /// An intent failed terminally; `reason` is human-readable.
    OperationFailed { intent: IntentKind, reason: String },
}

// ----------------------------------------------------------------------------
// Channel Aliases and Constructors
// ----------------------------------------------------------------------------

pub type IntentSender = tokio::sync::mpsc::Sender<Intent>;
pub type IntentReceiver = tokio::sync::mpsc::Receiver<Intent>;
pub type NotificationSender = tokio::sync::mpsc::Sender<Notification>;
pub type NotificationReceiver = tokio::sync::mpsc::Receiver<Notification>;

/// Create the bounded intent channel (presentation → engine).
pub fn create_intent_channel(config: &ChannelConfig) -> (IntentSender, IntentReceiver) {
    tokio::sync::mpsc::channel(config.intent_buffer_size)
}

/// Create the bounded notification channel (engine → presentation).
pub fn create_notification_channel(
    config: &ChannelConfig,
) -> (NotificationSender, NotificationReceiver) {
    tokio::sync::mpsc::channel(config.notification_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub enum ChannelError {
    ChannelFull,
    ChannelClosed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::ChannelFull => write!(f, "channel buffer is full"),
            ChannelError::ChannelClosed => write!(f, "channel is closed"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Non-blocking send for the presentation thread, which must never block.
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl NonBlockingSend<Intent> for IntentSender {
    fn try_send_non_blocking(&self, intent: Intent) -> Result<(), ChannelError> {
        self.try_send(intent).map_err(|e| match e {
            tokio::sync::mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            tokio::sync::mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_kind_mapping() {
        let intent = Intent::SendMessage { text: "hi".into() };
        assert_eq!(intent.kind(), IntentKind::SendMessage);
        assert_eq!(format!("{}", intent.kind()), "send message");
    }

    #[tokio::test]
    async fn test_intent_channel_roundtrip() {
        let config = ChannelConfig::default();
        let (sender, mut receiver) = create_intent_channel(&config);

        sender.send(Intent::RefreshFriends).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert!(matches!(received, Intent::RefreshFriends));
    }

    #[tokio::test]
    async fn test_non_blocking_send_reports_full_buffer() {
        let config = ChannelConfig {
            intent_buffer_size: 1,
            ..ChannelConfig::default()
        };
        let (sender, _receiver) = create_intent_channel(&config);

        sender.try_send_non_blocking(Intent::RefreshFriends).unwrap();
        let err = sender
            .try_send_non_blocking(Intent::RefreshFriends)
            .unwrap_err();
        assert!(matches!(err, ChannelError::ChannelFull));
    }
}
