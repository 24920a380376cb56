//! UI-side State Mirror
//!
//! The shell keeps its own view of friends and conversations, rebuilt from
//! the snapshots carried by engine notifications. It never reaches into the
//! engine's stores.

use chatlink_core::{Direction, Friend, Message, MessageState, Notification, Username};
use std::collections::HashMap;

/// Presentation state assembled from notifications.
#[derive(Debug, Default)]
pub struct UiState {
    pub friends: Vec<Friend>,
    pub conversations: HashMap<Username, Vec<Message>>,
    pub active_peer: Option<Username>,
    pub connected: bool,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one notification into the mirror. Returns lines to print, if the
    /// change is worth showing.
    pub fn apply(&mut self, notification: Notification) -> Vec<String> {
        match notification {
            Notification::FriendsChanged { friends } => {
                self.friends = friends;
                vec![format!("friends: {}", self.friend_summary())]
            }
            Notification::ConversationChanged { peer, messages } => {
                let lines = if self.active_peer.as_ref() == Some(&peer) {
                    self.render_tail(&peer, &messages)
                } else {
                    Vec::new()
                };
                self.conversations.insert(peer, messages);
                lines
            }
            Notification::BackendStatusChanged { connected } => {
                self.connected = connected;
                if connected {
                    vec!["backend connected".to_string()]
                } else {
                    vec!["backend disconnected (serving cached data)".to_string()]
                }
            }
            Notification::OperationFailed { intent, reason } => {
                vec![format!("{intent} failed: {reason}")]
            }
        }
    }

    fn friend_summary(&self) -> String {
        if self.friends.is_empty() {
            return "(none)".to_string();
        }
        self.friends
            .iter()
            .map(|f| format!("{} [{}]", f.username, f.status))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render only what changed at the tail of the active conversation.
    fn render_tail(&self, peer: &Username, messages: &[Message]) -> Vec<String> {
        let known = self
            .conversations
            .get(peer)
            .map(|m| m.len())
            .unwrap_or(0);
        if messages.len() <= known {
            // A state transition without growth (confirmation, failure);
            // re-render the last line.
            return messages.last().map(Self::render_message).into_iter().collect();
        }
        messages[known..].iter().map(Self::render_message).collect()
    }

    fn render_message(message: &Message) -> String {
        let who = match message.direction {
            Direction::Outgoing => "me",
            Direction::Incoming => message.peer.as_str(),
        };
        let marker = match message.state {
            MessageState::Pending => " …",
            MessageState::Confirmed => "",
            MessageState::Failed => " ✗",
        };
        format!("{}: {}{}", who, message.text, marker)
    }
}
