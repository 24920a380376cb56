//! Intent and Outcome Handlers
//!
//! Translates presentation intents into scheduler work and applies completed
//! task outcomes to the stores. Every store mutation yields notifications for
//! the presentation layer; every scheduled task resolves to either a store
//! mutation or an `OperationFailed` notification.

use crate::scheduler::{SyncScheduler, TaskCompletion, TaskOutcome};
use crate::state::{ActiveSession, EngineState};
use chatlink_core::{
    DomainError, FriendRecord, Intent, IntentKind, MessageRecord, Notification, TransportError,
    Username,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Intent and outcome handlers for the engine task.
pub struct IntentHandlers;

impl IntentHandlers {
    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    /// Process one presentation intent.
    pub fn handle_intent(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
        intent: Intent,
    ) -> Vec<Notification> {
        match intent {
            Intent::SelectPeer { peer } => Self::handle_select_peer(state, scheduler, peer),
            Intent::SendMessage { text } => Self::handle_send_message(state, scheduler, text),
            Intent::AddFriend { username } => Self::handle_add_friend(state, scheduler, username),
            Intent::RefreshFriends => {
                scheduler.schedule_friend_list();
                Vec::new()
            }
            Intent::LoadOlderMessages => Self::handle_load_older(state, scheduler),
            // Shutdown is handled by the engine loop before dispatch.
            Intent::Shutdown => Vec::new(),
        }
    }

    fn handle_select_peer(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
        peer: Username,
    ) -> Vec<Notification> {
        let previous = state.session.peer().cloned();
        state.session = ActiveSession::PeerSelected(peer.clone());

        // A fetch for the previous peer is redundant once its cache is warm;
        // a cold cache keeps its fetch so the first page is not lost.
        if let Some(previous) = previous {
            if previous != peer && state.conversations.is_synced(&previous) {
                scheduler.cancel_history(&previous);
            }
        }

        if !state.conversations.is_synced(&peer) || state.conversations.history(&peer).is_empty() {
            scheduler.schedule_history(
                peer.clone(),
                state.sync.page_size,
                None,
                IntentKind::SelectPeer,
            );
        }

        // Snapshot of whatever is cached, so the UI renders immediately while
        // the fetch runs.
        vec![Notification::ConversationChanged {
            messages: state.conversations.snapshot(&peer),
            peer,
        }]
    }

    fn handle_send_message(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
        text: String,
    ) -> Vec<Notification> {
        let Some(peer) = state.session.peer().cloned() else {
            return vec![Self::operation_failed(
                IntentKind::SendMessage,
                &DomainError::NoActivePeer,
            )];
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return vec![Self::operation_failed(
                IntentKind::SendMessage,
                &DomainError::EmptyMessage,
            )];
        }

        let local_id = state.conversations.append_optimistic(&peer, text.clone());
        scheduler.schedule_send(peer.clone(), local_id, text);

        vec![Notification::ConversationChanged {
            messages: state.conversations.snapshot(&peer),
            peer,
        }]
    }

    fn handle_add_friend(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
        raw_username: String,
    ) -> Vec<Notification> {
        let username = match Username::new(&raw_username) {
            Ok(username) => username,
            Err(err) => return vec![Self::operation_failed(IntentKind::AddFriend, &err)],
        };

        if let Err(err) = state.friends.add_pending(username.clone()) {
            return vec![Self::operation_failed(IntentKind::AddFriend, &err)];
        }

        scheduler.schedule_add_friend(username);
        vec![Notification::FriendsChanged {
            friends: state.friends.list(),
        }]
    }

    fn handle_load_older(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
    ) -> Vec<Notification> {
        let Some(peer) = state.session.peer().cloned() else {
            return vec![Self::operation_failed(
                IntentKind::LoadOlderMessages,
                &DomainError::NoActivePeer,
            )];
        };

        if !state.conversations.cursor(&peer).has_more {
            debug!(%peer, "no older history to load");
            return Vec::new();
        }

        let before = state.conversations.next_page_before(&peer);
        scheduler.schedule_history(
            peer,
            state.sync.page_size,
            before,
            IntentKind::LoadOlderMessages,
        );
        Vec::new()
    }

    // ------------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------------

    /// Apply one completed task to the stores.
    ///
    /// Completions from cancelled or superseded tasks fail the scheduler's
    /// generation check and are dropped whole: no partial merges.
    pub fn apply_outcome(
        state: &mut EngineState,
        scheduler: &mut SyncScheduler,
        completion: TaskCompletion,
    ) -> Vec<Notification> {
        if !scheduler.finish(&completion.key, completion.generation) {
            debug!(key = ?completion.key, "discarding completion of cancelled task");
            state.stats.outcomes_discarded += 1;
            return Vec::new();
        }
        state.stats.outcomes_applied += 1;

        match completion.outcome {
            TaskOutcome::FriendsFetched { result } => Self::apply_friends_fetched(state, result),
            TaskOutcome::FriendAdded { username, result } => {
                Self::apply_friend_added(state, username, result)
            }
            TaskOutcome::HistoryFetched {
                peer,
                requested_limit,
                origin,
                result,
            } => Self::apply_history_fetched(state, peer, requested_limit, origin, result),
            TaskOutcome::MessageSent {
                peer,
                local_id,
                result,
            } => Self::apply_message_sent(state, peer, local_id, result),
            TaskOutcome::StatusProbed { result } => {
                Self::connectivity_notification(state, result.is_ok())
                    .into_iter()
                    .collect()
            }
        }
    }

    fn apply_friends_fetched(
        state: &mut EngineState,
        result: Result<Vec<FriendRecord>, TransportError>,
    ) -> Vec<Notification> {
        match result {
            Ok(records) => {
                let mut notifications =
                    Self::connectivity_notification(state, true).into_iter().collect::<Vec<_>>();
                if state.friends.reconcile(&records) {
                    notifications.push(Notification::FriendsChanged {
                        friends: state.friends.list(),
                    });
                }
                notifications
            }
            Err(err) => {
                warn!(%err, "friend list refresh failed");
                let mut notifications = Self::transport_failure(state, &err);
                notifications.push(Self::operation_failed(IntentKind::RefreshFriends, &err));
                notifications
            }
        }
    }

    fn apply_friend_added(
        state: &mut EngineState,
        username: Username,
        result: Result<FriendRecord, TransportError>,
    ) -> Vec<Notification> {
        match result {
            Ok(_record) => {
                let mut notifications =
                    Self::connectivity_notification(state, true).into_iter().collect::<Vec<_>>();
                state.friends.confirm(&username);
                notifications.push(Notification::FriendsChanged {
                    friends: state.friends.list(),
                });
                notifications
            }
            Err(err) => {
                // The optimistic entry must not linger after a failed add.
                state.friends.remove(&username);
                let reason = if err.status_code() == Some(409) {
                    DomainError::DuplicateFriend { username }.to_string()
                } else {
                    err.to_string()
                };
                let mut notifications = Self::transport_failure(state, &err);
                notifications.push(Notification::FriendsChanged {
                    friends: state.friends.list(),
                });
                notifications.push(Notification::OperationFailed {
                    intent: IntentKind::AddFriend,
                    reason,
                });
                notifications
            }
        }
    }

    fn apply_history_fetched(
        state: &mut EngineState,
        peer: Username,
        requested_limit: usize,
        origin: IntentKind,
        result: Result<Vec<MessageRecord>, TransportError>,
    ) -> Vec<Notification> {
        match result {
            Ok(records) => {
                let mut notifications =
                    Self::connectivity_notification(state, true).into_iter().collect::<Vec<_>>();
                let merge = state
                    .conversations
                    .merge_fetched(&peer, records, requested_limit);
                if merge.changed {
                    notifications.push(Notification::ConversationChanged {
                        messages: state.conversations.snapshot(&peer),
                        peer: peer.clone(),
                    });
                }
                for local_id in merge.expired {
                    debug!(%peer, %local_id, "optimistic message passed confirmation deadline");
                    notifications.push(Notification::OperationFailed {
                        intent: IntentKind::SendMessage,
                        reason: "message was not confirmed by the backend in time".to_string(),
                    });
                }
                notifications
            }
            Err(err) => {
                warn!(%peer, %err, "history fetch failed");
                let mut notifications = Self::transport_failure(state, &err);
                notifications.push(Self::operation_failed(origin, &err));
                notifications
            }
        }
    }

    fn apply_message_sent(
        state: &mut EngineState,
        peer: Username,
        local_id: Uuid,
        result: Result<MessageRecord, TransportError>,
    ) -> Vec<Notification> {
        match result {
            Ok(record) => {
                let mut notifications =
                    Self::connectivity_notification(state, true).into_iter().collect::<Vec<_>>();
                state.conversations.confirm_local(&peer, local_id, &record);
                notifications.push(Notification::ConversationChanged {
                    messages: state.conversations.snapshot(&peer),
                    peer,
                });
                notifications
            }
            Err(err) => {
                warn!(%peer, %local_id, %err, "send failed terminally");
                state.conversations.mark_failed(&peer, local_id);
                let mut notifications = Self::transport_failure(state, &err);
                notifications.push(Notification::ConversationChanged {
                    messages: state.conversations.snapshot(&peer),
                    peer,
                });
                notifications.push(Self::operation_failed(IntentKind::SendMessage, &err));
                notifications
            }
        }
    }

    // ------------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------------

    fn operation_failed(intent: IntentKind, err: &dyn std::fmt::Display) -> Notification {
        Notification::OperationFailed {
            intent,
            reason: err.to_string(),
        }
    }

    /// Flip the availability indicator; emits a notification only on change.
    fn connectivity_notification(
        state: &mut EngineState,
        connected: bool,
    ) -> Option<Notification> {
        if state.backend_connected == connected {
            return None;
        }
        state.backend_connected = connected;
        Some(Notification::BackendStatusChanged { connected })
    }

    /// Connection refusals flip the indicator to disconnected; other failures
    /// (timeouts, status errors) leave it alone; the backend answered or may
    /// still answer.
    fn transport_failure(state: &mut EngineState, err: &TransportError) -> Vec<Notification> {
        if matches!(err, TransportError::ConnectionRefused) {
            Self::connectivity_notification(state, false)
                .into_iter()
                .collect()
        } else {
            Vec::new()
        }
    }
}
