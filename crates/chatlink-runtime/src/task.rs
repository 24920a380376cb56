//! Engine Task
//!
//! The single task that owns the stores. It multiplexes presentation intents,
//! worker task completions, and the periodic refresh tick; responses are
//! applied one at a time, which is the only locking discipline the stores
//! need.

use crate::scheduler::{create_outcome_channel, OutcomeReceiver, SyncScheduler};
use crate::session::IntentHandlers;
use crate::state::EngineState;
use chatlink_core::{
    Backend, EngineConfig, EngineError, EngineResult, Intent, IntentKind, IntentReceiver,
    Notification, NotificationSender,
};
use std::sync::Arc;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Engine Task
// ----------------------------------------------------------------------------

/// The engine task: processes all intents and task outcomes.
pub struct EngineTask {
    state: EngineState,
    scheduler: SyncScheduler,
    intent_receiver: IntentReceiver,
    outcome_receiver: OutcomeReceiver,
    notification_sender: NotificationSender,
    refresh_interval: core::time::Duration,
    running: bool,
}

impl EngineTask {
    /// Create an engine task. The outcome channel between the scheduler's
    /// worker tasks and this task is internal.
    pub fn new(
        config: &EngineConfig,
        backend: Arc<dyn Backend>,
        intent_receiver: IntentReceiver,
        notification_sender: NotificationSender,
    ) -> Self {
        let (outcome_sender, outcome_receiver) =
            create_outcome_channel(config.channels.outcome_buffer_size);
        let scheduler = SyncScheduler::new(backend, config.retry.clone(), outcome_sender);

        Self {
            state: EngineState::new(config),
            scheduler,
            intent_receiver,
            outcome_receiver,
            notification_sender,
            refresh_interval: config.sync.refresh_interval,
            running: true,
        }
    }

    /// Run the main engine loop until shutdown.
    pub async fn run(&mut self) -> EngineResult<()> {
        info!("engine task starting");

        // Initial sync: availability probe plus the friend list.
        self.scheduler.schedule_probe();
        self.scheduler.schedule_friend_list();

        let mut refresh = tokio::time::interval(self.refresh_interval);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the initial sync above covers it.
        refresh.tick().await;

        while self.running {
            tokio::select! {
                intent = self.intent_receiver.recv() => {
                    match intent {
                        Some(Intent::Shutdown) => {
                            info!("shutdown intent received");
                            self.running = false;
                        }
                        Some(intent) => {
                            self.state.stats.intents_processed += 1;
                            let notifications = IntentHandlers::handle_intent(
                                &mut self.state,
                                &mut self.scheduler,
                                intent,
                            );
                            self.publish_all(notifications).await?;
                        }
                        None => {
                            info!("intent channel closed, shutting down");
                            self.running = false;
                        }
                    }
                }

                completion = self.outcome_receiver.recv() => {
                    match completion {
                        Some(completion) => {
                            let notifications = IntentHandlers::apply_outcome(
                                &mut self.state,
                                &mut self.scheduler,
                                completion,
                            );
                            self.publish_all(notifications).await?;
                        }
                        // The scheduler owns a sender clone, so this only
                        // happens when the task is being torn down.
                        None => {
                            self.running = false;
                        }
                    }
                }

                _ = refresh.tick() => {
                    self.handle_refresh_tick().await?;
                }
            }
        }

        info!("engine task stopped");
        Ok(())
    }

    /// Background refresh: probe availability, reconcile the friend list,
    /// refresh the active conversation, and sweep expired optimistic sends.
    async fn handle_refresh_tick(&mut self) -> EngineResult<()> {
        self.state.stats.refresh_ticks += 1;
        debug!("refresh tick");

        self.scheduler.schedule_probe();
        self.scheduler.schedule_friend_list();

        if let Some(peer) = self.state.session.peer().cloned() {
            self.scheduler.schedule_history(
                peer,
                self.state.sync.page_size,
                None,
                IntentKind::SelectPeer,
            );
        }

        let expired = self.state.conversations.expire_pending();
        let mut notifications = Vec::new();
        let mut changed_peers: Vec<_> = expired.iter().map(|(peer, _)| peer.clone()).collect();
        changed_peers.dedup();
        for peer in changed_peers {
            notifications.push(Notification::ConversationChanged {
                messages: self.state.conversations.snapshot(&peer),
                peer,
            });
        }
        for (peer, local_id) in expired {
            debug!(%peer, %local_id, "optimistic message passed confirmation deadline");
            notifications.push(Notification::OperationFailed {
                intent: IntentKind::SendMessage,
                reason: "message was not confirmed by the backend in time".to_string(),
            });
        }
        self.publish_all(notifications).await
    }

    /// Publish notifications to the presentation layer. A closed notification
    /// channel means the presentation side is gone; treated as unrecoverable.
    async fn publish_all(&mut self, notifications: Vec<Notification>) -> EngineResult<()> {
        for notification in notifications {
            self.notification_sender
                .send(notification)
                .await
                .map_err(|_| EngineError::channel_error("notification channel closed"))?;
            self.state.stats.notifications_published += 1;
        }
        Ok(())
    }

    /// Get current statistics
    pub fn stats(&self) -> &crate::state::EngineStats {
        &self.state.stats
    }
}
