//! Command execution and the interactive shell

use crate::cli::{Cli, Commands};
use crate::state::UiState;
use anyhow::{anyhow, bail, Context, Result};
use chatlink_core::{
    Backend, Intent, IntentKind, IntentSender, MessageState, Notification, NotificationReceiver,
    Username,
};
use chatlink_runtime::ClientRuntime;
use core::time::Duration;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Dispatches parsed CLI commands.
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub async fn execute(
        cli: Cli,
        backend: Arc<dyn Backend>,
        mut runtime: ClientRuntime,
    ) -> Result<()> {
        match cli.command {
            Commands::Status => Self::show_status(backend).await,
            Commands::Chat => {
                let (intents, notifications) = Self::start(&mut runtime)?;
                let result = ChatShell::new(intents, notifications).run().await;
                runtime.stop().await;
                result
            }
            Commands::Friends => {
                let (intents, notifications) = Self::start(&mut runtime)?;
                let result = Self::list_friends(intents, notifications).await;
                runtime.stop().await;
                result
            }
            Commands::AddFriend { username } => {
                let (intents, notifications) = Self::start(&mut runtime)?;
                let result = Self::add_friend(intents, notifications, username).await;
                runtime.stop().await;
                result
            }
            Commands::Send { to, message } => {
                let (intents, notifications) = Self::start(&mut runtime)?;
                let result = Self::send_once(intents, notifications, to, message).await;
                runtime.stop().await;
                result
            }
        }
    }

    fn start(runtime: &mut ClientRuntime) -> Result<(IntentSender, NotificationReceiver)> {
        runtime.start().context("failed to start sync engine")?;
        let intents = runtime
            .intent_sender()
            .ok_or_else(|| anyhow!("runtime has no intent channel"))?
            .clone();
        let notifications = runtime
            .take_notification_receiver()
            .ok_or_else(|| anyhow!("runtime has no notification channel"))?;
        Ok((intents, notifications))
    }

    /// `status` talks to the backend directly; there is nothing to cache.
    async fn show_status(backend: Arc<dyn Backend>) -> Result<()> {
        match backend.status().await {
            Ok(record) => {
                match record.username {
                    Some(username) => println!("backend is up ({}, user {})", record.status, username),
                    None => println!("backend is up ({})", record.status),
                }
                Ok(())
            }
            Err(err) => bail!("backend is unreachable: {err}"),
        }
    }

    async fn list_friends(
        intents: IntentSender,
        mut notifications: NotificationReceiver,
    ) -> Result<()> {
        intents.send(Intent::RefreshFriends).await?;
        let friends = wait_until(&mut notifications, |n| match n {
            Notification::FriendsChanged { friends } => Some(friends.clone()),
            _ => None,
        })
        .await?;

        if friends.is_empty() {
            println!("no friends yet");
        }
        for friend in friends {
            println!("{} [{}]", friend.username, friend.status);
        }
        Ok(())
    }

    async fn add_friend(
        intents: IntentSender,
        mut notifications: NotificationReceiver,
        username: String,
    ) -> Result<()> {
        intents
            .send(Intent::AddFriend {
                username: username.clone(),
            })
            .await?;

        wait_until(&mut notifications, |n| match n {
            Notification::FriendsChanged { friends }
                if friends.iter().any(|f| {
                    f.username.as_str() == username
                        && f.status == chatlink_core::FriendStatus::Confirmed
                }) =>
            {
                Some(Ok(()))
            }
            Notification::OperationFailed {
                intent: IntentKind::AddFriend,
                reason,
            } => Some(Err(anyhow!("{reason}"))),
            _ => None,
        })
        .await??;

        println!("added {username}");
        Ok(())
    }

    async fn send_once(
        intents: IntentSender,
        mut notifications: NotificationReceiver,
        to: String,
        message: String,
    ) -> Result<()> {
        let peer = Username::new(&to).map_err(|e| anyhow!("{e}"))?;
        intents.send(Intent::SelectPeer { peer }).await?;
        intents.send(Intent::SendMessage { text: message }).await?;

        wait_until(&mut notifications, |n| match n {
            Notification::ConversationChanged { messages, .. }
                if messages
                    .last()
                    .is_some_and(|m| m.state == MessageState::Confirmed) =>
            {
                Some(Ok(()))
            }
            Notification::OperationFailed {
                intent: IntentKind::SendMessage,
                reason,
            } => Some(Err(anyhow!("{reason}"))),
            _ => None,
        })
        .await??;

        println!("sent to {to}");
        Ok(())
    }
}

/// Drain notifications until `extract` yields, bounded by a coarse deadline.
async fn wait_until<T, F>(notifications: &mut NotificationReceiver, mut extract: F) -> Result<T>
where
    F: FnMut(&Notification) -> Option<T>,
{
    let deadline = Duration::from_secs(30);
    let drain = async {
        while let Some(notification) = notifications.recv().await {
            debug!(?notification, "notification");
            if let Some(value) = extract(&notification) {
                return Ok(value);
            }
        }
        bail!("engine stopped before the operation completed")
    };
    tokio::time::timeout(deadline, drain)
        .await
        .map_err(|_| anyhow!("timed out waiting for the backend"))?
}

// ----------------------------------------------------------------------------
// Interactive Shell
// ----------------------------------------------------------------------------

/// Line-based interactive chat shell.
pub struct ChatShell {
    intents: IntentSender,
    notifications: NotificationReceiver,
    state: UiState,
}

impl ChatShell {
    pub fn new(intents: IntentSender, notifications: NotificationReceiver) -> Self {
        Self {
            intents,
            notifications,
            state: UiState::new(),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("chatlink - type /help for commands");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(line.trim()).await? {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                notification = self.notifications.recv() => {
                    match notification {
                        Some(notification) => {
                            for line in self.state.apply(notification) {
                                println!("{line}");
                            }
                        }
                        None => {
                            println!("engine stopped");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns false when the shell should exit.
    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.splitn(2, ' ');
            let command = parts.next().unwrap_or_default();
            let arg = parts.next().unwrap_or_default().trim();

            match command {
                "help" => {
                    println!("/friends            list friends");
                    println!("/add <username>     add a friend");
                    println!("/select <username>  open a conversation");
                    println!("/older              load older messages");
                    println!("/refresh            refresh the friend list");
                    println!("/quit               exit");
                }
                "friends" => {
                    for friend in &self.state.friends {
                        println!("{} [{}]", friend.username, friend.status);
                    }
                    if self.state.friends.is_empty() {
                        println!("no friends yet");
                    }
                }
                "add" => {
                    self.intents
                        .send(Intent::AddFriend {
                            username: arg.to_string(),
                        })
                        .await?;
                }
                "select" => match Username::new(arg) {
                    Ok(peer) => {
                        self.state.active_peer = Some(peer.clone());
                        self.state.conversations.remove(&peer);
                        println!("-- conversation with {peer} --");
                        self.intents.send(Intent::SelectPeer { peer }).await?;
                    }
                    Err(err) => println!("{err}"),
                },
                "older" => {
                    self.intents.send(Intent::LoadOlderMessages).await?;
                }
                "refresh" => {
                    self.intents.send(Intent::RefreshFriends).await?;
                }
                "quit" | "exit" => {
                    let _ = self.intents.send(Intent::Shutdown).await;
                    return Ok(false);
                }
                other => println!("unknown command: /{other}"),
            }
            return Ok(true);
        }

        self.intents
            .send(Intent::SendMessage {
                text: line.to_string(),
            })
            .await?;
        Ok(true)
    }
}
