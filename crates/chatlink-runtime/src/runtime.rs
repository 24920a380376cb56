//! Client Runtime
//!
//! Wires the engine together for an application: creates the intent and
//! notification channels, spawns the engine task, and hands the channel ends
//! to the presentation layer.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatlink_core::{EngineConfig, Intent};
//! use chatlink_http::HttpBackend;
//! use chatlink_runtime::ClientRuntime;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let backend = Arc::new(HttpBackend::new(&config.transport)?);
//! let mut runtime = ClientRuntime::new(backend, config);
//! runtime.start()?;
//!
//! let intents = runtime.intent_sender().unwrap().clone();
//! intents.send(Intent::RefreshFriends).await?;
//!
//! let mut notifications = runtime.take_notification_receiver().unwrap();
//! while let Some(notification) = notifications.recv().await {
//!     println!("{notification:?}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::task::EngineTask;
use chatlink_core::{
    create_intent_channel, create_notification_channel, Backend, EngineConfig, EngineError,
    EngineResult, Intent, IntentSender, NotificationReceiver,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

// ----------------------------------------------------------------------------
// Client Runtime
// ----------------------------------------------------------------------------

/// Runtime for the client synchronization engine.
pub struct ClientRuntime {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    engine_handle: Option<JoinHandle<EngineResult<()>>>,
    intent_sender: Option<IntentSender>,
    notification_receiver: Option<NotificationReceiver>,
    running: bool,
}

impl ClientRuntime {
    /// Create a runtime over any backend implementation.
    pub fn new(backend: Arc<dyn Backend>, config: EngineConfig) -> Self {
        Self {
            config,
            backend,
            engine_handle: None,
            intent_sender: None,
            notification_receiver: None,
            running: false,
        }
    }

    /// Validate the configuration and spawn the engine task.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.running {
            return Err(EngineError::config_error("runtime already running"));
        }

        self.config
            .validate()
            .map_err(|reason| EngineError::Configuration { reason })?;

        let (intent_sender, intent_receiver) = create_intent_channel(&self.config.channels);
        let (notification_sender, notification_receiver) =
            create_notification_channel(&self.config.channels);

        self.intent_sender = Some(intent_sender);
        self.notification_receiver = Some(notification_receiver);

        let mut engine = EngineTask::new(
            &self.config,
            Arc::clone(&self.backend),
            intent_receiver,
            notification_sender,
        );
        self.engine_handle = Some(tokio::spawn(async move { engine.run().await }));
        self.running = true;

        info!(base_url = %self.config.transport.base_url, "client runtime started");
        Ok(())
    }

    /// Stop the runtime. Asks the engine to shut down gracefully, then aborts
    /// whatever is left.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        if let Some(sender) = &self.intent_sender {
            let _ = sender.try_send(Intent::Shutdown);
        }
        if let Some(mut handle) = self.engine_handle.take() {
            // Give the engine a moment to drain, then cut it off.
            match tokio::time::timeout(core::time::Duration::from_millis(250), &mut handle).await {
                Ok(Ok(Err(err))) => info!(%err, "engine task exited with error"),
                Ok(_) => {}
                Err(_) => handle.abort(),
            }
        }

        self.intent_sender = None;
        self.notification_receiver = None;
        info!("client runtime stopped");
    }

    /// Intent sender for the presentation layer.
    pub fn intent_sender(&self) -> Option<&IntentSender> {
        self.intent_sender.as_ref()
    }

    /// Take the notification receiver for the presentation layer.
    pub fn take_notification_receiver(&mut self) -> Option<NotificationReceiver> {
        self.notification_receiver.take()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for ClientRuntime {
    fn drop(&mut self) {
        if let Some(handle) = self.engine_handle.take() {
            handle.abort();
        }
    }
}
