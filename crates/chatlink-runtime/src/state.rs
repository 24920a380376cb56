//! Engine State Management
//!
//! The consolidated state owned by the engine task: both caches, the active
//! session, backend availability, and statistics. There are no ambient
//! singletons; this container is passed explicitly to every handler.

use chatlink_core::{ConversationStore, EngineConfig, FriendStore, SyncConfig, Username};

// ----------------------------------------------------------------------------
// Active Session
// ----------------------------------------------------------------------------

/// The currently selected conversation peer. Exactly one active session at a
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveSession {
    #[default]
    NoSelection,
    PeerSelected(Username),
}

impl ActiveSession {
    /// The selected peer, if any.
    pub fn peer(&self) -> Option<&Username> {
        match self {
            ActiveSession::NoSelection => None,
            ActiveSession::PeerSelected(peer) => Some(peer),
        }
    }
}

// ----------------------------------------------------------------------------
// Engine State
// ----------------------------------------------------------------------------

/// Statistics for the engine task.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub intents_processed: u64,
    pub outcomes_applied: u64,
    pub outcomes_discarded: u64,
    pub notifications_published: u64,
    pub refresh_ticks: u64,
}

/// State owned by the engine task. Mutated only on its serialized apply path.
pub struct EngineState {
    pub friends: FriendStore,
    pub conversations: ConversationStore,
    pub session: ActiveSession,
    /// Availability indicator driven by probe results and connection
    /// refusals. Starts disconnected until the first successful exchange.
    pub backend_connected: bool,
    pub sync: SyncConfig,
    pub stats: EngineStats,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            friends: FriendStore::new(),
            conversations: ConversationStore::new(config.sync.clone()),
            session: ActiveSession::NoSelection,
            backend_connected: false,
            sync: config.sync.clone(),
            stats: EngineStats::default(),
        }
    }
}
