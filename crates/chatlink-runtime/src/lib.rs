//! chatlink Runtime
//!
//! The client synchronization engine: scheduling, retry, cancellation, and
//! the single task that owns the caches. Applications create a
//! [`ClientRuntime`] over a backend implementation, send intents in, and
//! receive notifications out; the stores themselves are never shared.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod task;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use runtime::ClientRuntime;
pub use scheduler::{
    create_outcome_channel, run_with_retry, OutcomeReceiver, OutcomeSender, SchedulerStats,
    SyncScheduler, TaskCompletion, TaskKey, TaskOutcome,
};
pub use session::IntentHandlers;
pub use state::{ActiveSession, EngineState, EngineStats};
pub use task::EngineTask;
