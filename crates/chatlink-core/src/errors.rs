//! Error types for the chatlink sync engine
//!
//! Contains the transport-boundary error taxonomy, local domain errors, and
//! the main [`EngineError`] type that unifies them.

use crate::types::Username;

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures at the backend HTTP boundary.
///
/// All variants are non-fatal to the process and propagate as typed results.
/// Retry policy lives in the scheduler, not at the transport layer;
/// [`TransportError::is_transient`] is the classification it uses.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("backend refused the connection")]
    ConnectionRefused,

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("backend returned HTTP {code}: {detail}")]
    Status { code: u16, detail: String },

    #[error("failed to decode backend response: {reason}")]
    Decode { reason: String },
}

impl TransportError {
    /// Whether a retry may succeed: connection refusals, timeouts, and 5xx
    /// responses. 4xx and decode failures are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::ConnectionRefused | TransportError::Timeout { .. } => true,
            TransportError::Status { code, .. } => *code >= 500,
            TransportError::Decode { .. } => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Domain Errors
// ----------------------------------------------------------------------------

/// Local invariant violations, surfaced to the presentation layer without
/// touching the network.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomainError {
    #[error("{username} is already a friend")]
    DuplicateFriend { username: Username },

    #[error("no conversation is selected")]
    NoActivePeer,

    #[error("invalid username: {reason}")]
    InvalidUsername { reason: String },

    #[error("message text is empty")]
    EmptyMessage,
}

// ----------------------------------------------------------------------------
// Engine Error
// ----------------------------------------------------------------------------

/// Unified error type for the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Channel communication error (internal to the engine architecture)
    #[error("channel error: {message}")]
    Channel { message: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl EngineError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        EngineError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        EngineError::Configuration {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, EngineError>;
pub type EngineResult<T> = Result<T>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
