//! chatlink HTTP Transport Adapter
//!
//! Implements the [`chatlink_core::Backend`] trait against the local backend
//! service's REST API. Owns connection reuse and the per-request timeout;
//! retry policy belongs to the scheduler, not here.

pub mod client;

pub use client::HttpBackend;
