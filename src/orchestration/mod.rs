//! Request orchestration layer
//!
//! Deduplication, the session gate, and the retry-after-auth client that
//! coordinates them.

pub mod client;
pub mod dedup;
pub mod gate;

pub use client::{RequestOptions, SessionClient};
pub use dedup::{RequestDeduplicator, RequestSignature};
pub use gate::{GateState, PendingInvalidation, SessionGate};
