//! Request orchestration core of the transaction dashboard client.
//!
//! Issues requests to the job-fetch backend, coalesces duplicate in-flight
//! requests, holds traffic during re-authentication and retries a request
//! once after the session has been restored.

pub mod api;
pub mod config;
pub mod core;
pub mod logging;
pub mod orchestration;
pub mod transport;
