//! Core abstractions and interfaces for txfetch
//!
//! This module provides the error type, the collaborator traits and the
//! session token holder shared by every other layer.

pub mod error;
pub mod session;
pub mod traits;

// Re-export commonly used types
pub use error::{ClientError, ClientResult, ErrorContext};
pub use session::SessionStore;
pub use traits::*;
