//! Session token holder
//!
//! The store owns the current session token ("cookie"). The request core only
//! reads it, compares it and subscribes to its changes; writes come from the
//! login flow or any other external collaborator.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, observable session token
#[derive(Debug, Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<String>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new("")
    }
}

impl SessionStore {
    /// Create a store holding an initial token
    pub fn new(initial: impl AsRef<str>) -> Self {
        let (sender, _) = watch::channel(normalize_token(initial.as_ref()));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current session token
    pub fn token(&self) -> String {
        self.sender.borrow().clone()
    }

    /// Replace the session token.
    ///
    /// Surrounding and embedded whitespace is stripped, so a token pasted with
    /// line breaks still compares equal to the one the backend issued.
    pub fn set_token(&self, token: impl AsRef<str>) {
        let token = normalize_token(token.as_ref());
        log::debug!("Session token updated ({} chars)", token.len());
        self.sender.send_replace(token);
    }

    /// Subscribe to token changes.
    ///
    /// The returned receiver treats the current value as already seen.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.sender.subscribe()
    }
}

fn normalize_token(token: &str) -> String {
    token.chars().filter(|c| !c.is_whitespace()).collect()
}
