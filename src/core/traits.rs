//! Core traits for txfetch components
//!
//! These are the seams where the request core meets the outside world:
//! the network, and the credential prompt that refreshes a session.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use super::error::ClientResult;
use crate::transport::{HttpRequest, HttpResponse};

/// A single network round trip
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response.
    ///
    /// Implementations must not apply their own deadline; the caller bounds
    /// the call with [`crate::transport::send_with_timeout`].
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

/// Externally supplied re-authentication action.
///
/// The only effect the request core relies on is that, eventually, the
/// session token in the [`crate::core::SessionStore`] changes.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn reauthenticate(&self);
}

/// Adapter turning an async closure into a [`Reauthenticate`] action
pub struct ReauthFn<F>(pub F);

#[async_trait]
impl<F, Fut> Reauthenticate for ReauthFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn reauthenticate(&self) {
        (self.0)().await
    }
}

/// Wrap an async closure as a shareable re-authentication action
pub fn reauth_fn<F, Fut>(f: F) -> Arc<dyn Reauthenticate>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(ReauthFn(f))
}
