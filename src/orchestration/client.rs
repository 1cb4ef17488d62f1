//! Session-aware request client
//!
//! [`SessionClient`] ties the pieces together: every request goes through the
//! deduplicator, parks at the session gate while re-authentication runs, is
//! sent with a deadline, and on an unauthorized signal drives one
//! re-authentication followed by exactly one retry.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use http::StatusCode;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use super::{
    dedup::{RequestDeduplicator, RequestSignature},
    gate::SessionGate,
};
use crate::{
    config::{self, Config},
    core::{ClientError, ClientResult, Reauthenticate, SessionStore, Transport},
    transport::{send_with_timeout, HttpRequest, ReqwestTransport},
};

const UNAUTHORIZED_STATUS: &str = "unauthorized";

/// Per-call options
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Always start a new call instead of joining an identical one in flight
    pub skip_dedup: bool,
    /// Action run when the backend rejects the session
    pub on_auth_required: Option<Arc<dyn Reauthenticate>>,
}

impl RequestOptions {
    pub fn with_reauth(action: Option<Arc<dyn Reauthenticate>>) -> Self {
        Self {
            skip_dedup: false,
            on_auth_required: action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

struct ClientInner {
    api: config::Api,
    auth: config::AuthPolicy,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    pending: Arc<RequestDeduplicator<JsonValue>>,
    gate: SessionGate,
}

/// Cheaply cloneable handle; clones share the pending table and the gate
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, session: SessionStore) -> Self {
        let pending = Arc::new(RequestDeduplicator::new());
        let gate = SessionGate::new(pending.clone());
        Self {
            inner: Arc::new(ClientInner {
                api: config.api.clone(),
                auth: config.auth.clone(),
                transport,
                session,
                pending,
                gate,
            }),
        }
    }

    /// Client talking to the configured backend over HTTP
    pub fn from_config(config: &Config) -> Self {
        let session = SessionStore::new(&config.session.default_cookie);
        Self::new(config, Arc::new(ReqwestTransport::default()), session)
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn gate(&self) -> &SessionGate {
        &self.inner.gate
    }

    pub(crate) fn api(&self) -> &config::Api {
        &self.inner.api
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Mark an externally driven login as started; new requests wait for it
    pub fn begin_auth(&self) -> bool {
        self.inner.gate.begin_auth()
    }

    /// Mark an externally driven login as finished and release waiting requests
    pub fn end_auth(&self, success: bool) {
        self.inner.gate.end_auth(success)
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn clear_pending_requests(&self) {
        self.inner.pending.clear()
    }

    /// POST `body` to `url` and return the decoded JSON response.
    pub async fn request(
        &self,
        url: &str,
        body: JsonValue,
        options: RequestOptions,
    ) -> ClientResult<JsonValue> {
        self.request_attempt(url.to_string(), body, options, Attempt::First)
            .await
    }

    fn request_attempt(
        &self,
        url: String,
        body: JsonValue,
        options: RequestOptions,
        attempt: Attempt,
    ) -> BoxFuture<'static, ClientResult<JsonValue>> {
        let client = self.clone();
        async move {
            let signature = RequestSignature::new(&url, &body);
            let skip_dedup = options.skip_dedup;
            let pending = client.inner.pending.clone();
            pending
                .execute(
                    signature,
                    move || client.perform(url, body, options, attempt),
                    skip_dedup,
                )
                .await
        }
        .boxed()
    }

    async fn perform(
        self,
        url: String,
        body: JsonValue,
        options: RequestOptions,
        attempt: Attempt,
    ) -> ClientResult<JsonValue> {
        if !self.inner.gate.await_release().await {
            return Err(ClientError::AuthRefreshFailed);
        }

        debug!("Request: {url} ({attempt:?})");
        let response = send_with_timeout(
            self.transport(),
            HttpRequest::post(&url, body.clone()),
            self.inner.api.timeout(),
        )
        .await?;

        if !response.is_success() {
            let message = response.error_message();
            if response.status == StatusCode::UNAUTHORIZED {
                if let Some(action) = options.on_auth_required.clone() {
                    if attempt == Attempt::Retry {
                        return Err(ClientError::Unauthorized(message));
                    }
                    info!("Auth required, triggering callback");
                    return self.refresh_and_retry(url, body, options, action).await;
                }
            }
            return Err(ClientError::Http {
                status: response.status,
                message,
            });
        }

        let data = response.json()?;
        debug!(
            "Response: status={:?} has_data={} has_auth_callback={}",
            data.get("status").and_then(JsonValue::as_str),
            data.get("data").is_some_and(|d| !d.is_null()),
            options.on_auth_required.is_some()
        );

        if is_unauthorized_payload(&data) {
            match options.on_auth_required.clone() {
                Some(_) if attempt == Attempt::Retry => {
                    let message = data
                        .get("message")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("session rejected after re-authentication");
                    return Err(ClientError::Unauthorized(message.to_string()));
                }
                Some(action) => {
                    info!("Unauthorized payload detected, triggering auth callback");
                    return self.refresh_and_retry(url, body, options, action).await;
                }
                None => warn!("Unauthorized payload for {url} and no auth callback provided"),
            }
        }

        Ok(data)
    }

    async fn refresh_and_retry(
        &self,
        url: String,
        mut body: JsonValue,
        options: RequestOptions,
        action: Arc<dyn Reauthenticate>,
    ) -> ClientResult<JsonValue> {
        let token = self.refresh_session(action.as_ref()).await?;

        if let Some(fields) = body.as_object_mut() {
            fields.insert("cookie".to_string(), JsonValue::String(token));
        }
        info!("Retrying with new cookie (changed from old)");

        let options = RequestOptions {
            skip_dedup: true,
            ..options
        };
        self.request_attempt(url, body, options, Attempt::Retry)
            .await
    }

    /// Run (or join) a re-authentication wave and return the new session token.
    ///
    /// Only the caller that opens the gate invokes `action`; callers arriving
    /// while a wave is running wait for it instead of starting another.
    async fn refresh_session(&self, action: &dyn Reauthenticate) -> ClientResult<String> {
        let mut tokens = self.inner.session.subscribe();
        let snapshot = tokens.borrow_and_update().clone();

        let wave = AuthWave::open(&self.inner.gate);
        match &wave {
            Some(_) => action.reauthenticate().await,
            None => {
                if !self.inner.gate.await_release().await {
                    return Err(ClientError::AuthRefreshFailed);
                }
            }
        }

        let ceiling = self.inner.auth.token_wait();
        let refreshed = match tokio::time::timeout(ceiling, tokens.wait_for(|t| *t != snapshot)).await
        {
            Ok(Ok(token)) => Ok(token.clone()),
            Ok(Err(_)) | Err(_) => Err(ClientError::AuthRefreshTimeout(ceiling)),
        };

        if let Some(wave) = wave {
            wave.finish(refreshed.is_ok());
        }
        if refreshed.is_err() {
            warn!("Cookie not updated after login");
        }
        refreshed
    }
}

/// An authentication wave opened by this caller.
///
/// Dropping it unfinished (the caller was cancelled, abandoned or the action
/// panicked) ends the wave as failed, so parked requests are never stranded.
struct AuthWave<'a> {
    gate: &'a SessionGate,
    finished: bool,
}

impl<'a> AuthWave<'a> {
    fn open(gate: &'a SessionGate) -> Option<Self> {
        gate.begin_auth().then(|| Self {
            gate,
            finished: false,
        })
    }

    fn finish(mut self, success: bool) {
        self.finished = true;
        self.gate.end_auth(success);
    }
}

impl Drop for AuthWave<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Authentication wave abandoned, releasing waiters");
            self.gate.end_auth(false);
        }
    }
}

fn is_unauthorized_payload(data: &JsonValue) -> bool {
    data.get("status").and_then(JsonValue::as_str) == Some(UNAUTHORIZED_STATUS)
}
