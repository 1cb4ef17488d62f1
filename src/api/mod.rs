//! Typed operations against the job-fetch backend.
//!
//! Each operation builds its body from the current session token and the
//! requested date range, then hands off to [`SessionClient::request`].

pub mod models;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error};
use serde_json::Value as JsonValue;

pub use models::{
    DataResponse, DateRangeBody, FetchMode, NestedTransactionsResponse, ResponseShape,
    StartFetchResponse, StatusResponse, Transaction, TransactionsResponse,
};

use crate::{
    core::{ClientError, ClientResult, Reauthenticate},
    orchestration::{RequestOptions, SessionClient},
    transport::{send_with_timeout, HttpRequest},
};

const START_FETCH_PATH: &str = "start-fetch";
const LOGIN_PATH: &str = "login";
const AUTHORIZED_STATUS: &str = "authorized";

impl SessionClient {
    fn date_range_body(&self, from: NaiveDate, to: NaiveDate) -> DateRangeBody {
        DateRangeBody::new(from, to, self.session().token())
    }

    /// Ask the backend to start a fetch job for the range
    pub async fn start_fetch(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        on_auth_required: Option<Arc<dyn Reauthenticate>>,
    ) -> ClientResult<StartFetchResponse> {
        let body = self.date_range_body(from, to);
        let url = self.api().endpoint(START_FETCH_PATH);
        let value = self
            .request(&url, body.to_json(), RequestOptions::with_reauth(on_auth_required))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read transactions for the range from the endpoint selected by `mode`
    pub async fn fetch_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        mode: FetchMode,
        on_auth_required: Option<Arc<dyn Reauthenticate>>,
    ) -> ClientResult<DataResponse> {
        let body = self.date_range_body(from, to);
        debug!("Fetching data: {} - {} via {}", body.from, body.to, mode.endpoint());

        let url = self.api().endpoint(mode.endpoint());
        let value = self
            .request(&url, body.to_json(), RequestOptions::with_reauth(on_auth_required))
            .await?;
        DataResponse::from_value(value)
    }

    pub async fn force_empty_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        on_auth_required: Option<Arc<dyn Reauthenticate>>,
    ) -> ClientResult<DataResponse> {
        self.fetch_data(from, to, FetchMode::ForceEmpty, on_auth_required)
            .await
    }

    pub async fn force_refresh_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        on_auth_required: Option<Arc<dyn Reauthenticate>>,
    ) -> ClientResult<DataResponse> {
        self.fetch_data(from, to, FetchMode::ForceRefresh, on_auth_required)
            .await
    }

    /// Whether the backend currently holds an authorized session.
    ///
    /// Any failure counts as "not authorized".
    pub async fn check_auth_status(&self) -> bool {
        let request = HttpRequest::get(self.api().endpoint(LOGIN_PATH));
        let checked = send_with_timeout(self.transport(), request, self.api().auth_check_timeout())
            .await
            .and_then(|response| response.json());

        match checked {
            Ok(data) => data.get("status").and_then(JsonValue::as_str) == Some(AUTHORIZED_STATUS),
            Err(e) => {
                error!("Auth check error: {e}");
                false
            }
        }
    }

    /// Log in and return the session token issued by the backend.
    ///
    /// Bypasses the session gate and the deduplicator: it is the call that
    /// ends an authentication wave, so it must never wait for one.
    pub async fn perform_login(&self, username: &str, password: &str) -> ClientResult<String> {
        let body = serde_json::to_value(models::LoginBody { username, password })?;
        let request = HttpRequest::post(self.api().endpoint(LOGIN_PATH), body);
        let response = send_with_timeout(self.transport(), request, self.api().timeout()).await?;

        let data = match response.json() {
            Ok(data) => data,
            Err(e) if response.is_success() => return Err(e),
            Err(_) => JsonValue::Null,
        };

        let authorized =
            data.get("status").and_then(JsonValue::as_str) == Some(AUTHORIZED_STATUS);
        if !response.is_success() || !authorized {
            let message = data
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("Login failed");
            return Err(ClientError::LoginFailed(message.to_string()));
        }

        data.get("cookie")
            .and_then(JsonValue::as_str)
            .filter(|cookie| !cookie.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ClientError::LoginFailed("No cookie in response".to_string()))
    }
}

/// Re-authentication by logging in with stored credentials.
///
/// Stores the issued token in the client's session; a failed login leaves the
/// token unchanged, which the retry path reports as a refresh timeout.
pub struct LoginReauth {
    client: SessionClient,
    username: String,
    password: String,
}

impl LoginReauth {
    pub fn new(
        client: SessionClient,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl Reauthenticate for LoginReauth {
    async fn reauthenticate(&self) {
        match self.client.perform_login(&self.username, &self.password).await {
            Ok(cookie) => {
                log::info!("Login succeeded, session token refreshed");
                self.client.session().set_token(cookie);
            }
            Err(e) => error!("Re-authentication failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::{config::Config, core::SessionStore, transport::mock::ScriptedTransport};

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn client(transport: Arc<ScriptedTransport>, token: &str) -> SessionClient {
        init_log();
        SessionClient::new(&Config::default(), transport, SessionStore::new(token))
    }

    /// Backend speaking the real endpoint layout, accepting only `good` tokens
    fn backend() -> Arc<ScriptedTransport> {
        Arc::new(
            ScriptedTransport::new(|req| {
                let path = req.url.trim_start_matches("http://localhost:3000");
                let cookie = req
                    .body
                    .as_ref()
                    .and_then(|b| b.get("cookie"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string();

                match (req.method.as_str(), path) {
                    ("GET", "/login") => (StatusCode::OK, json!({"status": "authorized"})),
                    ("POST", "/login") => {
                        let body = req.body.clone().unwrap_or_default();
                        if body["password"] == "secret" {
                            (StatusCode::OK, json!({"status": "authorized", "cookie": "good"}))
                        } else {
                            (
                                StatusCode::UNAUTHORIZED,
                                json!({"status": "unauthorized", "message": "bad password"}),
                            )
                        }
                    }
                    (_, _) if cookie != "good" => {
                        (StatusCode::OK, json!({"status": "unauthorized"}))
                    }
                    ("POST", "/start-fetch") => {
                        (StatusCode::OK, json!({"status": "started", "job_id": "job-1"}))
                    }
                    ("POST", "/data-cached") => (
                        StatusCode::OK,
                        json!({"total_transaksi": 1, "data": [{"no_nota": "N-1", "total_tagihan": 1500}]}),
                    ),
                    ("POST", "/force-refresh") | ("POST", "/force-empty") => (
                        StatusCode::OK,
                        json!({
                            "status": "completed",
                            "job_id": "job-2",
                            "data": {"total_transaksi": 0, "data": []}
                        }),
                    ),
                    _ => (StatusCode::NOT_FOUND, json!({"message": "no route"})),
                }
            })
            .with_delay(Duration::from_millis(10)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetch_data_shares_one_call() {
        let transport = backend();
        let client = client(transport.clone(), "good");

        let (a, b) = tokio::join!(
            client.fetch_data(date(2024, 1, 1), date(2024, 1, 31), FetchMode::Cached, None),
            client.fetch_data(date(2024, 1, 1), date(2024, 1, 31), FetchMode::Cached, None),
        );

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url, "http://localhost:3000/data-cached");
        assert_eq!(
            requests[0].body,
            Some(json!({"from": "01/01/2024", "to": "31/01/2024", "cookie": "good"}))
        );

        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a.shape(), ResponseShape::Flat);
        assert_eq!(a.transactions()[0].receipt_no(), Some("N-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetch() {
        let transport = backend();
        let client = client(transport.clone(), "good");

        let response = client
            .start_fetch(date(2024, 2, 1), date(2024, 2, 29), None)
            .await
            .unwrap();

        assert_eq!(response.status.as_deref(), Some("started"));
        assert_eq!(response.job_id.as_deref(), Some("job-1"));
        assert_eq!(transport.requests()[0].url, "http://localhost:3000/start-fetch");
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_variants_hit_their_endpoints() {
        let transport = backend();
        let client = client(transport.clone(), "good");

        let refreshed = client
            .force_refresh_data(date(2024, 3, 1), date(2024, 3, 2), None)
            .await
            .unwrap();
        let emptied = client
            .force_empty_data(date(2024, 3, 1), date(2024, 3, 2), None)
            .await
            .unwrap();

        assert_eq!(refreshed.shape(), ResponseShape::Nested);
        assert_eq!(emptied.job_id(), Some("job-2"));
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:3000/force-refresh".to_string(),
                "http://localhost:3000/force-empty".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loose_payloads_are_passed_through() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url.ends_with("/start-fetch") {
                (StatusCode::OK, json!({"job_id": "job-9"}))
            } else {
                (
                    StatusCode::OK,
                    json!({"data": [{"no_nota": "N-2", "total_tagihan": "25.000"}]}),
                )
            }
        }));
        let client = client(transport, "good");

        let started = client
            .start_fetch(date(2024, 1, 1), date(2024, 1, 2), None)
            .await
            .unwrap();
        assert_eq!(started.status, None);
        assert_eq!(started.job_id.as_deref(), Some("job-9"));

        let data = client
            .fetch_data(date(2024, 1, 1), date(2024, 1, 2), FetchMode::Cached, None)
            .await
            .unwrap();
        assert_eq!(data.transactions()[0].amount(), Some(&json!("25.000")));
        assert_eq!(data.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_without_callback_is_returned() {
        let transport = backend();
        let client = client(transport.clone(), "expired");

        let response = client
            .fetch_data(date(2024, 1, 1), date(2024, 1, 2), FetchMode::Cached, None)
            .await
            .unwrap();

        assert_eq!(response.shape(), ResponseShape::Status);
        assert_eq!(response.status(), Some("unauthorized"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_reauth_refreshes_and_retries() {
        let transport = backend();
        let client = client(transport.clone(), "expired");
        let action: Arc<dyn Reauthenticate> =
            Arc::new(LoginReauth::new(client.clone(), "admin", "secret"));

        let response = client
            .fetch_data(date(2024, 1, 1), date(2024, 1, 31), FetchMode::Cached, Some(action))
            .await
            .unwrap();

        assert_eq!(response.total(), 1);
        assert_eq!(client.session().token(), "good");

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].url, "http://localhost:3000/login");
        assert_eq!(requests[2].body.as_ref().unwrap()["cookie"], "good");
    }

    #[tokio::test]
    async fn test_check_auth_status() {
        let client = client(backend(), "good");
        assert!(client.check_auth_status().await);

        let down = Arc::new(ScriptedTransport::new(|_| {
            (StatusCode::OK, json!({"status": "unauthorized"}))
        }));
        let client = super::tests::client(down, "good");
        assert!(!client.check_auth_status().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_auth_status_times_out_to_false() {
        let slow = Arc::new(
            ScriptedTransport::new(|_| (StatusCode::OK, json!({"status": "authorized"})))
                .with_delay(Duration::from_secs(6)),
        );
        let client = client(slow, "good");
        assert!(!client.check_auth_status().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_login() {
        let client = client(backend(), "");

        assert_eq!(client.perform_login("admin", "secret").await.unwrap(), "good");
        assert_eq!(
            client.perform_login("admin", "wrong").await.unwrap_err(),
            ClientError::LoginFailed("bad password".to_string())
        );
        // the login call does not touch the session by itself
        assert_eq!(client.session().token(), "");
    }

    #[tokio::test]
    async fn test_perform_login_without_cookie() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            (StatusCode::OK, json!({"status": "authorized"}))
        }));
        let client = client(transport, "");

        assert_eq!(
            client.perform_login("admin", "secret").await.unwrap_err(),
            ClientError::LoginFailed("No cookie in response".to_string())
        );
    }
}
