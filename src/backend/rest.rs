//! # REST Backend
//!
//! [`LocationBackend`] over the hosted store's HTTP API (PostgREST RPC plus
//! the auth service).
//!
//! ## Endpoints
//!
//! | Call | Request |
//! |------|---------|
//! | create record | `POST /rest/v1/rpc/record_unit_location` |
//! | current user | `GET /auth/v1/user` |
//! | reachability | `GET /rest/v1/` |
//!
//! ## Failure Classification
//!
//! | Outcome | Error |
//! |---------|-------|
//! | transport error, timeout | `Connectivity` |
//! | 408, 429, 5xx | `Connectivity` |
//! | 401, 403 | `Unauthenticated` |
//! | other 4xx, `success: false` | `Rejected` |

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{LocationBackend, LocationRecord, NewLocationRecord, UserId};
use crate::config::BackendConfig;
use crate::error::BackendError;

const RECORD_LOCATION_RPC: &str = "record_unit_location";

#[derive(Debug, Serialize)]
struct RecordLocationParams<'a> {
    p_unit_id: &'a str,
    p_latitude: f64,
    p_longitude: f64,
    p_notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

#[derive(Debug)]
pub struct RestBackend {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    application_name: String,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
            application_name: config.application_name.clone(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        if !self.anon_key.is_empty() {
            headers.insert(
                "apikey",
                HeaderValue::from_str(&self.anon_key)
                    .map_err(|e| BackendError::Rejected(format!("invalid api key header: {e}")))?,
            );
        }
        if !bearer.is_empty() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {bearer}"))
                    .map_err(|e| BackendError::Rejected(format!("invalid auth header: {e}")))?,
            );
        }
        headers.insert(
            "x-application-name",
            HeaderValue::from_str(&self.application_name)
                .map_err(|e| BackendError::Rejected(format!("invalid application name: {e}")))?,
        );
        Ok(headers)
    }

    async fn read_body(resp: reqwest::Response) -> Result<(u16, String), BackendError> {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Connectivity(format!("read body failed: {e}")))?;
        Ok((status, body))
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    BackendError::Connectivity(e.to_string())
}

/// Pull a human-readable message out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Map a non-success HTTP status to a backend error
pub(crate) fn classify_status(status: u16, body: &str) -> BackendError {
    let message = error_message(body);
    match status {
        408 | 429 => BackendError::Connectivity(format!("status {status}: {message}")),
        401 | 403 => BackendError::Unauthenticated(message),
        400..=499 => BackendError::Rejected(message),
        _ => BackendError::Connectivity(format!("status {status}: {message}")),
    }
}

/// Interpret the RPC's `{success, message, ...}` envelope
pub(crate) fn parse_record_response(body: &str) -> Result<LocationRecord, BackendError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BackendError::Rejected(format!("unexpected response: {e}")))?;

    let message = value.get("message").and_then(Value::as_str).map(str::to_string);
    if value.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(BackendError::Rejected(
            message.unwrap_or_else(|| "location was not recorded".to_string()),
        ));
    }

    let record_id = ["location_id", "record_id", "id"].iter().find_map(|k| {
        value.get(*k).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    });

    Ok(LocationRecord { record_id, message })
}

#[async_trait]
impl LocationBackend for RestBackend {
    #[instrument(name = "backend_create_location_record", skip(self, record), fields(unit = %record.unit_id))]
    async fn create_location_record(
        &self,
        record: &NewLocationRecord,
    ) -> Result<LocationRecord, BackendError> {
        let params = RecordLocationParams {
            p_unit_id: &record.unit_id,
            p_latitude: record.latitude,
            p_longitude: record.longitude,
            p_notes: record.notes.as_deref(),
        };
        let resp = self
            .client
            .post(self.url(&format!("rest/v1/rpc/{RECORD_LOCATION_RPC}")))
            .headers(self.headers()?)
            .json(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = Self::read_body(resp).await?;
        if !(200..300).contains(&status) {
            let err = classify_status(status, &body);
            warn!("record_unit_location failed: {}", err);
            return Err(err);
        }
        let record = parse_record_response(&body)?;
        debug!("Location recorded (id={:?})", record.record_id);
        Ok(record)
    }

    #[instrument(name = "backend_current_user", skip(self))]
    async fn current_user(&self) -> Result<UserId, BackendError> {
        if self.access_token.is_none() {
            return Err(BackendError::Unauthenticated("no user session".to_string()));
        }
        let resp = self
            .client
            .get(self.url("auth/v1/user"))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = Self::read_body(resp).await?;
        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body));
        }
        let user: AuthUser = serde_json::from_str(&body)
            .map_err(|e| BackendError::Unauthenticated(format!("unexpected user payload: {e}")))?;
        Ok(UserId(user.id))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.client
            .get(self.url("rest/v1/"))
            .headers(self.headers()?)
            .send()
            .await
            .map(|_| ())
            .map_err(transport_error)
    }
}
