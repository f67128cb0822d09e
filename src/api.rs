//! API gateway: outbound HTTP to the posting backend.
//!
//! Every request reads the current token from the session store and sends it
//! as a bearer credential. Missing tokens are fine here; register, login and
//! the OAuth endpoints are anonymous.
//!
//! ERROR HANDLING
//! ==============
//! One round-trip per call, no retries. Non-2xx responses surface the
//! server's `message` (or `error`) field when the body has one; transport
//! failures carry the underlying reqwest message.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::store::{SessionStore, TOKEN_KEY};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend could not be reached or the connection broke mid-response.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("request rejected with status {status}")]
    Rejected { status: u16, message: Option<String> },

    /// A success body did not have the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    /// Message supplied by the server, if the failure came with one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// HTTP status for rejections.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// GATEWAY TRAIT
// =============================================================================

/// Transport seam used by the auth machine and post store. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    /// Perform one request against `path` (e.g. `/auth/me`) and return the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, non-2xx status, or a non-JSON body.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError>;
}

/// Decode a response body into a typed record. Shape mismatches are [`ApiError::Decode`].
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if `value` does not match `T`.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    /// Build a client for `config.api_base_url` that authenticates from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the reqwest client cannot be built.
    pub fn new(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.api_base_url.clone(), store })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl Gateway for ApiClient {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let token = self.store.get(TOKEN_KEY).filter(|t| !t.is_empty());

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        tracing::debug!(%method, path, authenticated = token.is_some(), "api request");

        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "api request failed");
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!(%method, path, status = status.as_u16(), "api request rejected");
            return Err(ApiError::Rejected { status: status.as_u16(), message: rejection_message(&text) });
        }

        parse_body(&text)
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_body(text: &str) -> Result<Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}

fn rejection_message(text: &str) -> Option<String> {
    let body: Value = serde_json::from_str(text).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_owned)
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded call: method, path, request body.
    pub type Call = (Method, String, Option<Value>);

    /// Scripted gateway: returns queued replies in order and records every call.
    #[derive(Default)]
    pub struct MockGateway {
        replies: Mutex<VecDeque<Result<Value, ApiError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl MockGateway {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn replying(replies: Vec<Result<Value, ApiError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), calls: Mutex::new(Vec::new()) }
        }

        pub fn push(&self, reply: Result<Value, ApiError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        #[must_use]
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Gateway for MockGateway {
        async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, path.to_owned(), body));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("no scripted reply".into())))
        }
    }

    #[must_use]
    pub fn rejected(status: u16, message: &str) -> ApiError {
        ApiError::Rejected { status, message: Some(message.to_owned()) }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
