//! HTTP plumbing shared by the remote identity and table clients.
//!
//! Every request carries the project's anon key in the `apikey` header and a
//! bearer token: the signed-in user's access token when there is one, the
//! anon key otherwise. Transport failures and gateway errors are mapped to the
//! connectivity-class [`StoreError`] variants; any other non-success status
//! becomes [`StoreError::Service`] with the remote error code and message.

use crate::libs::error::StoreError;
use parking_lot::RwLock;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for the remote backend-as-a-service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://abcd.example.co`.
    pub api_url: String,
    /// Public (anon) API key.
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn is_complete(&self) -> bool {
        !self.api_url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

struct Inner {
    http: Client,
    config: RemoteConfig,
    access_token: RwLock<Option<String>>,
    timeout: Duration,
}

/// Cheaply cloneable handle; clones share the access token.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<Inner>,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                config: config.clone(),
                access_token: RwLock::new(None),
                timeout,
            }),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.inner.config
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.inner.access_token.write() = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.read().clone()
    }

    /// Builds a request with auth headers and the per-request deadline applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.inner.config.anon_key.clone());
        self.inner
            .http
            .request(method, self.inner.config.endpoint(path))
            .timeout(self.inner.timeout)
            .header("apikey", &self.inner.config.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
    }

    /// Like [`request`](Self::request) but with an explicit bearer token.
    pub fn request_with_token(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.inner
            .http
            .request(method, self.inner.config.endpoint(path))
            .timeout(self.inner.timeout)
            .header("apikey", &self.inner.config.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    /// Sends a request and returns the response only if its status is a success.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = match tokio::time::timeout(self.inner.timeout, request.send()).await {
            Err(_) => return Err(StoreError::Timeout(self.inner.timeout)),
            Ok(Err(err)) if err.is_timeout() => return Err(StoreError::Timeout(self.inner.timeout)),
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(StoreError::ServiceUnavailable(status.as_u16()));
        }

        let body = response.text().await.map_err(StoreError::from)?;
        Err(service_error(status, &body))
    }

    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = self.send(request).await?;
        let status = response.status();
        let body = response.text().await.map_err(StoreError::from)?;
        serde_json::from_str(&body).map_err(|err| StoreError::Service {
            status: status.as_u16(),
            code: None,
            message: format!("Unexpected response from remote service: {}", err),
        })
    }
}

/// Extracts code and message from the error bodies of the REST and auth endpoints.
///
/// REST errors look like `{"code": "23505", "message": ...}`; auth errors use
/// `error`/`error_description`, `msg` or `error_code`.
pub fn service_error(status: StatusCode, body: &str) -> StoreError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| value.get(*key).and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }))
    };

    let code = pick(&["error_code", "code", "error"]);
    let message = pick(&["message", "msg", "error_description", "error"])
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request rejected").to_string());

    StoreError::Service {
        status: status.as_u16(),
        code,
        message,
    }
}
