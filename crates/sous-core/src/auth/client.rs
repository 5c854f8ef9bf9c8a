//! REST client with a token-refresh interceptor.
//!
//! An auth failure (HTTP 401, or an error body whose `type` is `"AUTH"`) on
//! a request that has not been retried marks it retried, refreshes through
//! the shared [`RefreshCoordinator`], and replays it once with the new
//! access token. A second auth failure goes back to the caller.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::refresh::RefreshCoordinator;
use crate::error::ApiError;
use crate::storage::ApiConfig;

/// Error category the backend uses for expired or invalid credentials.
pub const AUTH_ERROR_TYPE: &str = "AUTH";

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/recipes/42`.
    pub path: String,
    pub body: Option<Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark as already retried; an auth failure will not trigger a refresh.
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Parsed JSON, the raw text as a string if it was not JSON, or `Null`.
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_auth_failure(&self) -> bool {
        if self.status == StatusCode::UNAUTHORIZED {
            return true;
        }
        !self.status.is_success()
            && self
                .body
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.eq_ignore_ascii_case(AUTH_ERROR_TYPE))
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    login_url: String,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        config: &ApiConfig,
        refresher: Arc<RefreshCoordinator>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            http,
            base_url: Url::parse(&config.base_url)?,
            login_url: config.login_url.clone(),
            refresher,
        })
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Send `request`, refreshing tokens and retrying once on auth failure.
    ///
    /// Non-auth failures come back as an [`ApiResponse`] with their status.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut token = self.refresher.tokens().access_token()?;
        loop {
            let response = self.execute(&request, token.as_deref()).await?;
            if !response.is_auth_failure() {
                return Ok(response);
            }
            if request.retried {
                debug!(path = %request.path, "auth failure after retry");
                return Err(ApiError::Unauthorized);
            }
            request.retried = true;

            match self.refresher.refresh_after(token.as_deref()).await {
                Ok(fresh) => token = Some(fresh.access_token),
                Err(err) => {
                    debug!(error = %err, "refresh failed, giving up on request");
                    return Err(if self.refresher.is_native() {
                        ApiError::TokenRefreshFailed
                    } else {
                        ApiError::LoginRequired {
                            login_url: self.login_url.clone(),
                        }
                    });
                }
            }
        }
    }

    async fn execute(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, ApiError> {
        let url = self.base_url.join(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(ApiResponse { status, body })
    }
}
