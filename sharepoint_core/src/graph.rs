//! Microsoft Graph HTTP client with token handling and retry policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{AuthStrategy, ScopeSet, TokenCache, TokenEntry};
use crate::config::GraphSettings;
use crate::error::{AuthFailureReason, SharePointError};

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &GraphSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
        }
    }

    /// Delay before the next attempt after `attempt` failures. A server
    /// supplied `Retry-After` replaces the computed backoff; both are capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = retry_after.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
            self.base_delay.saturating_mul(factor)
        });
        computed.min(self.max_delay)
    }
}

/// Request body for [`GraphClient::call`].
#[derive(Debug, Clone)]
pub enum GraphBody {
    Json(Value),
    Bytes { data: Vec<u8>, content_type: String },
}

#[derive(Debug, Clone)]
pub struct GraphResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl GraphResponse {
    /// Parse the body as JSON; an empty body (204) reads as `null`.
    pub fn json(&self) -> Result<Value, SharePointError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
    strategy: AuthStrategy,
    scopes: ScopeSet,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(
        settings: &GraphSettings,
        tokens: Arc<TokenCache>,
        strategy: AuthStrategy,
        scopes: ScopeSet,
    ) -> Result<Self, SharePointError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SharePointError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            tokens,
            strategy,
            scopes,
            retry: RetryPolicy::from_settings(settings),
        })
    }

    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Token the client would attach to its next request.
    pub async fn current_token(&self) -> Result<TokenEntry, SharePointError> {
        self.tokens.get_or_refresh(&self.strategy, &self.scopes).await
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<GraphBody>,
    ) -> Result<GraphResponse, SharePointError> {
        let url = self.url_for(path);
        let replayable = method == Method::GET || method == Method::HEAD;
        let mut failures = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.current_token().await?;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(token.access_token());
            match &body {
                Some(GraphBody::Json(value)) => request = request.json(value),
                Some(GraphBody::Bytes { data, content_type }) => {
                    request = request
                        .header(CONTENT_TYPE, content_type.as_str())
                        .body(data.clone())
                }
                None => {}
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    failures += 1;
                    let message = format!("transport failure: {}", err.without_url());
                    if !replayable || failures >= self.retry.max_attempts {
                        warn!(
                            target: "sharepoint.graph",
                            %method,
                            path,
                            attempts = failures,
                            "{}",
                            message
                        );
                        return Err(SharePointError::TransientService {
                            status: None,
                            attempts: failures,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for(failures, None);
                    warn!(
                        target: "sharepoint.graph",
                        %method,
                        path,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "{}; retrying",
                        message
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response.bytes().await.map_err(|e| {
                    SharePointError::TransientService {
                        status: Some(status.as_u16()),
                        attempts: failures + 1,
                        message: format!("response body interrupted: {}", e.without_url()),
                    }
                })?;
                debug!(
                    target: "sharepoint.graph",
                    %method,
                    path,
                    status = status.as_u16(),
                    bytes = bytes.len(),
                    "graph call succeeded"
                );
                return Ok(GraphResponse {
                    status: status.as_u16(),
                    content_type,
                    body: bytes.to_vec(),
                });
            }

            let retry_after = retry_after(&response);
            let text = response.text().await.unwrap_or_default();
            let message = graph_error_message(&text, status);

            match status {
                StatusCode::UNAUTHORIZED if !reauthenticated => {
                    reauthenticated = true;
                    warn!(
                        target: "sharepoint.graph",
                        %method,
                        path,
                        "graph returned 401; refreshing token and retrying once"
                    );
                    self.tokens
                        .invalidate(&self.strategy, &self.scopes, &token)
                        .await?;
                }
                StatusCode::UNAUTHORIZED => {
                    warn!(
                        target: "sharepoint.graph",
                        %method,
                        path,
                        "graph rejected a fresh token; check the app registration has the required roles or scp claims"
                    );
                    return Err(SharePointError::authentication(
                        AuthFailureReason::Rejected,
                        message,
                    ));
                }
                StatusCode::FORBIDDEN => {
                    warn!(
                        target: "sharepoint.graph",
                        %method,
                        path,
                        "graph returned 403; the token lacks a Sites.* role or scope for this call"
                    );
                    return Err(SharePointError::Permission(message));
                }
                StatusCode::NOT_FOUND => return Err(SharePointError::NotFound(message)),
                s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        warn!(
                            target: "sharepoint.graph",
                            %method,
                            path,
                            status = s.as_u16(),
                            attempts = failures,
                            "graph retries exhausted"
                        );
                        return Err(SharePointError::TransientService {
                            status: Some(s.as_u16()),
                            attempts: failures,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for(failures, retry_after);
                    warn!(
                        target: "sharepoint.graph",
                        %method,
                        path,
                        status = s.as_u16(),
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "graph throttled or unavailable; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                s => {
                    return Err(SharePointError::Request {
                        status: s.as_u16(),
                        body: truncate_chars(&text, MAX_ERROR_BODY_CHARS),
                    })
                }
            }
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, SharePointError> {
        self.call(Method::GET, path, None).await?.json()
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, SharePointError> {
        self.call(Method::POST, path, Some(GraphBody::Json(body)))
            .await?
            .json()
    }

    pub async fn patch_json(&self, path: &str, body: Value) -> Result<Value, SharePointError> {
        self.call(Method::PATCH, path, Some(GraphBody::Json(body)))
            .await?
            .json()
    }

    pub async fn put_bytes(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<Value, SharePointError> {
        let body = GraphBody::Bytes {
            data,
            content_type: content_type.to_string(),
        };
        self.call(Method::PUT, path, Some(body)).await?.json()
    }

    pub async fn get_bytes(&self, path: &str) -> Result<GraphResponse, SharePointError> {
        self.call(Method::GET, path, None).await
    }

    /// Fetch every page of a collection, following `@odata.nextLink`.
    pub async fn get_collection(&self, path: &str) -> Result<Vec<Value>, SharePointError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(link) = next.take() {
            let page = self.get_json(&link).await?;
            if let Some(values) = page.get("value").and_then(Value::as_array) {
                items.extend(values.iter().cloned());
            }
            next = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(items)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn graph_error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            let code = error.get("code").and_then(Value::as_str).unwrap_or("");
            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
            Some(format!("{} {}", code, message).trim().to_string())
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("graph returned {}", status))
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
