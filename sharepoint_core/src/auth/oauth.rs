use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AuthStrategy, ScopeSet, Secret, TokenEntry};
use crate::error::{AuthFailureReason, SharePointError};

/// Executes a strategy's token request against an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn acquire(
        &self,
        strategy: &AuthStrategy,
        scopes: &ScopeSet,
    ) -> Result<TokenEntry, SharePointError>;
}

const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400;

/// Microsoft Entra ID token endpoint client.
pub struct EntraIdentityProvider {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    error_codes: Vec<i64>,
}

// AADSTS codes meaning the credential itself has lapsed.
const EXPIRED_CODES: &[i64] = &[7000222, 50055, 700024, 50173];

impl EntraIdentityProvider {
    pub fn new(timeout: StdDuration) -> Result<Self, SharePointError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SharePointError::Internal(format!("http client: {}", e)))?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IdentityProvider for EntraIdentityProvider {
    async fn acquire(
        &self,
        strategy: &AuthStrategy,
        scopes: &ScopeSet,
    ) -> Result<TokenEntry, SharePointError> {
        let request = strategy.token_request(scopes)?;
        debug!(
            target: "sharepoint.auth",
            strategy = strategy.kind().as_str(),
            endpoint = %request.endpoint,
            "requesting access token"
        );

        let resp = self
            .http
            .post(&request.endpoint)
            .form(&request.form)
            .send()
            .await
            .map_err(|e| {
                SharePointError::authentication(
                    AuthFailureReason::Network,
                    format!("token endpoint unreachable: {}", e.without_url()),
                )
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            SharePointError::authentication(
                AuthFailureReason::Network,
                format!("token response interrupted: {}", e.without_url()),
            )
        })?;

        if !status.is_success() {
            let error: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let reason = classify(status.as_u16(), &error);
            let summary = error
                .error_description
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            warn!(
                target: "sharepoint.auth",
                strategy = strategy.kind().as_str(),
                status = status.as_u16(),
                error = %error.error,
                reason = reason.as_str(),
                "token request failed"
            );
            return Err(SharePointError::authentication(
                reason,
                format!("token request failed ({}): {} {}", status, error.error, summary)
                    .trim_end()
                    .to_string(),
            ));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            SharePointError::authentication(
                AuthFailureReason::Rejected,
                format!("malformed token response: {}", e),
            )
        })?;
        let expires_in = token_lifetime(token.expires_in.as_ref());
        let granted = token
            .scope
            .as_deref()
            .map(|s| ScopeSet::new(s.split_whitespace()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| scopes.clone());

        debug!(
            target: "sharepoint.auth",
            strategy = strategy.kind().as_str(),
            expires_in,
            "access token issued"
        );

        Ok(TokenEntry::new(
            Secret::new(token.access_token),
            Utc::now() + Duration::seconds(expires_in),
            granted,
            strategy.authority(),
        ))
    }
}

fn classify(status: u16, error: &TokenErrorResponse) -> AuthFailureReason {
    if status >= 500 || status == 408 || status == 429 {
        return AuthFailureReason::Network;
    }
    let expired = error.error_codes.iter().any(|c| EXPIRED_CODES.contains(c))
        || EXPIRED_CODES
            .iter()
            .any(|c| error.error_description.contains(&format!("AADSTS{}", c)));
    if expired {
        return AuthFailureReason::ExpiredCredential;
    }
    match error.error.as_str() {
        "invalid_client" | "invalid_grant" | "unauthorized_client" => {
            AuthFailureReason::InvalidCredential
        }
        _ => AuthFailureReason::Rejected,
    }
}

/// Seconds until expiry, defaulting to an hour and bounded to a day.
fn token_lifetime(raw: Option<&serde_json::Value>) -> i64 {
    raw.and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
        .unwrap_or(3600)
        .clamp(0, MAX_TOKEN_LIFETIME_SECS)
}
