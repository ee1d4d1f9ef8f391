//! JWT helpers: the signed client assertion used by the certificate
//! strategy, and unverified decoding of access-token claims for diagnostics.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CertificateCredential;
use crate::error::{AuthFailureReason, SharePointError};

const ASSERTION_LIFETIME_MINUTES: i64 = 10;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    exp: i64,
}

/// Build and sign the `client_assertion` for a certificate credential.
pub fn client_assertion(credential: &CertificateCredential) -> Result<String, SharePointError> {
    let audience = credential.identity.token_endpoint();
    let now = Utc::now();
    let claims = AssertionClaims {
        aud: &audience,
        iss: &credential.identity.client_id,
        sub: &credential.identity.client_id,
        jti: uuid::Uuid::new_v4().to_string(),
        nbf: now.timestamp(),
        exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(URL_SAFE_NO_PAD.encode(thumbprint_bytes(&credential.thumbprint)?));
    header.x5c = credential.certificate_body().map(|body| vec![body]);

    let key = EncodingKey::from_rsa_pem(credential.private_key_pem.expose().as_bytes())
        .map_err(|e| {
            SharePointError::authentication(
                AuthFailureReason::InvalidCredential,
                format!("private key rejected: {}", e),
            )
        })?;

    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| {
        SharePointError::authentication(
            AuthFailureReason::InvalidCredential,
            format!("failed to sign client assertion: {}", e),
        )
    })
}

fn thumbprint_bytes(hex: &str) -> Result<Vec<u8>, SharePointError> {
    if hex.len() % 2 != 0 {
        return Err(SharePointError::Configuration(
            "certificate thumbprint has odd length".to_string(),
        ));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                SharePointError::Configuration("certificate thumbprint is not hex".to_string())
            })
        })
        .collect()
}

/// Non-secret claims read from an access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Application permissions (`roles`).
    pub roles: Vec<String>,
    /// Delegated permissions (`scp`).
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl TokenClaims {
    /// Decode the payload segment without verifying the signature.
    pub fn decode_unverified(token: &str) -> Result<Self, SharePointError> {
        let payload = token.split('.').nth(1).ok_or_else(|| {
            SharePointError::Internal("access token is not a JWT".to_string())
        })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| SharePointError::Internal(format!("token payload: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)?;

        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let roles = value
            .get("roles")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let scopes = value
            .get("scp")
            .and_then(Value::as_str)
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(TokenClaims {
            audience: text("aud"),
            tenant_id: text("tid"),
            app_id: text("appid").or_else(|| text("azp")),
            app_display_name: text("app_displayname"),
            user: text("upn").or_else(|| text("unique_name")),
            roles,
            scopes,
            expires_at: value.get("exp").and_then(Value::as_i64),
        })
    }

    pub fn has_sites_permission(&self) -> bool {
        self.roles
            .iter()
            .chain(self.scopes.iter())
            .any(|p| p.starts_with("Sites."))
    }
}
