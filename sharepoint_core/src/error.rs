// src/error.rs
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Why a token could not be obtained or was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
    InvalidCredential,
    ExpiredCredential,
    Network,
    Rejected,
}

impl AuthFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailureReason::InvalidCredential => "invalid_credential",
            AuthFailureReason::ExpiredCredential => "expired_credential",
            AuthFailureReason::Network => "network",
            AuthFailureReason::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SharePointError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No credential available")]
    NoCredentialAvailable,

    #[error("Authentication error ({reason}): {message}")]
    Authentication {
        reason: AuthFailureReason,
        message: String,
    },

    #[error("Transient service error after {attempts} attempt(s): {message}")]
    TransientService {
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected with status {status}: {body}")]
    Request { status: u16, body: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Ambiguous resource '{name}': {matches} objects match")]
    AmbiguousResource { name: String, matches: usize },

    #[error("Unsupported format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SharePointError {
    pub fn authentication(reason: AuthFailureReason, message: impl Into<String>) -> Self {
        SharePointError::Authentication {
            reason,
            message: message.into(),
        }
    }

    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            SharePointError::Configuration(_) => "configuration_error",
            SharePointError::NoCredentialAvailable => "no_credential_available",
            SharePointError::Authentication { .. } => "authentication_error",
            SharePointError::TransientService { .. } => "transient_service_error",
            SharePointError::Permission(_) => "permission_error",
            SharePointError::NotFound(_) => "not_found_error",
            SharePointError::Request { .. } => "request_error",
            SharePointError::ResourceNotFound(_) => "resource_not_found",
            SharePointError::AmbiguousResource { .. } => "ambiguous_resource",
            SharePointError::UnsupportedFormat { .. } => "unsupported_format",
            SharePointError::Extraction(_) => "extraction_error",
            SharePointError::InvalidParams(_) => "invalid_params",
            SharePointError::ToolNotFound(_) => "tool_not_found",
            SharePointError::MethodNotFound => "method_not_found",
            SharePointError::Io(_) => "io_error",
            SharePointError::SerdeJson(_) => "serialization_error",
            SharePointError::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SharePointError::TransientService { .. }
                | SharePointError::Authentication {
                    reason: AuthFailureReason::Network,
                    ..
                }
        )
    }

    /// Structured payload used for failed tool calls.
    pub fn to_tool_payload(&self) -> serde_json::Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_transient(),
        });
        match self {
            SharePointError::Authentication { reason, .. } => {
                error["reason"] = json!(reason.as_str());
            }
            SharePointError::TransientService {
                status, attempts, ..
            } => {
                error["status"] = json!(status);
                error["attempts"] = json!(attempts);
            }
            SharePointError::Request { status, .. } => {
                error["status"] = json!(status);
            }
            _ => {}
        }
        json!({ "error": error })
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            SharePointError::ResourceNotFound(_) => (-32002, self.to_string()),
            SharePointError::ToolNotFound(_) => (-32602, self.to_string()),
            SharePointError::InvalidParams(msg) => (-32602, msg.to_string()),
            SharePointError::MethodNotFound => (-32601, "Method not found".to_string()),
            SharePointError::SerdeJson(e) => (-32602, format!("Invalid params: {}", e)),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
            "data": { "kind": self.kind() },
        })
    }
}
