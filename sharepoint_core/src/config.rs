//! Runtime settings.
//!
//! Settings are loaded once at startup (environment after `.env`, or a TOML
//! file) and handed to constructors by reference. Nothing reads the
//! environment after [`Settings::load`] returns.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::auth::Secret;
use crate::error::SharePointError;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const CONFIG_FILE_ENV: &str = "SHAREPOINT_CONFIG_FILE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub certificate_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,
    pub certificate_thumbprint: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub site_url: Option<String>,
    pub site_id: Option<String>,
    pub drive_id: Option<String>,
    pub debug: bool,
    pub strict_name_resolution: bool,
    pub graph: GraphSettings,
    pub auth: AuthSettings,
    pub documents: ExtractionLimits,
    /// The `.env` file applied by [`Settings::load`], if one was found.
    #[serde(skip)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub authority_host: String,
    pub scopes: Vec<String>,
    pub safety_margin_secs: i64,
    pub token_cache_file: Option<PathBuf>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scopes: vec![DEFAULT_GRAPH_SCOPE.to_string()],
            safety_margin_secs: 300,
            token_cache_file: None,
        }
    }
}

/// Bounds applied by the document extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractionLimits {
    pub max_text_chars: usize,
    pub max_rows_preview: usize,
    pub max_pdf_pages: usize,
    pub max_paragraphs: usize,
    pub max_tables: usize,
    /// Extraction pool threads; 0 sizes the pool from the host.
    pub workers: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_text_chars: 5_000,
            max_rows_preview: 10,
            max_pdf_pages: 10,
            max_paragraphs: 20,
            max_tables: 5,
            workers: 0,
        }
    }
}

impl Settings {
    /// Load `.env`, then read either the TOML file named by
    /// `SHAREPOINT_CONFIG_FILE` or the process environment.
    pub fn load() -> Result<Self, SharePointError> {
        let env_file = dotenv_outcome(dotenvy::dotenv())?;
        let mut settings = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(path.trim()))?,
            _ => Self::from_env()?,
        };
        settings.env_file = env_file;
        Ok(settings)
    }

    pub fn from_env() -> Result<Self, SharePointError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SharePointError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SharePointError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&raw).map_err(|e| {
            SharePointError::Configuration(format!("invalid {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SharePointError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Settings {
            tenant_id: get("TENANT_ID"),
            client_id: get("CLIENT_ID"),
            client_secret: get("CLIENT_SECRET").map(Secret::new),
            certificate_path: get("CERTIFICATE_PATH").map(PathBuf::from),
            private_key_path: get("PRIVATE_KEY_PATH").map(PathBuf::from),
            certificate_thumbprint: get("CERTIFICATE_THUMBPRINT"),
            username: get("USERNAME"),
            password: get("PASSWORD").map(Secret::new),
            site_url: get("SITE_URL"),
            site_id: get("SITE_ID"),
            drive_id: get("DRIVE_ID"),
            debug: get("DEBUG").map(|v| parse_flag(&v)).unwrap_or(false),
            strict_name_resolution: get("STRICT_NAME_RESOLUTION")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            ..Settings::default()
        };

        if let Some(base) = get("GRAPH_BASE_URL") {
            settings.graph.base_url = base;
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS") {
            settings.graph.timeout_secs = secs.parse().map_err(|_| {
                SharePointError::Configuration(format!(
                    "HTTP_TIMEOUT_SECS must be a positive integer, got '{}'",
                    secs
                ))
            })?;
        }
        if let Some(host) = get("AUTHORITY_HOST") {
            settings.auth.authority_host = host;
        }
        if let Some(scopes) = get("GRAPH_SCOPES") {
            settings.auth.scopes = scopes
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        settings.auth.token_cache_file = get("TOKEN_CACHE_FILE").map(PathBuf::from);
        if let Some(workers) = get("EXTRACTION_WORKERS") {
            settings.documents.workers = workers.parse().map_err(|_| {
                SharePointError::Configuration(format!(
                    "EXTRACTION_WORKERS must be a non-negative integer, got '{}'",
                    workers
                ))
            })?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SharePointError> {
        if self.site_url.is_none() && self.site_id.is_none() {
            return Err(SharePointError::Configuration(
                "SITE_URL or SITE_ID must be set".to_string(),
            ));
        }
        if let Some(site_url) = &self.site_url {
            let parsed = Url::parse(site_url).map_err(|e| {
                SharePointError::Configuration(format!("SITE_URL is not a valid URL: {}", e))
            })?;
            if parsed.host_str().is_none() {
                return Err(SharePointError::Configuration(
                    "SITE_URL must be an absolute URL with a host".to_string(),
                ));
            }
        }
        Url::parse(&self.graph.base_url).map_err(|e| {
            SharePointError::Configuration(format!("GRAPH_BASE_URL is not a valid URL: {}", e))
        })?;
        Url::parse(&self.auth.authority_host).map_err(|e| {
            SharePointError::Configuration(format!("AUTHORITY_HOST is not a valid URL: {}", e))
        })?;
        if self.graph.timeout_secs == 0 {
            return Err(SharePointError::Configuration(
                "HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.graph.max_attempts == 0 {
            return Err(SharePointError::Configuration(
                "graph.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.auth.scopes.is_empty() {
            return Err(SharePointError::Configuration(
                "at least one Graph scope is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// A missing `.env` is not an error.
fn dotenv_outcome(
    result: Result<PathBuf, dotenvy::Error>,
) -> Result<Option<PathBuf>, SharePointError> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(SharePointError::Configuration(format!(
            "failed to read .env: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_core_keys_and_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("TENANT_ID", "tenant"),
            ("CLIENT_ID", "client"),
            ("CLIENT_SECRET", "s3cret"),
            ("SITE_URL", "https://contoso.sharepoint.com/sites/team"),
            ("DEBUG", "true"),
        ]))
        .unwrap();

        assert_eq!(settings.tenant_id.as_deref(), Some("tenant"));
        assert_eq!(settings.client_secret.as_ref().map(|s| s.expose()), Some("s3cret"));
        assert!(settings.debug);
        assert!(!settings.strict_name_resolution);
        assert_eq!(settings.graph.base_url, DEFAULT_GRAPH_BASE_URL);
        assert_eq!(settings.graph.timeout_secs, 30);
        assert_eq!(settings.auth.scopes, vec![DEFAULT_GRAPH_SCOPE.to_string()]);
        assert_eq!(settings.auth.safety_margin_secs, 300);
        assert_eq!(settings.documents.max_text_chars, 5_000);
    }

    #[test]
    fn site_is_required() {
        let err = Settings::from_lookup(lookup(&[("TENANT_ID", "t"), ("CLIENT_ID", "c")]))
            .unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(_)));
    }

    #[test]
    fn site_url_must_be_absolute() {
        let err = Settings::from_lookup(lookup(&[("SITE_URL", "contoso/sites/team")]))
            .unwrap_err();
        assert!(err.to_string().contains("SITE_URL"));
    }

    #[test]
    fn blank_values_are_unset() {
        let settings =
            Settings::from_lookup(lookup(&[("SITE_ID", "site-1"), ("CLIENT_SECRET", "  ")]))
                .unwrap();
        assert!(settings.client_secret.is_none());
    }

    #[test]
    fn overrides_and_scope_lists() {
        let settings = Settings::from_lookup(lookup(&[
            ("SITE_ID", "site-1"),
            ("GRAPH_SCOPES", "Sites.Read.All, Files.Read.All"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("STRICT_NAME_RESOLUTION", "1"),
            ("TOKEN_CACHE_FILE", "/tmp/tokens.json"),
            ("EXTRACTION_WORKERS", "3"),
        ]))
        .unwrap();
        assert_eq!(settings.documents.workers, 3);
        assert_eq!(settings.auth.scopes, vec!["Sites.Read.All", "Files.Read.All"]);
        assert_eq!(settings.graph.timeout_secs, 5);
        assert!(settings.strict_name_resolution);
        assert_eq!(
            settings.auth.token_cache_file.as_deref(),
            Some(Path::new("/tmp/tokens.json"))
        );
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = Settings::from_lookup(lookup(&[
            ("SITE_ID", "site-1"),
            ("HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(_)));

        let err = Settings::from_lookup(lookup(&[
            ("SITE_ID", "site-1"),
            ("EXTRACTION_WORKERS", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(ref m) if m.contains("EXTRACTION_WORKERS")));
    }

    #[test]
    fn toml_file_with_nested_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharepoint.toml");
        std::fs::write(
            &path,
            r#"
tenant_id = "tenant"
client_id = "client"
client_secret = "shh"
site_url = "https://contoso.sharepoint.com"

[graph]
timeout_secs = 12

[documents]
max_rows_preview = 3
"#,
        )
        .unwrap();

        let settings = Settings::from_toml_file(&path).unwrap();
        assert_eq!(settings.graph.timeout_secs, 12);
        assert_eq!(settings.graph.max_attempts, 3);
        assert_eq!(settings.documents.max_rows_preview, 3);
        assert_eq!(settings.documents.max_pdf_pages, 10);
        assert!(format!("{:?}", settings).contains("client_secret"));
        assert!(!format!("{:?}", settings).contains("shh"));
    }

    #[test]
    fn env_file_outcomes() {
        let found = PathBuf::from("/srv/app/.env");
        assert_eq!(dotenv_outcome(Ok(found.clone())).unwrap(), Some(found));

        let missing = dotenvy::Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(dotenv_outcome(Err(missing)).unwrap(), None);

        let malformed = dotenvy::Error::LineParse("=oops".to_string(), 0);
        assert!(matches!(
            dotenv_outcome(Err(malformed)),
            Err(SharePointError::Configuration(_))
        ));
    }
}
