use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::SharePointError;

/// A secret string. `Debug` is redacted and there is no `Display`; the value
/// only leaves through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Certificate,
    ClientSecret,
    Delegated,
}

impl StrategyKind {
    /// Selection order, most preferred first.
    pub const PRIORITY: [StrategyKind; 3] = [
        StrategyKind::Certificate,
        StrategyKind::ClientSecret,
        StrategyKind::Delegated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Certificate => "certificate",
            StrategyKind::ClientSecret => "client_secret",
            StrategyKind::Delegated => "delegated",
        }
    }
}

/// Application registration shared by every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub tenant_id: String,
    pub client_id: String,
    pub authority_host: String,
}

impl ClientIdentity {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        authority_host: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authority_host: authority_host.into(),
        }
    }

    pub fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }
}

#[derive(Debug, Clone)]
pub struct ClientSecretCredential {
    pub identity: ClientIdentity,
    pub secret: Secret,
}

#[derive(Debug, Clone)]
pub struct CertificateCredential {
    pub identity: ClientIdentity,
    pub private_key_pem: Secret,
    pub certificate_pem: Option<String>,
    /// SHA-1 thumbprint, upper-case hex without separators.
    pub thumbprint: String,
}

impl CertificateCredential {
    /// Base64 body of the public certificate, as carried in `x5c`.
    pub fn certificate_body(&self) -> Option<String> {
        let pem = self.certificate_pem.as_deref()?;
        let body: String = pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .map(str::trim)
            .collect();
        (!body.is_empty()).then_some(body)
    }
}

#[derive(Debug, Clone)]
pub struct DelegatedCredential {
    pub identity: ClientIdentity,
    pub username: String,
    pub password: Secret,
    pub client_secret: Option<Secret>,
}

#[derive(Debug, Clone)]
pub enum Credential {
    ClientSecret(ClientSecretCredential),
    Certificate(CertificateCredential),
    Delegated(DelegatedCredential),
}

impl Credential {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Credential::ClientSecret(_) => StrategyKind::ClientSecret,
            Credential::Certificate(_) => StrategyKind::Certificate,
            Credential::Delegated(_) => StrategyKind::Delegated,
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        match self {
            Credential::ClientSecret(c) => &c.identity,
            Credential::Certificate(c) => &c.identity,
            Credential::Delegated(c) => &c.identity,
        }
    }
}

/// Immutable set of configured credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    pub fn from_credentials(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn load(settings: &Settings) -> Result<Self, SharePointError> {
        let tenant_id = required(settings.tenant_id.as_deref(), "TENANT_ID")?;
        let client_id = required(settings.client_id.as_deref(), "CLIENT_ID")?;
        let identity =
            ClientIdentity::new(tenant_id, client_id, settings.auth.authority_host.clone());

        let mut credentials = Vec::new();

        if let Some(cert) = load_certificate(settings, &identity)? {
            credentials.push(Credential::Certificate(cert));
        }

        if let Some(secret) = settings.client_secret.as_ref().filter(|s| !s.is_empty()) {
            credentials.push(Credential::ClientSecret(ClientSecretCredential {
                identity: identity.clone(),
                secret: secret.clone(),
            }));
        }

        match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => {
                credentials.push(Credential::Delegated(DelegatedCredential {
                    identity: identity.clone(),
                    username: username.clone(),
                    password: password.clone(),
                    client_secret: settings.client_secret.clone(),
                }));
            }
            (Some(_), None) | (None, Some(_)) if !credentials.is_empty() => {
                // USERNAME is ambient on many hosts; app credentials take precedence.
                warn!(
                    target: "sharepoint.auth",
                    "ignoring incomplete USERNAME/PASSWORD pair; application credentials are configured"
                );
            }
            (Some(_), None) => {
                return Err(SharePointError::Configuration(
                    "USERNAME is set but PASSWORD is missing".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(SharePointError::Configuration(
                    "PASSWORD is set but USERNAME is missing".to_string(),
                ))
            }
            (None, None) => {}
        }

        if credentials.is_empty() {
            return Err(SharePointError::Configuration(
                "no credentials configured: set CLIENT_SECRET, CERTIFICATE_THUMBPRINT with a private key, or USERNAME and PASSWORD".to_string(),
            ));
        }

        let kinds: Vec<&str> = credentials.iter().map(|c| c.kind().as_str()).collect();
        info!(
            target: "sharepoint.auth",
            client_id = %identity.client_id,
            tenant_id = %identity.tenant_id,
            strategies = ?kinds,
            "credential store loaded"
        );

        Ok(Self { credentials })
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.credentials.iter().map(Credential::kind).collect()
    }

    pub fn find(&self, kind: StrategyKind) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.kind() == kind)
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String, SharePointError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SharePointError::Configuration(format!("{} is required", key)))
}

fn load_certificate(
    settings: &Settings,
    identity: &ClientIdentity,
) -> Result<Option<CertificateCredential>, SharePointError> {
    let thumbprint = settings.certificate_thumbprint.as_deref();
    let key_path = settings.private_key_path.as_deref();
    let cert_path = settings.certificate_path.as_deref();

    if thumbprint.is_none() && key_path.is_none() && cert_path.is_none() {
        return Ok(None);
    }

    let thumbprint = thumbprint.ok_or_else(|| {
        SharePointError::Configuration(
            "CERTIFICATE_THUMBPRINT is required when certificate files are configured".to_string(),
        )
    })?;
    let thumbprint = normalize_thumbprint(thumbprint)?;

    let certificate_text = cert_path.map(read_pem_file).transpose()?;
    let certificate_pem = certificate_text
        .as_deref()
        .and_then(|text| pem_block(text, &["CERTIFICATE"]));

    let private_key_pem = match key_path {
        Some(path) => {
            let text = read_pem_file(path)?;
            pem_block(&text, PRIVATE_KEY_LABELS).ok_or_else(|| {
                SharePointError::Configuration(format!(
                    "{} contains no PEM private key",
                    path.display()
                ))
            })?
        }
        None => certificate_text
            .as_deref()
            .and_then(|text| pem_block(text, PRIVATE_KEY_LABELS))
            .ok_or_else(|| {
                SharePointError::Configuration(
                    "CERTIFICATE_THUMBPRINT is set but no private key was found (set PRIVATE_KEY_PATH)"
                        .to_string(),
                )
            })?,
    };

    jsonwebtoken::EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| {
        SharePointError::Configuration(format!("private key is not a usable RSA key: {}", e))
    })?;

    Ok(Some(CertificateCredential {
        identity: identity.clone(),
        private_key_pem: Secret::new(private_key_pem),
        certificate_pem,
        thumbprint,
    }))
}

const PRIVATE_KEY_LABELS: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY"];

fn read_pem_file(path: &Path) -> Result<String, SharePointError> {
    std::fs::read_to_string(path).map_err(|e| {
        SharePointError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Return the first PEM block carrying one of `labels`, armour included.
fn pem_block(text: &str, labels: &[&str]) -> Option<String> {
    labels.iter().find_map(|label| {
        let begin = format!("-----BEGIN {}-----", label);
        let end = format!("-----END {}-----", label);
        let start = text.find(&begin)?;
        let stop = text[start..].find(&end)? + start + end.len();
        Some(text[start..stop].to_string())
    })
}

fn normalize_thumbprint(raw: &str) -> Result<String, SharePointError> {
    let hex: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase();
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SharePointError::Configuration(
            "CERTIFICATE_THUMBPRINT must be a 40 character SHA-1 hex digest".to_string(),
        ));
    }
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            tenant_id: Some("tenant".into()),
            client_id: Some("client".into()),
            site_id: Some("site".into()),
            ..Settings::default()
        }
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret([REDACTED])");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn missing_tenant_is_configuration_error() {
        let settings = Settings {
            tenant_id: None,
            client_secret: Some(Secret::new("x")),
            ..base_settings()
        };
        let err = CredentialStore::load(&settings).unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(ref m) if m.contains("TENANT_ID")));
    }

    #[test]
    fn no_material_is_configuration_error() {
        let err = CredentialStore::load(&base_settings()).unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(_)));
    }

    #[test]
    fn username_without_password_is_rejected() {
        let settings = Settings {
            username: Some("user@contoso.com".into()),
            ..base_settings()
        };
        assert!(CredentialStore::load(&settings).is_err());
    }

    #[test]
    fn ambient_username_does_not_block_app_credentials() {
        let settings = Settings::from_lookup(|key| {
            match key {
                "TENANT_ID" => Some("tenant"),
                "CLIENT_ID" => Some("client"),
                "CLIENT_SECRET" => Some("s3cret"),
                "SITE_URL" => Some("https://contoso.sharepoint.com/sites/team"),
                "USERNAME" => Some("jdoe"),
                _ => None,
            }
            .map(str::to_string)
        })
        .unwrap();

        let store = CredentialStore::load(&settings).unwrap();
        assert_eq!(store.kinds(), vec![StrategyKind::ClientSecret]);
    }

    #[test]
    fn thumbprint_without_key_is_rejected() {
        let settings = Settings {
            certificate_thumbprint: Some("AB".repeat(20)),
            client_secret: Some(Secret::new("x")),
            ..base_settings()
        };
        let err = CredentialStore::load(&settings).unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(_)));
    }

    #[test]
    fn key_files_must_hold_a_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("app.pem");
        std::fs::write(
            &key_path,
            "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let settings = Settings {
            certificate_thumbprint: Some("ab:".repeat(20)),
            private_key_path: Some(key_path),
            ..base_settings()
        };
        let err = CredentialStore::load(&settings).unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(ref m) if m.contains("no PEM private key")));

        let settings = Settings {
            certificate_thumbprint: Some("AB".repeat(20)),
            private_key_path: Some(dir.path().join("missing.pem")),
            ..base_settings()
        };
        let err = CredentialStore::load(&settings).unwrap_err();
        assert!(matches!(err, SharePointError::Configuration(ref m) if m.contains("cannot read")));
    }

    #[test]
    fn secret_and_delegated_are_loaded() {
        let settings = Settings {
            client_secret: Some(Secret::new("x")),
            username: Some("user@contoso.com".into()),
            password: Some(Secret::new("pw")),
            ..base_settings()
        };
        let store = CredentialStore::load(&settings).unwrap();
        assert_eq!(
            store.kinds(),
            vec![StrategyKind::ClientSecret, StrategyKind::Delegated]
        );
        let identity = store.find(StrategyKind::ClientSecret).unwrap().identity();
        assert_eq!(
            identity.token_endpoint(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn thumbprint_normalization() {
        let raw = "ab:cd:".to_string() + &"01".repeat(18);
        assert_eq!(normalize_thumbprint(&raw).unwrap(), "ABCD".to_string() + &"01".repeat(18));
        assert!(normalize_thumbprint("xyz").is_err());
    }

    #[test]
    fn pem_block_extraction() {
        let text = "junk\n-----BEGIN CERTIFICATE-----\nQUJD\n-----END CERTIFICATE-----\n";
        let block = pem_block(text, &["CERTIFICATE"]).unwrap();
        assert!(block.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(block.ends_with("-----END CERTIFICATE-----"));
        assert!(pem_block(text, PRIVATE_KEY_LABELS).is_none());
    }
}
