use tracing::info;

use super::claims::client_assertion;
use super::{
    CertificateCredential, ClientIdentity, ClientSecretCredential, Credential, CredentialStore,
    DelegatedCredential, ScopeSet, StrategyKind,
};
use crate::error::SharePointError;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// The authentication strategy chosen at startup.
#[derive(Debug, Clone)]
pub enum AuthStrategy {
    Certificate(CertificateCredential),
    ClientSecret(ClientSecretCredential),
    Delegated(DelegatedCredential),
}

impl From<Credential> for AuthStrategy {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::Certificate(c) => AuthStrategy::Certificate(c),
            Credential::ClientSecret(c) => AuthStrategy::ClientSecret(c),
            Credential::Delegated(c) => AuthStrategy::Delegated(c),
        }
    }
}

/// A token endpoint request. Form values may hold secrets, so `Debug` only
/// lists field names.
pub struct TokenRequest {
    pub endpoint: String,
    pub form: Vec<(&'static str, String)>,
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.form.iter().map(|(k, _)| *k).collect();
        f.debug_struct("TokenRequest")
            .field("endpoint", &self.endpoint)
            .field("fields", &fields)
            .finish()
    }
}

impl AuthStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            AuthStrategy::Certificate(_) => StrategyKind::Certificate,
            AuthStrategy::ClientSecret(_) => StrategyKind::ClientSecret,
            AuthStrategy::Delegated(_) => StrategyKind::Delegated,
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        match self {
            AuthStrategy::Certificate(c) => &c.identity,
            AuthStrategy::ClientSecret(c) => &c.identity,
            AuthStrategy::Delegated(c) => &c.identity,
        }
    }

    pub fn authority(&self) -> String {
        self.identity().authority()
    }

    /// Principal the cached token belongs to.
    pub fn cache_identity(&self) -> String {
        match self {
            AuthStrategy::Delegated(c) => {
                format!("{}/{}", c.identity.client_id, c.username.to_lowercase())
            }
            other => other.identity().client_id.clone(),
        }
    }

    /// Build the token endpoint request for `scopes`.
    pub fn token_request(&self, scopes: &ScopeSet) -> Result<TokenRequest, SharePointError> {
        let identity = self.identity();
        let mut form = vec![
            ("client_id", identity.client_id.clone()),
            ("scope", scopes.to_form_value()),
        ];

        match self {
            AuthStrategy::ClientSecret(c) => {
                form.push(("grant_type", "client_credentials".to_string()));
                form.push(("client_secret", c.secret.expose().to_string()));
            }
            AuthStrategy::Certificate(c) => {
                form.push(("grant_type", "client_credentials".to_string()));
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                form.push(("client_assertion", client_assertion(c)?));
            }
            AuthStrategy::Delegated(c) => {
                form.push(("grant_type", "password".to_string()));
                form.push(("username", c.username.clone()));
                form.push(("password", c.password.expose().to_string()));
                if let Some(secret) = &c.client_secret {
                    form.push(("client_secret", secret.expose().to_string()));
                }
            }
        }

        Ok(TokenRequest {
            endpoint: identity.token_endpoint(),
            form,
        })
    }
}

pub struct AuthStrategySelector;

impl AuthStrategySelector {
    /// Pick the most preferred configured strategy: certificate, then client
    /// secret, then delegated.
    pub fn select(store: &CredentialStore) -> Result<AuthStrategy, SharePointError> {
        let credential = StrategyKind::PRIORITY
            .iter()
            .find_map(|kind| store.find(*kind))
            .ok_or(SharePointError::NoCredentialAvailable)?;
        let strategy = AuthStrategy::from(credential.clone());
        info!(
            target: "sharepoint.auth",
            strategy = strategy.kind().as_str(),
            client_id = %strategy.identity().client_id,
            "authentication strategy selected"
        );
        Ok(strategy)
    }
}
