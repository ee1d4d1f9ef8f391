//! Credential lifecycle: configured credentials, strategy selection, token
//! acquisition and the single-flight token cache.

pub mod claims;
pub mod credentials;
pub mod oauth;
pub mod strategy;
pub mod token;
pub mod token_cache;
pub mod token_store;

pub use claims::TokenClaims;
pub use credentials::{
    CertificateCredential, ClientIdentity, ClientSecretCredential, Credential, CredentialStore,
    DelegatedCredential, Secret, StrategyKind,
};
pub use oauth::{EntraIdentityProvider, IdentityProvider};
pub use strategy::{AuthStrategy, AuthStrategySelector, TokenRequest};
pub use token::{ScopeSet, TokenEntry};
pub use token_cache::{CacheKey, TokenCache};
pub use token_store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
