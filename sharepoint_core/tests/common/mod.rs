#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use wiremock::MockServer;

use sharepoint_core::auth::{
    AuthStrategy, ClientIdentity, ClientSecretCredential, IdentityProvider, ScopeSet, Secret,
    TokenCache, TokenEntry,
};
use sharepoint_core::config::GraphSettings;
use sharepoint_core::graph::GraphClient;
use sharepoint_core::resolver::{ResourceResolver, SiteLocator};
use sharepoint_core::SharePointError;

/// Identity provider that mints numbered tokens and counts requests.
pub struct CountingProvider {
    pub calls: AtomicUsize,
    pub lifetime: Duration,
    pub latency: StdDuration,
}

impl CountingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
            latency: StdDuration::ZERO,
        })
    }

    pub fn slow(latency: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
            latency,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for CountingProvider {
    async fn acquire(
        &self,
        strategy: &AuthStrategy,
        scopes: &ScopeSet,
    ) -> Result<TokenEntry, SharePointError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(TokenEntry::new(
            Secret::new(format!("token-{}", n)),
            Utc::now() + self.lifetime,
            scopes.clone(),
            strategy.authority(),
        ))
    }
}

pub fn identity() -> ClientIdentity {
    ClientIdentity::new("tenant-1", "client-1", "https://login.example")
}

pub fn secret_strategy() -> AuthStrategy {
    AuthStrategy::ClientSecret(ClientSecretCredential {
        identity: identity(),
        secret: Secret::new("s3cret"),
    })
}

pub fn scopes() -> ScopeSet {
    ScopeSet::graph_default()
}

pub fn graph_settings(server: &MockServer) -> GraphSettings {
    GraphSettings {
        base_url: format!("{}/v1.0", server.uri()),
        timeout_secs: 5,
        max_attempts: 3,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
    }
}

pub fn graph_client(server: &MockServer, provider: Arc<CountingProvider>) -> Arc<GraphClient> {
    graph_client_with(graph_settings(server), provider)
}

pub fn graph_client_with(
    settings: GraphSettings,
    provider: Arc<CountingProvider>,
) -> Arc<GraphClient> {
    let tokens = Arc::new(TokenCache::new(provider));
    Arc::new(
        GraphClient::new(&settings, tokens, secret_strategy(), scopes()).expect("graph client"),
    )
}

pub fn resolver(server: &MockServer, strict: bool) -> ResourceResolver {
    let graph = graph_client(server, CountingProvider::new());
    ResourceResolver::new(graph, SiteLocator::Id("site-1".to_string()), strict)
}
