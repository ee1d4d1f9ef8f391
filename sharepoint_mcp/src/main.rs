use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sharepoint_core::{
    auth::{
        AuthStrategySelector, CredentialStore, EntraIdentityProvider, FileTokenStore, ScopeSet,
        TokenCache,
    },
    connectors::SharePointConnector,
    documents::DocumentProcessor,
    graph::GraphClient,
    mcp_server::{JsonRpcHandler, McpServer},
    resolver::ResourceResolver,
    transport::StdioTransport,
    Settings,
};

/// Logs go to stderr; stdout carries JSON-RPC.
fn init_tracing(debug: bool) {
    let default = if debug {
        "sharepoint_mcp=debug,sharepoint_core=debug,sharepoint=debug"
    } else {
        "sharepoint_mcp=info,sharepoint_core=info,sharepoint=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    init_tracing(settings.debug);

    info!("Starting SharePoint MCP server");
    if let Some(path) = &settings.env_file {
        debug!(target: "sharepoint.config", path = %path.display(), "loaded .env");
    }

    let credentials = CredentialStore::load(&settings)?;
    let strategy = AuthStrategySelector::select(&credentials)?;

    let provider = Arc::new(EntraIdentityProvider::new(Duration::from_secs(
        settings.graph.timeout_secs,
    ))?);
    let mut tokens =
        TokenCache::new(provider).with_safety_margin_secs(settings.auth.safety_margin_secs);
    if let Some(path) = &settings.auth.token_cache_file {
        match FileTokenStore::new(path) {
            Ok(store) => {
                info!(path = %store.path().display(), "persisting tokens to file");
                tokens = tokens.with_store(Arc::new(store));
            }
            Err(e) => warn!("token cache file unavailable, continuing in memory: {}", e),
        }
    }

    let graph = Arc::new(GraphClient::new(
        &settings.graph,
        Arc::new(tokens),
        strategy,
        ScopeSet::new(settings.auth.scopes.iter().cloned()),
    )?);
    let resolver = Arc::new(ResourceResolver::from_settings(graph, &settings)?);
    let processor = DocumentProcessor::new(settings.documents)?;
    info!(workers = processor.workers(), "document extraction pool ready");
    let connector = SharePointConnector::from_settings(resolver, processor, &settings);

    let server = McpServer::new(Arc::new(connector));
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP server ready, listening on stdio");

    tokio::select! {
        result = transport.run() => {
            if let Err(e) = result {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
