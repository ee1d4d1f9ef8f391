// src/lib.rs
pub mod auth;
pub mod config;
pub mod connectors;
pub mod cpu_pool;
pub mod documents;
pub mod error;
pub mod graph;
pub mod mcp_server;
pub mod resolver;
pub mod transport;
pub mod utils;

// Re-export types from rmcp that users of the library need
pub use rmcp::model::{
    Annotated, CallToolRequestParam, CallToolResult, Content, Implementation,
    InitializeRequestParam, InitializeResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, RawContent, RawResource, ReadResourceRequestParam,
    Resource, ResourceContents, ServerCapabilities, TextContent, Tool,
};

pub use crate::config::Settings;
pub use crate::error::SharePointError;

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique name of the connector (acting as the MCP server name).
    fn name(&self) -> &'static str;

    /// Returns a description of the connector.
    fn description(&self) -> &'static str;

    /// Returns the MCP capabilities of this connector.
    async fn capabilities(&self) -> ServerCapabilities;

    // --- MCP Request Handlers (One for each relevant MCP request type) ---
    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, SharePointError>;
    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, SharePointError>;

    /// Parameterised resources, serialized as MCP resource templates.
    async fn list_resource_templates(&self) -> Result<Vec<Value>, SharePointError> {
        Ok(Vec::new())
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, SharePointError>;
    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, SharePointError>;
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, SharePointError>;
}
