use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{Connector, SharePointError};
use rmcp::model::*;

/// MCP server wrapping a single connector.
pub struct McpServer {
    connector: Arc<dyn Connector>,
}

impl McpServer {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub async fn get_capabilities(&self) -> ServerCapabilities {
        self.connector.capabilities().await
    }

    /// Handle initialize request
    pub async fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, SharePointError> {
        info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            "MCP server initializing"
        );
        self.connector.initialize(request).await
    }

    pub async fn handle_list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, SharePointError> {
        self.connector.list_resources(request).await
    }

    pub async fn handle_list_resource_templates(&self) -> Result<Value, SharePointError> {
        let templates = self.connector.list_resource_templates().await?;
        Ok(json!({ "resourceTemplates": templates }))
    }

    pub async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<ReadResourceResult, SharePointError> {
        let contents = self.connector.read_resource(request).await?;
        Ok(ReadResourceResult { contents })
    }

    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, SharePointError> {
        self.connector.list_tools(request).await
    }

    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, SharePointError> {
        self.connector.call_tool(request).await
    }
}

/// JSON-RPC handler for MCP protocol
pub struct JsonRpcHandler {
    server: McpServer,
}

fn encode<T: serde::Serialize>(result: Result<T, SharePointError>) -> Result<Value, Value> {
    result
        .and_then(|r| serde_json::to_value(r).map_err(SharePointError::SerdeJson))
        .map_err(|e| e.to_jsonrpc_error())
}

fn params_of<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, Value> {
    serde_json::from_value::<T>(params).map_err(|e| SharePointError::SerdeJson(e).to_jsonrpc_error())
}

/// Paginated list params; absent or empty params mean the first page.
fn page_params(params: Value) -> Result<Option<PaginatedRequestParam>, Value> {
    match params {
        Value::Null => Ok(None),
        Value::Object(ref map) if map.is_empty() => Ok(None),
        other => params_of(other),
    }
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process one JSON-RPC message. Notifications (no `id`) yield `None`.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            debug!(method, "notification received");
            return None;
        };
        debug!(method, id = %id, "handling JSON-RPC request");

        let result = match method {
            "" => Err(json!({
                "code": -32600,
                "message": "Invalid Request",
                "data": { "kind": "invalid_request" },
            })),
            "initialize" => match params_of::<InitializeRequestParam>(params) {
                Ok(req) => encode(self.server.handle_initialize(req).await),
                Err(e) => Err(e),
            },
            "ping" => Ok(json!({})),
            "resources/list" => match page_params(params) {
                Ok(req) => encode(self.server.handle_list_resources(req).await),
                Err(e) => Err(e),
            },
            "resources/templates/list" => {
                encode(self.server.handle_list_resource_templates().await)
            }
            "resources/read" => match params_of::<ReadResourceRequestParam>(params) {
                Ok(req) => encode(self.server.handle_read_resource(req).await),
                Err(e) => Err(e),
            },
            "tools/list" => match page_params(params) {
                Ok(req) => encode(self.server.handle_list_tools(req).await),
                Err(e) => Err(e),
            },
            "tools/call" => match params_of::<CallToolRequestParam>(params) {
                Ok(req) => encode(self.server.handle_call_tool(req).await),
                Err(e) => Err(e),
            },
            _ => Err(SharePointError::MethodNotFound.to_jsonrpc_error()),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}
