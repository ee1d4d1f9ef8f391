use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::mcp_server::JsonRpcHandler;

/// Line-delimited JSON-RPC over a reader/writer pair; stdio in production.
pub struct StdioTransport {
    handler: JsonRpcHandler,
}

impl StdioTransport {
    pub fn new(handler: JsonRpcHandler) -> Self {
        Self { handler }
    }

    /// Run the stdio transport, reading from stdin and writing to stdout
    pub async fn run(&self) -> io::Result<()> {
        info!("Starting stdio transport");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve until the reader reaches EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("EOF reached on input");
                    break;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(response) = self.process_line(line.trim()).await {
                        write_response(&mut writer, &response).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading input: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Process a single line of input
    async fn process_line(&self, line: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handler.handle_request(request).await,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                Some(serde_json::json!({
                    "jsonrpc": "2.0",
                    "error": {
                        "code": -32700,
                        "message": "Parse error",
                        "data": e.to_string()
                    },
                    "id": null
                }))
            }
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> io::Result<()> {
    let response_str = serde_json::to_string(response)?;
    writer.write_all(response_str.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    debug!(bytes = response_str.len(), "sent response");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_server::McpServer;
    use crate::{
        CallToolRequestParam, CallToolResult, Connector, InitializeRequestParam,
        InitializeResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
        ReadResourceRequestParam, ResourceContents, ServerCapabilities, SharePointError,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl Connector for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }
        fn description(&self) -> &'static str {
            ""
        }
        async fn capabilities(&self) -> ServerCapabilities {
            ServerCapabilities::default()
        }
        async fn initialize(
            &self,
            _request: InitializeRequestParam,
        ) -> Result<InitializeResult, SharePointError> {
            Err(SharePointError::Internal("not used".into()))
        }
        async fn list_resources(
            &self,
            _request: Option<PaginatedRequestParam>,
        ) -> Result<ListResourcesResult, SharePointError> {
            Ok(ListResourcesResult {
                resources: vec![],
                next_cursor: None,
            })
        }
        async fn read_resource(
            &self,
            request: ReadResourceRequestParam,
        ) -> Result<Vec<ResourceContents>, SharePointError> {
            Err(SharePointError::ResourceNotFound(request.uri))
        }
        async fn list_tools(
            &self,
            _request: Option<PaginatedRequestParam>,
        ) -> Result<ListToolsResult, SharePointError> {
            Ok(ListToolsResult {
                tools: vec![],
                next_cursor: None,
            })
        }
        async fn call_tool(
            &self,
            request: CallToolRequestParam,
        ) -> Result<CallToolResult, SharePointError> {
            Err(SharePointError::ToolNotFound(request.name.to_string()))
        }
    }

    #[tokio::test]
    async fn answers_each_request_line() {
        let transport = StdioTransport::new(JsonRpcHandler::new(McpServer::new(Arc::new(Silent))));
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"resources/list\"}\n",
        );
        let mut output = Vec::new();
        transport
            .serve(input.as_bytes(), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert!(lines[1]["id"].is_null());
        assert_eq!(lines[2]["id"], 2);
        assert_eq!(lines[2]["result"]["resources"], serde_json::json!([]));
    }
}
