//! SharePoint connector: resources and tools over the Graph client.

mod format;
mod tools;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use rmcp::model::*;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::TokenClaims;
use crate::config::Settings;
use crate::documents::{extension_of, DocumentPayload, DocumentProcessor};
use crate::error::SharePointError;
use crate::graph::GraphClient;
use crate::resolver::{ResolvedContent, ResourceResolver};
use crate::utils::{
    error_result, optional_bool, optional_str, optional_u64, required_object, required_str,
    structured_result_with_text, JsonObject,
};
use crate::Connector;

const DEFAULT_SEARCH_SIZE: u64 = 25;
const MAX_SEARCH_SIZE: u64 = 100;
const SIMPLE_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

pub struct SharePointConnector {
    resolver: Arc<ResourceResolver>,
    processor: DocumentProcessor,
    fallback_site_id: Option<String>,
    fallback_drive_id: Option<String>,
}

impl SharePointConnector {
    pub fn new(resolver: Arc<ResourceResolver>, processor: DocumentProcessor) -> Self {
        Self {
            resolver,
            processor,
            fallback_site_id: None,
            fallback_drive_id: None,
        }
    }

    /// Connector with `SITE_ID`/`DRIVE_ID` fallbacks taken from settings.
    pub fn from_settings(
        resolver: Arc<ResourceResolver>,
        processor: DocumentProcessor,
        settings: &Settings,
    ) -> Self {
        Self::new(resolver, processor)
            .with_fallbacks(settings.site_id.clone(), settings.drive_id.clone())
    }

    pub fn with_fallbacks(mut self, site_id: Option<String>, drive_id: Option<String>) -> Self {
        self.fallback_site_id = site_id.filter(|s| !s.trim().is_empty());
        self.fallback_drive_id = drive_id.filter(|s| !s.trim().is_empty());
        self
    }

    fn graph(&self) -> &GraphClient {
        self.resolver.graph()
    }

    async fn dispatch(&self, name: &str, args: &JsonObject) -> Result<Value, SharePointError> {
        match name {
            "search_sharepoint" => self.search(args).await,
            "get_site_info" => self.resolver.site_info().await,
            "list_document_libraries" => self.list_document_libraries().await,
            "list_lists" => self.list_lists().await,
            "list_document_contents" => self.list_document_contents(args).await,
            "get_document_content" => self.get_document_content(args).await,
            "create_list_item" => self.create_list_item(args).await,
            "update_list_item" => self.update_list_item(args).await,
            "create_site" => self.create_site(args).await,
            "create_list" => self.create_list(args).await,
            "create_document_library" => self.create_document_library(args).await,
            "create_page" => self.create_page(args).await,
            "upload_document" => self.upload_document(args).await,
            "check_authentication" => self.check_authentication().await,
            other => Err(SharePointError::ToolNotFound(other.to_string())),
        }
    }

    async fn search(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let query = required_str(args, "query")?;
        let size = optional_u64(args, "size")?
            .unwrap_or(DEFAULT_SEARCH_SIZE)
            .clamp(1, MAX_SEARCH_SIZE);

        // Scope to the configured site through its URL.
        let site = self.resolver.site_info().await?;
        let query_string = match site.get("webUrl").and_then(Value::as_str) {
            Some(url) => format!("{} path:\"{}\"", query, url),
            None => query.to_string(),
        };

        let mut request = json!({
            "entityTypes": ["driveItem", "listItem", "site"],
            "query": { "queryString": query_string },
            "from": 0,
            "size": size,
        });
        if let Some(region) = optional_str(args, "region") {
            request["region"] = json!(region);
        }
        let response = self
            .graph()
            .post_json("search/query", json!({ "requests": [request] }))
            .await?;
        let (results, total) = format::search_hits(&response);
        Ok(json!({
            "query": query,
            "total": total,
            "count": results.len(),
            "results": results,
        }))
    }

    async fn list_document_libraries(&self) -> Result<Value, SharePointError> {
        let site_id = self.resolver.site_id().await?;
        let drives = self
            .graph()
            .get_collection(&format!("sites/{}/drives", site_id))
            .await?;
        let libraries: Vec<Value> = drives.iter().map(format::library).collect();
        Ok(json!({
            "site_id": site_id,
            "count": libraries.len(),
            "libraries": libraries,
        }))
    }

    async fn list_lists(&self) -> Result<Value, SharePointError> {
        let site_id = self.resolver.site_id().await?;
        let lists = self
            .graph()
            .get_collection(&format!("sites/{}/lists", site_id))
            .await?;
        let lists: Vec<Value> = lists.iter().map(format::list).collect();
        Ok(json!({
            "site_id": site_id,
            "count": lists.len(),
            "lists": lists,
        }))
    }

    fn drive_arg(&self, args: &JsonObject) -> Result<String, SharePointError> {
        optional_str(args, "drive_id")
            .map(str::to_string)
            .or_else(|| self.fallback_drive_id.clone())
            .ok_or_else(|| {
                SharePointError::InvalidParams(
                    "drive_id is required when DRIVE_ID is not configured".to_string(),
                )
            })
    }

    async fn list_document_contents(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let drive_id = self.drive_arg(args)?;
        let folder_id = optional_str(args, "folder_id").unwrap_or("root");
        let items = self
            .graph()
            .get_collection(&format!(
                "drives/{}/items/{}/children",
                urlencoding::encode(&drive_id),
                urlencoding::encode(folder_id)
            ))
            .await?;
        let items: Vec<Value> = items.iter().map(format::drive_item).collect();
        Ok(json!({
            "drive_id": drive_id,
            "folder_id": folder_id,
            "count": items.len(),
            "items": items,
        }))
    }

    async fn get_document_content(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let drive_id = required_str(args, "drive_id")?;
        let item_id = required_str(args, "item_id")?;
        let filename = required_str(args, "filename")?;
        let site_id = optional_str(args, "site_id")
            .map(str::to_string)
            .or_else(|| self.fallback_site_id.clone());

        // Known-unreadable extensions fail before the download; extension-less
        // names are dispatched on the response content type.
        if let Some(extension) = extension_of(filename) {
            if !self.processor.supports(filename) {
                return Err(SharePointError::UnsupportedFormat { extension });
            }
        }

        let path = match &site_id {
            Some(site) => format!("sites/{}/drives/{}/items/{}/content", site, drive_id, item_id),
            None => format!("drives/{}/items/{}/content", drive_id, item_id),
        };
        let response = self.graph().get_bytes(&path).await?;
        let mut payload = DocumentPayload::new(response.body, filename);
        payload.content_type = response.content_type;
        let extraction = self.processor.extract_async(payload).await?;
        Ok(json!({
            "site_id": site_id,
            "drive_id": drive_id,
            "item_id": item_id,
            "filename": filename,
            "document": extraction,
        }))
    }

    async fn create_list_item(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let list_name = required_str(args, "list_name")?;
        let fields = required_object(args, "fields")?;
        let site_id = self.resolver.site_id().await?;
        let mut warnings = Vec::new();
        let list_id = self
            .resolver
            .list_id(&site_id, list_name, &mut warnings)
            .await?;
        let item = self
            .graph()
            .post_json(
                &format!("sites/{}/lists/{}/items", site_id, list_id),
                json!({ "fields": fields }),
            )
            .await?;
        info!(target: "sharepoint.tools", list = list_name, "list item created");
        Ok(json!({
            "list_id": list_id,
            "item_id": item.get("id"),
            "fields": item.get("fields"),
            "webUrl": item.get("webUrl"),
            "warnings": warnings,
        }))
    }

    async fn update_list_item(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let list_name = required_str(args, "list_name")?;
        let item_id = required_str(args, "item_id")?;
        let fields = required_object(args, "fields")?;
        let site_id = self.resolver.site_id().await?;
        let mut warnings = Vec::new();
        let list_id = self
            .resolver
            .list_id(&site_id, list_name, &mut warnings)
            .await?;
        let updated = self
            .graph()
            .patch_json(
                &format!(
                    "sites/{}/lists/{}/items/{}/fields",
                    site_id,
                    list_id,
                    urlencoding::encode(item_id)
                ),
                Value::Object(fields),
            )
            .await?;
        Ok(json!({
            "list_id": list_id,
            "item_id": item_id,
            "fields": updated,
            "warnings": warnings,
        }))
    }

    async fn create_site(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let display_name = required_str(args, "display_name")?;
        let alias = required_str(args, "alias")?;
        if !alias
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(SharePointError::InvalidParams(
                "alias may only contain ASCII letters, digits, '-', '_' and '.'".to_string(),
            ));
        }
        let mut body = json!({
            "displayName": display_name,
            "mailNickname": alias,
            "groupTypes": ["Unified"],
            "mailEnabled": true,
            "securityEnabled": false,
        });
        if let Some(description) = optional_str(args, "description") {
            body["description"] = json!(description);
        }
        let group = self.graph().post_json("groups", body).await?;
        info!(target: "sharepoint.tools", alias, "group-connected site requested");
        Ok(json!({
            "group_id": group.get("id"),
            "displayName": group.get("displayName"),
            "alias": alias,
            "site_lookup": group
                .get("id")
                .and_then(Value::as_str)
                .map(|id| format!("groups/{}/sites/root", id)),
            "note": "The team site is provisioned asynchronously and may take a few minutes to appear.",
        }))
    }

    async fn create_list_with_template(
        &self,
        display_name: &str,
        template: &str,
        description: Option<&str>,
    ) -> Result<(String, Value), SharePointError> {
        let site_id = self.resolver.site_id().await?;
        let mut body = json!({
            "displayName": display_name,
            "list": { "template": template },
        });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        let created = self
            .graph()
            .post_json(&format!("sites/{}/lists", site_id), body)
            .await?;
        info!(target: "sharepoint.tools", list = display_name, template, "list created");
        Ok((site_id, created))
    }

    async fn create_list(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let display_name = required_str(args, "display_name")?;
        let template = optional_str(args, "template").unwrap_or("genericList");
        let (_, created) = self
            .create_list_with_template(display_name, template, optional_str(args, "description"))
            .await?;
        Ok(json!({ "list": format::list(&created) }))
    }

    async fn create_document_library(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let display_name = required_str(args, "display_name")?;
        let (site_id, created) = self
            .create_list_with_template(
                display_name,
                "documentLibrary",
                optional_str(args, "description"),
            )
            .await?;

        let mut warnings = Vec::new();
        let drive = match created.get("id").and_then(Value::as_str) {
            Some(list_id) => match self
                .graph()
                .get_json(&format!("sites/{}/lists/{}/drive", site_id, list_id))
                .await
            {
                Ok(drive) => Some(format::library(&drive)),
                Err(e) => {
                    warnings.push(format!("library drive lookup failed: {}", e));
                    None
                }
            },
            None => None,
        };
        Ok(json!({
            "list": format::list(&created),
            "drive": drive,
            "warnings": warnings,
        }))
    }

    async fn create_page(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let name = required_str(args, "name")?;
        let file_name = if name.to_ascii_lowercase().ends_with(".aspx") {
            name.to_string()
        } else {
            format!("{}.aspx", name)
        };
        let title = optional_str(args, "title")
            .map(str::to_string)
            .unwrap_or_else(|| file_name.trim_end_matches(".aspx").to_string());
        let publish = optional_bool(args, "publish")?.unwrap_or(false);

        let site_id = self.resolver.site_id().await?;
        let page = self
            .graph()
            .post_json(
                &format!("sites/{}/pages", site_id),
                json!({
                    "@odata.type": "#microsoft.graph.sitePage",
                    "name": file_name,
                    "title": title,
                    "pageLayout": "article",
                }),
            )
            .await?;
        let page_id = page.get("id").and_then(Value::as_str).map(str::to_string);

        let published = match (&page_id, publish) {
            (Some(id), true) => {
                self.graph()
                    .call(
                        reqwest::Method::POST,
                        &format!("sites/{}/pages/{}/microsoft.graph.sitePage/publish", site_id, id),
                        None,
                    )
                    .await?;
                true
            }
            _ => false,
        };
        Ok(json!({
            "page_id": page_id,
            "name": page.get("name"),
            "title": page.get("title"),
            "webUrl": page.get("webUrl"),
            "published": published,
        }))
    }

    async fn upload_document(&self, args: &JsonObject) -> Result<Value, SharePointError> {
        let library = required_str(args, "library_name")?;
        let file_name = required_str(args, "file_name")?;
        if file_name.contains('/') || file_name.contains('\\') {
            return Err(SharePointError::InvalidParams(
                "file_name must not contain path separators; use folder_path".to_string(),
            ));
        }
        let bytes = match (
            args.get("content").and_then(Value::as_str),
            optional_str(args, "content_base64"),
        ) {
            (Some(text), None) => text.as_bytes().to_vec(),
            (None, Some(encoded)) => STANDARD.decode(encoded).map_err(|e| {
                SharePointError::InvalidParams(format!("content_base64 is not valid base64: {}", e))
            })?,
            (Some(_), Some(_)) => {
                return Err(SharePointError::InvalidParams(
                    "provide either content or content_base64, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(SharePointError::InvalidParams(
                    "one of content or content_base64 is required".to_string(),
                ))
            }
        };
        let content_type = optional_str(args, "content_type")
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(file_name).to_string());

        let site_id = self.resolver.site_id().await?;
        let mut warnings = Vec::new();
        let drive_id = self
            .resolver
            .drive_id(&site_id, library, &mut warnings)
            .await?;

        let mut segments: Vec<String> = optional_str(args, "folder_path")
            .unwrap_or_default()
            .split('/')
            .filter(|s| !s.trim().is_empty())
            .map(|s| urlencoding::encode(s.trim()).into_owned())
            .collect();
        segments.push(urlencoding::encode(file_name).into_owned());
        let path = format!("drives/{}/root:/{}:/content", drive_id, segments.join("/"));

        if bytes.len() > SIMPLE_UPLOAD_LIMIT {
            warn!(
                target: "sharepoint.tools",
                bytes = bytes.len(),
                "upload exceeds 4 MiB; Graph may reject a simple upload"
            );
        }
        let size = bytes.len();
        let item = self.graph().put_bytes(&path, bytes, &content_type).await?;
        info!(target: "sharepoint.tools", library, bytes = size, "document uploaded");
        Ok(json!({
            "drive_id": drive_id,
            "item": format::drive_item(&item),
            "warnings": warnings,
        }))
    }

    async fn check_authentication(&self) -> Result<Value, SharePointError> {
        let graph = self.graph();
        let token = graph.current_token().await?;
        let expires_at = token.expires_at();
        let mut hints = Vec::new();

        let claims = match TokenClaims::decode_unverified(token.access_token()) {
            Ok(claims) => {
                if claims.roles.is_empty() && claims.scopes.is_empty() {
                    hints.push(
                        "token carries no roles or scp claims; grant Sites.* permissions and admin consent"
                            .to_string(),
                    );
                } else if !claims.has_sites_permission() {
                    hints.push(
                        "token has no Sites.* permission; SharePoint calls will return 403"
                            .to_string(),
                    );
                }
                Some(claims)
            }
            Err(e) => {
                debug!(target: "sharepoint.tools", error = %e, "token claims unreadable");
                hints.push("access token is opaque; claims could not be inspected".to_string());
                None
            }
        };

        Ok(json!({
            "authenticated": true,
            "strategy": graph.strategy().kind().as_str(),
            "authority": token.authority(),
            "requested_scopes": graph.scopes().iter().collect::<Vec<_>>(),
            "expires_at": expires_at.to_rfc3339(),
            "expires_in_secs": (expires_at - Utc::now()).num_seconds().max(0),
            "claims": claims,
            "hints": hints,
        }))
    }

    async fn read_resolution(&self, uri: &str) -> Result<Value, SharePointError> {
        let resolution = self.resolver.resolve(uri).await?;
        let content = match resolution.content {
            ResolvedContent::Site(site) => json!({ "site": site }),
            ResolvedContent::Documents(items) => {
                let items: Vec<Value> = items.iter().map(format::drive_item).collect();
                json!({ "count": items.len(), "items": items })
            }
            ResolvedContent::ListItems(items) => json!({ "count": items.len(), "items": items }),
            ResolvedContent::Document(payload) => {
                json!({ "document": self.processor.extract_async(payload).await? })
            }
        };
        let mut value = json!({
            "uri": uri,
            "descriptor": resolution.descriptor,
            "warnings": resolution.warnings,
        });
        if let (Some(target), Value::Object(extra)) = (value.as_object_mut(), content) {
            target.extend(extra);
        }
        Ok(value)
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("pptx") => {
            "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        }
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn resource_template(uri_template: &str, name: &str, description: &str) -> Value {
    json!({
        "uriTemplate": uri_template,
        "name": name,
        "description": description,
        "mimeType": "application/json",
    })
}

#[async_trait]
impl Connector for SharePointConnector {
    fn name(&self) -> &'static str {
        "sharepoint"
    }

    fn description(&self) -> &'static str {
        "SharePoint Online via Microsoft Graph: site info, document libraries, lists, document content extraction and authoring."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(Default::default()),
            resources: Some(Default::default()),
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, SharePointError> {
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities().await,
            server_info: Implementation {
                name: "sharepoint_mcp".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read SharePoint content through sharepoint:// resources (site-info, documents/{library}, list/{name}, document/{library}/{path}) and act on the site with the tools."
                    .to_string(),
            ),
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, SharePointError> {
        let mut site = RawResource::new("sharepoint://site-info", "site-info");
        site.description = Some("Summary of the configured SharePoint site".to_string());
        site.mime_type = Some("application/json".to_string());
        Ok(ListResourcesResult {
            resources: vec![site.no_annotation()],
            next_cursor: None,
        })
    }

    async fn list_resource_templates(&self) -> Result<Vec<Value>, SharePointError> {
        Ok(vec![
            resource_template(
                "sharepoint://documents/{library_name}",
                "documents",
                "Files and folders at the root of a document library",
            ),
            resource_template(
                "sharepoint://list/{list_name}",
                "list",
                "Items of a SharePoint list, in server order",
            ),
            resource_template(
                "sharepoint://document/{library_name}/{file_path}",
                "document",
                "Extracted content of a document in a library",
            ),
        ])
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, SharePointError> {
        let value = self.read_resolution(&request.uri).await?;
        let text = serde_json::to_string_pretty(&value)?;
        Ok(vec![ResourceContents::text(text, request.uri)])
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, SharePointError> {
        Ok(ListToolsResult {
            tools: tools::definitions(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, SharePointError> {
        let args = request.arguments.unwrap_or_default();
        let name: &str = &request.name;
        let started = Instant::now();
        match self.dispatch(name, &args).await {
            Ok(value) => {
                debug!(
                    target: "sharepoint.tools",
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call succeeded"
                );
                structured_result_with_text(&value, None)
            }
            Err(SharePointError::ToolNotFound(tool)) => Err(SharePointError::ToolNotFound(tool)),
            Err(err) => {
                warn!(
                    target: "sharepoint.tools",
                    tool = name,
                    kind = err.kind(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call failed: {}",
                    err
                );
                Ok(error_result(&err))
            }
        }
    }
}
