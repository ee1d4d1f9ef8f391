use rmcp::model::Tool;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;

fn tool(name: &'static str, description: &'static str, schema: serde_json::Value) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema.as_object().expect("Schema object").clone()),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

pub(crate) fn definitions() -> Vec<Tool> {
    vec![
        tool(
            "search_sharepoint",
            "Search files, list items and sites in the configured SharePoint site using the Microsoft Search API.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "KQL or free-text query" },
                    "size": { "type": "integer", "description": "Max hits (1-100). Default 25.", "minimum": 1, "maximum": 100 },
                    "region": { "type": "string", "description": "Search region (e.g. NAM, EUR). Required by Graph for application permissions." }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "get_site_info",
            "Get id, name, description and URL of the configured SharePoint site.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "list_document_libraries",
            "List the document libraries (drives) of the configured site.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "list_lists",
            "List the SharePoint lists of the configured site.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "list_document_contents",
            "List files and folders in a document library folder. drive_id defaults to the configured DRIVE_ID.",
            json!({
                "type": "object",
                "properties": {
                    "drive_id": { "type": "string" },
                    "folder_id": { "type": "string", "description": "Folder item id. Default is the library root." }
                }
            }),
        ),
        tool(
            "get_document_content",
            "Download a document and extract its content (xlsx, xls, csv, docx, pdf, txt, md, html).",
            json!({
                "type": "object",
                "properties": {
                    "site_id": { "type": "string", "description": "Defaults to the configured SITE_ID" },
                    "drive_id": { "type": "string" },
                    "item_id": { "type": "string" },
                    "filename": { "type": "string", "description": "Used to pick the extractor" }
                },
                "required": ["drive_id", "item_id", "filename"]
            }),
        ),
        tool(
            "create_list_item",
            "Create an item in a list identified by display name.",
            json!({
                "type": "object",
                "properties": {
                    "list_name": { "type": "string" },
                    "fields": { "type": "object", "description": "Column name to value" }
                },
                "required": ["list_name", "fields"]
            }),
        ),
        tool(
            "update_list_item",
            "Update fields of an existing list item.",
            json!({
                "type": "object",
                "properties": {
                    "list_name": { "type": "string" },
                    "item_id": { "type": "string" },
                    "fields": { "type": "object", "description": "Column name to new value" }
                },
                "required": ["list_name", "item_id", "fields"]
            }),
        ),
        tool(
            "create_site",
            "Create a Microsoft 365 group-connected team site.",
            json!({
                "type": "object",
                "properties": {
                    "display_name": { "type": "string" },
                    "alias": { "type": "string", "description": "Mail nickname, also used in the site URL" },
                    "description": { "type": "string" }
                },
                "required": ["display_name", "alias"]
            }),
        ),
        tool(
            "create_list",
            "Create a list in the configured site.",
            json!({
                "type": "object",
                "properties": {
                    "display_name": { "type": "string" },
                    "template": { "type": "string", "description": "List template. Default genericList." },
                    "description": { "type": "string" }
                },
                "required": ["display_name"]
            }),
        ),
        tool(
            "create_document_library",
            "Create a document library in the configured site.",
            json!({
                "type": "object",
                "properties": {
                    "display_name": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["display_name"]
            }),
        ),
        tool(
            "create_page",
            "Create a modern site page, optionally publishing it.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "File name; .aspx is appended when missing" },
                    "title": { "type": "string" },
                    "publish": { "type": "boolean", "description": "Default false" }
                },
                "required": ["name"]
            }),
        ),
        tool(
            "upload_document",
            "Upload a file to a document library. Provide exactly one of content (text) or content_base64.",
            json!({
                "type": "object",
                "properties": {
                    "library_name": { "type": "string" },
                    "file_name": { "type": "string" },
                    "folder_path": { "type": "string", "description": "Folder inside the library, e.g. Reports/2024" },
                    "content": { "type": "string" },
                    "content_base64": { "type": "string" },
                    "content_type": { "type": "string" }
                },
                "required": ["library_name", "file_name"]
            }),
        ),
        tool(
            "check_authentication",
            "Acquire a token and report the strategy, expiry and granted roles/scopes. The token itself is never returned.",
            json!({"type": "object", "properties": {}}),
        ),
    ]
}
