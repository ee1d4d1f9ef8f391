use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::SharePointError;

pub type JsonObject = JsonMap<String, JsonValue>;

/// Result-bearing keys checked when deciding whether a payload is empty.
const RESULT_LIST_KEYS: &[&str] = &["results", "items", "libraries", "lists", "hits"];

const QUERY_FIELD_KEYS: &[&str] = &["query", "search_query", "folder_id", "list_name"];

fn build_no_results_message(key: &str, query_hint: Option<String>) -> String {
    let label = match key {
        "results" | "hits" => "results".to_string(),
        other => other.replace('_', " "),
    };

    match query_hint {
        Some(query) => format!("No {} found for \"{}\".", label, query),
        None => format!("No {} found for the requested input.", label),
    }
}

fn maybe_attach_no_results_message(map: &mut JsonObject) -> Option<String> {
    let empty_key = RESULT_LIST_KEYS.iter().find(|key| match map.get(**key) {
        Some(JsonValue::Array(items)) => items.is_empty(),
        _ => false,
    })?;
    if RESULT_LIST_KEYS
        .iter()
        .any(|key| matches!(map.get(*key), Some(JsonValue::Array(items)) if !items.is_empty()))
    {
        return None;
    }

    let query_hint = QUERY_FIELD_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(JsonValue::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let message = build_no_results_message(empty_key, query_hint);
    map.entry("message".to_string())
        .or_insert(JsonValue::String(message.clone()));
    map.entry("no_results".to_string())
        .or_insert(JsonValue::Bool(true));
    Some(message)
}

/// Successful tool result carrying `data` as structured content. Non-object
/// payloads are wrapped under a `data` key.
pub fn structured_result_with_text<T: Serialize>(
    data: &T,
    text_fallback: Option<String>,
) -> Result<CallToolResult, SharePointError> {
    let value = serde_json::to_value(data)?;

    let mut map: JsonObject = match value {
        JsonValue::Object(m) => m,
        other => {
            let mut m = JsonMap::new();
            m.insert("data".to_string(), other);
            m
        }
    };

    maybe_attach_no_results_message(&mut map);

    Ok(CallToolResult {
        content: text_fallback.map(Content::text).into_iter().collect(),
        structured_content: Some(JsonValue::Object(map)),
        is_error: Some(false),
        meta: None,
    })
}

/// Failed tool result: `isError: true` with `{"error": {kind, message}}`.
pub fn error_result(err: &SharePointError) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(err.to_string())],
        structured_content: Some(err.to_tool_payload()),
        is_error: Some(true),
        meta: None,
    }
}

// --- Argument helpers for tool calls ---

pub fn required_str<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str, SharePointError> {
    optional_str(args, key)
        .ok_or_else(|| SharePointError::InvalidParams(format!("missing required argument '{}'", key)))
}

/// String argument; blank strings count as absent.
pub fn optional_str<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn optional_u64(args: &JsonObject, key: &str) -> Result<Option<u64>, SharePointError> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| SharePointError::InvalidParams(format!("'{}' must be a non-negative integer", key))),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SharePointError::InvalidParams(format!("'{}' must be a non-negative integer", key))),
        Some(_) => Err(SharePointError::InvalidParams(format!(
            "'{}' must be a non-negative integer",
            key
        ))),
    }
}

pub fn optional_bool(args: &JsonObject, key: &str) -> Result<Option<bool>, SharePointError> {
    match args.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(SharePointError::InvalidParams(format!("'{}' must be a boolean", key))),
        },
        Some(_) => Err(SharePointError::InvalidParams(format!(
            "'{}' must be a boolean",
            key
        ))),
    }
}

/// Object argument. A JSON-encoded object string is accepted too, since some
/// clients flatten nested arguments.
pub fn required_object(args: &JsonObject, key: &str) -> Result<JsonObject, SharePointError> {
    match args.get(key) {
        Some(JsonValue::Object(map)) => Ok(map.clone()),
        Some(JsonValue::String(s)) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Object(map)) => Ok(map),
            _ => Err(SharePointError::InvalidParams(format!(
                "'{}' must be an object",
                key
            ))),
        },
        Some(_) => Err(SharePointError::InvalidParams(format!(
            "'{}' must be an object",
            key
        ))),
        None => Err(SharePointError::InvalidParams(format!(
            "missing required argument '{}'",
            key
        ))),
    }
}
