//! Concise projections of Graph payloads returned by tools and resources.

use serde_json::{json, Value};

pub(crate) fn drive_item(item: &Value) -> Value {
    let kind = if item.get("folder").is_some() {
        "folder"
    } else if item.get("file").is_some() {
        "file"
    } else {
        "item"
    };
    json!({
        "id": item.get("id"),
        "name": item.get("name"),
        "kind": kind,
        "size": item.get("size"),
        "mimeType": item.pointer("/file/mimeType"),
        "childCount": item.pointer("/folder/childCount"),
        "webUrl": item.get("webUrl"),
        "lastModifiedDateTime": item.get("lastModifiedDateTime"),
        "lastModifiedBy": item.pointer("/lastModifiedBy/user/displayName"),
    })
}

pub(crate) fn library(drive: &Value) -> Value {
    json!({
        "id": drive.get("id"),
        "name": drive.get("name"),
        "description": drive.get("description"),
        "driveType": drive.get("driveType"),
        "webUrl": drive.get("webUrl"),
        "createdDateTime": drive.get("createdDateTime"),
        "lastModifiedDateTime": drive.get("lastModifiedDateTime"),
    })
}

pub(crate) fn list(list: &Value) -> Value {
    json!({
        "id": list.get("id"),
        "name": list.get("name"),
        "displayName": list.get("displayName"),
        "description": list.get("description"),
        "template": list.pointer("/list/template"),
        "hidden": list.pointer("/list/hidden"),
        "webUrl": list.get("webUrl"),
        "lastModifiedDateTime": list.get("lastModifiedDateTime"),
    })
}

/// Flatten Microsoft Search hits across every response container.
pub(crate) fn search_hits(response: &Value) -> (Vec<Value>, Option<u64>) {
    let mut hits = Vec::new();
    let mut total = None;
    let containers = response
        .get("value")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .flat_map(|r| r.get("hitsContainers").and_then(Value::as_array).into_iter().flatten());
    for container in containers {
        if let Some(n) = container.get("total").and_then(Value::as_u64) {
            total = Some(total.unwrap_or(0) + n);
        }
        for hit in container
            .get("hits")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let resource = hit.get("resource").cloned().unwrap_or(Value::Null);
            hits.push(json!({
                "id": hit.get("hitId"),
                "rank": hit.get("rank"),
                "summary": hit.get("summary"),
                "type": resource.get("@odata.type"),
                "name": resource.get("name").or_else(|| resource.get("displayName")),
                "webUrl": resource.get("webUrl"),
                "size": resource.get("size"),
                "lastModifiedDateTime": resource.get("lastModifiedDateTime"),
                "driveId": resource.pointer("/parentReference/driveId"),
                "siteId": resource.pointer("/parentReference/siteId"),
            }));
        }
    }
    (hits, total)
}
