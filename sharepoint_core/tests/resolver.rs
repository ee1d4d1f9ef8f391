mod common;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{graph_client, resolver, CountingProvider};
use sharepoint_core::documents::{DocumentProcessor, FormatTag};
use sharepoint_core::resolver::{ResolvedContent, ResourceResolver, ResourceUri, SiteLocator};
use sharepoint_core::SharePointError;

async fn mount_drives(server: &MockServer, drives: serde_json::Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/drives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": drives })))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn document_uri_downloads_and_extracts_text() {
    let server = MockServer::start().await;
    mount_drives(&server, json!([{"id": "d1", "name": "LibA"}]), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root:/file.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "i1",
            "name": "file.txt",
            "file": {"mimeType": "text/plain"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/items/i1/content"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("quarterly numbers", "text/plain"))
        .mount(&server)
        .await;

    let resolver = resolver(&server, false);
    let resolution = resolver
        .resolve("sharepoint://document/LibA/file.txt")
        .await
        .unwrap();

    assert_eq!(
        resolution.uri,
        ResourceUri::Document {
            library: "LibA".to_string(),
            path: "file.txt".to_string(),
        }
    );
    assert_eq!(resolution.descriptor.drive_id.as_deref(), Some("d1"));
    assert_eq!(resolution.descriptor.item_id.as_deref(), Some("i1"));
    assert!(resolution.warnings.is_empty());

    let ResolvedContent::Document(payload) = resolution.content else {
        panic!("expected document content");
    };
    assert_eq!(payload.content_type.as_deref(), Some("text/plain"));
    let extraction = DocumentProcessor::default().extract(payload).unwrap();
    assert_eq!(extraction.format, FormatTag::Text);
    assert_eq!(extraction.content(), Some("quarterly numbers"));
}

#[tokio::test]
async fn list_items_keep_server_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "l-docs", "displayName": "Documents", "name": "Shared Documents"},
                {"id": "l-tasks", "displayName": "Tasks", "name": "Tasks"},
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/site-1/lists/l-tasks/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "1", "fields": {"Title": "A"}},
                {"id": "2", "fields": {"Title": "B"}},
            ]
        })))
        .mount(&server)
        .await;

    let resolution = resolver(&server, false)
        .resolve("list/tasks")
        .await
        .unwrap();

    assert_eq!(resolution.descriptor.list_id.as_deref(), Some("l-tasks"));
    let ResolvedContent::ListItems(items) = resolution.content else {
        panic!("expected list items");
    };
    let titles: Vec<&str> = items
        .iter()
        .filter_map(|i| i["fields"]["Title"].as_str())
        .collect();
    assert_eq!(titles, vec!["A", "B"]);
}

#[tokio::test]
async fn drive_ids_are_cached_per_library() {
    let server = MockServer::start().await;
    mount_drives(&server, json!([{"id": "d1", "name": "LibA"}]), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "f1", "name": "Reports", "folder": {"childCount": 2}}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = resolver(&server, false);
    for uri in ["documents/LibA", "sharepoint://documents/liba"] {
        let resolution = resolver.resolve(uri).await.unwrap();
        let ResolvedContent::Documents(items) = resolution.content else {
            panic!("expected documents");
        };
        assert_eq!(items.len(), 1);
    }
}

#[tokio::test]
async fn ambiguous_names_warn_unless_strict() {
    let server = MockServer::start().await;
    let drives = json!([
        {"id": "d1", "name": "Shared"},
        {"id": "d2", "name": "shared"},
    ]);
    mount_drives(&server, drives, 2).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let lenient = resolver(&server, false)
        .resolve("documents/Shared")
        .await
        .unwrap();
    assert_eq!(lenient.descriptor.drive_id.as_deref(), Some("d1"));
    assert_eq!(lenient.warnings.len(), 1);
    assert!(lenient.warnings[0].contains("matched 2"));

    let err = resolver(&server, true)
        .resolve("documents/Shared")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SharePointError::AmbiguousResource { matches: 2, .. }
    ));
}

#[tokio::test]
async fn cached_ambiguous_names_keep_warning() {
    let server = MockServer::start().await;
    mount_drives(
        &server,
        json!([
            {"id": "d1", "name": "Shared"},
            {"id": "d2", "name": "shared"},
        ]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let resolver = resolver(&server, false);
    let first = resolver.resolve("documents/Shared").await.unwrap();
    let second = resolver.resolve("documents/shared").await.unwrap();

    assert_eq!(first.warnings.len(), 1);
    assert_eq!(second.warnings.len(), 1);
    assert!(second.warnings[0].contains("matched 2"));
    assert_eq!(second.descriptor.drive_id.as_deref(), Some("d1"));
}

#[tokio::test]
async fn unambiguous_cache_hits_have_no_warnings() {
    let server = MockServer::start().await;
    mount_drives(&server, json!([{"id": "d1", "name": "LibA"}]), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .mount(&server)
        .await;

    let resolver = resolver(&server, false);
    resolver.resolve("documents/LibA").await.unwrap();
    let again = resolver.resolve("documents/LibA").await.unwrap();
    assert!(again.warnings.is_empty());
}

#[tokio::test]
async fn missing_names_are_resource_not_found() {
    let server = MockServer::start().await;
    mount_drives(&server, json!([{"id": "d1", "name": "LibA"}]), 1).await;

    let err = resolver(&server, false)
        .resolve("documents/Nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SharePointError::ResourceNotFound(_)));
    assert_eq!(err.kind(), "resource_not_found");
}

#[tokio::test]
async fn folders_are_not_documents() {
    let server = MockServer::start().await;
    mount_drives(&server, json!([{"id": "d1", "name": "LibA"}]), 1).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/drives/d1/root:/Reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "f1",
            "name": "Reports",
            "folder": {"childCount": 3},
        })))
        .mount(&server)
        .await;

    let err = resolver(&server, false)
        .resolve("document/LibA/Reports")
        .await
        .unwrap_err();
    assert!(matches!(err, SharePointError::ResourceNotFound(_)));
}

#[tokio::test]
async fn site_url_is_looked_up_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/sites/contoso.sharepoint.com:/sites/team"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "contoso.sharepoint.com,abc,def",
            "displayName": "Team",
            "webUrl": "https://contoso.sharepoint.com/sites/team",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let site = SiteLocator::from_url("https://contoso.sharepoint.com/sites/team").unwrap();
    let resolver = ResourceResolver::new(graph_client(&server, CountingProvider::new()), site, false);
    assert_eq!(resolver.site_id().await.unwrap(), "contoso.sharepoint.com,abc,def");
    assert_eq!(resolver.site_id().await.unwrap(), "contoso.sharepoint.com,abc,def");
}

#[tokio::test]
async fn unknown_uri_shapes_fail_before_any_request() {
    let server = MockServer::start().await;
    let err = resolver(&server, false)
        .resolve("sharepoint://calendar/Team")
        .await
        .unwrap_err();
    assert!(matches!(err, SharePointError::ResourceNotFound(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
