//! Integration tests for the Zotero Web API client.
//!
//! These tests run the reqwest client against a wiremock server.

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zotsync_core::remote::{
    ClientOptions, FileFetch, ItemType, RemoteError, RemoteLibrary, RetryPolicy, ZoteroClient,
};
use zotsync_core::LibraryId;

fn client(server: &MockServer) -> ZoteroClient {
    let options = ClientOptions {
        base_url: server.uri(),
        ..ClientOptions::default()
    };
    ZoteroClient::new(&options, "secret-key", "123").expect("client should build")
}

fn collection(key: &str, name: &str, parent: serde_json::Value) -> serde_json::Value {
    json!({
        "key": key,
        "version": 7,
        "data": { "key": key, "name": name, "parentCollection": parent },
        "meta": { "numItems": 2 }
    })
}

#[tokio::test]
async fn test_list_collections_follows_next_links() {
    let server = MockServer::start().await;
    let next = format!(
        "<{}/users/123/collections?limit=100&start=100>; rel=\"next\", <{}/users/123/collections?limit=100&start=100>; rel=\"last\"",
        server.uri(),
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .and(query_param("limit", "100"))
        .and(query_param_is_missing("start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([collection("AAAA1111", "Papers", json!(false))])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .and(query_param("start", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([collection("BBBB2222", "Drafts", json!("AAAA1111"))])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let collections = client(&server)
        .list_collections(LibraryId::Personal)
        .await
        .expect("listing should succeed");

    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].key, "AAAA1111");
    assert_eq!(collections[0].parent_key, None);
    assert_eq!(collections[0].item_count, 2);
    assert_eq!(collections[1].parent_key.as_deref(), Some("AAAA1111"));
}

#[tokio::test]
async fn test_requests_carry_api_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/groups"))
        .and(header("Zotero-API-Key", "secret-key"))
        .and(header("Zotero-API-Version", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 42, "data": { "id": 42, "name": "Lab" } },
            { "id": 43, "data": { "id": 43 } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let groups = client(&server).list_groups().await.expect("groups should list");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].id, 42);
    assert_eq!(groups[0].name, "Lab");
    assert_eq!(groups[1].name, "Group 43");
}

#[tokio::test]
async fn test_group_library_items_and_children_paths() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/42/items/top"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "key": "ITEM0001",
                "data": { "itemType": "journalArticle", "title": "On Things", "collections": ["AAAA1111"] }
            },
            { "key": "NOTE0001", "data": { "itemType": "note" } }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/42/items/ITEM0001/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "key": "ATT00001",
                "data": {
                    "itemType": "attachment",
                    "contentType": "application/pdf",
                    "filename": "things.pdf",
                    "parentItem": "ITEM0001"
                }
            }
        ])))
        .mount(&server)
        .await;

    let client = client(&server);
    let items = client
        .list_top_level_items(LibraryId::Group(42))
        .await
        .expect("items should list");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title.as_deref(), Some("On Things"));
    assert_eq!(items[1].item_type, ItemType::Note);

    let children = client
        .list_children("ITEM0001", LibraryId::Group(42))
        .await
        .expect("children should list");
    assert_eq!(children.len(), 1);
    assert!(children[0].is_pdf_attachment());
    assert_eq!(children[0].parent_item.as_deref(), Some("ITEM0001"));
}

#[tokio::test]
async fn test_download_file_distinguishes_outcomes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/items/FOUND001/file"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 body".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/123/items/MISSING1/file"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/123/items/BROKEN01/file"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client(&server);
    match client.download_file("FOUND001", LibraryId::Personal).await {
        FileFetch::Found(bytes) => assert_eq!(bytes, b"%PDF-1.7 body"),
        other => panic!("expected bytes, got {other:?}"),
    }
    assert!(matches!(
        client.download_file("MISSING1", LibraryId::Personal).await,
        FileFetch::NotFound
    ));
    match client.download_file("BROKEN01", LibraryId::Personal).await {
        FileFetch::Failed(error) => assert_eq!(error.status(), Some(500)),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_does_not_retry_on_its_own() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).list_collections(LibraryId::Personal).await;
    assert!(matches!(
        result,
        Err(RemoteError::HttpStatus { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_retry_policy_retries_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let result = RetryPolicy::immediate(3)
        .run("list_collections", || client.list_collections(LibraryId::Personal))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_rate_limit_keeps_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/items/top"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let result = client(&server).list_top_level_items(LibraryId::Personal).await;
    match result {
        Err(RemoteError::HttpStatus {
            status,
            retry_after,
            ..
        }) => {
            assert_eq!(status, 429);
            assert_eq!(retry_after.as_deref(), Some("7"));
        }
        other => panic!("expected 429, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
        .mount(&server)
        .await;

    let result = client(&server).list_collections(LibraryId::Personal).await;
    assert!(matches!(result, Err(RemoteError::Decode { .. })));
}

#[tokio::test]
async fn test_base_url_with_path_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/users/123/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let options = ClientOptions {
        base_url: format!("{}/api/v3/", server.uri()),
        ..ClientOptions::default()
    };
    let client = ZoteroClient::new(&options, "k", "123").expect("client should build");
    assert!(client.list_groups().await.expect("should list").is_empty());
}

#[tokio::test]
async fn test_malformed_record_skipped_without_losing_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            collection("GOOD0001", "Papers", json!(false)),
            { "key": "BAD00002", "version": 3, "data": { "parentCollection": false } }
        ])))
        .mount(&server)
        .await;

    let collections = client(&server)
        .list_collections(LibraryId::Personal)
        .await
        .expect("a bad record must not fail the listing");
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].key, "GOOD0001");
    assert_eq!(collections[0].name, "Papers");
}

#[tokio::test]
async fn test_next_link_to_foreign_origin_not_followed() {
    let server = MockServer::start().await;
    let foreign = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&foreign)
        .await;

    let next = format!(
        "<{}/users/123/collections?limit=100&start=100>; rel=\"next\"",
        foreign.uri()
    );
    Mock::given(method("GET"))
        .and(path("/users/123/collections"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([collection("AAAA1111", "Papers", json!(false))])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let collections = client(&server)
        .list_collections(LibraryId::Personal)
        .await
        .expect("listing should succeed");
    assert_eq!(collections.len(), 1);
}
