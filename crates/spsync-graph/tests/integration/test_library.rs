//! Library resolution, column management, probes, folders and metadata writes

use std::time::Duration;

use spsync_core::domain::{Fingerprint, FolderHandle};
use spsync_core::ports::{FolderCreation, MetadataWrite, ProbeResult, RemoteFingerprint, RemoteItemKind};
use spsync_graph::columns::ColumnCapabilityManager;
use spsync_graph::{batch, items, probe, site};
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, DRIVE_ID, LIST_ID, ROOT_ID, SITE_ID};

// ============================================================================
// Site and library resolution
// ============================================================================

#[tokio::test]
async fn test_resolve_library() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_library(&server).await;

    let context = site::resolve_library(&client, "contoso.sharepoint.com", "eng", "Documents")
        .await
        .unwrap();
    assert_eq!(context, common::library_context());
}

#[tokio::test]
async fn test_unknown_library_falls_back_to_default() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_library(&server).await;

    let context = site::resolve_library(&client, "contoso.sharepoint.com", "eng", "Archive")
        .await
        .unwrap();
    assert_eq!(context.list_id, LIST_ID);
    assert_eq!(context.list_name, "Documents");
}

#[tokio::test]
async fn test_missing_site_is_fatal() {
    let (_server, client) = common::setup_graph_mock().await;

    let result = site::resolve_library(&client, "contoso.sharepoint.com", "nope", "Documents").await;
    assert!(result.is_err());
}

// ============================================================================
// Column capability
// ============================================================================

#[tokio::test]
async fn test_ensure_column_existing() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(
        &server,
        serde_json::json!([
            {"id": "c1", "name": "FileHash", "displayName": "File Hash", "text": {"maxLength": 255}}
        ]),
    )
    .await;
    common::mount_column_probe(&server).await;

    let manager = ColumnCapabilityManager::new(client, "FileHash");
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(status.available);
    assert_eq!(status.field_name, "FileHash");
    assert_eq!(status.library_name, "Documents");
}

async fn mount_refused_create(server: &wiremock::MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_ensure_column_matches_display_name_ignoring_case() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(
        &server,
        serde_json::json!([
            {"id": "c1", "name": "FileHash", "displayName": "FileHash", "text": {"maxLength": 255}}
        ]),
    )
    .await;
    common::mount_column_probe(&server).await;
    mount_refused_create(&server).await;

    let manager = ColumnCapabilityManager::new(client, "filehash");
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(status.available);
    assert_eq!(status.field_name, "FileHash");
}

#[tokio::test]
async fn test_ensure_column_matches_encoded_internal_name() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(
        &server,
        serde_json::json!([
            {"id": "c2", "name": "Content_x0020_Hash", "displayName": "Checksum", "text": {"maxLength": 255}}
        ]),
    )
    .await;
    common::mount_column_probe(&server).await;
    mount_refused_create(&server).await;

    let manager = ColumnCapabilityManager::new(client, "Content Hash");
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(status.available);
    assert_eq!(status.field_name, "Content_x0020_Hash");
}

#[tokio::test]
async fn test_ensure_column_creates_missing_column() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(&server, serde_json::json!([])).await;
    common::mount_column_probe(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .and(body_partial_json(serde_json::json!({
            "name": "FileHash",
            "hidden": false,
            "readOnly": false,
            "text": {"allowMultipleLines": false, "maxLength": 255}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "c-new",
            "name": "FileHash",
            "displayName": "FileHash",
            "text": {"maxLength": 255}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = ColumnCapabilityManager::new(client, "FileHash")
        .with_post_create_wait(Duration::from_millis(1));
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(status.available);
}

#[tokio::test]
async fn test_ensure_column_creation_refused() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(&server, serde_json::json!([])).await;

    Mock::given(method("POST"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let manager = ColumnCapabilityManager::new(client, "FileHash");
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(!status.available);
}

#[tokio::test]
async fn test_ensure_column_soft_issues_still_available() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(
        &server,
        serde_json::json!([
            {"id": "c1", "name": "FileHash", "displayName": "FileHash", "hidden": true, "text": {"maxLength": 16}}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/items")))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let manager = ColumnCapabilityManager::new(client, "FileHash");
    let status = manager.ensure_column(&common::library_context()).await;
    assert!(status.available);
}

#[tokio::test]
async fn test_resolve_field_name_from_loaded_mapping() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_columns(
        &server,
        serde_json::json!([
            {"id": "c1", "name": "Content_x0020_Hash", "displayName": "Content Hash", "text": {}}
        ]),
    )
    .await;

    let manager = ColumnCapabilityManager::new(client, "Content Hash");
    manager.load_mapping(&common::library_context()).await.unwrap();
    assert_eq!(
        manager.resolve_field_name(SITE_ID, LIST_ID, "content hash"),
        "Content_x0020_Hash"
    );
}

// ============================================================================
// Probe
// ============================================================================

fn root() -> FolderHandle {
    FolderHandle::new(ROOT_ID).unwrap()
}

#[tokio::test]
async fn test_probe_not_found() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/a.txt")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = probe::probe_item(&client, DRIVE_ID, &root(), "a.txt", Some("FileHash")).await;
    assert_eq!(result, ProbeResult::NotFound);
}

#[tokio::test]
async fn test_probe_reads_fingerprint() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/a.txt")))
        .and(query_param("$expand", "listItem($expand=fields($select=FileHash))"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "item-a",
            "name": "a.txt",
            "size": 5,
            "file": {},
            "listItem": {"fields": {"FileHash": "0123456789abcdef0123456789abcdef"}}
        })))
        .mount(&server)
        .await;

    let ProbeResult::Found(meta) =
        probe::probe_item(&client, DRIVE_ID, &root(), "a.txt", Some("FileHash")).await
    else {
        panic!("expected item to be found");
    };
    assert_eq!(meta.id, "item-a");
    assert_eq!(meta.kind, RemoteItemKind::File);
    assert_eq!(meta.size, Some(5));
    assert_eq!(
        meta.fingerprint,
        RemoteFingerprint::Value(Fingerprint::new("0123456789abcdef0123456789abcdef"))
    );
}

#[tokio::test]
async fn test_probe_falls_back_to_plain_read() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/a.txt")))
        .and(query_param("$expand", "listItem($expand=fields($select=FileHash))"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/a.txt")))
        .and(query_param_is_missing("$expand"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "item-a",
            "name": "a.txt",
            "size": 5
        })))
        .mount(&server)
        .await;

    let ProbeResult::Found(meta) =
        probe::probe_item(&client, DRIVE_ID, &root(), "a.txt", Some("FileHash")).await
    else {
        panic!("expected item to be found");
    };
    assert!(matches!(meta.fingerprint, RemoteFingerprint::Unreadable(_)));
    assert_eq!(meta.size, Some(5));
}

#[tokio::test]
async fn test_probe_without_column() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/docs")))
        .and(query_param_is_missing("$expand"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "folder-docs",
            "name": "docs",
            "folder": {"childCount": 1}
        })))
        .mount(&server)
        .await;

    let ProbeResult::Found(meta) = probe::probe_item(&client, DRIVE_ID, &root(), "docs", None).await
    else {
        panic!("expected item to be found");
    };
    assert_eq!(meta.kind, RemoteItemKind::Folder);
    assert_eq!(meta.fingerprint, RemoteFingerprint::ColumnUnavailable);
}

#[tokio::test]
async fn test_probe_forbidden_is_error() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}:/a.txt")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let result = probe::probe_item(&client, DRIVE_ID, &root(), "a.txt", None).await;
    assert!(matches!(result, ProbeResult::Error(_)));
}

// ============================================================================
// Folders
// ============================================================================

#[tokio::test]
async fn test_create_folder_and_conflict() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .and(body_partial_json(serde_json::json!({
            "name": "docs",
            "@microsoft.graph.conflictBehavior": "fail"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "folder-docs",
            "name": "docs",
            "folder": {"childCount": 0}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": {"code": "nameAlreadyExists"}
        })))
        .mount(&server)
        .await;

    let first = items::create_folder(&client, DRIVE_ID, &root(), "docs").await.unwrap();
    assert_eq!(
        first,
        FolderCreation::Created(FolderHandle::new("folder-docs").unwrap())
    );

    let second = items::create_folder(&client, DRIVE_ID, &root(), "docs").await.unwrap();
    assert_eq!(second, FolderCreation::AlreadyExists);
}

#[tokio::test]
async fn test_list_children_follows_next_link() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/items/{ROOT_ID}/children")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{"id": "1", "name": "docs", "folder": {}}],
            "@odata.nextLink": format!("{}/page2", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{"id": "2", "name": "a.txt", "size": 5, "file": {}}]
        })))
        .mount(&server)
        .await;

    let children = items::list_children(&client, DRIVE_ID, &root()).await.unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].kind, RemoteItemKind::Folder);
    assert_eq!(children[1].name, "a.txt");
}

#[tokio::test]
async fn test_delete_missing_item_succeeds() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{DRIVE_ID}/items/gone")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/drives/{DRIVE_ID}/items/there")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    items::delete_item(&client, DRIVE_ID, "gone").await.unwrap();
    items::delete_item(&client, DRIVE_ID, "there").await.unwrap();
}

// ============================================================================
// Metadata writes
// ============================================================================

#[tokio::test]
async fn test_write_single_fingerprint() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("PATCH"))
        .and(path(format!("/drives/{DRIVE_ID}/items/item-a/listItem/fields")))
        .and(body_partial_json(serde_json::json!({"FileHash": "abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"FileHash": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    batch::write_fingerprint(&client, DRIVE_ID, "FileHash", "item-a", &Fingerprint::new("abc"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_batch_write_maps_responses_by_id() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "responses": [
                {"id": "1", "status": 500, "body": {}},
                {"id": "0", "status": 200, "body": {}}
            ]
        })))
        .mount(&server)
        .await;

    let writes: Vec<MetadataWrite> = ["a", "b", "c"]
        .iter()
        .map(|id| MetadataWrite {
            item_id: id.to_string(),
            fingerprint: Fingerprint::new("0123456789abcdef0123456789abcdef"),
        })
        .collect();

    let results = batch::write_fingerprints(&client, DRIVE_ID, "FileHash", &writes, 20).await;
    assert_eq!(results.len(), 3);
    assert_eq!(results["a"], true);
    assert_eq!(results["b"], false);
    // No sub-response for "c"
    assert_eq!(results["c"], false);
}

#[tokio::test]
async fn test_batch_write_splits_by_batch_size() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "responses": [
                {"id": "0", "status": 204},
                {"id": "1", "status": 204}
            ]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let writes: Vec<MetadataWrite> = (0..5)
        .map(|i| MetadataWrite {
            item_id: format!("item-{i}"),
            fingerprint: Fingerprint::new("0123456789abcdef0123456789abcdef"),
        })
        .collect();

    let results = batch::write_fingerprints(&client, DRIVE_ID, "FileHash", &writes, 2).await;
    assert_eq!(results.len(), 5);
    assert!(results.values().all(|ok| *ok));
}

#[tokio::test]
async fn test_batch_request_failure_marks_all_failed() {
    let (server, client) = common::setup_graph_mock().await;
    Mock::given(method("POST"))
        .and(path("/$batch"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let writes = vec![MetadataWrite {
        item_id: "a".into(),
        fingerprint: Fingerprint::new("0123456789abcdef0123456789abcdef"),
    }];
    let results = batch::write_fingerprints(&client, DRIVE_ID, "FileHash", &writes, 20).await;
    assert_eq!(results["a"], false);
}
