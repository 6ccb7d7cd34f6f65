//! Shared test helpers for Graph API integration tests
//!
//! Provides wiremock-based mock server setup for Microsoft Graph API endpoints.
//! Each helper mounts the necessary mock endpoints; the client returned by
//! [`setup_graph_mock`] points at the mock server and uses millisecond
//! retry delays.

use std::time::Duration;

use spsync_core::domain::FolderHandle;
use spsync_graph::client::{GraphClient, TransportRetry};
use spsync_graph::site::LibraryContext;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SITE_ID: &str = "contoso.sharepoint.com,site-guid,web-guid";
pub const LIST_ID: &str = "list-001";
pub const DRIVE_ID: &str = "drive-001";
pub const ROOT_ID: &str = "root-001";

/// Retry settings with delays short enough for tests.
pub fn fast_retry() -> TransportRetry {
    TransportRetry {
        max_attempts: 3,
        default_retry_after: Duration::from_millis(5),
        unit: Duration::from_millis(1),
    }
}

/// Starts a mock server and returns a (MockServer, GraphClient) tuple.
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_url("test-access-token", server.uri()).with_retry(fast_retry());
    (server, client)
}

/// The library context matching [`mount_library`].
pub fn library_context() -> LibraryContext {
    LibraryContext {
        site_id: SITE_ID.to_string(),
        list_id: LIST_ID.to_string(),
        list_name: "Documents".to_string(),
        drive_id: DRIVE_ID.to_string(),
        root: FolderHandle::new(ROOT_ID).unwrap(),
    }
}

/// Mounts site, lists, drive and root endpoints for `contoso.sharepoint.com/sites/eng`.
pub async fn mount_library(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/sites/contoso.sharepoint.com:/sites/eng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": SITE_ID,
            "displayName": "Engineering"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                {"id": LIST_ID, "name": "Shared Documents", "displayName": "Documents"},
                {"id": "list-002", "name": "SiteAssets", "displayName": "Site Assets"}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/drive")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": DRIVE_ID,
            "driveType": "documentLibrary"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drives/{DRIVE_ID}/root")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": ROOT_ID,
            "name": "root",
            "folder": {"childCount": 0}
        })))
        .mount(server)
        .await;
}

/// Mounts the columns listing of the test library.
pub async fn mount_columns(server: &MockServer, columns: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/columns")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": columns
        })))
        .mount(server)
        .await;
}

/// Mounts the column probe read used during verification.
pub async fn mount_column_probe(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/sites/{SITE_ID}/lists/{LIST_ID}/items")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": []
        })))
        .mount(server)
        .await;
}
