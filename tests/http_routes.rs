use std::sync::Arc;

use axum_test::TestServer;
use usenet_streamer::http::routes::{router, AppState};
use usenet_streamer::nntp::NntpClientManager;
use usenet_streamer::service::{InMemoryMountStore, NzbCache, NzbStreamService};

fn test_app() -> TestServer {
    let client_manager = Arc::new(NntpClientManager::new(vec![]));
    let mounts = Arc::new(InMemoryMountStore::new());
    let stream_service = Arc::new(NzbStreamService::new(mounts, NzbCache::new(), client_manager));
    let state = AppState { stream_service, iptv: None };
    TestServer::new(router(state)).unwrap()
}

const ONE_FILE_NZB: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <file poster="poster@example.com" date="1700000000" subject="&quot;Sample.mp4&quot; yEnc (1/1)">
    <groups><group>alt.binaries.test</group></groups>
    <segments>
      <segment bytes="1000" number="1">msg1@server.com</segment>
    </segments>
  </file>
</nzb>"#;

#[tokio::test]
async fn unknown_mount_returns_404() {
    let server = test_app();
    let response = server.get("/mounts/does-not-exist").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn creating_a_mount_returns_its_id_and_size() {
    let server = test_app();
    let response = server.post("/mounts").bytes(ONE_FILE_NZB.as_bytes().to_vec().into()).await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = response.json();
    let mount_id = body["id"].as_str().expect("id field present").to_string();
    assert_eq!(body["total_size"], 1000);

    let fetched = server.get(&format!("/mounts/{mount_id}")).await;
    fetched.assert_status_ok();
}

#[tokio::test]
async fn malformed_nzb_upload_is_rejected() {
    let server = test_app();
    let response = server.post("/mounts").bytes(b"not an nzb".to_vec().into()).await;
    response.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn streaming_before_mount_is_ready_returns_409() {
    let server = test_app();
    let create = server.post("/mounts").bytes(ONE_FILE_NZB.as_bytes().to_vec().into()).await;
    let body: serde_json::Value = create.json();
    let mount_id = body["id"].as_str().unwrap();

    // The background RAR-analysis task has not necessarily finished yet;
    // either outcome below is a valid response to a stream request.
    let stream = server.get(&format!("/stream/{mount_id}/0")).await;
    assert!(stream.status_code() == axum::http::StatusCode::CONFLICT || stream.status_code().is_success());
}
