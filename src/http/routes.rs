//! Axum route wiring for the byte-range service (spec §6.3) and the IPTV
//! HLS proxy (spec §6.6).

use std::sync::Arc;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::Stream;
use moka::future::Cache;
use reqwest::Url;
use serde::Serialize;

use crate::error::{NzbStreamerError, Result};
use crate::http::response::build_stream_response;
use crate::iptv::{resolve_segment_target, HttpStreamService, StalkerPortalClient, StreamKind, UpstreamResponse};
use crate::service::{MountInfo, NzbStreamService};

const HLS_ROOT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(600);

#[derive(Clone)]
pub struct IptvState {
    pub portal: Arc<StalkerPortalClient>,
    pub http_stream: Arc<HttpStreamService>,
    /// Last resolved base URL of each channel's manifest, for resolving
    /// relative segment/sub-manifest requests (spec §4.9 "segment dispatch").
    hls_roots: Cache<String, Url>,
}

impl IptvState {
    pub fn new(portal: Arc<StalkerPortalClient>, http_stream: Arc<HttpStreamService>) -> Self {
        Self {
            portal,
            http_stream,
            hls_roots: Cache::builder().time_to_live(HLS_ROOT_CACHE_TTL).build(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stream_service: Arc<NzbStreamService>,
    pub iptv: Option<IptvState>,
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/mounts", post(create_mount))
        .route("/mounts/{mount_id}", get(mount_status))
        .route("/stream/{mount_id}/{file_index}", get(stream_file));

    if state.iptv.is_some() {
        router = router
            .route("/api/livetv/stream/{account}/{channel}", get(livetv_root))
            .route("/api/livetv/stream/{account}/{channel}/{*path}", get(livetv_segment));
    }

    router.with_state(state)
}

#[derive(Serialize)]
struct MountInfoResponse {
    id: String,
    nzb_hash: String,
    total_size: u64,
    status: String,
    file_count: usize,
}

impl From<&MountInfo> for MountInfoResponse {
    fn from(info: &MountInfo) -> Self {
        Self {
            id: info.id.clone(),
            nzb_hash: info.nzb_hash.clone(),
            total_size: info.total_size,
            status: info.status.to_string(),
            file_count: info.media_files.len(),
        }
    }
}

async fn create_mount(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let info = state.stream_service.create_mount(&body).await?;
    Ok((StatusCode::CREATED, Json(MountInfoResponse::from(&info))))
}

async fn mount_status(State(state): State<AppState>, Path(mount_id): Path<String>) -> Result<impl IntoResponse> {
    let info = state
        .stream_service
        .mount_info(&mount_id)
        .await
        .ok_or_else(|| NzbStreamerError::MountNotFound(mount_id.clone()))?;
    Ok(Json(MountInfoResponse::from(&info)))
}

async fn stream_file(
    State(state): State<AppState>,
    Path((mount_id, file_index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Response> {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let handle = state.stream_service.create_stream(&mount_id, file_index, range).await?;
    Ok(build_stream_response(handle))
}

async fn livetv_root(
    State(state): State<AppState>,
    Path((account, channel)): Path<(String, String)>,
) -> Result<Response> {
    livetv_fetch(state, account, channel, None).await
}

async fn livetv_segment(
    State(state): State<AppState>,
    Path((account, channel, path)): Path<(String, String, String)>,
) -> Result<Response> {
    livetv_fetch(state, account, channel, Some(path)).await
}

async fn livetv_fetch(state: AppState, account: String, channel: String, path: Option<String>) -> Result<Response> {
    let iptv = state.iptv.as_ref().ok_or(NzbStreamerError::FileNotFound)?;
    let cache_key = format!("{account}/{channel}");

    let target = match &path {
        None => {
            let cmd = format!("ffrt http://localhost/ch/{channel}");
            iptv.portal.create_link(&cmd, StreamKind::Hls).await?
        }
        Some(p) => {
            let root = iptv.hls_roots.get(&cache_key).await;
            resolve_segment_target(p, root.as_ref())?
        }
    };

    iptv.portal.stream_started();
    let proxy_prefix = format!("/api/livetv/stream/{account}/{channel}/");
    let fetch_result = iptv.http_stream.fetch(&target, &proxy_prefix).await;

    let (upstream, base) = match fetch_result {
        Ok(pair) => pair,
        Err(err) => {
            iptv.portal.stream_stopped();
            return Err(err.into());
        }
    };
    iptv.hls_roots.insert(cache_key, base).await;

    match upstream {
        UpstreamResponse::Hls { body, content_type } => {
            iptv.portal.stream_stopped();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
                .body(Body::from(body))
                .unwrap_or_else(|_| Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap()))
        }
        UpstreamResponse::Media { response } => {
            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::ACCEPT_RANGES, "none")
                .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
            for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::TRANSFER_ENCODING, header::DATE, header::CONNECTION] {
                if let Some(value) = response.headers().get(&name) {
                    builder = builder.header(name, value.clone());
                }
            }
            let guarded = StreamGuard { inner: Box::pin(response.bytes_stream()), portal: Arc::clone(&iptv.portal) };
            Ok(builder
                .body(Body::from_stream(guarded))
                .unwrap_or_else(|_| Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap()))
        }
    }
}

/// Keeps the per-account active-stream counter accurate for long-lived
/// media passthrough bodies: decrements on drop, whether the client
/// disconnects or the upstream stream finishes naturally.
struct StreamGuard {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    portal: Arc<StalkerPortalClient>,
}

impl Stream for StreamGuard {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.as_mut().poll_next(cx)
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.portal.stream_stopped();
    }
}

