//! Builds axum responses directly from a [`crate::service::StreamHandle`],
//! streaming article-by-article instead of buffering the whole file (spec
//! §6.3).

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;

use crate::service::stream_service::StreamHandle;

pub fn build_stream_response(handle: StreamHandle) -> Response {
    let status = if handle.is_partial { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, handle.content_type)
        .header(header::CONTENT_LENGTH, handle.content_length.to_string())
        .header(header::ACCEPT_RANGES, "bytes");

    if handle.is_partial {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", handle.start_byte, handle.end_byte, handle.total_size),
        );
    }

    builder
        .body(Body::from_stream(handle.stream))
        .unwrap_or_else(|_| Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty()).unwrap())
}
