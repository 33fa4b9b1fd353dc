use std::error::Error as StdError;

use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::iptv::error::IptvError;
use crate::nntp::error::NntpError;
use crate::nzb::error::NzbError;
use crate::rar::error::RarError;
use crate::stream::error::StreamError;

pub type Result<T> = std::result::Result<T, NzbStreamerError>;

/// Crate-wide error, composed from each subsystem's own error type.
///
/// Subsystems keep their own `thiserror` enums (see `nntp::error`,
/// `nzb::error`, `rar::error`, `stream::error`, `iptv::error`) so a caller
/// working within one subsystem never has to match on variants belonging to
/// another. This enum exists for code paths that cut across subsystem
/// boundaries: the HTTP layer and `main.rs`.
#[derive(Debug, Error)]
pub enum NzbStreamerError {
    #[error(transparent)]
    Nntp(#[from] NntpError),

    #[error(transparent)]
    Nzb(#[from] NzbError),

    #[error(transparent)]
    Rar(#[from] RarError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Iptv(#[from] IptvError),

    #[error("mount not found: {0}")]
    MountNotFound(String),

    #[error("mount not ready: {status}")]
    MountNotReady { status: String },

    #[error("file not found in mount")]
    FileNotFound,
}

impl IntoResponse for NzbStreamerError {
    fn into_response(self) -> Response {
        error!(error = %self, source = ?self.source(), "request failed");

        let status = match &self {
            NzbStreamerError::MountNotFound(_) | NzbStreamerError::FileNotFound => {
                StatusCode::NOT_FOUND
            }
            NzbStreamerError::MountNotReady { .. } => StatusCode::CONFLICT,
            NzbStreamerError::Stream(StreamError::InvalidRange) => {
                StatusCode::RANGE_NOT_SATISFIABLE
            }
            NzbStreamerError::Stream(StreamError::ArticleMissing { .. })
            | NzbStreamerError::Nntp(NntpError::ArticleNotFoundEverywhere { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            NzbStreamerError::Nntp(NntpError::PoolTimeout)
            | NzbStreamerError::Nntp(NntpError::ConnectionTimeout) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            NzbStreamerError::Rar(RarError::NotStreamable(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(json!({ "error": self.to_string() }));
        (status, payload).into_response()
    }
}
