pub mod error;
pub mod http_stream;
pub mod manifest;
pub mod portal;

pub use error::IptvError;
pub use http_stream::{resolve_segment_target, HttpStreamService, UpstreamResponse};
pub use manifest::HlsManifestRewriter;
pub use portal::{StalkerPortalClient, StreamKind};
