pub mod config;
pub mod error;
pub mod http;
pub mod iptv;
pub mod mime;
pub mod nntp;
pub mod nzb;
pub mod prefetch;
pub mod rar;
pub mod service;
pub mod stream;
pub mod yenc;

pub use error::{NzbStreamerError, Result};
