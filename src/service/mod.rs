pub mod cache;
pub mod mount;
pub mod stream_service;

pub use cache::NzbCache;
pub use mount::{InMemoryMountStore, Mount, MountInfo, MountMediaFile, MountStatus, MountStore};
pub use stream_service::{NzbStreamService, StreamHandle};
