pub mod error;
pub mod range;
pub mod seekable;

pub use error::StreamError;
pub use range::{parse_range_header, ByteRange};
pub use seekable::NzbSeekableStream;
