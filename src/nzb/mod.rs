pub mod error;
pub mod interpolator;
pub mod parser;
pub mod types;

pub use error::NzbError;
pub use interpolator::{SegmentInterpolator, SegmentLocation, SegmentRange};
pub use parser::NzbParser;
pub use types::{NzbFile, NzbSegment, ParsedNzb};
