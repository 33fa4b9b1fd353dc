use thiserror::Error;

#[derive(Error, Debug)]
pub enum NzbError {
    #[error("malformed NZB XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed NZB XML attribute encoding: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed NZB: {0}")]
    Malformed(String),

    #[error("NZB contains no files")]
    Empty,

    #[error("invalid date {0:?} in <file> attribute")]
    InvalidDate(String),
}
