use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid or unsatisfiable range")]
    InvalidRange,

    #[error("article missing for segment {segment_index} of file '{file}': {source}")]
    ArticleMissing {
        file: String,
        segment_index: usize,
        #[source]
        source: crate::nntp::error::NntpError,
    },

    #[error("malformed yEnc data in segment {segment_index} of file '{file}': {source}")]
    MalformedYenc {
        file: String,
        segment_index: usize,
        #[source]
        source: crate::yenc::YencError,
    },
}
