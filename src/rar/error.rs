use thiserror::Error;

#[derive(Error, Debug)]
pub enum RarError {
    #[error("RAR signature not found")]
    UnknownSignature,

    #[error("truncated RAR header at offset {0}")]
    TruncatedHeader(u64),

    #[error("invalid vint encoding")]
    InvalidVint,

    #[error("archive is not streamable: {0}")]
    NotStreamable(String),

    #[error("volume {0} has no entries")]
    EmptyVolume(usize),

    #[error("article missing for span in file '{file}': {source}")]
    ArticleMissing {
        file: String,
        #[source]
        source: crate::nntp::error::NntpError,
    },

    #[error("malformed yEnc data in span of file '{file}': {source}")]
    MalformedYenc {
        file: String,
        #[source]
        source: crate::yenc::YencError,
    },

    #[error("requested range is outside the assembled file")]
    InvalidRange,
}
