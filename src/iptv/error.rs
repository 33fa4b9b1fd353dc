use thiserror::Error;

#[derive(Error, Debug)]
pub enum IptvError {
    #[error("portal session expired")]
    SessionExpired,

    #[error("portal returned an error: {0}")]
    Portal(String),

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exceeded {0} redirect hops")]
    TooManyRedirects(u8),

    #[error("unrecognised stream command: {0}")]
    InvalidCommand(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("malformed manifest: {0}")]
    ManifestError(String),
}
