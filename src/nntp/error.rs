use std::io;

use thiserror::Error;

/// A single provider's failed attempt, collected into
/// [`NntpError::ArticleNotFoundEverywhere`] (spec §4.4, §7).
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

#[derive(Error, Debug)]
pub enum NntpError {
    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("connection reset")]
    ConnectionReset,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("protocol error {code}: {message}")]
    ProtocolError { code: u16, message: String },

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("article not found ({0})")]
    ArticleNotFound(u16),

    #[error("service unavailable (400)")]
    ServiceUnavailable,

    #[error("pool acquisition timed out after 30s")]
    PoolTimeout,

    #[error("pool is closed")]
    PoolClosed,

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("article {message_id} not found on any of {} providers: {}", attempts.len(), summarize(attempts))]
    ArticleNotFoundEverywhere {
        message_id: String,
        attempts: Vec<ProviderAttempt>,
    },

    #[error("no NNTP providers configured")]
    NoProviders,
}

fn summarize(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}
