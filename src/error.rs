use std::time::Duration;

use thiserror::Error;

use crate::dns::ParseError;

/// Wire-level failures while building or decoding messages.
#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid DNS packet: {0}")]
    InvalidPacket(String),

    #[error("Buffer too small: need {need} bytes, have {have} bytes")]
    BufferTooSmall { need: usize, have: usize },
}

/// Failure of the query collaborator. Always maps to an indeterminate
/// security status.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request to {server} failed: {reason}")]
    Http { server: String, reason: String },

    #[error("{server} answered with HTTP status {status}")]
    HttpStatus { server: String, status: u16 },

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error("response id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },

    #[error("no upstream servers configured")]
    NoServers,
}

impl From<ParseError> for QueryError {
    fn from(err: ParseError) -> Self {
        QueryError::Dns(DnsError::Parse(err))
    }
}

/// Failure of the trust-anchor document fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GET {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("GET {url} returned HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Construction and configuration failures. Never raised at query time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no trust anchor keys provided")]
    MissingTrustAnchors,

    #[error("no query exchange provided")]
    MissingQueryExchange,

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, DnsError>;
