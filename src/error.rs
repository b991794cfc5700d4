//! Error types for harvestrs.
//!
//! Structural failures of a run (no proxies, page gaps, unusable extraction,
//! nothing new to store) are fatal and surface here. Per-proxy outcomes and
//! per-row classification problems are not errors; they are reported as
//! [`Event`](crate::observer::Event)s.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid setting, raised before any network activity.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        /// Setting that caused the error, e.g. `proxy.checker_urls`.
        key: Option<String>,
    },

    #[error("no working proxies found")]
    NoWorkingProxies,

    /// Fewer payloads than requested pages. `received == 0` means the catalog
    /// API itself was unreachable rather than a single page failing.
    #[error("fetch gap: received {received} of {requested} pages (missing {missing:?})")]
    FetchGap {
        requested: usize,
        received: usize,
        missing: Vec<u32>,
    },

    /// Both media URL columns are entirely absent after extraction.
    #[error("no parse data found: every mp4_url and webm_url is absent")]
    ExtractionEmpty,

    #[error("no new records to store")]
    EmptyBatch,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The proxy refused or dropped the connection.
    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}
