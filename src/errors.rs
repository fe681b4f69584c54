// src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraderError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The exchange answered, but with a rejection instead of data.
    #[error("Exchange error (http {status}): code={code} msg={msg}")]
    Exchange { status: u16, code: i64, msg: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Query encoding error: {0}")]
    Encoding(#[from] serde_urlencoded::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed after {attempts} attempts")]
    BootstrapExhausted { operation: String, attempts: u32 },

    #[error("{operation} cancelled by shutdown")]
    Cancelled { operation: String },
}

pub type Result<T> = std::result::Result<T, TraderError>;
