//! Error types shared across the adapter.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared adapter result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Adapter error enumeration covering every failure a host can observe.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The backend could not be launched or its handshake was unusable.
    ///
    /// Fatal: the adapter never becomes usable and is not retried.
    Startup(String),
    /// The backend answered a pending request with a line that does not
    /// follow the response schema.
    Protocol(String),
    /// A pending request outlived the backend's declared latency ceiling.
    Timeout {
        /// Sequence number of the abandoned request.
        seq: u64,
        /// Latency ceiling that elapsed.
        after: Duration,
    },
    /// The backend process has exited or was shut down.
    Unavailable(String),
    /// The request was refused locally without contacting the backend.
    Rejected(String),
    /// File-system or stream I/O failure.
    Io(String),
}

impl AppError {
    /// Whether this error means the backend can no longer serve requests.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_) | Self::Unavailable(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Timeout { seq, after } => {
                write!(f, "timeout: request {seq} not answered within {after:?}")
            }
            Self::Unavailable(msg) => write!(f, "unavailable: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
