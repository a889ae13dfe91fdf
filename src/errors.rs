//! Error taxonomy for channel traffic and supervisor lifecycle operations.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by channels and the supervisor.
///
/// Transport failures are deliberately undifferentiated: a dead child, a
/// socket reset, and a broken pipe all surface as [`Error::EndpointClosed`].
/// Retry and backoff policy belongs to the caller; nothing is retried or
/// swallowed inside the channel layer.
#[derive(Debug, Error)]
pub enum Error {
    /// The peer is gone and no further data will ever arrive, or the channel
    /// was closed locally. Raised by both `read` and `write`.
    #[error("endpoint closed")]
    EndpointClosed,

    /// Strict `start` found the alias already occupied.
    #[error("alias '{alias}' is already running")]
    AlreadyRunning { alias: String },

    /// No app template is registered under this name.
    #[error("unknown app '{name}'")]
    UnknownApp { name: String },

    /// `terminate` was called for an alias with no live instance.
    #[error("alias '{alias}' is not running")]
    AliasNotRunning { alias: String },

    /// Socket transport selected but neither the template nor the per-call
    /// overrides carry a socket path.
    #[error("socket transport for '{program}' requires a socket path")]
    SocketPathRequired { program: String },

    /// The template command tokenized to an empty argv.
    #[error("app command is empty")]
    EmptyCommand,

    /// The OS refused to spawn the child process.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Residual I/O failure outside channel traffic (e.g. unlinking a stale
    /// socket file).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the transport-failure variant; convenient in caller retry loops.
    pub fn is_endpoint_closed(&self) -> bool {
        matches!(self, Error::EndpointClosed)
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Self {
        Error::Io(std::io::Error::from(e))
    }
}
