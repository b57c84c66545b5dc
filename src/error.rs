use thiserror::Error;

/// Errors that can occur while watching rooms and claiming red packets
#[derive(Error, Debug)]
pub enum WatchError {
    /// The platform answered with a non-zero status code
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    /// The HTTP request itself failed (connect, timeout, body decode)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The event feed could not be opened or broke during the handshake
    #[error("event feed error: {0}")]
    Feed(String),

    /// A feed payload could not be decoded into a command
    #[error("decode error: {0}")]
    Decode(String),

    /// Error reading or parsing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A session cookie is missing a field the account needs
    #[error("credential error: {0}")]
    Credential(String),

    /// Shutdown was requested (e.g., via Ctrl+C)
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Result type alias for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
