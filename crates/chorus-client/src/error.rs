use thiserror::Error;

use chorus_shared::ProtocolError;
use chorus_store::StoreError;

/// Errors surfaced by the client core.
///
/// The variants mirror how failures are handled: authentication errors feed
/// the refresh-then-retry protocol, not-found stays local, connectivity is a
/// transient user-visible failure, validation never reaches the network.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server rejected our credentials (401/403), and refreshing them
    /// did not help.
    #[error("Not authenticated")]
    Unauthorized,

    /// The requested resource does not exist (404).  Never escalates to a
    /// logout.
    #[error("Not found")]
    NotFound,

    /// No usable response from the server (DNS, connect, timeout).
    #[error("Network error: {0}")]
    Transport(String),

    /// The server answered with an unexpected status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Invalid local input; handled before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Realtime channel failure.
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Local storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Wire protocol failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
