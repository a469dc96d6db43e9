//! Error types for imap-facade

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote error {identifier}: {message}")]
    Remote { identifier: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No such mailbox: {0}")]
    NoSuchMailbox(String),

    #[error("Mailbox already exists: {0}")]
    MailboxExists(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Message parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Update channel closed")]
    UpdatesClosed,

    #[error("Timed out waiting for update delivery")]
    UpdateTimeout,
}

impl Error {
    /// Whether the error came from the remote service or the path to it.
    ///
    /// The synchronizer aborts its cycle on these; anything else is local.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Transport(_) | Self::Decode(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
