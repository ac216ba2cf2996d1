//! Centralized error types for mailsift.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsift library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified mailbox file or directory does not exist.
    #[error("Mailbox not found: {0}")]
    FileNotFound(PathBuf),

    /// The path does not look like a mailbox we can read.
    #[error("Not a usable mailbox: {0}")]
    InvalidMailbox(PathBuf),

    /// No message with this UID exists in the selected folder.
    #[error("No message with UID {0}")]
    UnknownMessage(u32),

    /// The requested part address does not exist in the message structure.
    #[error("Message {uid} has no part '{path}'")]
    UnknownPart { uid: u32, path: String },

    /// A MIME structure or decoding error.
    #[error("MIME decoding error: {0}")]
    MimeError(String),

    /// Every candidate filename for an attachment was already taken.
    #[error("No free filename for '{name}' after {attempts} attempts")]
    NamingExhausted { name: String, attempts: usize },

    /// An output or log directory could not be created.
    #[error("Directory '{path}' was not created: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The per-message deadline expired before the message was fully fetched.
    #[error("Deadline exceeded while fetching message {uid}")]
    DeadlineExceeded { uid: u32 },

    /// Writing the archival file failed.
    #[error("Export error: {0}")]
    ExportError(String),

    /// An invalid path was provided.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only concerns the message being processed.
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            Self::UnknownMessage(_)
                | Self::UnknownPart { .. }
                | Self::MimeError(_)
                | Self::DeadlineExceeded { .. }
                | Self::Io { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
