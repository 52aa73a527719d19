//! Error types for tern-chat

use thiserror::Error;

/// Result type alias using tern-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer (transport failure)
    #[error(transparent)]
    Wire(#[from] tern_wire::Error),

    /// Nothing to send: empty text and no attachments
    #[error("Message is empty")]
    EmptyMessage,

    /// Send attempted while uploads are still running
    #[error("Attachments are still uploading")]
    UploadsPending,

    /// Too many attachments for one message
    #[error("You can attach at most {max} files")]
    CapacityExceeded { max: usize },

    /// A single file is over the size ceiling
    #[error("{name} is too large ({size} bytes, limit is {limit} bytes)")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// Upload of one attachment failed
    #[error("Failed to upload {name}: {reason}")]
    Upload { name: String, reason: String },

    /// Retry requested but the last message is not a failed response
    #[error("Nothing to retry")]
    NothingToRetry,
}

impl Error {
    /// Whether this error should be shown to the user.
    ///
    /// Invalid sends are ignored silently; capacity, upload and transport
    /// failures are surfaced.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Error::EmptyMessage | Error::UploadsPending | Error::NothingToRetry
        )
    }
}
