//! Error types for the synchronization engine

use thiserror::Error;

/// Errors surfaced by the store and controller
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Recipient failed validation before any remote call was made
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The ledger rejected a submission, or it timed out terminally
    #[error("message submission failed: {0}")]
    SubmissionFailed(String),

    /// A backfill or read-receipt call failed; the operation is abandoned
    /// for that call only and the session continues
    #[error("remote ledger unavailable: {0}")]
    RemoteUnavailable(String),

    /// Refused to send an empty message
    #[error("message content is empty")]
    EmptyMessage,

    /// Store-internal failure (lock poisoning)
    #[error("store error: {0}")]
    Store(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
