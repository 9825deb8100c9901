//! The remote ledger boundary
//!
//! The contract itself is an external collaborator: an opaque remote
//! service that stores messages, assigns ids, and pushes three event
//! kinds. This module specifies the interface the engine consumes; the
//! real binary encoding is the contract's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use ledgerchat_core::{MessageId, PeerAddress};

/// A confirmed message as stored on the ledger
///
/// Content is ciphertext; the store decodes it on merge and never keeps
/// the wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Ledger-assigned id
    pub id: MessageId,
    /// Sending peer
    pub sender: PeerAddress,
    /// Receiving peer
    pub recipient: PeerAddress,
    /// Encrypted content
    pub ciphertext: String,
    /// Ledger-assigned inclusion time, seconds since epoch
    pub timestamp: i64,
    /// Whether the recipient has acknowledged the message
    pub is_read: bool,
}

/// Events pushed by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A message was included on the ledger
    MessageSent {
        /// Assigned id
        id: MessageId,
        /// Sending peer
        sender: PeerAddress,
        /// Receiving peer
        recipient: PeerAddress,
        /// Encrypted content
        ciphertext: String,
        /// Inclusion time, seconds since epoch
        timestamp: i64,
    },
    /// A recipient acknowledged a message
    MessageRead {
        /// The acknowledged message
        id: MessageId,
        /// Peer that issued the receipt
        reader: PeerAddress,
        /// Original sender of the message
        sender: PeerAddress,
    },
    /// A message was removed from the ledger
    MessageDeleted {
        /// The removed message
        id: MessageId,
        /// Peer that removed it
        sender: PeerAddress,
    },
}

/// Errors from remote ledger calls
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The contract rejected the recipient
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The contract rejected the call; terminal, never retried
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// Transient transport failure; eligible for a single retry
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// No message with the given id exists on the ledger
    #[error("message not found: {0}")]
    NotFound(MessageId),
}

impl LedgerError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The contract boundary consumed by the engine
///
/// `list` returns pages oldest-first, ordered by id ascending; a page
/// shorter than `limit` marks the end of history.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Submit one message; returns the assigned id
    async fn send(
        &self,
        ciphertext: &str,
        recipient: &PeerAddress,
    ) -> Result<MessageId, LedgerError>;

    /// Fetch one page of the conversation with `other`
    async fn list(
        &self,
        other: &PeerAddress,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerRecord>, LedgerError>;

    /// Acknowledge a message addressed to the caller
    async fn mark_read(&self, id: MessageId) -> Result<(), LedgerError>;

    /// Remove a message the caller sent
    async fn delete(&self, id: MessageId) -> Result<(), LedgerError>;

    /// Peers the caller has a conversation with
    async fn list_partners(&self) -> Result<Vec<PeerAddress>, LedgerError>;

    /// Subscribe to the push event stream
    fn events(&self) -> broadcast::Receiver<LedgerEvent>;
}
