//! Message model for the conversation engine

use std::cmp::Ordering;
use std::fmt::{self, Display};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::address::PeerAddress;

/// Ledger-assigned message identifier
///
/// Issued monotonically by the ledger, unique within it, stable once
/// assigned. Doubles as the global deduplication key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a message within the local store
///
/// Confirmed messages carry their ledger id; optimistic messages have no
/// ledger id yet and are tracked by a locally issued counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKey {
    /// Message confirmed by the ledger
    Confirmed(MessageId),
    /// Optimistic local message awaiting confirmation
    Local(u64),
}

impl MessageKey {
    /// The ledger id, if this message is confirmed
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Self::Confirmed(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Whether this message has been confirmed by the ledger
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

// Timestamp ties break by ledger id ascending; optimistic entries sort
// after confirmed ones at the same timestamp.
impl Ord for MessageKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Confirmed(a), Self::Confirmed(b)) => a.cmp(b),
            (Self::Local(a), Self::Local(b)) => a.cmp(b),
            (Self::Confirmed(_), Self::Local(_)) => Ordering::Less,
            (Self::Local(_), Self::Confirmed(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for MessageKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Decoded message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Decrypted text content
    Text(String),
    /// Content that could not be decrypted; the message is retained so
    /// its id is never lost
    Undecryptable,
}

impl MessageBody {
    /// Get the text content, if decodable
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Undecryptable => None,
        }
    }

    /// Whether this body failed to decrypt
    pub fn is_undecryptable(&self) -> bool {
        matches!(self, Self::Undecryptable)
    }
}

/// Delivery state of a locally originated message
///
/// Confirmed/remote messages are always `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Submitted, awaiting ledger confirmation
    Pending,
    /// Confirmed on the ledger
    Sent,
    /// Submission failed; retained for user-visible failure
    Failed,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Store identity (ledger id once confirmed)
    pub key: MessageKey,
    /// Sending peer
    pub sender: PeerAddress,
    /// Receiving peer
    pub recipient: PeerAddress,
    /// Decoded content
    pub body: MessageBody,
    /// Seconds since epoch; ledger-assigned once confirmed, local
    /// wall-clock while optimistic
    pub timestamp: i64,
    /// Whether the recipient has acknowledged the message
    pub is_read: bool,
    /// Delivery state
    pub status: DeliveryStatus,
}

impl ChatMessage {
    /// Create a confirmed message from ledger data
    pub fn confirmed(
        id: MessageId,
        sender: PeerAddress,
        recipient: PeerAddress,
        body: MessageBody,
        timestamp: i64,
        is_read: bool,
    ) -> Self {
        Self {
            key: MessageKey::Confirmed(id),
            sender,
            recipient,
            body,
            timestamp,
            is_read,
            status: DeliveryStatus::Sent,
        }
    }

    /// Create an optimistic local message, timestamped with the local
    /// wall clock
    pub fn pending(
        local_key: u64,
        sender: PeerAddress,
        recipient: PeerAddress,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: MessageKey::Local(local_key),
            sender,
            recipient,
            body: MessageBody::Text(content.into()),
            timestamp: Utc::now().timestamp(),
            is_read: false,
            status: DeliveryStatus::Pending,
        }
    }

    /// Chronological sort key: `(timestamp, key)` ascending
    pub fn sort_key(&self) -> (i64, MessageKey) {
        (self.timestamp, self.key)
    }

    /// Whether this message is addressed to the given peer
    pub fn addressed_to(&self, peer: &PeerAddress) -> bool {
        &self.recipient == peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::parse(&format!("0x{}", hex::encode([last; 20]))).unwrap()
    }

    #[test]
    fn test_key_ordering_by_id() {
        assert!(MessageKey::Confirmed(MessageId(1)) < MessageKey::Confirmed(MessageId(2)));
    }

    #[test]
    fn test_confirmed_sorts_before_local() {
        assert!(MessageKey::Confirmed(MessageId(u64::MAX)) < MessageKey::Local(0));
    }

    #[test]
    fn test_sort_key_timestamp_dominates() {
        let a = ChatMessage::confirmed(
            MessageId(9),
            addr(1),
            addr(2),
            MessageBody::Text("late id, early time".into()),
            100,
            false,
        );
        let b = ChatMessage::confirmed(
            MessageId(1),
            addr(1),
            addr(2),
            MessageBody::Text("early id, late time".into()),
            200,
            false,
        );
        assert!(a.sort_key() < b.sort_key());
    }

    #[test]
    fn test_sort_key_ties_break_by_id() {
        let a = ChatMessage::confirmed(
            MessageId(1),
            addr(1),
            addr(2),
            MessageBody::Text("first".into()),
            100,
            false,
        );
        let b = ChatMessage::confirmed(
            MessageId(2),
            addr(1),
            addr(2),
            MessageBody::Text("second".into()),
            100,
            false,
        );
        assert!(a.sort_key() < b.sort_key());
    }

    #[test]
    fn test_pending_message_shape() {
        let msg = ChatMessage::pending(7, addr(1), addr(2), "hello");
        assert_eq!(msg.key, MessageKey::Local(7));
        assert_eq!(msg.status, DeliveryStatus::Pending);
        assert!(msg.key.id().is_none());
        assert!(!msg.is_read);
    }

    #[test]
    fn test_body_sentinel() {
        assert!(MessageBody::Undecryptable.is_undecryptable());
        assert_eq!(MessageBody::Undecryptable.as_text(), None);
        assert_eq!(MessageBody::Text("hi".into()).as_text(), Some("hi"));
    }
}
