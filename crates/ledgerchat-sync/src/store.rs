//! Conversation storage and reconciliation
//!
//! [`ConversationStore`] is the single source of truth for the session's
//! conversations. It merges paginated backfill pages with live event
//! pushes into one ordered, deduplicated view per peer, tolerating
//! duplicate batches, out-of-order arrival, read receipts that precede
//! their message, and deletions racing stale backfill pages.
//!
//! All mutation goes through one write lock, so inputs from the three
//! asynchronous sources (backfill, live events, local sends) are applied
//! to completion one at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::RwLock;

use tracing::{debug, warn};

use ledgerchat_core::{
    ChatMessage, DeliveryStatus, MessageBody, MessageCodec, MessageId, MessageKey, PeerAddress,
};

use crate::error::{SyncError, SyncResult};
use crate::ledger::LedgerRecord;

/// One peer's ordered message sequence
#[derive(Debug, Default)]
struct Conversation {
    /// Sorted by `(timestamp, key)` ascending
    messages: Vec<ChatMessage>,
}

impl Conversation {
    fn insert_sorted(&mut self, message: ChatMessage) {
        let key = message.sort_key();
        let pos = self.messages.partition_point(|m| m.sort_key() <= key);
        self.messages.insert(pos, message);
    }
}

struct StoreInner {
    /// Conversations keyed by the counterpart peer; created lazily,
    /// never destroyed
    conversations: HashMap<PeerAddress, Conversation>,
    /// Ledger ids already represented locally
    seen: HashSet<MessageId>,
    /// Deleted ids; a stale backfill page must not resurrect these
    tombstones: HashSet<MessageId>,
    /// Read receipts that arrived before their message
    pending_reads: HashSet<MessageId>,
    /// Counter for optimistic local keys
    next_local: u64,
}

/// Single source of truth for all conversations in the current session
///
/// Owns the peer map, the dedup set, the tombstone set and the
/// pending-read set exclusively; nothing else mutates messages. One
/// instance per session identity; discarded on identity change.
pub struct ConversationStore {
    local: PeerAddress,
    codec: Arc<dyn MessageCodec>,
    inner: RwLock<StoreInner>,
}

impl ConversationStore {
    /// Create an empty store for the given local identity
    pub fn new(local: PeerAddress, codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            local,
            codec,
            inner: RwLock::new(StoreInner {
                conversations: HashMap::new(),
                seen: HashSet::new(),
                tombstones: HashSet::new(),
                pending_reads: HashSet::new(),
                next_local: 1,
            }),
        }
    }

    /// The local identity this store was built for
    pub fn local(&self) -> &PeerAddress {
        &self.local
    }

    /// Merge a batch of confirmed messages into `peer`'s conversation
    ///
    /// Idempotent: already-seen and tombstoned ids are skipped, so
    /// overlapping or repeated batches are safe. Undecryptable content
    /// degrades to a sentinel body rather than failing the merge. Returns
    /// the number of newly inserted messages.
    pub fn merge(&self, peer: &PeerAddress, records: &[LedgerRecord]) -> SyncResult<usize> {
        let mut inner = self.write()?;
        let mut inserted = 0;

        for record in records {
            if inner.tombstones.contains(&record.id) || inner.seen.contains(&record.id) {
                continue;
            }

            let body = match self.codec.decrypt(&record.ciphertext) {
                Ok(text) => MessageBody::Text(text),
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Retaining undecryptable message");
                    MessageBody::Undecryptable
                }
            };

            // A receipt may have arrived before the message itself
            let queued_read = inner.pending_reads.remove(&record.id);
            let message = ChatMessage::confirmed(
                record.id,
                record.sender.clone(),
                record.recipient.clone(),
                body,
                record.timestamp,
                record.is_read || queued_read,
            );

            inner.seen.insert(record.id);
            inner
                .conversations
                .entry(peer.clone())
                .or_default()
                .insert_sorted(message);
            inserted += 1;
        }

        if inserted > 0 {
            debug!(peer = %peer.truncate(), inserted, batch = records.len(), "Merged batch");
        }
        Ok(inserted)
    }

    /// Route a `MessageSent` event into the right conversation
    ///
    /// Events where neither side is the local user are ignored. Returns
    /// the number of newly inserted messages (0 or 1).
    pub fn apply_sent(&self, record: &LedgerRecord) -> SyncResult<usize> {
        let Some(peer) = self.counterpart(&record.sender, &record.recipient) else {
            debug!(id = %record.id, "Ignoring event for other parties");
            return Ok(0);
        };
        self.merge(&peer, std::slice::from_ref(record))
    }

    /// Mark a message as read, wherever it lives
    ///
    /// Scans all conversations. If the message is not present yet the
    /// receipt is queued and applied when the message is later merged.
    /// Returns whether a stored message was updated.
    pub fn apply_read(&self, id: MessageId) -> SyncResult<bool> {
        let mut inner = self.write()?;

        for conversation in inner.conversations.values_mut() {
            if let Some(message) = conversation
                .messages
                .iter_mut()
                .find(|m| m.key == MessageKey::Confirmed(id))
            {
                message.is_read = true;
                return Ok(true);
            }
        }

        // Tolerated: receipt before the message arrives
        if !inner.tombstones.contains(&id) {
            debug!(%id, "Queueing read receipt for message not yet present");
            inner.pending_reads.insert(id);
        }
        Ok(false)
    }

    /// Remove a deleted message and tombstone its id
    ///
    /// The id moves to the tombstone set so a stale backfill page cannot
    /// resurrect it. Returns whether a stored message was removed.
    pub fn apply_deleted(&self, id: MessageId) -> SyncResult<bool> {
        let mut inner = self.write()?;

        inner.tombstones.insert(id);
        inner.seen.remove(&id);
        inner.pending_reads.remove(&id);

        for conversation in inner.conversations.values_mut() {
            if let Some(pos) = conversation
                .messages
                .iter()
                .position(|m| m.key == MessageKey::Confirmed(id))
            {
                conversation.messages.remove(pos);
                debug!(%id, "Deleted message");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Peers with at least one unread confirmed inbound message
    pub fn unread_peers(&self) -> SyncResult<Vec<PeerAddress>> {
        let inner = self.read()?;
        Ok(inner
            .conversations
            .iter()
            .filter(|(_, c)| {
                c.messages
                    .iter()
                    .any(|m| m.key.is_confirmed() && !m.is_read && m.addressed_to(&self.local))
            })
            .map(|(peer, _)| peer.clone())
            .collect())
    }

    /// Ordered read-only view of a peer's conversation
    ///
    /// Unknown peers yield an empty view, not an error.
    pub fn snapshot(&self, peer: &PeerAddress) -> SyncResult<Vec<ChatMessage>> {
        let inner = self.read()?;
        Ok(inner
            .conversations
            .get(peer)
            .map(|c| c.messages.clone())
            .unwrap_or_default())
    }

    /// Peers with a conversation in this session
    pub fn partners(&self) -> SyncResult<Vec<PeerAddress>> {
        let inner = self.read()?;
        Ok(inner.conversations.keys().cloned().collect())
    }

    /// Ids of confirmed inbound messages in `peer`'s conversation that
    /// are still unread; the receipt fan-out targets
    pub fn unread_inbound(&self, peer: &PeerAddress) -> SyncResult<Vec<MessageId>> {
        let inner = self.read()?;
        Ok(inner
            .conversations
            .get(peer)
            .map(|c| {
                c.messages
                    .iter()
                    .filter(|m| !m.is_read && m.addressed_to(&self.local))
                    .filter_map(|m| m.key.id())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Insert an optimistic local message, bypassing dedup
    ///
    /// Returns its local key for later reconciliation.
    pub fn insert_pending(&self, peer: &PeerAddress, content: &str) -> SyncResult<MessageKey> {
        let mut inner = self.write()?;
        let local_key = inner.next_local;
        inner.next_local += 1;

        let message = ChatMessage::pending(local_key, self.local.clone(), peer.clone(), content);
        let key = message.key;
        inner
            .conversations
            .entry(peer.clone())
            .or_default()
            .insert_sorted(message);
        Ok(key)
    }

    /// Remove an optimistic entry once the ledger confirmed the send
    ///
    /// The confirmed copy arrives through its own `MessageSent` event.
    /// Returns whether the entry was still present.
    pub fn resolve_pending(&self, peer: &PeerAddress, key: MessageKey) -> SyncResult<bool> {
        let mut inner = self.write()?;
        let Some(conversation) = inner.conversations.get_mut(peer) else {
            return Ok(false);
        };
        let Some(pos) = conversation.messages.iter().position(|m| m.key == key) else {
            return Ok(false);
        };
        conversation.messages.remove(pos);
        Ok(true)
    }

    /// Mark an optimistic entry as failed, in place
    ///
    /// Retained for user-visible failure, never silently dropped. Returns
    /// whether the entry was found.
    pub fn mark_failed(&self, peer: &PeerAddress, key: MessageKey) -> SyncResult<bool> {
        let mut inner = self.write()?;
        let Some(conversation) = inner.conversations.get_mut(peer) else {
            return Ok(false);
        };
        let Some(message) = conversation.messages.iter_mut().find(|m| m.key == key) else {
            return Ok(false);
        };
        message.status = DeliveryStatus::Failed;
        Ok(true)
    }

    /// Resolve which side of a sender/recipient pair is the counterpart
    /// of the local user; `None` if neither side is local
    pub fn counterpart(
        &self,
        sender: &PeerAddress,
        recipient: &PeerAddress,
    ) -> Option<PeerAddress> {
        if *sender == self.local {
            Some(recipient.clone())
        } else if *recipient == self.local {
            Some(sender.clone())
        } else {
            None
        }
    }

    fn read(&self) -> SyncResult<std::sync::RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| SyncError::Store("failed to acquire read lock".to_string()))
    }

    fn write(&self) -> SyncResult<std::sync::RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| SyncError::Store("failed to acquire write lock".to_string()))
    }
}
