//! In-memory ledger implementation for testing and demos
//!
//! One [`MockChain`] plays the contract: it assigns monotonic ids, stores
//! records, and pushes events to every subscriber. Each identity talks to
//! it through its own [`InMemoryLedger`] handle, mirroring how the real
//! contract scopes calls to the transaction sender.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let chain = MockChain::new();
//! let alice_ledger = chain.client(alice.clone());
//! let bob_ledger = chain.client(bob.clone());
//!
//! alice_ledger.send(&ciphertext, &bob).await?;
//! let page = bob_ledger.list(&alice, 0, 50).await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use ledgerchat_core::{MessageId, PeerAddress};

use crate::ledger::{LedgerError, LedgerEvent, LedgerRecord, RemoteLedger};

/// Default event channel capacity; a lagging subscriber sees a gap
const EVENT_CAPACITY: usize = 1024;

struct ChainInner {
    records: Mutex<Vec<LedgerRecord>>,
    next_id: AtomicU64,
    events: broadcast::Sender<LedgerEvent>,
    unavailable: AtomicBool,
}

/// Shared in-memory contract state
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<ChainInner>,
}

impl MockChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Create an empty chain with a bounded event channel
    ///
    /// A small capacity lets tests overflow a slow subscriber and drive
    /// the lagged-stream recovery path.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(ChainInner {
                records: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                events,
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Create a caller-scoped client handle
    pub fn client(&self, caller: PeerAddress) -> InMemoryLedger {
        InMemoryLedger {
            inner: self.inner.clone(),
            caller,
        }
    }

    /// Fault injection: while set, every remote call fails with
    /// [`LedgerError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a historical record directly, without emitting an event
    ///
    /// Used to seed pre-session history for backfill scenarios.
    pub fn seed(
        &self,
        sender: &PeerAddress,
        recipient: &PeerAddress,
        ciphertext: &str,
        timestamp: i64,
    ) -> MessageId {
        let id = MessageId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let mut records = self.inner.records.lock().expect("chain lock poisoned");
        records.push(LedgerRecord {
            id,
            sender: sender.clone(),
            recipient: recipient.clone(),
            ciphertext: ciphertext.to_string(),
            timestamp,
            is_read: false,
        });
        id
    }

    /// Total records currently on the chain
    pub fn record_count(&self) -> usize {
        self.inner.records.lock().expect("chain lock poisoned").len()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

/// A caller-scoped handle onto a [`MockChain`]
pub struct InMemoryLedger {
    inner: Arc<ChainInner>,
    caller: PeerAddress,
}

impl InMemoryLedger {
    fn check_available(&self) -> Result<(), LedgerError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(LedgerError::Unavailable("chain offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn involves_pair(&self, record: &LedgerRecord, other: &PeerAddress) -> bool {
        (record.sender == self.caller && record.recipient == *other)
            || (record.sender == *other && record.recipient == self.caller)
    }
}

#[async_trait]
impl RemoteLedger for InMemoryLedger {
    async fn send(
        &self,
        ciphertext: &str,
        recipient: &PeerAddress,
    ) -> Result<MessageId, LedgerError> {
        self.check_available()?;

        let id = MessageId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let timestamp = Utc::now().timestamp();
        let record = LedgerRecord {
            id,
            sender: self.caller.clone(),
            recipient: recipient.clone(),
            ciphertext: ciphertext.to_string(),
            timestamp,
            is_read: false,
        };

        {
            let mut records = self
                .inner
                .records
                .lock()
                .map_err(|_| LedgerError::Rejected("chain lock poisoned".to_string()))?;
            records.push(record);
        }

        // No subscribers is fine; events are best-effort push
        let _ = self.inner.events.send(LedgerEvent::MessageSent {
            id,
            sender: self.caller.clone(),
            recipient: recipient.clone(),
            ciphertext: ciphertext.to_string(),
            timestamp,
        });

        Ok(id)
    }

    async fn list(
        &self,
        other: &PeerAddress,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.check_available()?;

        let records = self
            .inner
            .records
            .lock()
            .map_err(|_| LedgerError::Rejected("chain lock poisoned".to_string()))?;

        // Records are stored in id order, which is oldest-first
        Ok(records
            .iter()
            .filter(|r| self.involves_pair(r, other))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: MessageId) -> Result<(), LedgerError> {
        self.check_available()?;

        let sender = {
            let mut records = self
                .inner
                .records
                .lock()
                .map_err(|_| LedgerError::Rejected("chain lock poisoned".to_string()))?;
            let Some(record) = records.iter_mut().find(|r| r.id == id) else {
                return Err(LedgerError::NotFound(id));
            };
            if record.recipient != self.caller {
                return Err(LedgerError::Rejected(
                    "only the recipient can acknowledge a message".to_string(),
                ));
            }
            record.is_read = true;
            record.sender.clone()
        };

        let _ = self.inner.events.send(LedgerEvent::MessageRead {
            id,
            reader: self.caller.clone(),
            sender,
        });

        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), LedgerError> {
        self.check_available()?;

        {
            let mut records = self
                .inner
                .records
                .lock()
                .map_err(|_| LedgerError::Rejected("chain lock poisoned".to_string()))?;
            let Some(pos) = records.iter().position(|r| r.id == id) else {
                return Err(LedgerError::NotFound(id));
            };
            if records[pos].sender != self.caller {
                return Err(LedgerError::Rejected(
                    "only the sender can delete a message".to_string(),
                ));
            }
            records.remove(pos);
        }

        let _ = self.inner.events.send(LedgerEvent::MessageDeleted {
            id,
            sender: self.caller.clone(),
        });

        Ok(())
    }

    async fn list_partners(&self) -> Result<Vec<PeerAddress>, LedgerError> {
        self.check_available()?;

        let records = self
            .inner
            .records
            .lock()
            .map_err(|_| LedgerError::Rejected("chain lock poisoned".to_string()))?;

        let mut partners = Vec::new();
        for record in records.iter() {
            let counterpart = if record.sender == self.caller {
                &record.recipient
            } else if record.recipient == self.caller {
                &record.sender
            } else {
                continue;
            };
            if !partners.contains(counterpart) {
                partners.push(counterpart.clone());
            }
        }

        Ok(partners)
    }

    fn events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }
}
