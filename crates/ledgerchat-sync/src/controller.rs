//! Synchronization orchestration
//!
//! [`SyncController`] drives the [`ConversationStore`]: it backfills
//! history through paginated reads, owns the single live event
//! subscription, applies optimistic local inserts on send, and fans out
//! read receipts. It never mutates conversation state directly; every
//! update flows through the store's methods.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use ledgerchat_core::{MessageCodec, MessageId, PeerAddress};

use crate::error::{SyncError, SyncResult};
use crate::ledger::{LedgerError, LedgerEvent, LedgerRecord, RemoteLedger};
use crate::store::ConversationStore;

/// Tuning knobs for remote calls and backfill pagination
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per backfill page
    pub page_size: u64,
    /// Bounded wait for any single remote call
    pub call_timeout: Duration,
    /// Pause before the single retry of a transient failure
    pub retry_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            call_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Outcome of a bootstrap pass
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Messages newly inserted across all peers
    pub inserted: usize,
    /// Peers whose backfill failed; the rest of the session continues
    pub failed_peers: Vec<PeerAddress>,
}

/// Outcome of a read-receipt fan-out
#[derive(Debug, Clone, Default)]
pub struct ReadReceiptReport {
    /// Receipts the ledger accepted
    pub acknowledged: usize,
    /// Ids whose receipt failed; not retried automatically
    pub failed: Vec<MessageId>,
}

/// Drives backfill, live sync and optimistic send reconciliation
///
/// One controller per session identity. Constructed as an [`Arc`] so the
/// subscription task can re-run bootstrap after an event-stream gap.
pub struct SyncController {
    local: PeerAddress,
    ledger: Arc<dyn RemoteLedger>,
    store: Arc<ConversationStore>,
    codec: Arc<dyn MessageCodec>,
    config: SyncConfig,
    /// Bumped by each bootstrap; stale backfill loops observe the bump
    /// and abandon their pagination sequence
    generation: AtomicU64,
    /// The one live subscription handle for this session
    subscription: Mutex<Option<JoinHandle<()>>>,
}

impl SyncController {
    /// Create a controller for the given session identity
    pub fn new(
        local: PeerAddress,
        ledger: Arc<dyn RemoteLedger>,
        store: Arc<ConversationStore>,
        codec: Arc<dyn MessageCodec>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            local,
            ledger,
            store,
            codec,
            config,
            generation: AtomicU64::new(0),
            subscription: Mutex::new(None),
        })
    }

    /// The session identity
    pub fn local(&self) -> &PeerAddress {
        &self.local
    }

    /// The conversation store this controller drives
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Backfill history for every known partner
    ///
    /// Partners are backfilled concurrently; pages within one partner are
    /// fetched strictly sequentially at increasing offsets until a short
    /// page. A newer bootstrap supersedes the pagination loops of an
    /// older one. Per-peer failures are reported, never fatal.
    pub async fn bootstrap(self: &Arc<Self>) -> SyncResult<BootstrapReport> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let partners = call_with_retry(&self.config, || {
            let ledger = self.ledger.clone();
            async move { ledger.list_partners().await }
        })
        .await
        .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

        debug!(partners = partners.len(), generation, "Starting backfill");

        let mut tasks = JoinSet::new();
        for peer in partners {
            let me = Arc::clone(self);
            tasks.spawn(async move {
                let result = me.backfill_peer(&peer, generation).await;
                (peer, result)
            });
        }

        let mut report = BootstrapReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(inserted))) => report.inserted += inserted,
                Ok((peer, Err(e))) => {
                    warn!(peer = %peer.truncate(), error = %e, "Backfill failed for peer");
                    report.failed_peers.push(peer);
                }
                Err(e) => warn!(error = %e, "Backfill task panicked"),
            }
        }

        debug!(
            inserted = report.inserted,
            failed = report.failed_peers.len(),
            "Backfill complete"
        );
        Ok(report)
    }

    /// Sequential pagination for one peer, oldest-first
    async fn backfill_peer(&self, peer: &PeerAddress, generation: u64) -> SyncResult<usize> {
        let limit = self.config.page_size;
        let mut offset = 0u64;
        let mut inserted = 0usize;

        loop {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(peer = %peer.truncate(), "Abandoning superseded backfill");
                break;
            }

            let page = call_with_retry(&self.config, || {
                let ledger = self.ledger.clone();
                let peer = peer.clone();
                async move { ledger.list(&peer, offset, limit).await }
            })
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;

            let short_page = (page.len() as u64) < limit;
            inserted += self.store.merge(peer, &page)?;

            if short_page {
                break;
            }
            offset += limit;
        }

        Ok(inserted)
    }

    /// Attach the live event subscription
    ///
    /// Tears down any prior subscription first; only one is ever active.
    /// Events published before the subscription attached are not
    /// replayed, so every (re)subscription spawns a backfill pass to
    /// cover the gap; idempotent merge makes the pass free when nothing
    /// was missed. A lagged stream mid-session triggers the same
    /// recovery.
    pub fn subscribe(self: &Arc<Self>) {
        self.unsubscribe();

        let mut rx = self.ledger.events();
        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => me.dispatch(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event stream gap; re-running backfill");
                        if let Err(e) = me.bootstrap().await {
                            warn!(error = %e, "Gap-triggered backfill failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event stream closed; subscription ending");
                        break;
                    }
                }
            }
        });

        if let Ok(mut guard) = self.subscription.lock() {
            *guard = Some(handle);
        }

        let me = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = me.bootstrap().await {
                warn!(error = %e, "Post-subscribe backfill failed");
            }
        });
    }

    /// Detach the live event subscription, if any
    pub fn unsubscribe(&self) {
        if let Ok(mut guard) = self.subscription.lock()
            && let Some(handle) = guard.take()
        {
            handle.abort();
        }
    }

    fn dispatch(&self, event: LedgerEvent) {
        match event {
            LedgerEvent::MessageSent {
                id,
                sender,
                recipient,
                ciphertext,
                timestamp,
            } => {
                let record = LedgerRecord {
                    id,
                    sender,
                    recipient,
                    ciphertext,
                    timestamp,
                    is_read: false,
                };
                if let Err(e) = self.store.apply_sent(&record) {
                    warn!(%id, error = %e, "Failed to apply MessageSent");
                }
            }
            LedgerEvent::MessageRead { id, .. } => {
                if let Err(e) = self.store.apply_read(id) {
                    warn!(%id, error = %e, "Failed to apply MessageRead");
                }
            }
            LedgerEvent::MessageDeleted { id, .. } => {
                if let Err(e) = self.store.apply_deleted(id) {
                    warn!(%id, error = %e, "Failed to apply MessageDeleted");
                }
            }
        }
    }

    /// Send a message with optimistic local echo
    ///
    /// The pending entry is shown immediately; on confirmation it is
    /// removed and the canonical copy arrives through the self-authored
    /// `MessageSent` event (the controller never inserts the confirmed
    /// message itself). On failure the entry is marked `Failed` in place.
    pub async fn send(&self, peer: &PeerAddress, content: &str) -> SyncResult<MessageId> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let key = self.store.insert_pending(peer, content)?;
        let ciphertext = self.codec.encrypt(content);

        let result = call_with_retry(&self.config, || {
            let ledger = self.ledger.clone();
            let peer = peer.clone();
            let ciphertext = ciphertext.clone();
            async move { ledger.send(&ciphertext, &peer).await }
        })
        .await;

        match result {
            Ok(id) => {
                self.store.resolve_pending(peer, key)?;
                debug!(peer = %peer.truncate(), %id, "Send confirmed");
                Ok(id)
            }
            Err(e) => {
                self.store.mark_failed(peer, key)?;
                warn!(peer = %peer.truncate(), error = %e, "Send failed");
                Err(match e {
                    LedgerError::InvalidRecipient(s) => SyncError::InvalidRecipient(s),
                    other => SyncError::SubmissionFailed(other.to_string()),
                })
            }
        }
    }

    /// Best-effort read-receipt fan-out for a peer's conversation
    ///
    /// Each unread inbound message gets its own independent call; one
    /// failure never blocks the rest, and failures are reported rather
    /// than retried.
    pub async fn mark_read(&self, peer: &PeerAddress) -> SyncResult<ReadReceiptReport> {
        let targets = self.store.unread_inbound(peer)?;
        let mut report = ReadReceiptReport::default();

        for id in targets {
            let result = call_with_retry(&self.config, || {
                let ledger = self.ledger.clone();
                async move { ledger.mark_read(id).await }
            })
            .await;

            match result {
                Ok(()) => {
                    // Idempotent with the echoed MessageRead event
                    self.store.apply_read(id)?;
                    report.acknowledged += 1;
                }
                Err(e) => {
                    warn!(%id, error = %e, "Read receipt failed");
                    report.failed.push(id);
                }
            }
        }

        Ok(report)
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Bounded remote call with a single retry for transient failures
///
/// Timeouts count as transient; terminal rejections surface immediately
/// and are never retried.
async fn call_with_retry<T, Fut, F>(config: &SyncConfig, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(config.call_timeout, op()).await {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) if !e.is_transient() => return Err(e),
        Ok(Err(e)) => debug!(error = %e, "Transient ledger failure; retrying once"),
        Err(_) => debug!("Ledger call timed out; retrying once"),
    }

    tokio::time::sleep(config.retry_backoff).await;

    match tokio::time::timeout(config.call_timeout, op()).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Unavailable("call timed out".to_string())),
    }
}
