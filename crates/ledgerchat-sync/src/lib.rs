//! # Ledgerchat Sync
//!
//! Client-side conversation synchronization engine for a contract-backed
//! messenger. Reconciles an append-only, partially-ordered event stream
//! (live `MessageSent` / `MessageRead` / `MessageDeleted` events plus
//! paginated historical reads) into a consistent, deduplicated, per-peer
//! conversation view.
//!
//! ## Components
//!
//! - [`RemoteLedger`]: the contract boundary: send, paginated list, read
//!   receipts, deletion, partner discovery, and a push event stream
//! - [`ConversationStore`]: single source of truth for the session's
//!   conversations; idempotent merge, tombstones, pending read receipts
//! - [`SyncController`]: drives the store through backfill pagination, the
//!   live subscription, optimistic sends, and read-receipt fan-out
//! - [`MockChain`]: in-memory ledger for tests and demos
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledgerchat_core::{PeerAddress, XorCodec};
//! use ledgerchat_sync::{ConversationStore, MockChain, SyncConfig, SyncController};
//!
//! let me = PeerAddress::parse("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")?;
//! let peer = PeerAddress::parse("0x70997970c51812dc3a010c7d01b50e0d17dc79c8")?;
//! let chain = MockChain::new();
//! let codec = Arc::new(XorCodec::new("shared-key"));
//! let store = Arc::new(ConversationStore::new(me.clone(), codec.clone()));
//! let ledger = Arc::new(chain.client(me.clone()));
//! let controller = SyncController::new(me, ledger, store, codec, SyncConfig::default());
//! controller.subscribe();
//! controller.send(&peer, "hello").await?;
//! ```

pub mod controller;
pub mod error;
pub mod ledger;
pub mod mock_ledger;
pub mod store;

// Re-exports
pub use controller::{BootstrapReport, ReadReceiptReport, SyncConfig, SyncController};
pub use error::{SyncError, SyncResult};
pub use ledger::{LedgerError, LedgerEvent, LedgerRecord, RemoteLedger};
pub use mock_ledger::{InMemoryLedger, MockChain};
pub use store::ConversationStore;
