//! # Ledgerchat Core
//!
//! Leaf types shared by the ledgerchat conversation engine:
//!
//! - [`PeerAddress`]: validated peer identifiers with display helpers
//! - [`ChatMessage`] and friends: the in-memory message model
//! - [`MessageCodec`]: pluggable symmetric text codec for message bodies
//!
//! These types carry no I/O and no async machinery; the synchronization
//! engine lives in `ledgerchat-sync`.

pub mod address;
pub mod codec;
pub mod error;
pub mod message;

// Re-exports
pub use address::PeerAddress;
pub use codec::{MessageCodec, XorCodec};
pub use error::{AddressError, CodecError};
pub use message::{ChatMessage, DeliveryStatus, MessageBody, MessageId, MessageKey};
