//! Error types for ledgerchat-core

use thiserror::Error;

/// Errors from parsing a peer address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Address does not start with the `0x` prefix
    #[error("address missing 0x prefix: {0}")]
    MissingPrefix(String),

    /// Address payload has the wrong length
    #[error("invalid address length: expected {expected} hex digits, got {actual}")]
    InvalidLength {
        /// Expected number of hex digits
        expected: usize,
        /// Actual number of hex digits
        actual: usize,
    },

    /// Address payload is not valid hex
    #[error("address is not valid hex: {0}")]
    NotHex(String),
}

/// Errors from decoding a message body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Ciphertext is not valid base64
    #[error("ciphertext is not valid base64: {0}")]
    InvalidEncoding(String),

    /// Decrypted payload is not valid UTF-8 text
    #[error("decrypted payload is not valid UTF-8")]
    NotText,
}
