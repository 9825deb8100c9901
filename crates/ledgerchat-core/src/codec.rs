//! Pluggable symmetric message codec
//!
//! Message bodies cross the ledger boundary as opaque text. The codec is a
//! pure text transform with a fixed external key; it makes no security
//! claims and exists so the engine never stores ciphertext.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::CodecError;

/// Symmetric text codec for message bodies
pub trait MessageCodec: Send + Sync {
    /// Encrypt plaintext into its wire form
    fn encrypt(&self, plaintext: &str) -> String;

    /// Decrypt the wire form back into plaintext
    fn decrypt(&self, ciphertext: &str) -> Result<String, CodecError>;
}

/// Key-cycled XOR codec with a base64 wire form
///
/// Not cryptographically secure; a placeholder transform behind the
/// [`MessageCodec`] seam. An empty key degrades to plain base64.
pub struct XorCodec {
    key: Vec<u8>,
}

impl XorCodec {
    /// Create a codec from a shared key string
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        if self.key.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .zip(self.key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect()
    }
}

impl MessageCodec for XorCodec {
    fn encrypt(&self, plaintext: &str) -> String {
        BASE64.encode(self.apply(plaintext.as_bytes()))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CodecError> {
        let raw = BASE64
            .decode(ciphertext)
            .map_err(|e| CodecError::InvalidEncoding(e.to_string()))?;
        String::from_utf8(self.apply(&raw)).map_err(|_| CodecError::NotText)
    }
}
