//! The sealed message envelope.
//!
//! A message is carried as one 256-bit word. Before encryption the word is a
//! fixed 32-byte block:
//!
//! ```text
//! +-----+---------------------+------------------+
//! |  L  |  L bytes of UTF-8   |  zero padding    |
//! +-----+---------------------+------------------+
//!   0     1 .. 1+L              1+L .. 32
//! ```
//!
//! The block is XORed with a key stream derived from the group secret, so
//! the word submitted for encryption never shows the plaintext layout. Opening
//! reverses the XOR and validates the length byte and the UTF-8.
//!
//! Both directions are pure: the same input always yields the same output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::derive_hash;
use crate::error::CoreError;
use crate::types::{ClearWord, GroupSecret};

/// Width of an envelope in bytes.
pub const ENVELOPE_WIDTH: usize = 32;

/// Largest payload an envelope can carry (one byte goes to the length).
pub const MAX_PAYLOAD_LEN: usize = ENVELOPE_WIDTH - 1;

const KEY_STREAM_CONTEXT: &str = "veilgroup envelope key stream v1";

/// The per-group XOR key stream.
///
/// Lives only for the duration of a seal/open call or a client decrypt
/// session; it is never persisted.
#[derive(Clone)]
pub struct KeyStream([u8; ENVELOPE_WIDTH]);

impl KeyStream {
    /// Derive the key stream by hashing the secret's big-endian bytes.
    pub fn derive(secret: GroupSecret) -> Self {
        Self(derive_hash(KEY_STREAM_CONTEXT, &[&secret.to_be_bytes()]))
    }

    fn apply(&self, block: &mut [u8; ENVELOPE_WIDTH]) {
        for (b, k) in block.iter_mut().zip(self.0.iter()) {
            *b ^= k;
        }
    }
}

impl fmt::Debug for KeyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyStream(..)")
    }
}

/// A sealed envelope: 32 bytes read as a big-endian unsigned integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SealedEnvelope(pub [u8; ENVELOPE_WIDTH]);

impl SealedEnvelope {
    /// Render a big-endian integer of any width as an envelope.
    ///
    /// Shorter inputs are left-zero-padded. Leading zero bytes beyond the
    /// envelope width are accepted; any other excess is `CorruptEnvelope`.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let first_significant = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let significant = &bytes[first_significant..];
        if significant.len() > ENVELOPE_WIDTH {
            return Err(CoreError::CorruptEnvelope(format!(
                "integer is {} bytes wide, envelope holds {}",
                significant.len(),
                ENVELOPE_WIDTH
            )));
        }

        let mut block = [0u8; ENVELOPE_WIDTH];
        block[ENVELOPE_WIDTH - significant.len()..].copy_from_slice(significant);
        Ok(Self(block))
    }

    /// The envelope as a 64-character hex integer.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw big-endian bytes.
    pub const fn as_bytes(&self) -> &[u8; ENVELOPE_WIDTH] {
        &self.0
    }
}

impl fmt::Debug for SealedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedEnvelope({})", &self.to_hex()[..16])
    }
}

impl From<SealedEnvelope> for ClearWord {
    fn from(envelope: SealedEnvelope) -> Self {
        ClearWord(envelope.0)
    }
}

impl From<ClearWord> for SealedEnvelope {
    fn from(word: ClearWord) -> Self {
        SealedEnvelope(word.0)
    }
}

/// Seal `plaintext` under the group secret.
pub fn seal(plaintext: impl AsRef<[u8]>, secret: GroupSecret) -> Result<SealedEnvelope, CoreError> {
    let plaintext = plaintext.as_ref();
    if plaintext.len() > MAX_PAYLOAD_LEN {
        return Err(CoreError::MessageTooLong {
            len: plaintext.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut block = [0u8; ENVELOPE_WIDTH];
    block[0] = plaintext.len() as u8;
    block[1..1 + plaintext.len()].copy_from_slice(plaintext);

    KeyStream::derive(secret).apply(&mut block);
    Ok(SealedEnvelope(block))
}

/// Open an envelope sealed under the group secret.
///
/// A wrong secret usually surfaces as `CorruptEnvelope`, but not always: a
/// mismatched key can still yield a small length byte over valid UTF-8, in
/// which case garbage text is returned.
pub fn open(envelope: &SealedEnvelope, secret: GroupSecret) -> Result<String, CoreError> {
    let mut block = envelope.0;
    KeyStream::derive(secret).apply(&mut block);

    let len = block[0] as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(CoreError::CorruptEnvelope(format!(
            "length byte {} exceeds {}",
            len, MAX_PAYLOAD_LEN
        )));
    }

    std::str::from_utf8(&block[1..1 + len])
        .map(str::to_owned)
        .map_err(|e| CoreError::CorruptEnvelope(format!("payload is not UTF-8: {}", e)))
}
