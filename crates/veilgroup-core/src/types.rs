//! Strong type definitions for Veilgroup.
//!
//! Every identifier is a newtype so group ids, message indices and handles
//! cannot be swapped for one another at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Dense, sequential identifier of a group, assigned at creation.
///
/// Ids are allocated from a ledger-wide counter starting at zero and are
/// never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl GroupId {
    /// The id following this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw counter value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Big-endian encoding, used when the id is mixed into a hash.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GroupId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Position of a message within its group's sequence (0-based, dense).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageIndex(pub u64);

impl MessageIndex {
    /// Raw index value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for MessageIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

/// Opaque reference to a ciphertext held by the encryption service.
///
/// A handle is meaningful only to the service and to principals that have
/// been authorized against it. The registry records and authorizes handles
/// but never interprets them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub [u8; 32]);

impl Handle {
    /// Create a handle from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl TryFrom<&[u8]> for Handle {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// A 256-bit big-endian plaintext word: the unit the encryption service
/// encrypts and decrypts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClearWord(pub [u8; 32]);

impl ClearWord {
    /// The all-zero word.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Widen a `u64` into a word (left-zero-padded).
    pub fn from_u64(value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }

    /// Narrow the word back to a `u64`, failing if any high byte is set.
    pub fn to_u64(&self) -> Result<u64, CoreError> {
        if self.0[..24].iter().any(|b| *b != 0) {
            return Err(CoreError::WordOverflow(8));
        }
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[24..]);
        Ok(u64::from_be_bytes(low))
    }

    /// Get the raw big-endian bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// Plaintext words are secrets in transit; only their width is printed.
impl fmt::Debug for ClearWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClearWord(..)")
    }
}

/// The shared symmetric secret of a group.
///
/// It is derived on the ledger from weak, public entropy and immediately
/// handed to the encryption service; its plaintext is only ever recovered by
/// authorized members, client-side.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GroupSecret(pub u64);

impl GroupSecret {
    /// Canonical big-endian representation.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The secret as a service plaintext word.
    pub fn to_word(self) -> ClearWord {
        ClearWord::from_u64(self.0)
    }

    /// Recover a secret from a decrypted word.
    pub fn from_word(word: &ClearWord) -> Result<Self, CoreError> {
        word.to_u64().map(Self)
    }
}

impl fmt::Debug for GroupSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_hex_roundtrip() {
        let handle = Handle::from_bytes([0x42; 32]);
        let recovered = Handle::from_hex(&handle.to_hex()).unwrap();
        assert_eq!(handle, recovered);
    }

    #[test]
    fn test_handle_display() {
        let handle = Handle::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", handle), "abababababababab");
        assert!(format!("{:?}", handle).starts_with("Handle("));
    }

    #[test]
    fn test_clear_word_u64() {
        let word = ClearWord::from_u64(0x0102_0304_0506_0708);
        assert_eq!(&word.0[24..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(word.to_u64().unwrap(), 0x0102_0304_0506_0708);

        let mut wide = word;
        wide.0[0] = 1;
        assert_eq!(wide.to_u64(), Err(CoreError::WordOverflow(8)));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = GroupSecret(0xdead_beef);
        assert_eq!(format!("{:?}", secret), "GroupSecret(..)");
        assert_eq!(GroupSecret::from_word(&secret.to_word()).unwrap(), secret);
    }

    #[test]
    fn test_group_id_next() {
        assert_eq!(GroupId(0).next(), GroupId(1));
        assert_eq!(GroupId(7).to_be_bytes(), [0, 0, 0, 0, 0, 0, 0, 7]);
    }
}
