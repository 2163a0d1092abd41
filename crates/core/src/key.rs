//! Logical keys
//!
//! A logical key is an opaque byte string identifying a row. Keys compare
//! byte-lexicographically; the empty key is the smallest key.
//!
//! Ranges over logical keys are half-open `[start, end)`. An absent end bound
//! means "to the end of the keyspace".

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use crate::limits::{LimitError, Limits};

/// Opaque, byte-ordered logical key
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Create a key from raw bytes
    #[inline]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// The empty key (smallest key in the keyspace)
    #[inline]
    pub fn min() -> Self {
        Key(Vec::new())
    }

    /// Raw key bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key and return its bytes
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The smallest key strictly greater than `self`
    ///
    /// Appends a zero byte. Used to turn an inclusive bound into an exclusive
    /// one, e.g. when resuming a reverse scan.
    pub fn next(&self) -> Key {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0);
        Key(bytes)
    }

    /// The smallest key greater than every key prefixed by `self`
    ///
    /// Returns `None` when no such key exists (empty key or all `0xFF`).
    pub fn prefix_end(&self) -> Option<Key> {
        let mut bytes = self.0.clone();
        while let Some(last) = bytes.pop() {
            if last < u8::MAX {
                bytes.push(last + 1);
                return Some(Key(bytes));
            }
        }
        None
    }

    /// Check the key against configured limits
    pub fn validate(&self, limits: &Limits) -> Result<(), LimitError> {
        limits.validate_key_length(self.0.len())
    }
}

impl Deref for Key {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Key {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(bytes: &[u8; N]) -> Self {
        Key(bytes.to_vec())
    }
}

/// Printable rendering: ASCII graphic bytes as-is, everything else escaped
impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        write!(f, "\"")
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}
