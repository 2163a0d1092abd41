//! Size limits for keys and values
//!
//! Limits are enforced by the version writer before anything reaches storage.
//! Violations surface as `Error::Limit`.
//!
//! Custom limits are set once in the store configuration and passed by
//! reference; there is no process-wide limit state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size limits for keys and values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum logical key length in bytes (default: 64KB)
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,

    /// Maximum value or merge delta length in bytes (default: 64MB)
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

fn default_max_key_bytes() -> usize {
    64 * 1024
}

fn default_max_value_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: default_max_key_bytes(),
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 100,
            max_value_bytes: 1000,
        }
    }

    /// Validate a key length
    pub fn validate_key_length(&self, len: usize) -> Result<(), LimitError> {
        if len > self.max_key_bytes {
            return Err(LimitError::KeyTooLong {
                actual: len,
                max: self.max_key_bytes,
            });
        }
        Ok(())
    }

    /// Validate a value length
    pub fn validate_value_length(&self, len: usize) -> Result<(), LimitError> {
        if len > self.max_value_bytes {
            return Err(LimitError::ValueTooLarge {
                actual: len,
                max: self.max_value_bytes,
            });
        }
        Ok(())
    }
}

/// Limit validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitError {
    /// Key exceeds maximum length
    #[error("key too long: {actual} bytes exceeds maximum {max}")]
    KeyTooLong {
        /// Actual key length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Value exceeds maximum size
    #[error("value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge {
        /// Actual size in bytes
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },
}

impl LimitError {
    /// Short machine-readable reason
    pub fn reason_code(&self) -> &'static str {
        match self {
            LimitError::KeyTooLong { .. } => "key_too_long",
            LimitError::ValueTooLarge { .. } => "value_too_large",
        }
    }
}
