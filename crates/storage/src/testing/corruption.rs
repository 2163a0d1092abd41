//! Batch log corruption testing utilities
//!
//! Provides utilities for simulating damage to the persistent engine's batch
//! log, to test that reopening recovers the intact prefix.
//!
//! # Corruption Types
//!
//! - Truncation: Removes bytes from the log tail (simulates crash during append)
//! - Garbage: Appends invalid bytes (simulates partial write)
//! - Bit rot: Flips a byte (simulates storage degradation)
//!
//! # Example
//!
//! ```ignore
//! use strata_storage::testing::LogCorruptionTester;
//!
//! let tester = LogCorruptionTester::new("path/to/db");
//! tester.truncate_tail(5)?;
//! let verification = tester.verify_recovery()?;
//! assert!(verification.recovered);
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::engine::Engine;
use crate::wal::WAL_FILE_NAME;

/// Batch log corruption test utilities
pub struct LogCorruptionTester {
    /// Database directory
    db_dir: PathBuf,
}

impl LogCorruptionTester {
    /// Create a new corruption tester for a data directory
    pub fn new(db_dir: impl AsRef<Path>) -> Self {
        LogCorruptionTester {
            db_dir: db_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the batch log
    pub fn log_path(&self) -> PathBuf {
        self.db_dir.join(WAL_FILE_NAME)
    }

    /// Current log size in bytes (zero if absent)
    pub fn log_size(&self) -> std::io::Result<u64> {
        match std::fs::metadata(self.log_path()) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Truncate the log tail by removing bytes
    ///
    /// Simulates crash during append where only partial data is written.
    pub fn truncate_tail(&self, bytes_to_remove: u64) -> std::io::Result<TruncationResult> {
        let original_size = self.log_size()?;
        if original_size == 0 || bytes_to_remove > original_size {
            return Ok(TruncationResult {
                original_size,
                new_size: original_size,
                bytes_removed: 0,
            });
        }

        let new_size = original_size - bytes_to_remove;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(self.log_path())?;
        file.set_len(new_size)?;

        Ok(TruncationResult {
            original_size,
            new_size,
            bytes_removed: bytes_to_remove,
        })
    }

    /// Append garbage bytes to the log tail
    pub fn append_garbage(&self, garbage: &[u8]) -> std::io::Result<u64> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        file.write_all(garbage)?;
        Ok(garbage.len() as u64)
    }

    /// Flip every bit of the byte at `offset`
    ///
    /// Returns false when the log is shorter than `offset`.
    pub fn flip_byte(&self, offset: u64) -> std::io::Result<bool> {
        let path = self.log_path();
        let mut bytes = std::fs::read(&path)?;
        let Some(byte) = bytes.get_mut(offset as usize) else {
            return Ok(false);
        };
        *byte = !*byte;
        std::fs::write(&path, bytes)?;
        Ok(true)
    }

    /// Reopen the directory and report what was recovered
    pub fn verify_recovery(&self) -> std::io::Result<RecoveryVerification> {
        let size_before = self.log_size()?;
        let config = StorageConfig::persistent(&self.db_dir);
        match Engine::open(&config, None) {
            Ok(engine) => {
                let keys = engine.snapshot().map(|s| s.len()).unwrap_or(0);
                let _ = engine.close();
                Ok(RecoveryVerification {
                    recovered: true,
                    keys,
                    bytes_discarded: size_before.saturating_sub(self.log_size()?),
                    error: None,
                })
            }
            Err(e) => Ok(RecoveryVerification {
                recovered: false,
                keys: 0,
                bytes_discarded: 0,
                error: Some(e.to_string()),
            }),
        }
    }
}

/// Result of truncating the log
#[derive(Debug, Clone)]
pub struct TruncationResult {
    /// Size before truncation
    pub original_size: u64,
    /// Size after truncation
    pub new_size: u64,
    /// Bytes removed
    pub bytes_removed: u64,
}

/// Result of reopening a damaged directory
#[derive(Debug, Clone)]
pub struct RecoveryVerification {
    /// Whether the engine opened
    pub recovered: bool,
    /// Physical keys present after recovery
    pub keys: usize,
    /// Bytes of damaged tail discarded at open
    pub bytes_discarded: u64,
    /// Open error, if any
    pub error: Option<String>,
}
