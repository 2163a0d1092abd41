//! Append-only batch log backing the persistent engine.
//!
//! Every committed batch is appended as one framed record before it becomes
//! visible in memory. At open the log is replayed in order; a torn or
//! checksum-failing tail (a crash mid-append) is truncated away.
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┐
//! │ Length (4, BE)  │ CRC32 (4, BE)    │ Batch repr (variable)   │
//! └─────────────────┴──────────────────┴─────────────────────────┘
//! ```
//!
//! The CRC covers the payload only.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use strata_core::Result;

/// File name of the batch log inside the data directory
pub const WAL_FILE_NAME: &str = "batches.wal";

/// Size of the per-record frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Append-only, checksummed batch log
pub struct Wal {
    file: File,
    path: PathBuf,
    sync_writes: bool,
    size: u64,
}

/// Outcome of replaying a log at open
#[derive(Debug, Default)]
pub struct WalReplay {
    /// Intact record payloads, in append order
    pub records: Vec<Vec<u8>>,
    /// Bytes discarded from a torn or corrupt tail
    pub truncated_bytes: u64,
}

impl Wal {
    /// Open (creating if needed) the log in `dir` and replay it
    pub fn open(dir: &Path, sync_writes: bool) -> Result<(Self, WalReplay)> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let (records, valid_len) = parse_frames(&contents);
        let truncated_bytes = contents.len() as u64 - valid_len;
        if truncated_bytes > 0 {
            warn!(
                target: "strata::storage",
                path = %path.display(),
                valid_len,
                truncated_bytes,
                "Truncating torn batch log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        debug!(
            target: "strata::storage",
            path = %path.display(),
            records = records.len(),
            "Replayed batch log"
        );

        Ok((
            Wal {
                file,
                path,
                sync_writes,
                size: valid_len,
            },
            WalReplay {
                records,
                truncated_bytes,
            },
        ))
    }

    /// Append one record
    ///
    /// The frame is written with a single `write_all`; with `sync_writes` the
    /// data is flushed to stable storage before returning.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.write_u32::<BigEndian>(payload.len() as u32)?;
        frame.write_u32::<BigEndian>(crc32fast::hash(payload))?;
        frame.extend_from_slice(payload);

        let written = self.file.write_all(&frame).and_then(|()| {
            if self.sync_writes {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });
        if let Err(e) = written {
            // Drop the partial frame so later appends are not hidden behind it.
            self.file.set_len(self.size)?;
            self.file.seek(SeekFrom::Start(self.size))?;
            return Err(e.into());
        }
        self.size += frame.len() as u64;
        Ok(())
    }

    /// Flush to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Parse frames from the start of `bytes`.
///
/// Returns the intact payloads and the length of the valid prefix.
fn parse_frames(bytes: &[u8]) -> (Vec<Vec<u8>>, u64) {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while bytes.len() - offset >= FRAME_HEADER_SIZE {
        let mut header = &bytes[offset..offset + FRAME_HEADER_SIZE];
        let (Ok(len), Ok(crc)) = (
            header.read_u32::<BigEndian>(),
            header.read_u32::<BigEndian>(),
        ) else {
            break;
        };
        let start = offset + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len as usize).filter(|end| *end <= bytes.len()) else {
            break;
        };
        let payload = &bytes[start..end];
        if crc32fast::hash(payload) != crc {
            break;
        }
        records.push(payload.to_vec());
        offset = end;
    }

    (records, offset as u64)
}
