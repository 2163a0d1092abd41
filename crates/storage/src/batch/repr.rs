//! Batch representation format.
//!
//! A batch representation is the serialized form of a mutation batch: an
//! ordered sequence of tagged records applied as one atomic unit. It is the
//! unit of replay and the payload of every persistent log record.
//!
//! # Format
//!
//! ```text
//! Header:
//! ┌──────────────────┬──────────────────┬────────────────────────────┐
//! │ Magic "SB" (2)   │ Version (1)      │ Record count (4, BE)       │
//! └──────────────────┴──────────────────┴────────────────────────────┘
//!
//! Record:
//! ┌──────────────┬──────────────────┬──────────┬────────────────────┬──────────┐
//! │ Opcode (1)   │ Key length (4)   │ Key      │ Value length (4)   │ Value    │
//! └──────────────┴──────────────────┴──────────┴────────────────────┴──────────┘
//! ```
//!
//! Delete records carry no value section. A RangeDelete's value is the
//! exclusive end key of the range.

use byteorder::{BigEndian, ReadBytesExt};

use super::BatchOp;

/// Magic bytes opening every batch representation: "SB"
pub const REPR_MAGIC: [u8; 2] = *b"SB";

/// Current representation format version
pub const REPR_VERSION: u8 = 1;

/// Size of the header in bytes
pub const REPR_HEADER_SIZE: usize = 7;

/// Record opcodes
const OP_SET: u8 = 0x01;
const OP_DELETE: u8 = 0x02;
const OP_MERGE: u8 = 0x03;
const OP_RANGE_DELETE: u8 = 0x04;

/// Serialize records into a batch representation.
pub fn encode(ops: &[BatchOp]) -> Vec<u8> {
    let body: usize = ops.iter().map(BatchOp::encoded_len).sum();
    let mut bytes = Vec::with_capacity(REPR_HEADER_SIZE + body);

    bytes.extend_from_slice(&REPR_MAGIC);
    bytes.push(REPR_VERSION);
    bytes.extend_from_slice(&(ops.len() as u32).to_be_bytes());

    for op in ops {
        match op {
            BatchOp::Set { key, value } => {
                bytes.push(OP_SET);
                write_field(&mut bytes, key);
                write_field(&mut bytes, value);
            }
            BatchOp::Delete { key } => {
                bytes.push(OP_DELETE);
                write_field(&mut bytes, key);
            }
            BatchOp::Merge { key, value } => {
                bytes.push(OP_MERGE);
                write_field(&mut bytes, key);
                write_field(&mut bytes, value);
            }
            BatchOp::RangeDelete { start, end } => {
                bytes.push(OP_RANGE_DELETE);
                write_field(&mut bytes, start);
                write_field(&mut bytes, end);
            }
        }
    }

    bytes
}

/// Deserialize a batch representation.
///
/// The whole input is validated: a short record, unknown opcode, record count
/// mismatch or trailing bytes rejects the representation.
pub fn decode(bytes: &[u8]) -> Result<Vec<BatchOp>, ReprError> {
    let count = read_header(bytes)? as usize;
    let mut cursor = &bytes[REPR_HEADER_SIZE..];
    // Each record is at least opcode + key length.
    let mut ops = Vec::with_capacity(count.min(cursor.len() / 5));

    for index in 0..count {
        let opcode = cursor
            .read_u8()
            .map_err(|_| ReprError::Truncated { record: index })?;
        let key = read_field(&mut cursor, index)?;
        let op = match opcode {
            OP_SET => BatchOp::Set {
                key,
                value: read_field(&mut cursor, index)?,
            },
            OP_DELETE => BatchOp::Delete { key },
            OP_MERGE => BatchOp::Merge {
                key,
                value: read_field(&mut cursor, index)?,
            },
            OP_RANGE_DELETE => BatchOp::RangeDelete {
                start: key,
                end: read_field(&mut cursor, index)?,
            },
            other => return Err(ReprError::InvalidOpcode(other)),
        };
        ops.push(op);
    }

    if !cursor.is_empty() {
        return Err(ReprError::TrailingBytes(cursor.len()));
    }

    Ok(ops)
}

/// Read and validate the header, returning the record count.
pub fn read_header(bytes: &[u8]) -> Result<u32, ReprError> {
    if bytes.len() < REPR_HEADER_SIZE {
        return Err(ReprError::InsufficientData);
    }
    if bytes[0..2] != REPR_MAGIC {
        return Err(ReprError::BadMagic);
    }
    if bytes[2] != REPR_VERSION {
        return Err(ReprError::UnsupportedVersion(bytes[2]));
    }
    let mut cursor = &bytes[3..REPR_HEADER_SIZE];
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| ReprError::InsufficientData)
}

/// Check that record keys are strictly ascending.
///
/// Required for sequential application. RangeDelete records are ordered by
/// their start key.
pub fn check_ascending(ops: &[BatchOp]) -> Result<(), ReprError> {
    for (index, pair) in ops.windows(2).enumerate() {
        if pair[0].key() >= pair[1].key() {
            return Err(ReprError::NotAscending { record: index + 1 });
        }
    }
    Ok(())
}

fn write_field(bytes: &mut Vec<u8>, field: &[u8]) {
    bytes.extend_from_slice(&(field.len() as u32).to_be_bytes());
    bytes.extend_from_slice(field);
}

fn read_field(cursor: &mut &[u8], record: usize) -> Result<Vec<u8>, ReprError> {
    let len = cursor
        .read_u32::<BigEndian>()
        .map_err(|_| ReprError::Truncated { record })? as usize;
    if cursor.len() < len {
        return Err(ReprError::Truncated { record });
    }
    let (field, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(field.to_vec())
}

/// Batch representation parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReprError {
    /// Not enough data for the header
    #[error("Insufficient data")]
    InsufficientData,

    /// Magic bytes do not match
    #[error("Bad magic bytes")]
    BadMagic,

    /// Unknown format version
    #[error("Unsupported repr version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid opcode byte
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// A record ends before its declared length
    #[error("Truncated record {record}")]
    Truncated {
        /// Zero-based record index
        record: usize,
    },

    /// Bytes left over after the declared record count
    #[error("{0} trailing bytes after last record")]
    TrailingBytes(usize),

    /// Sequential application requires strictly ascending keys
    #[error("Record {record} is not in strictly ascending key order")]
    NotAscending {
        /// Zero-based index of the offending record
        record: usize,
    },
}

impl From<ReprError> for strata_core::Error {
    fn from(e: ReprError) -> Self {
        strata_core::Error::Corruption(format!("batch repr: {}", e))
    }
}
