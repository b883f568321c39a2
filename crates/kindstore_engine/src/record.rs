//! Store log record framing.
//!
//! ```text
//! | record_len (4) | crc32 (4) | flags (1) | key_len (4) | key (K) | value (V) |
//! ```
//!
//! All integers are little-endian. `record_len` counts the whole record,
//! itself included. The CRC covers every byte after the CRC field.

use crate::error::{EngineError, EngineResult};

/// Bytes before the key.
pub const HEADER_SIZE: usize = 4 + 4 + 1 + 4;

/// Longest key the framing accepts.
pub const MAX_KEY_LEN: usize = 64 * 1024;

/// Longest value the `u32` length prefix can frame with an empty key.
pub const MAX_VALUE_LEN: usize = u32::MAX as usize - HEADER_SIZE;

const FLAG_TOMBSTONE: u8 = 0x01;

/// One entry of a store log: a put, or a tombstone for a deleted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    flags: u8,
    /// The record key.
    pub key: Vec<u8>,
    /// The value; empty for tombstones.
    pub value: Vec<u8>,
}

impl LogRecord {
    /// Creates a put record.
    #[must_use]
    pub fn put(key: &[u8], value: &[u8]) -> Self {
        Self {
            flags: 0,
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// Creates a tombstone for `key`.
    #[must_use]
    pub fn tombstone(key: &[u8]) -> Self {
        Self {
            flags: FLAG_TOMBSTONE,
            key: key.to_vec(),
            value: Vec::new(),
        }
    }

    /// Returns whether this record deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Returns the framed size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Frames the record.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::KeyTooLarge`] for keys over [`MAX_KEY_LEN`].
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        if self.key.len() > MAX_KEY_LEN {
            return Err(EngineError::KeyTooLarge {
                len: self.key.len(),
                max: MAX_KEY_LEN,
            });
        }

        let record_len = checked_record_len(self.key.len(), self.value.len())?;
        let mut buf = Vec::with_capacity(record_len as usize);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(self.flags);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[8..]);
        buf[4..8].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Parses one framed record; `offset` is only used in error reports.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Corrupted`] on a length, key length or
    /// checksum mismatch.
    pub fn decode(data: &[u8], offset: u64) -> EngineResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(EngineError::corrupted(offset, "record shorter than header"));
        }

        let record_len = read_u32(data, 0) as usize;
        if record_len != data.len() {
            return Err(EngineError::corrupted(
                offset,
                format!("length field {record_len} does not match {} bytes", data.len()),
            ));
        }

        let stored_crc = read_u32(data, 4);
        let actual_crc = crc32fast::hash(&data[8..]);
        if stored_crc != actual_crc {
            return Err(EngineError::corrupted(
                offset,
                format!("checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"),
            ));
        }

        let flags = data[8];
        let key_len = read_u32(data, 9) as usize;
        let key_end = HEADER_SIZE + key_len;
        if key_len > MAX_KEY_LEN || key_end > data.len() {
            return Err(EngineError::corrupted(offset, "key extends beyond record"));
        }

        Ok(Self {
            flags,
            key: data[HEADER_SIZE..key_end].to_vec(),
            value: data[key_end..].to_vec(),
        })
    }
}

/// Returns the framed length of a record, which must fit the `u32` prefix.
fn checked_record_len(key_len: usize, value_len: usize) -> EngineResult<u32> {
    HEADER_SIZE
        .checked_add(key_len)
        .and_then(|n| n.checked_add(value_len))
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(EngineError::RecordTooLarge {
            len: value_len,
            max: MAX_VALUE_LEN.saturating_sub(key_len),
        })
}

/// Reads the `record_len` prefix of a framed record.
#[must_use]
pub fn peek_len(prefix: &[u8; 4]) -> usize {
    u32::from_le_bytes(*prefix) as usize
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_layout() {
        let bytes = LogRecord::put(b"k1", b"value").encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 2 + 5);
        assert_eq!(peek_len(&[bytes[0], bytes[1], bytes[2], bytes[3]]), bytes.len());
        assert_eq!(bytes[8], 0);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 2], b"k1");
    }

    #[test]
    fn tombstone_has_flag_and_no_value() {
        let record = LogRecord::tombstone(b"gone");
        let decoded = LogRecord::decode(&record.encode().unwrap(), 0).unwrap();
        assert!(decoded.is_tombstone());
        assert!(decoded.value.is_empty());
        assert_eq!(decoded.key, b"gone");
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut bytes = LogRecord::put(b"k", b"v").encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;

        let err = LogRecord::decode(&bytes, 77).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted { offset: 77, .. }));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let bytes = LogRecord::put(b"key", b"value").encode().unwrap();
        assert!(LogRecord::decode(&bytes[..bytes.len() - 2], 0).is_err());
        assert!(LogRecord::decode(&bytes[..5], 0).is_err());
    }

    #[test]
    fn record_length_must_fit_the_prefix() {
        assert_eq!(checked_record_len(2, 5).unwrap(), (HEADER_SIZE + 7) as u32);
        assert_eq!(checked_record_len(0, MAX_VALUE_LEN).unwrap(), u32::MAX);

        let err = checked_record_len(4, MAX_VALUE_LEN).unwrap_err();
        assert!(matches!(
            err,
            EngineError::RecordTooLarge { len: MAX_VALUE_LEN, max } if max == MAX_VALUE_LEN - 4
        ));
        assert!(checked_record_len(usize::MAX, 1).is_err());
    }

    #[test]
    fn oversized_key_is_refused() {
        let key = vec![b'x'; MAX_KEY_LEN + 1];
        let result = LogRecord::put(&key, b"").encode();
        assert!(matches!(result, Err(EngineError::KeyTooLarge { .. })));
    }
}
