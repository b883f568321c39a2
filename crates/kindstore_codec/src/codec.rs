//! The shared record codec.

use crate::error::{CodecError, CodecResult};
use crate::pool::BufferPool;
use bytes::BufMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Buffer pool sizing for a [`Codec`].
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Idle buffers kept per direction.
    pub max_idle_buffers: usize,
    /// Capacity of a freshly allocated buffer.
    pub initial_capacity: usize,
    /// Buffers that grew beyond this are freed rather than pooled.
    pub max_retained_capacity: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_idle_buffers: 16,
            initial_capacity: 256,
            max_retained_capacity: 1024 * 1024, // 1 MiB
        }
    }
}

impl CodecConfig {
    /// Creates the default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle buffers kept per direction.
    #[must_use]
    pub const fn max_idle_buffers(mut self, value: usize) -> Self {
        self.max_idle_buffers = value;
        self
    }

    /// Sets the capacity of new buffers.
    #[must_use]
    pub const fn initial_capacity(mut self, value: usize) -> Self {
        self.initial_capacity = value;
        self
    }

    /// Sets the largest capacity a returned buffer may keep.
    #[must_use]
    pub const fn max_retained_capacity(mut self, value: usize) -> Self {
        self.max_retained_capacity = value;
        self
    }
}

/// Converts records to and from CBOR bytes.
///
/// Encoding and decoding draw from separate buffer pools, so the two
/// directions never contend. Any number of threads may share one `Codec`.
///
/// ```rust
/// use kindstore_codec::Codec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Account {
///     name: String,
///     balance: i64,
/// }
///
/// let codec = Codec::new();
/// let alice = Account { name: "alice".into(), balance: 100 };
/// let bytes = codec.encode(&alice).unwrap();
/// let back: Account = codec.decode(&bytes).unwrap();
/// assert_eq!(back, alice);
/// ```
#[derive(Debug)]
pub struct Codec {
    encode_pool: BufferPool,
    decode_pool: BufferPool,
}

impl Codec {
    /// Creates a codec with default pool sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&CodecConfig::default())
    }

    /// Creates a codec with the given pool sizing.
    #[must_use]
    pub fn with_config(config: &CodecConfig) -> Self {
        let pool = || {
            BufferPool::new(
                config.max_idle_buffers,
                config.initial_capacity,
                config.max_retained_capacity,
            )
        };
        Self {
            encode_pool: pool(),
            decode_pool: pool(),
        }
    }

    /// Serializes `value` and returns an owned copy of the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the value cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut buf = self.encode_pool.checkout();
        ciborium::ser::into_writer(value, (&mut *buf).writer())
            .map_err(|e| CodecError::encode(e.to_string()))?;
        Ok(buf.to_vec())
    }

    /// Deserializes a fresh `T` from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes do not describe a `T`.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        let mut buf = self.decode_pool.checkout();
        buf.extend_from_slice(bytes);
        ciborium::de::from_reader(&buf[..]).map_err(|e| CodecError::decode(e.to_string()))
    }

    /// Deserializes into `out`, which is left untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes do not describe a `T`.
    pub fn decode_into<T: DeserializeOwned>(&self, bytes: &[u8], out: &mut T) -> CodecResult<()> {
        *out = self.decode(bytes)?;
        Ok(())
    }

    /// Encodes `sample` and decodes the bytes back into a fresh value.
    ///
    /// # Errors
    ///
    /// Returns the first encode or decode failure.
    pub fn round_trip<T: Serialize + DeserializeOwned>(&self, sample: &T) -> CodecResult<T> {
        let bytes = self.encode(sample)?;
        self.decode(&bytes)
    }

    /// Returns the idle buffer counts as `(encode, decode)`.
    #[must_use]
    pub fn idle_buffers(&self) -> (usize, usize) {
        (self.encode_pool.idle(), self.decode_pool.idle())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Device {
        imei: String,
        slots: Vec<u8>,
        tags: BTreeMap<String, i64>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Shared {
        owner: Arc<String>,
        alias: Arc<String>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other {
        count: u32,
    }

    fn device(n: usize) -> Device {
        let mut tags = BTreeMap::new();
        tags.insert("n".to_string(), n as i64);
        Device {
            imei: format!("imei-{n}"),
            slots: vec![n as u8; n % 7],
            tags,
        }
    }

    #[test]
    fn encode_decode_struct() {
        let codec = Codec::new();
        let value = device(5);
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode::<Device>(&bytes).unwrap(), value);
    }

    #[test]
    fn shared_references_are_serialized_by_value() {
        let codec = Codec::new();
        let owner = Arc::new("hello".to_string());
        let value = Shared {
            owner: Arc::clone(&owner),
            alias: owner,
        };

        let back: Shared = codec.round_trip(&value).unwrap();
        assert_eq!(back, value);
        assert_eq!(*back.alias, "hello");
    }

    #[test]
    fn wrong_shape_is_a_decode_error() {
        let codec = Codec::new();
        let bytes = codec.encode(&device(1)).unwrap();

        let result = codec.decode::<Other>(&bytes);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let codec = Codec::new();
        let result = codec.decode::<Device>(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn decode_into_leaves_target_on_failure() {
        let codec = Codec::new();
        let mut out = device(3);
        assert!(codec.decode_into(&[0xff], &mut out).is_err());
        assert_eq!(out, device(3));

        let bytes = codec.encode(&device(4)).unwrap();
        codec.decode_into(&bytes, &mut out).unwrap();
        assert_eq!(out, device(4));
    }

    #[test]
    fn buffers_return_to_their_pools() {
        let codec = Codec::with_config(&CodecConfig::new().max_idle_buffers(1));
        let bytes = codec.encode(&device(2)).unwrap();
        let _: Device = codec.decode(&bytes).unwrap();
        assert_eq!(codec.idle_buffers(), (1, 1));
    }

    #[test]
    fn concurrent_callers_do_not_mix_bytes() {
        let codec = Arc::new(Codec::with_config(&CodecConfig::new().max_idle_buffers(2)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let codec = Arc::clone(&codec);
                thread::spawn(move || {
                    for i in 0..500 {
                        let value = device(t * 1000 + i);
                        let bytes = codec.encode(&value).unwrap();
                        let back: Device = codec.decode(&bytes).unwrap();
                        assert_eq!(back, value);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
