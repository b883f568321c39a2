//! # KindStore Codec
//!
//! The binary codec shared by every store of a KindStore database.
//!
//! Records are serialized with `serde` into CBOR (`ciborium`). A single
//! [`Codec`] instance is shared by all callers of a database; each call checks
//! a scratch buffer out of a per-direction [`BufferPool`] and returns it when
//! done, so concurrent encodes and decodes never touch each other's bytes and
//! steady-state traffic does not allocate scratch space.
//!
//! Shared references (`Arc<T>`, `Rc<T>`) are serialized by value: a record
//! whose fields alias one allocation decodes into equal, separately owned
//! values.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod pool;

pub use codec::{Codec, CodecConfig};
pub use error::{CodecError, CodecResult};
pub use pool::{BufferPool, PooledBuffer};
