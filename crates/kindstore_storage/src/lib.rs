//! # KindStore Storage
//!
//! Byte-level backends underneath every KindStore store log.
//!
//! A backend is an opaque, append-only byte sink with random reads. It knows
//! nothing about records, keys or kinds; `kindstore_engine` owns the record
//! framing written on top of it.
//!
//! - [`FileBackend`] persists to a single OS file.
//! - [`InMemoryBackend`] keeps bytes in memory, for tests and scratch stores.
//!
//! ```rust
//! use kindstore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
