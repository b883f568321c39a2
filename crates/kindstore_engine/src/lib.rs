//! # KindStore Engine
//!
//! The key-value engine underneath each per-kind store.
//!
//! A [`Store`] is a directory holding one append-only `store.log` of
//! CRC-checked records plus an in-memory index rebuilt on open. Overwrites
//! and deletes leave garbage behind; [`Store::snapshot_to`] rewrites only the
//! live entries into a fresh directory, which is what directory-level
//! compaction swaps in.
//!
//! An [`Engine`] is the registry of stores opened through it. It offers the
//! bulk primitives compaction needs ([`Engine::backup_all`],
//! [`Engine::close_all`]) and runs the background flusher for stores with a
//! sync interval.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod flusher;
mod record;
mod store;

pub use config::StoreConfig;
pub use engine::{snapshot_path, Engine, StoreHandle};
pub use error::{EngineError, EngineResult};
pub use record::{peek_len, LogRecord, HEADER_SIZE, MAX_KEY_LEN, MAX_VALUE_LEN};
pub use store::{SnapshotStats, Store, StoreStats, LOG_FILE};
