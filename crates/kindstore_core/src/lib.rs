//! # KindStore Core
//!
//! Typed record storage with one store per record kind.
//!
//! This crate provides:
//! - [`Record`] and [`RecordKind`] for declaring storable types
//! - [`TypeRegistry`] for the kinds a database serves
//! - [`Db`], which routes get/put/del to the kind's store through a shared
//!   pooled codec
//! - [`Db::backup`], which compacts every store by swapping in a snapshot of
//!   the live entries

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;
mod config;
mod database;
mod dir;
mod error;
mod kind;
mod registry;
mod router;

pub use compaction::{CompactionReport, KindReport};
pub use config::Config;
pub use database::{Db, DbState, KindStats};
pub use error::{CompactionError, CoreError, CoreResult, InitializationError};
pub use kind::{Record, RecordKind, MAX_KIND_LEN};
pub use registry::{KindEntry, TypeRegistry};

pub use kindstore_codec::CodecConfig;
pub use kindstore_engine::{StoreConfig, StoreStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
