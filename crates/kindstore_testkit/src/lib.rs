//! # KindStore Testkit
//!
//! Test utilities for KindStore.
//!
//! This crate provides:
//! - Sample record types covering plain and shared-reference fields
//! - Temporary database fixtures
//! - Property-based generators for put/del sequences
//! - A harness that checks a database against an in-memory model
//! - Concurrent stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use kindstore_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     db.put("acc-1", &Account::new("alice", 100)).unwrap();
//!     assert!(db.get::<Account>("acc-1").unwrap().is_some());
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod records;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::records::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use records::*;
pub use stress::*;
