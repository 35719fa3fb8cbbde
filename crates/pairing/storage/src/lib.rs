//! Pairing run storage.
//!
//! This crate defines the persistence boundary of the pairing engine:
//! - pairing runs, one row per generation, soft-deleted by retirement
//! - the immutable giver→receiver edges written together with their run
//!
//! Design stance:
//! - every trait method is one all-or-nothing transaction
//! - a group has at most one active run; adapters enforce this themselves
//!   rather than trusting the caller's pre-check
//! - edge sets are validated before anything is written

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::StoredRun;
pub use traits::{PairingRunStore, QueryWindow};
