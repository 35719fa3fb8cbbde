//! Shared types for the gift-exchange pairing engine.
//!
//! A group draws one pairing run at a time. Each run owns an immutable set of
//! giver→receiver edges; runs are never deleted, only retired.
//!
//! This crate carries no I/O. Storage adapters and the lifecycle manager both
//! depend on the validation helpers here so the edge invariants are checked
//! the same way before anything is written.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod ids;
mod model;
mod validation;

pub use ids::{EventId, GroupId, ParticipantId, RunId};
pub use model::{Participant, PairingEdge, PairingRun, RunStatus};
pub use validation::{cycle_lengths, validate_edge_set, EdgeSetViolation};
