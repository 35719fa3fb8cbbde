//! Gift-exchange pairing engine.
//!
//! Draws a secret giver→receiver assignment for a group's roster, keeps at
//! most one active draw per group, and answers "who do I give to?" without
//! revealing who gives to you.
//!
//! Collaborators are injected as trait objects:
//! - [`PairingRunStore`](pairing_storage::PairingRunStore) for runs and edges
//! - [`GroupDirectory`] for ownership and rosters
//! - [`Notifier`] for per-giver notifications
//!
//! [`PairingLifecycleManager`] is the entry point.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod directory;
mod error;
pub mod generator;
mod lifecycle;
pub mod notify;
pub mod queue;
pub mod telemetry;
pub mod visibility;

pub use config::{ConfigError, NotifierConfig, PairingConfig, TracingConfig};
pub use directory::{DirectoryError, GroupDirectory, InMemoryGroupDirectory};
pub use error::{PairingError, PairingResult};
pub use generator::{
    generate_assignment, generate_assignment_with_rng, Draw, GenerateError, MIN_PARTICIPANTS,
};
pub use lifecycle::{CreatedRun, PairingLifecycleManager, RetireOutcome};
pub use notify::{
    NotificationReport, Notifier, NotifyError, PairingEvent, PairingEventKind, RecordingNotifier,
    TracingNotifier,
};
pub use queue::{DeliveryStats, QueuedNotifier};
pub use telemetry::init_tracing;
pub use visibility::{Assignment, ParticipantRef, PairingView, Visibility};
