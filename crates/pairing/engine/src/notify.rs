//! Notification events and the notifier seam.
//!
//! Delivery is fire-and-forget from the engine's point of view: a failed
//! notification is logged and counted, never surfaced as an operation
//! failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairing_types::{EventId, GroupId, Participant, RunId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingEventKind {
    Created,
    Retired,
}

/// Addressed to one giver. `receiver` is set only for `Created` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingEvent {
    pub event_id: EventId,
    pub kind: PairingEventKind,
    pub group_id: GroupId,
    pub run_id: RunId,
    pub giver: Participant,
    pub receiver: Option<Participant>,
    pub occurred_at: DateTime<Utc>,
}

impl PairingEvent {
    pub fn created(
        group_id: GroupId,
        run_id: RunId,
        giver: Participant,
        receiver: Participant,
    ) -> Self {
        Self {
            event_id: EventId::generate(),
            kind: PairingEventKind::Created,
            group_id,
            run_id,
            giver,
            receiver: Some(receiver),
            occurred_at: Utc::now(),
        }
    }

    pub fn retired(group_id: GroupId, run_id: RunId, giver: Participant) -> Self {
        Self {
            event_id: EventId::generate(),
            kind: PairingEventKind::Retired,
            group_id,
            run_id,
            giver,
            receiver: None,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    QueueClosed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Accepts pairing events for delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: PairingEvent) -> Result<(), NotifyError>;
}

/// Outcome of the notifications sent for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Givers with no roster entry to address.
    pub skipped: usize,
}

/// Notifier that only writes a log line per event. Log lines never name the
/// receiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: PairingEvent) -> Result<(), NotifyError> {
        info!(
            event = %event.event_id,
            kind = ?event.kind,
            group = %event.group_id,
            run = %event.run_id,
            giver = %event.giver.id,
            "pairing notification"
        );
        Ok(())
    }
}

/// Notifier that keeps delivered events in memory, with failure injection.
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<PairingEvent>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` deliveries, then recover.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_always.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PairingEvent> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: PairingEvent) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("transport down".to_string()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(NotifyError::Delivery("transient failure".to_string()));
        }

        self.delivered
            .lock()
            .map_err(|_| NotifyError::Delivery("recording lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
