//! Queued notifier: accepts events immediately and delivers them from a
//! background task, retrying failed deliveries.
//!
//! Delivery is at-least-once per event up to `max_attempts`; events that
//! exhaust their attempts are dropped with an error log. Transports can use
//! `PairingEvent::event_id` to discard duplicates.

use crate::config::NotifierConfig;
use crate::notify::{Notifier, NotifyError, PairingEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Counters reported by the delivery worker when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub retries: u64,
    pub dead_lettered: u64,
}

/// Notifier front-end backed by a bounded queue and a delivery worker.
pub struct QueuedNotifier {
    sender: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<DeliveryStats>>>,
}

impl QueuedNotifier {
    /// Spawn the delivery worker on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn Notifier>, config: &NotifierConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(
            receiver,
            transport,
            config.max_attempts.max(1),
            config.retry_backoff(),
        ));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Stop accepting events, drain the queue, and wait for the worker.
    ///
    /// Calling it again returns empty stats.
    pub async fn shutdown(&self) -> DeliveryStats {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handle = self.worker.lock().await.take();
        match handle {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                warn!(error = %err, "notification worker ended abnormally");
                DeliveryStats::default()
            }),
            None => DeliveryStats::default(),
        }
    }
}

#[async_trait]
impl Notifier for QueuedNotifier {
    async fn notify(&self, event: PairingEvent) -> Result<(), NotifyError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| NotifyError::QueueClosed)?
            .clone()
            .ok_or(NotifyError::QueueClosed)?;
        sender.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
        })
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<PairingEvent>,
    transport: Arc<dyn Notifier>,
    max_attempts: u32,
    backoff: Duration,
) -> DeliveryStats {
    let mut stats = DeliveryStats::default();
    while let Some(event) = receiver.recv().await {
        deliver(&*transport, event, max_attempts, backoff, &mut stats).await;
    }
    debug!(
        delivered = stats.delivered,
        dead_lettered = stats.dead_lettered,
        "notification worker drained"
    );
    stats
}

async fn deliver(
    transport: &dyn Notifier,
    event: PairingEvent,
    max_attempts: u32,
    backoff: Duration,
    stats: &mut DeliveryStats,
) {
    for attempt in 1..=max_attempts {
        match transport.notify(event.clone()).await {
            Ok(()) => {
                stats.delivered += 1;
                return;
            }
            Err(err) if attempt < max_attempts => {
                warn!(
                    event = %event.event_id,
                    attempt,
                    error = %err,
                    "notification delivery failed, retrying"
                );
                stats.retries += 1;
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                error!(
                    event = %event.event_id,
                    group = %event.group_id,
                    giver = %event.giver.id,
                    attempts = max_attempts,
                    error = %err,
                    "notification dropped after exhausting retries"
                );
                stats.dead_lettered += 1;
            }
        }
    }
}
