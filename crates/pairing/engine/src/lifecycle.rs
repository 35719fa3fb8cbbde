//! Pairing lifecycle manager.
//!
//! Per group the lifecycle is `NoActiveRun → Active → NoActiveRun → …`. The
//! manager is the only writer of runs and edges. Linearizability of
//! concurrent `create_run` calls comes from the store's atomic insert: the
//! pre-check here only produces a cheaper early failure.

use crate::config::PairingConfig;
use crate::directory::{DirectoryError, GroupDirectory};
use crate::error::{PairingError, PairingResult};
use crate::generator::generate_assignment;
use crate::notify::{NotificationReport, Notifier, PairingEvent};
use crate::visibility::{resolve, PairingView, Visibility};
use chrono::Utc;
use pairing_storage::{PairingRunStore, QueryWindow, StorageError, StorageResult};
use pairing_types::{GroupId, Participant, ParticipantId, PairingEdge, PairingRun};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of a successful `create_run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRun {
    pub run: PairingRun,
    pub edges: Vec<PairingEdge>,
    pub notifications: NotificationReport,
}

/// Result of a successful `retire_run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetireOutcome {
    Retired {
        run: PairingRun,
        notifications: NotificationReport,
    },
    /// Nothing to retire; no state was changed.
    NoActiveRun,
}

/// Orchestrates generation, retirement, and viewing of pairing runs.
pub struct PairingLifecycleManager {
    store: Arc<dyn PairingRunStore>,
    directory: Arc<dyn GroupDirectory>,
    notifier: Arc<dyn Notifier>,
    config: PairingConfig,
}

impl PairingLifecycleManager {
    pub fn new(
        store: Arc<dyn PairingRunStore>,
        directory: Arc<dyn GroupDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            config: PairingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PairingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Draw a new assignment for `group_id`. Owner only.
    ///
    /// Either the run and all of its edges are committed, or nothing is.
    /// Notifications are sent after the commit and cannot fail the call.
    #[instrument(skip_all, fields(group = %group_id, requester = %requester_id))]
    pub async fn create_run(
        &self,
        group_id: &GroupId,
        requester_id: &ParticipantId,
    ) -> PairingResult<CreatedRun> {
        self.require_owner(group_id, requester_id).await?;

        if let Some(existing) = self.store_call(group_id, self.store.active_run(group_id)).await? {
            debug!(run = %existing.run.id, "active run already present");
            return Err(PairingError::ActiveRunExists(group_id.clone()));
        }

        let roster = self
            .directory_call(self.directory.list_participants(group_id))
            .await?;
        let ids: Vec<ParticipantId> = roster.iter().map(|p| p.id.clone()).collect();
        let draws = generate_assignment(&ids)?;

        let run = PairingRun::new_active(group_id.clone(), Utc::now());
        let edges = draws
            .into_iter()
            .enumerate()
            .map(|(index, draw)| {
                Ok(PairingEdge {
                    run_id: run.id,
                    giver_id: draw.giver,
                    receiver_id: draw.receiver,
                    position: edge_position(index)?,
                })
            })
            .collect::<PairingResult<Vec<_>>>()?;

        let inserted = self
            .store_call(
                group_id,
                self.store.insert_active_run(run.clone(), edges.clone()),
            )
            .await;
        if let Err(err) = inserted {
            // A timed-out or dropped commit may still have landed.
            let ambiguous = matches!(err, PairingError::PersistenceFailure(_));
            if !ambiguous || !self.is_stored(&run).await {
                return Err(err);
            }
            warn!(run = %run.id, error = %err, "insert reported failure but the run is stored");
        }
        info!(run = %run.id, participants = edges.len(), "pairing run created");

        let notifications = self.notify_created(&run, &edges, &roster).await;
        Ok(CreatedRun {
            run,
            edges,
            notifications,
        })
    }

    /// Retire the group's active run. Owner only; idempotent.
    #[instrument(skip_all, fields(group = %group_id, requester = %requester_id))]
    pub async fn retire_run(
        &self,
        group_id: &GroupId,
        requester_id: &ParticipantId,
    ) -> PairingResult<RetireOutcome> {
        self.require_owner(group_id, requester_id).await?;

        let retired = self
            .store_call(
                group_id,
                self.store.retire_active_run(group_id, Utc::now()),
            )
            .await?;
        let Some(run) = retired else {
            debug!("no active run to retire");
            return Ok(RetireOutcome::NoActiveRun);
        };
        info!(run = %run.id, "pairing run retired");

        let notifications = if self.config.notify_on_retire {
            self.notify_retired(&run).await
        } else {
            NotificationReport::default()
        };
        Ok(RetireOutcome::Retired { run, notifications })
    }

    /// The active assignment as visible to `requester_id`.
    ///
    /// A group without an active run yields `Visibility::NotGenerated`.
    #[instrument(skip_all, fields(group = %group_id, requester = %requester_id))]
    pub async fn get_view(
        &self,
        group_id: &GroupId,
        requester_id: &ParticipantId,
    ) -> PairingResult<PairingView> {
        let owner = self.owner_of(group_id).await?;
        let is_owner = owner == *requester_id;

        let active = self
            .store_call(group_id, self.store.active_run(group_id))
            .await?;
        let Some(stored) = active else {
            return Ok(PairingView {
                group_id: group_id.clone(),
                requester_id: requester_id.clone(),
                is_owner,
                run: None,
                visibility: Visibility::NotGenerated,
            });
        };

        // Names are cosmetic; an unavailable roster degrades to bare ids.
        let roster = match self
            .directory_call(self.directory.list_participants(group_id))
            .await
        {
            Ok(roster) => roster,
            Err(err) => {
                warn!(error = %err, "roster unavailable, view falls back to ids");
                Vec::new()
            }
        };

        let visibility = resolve(&stored.edges, &roster, requester_id, is_owner);
        Ok(PairingView {
            group_id: group_id.clone(),
            requester_id: requester_id.clone(),
            is_owner,
            run: Some(stored.run),
            visibility,
        })
    }

    /// Every run of the group, newest first. Owner only.
    #[instrument(skip_all, fields(group = %group_id, requester = %requester_id))]
    pub async fn run_history(
        &self,
        group_id: &GroupId,
        requester_id: &ParticipantId,
        window: QueryWindow,
    ) -> PairingResult<Vec<PairingRun>> {
        self.require_owner(group_id, requester_id).await?;
        self.store_call(group_id, self.store.list_runs(group_id, window))
            .await
    }

    async fn is_stored(&self, run: &PairingRun) -> bool {
        match self
            .store_call(&run.group_id, self.store.get_run(&run.id))
            .await
        {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(run = %run.id, error = %err, "cannot confirm whether the run was stored");
                false
            }
        }
    }

    async fn owner_of(&self, group_id: &GroupId) -> PairingResult<ParticipantId> {
        self.directory_call(self.directory.group_owner(group_id))
            .await?
            .ok_or_else(|| PairingError::GroupNotFound(group_id.clone()))
    }

    async fn require_owner(
        &self,
        group_id: &GroupId,
        requester_id: &ParticipantId,
    ) -> PairingResult<()> {
        let owner = self.owner_of(group_id).await?;
        if owner != *requester_id {
            warn!("rejected non-owner request");
            return Err(PairingError::NotOwner {
                group: group_id.clone(),
                requester: requester_id.clone(),
            });
        }
        Ok(())
    }

    async fn store_call<T>(
        &self,
        group_id: &GroupId,
        call: impl Future<Output = StorageResult<T>>,
    ) -> PairingResult<T> {
        match tokio::time::timeout(self.config.operation_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StorageError::Conflict(reason))) => {
                debug!(%reason, "store rejected second active run");
                Err(PairingError::ActiveRunExists(group_id.clone()))
            }
            Ok(Err(err)) => {
                warn!(error = %err, "pairing store call failed");
                Err(PairingError::PersistenceFailure(err.to_string()))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.operation_timeout_ms,
                    "pairing store call timed out"
                );
                Err(PairingError::PersistenceFailure(format!(
                    "store call timed out after {}ms",
                    self.config.operation_timeout_ms
                )))
            }
        }
    }

    async fn directory_call<T>(
        &self,
        call: impl Future<Output = Result<T, DirectoryError>>,
    ) -> PairingResult<T> {
        match tokio::time::timeout(self.config.operation_timeout(), call).await {
            Ok(result) => result.map_err(|err| PairingError::DirectoryFailure(err.to_string())),
            Err(_) => Err(PairingError::DirectoryFailure(format!(
                "directory call timed out after {}ms",
                self.config.operation_timeout_ms
            ))),
        }
    }

    async fn notify_created(
        &self,
        run: &PairingRun,
        edges: &[PairingEdge],
        roster: &[Participant],
    ) -> NotificationReport {
        let by_id: HashMap<&ParticipantId, &Participant> =
            roster.iter().map(|p| (&p.id, p)).collect();
        let mut report = NotificationReport::default();

        for edge in edges {
            let (Some(giver), Some(receiver)) =
                (by_id.get(&edge.giver_id), by_id.get(&edge.receiver_id))
            else {
                report.skipped += 1;
                continue;
            };
            let event = PairingEvent::created(
                run.group_id.clone(),
                run.id,
                (*giver).clone(),
                (*receiver).clone(),
            );
            self.send(event, &mut report).await;
        }

        log_report(run, &report);
        report
    }

    async fn notify_retired(&self, run: &PairingRun) -> NotificationReport {
        let mut report = NotificationReport::default();

        let edges = match self
            .store_call(&run.group_id, self.store.list_edges(&run.id))
            .await
        {
            Ok(edges) => edges,
            Err(err) => {
                warn!(run = %run.id, error = %err, "cannot load edges for retire notifications");
                return report;
            }
        };
        let roster = match self
            .directory_call(self.directory.list_participants(&run.group_id))
            .await
        {
            Ok(roster) => roster,
            Err(err) => {
                warn!(run = %run.id, error = %err, "cannot load roster for retire notifications");
                return report;
            }
        };

        for edge in &edges {
            let Some(giver) = roster.iter().find(|p| p.id == edge.giver_id) else {
                report.skipped += 1;
                continue;
            };
            let event = PairingEvent::retired(run.group_id.clone(), run.id, giver.clone());
            self.send(event, &mut report).await;
        }

        log_report(run, &report);
        report
    }

    async fn send(&self, event: PairingEvent, report: &mut NotificationReport) {
        report.attempted += 1;
        let giver = event.giver.id.clone();
        match tokio::time::timeout(self.config.operation_timeout(), self.notifier.notify(event))
            .await
        {
            Ok(Ok(())) => report.delivered += 1,
            Ok(Err(err)) => {
                warn!(giver = %giver, error = %err, "pairing notification failed");
                report.failed += 1;
            }
            Err(_) => {
                warn!(giver = %giver, "pairing notification timed out");
                report.failed += 1;
            }
        }
    }
}

fn edge_position(index: usize) -> PairingResult<u32> {
    u32::try_from(index).map_err(|_| {
        PairingError::InvalidRoster(format!("roster exceeds {} participants", u32::MAX))
    })
}

fn log_report(run: &PairingRun, report: &NotificationReport) {
    if report.failed > 0 || report.skipped > 0 {
        warn!(
            run = %run.id,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "some pairing notifications were not sent"
        );
    } else {
        debug!(run = %run.id, delivered = report.delivered, "pairing notifications sent");
    }
}
