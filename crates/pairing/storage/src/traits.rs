use crate::model::StoredRun;
use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairing_types::{GroupId, PairingEdge, PairingRun, RunId};

/// Generic query window for paged reads. A zero limit means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Durable, versioned record of pairing runs per group.
///
/// Each method runs as a single serializable transaction. Implementations
/// must guarantee that no caller ever observes a run without its edges, or
/// two active runs for the same group.
#[async_trait]
pub trait PairingRunStore: Send + Sync {
    /// Insert an active run and its edges atomically.
    ///
    /// Fails with [`StorageError::Conflict`](crate::StorageError::Conflict)
    /// if the group already has an active run, and with
    /// [`StorageError::InvariantViolation`](crate::StorageError::InvariantViolation)
    /// if the run is not active or the edges are not a valid assignment.
    /// Nothing is written on failure.
    async fn insert_active_run(&self, run: PairingRun, edges: Vec<PairingEdge>)
        -> StorageResult<()>;

    /// Retire the group's active run, returning it in its retired form.
    ///
    /// Returns `None` without writing anything when no run is active.
    async fn retire_active_run(
        &self,
        group_id: &GroupId,
        retired_at: DateTime<Utc>,
    ) -> StorageResult<Option<PairingRun>>;

    /// The group's active run with its edges, if any.
    async fn active_run(&self, group_id: &GroupId) -> StorageResult<Option<StoredRun>>;

    /// Get one run by id regardless of status.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<PairingRun>>;

    /// Edges of a run in emission order. Empty if the run is unknown.
    async fn list_edges(&self, run_id: &RunId) -> StorageResult<Vec<PairingEdge>>;

    /// All runs of a group, newest first.
    async fn list_runs(
        &self,
        group_id: &GroupId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PairingRun>>;
}
