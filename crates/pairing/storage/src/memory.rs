//! In-memory reference implementation of [`PairingRunStore`].
//!
//! All tables sit behind one lock, so every method observes and mutates a
//! consistent snapshot; that lock is what makes each call a transaction.
//! Production deployments should use the PostgreSQL adapter.

use crate::model::StoredRun;
use crate::traits::{PairingRunStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairing_types::{validate_edge_set, GroupId, PairingEdge, PairingRun, RunId, RunStatus};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    runs: HashMap<RunId, PairingRun>,
    edges: HashMap<RunId, Vec<PairingEdge>>,
    active_by_group: HashMap<GroupId, RunId>,
}

/// In-memory pairing run store.
#[derive(Default)]
pub struct InMemoryPairingStore {
    tables: RwLock<Tables>,
}

impl InMemoryPairingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of runs ever stored, across all groups.
    pub fn run_count(&self) -> StorageResult<usize> {
        Ok(self.read()?.runs.len())
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("pairing tables lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("pairing tables lock poisoned".to_string()))
    }
}

#[async_trait]
impl PairingRunStore for InMemoryPairingStore {
    async fn insert_active_run(
        &self,
        run: PairingRun,
        mut edges: Vec<PairingEdge>,
    ) -> StorageResult<()> {
        if run.status != RunStatus::Active {
            return Err(StorageError::InvariantViolation(format!(
                "run {} must be inserted as active, found {}",
                run.id, run.status
            )));
        }
        validate_edge_set(&run.id, &edges)?;

        let mut guard = self.write()?;
        if let Some(existing) = guard.active_by_group.get(&run.group_id) {
            debug!(group = %run.group_id, active = %existing, "rejecting second active run");
            return Err(StorageError::Conflict(format!(
                "group {} already has active run {}",
                run.group_id, existing
            )));
        }
        if guard.runs.contains_key(&run.id) {
            return Err(StorageError::Conflict(format!("run {} already exists", run.id)));
        }

        edges.sort_by_key(|edge| edge.position);
        guard.active_by_group.insert(run.group_id.clone(), run.id);
        guard.edges.insert(run.id, edges);
        guard.runs.insert(run.id, run);
        Ok(())
    }

    async fn retire_active_run(
        &self,
        group_id: &GroupId,
        retired_at: DateTime<Utc>,
    ) -> StorageResult<Option<PairingRun>> {
        let mut guard = self.write()?;
        let Some(run_id) = guard.active_by_group.get(group_id).copied() else {
            return Ok(None);
        };

        let run = guard.runs.get_mut(&run_id).ok_or_else(|| {
            StorageError::InvariantViolation(format!(
                "active index points at missing run {run_id}"
            ))
        })?;
        run.status = RunStatus::Retired;
        run.retired_at = Some(retired_at);
        let retired = run.clone();
        guard.active_by_group.remove(group_id);
        Ok(Some(retired))
    }

    async fn active_run(&self, group_id: &GroupId) -> StorageResult<Option<StoredRun>> {
        let guard = self.read()?;
        let Some(run_id) = guard.active_by_group.get(group_id) else {
            return Ok(None);
        };
        let run = guard.runs.get(run_id).cloned().ok_or_else(|| {
            StorageError::InvariantViolation(format!(
                "active index points at missing run {run_id}"
            ))
        })?;
        let edges = guard.edges.get(run_id).cloned().unwrap_or_default();
        Ok(Some(StoredRun { run, edges }))
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<PairingRun>> {
        Ok(self.read()?.runs.get(run_id).cloned())
    }

    async fn list_edges(&self, run_id: &RunId) -> StorageResult<Vec<PairingEdge>> {
        Ok(self.read()?.edges.get(run_id).cloned().unwrap_or_default())
    }

    async fn list_runs(
        &self,
        group_id: &GroupId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PairingRun>> {
        let guard = self.read()?;
        let mut values = guard
            .runs
            .values()
            .filter(|run| run.group_id == *group_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(apply_window(values, window))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
