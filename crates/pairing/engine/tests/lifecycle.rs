use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pairing_engine::{
    DirectoryError, GroupDirectory, InMemoryGroupDirectory, PairingConfig, PairingError,
    PairingEventKind, PairingLifecycleManager, RecordingNotifier, RetireOutcome, Visibility,
};
use pairing_storage::memory::InMemoryPairingStore;
use pairing_storage::{PairingRunStore, QueryWindow, StorageError, StorageResult, StoredRun};
use pairing_types::{
    cycle_lengths, validate_edge_set, GroupId, Participant, ParticipantId, PairingEdge, PairingRun,
    RunId, RunStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<InMemoryPairingStore>,
    directory: Arc<InMemoryGroupDirectory>,
    notifier: Arc<RecordingNotifier>,
    manager: PairingLifecycleManager,
}

fn group() -> GroupId {
    GroupId::new("office-2026")
}

fn pid(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

fn directory_with(members: &[(&str, &str)]) -> Arc<InMemoryGroupDirectory> {
    let directory = Arc::new(InMemoryGroupDirectory::new());
    directory.add_group(group(), pid("a")).unwrap();
    for (id, name) in members {
        directory
            .add_participant(
                &group(),
                Participant::new(*id, *name, format!("{id}@example.com")),
            )
            .unwrap();
    }
    directory
}

fn harness_with(members: &[(&str, &str)], config: PairingConfig) -> Harness {
    let store = Arc::new(InMemoryPairingStore::new());
    let directory = directory_with(members);
    let notifier = Arc::new(RecordingNotifier::new());
    let manager =
        PairingLifecycleManager::new(store.clone(), directory.clone(), notifier.clone())
            .with_config(config);
    Harness {
        store,
        directory,
        notifier,
        manager,
    }
}

fn abc() -> Harness {
    harness_with(
        &[("a", "Alice"), ("b", "Bob"), ("c", "Carol")],
        PairingConfig::default(),
    )
}

#[tokio::test]
async fn owner_draws_a_valid_assignment_and_sees_all_of_it() {
    let h = abc();

    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(created.run.status, RunStatus::Active);
    assert_eq!(created.edges.len(), 3);
    validate_edge_set(&created.run.id, &created.edges).unwrap();
    assert_eq!(cycle_lengths(&created.edges), Some(vec![3]));

    let view = h.manager.get_view(&group(), &pid("a")).await.unwrap();
    assert!(view.is_owner);
    assert_eq!(view.run.as_ref().map(|r| r.id), Some(created.run.id));
    let Visibility::Full(all) = &view.visibility else {
        panic!("owner should see every assignment");
    };
    let givers: Vec<_> = all
        .iter()
        .map(|a| a.giver.display_name.clone().unwrap())
        .collect();
    assert_eq!(givers, vec!["Alice", "Bob", "Carol"]);
}

#[tokio::test]
async fn participant_sees_only_their_own_assignment() {
    let h = abc();
    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();

    let view = h.manager.get_view(&group(), &pid("b")).await.unwrap();
    assert!(!view.is_owner);
    let Visibility::Own(Some(own)) = view.visibility else {
        panic!("b is a giver in this run");
    };
    assert_eq!(own.giver.id, pid("b"));

    let expected = created
        .edges
        .iter()
        .find(|edge| edge.giver_id == pid("b"))
        .unwrap();
    assert_eq!(own.receiver.id, expected.receiver_id);
}

#[tokio::test]
async fn view_before_any_draw_is_not_generated() {
    let h = abc();
    let view = h.manager.get_view(&group(), &pid("b")).await.unwrap();
    assert!(view.run.is_none());
    assert_eq!(view.visibility, Visibility::NotGenerated);
}

#[tokio::test]
async fn single_participant_cannot_draw_and_nothing_is_stored() {
    let h = harness_with(&[("a", "Alice")], PairingConfig::default());

    let err = h.manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert_eq!(
        err,
        PairingError::InsufficientParticipants {
            found: 1,
            required: 2
        }
    );
    assert_eq!(h.store.run_count().unwrap(), 0);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn second_draw_requires_retiring_the_first() {
    let h = abc();
    let first = h.manager.create_run(&group(), &pid("a")).await.unwrap();

    let err = h.manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert_eq!(err, PairingError::ActiveRunExists(group()));

    let outcome = h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    let RetireOutcome::Retired { run, .. } = outcome else {
        panic!("active run should have been retired");
    };
    assert_eq!(run.id, first.run.id);
    assert_eq!(run.status, RunStatus::Retired);
    assert!(run.retired_at.is_some());

    let second = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_ne!(second.run.id, first.run.id);

    let history = h
        .manager
        .run_history(&group(), &pid("a"), QueryWindow::all())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.run.id);
    assert_eq!(history[1].id, first.run.id);
    assert_eq!(history[1].status, RunStatus::Retired);

    // Retired edges are kept as history.
    let old_edges = h.store.list_edges(&first.run.id).await.unwrap();
    assert_eq!(old_edges, first.edges);
}

#[tokio::test]
async fn retiring_with_nothing_active_is_a_no_op() {
    let h = abc();
    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    let before = h.store.get_run(&created.run.id).await.unwrap().unwrap();

    let outcome = h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(outcome, RetireOutcome::NoActiveRun);
    assert_eq!(h.store.run_count().unwrap(), 1);

    let after = h.store.get_run(&created.run.id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.status, RunStatus::Retired);
    assert_eq!(after.retired_at, before.retired_at);
}

#[tokio::test]
async fn only_the_owner_may_draw_retire_or_read_history() {
    let h = abc();

    let err = h.manager.create_run(&group(), &pid("b")).await.unwrap_err();
    assert!(matches!(err, PairingError::NotOwner { .. }));
    assert_eq!(h.store.run_count().unwrap(), 0);

    h.manager.create_run(&group(), &pid("a")).await.unwrap();
    let err = h.manager.retire_run(&group(), &pid("c")).await.unwrap_err();
    assert!(matches!(err, PairingError::NotOwner { .. }));
    assert!(h.store.active_run(&group()).await.unwrap().is_some());

    let err = h
        .manager
        .run_history(&group(), &pid("b"), QueryWindow::all())
        .await
        .unwrap_err();
    assert!(matches!(err, PairingError::NotOwner { .. }));
}

#[tokio::test]
async fn unknown_group_is_reported_before_anything_else() {
    let h = abc();
    let missing = GroupId::new("nope");

    for result in [
        h.manager.create_run(&missing, &pid("a")).await.map(|_| ()),
        h.manager.retire_run(&missing, &pid("a")).await.map(|_| ()),
        h.manager.get_view(&missing, &pid("a")).await.map(|_| ()),
    ] {
        assert_eq!(result.unwrap_err(), PairingError::GroupNotFound(missing.clone()));
    }
}

#[tokio::test]
async fn non_owner_hears_not_owner_even_when_a_run_is_active() {
    let h = abc();
    h.manager.create_run(&group(), &pid("a")).await.unwrap();

    let err = h.manager.create_run(&group(), &pid("b")).await.unwrap_err();
    assert!(matches!(err, PairingError::NotOwner { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_draws_produce_exactly_one_active_run() {
    let h = abc();
    let manager = Arc::new(h.manager);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.create_run(&group(), &pid("a")).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert_eq!(err, PairingError::ActiveRunExists(group())),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.store.run_count().unwrap(), 1);
}

#[tokio::test]
async fn each_giver_is_notified_once_on_creation() {
    let h = abc();
    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();

    assert_eq!(created.notifications.attempted, 3);
    assert_eq!(created.notifications.delivered, 3);

    let events = h.notifier.events();
    let givers: HashSet<_> = events.iter().map(|e| e.giver.id.clone()).collect();
    assert_eq!(givers.len(), 3);
    for event in &events {
        assert_eq!(event.kind, PairingEventKind::Created);
        assert_eq!(event.run_id, created.run.id);
        let edge = created
            .edges
            .iter()
            .find(|edge| edge.giver_id == event.giver.id)
            .unwrap();
        assert_eq!(
            event.receiver.as_ref().map(|r| r.id.clone()),
            Some(edge.receiver_id.clone())
        );
    }
}

#[tokio::test]
async fn notification_failures_do_not_undo_the_draw() {
    let h = abc();
    h.notifier.set_failing(true);

    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(created.notifications.failed, 3);
    assert_eq!(created.notifications.delivered, 0);
    assert!(h.store.active_run(&group()).await.unwrap().is_some());
}

#[tokio::test]
async fn retirement_notifies_the_givers_of_the_retired_run() {
    let h = abc();
    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    h.directory.remove_participant(&group(), &pid("c")).unwrap();

    let outcome = h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    let RetireOutcome::Retired { notifications, .. } = outcome else {
        panic!("run should be retired");
    };
    assert_eq!(notifications.delivered, 2);
    assert_eq!(notifications.skipped, 1);

    let retired: Vec<_> = h
        .notifier
        .events()
        .into_iter()
        .filter(|e| e.kind == PairingEventKind::Retired)
        .collect();
    assert_eq!(retired.len(), 2);
    assert!(retired.iter().all(|e| e.run_id == created.run.id));
    assert!(retired.iter().all(|e| e.receiver.is_none()));
}

#[tokio::test]
async fn retirement_notifications_can_be_switched_off() {
    let config = PairingConfig {
        notify_on_retire: false,
        ..PairingConfig::default()
    };
    let h = harness_with(&[("a", "Alice"), ("b", "Bob")], config);
    h.manager.create_run(&group(), &pid("a")).await.unwrap();
    let before = h.notifier.events().len();

    h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(h.notifier.events().len(), before);
}

#[tokio::test]
async fn directory_outage_fails_retryably() {
    let h = abc();
    h.directory.set_offline(true);

    let err = h.manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert!(matches!(err, PairingError::DirectoryFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(h.store.run_count().unwrap(), 0);
}

#[tokio::test]
async fn late_joiner_has_no_assignment_until_the_next_draw() {
    let h = abc();
    h.manager.create_run(&group(), &pid("a")).await.unwrap();
    h.directory
        .add_participant(&group(), Participant::new("d", "Dan", "d@example.com"))
        .unwrap();

    let view = h.manager.get_view(&group(), &pid("d")).await.unwrap();
    assert_eq!(view.visibility, Visibility::Own(None));

    h.manager.retire_run(&group(), &pid("a")).await.unwrap();
    let created = h.manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(created.edges.len(), 4);
    let view = h.manager.get_view(&group(), &pid("d")).await.unwrap();
    assert!(matches!(view.visibility, Visibility::Own(Some(_))));
}

/// Directory whose roster lookups can fail while ownership lookups work.
struct RosterOutageDirectory {
    inner: Arc<InMemoryGroupDirectory>,
    roster_down: AtomicBool,
}

#[async_trait]
impl GroupDirectory for RosterOutageDirectory {
    async fn group_owner(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<ParticipantId>, DirectoryError> {
        self.inner.group_owner(group_id).await
    }

    async fn list_participants(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<Participant>, DirectoryError> {
        if self.roster_down.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("roster service down".to_string()));
        }
        self.inner.list_participants(group_id).await
    }
}

#[tokio::test]
async fn view_falls_back_to_ids_when_roster_is_unavailable() {
    let directory = Arc::new(RosterOutageDirectory {
        inner: directory_with(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]),
        roster_down: AtomicBool::new(false),
    });
    let manager = PairingLifecycleManager::new(
        Arc::new(InMemoryPairingStore::new()),
        directory.clone(),
        Arc::new(RecordingNotifier::new()),
    );
    let created = manager.create_run(&group(), &pid("a")).await.unwrap();
    directory.roster_down.store(true, Ordering::SeqCst);

    let view = manager.get_view(&group(), &pid("b")).await.unwrap();
    let Visibility::Own(Some(own)) = view.visibility else {
        panic!("b gives in the active run");
    };
    let expected = created
        .edges
        .iter()
        .find(|edge| edge.giver_id == pid("b"))
        .unwrap();
    assert_eq!(own.giver.id, pid("b"));
    assert_eq!(own.receiver.id, expected.receiver_id);
    assert!(own.giver.display_name.is_none());
    assert!(own.receiver.display_name.is_none());

    let owner_view = manager.get_view(&group(), &pid("a")).await.unwrap();
    assert_eq!(owner_view.visibility.assignments().len(), 3);
    assert!(owner_view
        .visibility
        .assignments()
        .iter()
        .all(|a| a.giver.display_name.is_none()));

    let err = manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert_eq!(err, PairingError::ActiveRunExists(group()));
}

/// Store wrapper that can stall, fail, or acknowledge inserts late.
struct FaultyStore {
    inner: InMemoryPairingStore,
    insert_delay: Option<Duration>,
    ack_delay: Option<Duration>,
    fail_next_insert: AtomicBool,
}

impl FaultyStore {
    fn new(insert_delay: Option<Duration>) -> Self {
        Self {
            inner: InMemoryPairingStore::new(),
            insert_delay,
            ack_delay: None,
            fail_next_insert: AtomicBool::new(false),
        }
    }

    /// Commits immediately but reports success only after `delay`.
    fn late_ack(delay: Duration) -> Self {
        Self {
            ack_delay: Some(delay),
            ..Self::new(None)
        }
    }
}

#[async_trait]
impl PairingRunStore for FaultyStore {
    async fn insert_active_run(
        &self,
        run: PairingRun,
        edges: Vec<PairingEdge>,
    ) -> StorageResult<()> {
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("connection reset".to_string()));
        }
        self.inner.insert_active_run(run, edges).await?;
        if let Some(delay) = self.ack_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn retire_active_run(
        &self,
        group_id: &GroupId,
        retired_at: DateTime<Utc>,
    ) -> StorageResult<Option<PairingRun>> {
        self.inner.retire_active_run(group_id, retired_at).await
    }

    async fn active_run(&self, group_id: &GroupId) -> StorageResult<Option<StoredRun>> {
        self.inner.active_run(group_id).await
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<Option<PairingRun>> {
        self.inner.get_run(run_id).await
    }

    async fn list_edges(&self, run_id: &RunId) -> StorageResult<Vec<PairingEdge>> {
        self.inner.list_edges(run_id).await
    }

    async fn list_runs(
        &self,
        group_id: &GroupId,
        window: QueryWindow,
    ) -> StorageResult<Vec<PairingRun>> {
        self.inner.list_runs(group_id, window).await
    }
}

fn manager_over(store: Arc<FaultyStore>, config: PairingConfig) -> PairingLifecycleManager {
    let directory = directory_with(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
    PairingLifecycleManager::new(store, directory, Arc::new(RecordingNotifier::new()))
        .with_config(config)
}

#[tokio::test]
async fn stalled_store_times_out_without_leaving_a_run() {
    let store = Arc::new(FaultyStore::new(Some(Duration::from_millis(500))));
    let config = PairingConfig {
        operation_timeout_ms: 50,
        ..PairingConfig::default()
    };
    let manager = manager_over(store.clone(), config);

    let err = manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert!(matches!(err, PairingError::PersistenceFailure(_)));
    assert!(store.active_run(&group()).await.unwrap().is_none());
    assert_eq!(store.inner.run_count().unwrap(), 0);
}

#[tokio::test]
async fn failed_insert_can_be_retried() {
    let store = Arc::new(FaultyStore::new(None));
    store.fail_next_insert.store(true, Ordering::SeqCst);
    let manager = manager_over(store.clone(), PairingConfig::default());

    let err = manager.create_run(&group(), &pid("a")).await.unwrap_err();
    assert!(matches!(err, PairingError::PersistenceFailure(_)));
    assert!(err.is_retryable());
    assert_eq!(store.inner.run_count().unwrap(), 0);

    let created = manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(created.edges.len(), 3);
}

#[tokio::test]
async fn committed_insert_with_late_acknowledgement_still_succeeds() {
    let store = Arc::new(FaultyStore::late_ack(Duration::from_millis(300)));
    let directory = directory_with(&[("a", "Alice"), ("b", "Bob"), ("c", "Carol")]);
    let notifier = Arc::new(RecordingNotifier::new());
    let config = PairingConfig {
        operation_timeout_ms: 50,
        ..PairingConfig::default()
    };
    let manager = PairingLifecycleManager::new(store.clone(), directory, notifier.clone())
        .with_config(config);

    let created = manager.create_run(&group(), &pid("a")).await.unwrap();
    assert_eq!(created.edges.len(), 3);
    assert_eq!(created.notifications.delivered, 3);
    assert_eq!(notifier.events().len(), 3);

    let stored = store.active_run(&group()).await.unwrap().unwrap();
    assert_eq!(stored.run.id, created.run.id);
    assert_eq!(store.inner.run_count().unwrap(), 1);
}
