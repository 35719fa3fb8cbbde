//! Group directory: who owns a group and who is on its roster.
//!
//! Group membership and ownership are owned by the surrounding application;
//! the engine only reads them.

use async_trait::async_trait;
use pairing_types::{GroupId, Participant, ParticipantId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of groups and their rosters.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Owner of the group, or `None` if the group does not exist.
    async fn group_owner(&self, group_id: &GroupId) -> Result<Option<ParticipantId>, DirectoryError>;

    /// Eligible participants in roster order. May be empty.
    async fn list_participants(&self, group_id: &GroupId)
        -> Result<Vec<Participant>, DirectoryError>;
}

struct GroupEntry {
    owner: ParticipantId,
    roster: Vec<Participant>,
}

/// In-memory group directory.
#[derive(Default)]
pub struct InMemoryGroupDirectory {
    groups: RwLock<HashMap<GroupId, GroupEntry>>,
    offline: AtomicBool,
}

impl InMemoryGroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group with its owner. Replaces any existing group entry.
    pub fn add_group(&self, group_id: GroupId, owner: ParticipantId) -> Result<(), DirectoryError> {
        self.write()?.insert(
            group_id,
            GroupEntry {
                owner,
                roster: Vec::new(),
            },
        );
        Ok(())
    }

    /// Add a participant to a group's roster. Re-adding an id updates its
    /// display attributes in place.
    pub fn add_participant(
        &self,
        group_id: &GroupId,
        participant: Participant,
    ) -> Result<(), DirectoryError> {
        let mut guard = self.write()?;
        let entry = guard
            .get_mut(group_id)
            .ok_or_else(|| DirectoryError::Unavailable(format!("unknown group {group_id}")))?;
        match entry.roster.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => *existing = participant,
            None => entry.roster.push(participant),
        }
        Ok(())
    }

    pub fn remove_participant(
        &self,
        group_id: &GroupId,
        participant_id: &ParticipantId,
    ) -> Result<(), DirectoryError> {
        let mut guard = self.write()?;
        if let Some(entry) = guard.get_mut(group_id) {
            entry.roster.retain(|p| p.id != *participant_id);
        }
        Ok(())
    }

    /// Simulate an outage: every lookup fails until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), DirectoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<GroupId, GroupEntry>>, DirectoryError> {
        self.groups
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<GroupId, GroupEntry>>, DirectoryError> {
        self.groups
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }
}

#[async_trait]
impl GroupDirectory for InMemoryGroupDirectory {
    async fn group_owner(&self, group_id: &GroupId) -> Result<Option<ParticipantId>, DirectoryError> {
        self.check_online()?;
        Ok(self.read()?.get(group_id).map(|entry| entry.owner.clone()))
    }

    async fn list_participants(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<Participant>, DirectoryError> {
        self.check_online()?;
        Ok(self
            .read()?
            .get(group_id)
            .map(|entry| entry.roster.clone())
            .unwrap_or_default())
    }
}
