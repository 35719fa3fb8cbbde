use crate::ids::{GroupId, ParticipantId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A roster entry as supplied by the group directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub contact_address: String,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        contact_address: impl Into<String>,
    ) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
            contact_address: contact_address.into(),
        }
    }
}

/// Status of a pairing run. Runs are soft-deleted by retiring them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Retired,
}

impl RunStatus {
    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Retired => "retired",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "active" => Ok(RunStatus::Active),
            "retired" => Ok(RunStatus::Retired),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

/// One generation of a group's assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRun {
    pub id: RunId,
    pub group_id: GroupId,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl PairingRun {
    /// A freshly generated run, not yet persisted.
    pub fn new_active(group_id: GroupId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RunId::generate(),
            group_id,
            status: RunStatus::Active,
            created_at,
            retired_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }
}

/// A single giver→receiver relationship. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairingEdge {
    pub run_id: RunId,
    pub giver_id: ParticipantId,
    pub receiver_id: ParticipantId,
    /// Emission order within the run.
    pub position: u32,
}
