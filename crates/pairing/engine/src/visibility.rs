//! Visibility resolver.
//!
//! Projects a run's edges down to what a requester may see. The owner sees
//! every edge; anyone else sees at most the edge where they are the giver,
//! never the edge where they are the receiver.

use pairing_types::{GroupId, Participant, ParticipantId, PairingEdge, PairingRun};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant key with its display name, if the roster still knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: ParticipantId,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub giver: ParticipantRef,
    pub receiver: ParticipantRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "assignments", rename_all = "snake_case")]
pub enum Visibility {
    /// The group has no active run.
    NotGenerated,
    /// Owner view: every edge, ordered by giver display name.
    Full(Vec<Assignment>),
    /// Participant view: the requester's own assignment, if they were drawn.
    Own(Option<Assignment>),
}

impl Visibility {
    /// Assignments visible to the requester.
    pub fn assignments(&self) -> Vec<&Assignment> {
        match self {
            Visibility::NotGenerated => Vec::new(),
            Visibility::Full(all) => all.iter().collect(),
            Visibility::Own(own) => own.iter().collect(),
        }
    }
}

/// What `GetView` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingView {
    pub group_id: GroupId,
    pub requester_id: ParticipantId,
    pub is_owner: bool,
    pub run: Option<PairingRun>,
    pub visibility: Visibility,
}

/// Filter `edges` for `requester`. `roster` is only used for display names.
pub fn resolve(
    edges: &[PairingEdge],
    roster: &[Participant],
    requester: &ParticipantId,
    is_owner: bool,
) -> Visibility {
    let names: HashMap<&ParticipantId, &str> = roster
        .iter()
        .map(|p| (&p.id, p.display_name.as_str()))
        .collect();
    let to_assignment = |edge: &PairingEdge| Assignment {
        giver: participant_ref(&names, &edge.giver_id),
        receiver: participant_ref(&names, &edge.receiver_id),
    };

    if is_owner {
        let mut all: Vec<Assignment> = edges.iter().map(to_assignment).collect();
        all.sort_by(|a, b| {
            a.giver
                .display_name
                .cmp(&b.giver.display_name)
                .then_with(|| a.giver.id.cmp(&b.giver.id))
        });
        return Visibility::Full(all);
    }

    Visibility::Own(
        edges
            .iter()
            .find(|edge| edge.giver_id == *requester)
            .map(to_assignment),
    )
}

fn participant_ref(names: &HashMap<&ParticipantId, &str>, id: &ParticipantId) -> ParticipantRef {
    ParticipantRef {
        id: id.clone(),
        display_name: names.get(id).map(|name| name.to_string()),
    }
}
