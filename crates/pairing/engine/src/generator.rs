//! Derangement generator.
//!
//! The roster is shuffled with Fisher–Yates and each participant gives to the
//! next one in shuffled order, the last wrapping around to the first. The
//! result is always a single cycle through the whole roster, so there are no
//! fixed points and no retry loop. It does not sample uniformly over all
//! derangements: assignments made of several disjoint cycles (e.g. `A↔B`,
//! `C↔D`) are never produced.

use pairing_types::ParticipantId;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

/// Smallest roster that admits a derangement.
pub const MIN_PARTICIPANTS: usize = 2;

/// One giver→receiver pair produced by a draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Draw {
    pub giver: ParticipantId,
    pub receiver: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("need at least {required} participants, found {found}")]
    InsufficientParticipants { found: usize, required: usize },

    #[error("participant {0} appears more than once in the roster")]
    DuplicateParticipant(ParticipantId),
}

/// Draw a single-cycle assignment over `roster` using the thread-local RNG.
pub fn generate_assignment(roster: &[ParticipantId]) -> Result<Vec<Draw>, GenerateError> {
    generate_assignment_with_rng(roster, &mut rand::thread_rng())
}

/// Draw a single-cycle assignment over `roster` with an explicit RNG.
///
/// Pairs come back in cycle order: each draw's receiver is the next draw's
/// giver.
pub fn generate_assignment_with_rng<R: Rng + ?Sized>(
    roster: &[ParticipantId],
    rng: &mut R,
) -> Result<Vec<Draw>, GenerateError> {
    if roster.len() < MIN_PARTICIPANTS {
        return Err(GenerateError::InsufficientParticipants {
            found: roster.len(),
            required: MIN_PARTICIPANTS,
        });
    }

    let mut seen = HashSet::with_capacity(roster.len());
    for id in roster {
        if !seen.insert(id) {
            return Err(GenerateError::DuplicateParticipant(id.clone()));
        }
    }

    let mut order = roster.to_vec();
    order.shuffle(rng);

    let n = order.len();
    Ok((0..n)
        .map(|i| Draw {
            giver: order[i].clone(),
            receiver: order[(i + 1) % n].clone(),
        })
        .collect())
}
