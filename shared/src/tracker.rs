//! Optimistic mutation bookkeeping.
//!
//! A mutation is applied to its target synchronously in [`MutationTracker::begin`]
//! and recorded under `kind:entity_id`. At most one record exists per key: a
//! newer mutation on the same key takes the current (already optimistic) value
//! as its prior and retires the older record. The retired record's network
//! result is still accepted later but only for bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::model::{ToggleState, UnixTimeMs};
use crate::store::StoreError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Save,
    Follow,
    CommentLike,
}

impl MutationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Save => "save",
            Self::Follow => "follow",
            Self::CommentLike => "comment_like",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MutationKey(String);

impl MutationKey {
    #[must_use]
    pub fn new(kind: MutationKind, entity_id: &str) -> Self {
        Self(format!("{}:{entity_id}", kind.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire direction of a toggle: `Apply` is a POST, `Revoke` a DELETE.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationAction {
    Apply,
    Revoke,
}

impl MutationAction {
    #[must_use]
    pub const fn for_state(state: ToggleState) -> Self {
        if state.active {
            Self::Apply
        } else {
            Self::Revoke
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    pub key: MutationKey,
    pub kind: MutationKind,
    pub entity_id: String,
    pub prior: ToggleState,
    pub optimistic: ToggleState,
    pub issued_at: UnixTimeMs,
    pub seq: u64,
}

/// Carried through the network call so the result finds its record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MutationTicket {
    pub key: MutationKey,
    pub kind: MutationKind,
    pub entity_id: String,
    pub seq: u64,
    pub action: MutationAction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    Success,
    Failure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Optimistic value kept as authoritative.
    Committed,
    /// Prior value written back. `applied` is false when the entity had
    /// already left the store.
    RolledBack { restored: ToggleState, applied: bool },
    /// Result of a record retired by a newer same-key mutation.
    Superseded,
    /// Unknown or duplicate result.
    Stale,
}

/// Anything holding toggleable entities.
pub trait MutationTarget {
    fn read(&self, kind: MutationKind, entity_id: &str) -> Option<ToggleState>;

    fn write(
        &mut self,
        kind: MutationKind,
        entity_id: &str,
        state: ToggleState,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MutationTracker {
    pending: HashMap<MutationKey, PendingMutation>,
    superseded: HashSet<(MutationKey, u64)>,
    next_seq: u64,
}

impl MutationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `compute(current)` to the target now and record the mutation.
    #[instrument(level = "debug", skip(self, target, compute))]
    pub fn begin<T, F>(
        &mut self,
        target: &mut T,
        kind: MutationKind,
        entity_id: &str,
        now: UnixTimeMs,
        compute: F,
    ) -> Result<MutationTicket, StoreError>
    where
        T: MutationTarget + ?Sized,
        F: FnOnce(ToggleState) -> ToggleState,
    {
        let key = MutationKey::new(kind, entity_id);
        let current = target
            .read(kind, entity_id)
            .ok_or_else(|| StoreError::NotFound(entity_id.to_string()))?;
        let optimistic = compute(current);
        target.write(kind, entity_id, optimistic)?;

        if let Some(previous) = self.pending.remove(&key) {
            debug!(%key, retired_seq = previous.seq, "chaining over pending mutation");
            self.superseded.insert((key.clone(), previous.seq));
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        self.pending.insert(
            key.clone(),
            PendingMutation {
                key: key.clone(),
                kind,
                entity_id: entity_id.to_string(),
                prior: current,
                optimistic,
                issued_at: now,
                seq,
            },
        );

        Ok(MutationTicket {
            key,
            kind,
            entity_id: entity_id.to_string(),
            seq,
            action: MutationAction::for_state(optimistic),
        })
    }

    #[instrument(level = "debug", skip(self, target), fields(key = %ticket.key, seq = ticket.seq))]
    pub fn resolve<T>(
        &mut self,
        target: &mut T,
        ticket: &MutationTicket,
        outcome: MutationOutcome,
    ) -> Resolution
    where
        T: MutationTarget + ?Sized,
    {
        let is_live = self
            .pending
            .get(&ticket.key)
            .is_some_and(|p| p.seq == ticket.seq);

        if !is_live {
            if self.superseded.remove(&(ticket.key.clone(), ticket.seq)) {
                debug!(?outcome, "retired mutation settled");
                return Resolution::Superseded;
            }
            debug!("ignoring unknown mutation result");
            return Resolution::Stale;
        }

        let Some(pending) = self.pending.remove(&ticket.key) else {
            return Resolution::Stale;
        };

        match outcome {
            MutationOutcome::Success => Resolution::Committed,
            MutationOutcome::Failure => {
                let applied = match target.write(pending.kind, &pending.entity_id, pending.prior) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(error = %e, "rollback target gone");
                        false
                    }
                };
                warn!(kind = %pending.kind, entity_id = %pending.entity_id, "rolled back optimistic mutation");
                Resolution::RolledBack {
                    restored: pending.prior,
                    applied,
                }
            }
        }
    }

    /// Write every pending optimistic value back onto `target`, e.g. after a
    /// fetched page replaced the entities. Returns how many were re-applied.
    pub fn reapply<T>(&self, target: &mut T) -> usize
    where
        T: MutationTarget + ?Sized,
    {
        let mut applied = 0;
        for pending in self.pending.values() {
            if target.read(pending.kind, &pending.entity_id).is_none() {
                continue;
            }
            if target
                .write(pending.kind, &pending.entity_id, pending.optimistic)
                .is_ok()
            {
                applied += 1;
            }
        }
        if applied > 0 {
            debug!(applied, "re-applied pending mutations");
        }
        applied
    }

    #[must_use]
    pub fn get(&self, key: &MutationKey) -> Option<&PendingMutation> {
        self.pending.get(key)
    }

    #[must_use]
    pub fn is_pending(&self, kind: MutationKind, entity_id: &str) -> bool {
        self.pending.contains_key(&MutationKey::new(kind, entity_id))
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingMutation> {
        self.pending.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Continue the sequence of a previous session's tracker so its late
    /// results resolve as stale.
    pub fn resume_from(&mut self, previous: &MutationTracker) {
        self.next_seq = self.next_seq.max(previous.next_seq);
    }

    /// Network calls still outstanding, including retired ones.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len() + self.superseded.len()
    }
}
