//! Layer 1: Logical time
//!
//! Ticket: per-element timestamp (lamport, delimiter, actor).
//! ChangeId: per-change clock position (client_seq, lamport, actor).
//! VersionVector: per-actor latest observed lamport; the causality basis
//! for tombstone garbage collection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::ActorId;

/// Ticket - the timestamp stamped on every CRDT element.
///
/// Ordered lexicographically by (lamport, actor); the delimiter is the final
/// tiebreak and only distinguishes elements minted inside one change.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub lamport: u64,
    pub delimiter: u32,
    pub actor: ActorId,
}

impl Ticket {
    pub fn new(lamport: u64, delimiter: u32, actor: ActorId) -> Self {
        Self {
            lamport,
            delimiter,
            actor,
        }
    }

    /// The successor ticket: lamport and delimiter advance, actor stays.
    pub fn next(&self) -> Self {
        Self {
            lamport: self.lamport + 1,
            delimiter: self.delimiter + 1,
            actor: self.actor,
        }
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then_with(|| self.actor.cmp(&other.actor))
            .then_with(|| self.delimiter.cmp(&other.delimiter))
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lamport, self.delimiter, self.actor)
    }
}

/// ChangeId - where a replica's clock stands after a committed change.
///
/// `client_seq` counts changes this replica has produced; `lamport` is the
/// causal component shared with remote changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId {
    pub client_seq: u32,
    pub lamport: u64,
    pub actor: ActorId,
}

impl ChangeId {
    /// The clock position of a freshly created document.
    pub fn initial() -> Self {
        Self {
            client_seq: 0,
            lamport: 0,
            actor: ActorId::INITIAL,
        }
    }

    /// The id the next local change will carry.
    pub fn next(&self) -> Self {
        Self {
            client_seq: self.client_seq + 1,
            lamport: self.lamport + 1,
            actor: self.actor,
        }
    }

    /// Advance the lamport past a received remote lamport.
    ///
    /// Receiving is itself an event: the result is `max(self, remote) + 1`.
    /// The client sequence is untouched; only local commits consume it.
    pub fn sync_lamport(&self, remote_lamport: u64) -> Self {
        Self {
            client_seq: self.client_seq,
            lamport: self.lamport.max(remote_lamport) + 1,
            actor: self.actor,
        }
    }

    pub fn with_actor(&self, actor: ActorId) -> Self {
        Self {
            client_seq: self.client_seq,
            lamport: self.lamport,
            actor,
        }
    }

    pub fn with_lamport(&self, lamport: u64) -> Self {
        Self {
            client_seq: self.client_seq,
            lamport,
            actor: self.actor,
        }
    }
}

/// Version vector - per-actor latest observed lamport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector {
    entries: BTreeMap<ActorId, u64>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, actor: &ActorId) -> u64 {
        self.entries.get(actor).copied().unwrap_or(0)
    }

    /// Record an observation; keeps the per-actor maximum.
    pub fn set(&mut self, actor: ActorId, lamport: u64) {
        let entry = self.entries.entry(actor).or_insert(0);
        *entry = (*entry).max(lamport);
    }

    /// Key-wise maximum of two vectors.
    pub fn max(&self, other: &VersionVector) -> VersionVector {
        let mut merged = self.clone();
        for (actor, lamport) in &other.entries {
            merged.set(*actor, *lamport);
        }
        merged
    }

    /// The GC frontier: the smallest lamport any known actor has reached.
    ///
    /// An empty vector has no frontier and reports 0, so nothing is eligible.
    pub fn min_lamport(&self) -> u64 {
        self.entries.values().copied().min().unwrap_or(0)
    }

    /// Whether every known replica has causally seen the given ticket.
    pub fn includes(&self, ticket: &Ticket) -> bool {
        !self.entries.is_empty() && self.min_lamport() >= ticket.lamport
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &u64)> {
        self.entries.iter()
    }
}
