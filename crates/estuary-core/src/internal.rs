//! Layer 8: Internal document
//!
//! The canonical state: tree, presence slots, local-change log, checkpoint,
//! and clock position. Nothing mutates the tree or presences except
//! `Change::execute` and snapshot restore.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::checkpoint::Checkpoint;
use crate::error::DocError;
use crate::event::{DocEvent, DocEventKind};
use crate::identity::{ActorId, DocumentKey};
use crate::pack::ChangePack;
use crate::presence::{PresenceData, PresenceMap};
use crate::resource::DocSize;
use crate::root::Root;
use crate::snapshot;
use crate::time::{ChangeId, VersionVector};

/// Document lifecycle status. `Removed` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    #[default]
    Detached,
    Attached,
    Removed,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Detached => "detached",
            DocStatus::Attached => "attached",
            DocStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct InternalDocument {
    key: DocumentKey,
    status: DocStatus,
    root: Root,
    presences: PresenceMap,
    online_clients: BTreeSet<ActorId>,
    local_changes: Vec<Change>,
    change_id: ChangeId,
    checkpoint: Checkpoint,
    version_vector: VersionVector,
}

impl InternalDocument {
    pub fn new(key: DocumentKey) -> Self {
        Self {
            key,
            status: DocStatus::Detached,
            root: Root::new(),
            presences: PresenceMap::new(),
            online_clients: BTreeSet::new(),
            local_changes: Vec::new(),
            change_id: ChangeId::initial(),
            checkpoint: Checkpoint::INITIAL,
            version_vector: VersionVector::new(),
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn status(&self) -> DocStatus {
        self.status
    }

    pub fn set_status(&mut self, status: DocStatus) {
        self.status = status;
    }

    pub fn is_attached(&self) -> bool {
        self.status == DocStatus::Attached
    }

    pub fn actor_id(&self) -> ActorId {
        self.change_id.actor
    }

    /// Assign the replica's real identity. Everything minted under the
    /// placeholder follows: pending local changes, the clock entry, and the
    /// local presence slot.
    pub fn set_actor(&mut self, actor: ActorId) {
        let previous = self.change_id.actor;
        if previous == actor {
            return;
        }
        self.change_id = self.change_id.with_actor(actor);
        for change in &mut self.local_changes {
            change.set_actor(actor);
        }
        let mut rehomed = VersionVector::new();
        for (owner, lamport) in self.version_vector.iter() {
            let owner = if *owner == previous { actor } else { *owner };
            rehomed.set(owner, *lamport);
        }
        self.version_vector = rehomed;
        if let Some(slot) = self.presences.remove(&previous) {
            self.presences.set(actor, slot);
        }
    }

    pub fn change_id(&self) -> &ChangeId {
        &self.change_id
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn presences(&self) -> &PresenceMap {
        &self.presences
    }

    pub fn local_changes(&self) -> &[Change] {
        &self.local_changes
    }

    pub fn has_local_changes(&self) -> bool {
        !self.local_changes.is_empty()
    }

    pub fn marshal(&self) -> String {
        self.root.marshal()
    }

    pub fn doc_size(&self) -> DocSize {
        self.root.doc_size()
    }

    pub fn garbage_len(&self) -> usize {
        self.root.garbage_len()
    }

    pub fn garbage_collect(&mut self, vector: &VersionVector) -> usize {
        self.root.garbage_collect(vector)
    }

    /// The causal frontier this replica has observed, including its own
    /// clock position.
    pub fn version_vector(&self) -> VersionVector {
        let mut vector = self.version_vector.clone();
        vector.set(self.actor_id(), self.change_id.lamport);
        vector
    }

    /// Apply remote (or replayed) changes to the canonical state.
    ///
    /// Synchronizes the clock past each change, executes it, and reports a
    /// `PresenceChanged` event for every change that altered the presence of
    /// an online peer. The local-change log is never touched here.
    pub fn apply_changes(&mut self, changes: &[Change]) -> Result<Vec<DocEvent>, DocError> {
        let mut events = Vec::new();
        for change in changes {
            self.change_id = self.change_id.sync_lamport(change.lamport());
            let mutation = change.execute(&mut self.root, &mut self.presences)?;
            self.version_vector.set(change.actor(), change.lamport());
            if let Some(mutation) = mutation {
                let visible = mutation.actor != self.actor_id()
                    && self.online_clients.contains(&mutation.actor);
                if visible {
                    events.push(DocEvent::single(
                        DocEventKind::PresenceChanged,
                        mutation.actor,
                        mutation.presence.unwrap_or_default(),
                    ));
                }
            }
        }
        Ok(events)
    }

    /// Replace the canonical state from a snapshot taken at `vector`.
    pub fn apply_snapshot(
        &mut self,
        bytes: &[u8],
        vector: &VersionVector,
    ) -> Result<(), DocError> {
        let (root, presences) = snapshot::decode(bytes)?;
        self.root = root;
        self.presences = presences;
        self.change_id = self.change_id.with_lamport(vector.get(&self.actor_id()));
        self.version_vector = self.version_vector.max(vector);
        Ok(())
    }

    /// Commit one local change: execute against canonical state, append to
    /// the log, advance the clock.
    pub(crate) fn commit(&mut self, next: ChangeId, change: Change) -> Result<(), DocError> {
        change.execute(&mut self.root, &mut self.presences)?;
        self.local_changes.push(change);
        self.change_id = next;
        self.version_vector
            .set(self.change_id.actor, self.change_id.lamport);
        Ok(())
    }

    /// Drop the leading run of local changes the server has acknowledged.
    pub(crate) fn truncate_acked(&mut self, client_seq: u32) {
        let keep_from = self
            .local_changes
            .iter()
            .position(|c| c.client_seq() > client_seq)
            .unwrap_or(self.local_changes.len());
        self.local_changes.drain(..keep_from);
    }

    pub(crate) fn forward_checkpoint(&mut self, other: &Checkpoint) {
        self.checkpoint = self.checkpoint.forward(other);
    }

    /// The pack of pending local changes to send to the server.
    pub fn create_change_pack(&self) -> ChangePack {
        ChangePack::new(
            self.key.clone(),
            self.checkpoint,
            self.local_changes.clone(),
            None,
            self.version_vector(),
            self.status == DocStatus::Removed,
        )
    }

    // -- presence ----------------------------------------------------------

    pub fn my_presence(&self) -> Option<PresenceData> {
        self.presences.get(&self.actor_id()).cloned()
    }

    /// The presence of an online peer; `None` while the peer is offline.
    pub fn presence(&self, actor: &ActorId) -> Option<PresenceData> {
        if !self.online_clients.contains(actor) {
            return None;
        }
        self.presences.get(actor).cloned()
    }

    /// The presence of a peer regardless of the online set.
    pub fn presence_for_test(&self, actor: &ActorId) -> Option<PresenceData> {
        self.presences.get(actor).cloned()
    }

    /// Presence slots of online peers.
    pub fn presences_of_online(&self) -> BTreeMap<ActorId, PresenceData> {
        self.presences
            .iter()
            .filter(|(actor, _)| self.online_clients.contains(actor))
            .map(|(actor, data)| (*actor, data.clone()))
            .collect()
    }

    /// Every known presence slot, online or not.
    pub fn all_presences(&self) -> BTreeMap<ActorId, PresenceData> {
        self.presences
            .iter()
            .map(|(actor, data)| (*actor, data.clone()))
            .collect()
    }

    pub fn online_clients(&self) -> &BTreeSet<ActorId> {
        &self.online_clients
    }

    pub fn set_online_clients(&mut self, actors: impl IntoIterator<Item = ActorId>) {
        self.online_clients = actors.into_iter().collect();
    }

    pub fn add_online_client(&mut self, actor: ActorId) {
        self.online_clients.insert(actor);
    }

    pub fn remove_online_client(&mut self, actor: &ActorId) {
        self.online_clients.remove(actor);
    }
}
