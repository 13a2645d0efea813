//! Layer 5: Change
//!
//! The unit of replication: everything one mutation session produced,
//! stamped with the id it was committed under.

use serde::{Deserialize, Serialize};

use crate::identity::ActorId;
use crate::operation::{ApplyError, Operation};
use crate::presence::{PresenceChange, PresenceData, PresenceMap};
use crate::root::Root;
use crate::time::ChangeId;

/// What executing a change did to the presence map; the caller turns this
/// into a `PresenceChanged` event when the author is a visible peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceMutation {
    pub actor: ActorId,
    /// The author's slot after the change; `None` means it was cleared.
    pub presence: Option<PresenceData>,
}

/// A committed mutation session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    id: ChangeId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
    operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    presence_change: Option<PresenceChange>,
}

impl Change {
    pub fn new(
        id: ChangeId,
        message: String,
        operations: Vec<Operation>,
        presence_change: Option<PresenceChange>,
    ) -> Self {
        Self {
            id,
            message,
            operations,
            presence_change,
        }
    }

    pub fn id(&self) -> &ChangeId {
        &self.id
    }

    pub fn client_seq(&self) -> u32 {
        self.id.client_seq
    }

    pub fn lamport(&self) -> u64 {
        self.id.lamport
    }

    pub fn actor(&self) -> ActorId {
        self.id.actor
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn presence_change(&self) -> Option<&PresenceChange> {
        self.presence_change.as_ref()
    }

    /// A presence-only change carries no operations.
    pub fn is_presence_only(&self) -> bool {
        self.operations.is_empty()
    }

    /// Rewrite the author. Applied to pending local changes when the host
    /// assigns the real actor id at attach time.
    pub fn set_actor(&mut self, actor: ActorId) {
        self.id = self.id.with_actor(actor);
        for op in &mut self.operations {
            op.set_actor(actor);
        }
    }

    /// Apply this change to a root and presence map.
    ///
    /// Partial application on error is acceptable only against a clone;
    /// callers guarding canonical state discard their clones on failure.
    pub fn execute(
        &self,
        root: &mut Root,
        presences: &mut PresenceMap,
    ) -> Result<Option<PresenceMutation>, ApplyError> {
        for op in &self.operations {
            root.execute(op)?;
        }
        let Some(change) = &self.presence_change else {
            return Ok(None);
        };
        presences.apply(self.actor(), change);
        Ok(Some(PresenceMutation {
            actor: self.actor(),
            presence: presences.get(&self.actor()).cloned(),
        }))
    }
}
