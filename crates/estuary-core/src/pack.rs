//! Layer 6: Change pack
//!
//! One round-trip message between a replica and the server: changes (or a
//! snapshot), the server's checkpoint, its version vector, and the removal
//! flag. The transport codec lives outside the core; this is the shape it
//! serializes.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::checkpoint::Checkpoint;
use crate::identity::DocumentKey;
use crate::time::VersionVector;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangePack {
    pub document_key: DocumentKey,
    pub checkpoint: Checkpoint,
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Vec<u8>>,
    pub version_vector: VersionVector,
    #[serde(default)]
    pub is_removed: bool,
}

impl ChangePack {
    pub fn new(
        document_key: DocumentKey,
        checkpoint: Checkpoint,
        changes: Vec<Change>,
        snapshot: Option<Vec<u8>>,
        version_vector: VersionVector,
        is_removed: bool,
    ) -> Self {
        Self {
            document_key,
            checkpoint,
            changes,
            snapshot,
            version_vector,
            is_removed,
        }
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn changes_len(&self) -> usize {
        self.changes.len()
    }
}
