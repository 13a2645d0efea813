//! Layer 6: Snapshot codec
//!
//! A snapshot is the opaque byte payload a pack may carry instead of
//! changes: the whole tree plus all presence slots at a server-known
//! version. Only this module knows the encoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::PresenceMap;
use crate::root::Root;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot decode failed: {reason}")]
    Decode { reason: String },
    #[error("unsupported snapshot version {version}")]
    UnsupportedVersion { version: u32 },
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotWireV1 {
    version: u32,
    root: Root,
    presences: PresenceMap,
}

/// Encode a root and presence map into snapshot bytes.
pub fn encode(root: &Root, presences: &PresenceMap) -> Vec<u8> {
    let wire = SnapshotWireV1 {
        version: SNAPSHOT_VERSION,
        root: root.clone(),
        presences: presences.clone(),
    };
    serde_json::to_vec(&wire).expect("snapshot wire types always serialize")
}

/// Decode snapshot bytes back into a root and presence map.
pub fn decode(bytes: &[u8]) -> Result<(Root, PresenceMap), SnapshotError> {
    let wire: SnapshotWireV1 =
        serde_json::from_slice(bytes).map_err(|err| SnapshotError::Decode {
            reason: err.to_string(),
        })?;
    if wire.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            version: wire.version,
        });
    }
    Ok((wire.root, wire.presences))
}
