//! Collaborative document core for realtime synchronization.
//!
//! A JSON-shaped document whose mutations are modeled as a CRDT, so
//! concurrent edits by multiple actors converge without a central
//! serializer. Module hierarchy follows type dependency order:
//! - identity: ActorId, DocumentKey (Layer 0)
//! - time, checkpoint: Ticket, ChangeId, VersionVector, Checkpoint (Layer 1)
//! - value, resource: scalar values and size accounting (Layer 2)
//! - operation, presence: mutations and presence slots (Layer 3)
//! - root: the LWW-map document tree (Layer 4)
//! - change, context: the replication unit and its accumulator (Layer 5)
//! - pack, snapshot, schema: wire shapes and validation (Layer 6)
//! - event: document events and broadcast plumbing (Layer 7)
//! - internal, json: canonical state and mutation proxies (Layer 8)
//! - document: the façade hosts hold (Layer 9)

#![forbid(unsafe_code)]

pub mod change;
pub mod checkpoint;
pub mod context;
pub mod document;
pub mod error;
pub mod event;
pub mod identity;
pub mod internal;
pub mod json;
pub mod operation;
pub mod pack;
pub mod presence;
pub mod resource;
pub mod root;
pub mod schema;
pub mod snapshot;
pub mod time;
pub mod value;

pub use change::{Change, PresenceMutation};
pub use checkpoint::Checkpoint;
pub use context::ChangeContext;
pub use document::{Document, DocumentOptions};
pub use error::DocError;
pub use event::{BroadcastEventHandler, BroadcastRequest, DocEvent, DocEventKind};
pub use identity::{ActorId, DocumentKey, InvalidId};
pub use internal::{DocStatus, InternalDocument};
pub use json::{JsonObject, Presence};
pub use operation::{ApplyError, OpValue, Operation};
pub use pack::ChangePack;
pub use presence::{PresenceChange, PresenceData, PresenceMap};
pub use resource::{DataSize, DocSize, TICKET_WEIGHT};
pub use root::{Element, Entry, ObjectNode, Root};
pub use schema::{Rule, RuleKind, ValidationError, ValidationResult};
pub use snapshot::SnapshotError;
pub use time::{ChangeId, Ticket, VersionVector};
pub use value::Value;

pub type Result<T> = std::result::Result<T, DocError>;
