//! Layer 5: Change context
//!
//! The accumulator behind one mutation session. Proxies record operations
//! here while mutating the working clone; a context that recorded anything
//! freezes into a `Change` at commit.

use crate::change::Change;
use crate::operation::Operation;
use crate::presence::PresenceChange;
use crate::time::{ChangeId, Ticket};

pub struct ChangeContext {
    /// The id the resulting change will carry: the successor of the
    /// document's clock at session start.
    id: ChangeId,
    message: String,
    delimiter: u32,
    operations: Vec<Operation>,
    presence_change: Option<PresenceChange>,
}

impl ChangeContext {
    /// Open a session on top of the document's current clock position.
    pub fn new(current: ChangeId, message: impl Into<String>) -> Self {
        Self {
            id: current.next(),
            message: message.into(),
            delimiter: 0,
            operations: Vec::new(),
            presence_change: None,
        }
    }

    /// Mint the ticket for the next operation of this session.
    pub fn issue_ticket(&mut self) -> Ticket {
        self.delimiter += 1;
        Ticket::new(self.id.lamport, self.delimiter, self.id.actor)
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    pub fn set_presence_change(&mut self, change: PresenceChange) {
        self.presence_change = Some(change);
    }

    pub fn id(&self) -> &ChangeId {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether anything was recorded at all.
    pub fn has_change(&self) -> bool {
        !self.operations.is_empty() || self.presence_change.is_some()
    }

    /// Whether the session touched presence but not the tree.
    pub fn is_presence_only_change(&self) -> bool {
        self.operations.is_empty()
    }

    /// The clock position the document advances to after committing.
    pub fn next_id(&self) -> ChangeId {
        self.id
    }

    /// Freeze the session into a change.
    pub fn to_change(self) -> Change {
        Change::new(self.id, self.message, self.operations, self.presence_change)
    }
}
