//! Layer 3: Operations
//!
//! The two mutations the document tree understands. Operations are
//! intention-preserving records: they name the container they target by
//! path, and carry the ticket that decides every conflict.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::ActorId;
use crate::time::Ticket;
use crate::value::Value;

/// What a `Set` writes: a scalar leaf, or a fresh empty container.
///
/// Containers are created empty and filled by child sets, so concurrent
/// writers populating one container commute key by key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpValue {
    Scalar(Value),
    Object,
}

/// A single document mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Write `value` under `key` in the container at `path`.
    Set {
        path: Vec<String>,
        key: String,
        value: OpValue,
        executed_at: Ticket,
    },
    /// Tombstone `key` in the container at `path`.
    Remove {
        path: Vec<String>,
        key: String,
        executed_at: Ticket,
    },
}

impl Operation {
    pub fn executed_at(&self) -> &Ticket {
        match self {
            Operation::Set { executed_at, .. } => executed_at,
            Operation::Remove { executed_at, .. } => executed_at,
        }
    }

    /// Rewrite the issuing actor. Used when the host assigns the real
    /// actor id to changes minted before attach.
    pub fn set_actor(&mut self, actor: ActorId) {
        match self {
            Operation::Set { executed_at, .. } => executed_at.actor = actor,
            Operation::Remove { executed_at, .. } => executed_at.actor = actor,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Set { path, key, .. } => {
                write!(f, "set {}", display_path(path, key))
            }
            Operation::Remove { path, key, .. } => {
                write!(f, "remove {}", display_path(path, key))
            }
        }
    }
}

fn display_path(path: &[String], key: &str) -> String {
    let mut out = String::from("$");
    for seg in path {
        out.push('.');
        out.push_str(seg);
    }
    out.push('.');
    out.push_str(key);
    out
}

/// Structural failure while executing an operation.
///
/// These indicate a protocol or data bug, not a conflict: conflicts are
/// resolved by ticket comparison and never error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("path `{path}` not found")]
    PathNotFound { path: String },
    #[error("path `{path}` is not an object")]
    NotAnObject { path: String },
}
