//! Document-level errors.
//!
//! These are bounded and stable: each variant is a refusal state a caller
//! can act on, not a library implementation detail. Structural subsystem
//! failures keep their own enums and convert in.

use thiserror::Error;

use crate::identity::InvalidId;
use crate::operation::ApplyError;
use crate::snapshot::SnapshotError;

/// Errors visible on the document façade.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum DocError {
    /// Any mutation after the server acknowledged removal.
    #[error("document is removed")]
    DocumentRemoved,

    /// The working clone violated the configured schema rules.
    #[error("schema validation failed: {0}")]
    SchemaValidationFailed(String),

    /// Committing would push the document past its size limit.
    #[error("document size exceeds the limit")]
    DocumentSizeExceedsLimit,

    /// A broadcast payload that does not serialize to JSON.
    #[error("unsupported payload type")]
    UnsupportedPayloadType,

    /// The host side of the broadcast channel pair is gone.
    #[error("broadcast channel closed")]
    BroadcastClosed,

    /// An updater closure failed; the message is the caller's own.
    #[error("{0}")]
    Updater(String),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}

impl DocError {
    /// Convenience for updater closures bailing out with a message.
    pub fn updater(message: impl Into<String>) -> Self {
        DocError::Updater(message.into())
    }
}
