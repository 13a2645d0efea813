//! Layer 7: Document events and broadcast plumbing
//!
//! A document exposes a bounded event stream (buffer of one) and a paired
//! request/response channel for host-mediated broadcasts. The tiny buffer
//! is deliberate backpressure: a host that stops draining events stalls
//! remote-change application rather than silently dropping updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DocError;
use crate::identity::ActorId;
use crate::presence::PresenceData;

/// What happened in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocEventKind {
    /// A peer established a realtime connection.
    Watched,
    /// A peer dropped its realtime connection.
    Unwatched,
    /// A remote change altered a visible peer's presence.
    PresenceChanged,
}

impl DocEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocEventKind::Watched => "watched",
            DocEventKind::Unwatched => "unwatched",
            DocEventKind::PresenceChanged => "presence-changed",
        }
    }
}

/// An event delivered on the document's event stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocEvent {
    pub kind: DocEventKind,
    /// The presence slots the event is about, keyed by actor.
    pub presences: BTreeMap<ActorId, PresenceData>,
}

impl DocEvent {
    pub fn new(kind: DocEventKind, presences: BTreeMap<ActorId, PresenceData>) -> Self {
        Self { kind, presences }
    }

    pub fn single(kind: DocEventKind, actor: ActorId, presence: PresenceData) -> Self {
        let mut presences = BTreeMap::new();
        presences.insert(actor, presence);
        Self { kind, presences }
    }
}

/// A host-mediated broadcast: the core hands the encoded payload to the
/// host, which delivers it and posts exactly one response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Handler invoked when the host delivers a broadcast for a subscribed
/// topic: `(topic, publisher, payload)`.
pub type BroadcastEventHandler =
    Box<dyn Fn(&str, &str, &[u8]) -> Result<(), DocError> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(DocEventKind::Watched.as_str(), "watched");
        assert_eq!(DocEventKind::Unwatched.as_str(), "unwatched");
        assert_eq!(DocEventKind::PresenceChanged.as_str(), "presence-changed");
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&DocEventKind::PresenceChanged).unwrap();
        assert_eq!(json, r#""presence-changed""#);
    }

    #[test]
    fn single_wraps_one_actor() {
        let actor = ActorId::random();
        let event = DocEvent::single(DocEventKind::Watched, actor, PresenceData::new());
        assert_eq!(event.presences.len(), 1);
        assert!(event.presences.contains_key(&actor));
    }
}
