//! Layer 0: Identity atoms
//!
//! ActorId: replica/editor identity (128-bit, totally ordered).
//! DocumentKey: the name a document is attached under.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Actor identifier - a 128-bit replica identity.
///
/// The total order over actors is the byte order of the underlying uuid;
/// it is the tiebreak for concurrent tickets with equal lamports.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(Uuid);

impl ActorId {
    /// The placeholder identity a document carries before `set_actor`.
    pub const INITIAL: ActorId = ActorId(Uuid::nil());

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// A fresh random identity. Convenience for hosts and tests.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a 32-char lowercase hex actor id.
    pub fn parse(s: &str) -> Result<Self, InvalidId> {
        Uuid::try_parse(s).map(Self).map_err(|err| InvalidId::Actor {
            raw: s.to_string(),
            reason: err.to_string(),
        })
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0.simple())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Invalid identity string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("actor id `{raw}` is invalid: {reason}")]
    Actor { raw: String, reason: String },
    #[error("document key `{raw}` is invalid: {reason}")]
    Key { raw: String, reason: String },
}

const KEY_MAX_LEN: usize = 120;

/// Document key - the name a document is attached under.
///
/// Non-empty, at most 120 chars, limited to `[a-z0-9._-]`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Key {
                raw: s,
                reason: "empty".into(),
            });
        }
        if s.len() > KEY_MAX_LEN {
            return Err(InvalidId::Key {
                raw: s,
                reason: format!("longer than {KEY_MAX_LEN} chars"),
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-'))
        {
            return Err(InvalidId::Key {
                raw: s.clone(),
                reason: format!("char `{c}` outside [a-z0-9._-]"),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentKey({:?})", self.0)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = InvalidId;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        DocumentKey::parse(s)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> String {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_display_is_simple_hex() {
        let actor = ActorId::from_uuid(Uuid::from_bytes([0xab; 16]));
        assert_eq!(actor.to_string(), "ab".repeat(16));
    }

    #[test]
    fn actor_parse_round_trips() {
        let actor = ActorId::random();
        assert_eq!(ActorId::parse(&actor.to_string()).unwrap(), actor);
    }

    #[test]
    fn actor_order_follows_bytes() {
        let low = ActorId::from_uuid(Uuid::from_bytes([1u8; 16]));
        let high = ActorId::from_uuid(Uuid::from_bytes([2u8; 16]));
        assert!(low < high);
        assert!(ActorId::INITIAL < low);
    }

    #[test]
    fn key_accepts_dotted_names() {
        let key = DocumentKey::parse("rooms.lobby-1_a").unwrap();
        assert_eq!(key.as_str(), "rooms.lobby-1_a");
    }

    #[test]
    fn key_rejects_empty() {
        let err = DocumentKey::parse("").unwrap_err();
        assert!(matches!(err, InvalidId::Key { ref reason, .. } if reason == "empty"));
    }

    #[test]
    fn key_rejects_uppercase() {
        let err = DocumentKey::parse("Lobby").unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn key_rejects_overlong() {
        let err = DocumentKey::parse("a".repeat(121)).unwrap_err();
        assert!(err.to_string().contains("longer"));
    }

    #[test]
    fn key_serde_validates() {
        let err = serde_json::from_str::<DocumentKey>(r#""NOPE""#).unwrap_err();
        assert!(err.to_string().contains("outside"));
    }
}
