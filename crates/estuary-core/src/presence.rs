//! Layer 3: Presence
//!
//! Per-actor ephemeral key-value state. Presence rides alongside the CRDT
//! tree in changes and snapshots but is not merged: the author's latest
//! write for their own slot wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::ActorId;

/// One actor's presence payload.
pub type PresenceData = BTreeMap<String, String>;

/// How a change mutates its author's presence slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceChange {
    /// Replace the author's slot with the carried map.
    Put { presence: PresenceData },
    /// Drop the author's slot entirely.
    Clear,
}

/// All known presence slots, keyed by actor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceMap {
    slots: BTreeMap<ActorId, PresenceData>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural clone; the working copy handed to updaters.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    pub fn get(&self, actor: &ActorId) -> Option<&PresenceData> {
        self.slots.get(actor)
    }

    /// The existing slot for `actor`, or a freshly inserted empty one.
    pub fn load_or_store(&mut self, actor: ActorId) -> &mut PresenceData {
        self.slots.entry(actor).or_default()
    }

    pub fn set(&mut self, actor: ActorId, data: PresenceData) {
        self.slots.insert(actor, data);
    }

    pub fn remove(&mut self, actor: &ActorId) -> Option<PresenceData> {
        self.slots.remove(actor)
    }

    pub fn contains(&self, actor: &ActorId) -> bool {
        self.slots.contains_key(actor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &PresenceData)> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Apply a change's presence mutation to the author's slot.
    pub fn apply(&mut self, author: ActorId, change: &PresenceChange) {
        match change {
            PresenceChange::Put { presence } => self.set(author, presence.clone()),
            PresenceChange::Clear => {
                self.remove(&author);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> PresenceData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn load_or_store_returns_existing_slot() {
        let actor = ActorId::random();
        let mut map = PresenceMap::new();
        map.set(actor, data(&[("cursor", "3")]));
        assert_eq!(map.load_or_store(actor), &data(&[("cursor", "3")]));
    }

    #[test]
    fn load_or_store_inserts_empty_slot() {
        let actor = ActorId::random();
        let mut map = PresenceMap::new();
        assert!(map.load_or_store(actor).is_empty());
        assert!(map.contains(&actor));
    }

    #[test]
    fn put_replaces_the_whole_slot() {
        let actor = ActorId::random();
        let mut map = PresenceMap::new();
        map.set(actor, data(&[("a", "1"), ("b", "2")]));
        map.apply(
            actor,
            &PresenceChange::Put {
                presence: data(&[("a", "9")]),
            },
        );
        assert_eq!(map.get(&actor), Some(&data(&[("a", "9")])));
    }

    #[test]
    fn clear_drops_the_slot() {
        let actor = ActorId::random();
        let mut map = PresenceMap::new();
        map.set(actor, data(&[("a", "1")]));
        map.apply(actor, &PresenceChange::Clear);
        assert!(!map.contains(&actor));
    }

    #[test]
    fn deep_copy_is_independent() {
        let actor = ActorId::random();
        let mut map = PresenceMap::new();
        map.set(actor, data(&[("a", "1")]));
        let copy = map.deep_copy();
        map.load_or_store(actor).insert("b".into(), "2".into());
        assert_eq!(copy.get(&actor), Some(&data(&[("a", "1")])));
    }
}
