//! Layer 4: Document tree
//!
//! An LWW-map CRDT: a tree of containers whose entries remember the ticket
//! that last wrote them. Concurrent writes to one key are resolved by ticket
//! comparison; removals tombstone the entry until every replica has seen
//! them, at which point GC may purge.
//!
//! INVARIANT: a re-executed operation (same ticket) is a no-op. This is what
//! makes replaying local changes over a restored snapshot safe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::operation::{ApplyError, OpValue, Operation};
use crate::resource::{DataSize, DocSize, TICKET_WEIGHT};
use crate::time::{Ticket, VersionVector};
use crate::value::Value;

/// One element of the tree: a scalar leaf or a nested container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Primitive(Value),
    Object(ObjectNode),
}

/// A keyed slot in a container.
///
/// `updated_at` is the winning write's ticket. A tombstoned entry keeps its
/// element until GC proves every replica has seen the removal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub element: Element,
    pub updated_at: Ticket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<Ticket>,
}

impl Entry {
    fn live(element: Element, updated_at: Ticket) -> Self {
        Self {
            element,
            updated_at,
            removed_at: None,
        }
    }

    /// The ticket an incoming write must beat to take this slot.
    fn effective_at(&self) -> Ticket {
        match self.removed_at {
            Some(removed) => removed.max(self.updated_at),
            None => self.updated_at,
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

/// A container: string keys to entries, live and tombstoned alike.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectNode {
    entries: BTreeMap<String, Entry>,
}

impl ObjectNode {
    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// The live element under `key`, if any.
    pub fn get_live(&self, key: &str) -> Option<&Element> {
        self.entries
            .get(key)
            .filter(|e| !e.is_removed())
            .map(|e| &e.element)
    }

    pub fn live_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_removed())
            .map(|(k, _)| k.as_str())
    }

    fn set(&mut self, key: &str, value: &OpValue, at: Ticket) {
        let incoming = || match value {
            OpValue::Scalar(v) => Element::Primitive(v.clone()),
            OpValue::Object => Element::Object(ObjectNode::default()),
        };
        match self.entries.get_mut(key) {
            None => {
                self.entries.insert(key.to_string(), Entry::live(incoming(), at));
            }
            Some(entry) => {
                // Equal tickets mean a replay; lower tickets lost the race.
                if at > entry.effective_at() {
                    *entry = Entry::live(incoming(), at);
                }
            }
        }
    }

    fn remove(&mut self, key: &str, at: Ticket) {
        match self.entries.get_mut(key) {
            None => {
                // A removal is a write of bottom. It is recorded even when
                // the key is unknown here, so a concurrent set with a lower
                // ticket still loses once it arrives.
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        element: Element::Primitive(Value::Null),
                        updated_at: at,
                        removed_at: Some(at),
                    },
                );
            }
            Some(entry) => {
                if at > entry.effective_at() {
                    entry.removed_at = Some(at);
                }
            }
        }
    }

    fn marshal_into(&self, out: &mut String) {
        out.push('{');
        let mut first = true;
        for (key, entry) in &self.entries {
            if entry.is_removed() {
                continue;
            }
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&serde_json::to_string(key).unwrap_or_default());
            out.push(':');
            match &entry.element {
                Element::Primitive(v) => out.push_str(&v.marshal()),
                Element::Object(node) => node.marshal_into(out),
            }
        }
        out.push('}');
    }

    fn garbage_collect(&mut self, vector: &VersionVector) -> usize {
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            match entry.removed_at {
                Some(removed) if vector.includes(&removed) => {
                    purged += 1;
                    false
                }
                _ => true,
            }
        });
        for entry in self.entries.values_mut() {
            if let Element::Object(child) = &mut entry.element {
                purged += child.garbage_collect(vector);
            }
        }
        purged
    }

    fn garbage_len(&self) -> usize {
        let mut count = 0;
        for entry in self.entries.values() {
            if entry.is_removed() {
                count += 1;
            }
            if let Element::Object(child) = &entry.element {
                count += child.garbage_len();
            }
        }
        count
    }

    fn accumulate_size(&self, size: &mut DocSize, in_garbage: bool) {
        for entry in self.entries.values() {
            let garbage = in_garbage || entry.is_removed();
            let mut slot = DataSize::default();
            slot.meta = TICKET_WEIGHT;
            match &entry.element {
                Element::Primitive(v) => slot.data = v.data_size(),
                Element::Object(child) => child.accumulate_size(size, garbage),
            }
            if garbage {
                size.garbage += slot;
            } else {
                size.live += slot;
            }
        }
    }
}

/// The document tree root.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Root {
    object: ObjectNode,
}

impl Root {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural clone; the working copy handed to updaters.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    pub fn object(&self) -> &ObjectNode {
        &self.object
    }

    /// Apply one operation. Conflicts resolve by ticket and never error;
    /// errors mean the operation addressed a container that does not exist.
    pub fn execute(&mut self, op: &Operation) -> Result<(), ApplyError> {
        match op {
            Operation::Set {
                path,
                key,
                value,
                executed_at,
            } => {
                let target = self.navigate_mut(path)?;
                target.set(key, value, *executed_at);
            }
            Operation::Remove {
                path,
                key,
                executed_at,
            } => {
                let target = self.navigate_mut(path)?;
                target.remove(key, *executed_at);
            }
        }
        Ok(())
    }

    /// Purge tombstones every replica in `vector` has seen. Returns the
    /// purged count; calling again with the same vector purges nothing.
    pub fn garbage_collect(&mut self, vector: &VersionVector) -> usize {
        self.object.garbage_collect(vector)
    }

    /// Count of tombstoned entries awaiting GC.
    pub fn garbage_len(&self) -> usize {
        self.object.garbage_len()
    }

    pub fn doc_size(&self) -> DocSize {
        let mut size = DocSize::default();
        self.object.accumulate_size(&mut size, false);
        size
    }

    /// Canonical JSON of the live tree; container keys in sorted order.
    pub fn marshal(&self) -> String {
        let mut out = String::new();
        self.object.marshal_into(&mut out);
        out
    }

    pub fn navigate(&self, path: &[String]) -> Result<&ObjectNode, ApplyError> {
        let mut node = &self.object;
        for (depth, seg) in path.iter().enumerate() {
            // Tombstoned containers stay addressable: a concurrent write into
            // a removed subtree lands in the garbage and GC reclaims it.
            let entry = node.entries.get(seg).ok_or_else(|| ApplyError::PathNotFound {
                path: joined(&path[..=depth]),
            })?;
            node = match &entry.element {
                Element::Object(child) => child,
                Element::Primitive(_) => {
                    return Err(ApplyError::NotAnObject {
                        path: joined(&path[..=depth]),
                    })
                }
            };
        }
        Ok(node)
    }

    fn navigate_mut(&mut self, path: &[String]) -> Result<&mut ObjectNode, ApplyError> {
        let mut node = &mut self.object;
        for (depth, seg) in path.iter().enumerate() {
            let entry = match node.entries.get_mut(seg) {
                Some(entry) => entry,
                None => {
                    return Err(ApplyError::PathNotFound {
                        path: joined(&path[..=depth]),
                    })
                }
            };
            node = match &mut entry.element {
                Element::Object(child) => child,
                Element::Primitive(_) => {
                    return Err(ApplyError::NotAnObject {
                        path: joined(&path[..=depth]),
                    })
                }
            };
        }
        Ok(node)
    }
}

fn joined(path: &[String]) -> String {
    let mut out = String::from("$");
    for seg in path {
        out.push('.');
        out.push_str(seg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ActorId;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn actor(byte: u8) -> ActorId {
        ActorId::from_uuid(Uuid::from_bytes([byte; 16]))
    }

    fn set(key: &str, value: Value, lamport: u64, by: u8) -> Operation {
        Operation::Set {
            path: vec![],
            key: key.into(),
            value: OpValue::Scalar(value),
            executed_at: Ticket::new(lamport, 1, actor(by)),
        }
    }

    fn remove(key: &str, lamport: u64, by: u8) -> Operation {
        Operation::Remove {
            path: vec![],
            key: key.into(),
            executed_at: Ticket::new(lamport, 1, actor(by)),
        }
    }

    fn vv(entries: &[(u8, u64)]) -> VersionVector {
        let mut v = VersionVector::new();
        for (byte, lamport) in entries {
            v.set(actor(*byte), *lamport);
        }
        v
    }

    #[test]
    fn set_then_marshal() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        assert_eq!(root.marshal(), r#"{"x":1}"#);
    }

    #[test]
    fn higher_ticket_wins_the_key() {
        let mut a = Root::new();
        a.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        a.execute(&set("x", Value::Long(2), 1, 2)).unwrap();

        let mut b = Root::new();
        b.execute(&set("x", Value::Long(2), 1, 2)).unwrap();
        b.execute(&set("x", Value::Long(1), 1, 1)).unwrap();

        assert_eq!(a.marshal(), r#"{"x":2}"#);
        assert_eq!(a.marshal(), b.marshal());
    }

    #[test]
    fn replay_is_a_noop() {
        let mut root = Root::new();
        let op = set("x", Value::Long(1), 1, 1);
        root.execute(&op).unwrap();
        root.execute(&op).unwrap();
        assert_eq!(root.marshal(), r#"{"x":1}"#);
    }

    #[test]
    fn remove_tombstones_until_gc() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        root.execute(&remove("x", 2, 1)).unwrap();

        assert_eq!(root.marshal(), "{}");
        assert_eq!(root.garbage_len(), 1);

        // Replica 2 has not seen the removal yet.
        assert_eq!(root.garbage_collect(&vv(&[(1, 2), (2, 1)])), 0);
        assert_eq!(root.garbage_collect(&vv(&[(1, 2), (2, 2)])), 1);
        assert_eq!(root.garbage_len(), 0);
    }

    #[test]
    fn gc_is_idempotent() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        root.execute(&remove("x", 2, 1)).unwrap();
        let vector = vv(&[(1, 5)]);
        assert_eq!(root.garbage_collect(&vector), 1);
        assert_eq!(root.garbage_collect(&vector), 0);
    }

    #[test]
    fn later_set_resurrects_removed_key() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        root.execute(&remove("x", 2, 1)).unwrap();
        root.execute(&set("x", Value::Long(3), 3, 2)).unwrap();
        assert_eq!(root.marshal(), r#"{"x":3}"#);
        assert_eq!(root.garbage_len(), 0);
    }

    #[test]
    fn stale_set_does_not_resurrect() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        root.execute(&remove("x", 3, 1)).unwrap();
        root.execute(&set("x", Value::Long(9), 2, 2)).unwrap();
        assert_eq!(root.marshal(), "{}");
    }

    #[test]
    fn remove_of_absent_key_leaves_a_tombstone() {
        let mut root = Root::new();
        root.execute(&remove("ghost", 2, 1)).unwrap();
        assert_eq!(root.marshal(), "{}");
        assert_eq!(root.garbage_len(), 1);

        // A concurrent set that lost the race stays suppressed.
        root.execute(&set("ghost", Value::Long(1), 1, 2)).unwrap();
        assert_eq!(root.marshal(), "{}");

        // A later set wins the slot back.
        root.execute(&set("ghost", Value::Long(3), 3, 2)).unwrap();
        assert_eq!(root.marshal(), r#"{"ghost":3}"#);
    }

    #[test]
    fn nested_objects_fill_key_by_key() {
        let mut root = Root::new();
        root.execute(&Operation::Set {
            path: vec![],
            key: "user".into(),
            value: OpValue::Object,
            executed_at: Ticket::new(1, 1, actor(1)),
        })
        .unwrap();
        root.execute(&Operation::Set {
            path: vec!["user".into()],
            key: "name".into(),
            value: OpValue::Scalar(Value::Str("kim".into())),
            executed_at: Ticket::new(1, 2, actor(1)),
        })
        .unwrap();
        assert_eq!(root.marshal(), r#"{"user":{"name":"kim"}}"#);
    }

    #[test]
    fn missing_path_errors() {
        let mut root = Root::new();
        let err = root
            .execute(&Operation::Set {
                path: vec!["nowhere".into()],
                key: "x".into(),
                value: OpValue::Scalar(Value::Null),
                executed_at: Ticket::new(1, 1, actor(1)),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ApplyError::PathNotFound {
                path: "$.nowhere".into()
            }
        );
    }

    #[test]
    fn scalar_path_segment_errors() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        let err = root
            .execute(&Operation::Set {
                path: vec!["x".into()],
                key: "y".into(),
                value: OpValue::Scalar(Value::Null),
                executed_at: Ticket::new(2, 1, actor(1)),
            })
            .unwrap_err();
        assert_eq!(err, ApplyError::NotAnObject { path: "$.x".into() });
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut root = Root::new();
        root.execute(&set("x", Value::Long(1), 1, 1)).unwrap();
        let copy = root.deep_copy();
        root.execute(&set("x", Value::Long(2), 2, 1)).unwrap();
        assert_eq!(copy.marshal(), r#"{"x":1}"#);
    }

    #[test]
    fn doc_size_splits_live_and_garbage() {
        let mut root = Root::new();
        root.execute(&set("a", Value::Str("12345678".into()), 1, 1))
            .unwrap();
        root.execute(&set("b", Value::Long(7), 2, 1)).unwrap();
        root.execute(&remove("a", 3, 1)).unwrap();

        let size = root.doc_size();
        assert_eq!(size.live, DataSize { data: 1, meta: TICKET_WEIGHT });
        assert_eq!(
            size.garbage,
            DataSize {
                data: 10,
                meta: TICKET_WEIGHT
            }
        );
        assert_eq!(size.total(), 1 + TICKET_WEIGHT);
    }

    // Tickets are unique per operation in a real history: sets and removes
    // take distinct delimiters, and a set's value is a function of its
    // ticket so duplicates are true replays.
    fn op_strategy() -> impl Strategy<Value = Operation> {
        let key = prop_oneof![Just("x"), Just("y")];
        let by = 1u8..4;
        let lamport = 1u64..8;
        (key, lamport, by, prop::bool::ANY).prop_map(|(key, lamport, by, is_set)| {
            if is_set {
                Operation::Set {
                    path: vec![],
                    key: key.into(),
                    value: OpValue::Scalar(Value::Long(lamport as i64 * 10 + by as i64)),
                    executed_at: Ticket::new(lamport, 1, actor(by)),
                }
            } else {
                Operation::Remove {
                    path: vec![],
                    key: key.into(),
                    executed_at: Ticket::new(lamport, 2, actor(by)),
                }
            }
        })
    }

    proptest! {
        #[test]
        fn prop_concurrent_ops_commute(ops in prop::collection::vec(op_strategy(), 1..6)) {
            let mut forward = Root::new();
            for op in &ops {
                forward.execute(op).unwrap();
            }
            let mut backward = Root::new();
            for op in ops.iter().rev() {
                backward.execute(op).unwrap();
            }
            prop_assert_eq!(forward.marshal(), backward.marshal());
        }

        #[test]
        fn prop_gc_never_changes_marshal(ops in prop::collection::vec(op_strategy(), 1..6)) {
            let mut root = Root::new();
            for op in &ops {
                root.execute(op).unwrap();
            }
            let before = root.marshal();
            root.garbage_collect(&vv(&[(1, 10), (2, 10), (3, 10)]));
            prop_assert_eq!(root.marshal(), before);
            prop_assert_eq!(root.garbage_len(), 0);
        }
    }
}
