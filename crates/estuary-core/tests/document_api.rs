//! End-to-end scenarios on the document façade: local commits, rollback,
//! limits, reconciliation, truncation, and removal.

use estuary_core::{
    ActorId, ChangePack, Checkpoint, DocError, DocStatus, Document, DocumentKey, DocumentOptions,
    VersionVector,
};

fn new_doc(name: &str) -> Document {
    let mut doc = Document::new(DocumentKey::parse(name).unwrap());
    doc.set_actor(ActorId::random());
    doc
}

#[test]
fn single_actor_commit() {
    let mut doc = new_doc("s1");
    doc.update(|root, _| root.set_long("x", 1)).unwrap();

    assert_eq!(doc.marshal(), r#"{"x":1}"#);
    assert!(doc.has_local_changes());
    assert_eq!(doc.create_change_pack().changes_len(), 1);
    assert_eq!(doc.internal().change_id().lamport, 1);
}

#[test]
fn failed_updater_rolls_back() {
    let mut doc = new_doc("s2");
    doc.update(|root, _| root.set_long("x", 1)).unwrap();

    let err = doc
        .update(|root, _| {
            root.set_long("y", 2)?;
            Err(DocError::updater("boom"))
        })
        .unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert_eq!(doc.marshal(), r#"{"x":1}"#);
    assert_eq!(doc.internal().local_changes().len(), 1);
}

#[test]
fn size_limit_rejects_the_commit() {
    let mut doc = Document::with_options(
        DocumentKey::parse("s3").unwrap(),
        DocumentOptions {
            max_size_limit: 8,
            ..DocumentOptions::default()
        },
    );
    doc.set_actor(ActorId::random());

    let err = doc
        .update(|root, _| root.set_string("k", "12345678"))
        .unwrap_err();

    assert!(matches!(err, DocError::DocumentSizeExceedsLimit));
    assert_eq!(doc.marshal(), "{}");
    assert!(!doc.has_local_changes());
}

#[test]
fn remote_changes_converge() {
    let mut a = new_doc("s4");
    let mut b = new_doc("s4");

    a.update(|root, _| root.set_long("a", 1)).unwrap();
    b.update(|root, _| root.set_long("b", 2)).unwrap();

    b.apply_change_pack(&a.create_change_pack()).unwrap();
    a.apply_change_pack(&b.create_change_pack()).unwrap();

    assert_eq!(a.marshal(), r#"{"a":1,"b":2}"#);
    assert_eq!(a.marshal(), b.marshal());
}

#[test]
fn checkpoint_truncates_acked_changes() {
    let mut doc = new_doc("s5");
    for n in 1..=3 {
        doc.update(|root, _| root.set_long("n", n)).unwrap();
    }
    let seqs: Vec<u32> = doc
        .internal()
        .local_changes()
        .iter()
        .map(|c| c.client_seq())
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    let pack = ChangePack::new(
        doc.key().clone(),
        Checkpoint::new(3, 2),
        vec![],
        None,
        VersionVector::new(),
        false,
    );
    doc.apply_change_pack(&pack).unwrap();

    let seqs: Vec<u32> = doc
        .internal()
        .local_changes()
        .iter()
        .map(|c| c.client_seq())
        .collect();
    assert_eq!(seqs, vec![3]);
    assert_eq!(doc.checkpoint(), Checkpoint::new(3, 2));
}

#[test]
fn removal_is_terminal() {
    let mut doc = new_doc("s6");
    doc.update(|root, _| root.set_long("x", 1)).unwrap();

    let remove_pack = ChangePack::new(
        doc.key().clone(),
        Checkpoint::new(1, 1),
        vec![],
        None,
        VersionVector::new(),
        true,
    );
    doc.apply_change_pack(&remove_pack).unwrap();
    assert_eq!(doc.status(), DocStatus::Removed);

    let err = doc.update(|root, _| root.set_long("y", 2)).unwrap_err();
    assert!(matches!(err, DocError::DocumentRemoved));

    // Reconciliation still advances the checkpoint after removal.
    let later_pack = ChangePack::new(
        doc.key().clone(),
        Checkpoint::new(5, 1),
        vec![],
        None,
        VersionVector::new(),
        false,
    );
    doc.apply_change_pack(&later_pack).unwrap();
    assert_eq!(doc.checkpoint(), Checkpoint::new(5, 1));
    assert_eq!(doc.status(), DocStatus::Removed);

    let err = doc.update(|root, _| root.set_long("y", 2)).unwrap_err();
    assert!(matches!(err, DocError::DocumentRemoved));
}

#[test]
fn checkpoint_never_regresses() {
    let mut doc = new_doc("cp");
    let forward = ChangePack::new(
        doc.key().clone(),
        Checkpoint::new(9, 0),
        vec![],
        None,
        VersionVector::new(),
        false,
    );
    doc.apply_change_pack(&forward).unwrap();

    let stale = ChangePack::new(
        doc.key().clone(),
        Checkpoint::new(2, 0),
        vec![],
        None,
        VersionVector::new(),
        false,
    );
    doc.apply_change_pack(&stale).unwrap();
    assert_eq!(doc.checkpoint(), Checkpoint::new(9, 0));
}

#[test]
fn presence_flows_between_replicas() {
    let mut a = new_doc("presence");
    let mut b = new_doc("presence");

    b.update(|_, presence| {
        presence.set("cursor", "7");
        Ok(())
    })
    .unwrap();

    // Watch the peer first, then drain its Watched event.
    let events = a.events();
    a.apply_watched(b.actor_id());
    events.recv().unwrap();

    a.apply_change_pack(&b.create_change_pack()).unwrap();
    let event = events.recv().unwrap();
    assert_eq!(event.kind, estuary_core::DocEventKind::PresenceChanged);

    let presence = a.presence(&b.actor_id()).unwrap();
    assert_eq!(presence.get("cursor").map(String::as_str), Some("7"));

    // Offline peers are invisible through the online-filtered accessors.
    a.apply_unwatched(b.actor_id());
    events.recv().unwrap();
    assert!(a.presence(&b.actor_id()).is_none());
    assert!(a.presence_for_test(&b.actor_id()).is_some());
    assert!(a.presences().is_empty());
    assert_eq!(a.all_presences().len(), 1);
}

#[test]
fn garbage_collection_runs_on_pack_apply() {
    let mut a = new_doc("gc");
    let mut b = new_doc("gc");

    a.update(|root, _| root.set_long("x", 1)).unwrap();
    a.update(|root, _| root.remove("x")).unwrap();
    assert_eq!(a.garbage_len(), 1);

    b.apply_change_pack(&a.create_change_pack()).unwrap();
    // The pack's vector proves the sender saw the removal; with only one
    // writer in the vector the tombstone is collectible immediately.
    assert_eq!(b.garbage_len(), 0);
    assert_eq!(b.marshal(), "{}");
}

#[test]
fn disable_gc_keeps_tombstones() {
    let mut a = new_doc("gc-off");
    let mut b = Document::with_options(
        DocumentKey::parse("gc-off").unwrap(),
        DocumentOptions {
            disable_gc: true,
            ..DocumentOptions::default()
        },
    );
    b.set_actor(ActorId::random());

    a.update(|root, _| root.set_long("x", 1)).unwrap();
    a.update(|root, _| root.remove("x")).unwrap();

    b.apply_change_pack(&a.create_change_pack()).unwrap();
    assert_eq!(b.garbage_len(), 1);

    // The host can still drive GC explicitly.
    let purged = b.garbage_collect(&a.version_vector());
    assert_eq!(purged, 1);
    assert_eq!(b.garbage_len(), 0);
}
