//! Layer 9: Document façade
//!
//! The surface a host program holds: the staged update pipeline over a
//! working clone, change-pack reconciliation against the server, and the
//! event/broadcast channels.
//!
//! How updates work: the updater closure runs against a clone of the
//! canonical tree, recording operations as it goes. Only after the clone
//! passes schema and size checks does the recorded change execute against
//! the canonical state. A failure at any earlier stage discards the clone
//! and leaves the canonical state untouched.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crossbeam::channel::{bounded, Receiver, Sender};
use serde::Serialize;
use tracing::debug;

use crate::change::Change;
use crate::checkpoint::Checkpoint;
use crate::context::ChangeContext;
use crate::error::DocError;
use crate::event::{BroadcastEventHandler, BroadcastRequest, DocEvent, DocEventKind};
use crate::identity::{ActorId, DocumentKey};
use crate::internal::{DocStatus, InternalDocument};
use crate::json::{JsonObject, Presence};
use crate::pack::ChangePack;
use crate::presence::{PresenceData, PresenceMap};
use crate::resource::DocSize;
use crate::root::Root;
use crate::schema::{self, Rule};
use crate::time::VersionVector;

/// How a document is set up.
#[derive(Clone, Debug, Default)]
pub struct DocumentOptions {
    /// Never run GC from `apply_change_pack`; the host drives it instead.
    pub disable_gc: bool,
    /// Maximum live document size in bytes; 0 means unlimited.
    pub max_size_limit: usize,
    /// Schema rules checked before every non-presence commit.
    pub schema_rules: Vec<Rule>,
}

/// A document accessible to the user.
pub struct Document {
    doc: InternalDocument,
    options: DocumentOptions,

    // Working copies of the canonical state, lent to updaters. `None`
    // after any failed update; rebuilt on demand.
    clone_root: Option<Root>,
    clone_presences: Option<PresenceMap>,

    events_tx: Sender<DocEvent>,
    events_rx: Receiver<DocEvent>,
    broadcast_req_tx: Sender<BroadcastRequest>,
    broadcast_req_rx: Receiver<BroadcastRequest>,
    broadcast_res_tx: Sender<Result<(), DocError>>,
    broadcast_res_rx: Receiver<Result<(), DocError>>,
    broadcast_event_handlers: BTreeMap<String, BroadcastEventHandler>,
}

impl Document {
    pub fn new(key: DocumentKey) -> Self {
        Self::with_options(key, DocumentOptions::default())
    }

    pub fn with_options(key: DocumentKey, options: DocumentOptions) -> Self {
        let (events_tx, events_rx) = bounded(1);
        let (broadcast_req_tx, broadcast_req_rx) = bounded(1);
        let (broadcast_res_tx, broadcast_res_rx) = bounded(1);
        Self {
            doc: InternalDocument::new(key),
            options,
            clone_root: None,
            clone_presences: None,
            events_tx,
            events_rx,
            broadcast_req_tx,
            broadcast_req_rx,
            broadcast_res_tx,
            broadcast_res_rx,
            broadcast_event_handlers: BTreeMap::new(),
        }
    }

    /// Run one mutation session. See the module doc for the staging.
    pub fn update<F>(&mut self, updater: F) -> Result<(), DocError>
    where
        F: FnOnce(&mut JsonObject<'_>, &mut Presence<'_>) -> Result<(), DocError>,
    {
        self.update_with_message("", updater)
    }

    pub fn update_with_message<F>(&mut self, message: &str, updater: F) -> Result<(), DocError>
    where
        F: FnOnce(&mut JsonObject<'_>, &mut Presence<'_>) -> Result<(), DocError>,
    {
        if self.doc.status() == DocStatus::Removed {
            return Err(DocError::DocumentRemoved);
        }

        self.ensure_clone();
        let actor = self.doc.actor_id();
        let ctx = Rc::new(RefCell::new(ChangeContext::new(
            *self.doc.change_id(),
            message,
        )));

        {
            let clone_root = self.clone_root.as_mut().expect("clone ensured");
            let clone_presences = self.clone_presences.as_mut().expect("clone ensured");
            let slot = clone_presences.load_or_store(actor);
            let mut root_proxy = JsonObject::new(Rc::clone(&ctx), clone_root, Vec::new());
            let mut presence_proxy = Presence::new(Rc::clone(&ctx), slot);
            if let Err(err) = updater(&mut root_proxy, &mut presence_proxy) {
                return Err(self.discard_clones(err));
            }
        }
        let ctx = Rc::try_unwrap(ctx)
            .ok()
            .expect("proxies dropped with the session")
            .into_inner();

        if !ctx.is_presence_only_change() && !self.options.schema_rules.is_empty() {
            let clone_root = self.clone_root.as_ref().expect("clone ensured");
            let result = schema::validate(clone_root, &self.options.schema_rules);
            if !result.valid {
                let joined = result
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(self.discard_clones(DocError::SchemaValidationFailed(joined)));
            }
        }

        if !ctx.is_presence_only_change() && self.options.max_size_limit > 0 {
            let size = self.clone_root.as_ref().expect("clone ensured").doc_size();
            if size.total() > self.options.max_size_limit {
                return Err(self.discard_clones(DocError::DocumentSizeExceedsLimit));
            }
        }

        if ctx.has_change() {
            let next = ctx.next_id();
            let change = ctx.to_change();
            if let Err(err) = self.doc.commit(next, change) {
                return Err(self.discard_clones(err));
            }
        }

        Ok(())
    }

    /// Apply one server round-trip: remote changes or a snapshot, then
    /// local-log truncation, checkpoint advance, GC, and removal status.
    pub fn apply_change_pack(&mut self, pack: &ChangePack) -> Result<(), DocError> {
        let has_snapshot = pack.has_snapshot();
        debug!(
            key = %self.doc.key(),
            changes = pack.changes_len(),
            snapshot = has_snapshot,
            "applying change pack"
        );

        // 01. Remote state into both the clone and the canonical document.
        if has_snapshot {
            self.clone_root = None;
            self.clone_presences = None;
            let bytes = pack.snapshot.as_deref().expect("has_snapshot checked");
            self.doc.apply_snapshot(bytes, &pack.version_vector)?;
        } else {
            self.apply_changes(&pack.changes)?;
        }

        // 02. Drop local changes the server has acknowledged.
        self.doc.truncate_acked(pack.checkpoint.client_seq);

        // 03. A snapshot replaced the tree wholesale; unacked local edits
        // must be replayed on top of it.
        if has_snapshot {
            let surviving = self.doc.local_changes().to_vec();
            self.apply_changes(&surviving)?;
        }

        // 04. Checkpoint only moves forward.
        self.doc.forward_checkpoint(&pack.checkpoint);

        // 05. The pack's vector proves what every replica has seen.
        if !self.options.disable_gc && !has_snapshot {
            self.garbage_collect(&pack.version_vector);
        }

        // 06. Removal is terminal.
        if pack.is_removed {
            self.doc.set_status(DocStatus::Removed);
        }

        Ok(())
    }

    fn apply_changes(&mut self, changes: &[Change]) -> Result<(), DocError> {
        self.ensure_clone();
        {
            let clone_root = self.clone_root.as_mut().expect("clone ensured");
            let clone_presences = self.clone_presences.as_mut().expect("clone ensured");
            for change in changes {
                if let Err(err) = change.execute(clone_root, clone_presences) {
                    return Err(self.discard_clones(err.into()));
                }
            }
        }

        let events = match self.doc.apply_changes(changes) {
            Ok(events) => events,
            // The clone has already executed these changes; it no longer
            // matches the canonical state and must be rebuilt.
            Err(err) => return Err(self.discard_clones(err)),
        };
        for event in events {
            self.events_tx
                .send(event)
                .expect("document holds the event receiver");
        }
        Ok(())
    }

    fn ensure_clone(&mut self) {
        if self.clone_root.is_none() {
            self.clone_root = Some(self.doc.root().deep_copy());
        }
        if self.clone_presences.is_none() {
            self.clone_presences = Some(self.doc.presences().deep_copy());
        }
    }

    fn discard_clones(&mut self, err: DocError) -> DocError {
        self.clone_root = None;
        self.clone_presences = None;
        err
    }

    /// A proxy over the working clone for inspection outside an update.
    /// Writes through it touch only the clone and are never committed.
    pub fn root(&mut self) -> JsonObject<'_> {
        self.ensure_clone();
        let ctx = Rc::new(RefCell::new(ChangeContext::new(*self.doc.change_id(), "")));
        JsonObject::new(
            ctx,
            self.clone_root.as_mut().expect("clone ensured"),
            Vec::new(),
        )
    }

    /// Purge tombstones covered by `vector`, on the clone first so it
    /// stays in lockstep, then canonically. Returns the canonical count.
    pub fn garbage_collect(&mut self, vector: &VersionVector) -> usize {
        if let Some(clone_root) = self.clone_root.as_mut() {
            clone_root.garbage_collect(vector);
        }
        let purged = self.doc.garbage_collect(vector);
        if purged > 0 {
            debug!(key = %self.doc.key(), purged, "garbage collected");
        }
        purged
    }

    // -- pass-through accessors --------------------------------------------

    pub fn key(&self) -> &DocumentKey {
        self.doc.key()
    }

    pub fn status(&self) -> DocStatus {
        self.doc.status()
    }

    pub fn set_status(&mut self, status: DocStatus) {
        self.doc.set_status(status);
    }

    pub fn is_attached(&self) -> bool {
        self.doc.is_attached()
    }

    pub fn actor_id(&self) -> ActorId {
        self.doc.actor_id()
    }

    /// Assign the replica identity; pending local changes follow.
    pub fn set_actor(&mut self, actor: ActorId) {
        self.doc.set_actor(actor);
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.doc.checkpoint()
    }

    pub fn version_vector(&self) -> VersionVector {
        self.doc.version_vector()
    }

    pub fn has_local_changes(&self) -> bool {
        self.doc.has_local_changes()
    }

    pub fn create_change_pack(&self) -> ChangePack {
        self.doc.create_change_pack()
    }

    pub fn marshal(&self) -> String {
        self.doc.marshal()
    }

    pub fn doc_size(&self) -> DocSize {
        self.doc.doc_size()
    }

    pub fn garbage_len(&self) -> usize {
        self.doc.garbage_len()
    }

    pub fn internal(&self) -> &InternalDocument {
        &self.doc
    }

    // -- presence ----------------------------------------------------------

    pub fn my_presence(&self) -> Option<PresenceData> {
        self.doc.my_presence()
    }

    pub fn presence(&self, actor: &ActorId) -> Option<PresenceData> {
        self.doc.presence(actor)
    }

    pub fn presence_for_test(&self, actor: &ActorId) -> Option<PresenceData> {
        self.doc.presence_for_test(actor)
    }

    pub fn presences(&self) -> BTreeMap<ActorId, PresenceData> {
        self.doc.presences_of_online()
    }

    pub fn all_presences(&self) -> BTreeMap<ActorId, PresenceData> {
        self.doc.all_presences()
    }

    pub fn set_online_clients(&mut self, actors: impl IntoIterator<Item = ActorId>) {
        self.doc.set_online_clients(actors);
    }

    pub fn add_online_client(&mut self, actor: ActorId) {
        self.doc.add_online_client(actor);
    }

    pub fn remove_online_client(&mut self, actor: &ActorId) {
        self.doc.remove_online_client(actor);
    }

    /// A peer's watch stream came up: mark it online and surface the event.
    pub fn apply_watched(&mut self, actor: ActorId) {
        self.doc.add_online_client(actor);
        let presence = self.doc.presence_for_test(&actor).unwrap_or_default();
        self.events_tx
            .send(DocEvent::single(DocEventKind::Watched, actor, presence))
            .expect("document holds the event receiver");
    }

    /// A peer's watch stream went away: mark it offline and surface the event.
    pub fn apply_unwatched(&mut self, actor: ActorId) {
        self.doc.remove_online_client(&actor);
        let presence = self.doc.presence_for_test(&actor).unwrap_or_default();
        self.events_tx
            .send(DocEvent::single(DocEventKind::Unwatched, actor, presence))
            .expect("document holds the event receiver");
    }

    // -- events & broadcast ------------------------------------------------

    /// The document's event stream. Buffer of one: drain it, or remote
    /// change application stalls.
    pub fn events(&self) -> Receiver<DocEvent> {
        self.events_rx.clone()
    }

    /// The host side of broadcasting: requests to deliver.
    pub fn broadcast_requests(&self) -> Receiver<BroadcastRequest> {
        self.broadcast_req_rx.clone()
    }

    /// The host side of broadcasting: where delivery outcomes are posted,
    /// exactly one per request.
    pub fn broadcast_responses(&self) -> Sender<Result<(), DocError>> {
        self.broadcast_res_tx.clone()
    }

    /// Encode `payload` and hand it to the host for delivery; blocks until
    /// the host posts the outcome.
    pub fn broadcast<T>(&self, topic: &str, payload: &T) -> Result<(), DocError>
    where
        T: Serialize + ?Sized,
    {
        let encoded =
            serde_json::to_vec(payload).map_err(|_| DocError::UnsupportedPayloadType)?;
        self.broadcast_req_tx
            .send(BroadcastRequest {
                topic: topic.to_string(),
                payload: encoded,
            })
            .map_err(|_| DocError::BroadcastClosed)?;
        self.broadcast_res_rx
            .recv()
            .map_err(|_| DocError::BroadcastClosed)?
    }

    /// Register a handler for host-delivered broadcasts on `topic`.
    pub fn subscribe_broadcast_event(&mut self, topic: impl Into<String>, handler: BroadcastEventHandler) {
        self.broadcast_event_handlers.insert(topic.into(), handler);
    }

    pub fn unsubscribe_broadcast_event(&mut self, topic: &str) {
        self.broadcast_event_handlers.remove(topic);
    }

    pub fn broadcast_event_handlers(&self) -> &BTreeMap<String, BroadcastEventHandler> {
        &self.broadcast_event_handlers
    }
}
