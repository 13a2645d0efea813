//! Layer 8: Mutation proxies
//!
//! The values an updater closure sees. Each write goes two places at once:
//! it mutates the working clone, and it records the operation (with a fresh
//! ticket) into the session's change context.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::ChangeContext;
use crate::error::DocError;
use crate::operation::{OpValue, Operation};
use crate::presence::{PresenceChange, PresenceData};
use crate::root::{Element, Root};
use crate::value::Value;

/// A container of the working clone, scoped to one path.
pub struct JsonObject<'a> {
    ctx: Rc<RefCell<ChangeContext>>,
    root: &'a mut Root,
    path: Vec<String>,
}

impl<'a> JsonObject<'a> {
    pub(crate) fn new(
        ctx: Rc<RefCell<ChangeContext>>,
        root: &'a mut Root,
        path: Vec<String>,
    ) -> Self {
        Self { ctx, root, path }
    }

    fn record_set(&mut self, key: &str, value: OpValue) -> Result<(), DocError> {
        let mut ctx = self.ctx.borrow_mut();
        let op = Operation::Set {
            path: self.path.clone(),
            key: key.to_string(),
            value,
            executed_at: ctx.issue_ticket(),
        };
        self.root.execute(&op)?;
        ctx.push(op);
        Ok(())
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<(), DocError> {
        self.record_set(key, OpValue::Scalar(Value::Str(value.into())))
    }

    pub fn set_long(&mut self, key: &str, value: i64) -> Result<(), DocError> {
        self.record_set(key, OpValue::Scalar(Value::Long(value)))
    }

    pub fn set_double(&mut self, key: &str, value: f64) -> Result<(), DocError> {
        self.record_set(key, OpValue::Scalar(Value::Double(value)))
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> Result<(), DocError> {
        self.record_set(key, OpValue::Scalar(Value::Bool(value)))
    }

    pub fn set_null(&mut self, key: &str) -> Result<(), DocError> {
        self.record_set(key, OpValue::Scalar(Value::Null))
    }

    /// Create (or take over) a nested container and return a proxy scoped
    /// to it.
    pub fn set_object(&mut self, key: &str) -> Result<JsonObject<'_>, DocError> {
        self.record_set(key, OpValue::Object)?;
        let mut path = self.path.clone();
        path.push(key.to_string());
        Ok(JsonObject::new(Rc::clone(&self.ctx), &mut *self.root, path))
    }

    pub fn remove(&mut self, key: &str) -> Result<(), DocError> {
        let mut ctx = self.ctx.borrow_mut();
        let op = Operation::Remove {
            path: self.path.clone(),
            key: key.to_string(),
            executed_at: ctx.issue_ticket(),
        };
        self.root.execute(&op)?;
        ctx.push(op);
        Ok(())
    }

    /// The live scalar under `key`, if any.
    pub fn value(&self, key: &str) -> Option<Value> {
        match self.root.navigate(&self.path).ok()?.get_live(key)? {
            Element::Primitive(v) => Some(v.clone()),
            Element::Object(_) => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.root
            .navigate(&self.path)
            .ok()
            .and_then(|node| node.get_live(key))
            .is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.root
            .navigate(&self.path)
            .map(|node| node.live_keys().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// The updater's handle on its own presence slot.
pub struct Presence<'a> {
    ctx: Rc<RefCell<ChangeContext>>,
    data: &'a mut PresenceData,
}

impl<'a> Presence<'a> {
    pub(crate) fn new(ctx: Rc<RefCell<ChangeContext>>, data: &'a mut PresenceData) -> Self {
        Self { ctx, data }
    }

    /// Write one presence key. The recorded change carries the whole
    /// resulting map, so the latest change fully describes the slot.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
        self.ctx
            .borrow_mut()
            .set_presence_change(PresenceChange::Put {
                presence: self.data.clone(),
            });
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.ctx
            .borrow_mut()
            .set_presence_change(PresenceChange::Clear);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}
