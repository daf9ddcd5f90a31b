//! Lifecycle notifications and listener registry.

use crate::model::Model;
use crate::options::SetOptions;
use crate::transport::{Method, RequestHandle, TransportError};
use serde_json::Value;
use std::borrow::Cow;
use std::rc::Rc;

/// Notification handler. Receives the emitting model mutably so it may call
/// back into `set`.
pub type Handler = Rc<dyn Fn(&mut Model, &Event)>;

/// A notification emitted by a model.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `change:<attr>`: one field changed value. `value` is `None` after an unset.
    AttributeChanged {
        attr: String,
        value: Option<Value>,
        options: SetOptions,
    },
    /// `change`: coalesced notification for one batch.
    Changed { options: SetOptions },
    /// `before:create`
    BeforeCreate { payload: Option<Value> },
    /// `before:update`
    BeforeUpdate { payload: Option<Value> },
    /// `before:save`
    BeforeSave {
        method: Method,
        payload: Option<Value>,
    },
    /// `request`: emitted right after dispatch.
    Request {
        handle: RequestHandle,
        payload: Option<Value>,
    },
    /// `sync`: the server state was merged.
    Sync {
        response: Value,
        payload: Option<Value>,
    },
    /// `error`: the transport reported a failure.
    Error {
        error: TransportError,
        payload: Option<Value>,
    },
}

impl Event {
    /// Name handlers are registered under.
    #[must_use]
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::AttributeChanged { attr, .. } => Cow::Owned(format!("change:{attr}")),
            Self::Changed { .. } => Cow::Borrowed("change"),
            Self::BeforeCreate { .. } => Cow::Borrowed("before:create"),
            Self::BeforeUpdate { .. } => Cow::Borrowed("before:update"),
            Self::BeforeSave { .. } => Cow::Borrowed("before:save"),
            Self::Request { .. } => Cow::Borrowed("request"),
            Self::Sync { .. } => Cow::Borrowed("sync"),
            Self::Error { .. } => Cow::Borrowed("error"),
        }
    }
}

/// Token returned by `on`, used to remove a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Handlers keyed by event name, kept in registration order.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, String, Handler)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, name: impl Into<String>, handler: Handler) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, name.into(), handler));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _, _)| *entry != id);
        self.entries.len() != before
    }

    /// Snapshot of the handlers for `name`, so emission is unaffected by
    /// handlers registering or removing listeners.
    pub(crate) fn matching(&self, name: &str) -> Vec<Handler> {
        self.entries
            .iter()
            .filter(|(_, entry, _)| entry == name)
            .map(|(_, _, handler)| Rc::clone(handler))
            .collect()
    }
}
