//! Local transport: executes model requests against a [`Store`].
//!
//! Requests are carried out at dispatch time but their outcomes are queued;
//! the caller drains the queue and settles each model, which keeps the
//! settlement boundary identical to a remote transport.

use crate::error::{Result, StoreError};
use crate::store::Store;
use modelsync_core::{Outcome, Request, RequestHandle, RequestId, Transport, TransportError, Verb};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use tracing::debug;

/// Transport backed by a local store.
#[derive(Debug)]
pub struct LocalTransport {
    store: Store,
    next_id: Cell<u64>,
    completed: RefCell<VecDeque<(RequestId, Outcome)>>,
}

impl LocalTransport {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            next_id: Cell::new(0),
            completed: RefCell::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Take every outcome queued since the last drain, in dispatch order.
    pub fn drain(&self) -> Vec<(RequestId, Outcome)> {
        self.completed.borrow_mut().drain(..).collect()
    }

    /// Number of outcomes waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.completed.borrow().len()
    }

    /// Carry out a request against the store.
    ///
    /// # Errors
    /// Returns the store error for unroutable URLs, bad bodies or missing documents.
    pub fn execute(&self, request: &Request) -> Result<Value> {
        let (collection, id) = parse_resource_url(&request.url)?;

        match (request.verb, id) {
            (Verb::Get, None) => Ok(Value::Array(self.store.list(collection)?)),
            (Verb::Get, Some(id)) => self.store.read(collection, id),
            (Verb::Post, None) => self.store.create(collection, body(request)?),
            (Verb::Put, Some(id)) => self.store.update(collection, id, body(request)?),
            (Verb::Patch, Some(id)) => self.store.merge(collection, id, &body(request)?),
            (Verb::Delete, Some(id)) => {
                self.store.delete(collection, id)?;
                Ok(Value::Object(serde_json::Map::new()))
            }
            _ => Err(StoreError::InvalidUrl(format!(
                "{} not supported on {}",
                request.verb, request.url
            ))),
        }
    }
}

impl Transport for LocalTransport {
    fn dispatch(&self, request: Request) -> RequestHandle {
        let id = RequestId(self.next_id.get() + 1);
        self.next_id.set(id.0);

        let outcome = self
            .execute(&request)
            .map_err(|e| TransportError::new(Some(e.status()), e.to_string()));
        debug!(id = %id, verb = %request.verb, url = %request.url, ok = outcome.is_ok(), "Executed local request");

        self.completed.borrow_mut().push_back((id, outcome));
        RequestHandle::new(id, &request)
    }
}

/// Split `/<collection>[/<id>]` into its parts.
fn parse_resource_url(url: &str) -> Result<(&str, Option<&str>)> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    match (segments.next(), segments.next(), segments.next()) {
        (Some(collection), id, None) => Ok((collection, id)),
        _ => Err(StoreError::InvalidUrl(url.to_string())),
    }
}

fn body(request: &Request) -> Result<Value> {
    request
        .json_body()
        .ok_or_else(|| StoreError::InvalidDocument("missing or malformed JSON body".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_url() {
        assert_eq!(parse_resource_url("/notes").unwrap(), ("notes", None));
        assert_eq!(parse_resource_url("/notes/n1").unwrap(), ("notes", Some("n1")));
        assert_eq!(parse_resource_url("notes/n1/?x=1").unwrap(), ("notes", Some("n1")));
        assert!(parse_resource_url("/").is_err());
        assert!(parse_resource_url("/a/b/c").is_err());
    }
}
