//! Transport contract consumed by the save coordinator.
//!
//! A transport turns a fully merged [`Request`] into a [`RequestHandle`]
//! without blocking. The outcome is delivered later by whoever drives the
//! transport, through [`Model::settle`](crate::Model::settle).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Content type attached to structured request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Abstract persistence method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Create,
    Update,
    Patch,
    Delete,
    Read,
}

impl Method {
    /// Wire verb for this method.
    #[must_use]
    pub const fn verb(self) -> Verb {
        match self {
            Self::Create => Verb::Post,
            Self::Update => Verb::Put,
            Self::Patch => Verb::Patch,
            Self::Delete => Verb::Delete,
            Self::Read => Verb::Get,
        }
    }

    /// Whether requests for this method carry the model as a body.
    #[must_use]
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Patch => write!(f, "patch"),
            Self::Delete => write!(f, "delete"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// HTTP-style wire verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Post,
    Put,
    Patch,
    Delete,
    Get,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
            Self::Get => write!(f, "GET"),
        }
    }
}

/// Identifier a transport assigns to each dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Merged request configuration handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub verb: Verb,
    pub url: String,

    /// Serialized body, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Expected response format.
    pub data_type: String,

    /// When true, caller data is encoded into the query string instead of
    /// being sent as a raw body. Only GET requests process data.
    pub process_data: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Body parsed back into JSON, if there is one.
    #[must_use]
    pub fn json_body(&self) -> Option<Value> {
        self.body.as_deref().and_then(|body| serde_json::from_str(body).ok())
    }
}

/// Handle to an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHandle {
    pub id: RequestId,
    pub verb: Verb,
    pub url: String,
}

impl RequestHandle {
    /// Create a handle for a request the transport has accepted.
    #[must_use]
    pub fn new(id: RequestId, request: &Request) -> Self {
        Self {
            id,
            verb: request.verb,
            url: request.url.clone(),
        }
    }
}

/// Transport-level failure, delivered at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP-like status code, when the failure has one.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Outcome of a request as reported by the transport.
pub type Outcome = std::result::Result<Value, TransportError>;

/// Dispatches requests on behalf of models.
///
/// Implementations must not block waiting for a response and must not call
/// back into the model; completion is reported through `Model::settle`.
/// Retries, if any, belong to the implementation.
pub trait Transport {
    /// Accept a request and return its handle.
    fn dispatch(&self, request: Request) -> RequestHandle;
}

/// A recording transport for testing.
pub mod mock {
    use super::{Request, RequestHandle, RequestId, Transport};
    use std::cell::{Cell, RefCell};

    /// Records every request and hands out sequential ids starting at 1.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        next_id: Cell<u64>,
        requests: RefCell<Vec<(RequestId, Request)>>,
    }

    impl RecordingTransport {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All requests dispatched so far, oldest first.
        #[must_use]
        pub fn requests(&self) -> Vec<(RequestId, Request)> {
            self.requests.borrow().clone()
        }

        /// The most recently dispatched request.
        #[must_use]
        pub fn last(&self) -> Option<Request> {
            self.requests.borrow().last().map(|(_, request)| request.clone())
        }

        #[must_use]
        pub fn len(&self) -> usize {
            self.requests.borrow().len()
        }

        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.requests.borrow().is_empty()
        }
    }

    impl Transport for RecordingTransport {
        fn dispatch(&self, request: Request) -> RequestHandle {
            let id = RequestId(self.next_id.get() + 1);
            self.next_id.set(id.0);
            let handle = RequestHandle::new(id, &request);
            self.requests.borrow_mut().push((id, request));
            handle
        }
    }
}
