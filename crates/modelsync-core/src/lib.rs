//! modelsync-core: change tracking and persistence synchronization for client-side models.
//!
//! This crate provides:
//! - `Model`: a tracked record with current, last-persisted and dirty attribute sets
//! - The change tracker (`Model::set`) with per-field and coalesced batch notifications
//! - The save coordinator (`Model::save`, `Model::fetch`, `Model::sync`, `Model::settle`)
//! - `Schema`: the hooks a model type plugs in (validation, exclusions, transforms, parsing, URLs)
//! - The `Transport` contract and a recording transport for tests

pub mod error;
pub mod event;
pub mod model;
pub mod options;
pub mod patch;
pub mod save;
pub mod schema;
pub mod transport;

pub use error::{CoreError, Result};
pub use event::{Event, Handler, ListenerId};
pub use model::Model;
pub use options::{ErrorCallback, FetchOptions, RequestOptions, SaveOptions, SetOptions, SuccessCallback};
pub use patch::{apply_merge_patch, diff_keys, difference, extend, omit, to_attributes, Attributes};
pub use save::Settled;
pub use schema::{FieldPolicy, Operation, Schema, UrlPolicy};
pub use transport::{
    Method, Outcome, Request, RequestHandle, RequestId, Transport, TransportError, Verb,
    JSON_CONTENT_TYPE,
};
