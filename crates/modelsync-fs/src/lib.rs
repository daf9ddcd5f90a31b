//! Filesystem resource store for modelsync.
//!
//! Stores resources as JSON documents under:
//! - `.modelsync/config.yml`: Store and per-collection model settings
//! - `resources/<collection>/<id>.json`: One document per resource
//!
//! `LocalTransport` serves model requests from the store so models can be
//! saved and fetched without a network.

pub mod config;
pub mod error;
pub mod store;
pub mod transport;

pub use config::{ExcludedFields, ModelSettings, StoreConfig};
pub use error::{Result, StoreError};
pub use store::Store;
pub use transport::LocalTransport;
