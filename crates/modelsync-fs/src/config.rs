//! Store configuration.

use modelsync_core::{Operation, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store configuration stored in `.modelsync/config.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Configuration version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Store settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Per-collection model settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelSettings>,
}

fn default_version() -> u32 {
    1
}

/// Store-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store name.
    #[serde(default)]
    pub name: Option<String>,
}

/// How models of one collection are tracked and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Identity field.
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,

    /// Fields excluded per operation.
    #[serde(default)]
    pub excluded: ExcludedFields,

    /// Fields that never qualify a save for a partial payload.
    #[serde(default)]
    pub patch_fields: Vec<String>,
}

fn default_id_attribute() -> String {
    "id".to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            id_attribute: default_id_attribute(),
            excluded: ExcludedFields::default(),
            patch_fields: Vec::new(),
        }
    }
}

/// Excluded-field lists keyed by operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludedFields {
    #[serde(default)]
    pub set: Vec<String>,
    #[serde(default)]
    pub save: Vec<String>,
    #[serde(default)]
    pub fetch: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            store: StoreSettings::default(),
            models: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Create a new config with the given store name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            store: StoreSettings {
                name: Some(name.into()),
            },
            ..Default::default()
        }
    }

    /// Settings for `collection`, falling back to defaults.
    #[must_use]
    pub fn model(&self, collection: &str) -> ModelSettings {
        self.models.get(collection).cloned().unwrap_or_default()
    }

    /// Identity field used for `collection`.
    #[must_use]
    pub fn id_attribute(&self, collection: &str) -> String {
        self.models
            .get(collection)
            .map_or_else(default_id_attribute, |m| m.id_attribute.clone())
    }
}

impl ModelSettings {
    /// Build a core schema addressing `/<collection>`.
    #[must_use]
    pub fn schema(&self, collection: &str) -> Schema {
        let patch_fields = self.patch_fields.clone();
        Schema::new()
            .with_id_attribute(self.id_attribute.clone())
            .with_url_root(format!("/{collection}"))
            .exclude(Operation::Set, self.excluded.set.clone())
            .exclude(Operation::Save, self.excluded.save.clone())
            .exclude(Operation::Fetch, self.excluded.fetch.clone())
            .with_patch_fields(move |_, _| patch_fields.clone())
    }
}
