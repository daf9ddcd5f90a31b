//! Store management and resource operations.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use modelsync_core::{apply_merge_patch, extend, Schema};
use serde_json::Value;
use slug::slugify;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Directory name for modelsync configuration.
const MODELSYNC_DIR: &str = ".modelsync";
/// Configuration file name.
const CONFIG_FILE: &str = "config.yml";
/// Resources directory name.
const RESOURCES_DIR: &str = "resources";
/// Extension of stored documents.
const DOCUMENT_EXT: &str = "json";

/// A store keeps collections of JSON documents on the filesystem.
#[derive(Debug, Clone)]
pub struct Store {
    /// Root path of the store.
    root: PathBuf,
    /// Store configuration.
    config: StoreConfig,
}

impl Store {
    /// Initialize a new store at the given path.
    ///
    /// # Errors
    /// Returns error if the store already exists or IO fails.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        Self::init_with(path, StoreConfig::default())
    }

    /// Initialize a new store with an explicit configuration.
    ///
    /// # Errors
    /// Returns error if the store already exists or IO fails.
    pub fn init_with(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let modelsync_dir = root.join(MODELSYNC_DIR);

        if modelsync_dir.exists() {
            return Err(StoreError::StoreExists(root));
        }

        fs::create_dir_all(&modelsync_dir)?;
        fs::create_dir_all(root.join(RESOURCES_DIR))?;
        fs::write(modelsync_dir.join(CONFIG_FILE), serde_yaml::to_string(&config)?)?;

        info!(path = %root.display(), "Initialized store");

        Ok(Self { root, config })
    }

    /// Open an existing store at the given path.
    ///
    /// # Errors
    /// Returns error if the store doesn't exist or config is invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let config_path = root.join(MODELSYNC_DIR).join(CONFIG_FILE);

        if !config_path.exists() {
            return Err(StoreError::StoreNotFound(root));
        }

        let config: StoreConfig = serde_yaml::from_str(&fs::read_to_string(&config_path)?)?;

        debug!(path = %root.display(), "Opened store");

        Ok(Self { root, config })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Core schema for models of `collection`, built from the configuration.
    #[must_use]
    pub fn schema(&self, collection: &str) -> Schema {
        self.config.model(collection).schema(collection)
    }

    fn collection_dir(&self, collection: &str) -> Result<PathBuf> {
        if collection.is_empty() || slugify(collection) != collection {
            return Err(StoreError::InvalidCollection(collection.to_string()));
        }
        Ok(self.root.join(RESOURCES_DIR).join(collection))
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && !id.chars().any(char::is_control);
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self
            .collection_dir(collection)?
            .join(format!("{id}.{DOCUMENT_EXT}")))
    }

    /// Store a new document, assigning an id when the body has none.
    ///
    /// # Errors
    /// Returns error if the body is not an object, the id is taken, or IO fails.
    pub fn create(&self, collection: &str, body: Value) -> Result<Value> {
        let Value::Object(mut doc) = body else {
            return Err(StoreError::InvalidDocument("expected a JSON object".to_string()));
        };

        let id_attribute = self.config.id_attribute(collection);
        let id = match doc.get(&id_attribute).and_then(id_string) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().as_simple().to_string();
                doc.insert(id_attribute, Value::String(id.clone()));
                id
            }
        };

        let path = self.document_path(collection, &id)?;
        if path.exists() {
            return Err(StoreError::Exists {
                collection: collection.to_string(),
                id,
            });
        }

        fs::create_dir_all(self.collection_dir(collection)?)?;
        let doc = Value::Object(doc);
        write_document(&path, &doc)?;

        info!(collection = %collection, id = %id, "Created resource");

        Ok(doc)
    }

    /// Read one document.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if it does not exist.
    pub fn read(&self, collection: &str, id: &str) -> Result<Value> {
        let path = self.existing(collection, id)?;
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Overlay a body onto a stored document. Fields absent from the body are
    /// kept, so partial update payloads never drop persisted state. The stored
    /// id always matches the path.
    ///
    /// # Errors
    /// Returns error if the document does not exist or the body is not an object.
    pub fn update(&self, collection: &str, id: &str, body: Value) -> Result<Value> {
        let Value::Object(fields) = body else {
            return Err(StoreError::InvalidDocument("expected a JSON object".to_string()));
        };
        let Value::Object(stored) = self.read(collection, id)? else {
            return Err(StoreError::InvalidDocument(format!("{collection}/{id} is not an object")));
        };

        let mut doc = extend(stored, &fields);
        doc.insert(self.config.id_attribute(collection), Value::String(id.to_string()));
        let doc = Value::Object(doc);
        write_document(&self.document_path(collection, id)?, &doc)?;

        info!(collection = %collection, id = %id, fields = fields.len(), "Updated resource");

        Ok(doc)
    }

    /// Apply a JSON merge patch to a stored document.
    ///
    /// # Errors
    /// Returns error if the document does not exist or the patch is not an object.
    pub fn merge(&self, collection: &str, id: &str, patch: &Value) -> Result<Value> {
        if !patch.is_object() {
            return Err(StoreError::InvalidDocument("expected a JSON object".to_string()));
        }

        let mut doc = self.read(collection, id)?;
        apply_merge_patch(&mut doc, patch);
        if let Value::Object(map) = &mut doc {
            map.insert(self.config.id_attribute(collection), Value::String(id.to_string()));
        }
        write_document(&self.document_path(collection, id)?, &doc)?;

        info!(collection = %collection, id = %id, "Patched resource");

        Ok(doc)
    }

    /// Remove a document.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if it does not exist.
    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let path = self.existing(collection, id)?;
        fs::remove_file(path)?;

        info!(collection = %collection, id = %id, "Deleted resource");

        Ok(())
    }

    /// All documents of a collection, ordered by id.
    ///
    /// # Errors
    /// Returns error if the collection name is invalid or a document is unreadable.
    pub fn list(&self, collection: &str) -> Result<Vec<Value>> {
        let dir = self.collection_dir(collection)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT)
            {
                continue;
            }

            match fs::read_to_string(path)
                .map_err(StoreError::from)
                .and_then(|s| serde_json::from_str::<Value>(&s).map_err(StoreError::from))
            {
                Ok(doc) => docs.push(doc),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Failed to read document, skipping");
                }
            }
        }

        Ok(docs)
    }

    fn existing(&self, collection: &str, id: &str) -> Result<PathBuf> {
        let path = self.document_path(collection, id)?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(path)
    }
}

/// Id value rendered as a file-name stem; null and structured values have none.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn write_document(path: &Path, doc: &Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_init_store() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        assert!(tmp.path().join(".modelsync/config.yml").exists());
        assert!(tmp.path().join("resources").exists());
        assert_eq!(store.config().version, 1);
    }

    #[test]
    fn test_init_existing_fails() {
        let tmp = TempDir::new().unwrap();
        Store::init(tmp.path()).unwrap();

        let result = Store::init(tmp.path());
        assert!(matches!(result, Err(StoreError::StoreExists(_))));
    }

    #[test]
    fn test_open_missing_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(Store::open(tmp.path()), Err(StoreError::StoreNotFound(_))));
    }

    #[test]
    fn test_create_assigns_id() {
        let (_tmp, store) = setup();

        let doc = store.create("notes", json!({"title": "a"})).unwrap();
        let id = doc["id"].as_str().unwrap().to_string();

        assert_eq!(id.len(), 32);
        assert_eq!(store.read("notes", &id).unwrap(), doc);
    }

    #[test]
    fn test_create_keeps_given_id() {
        let (_tmp, store) = setup();

        store.create("notes", json!({"id": 7, "title": "a"})).unwrap();
        assert_eq!(store.read("notes", "7").unwrap()["title"], json!("a"));

        let duplicate = store.create("notes", json!({"id": 7}));
        assert!(matches!(duplicate, Err(StoreError::Exists { .. })));
    }

    #[test]
    fn test_update_and_merge() {
        let (_tmp, store) = setup();
        store.create("notes", json!({"id": "n1", "title": "a", "body": "x"})).unwrap();

        let updated = store.update("notes", "n1", json!({"title": "b", "id": "other"})).unwrap();
        assert_eq!(updated, json!({"id": "n1", "title": "b", "body": "x"}));

        let untouched = store.update("notes", "n1", json!({})).unwrap();
        assert_eq!(untouched, json!({"id": "n1", "title": "b", "body": "x"}));
        assert_eq!(store.read("notes", "n1").unwrap(), untouched);

        let merged = store.merge("notes", "n1", &json!({"body": "y", "title": null})).unwrap();
        assert_eq!(merged, json!({"id": "n1", "body": "y"}));
    }

    #[test]
    fn test_missing_resource() {
        let (_tmp, store) = setup();

        assert!(matches!(store.read("notes", "nope"), Err(StoreError::NotFound { .. })));
        assert!(matches!(
            store.update("notes", "nope", json!({})),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(store.delete("notes", "nope"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_invalid_names() {
        let (_tmp, store) = setup();

        assert!(matches!(store.list("My Notes"), Err(StoreError::InvalidCollection(_))));
        assert!(matches!(store.read("notes", "../x"), Err(StoreError::InvalidId(_))));
        assert!(matches!(
            store.create("notes", json!([1])),
            Err(StoreError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_list_sorted_and_delete() {
        let (_tmp, store) = setup();
        store.create("notes", json!({"id": "b"})).unwrap();
        store.create("notes", json!({"id": "a"})).unwrap();

        let ids: Vec<Value> = store.list("notes").unwrap().into_iter().map(|d| d["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b")]);

        store.delete("notes", "a").unwrap();
        assert_eq!(store.list("notes").unwrap().len(), 1);
        assert!(store.list("empty").unwrap().is_empty());
    }

    #[test]
    fn test_custom_id_attribute() {
        let tmp = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.models.insert(
            "tasks".to_string(),
            crate::config::ModelSettings {
                id_attribute: "_id".to_string(),
                ..Default::default()
            },
        );
        let store = Store::init_with(tmp.path(), config).unwrap();

        let doc = store.create("tasks", json!({"title": "t"})).unwrap();
        assert!(doc.get("_id").is_some());
        assert!(doc.get("id").is_none());
        assert_eq!(store.schema("tasks").id_attribute(), "_id");
    }
}
