//! CLI command implementations.

use crate::output::{self, OutputFormat, RecordView, SaveReport};
use anyhow::{anyhow, bail, Context, Result};
use modelsync_core::{to_attributes, Attributes, Event, FetchOptions, Model, SaveOptions, Settled, Transport};
use modelsync_fs::{LocalTransport, Store, StoreConfig};
use serde_json::Value;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Flags controlling how `save` persists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveFlags {
    pub wait: bool,
    pub patch: bool,
}

/// Events recorded for the report. Per-field names are added per assignment.
const REPORTED_EVENTS: &[&str] = &[
    "change",
    "before:create",
    "before:update",
    "before:save",
    "request",
    "sync",
    "error",
];

/// Initialize a new store.
pub fn init(path: &Path, name: Option<String>, format: OutputFormat) -> Result<()> {
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("modelsync")
            .to_string()
    });
    Store::init_with(path, StoreConfig::new(name)).context("Failed to initialize store")?;
    output::print_success(&format!("Initialized store at {}", path.display()), format)
}

/// Assign fields on a resource and save it through a tracked model.
pub fn save(
    path: &Path,
    collection: &str,
    id: Option<&str>,
    assignments: &[String],
    flags: SaveFlags,
    format: OutputFormat,
) -> Result<()> {
    let store = Store::open(path).context("Failed to open store")?;
    let schema = Rc::new(store.schema(collection));

    let initial = match id {
        Some(id) => {
            let record = store
                .read(collection, id)
                .with_context(|| format!("Failed to read {collection}/{id}"))?;
            to_attributes(record).ok_or_else(|| anyhow!("{collection}/{id} is not an object"))?
        }
        None => Attributes::new(),
    };

    let attrs = parse_assignments(assignments)?;

    let transport = Rc::new(LocalTransport::new(store));
    let mut model = Model::new(schema, Rc::clone(&transport) as Rc<dyn Transport>, initial);

    let events = Rc::new(RefCell::new(Vec::new()));
    let field_events = attrs.keys().map(|key| format!("change:{key}"));
    for name in REPORTED_EVENTS.iter().map(ToString::to_string).chain(field_events) {
        let log = Rc::clone(&events);
        model.on(name, move |_, event: &Event| log.borrow_mut().push(event.name().into_owned()));
    }

    let mut options = SaveOptions::new();
    if flags.wait {
        options = options.wait();
    }
    if flags.patch {
        options = options.patch();
    }

    model
        .save(Some(attrs), options)
        .with_context(|| format!("Failed to save {collection}"))?;

    let outcome = settle_all(&mut model, &transport)?;
    debug!(collection, outcome = %outcome, "Save settled");

    let report = SaveReport {
        collection: collection.to_string(),
        outcome,
        record: Value::Object(model.attributes().clone()),
        changed: Value::Object(model.changed().clone()),
        events: events.borrow().clone(),
    };
    output::print(&report, format)
}

/// Fetch a resource into a fresh model.
pub fn fetch(path: &Path, collection: &str, id: &str, format: OutputFormat) -> Result<()> {
    let store = Store::open(path).context("Failed to open store")?;
    let schema = Rc::new(store.schema(collection));

    let mut initial = Attributes::new();
    initial.insert(schema.id_attribute().to_string(), Value::String(id.to_string()));

    let transport = Rc::new(LocalTransport::new(store));
    let mut model = Model::new(schema, Rc::clone(&transport) as Rc<dyn Transport>, initial);

    model
        .fetch(FetchOptions::new())
        .with_context(|| format!("Failed to fetch {collection}/{id}"))?;

    let outcome = settle_all(&mut model, &transport)?;
    if outcome != "synced" {
        bail!("Failed to fetch {collection}/{id}: {outcome}");
    }

    let view = RecordView {
        collection: collection.to_string(),
        record: Value::Object(model.attributes().clone()),
    };
    output::print(&view, format)
}

/// List resources in a collection.
pub fn list(path: &Path, collection: &str, format: OutputFormat) -> Result<()> {
    let store = Store::open(path).context("Failed to open store")?;
    let records = store
        .list(collection)
        .with_context(|| format!("Failed to list {collection}"))?;
    let id_attribute = store.config().id_attribute(collection);
    output::print_records(collection, &records, &id_attribute, format)
}

/// Start the HTTP resource server.
pub fn serve(path: &Path, host: &str, port: u16) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { modelsync_server::serve(path, host, port).await })
}

/// Settle completed requests until the transport is idle. Returns the last outcome.
fn settle_all(model: &mut Model, transport: &LocalTransport) -> Result<String> {
    let mut last = String::from("pending");
    while transport.pending() > 0 {
        for (id, outcome) in transport.drain() {
            last = match model.settle(id, outcome)? {
                Settled::Synced => "synced".to_string(),
                Settled::Rejected(reason) => format!("rejected: {reason}"),
                Settled::Failed(error) => format!("failed: {error}"),
            };
        }
    }
    Ok(last)
}

/// Parse `key=value` assignments. Values are read as JSON, falling back to strings.
fn parse_assignments(assignments: &[String]) -> Result<Attributes> {
    let mut attrs = Attributes::new();
    for input in assignments {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| anyhow!("expected 'key=value', got '{input}'"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("empty field name in '{input}'");
        }
        let value = value.trim();
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        attrs.insert(key.to_string(), value);
    }
    Ok(attrs)
}
