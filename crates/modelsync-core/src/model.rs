//! Tracked model and the attribute change tracker.

use crate::error::{CoreError, Result};
use crate::event::{Event, Handler, ListenerId, Listeners};
use crate::options::{RequestOptions, SetOptions};
use crate::patch::{diff_keys, extend, omit, Attributes};
use crate::save::InFlight;
use crate::schema::{Operation, Schema};
use crate::transport::{RequestId, Transport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// One tracked record: current attributes, the last-persisted snapshot and
/// the set of fields that differ between them.
///
/// A model is single-owner. Handlers and callbacks receive it as `&mut Model`
/// within the same call stack, so all mutation goes through one exclusive path.
pub struct Model {
    pub(crate) schema: Rc<Schema>,
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) attributes: Attributes,
    pub(crate) previous: Attributes,
    pub(crate) changed: Attributes,
    id: Option<Value>,
    changing: bool,
    pending: Option<SetOptions>,
    listeners: Listeners,
    pub(crate) in_flight: BTreeMap<RequestId, InFlight>,
    validation_error: Option<String>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("previous", &self.previous)
            .field("changed", &self.changed)
            .field("in_flight", &self.in_flight.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Build a model from initial attributes.
    ///
    /// Schema defaults fill absent fields, the set-time transforms and
    /// exclusions apply, and the result becomes both the current and the
    /// last-persisted snapshot. Schema event handlers are bound afterwards, so
    /// construction emits nothing.
    pub fn new(schema: Rc<Schema>, transport: Rc<dyn Transport>, attrs: Attributes) -> Self {
        let initial = extend(schema.defaults().clone(), &attrs);
        let mut model = Self {
            schema,
            transport,
            attributes: Attributes::new(),
            previous: Attributes::new(),
            changed: Attributes::new(),
            id: None,
            changing: false,
            pending: None,
            listeners: Listeners::default(),
            in_flight: BTreeMap::new(),
            validation_error: None,
        };

        model.apply(initial, &SetOptions::default());
        model.changed.clear();
        model.previous = model.attributes.clone();

        let schema = Rc::clone(&model.schema);
        for (event, handler) in schema.events() {
            model.listeners.add(event.clone(), Rc::clone(handler));
        }

        model
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // --- Reads ---

    #[must_use]
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.attributes.get(attr)
    }

    /// True when `attr` holds a non-null value.
    #[must_use]
    pub fn has(&self, attr: &str) -> bool {
        self.attributes.get(attr).is_some_and(|v| !v.is_null())
    }

    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub const fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// A model without a persisted identity has never been saved.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id.as_ref().is_none_or(Value::is_null)
    }

    /// Fields differing from the last-persisted snapshot. Unset fields map to null.
    #[must_use]
    pub const fn changed(&self) -> &Attributes {
        &self.changed
    }

    #[must_use]
    pub fn has_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    #[must_use]
    pub fn has_changed_attr(&self, attr: &str) -> bool {
        self.changed.contains_key(attr)
    }

    /// Without `diff`, the dirty fields (or `None` when clean). With `diff`,
    /// the entries of `diff` that would change the current attributes.
    #[must_use]
    pub fn changed_attributes(&self, diff: Option<&Attributes>) -> Option<Attributes> {
        let Some(diff) = diff else {
            return self.has_changed().then(|| self.changed.clone());
        };

        let keys: Vec<String> = diff_keys(&self.attributes, diff)
            .into_iter()
            .filter(|key| diff.contains_key(key))
            .collect();
        if keys.is_empty() {
            return None;
        }
        Some(
            diff.iter()
                .filter(|(key, _)| keys.contains(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Value of `attr` in the last-persisted snapshot.
    #[must_use]
    pub fn previous(&self, attr: &str) -> Option<&Value> {
        self.previous.get(attr)
    }

    #[must_use]
    pub const fn previous_attributes(&self) -> &Attributes {
        &self.previous
    }

    /// Message from the most recent failed validation.
    #[must_use]
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// Requests dispatched by this model that have not been settled yet.
    #[must_use]
    pub fn in_flight(&self) -> Vec<RequestId> {
        self.in_flight.keys().copied().collect()
    }

    /// Evaluate a computed accessor registered on the schema.
    #[must_use]
    pub fn computed(&self, name: &str) -> Option<Value> {
        self.schema.computed_fn(name).map(|f| f(self))
    }

    /// Public representation: current attributes minus the save-excluded fields.
    #[must_use]
    pub fn to_json(&self) -> Attributes {
        omit(&self.attributes, &self.schema.excluded_fields(Operation::Save, self))
    }

    /// Address of this model according to the schema's URL policy.
    #[must_use]
    pub fn url(&self, options: &RequestOptions) -> Option<String> {
        self.schema.url(self, options)
    }

    // --- Notifications ---

    /// Register a handler for an event name such as `"change:title"` or `"sync"`.
    pub fn on(&mut self, event: impl Into<String>, handler: impl Fn(&mut Self, &Event) + 'static) -> ListenerId {
        let handler: Handler = Rc::new(handler);
        self.listeners.add(event, handler)
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Emit `event` to its handlers in registration order.
    pub fn trigger(&mut self, event: Event) {
        let name = event.name();
        let handlers = self.listeners.matching(&name);
        trace!(event = %name, handlers = handlers.len(), "Emitting event");
        for handler in handlers {
            handler(self, &event);
        }
    }

    // --- Change tracking ---

    /// Assign a batch of fields.
    ///
    /// Validation runs first when `options.validate` is set; a rejection
    /// leaves the model untouched and returns `CoreError::Invalid`.
    ///
    /// # Errors
    /// Returns `CoreError::Invalid` if the validator rejects the candidate state.
    pub fn set(&mut self, attrs: Attributes, options: SetOptions) -> Result<&mut Self> {
        self.validate(&attrs, options.validate)?;
        self.apply(attrs, &options);
        Ok(self)
    }

    /// Assign a single field.
    ///
    /// # Errors
    /// Returns `CoreError::Invalid` if the validator rejects the candidate state.
    pub fn set_attr(&mut self, attr: impl Into<String>, value: impl Into<Value>, options: SetOptions) -> Result<&mut Self> {
        let mut attrs = Attributes::new();
        attrs.insert(attr.into(), value.into());
        self.set(attrs, options)
    }

    /// Remove a single field.
    ///
    /// # Errors
    /// Returns `CoreError::Invalid` if the validator rejects the candidate state.
    pub fn unset(&mut self, attr: impl Into<String>, options: SetOptions) -> Result<&mut Self> {
        self.set_attr(attr, Value::Null, options.unset())
    }

    /// Remove every field.
    ///
    /// # Errors
    /// Returns `CoreError::Invalid` if the validator rejects the candidate state.
    pub fn clear(&mut self, options: SetOptions) -> Result<&mut Self> {
        let attrs = self
            .attributes
            .keys()
            .map(|key| (key.clone(), Value::Null))
            .collect();
        self.set(attrs, options.unset())
    }

    /// Run the schema validator against current attributes overlaid with `attrs`.
    pub(crate) fn validate(&mut self, attrs: &Attributes, enabled: bool) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        let Some(validator) = self.schema.validator().cloned() else {
            return Ok(());
        };

        let candidate = extend(self.attributes.clone(), attrs);
        match validator(&candidate) {
            Ok(()) => {
                self.validation_error = None;
                Ok(())
            }
            Err(reason) => {
                debug!(reason = %reason, "Validation rejected attributes");
                self.validation_error = Some(reason.clone());
                Err(CoreError::Invalid(reason))
            }
        }
    }

    /// Apply a validated batch, emit per-field notifications and, for the
    /// outermost call, drain batch notifications until no round is pending.
    fn apply(&mut self, attrs: Attributes, options: &SetOptions) {
        let nested = self.changing;
        self.changing = true;

        let schema = Rc::clone(&self.schema);
        let excluded = schema.excluded_fields(Operation::Set, self);
        let id_attribute = schema.id_attribute();
        let mut changes = Vec::new();

        for (attr, value) in attrs {
            if excluded.contains(&attr) {
                continue;
            }

            // Under `unset` the proposed value is ignored: the field becomes absent.
            let value = if options.unset {
                None
            } else {
                Some(schema.transform(&attr, value))
            };

            if attr == id_attribute {
                self.id = value.clone().filter(|v| !v.is_null());
            }

            if self.attributes.get(&attr) != value.as_ref() {
                changes.push(attr.clone());
            }
            if self.previous.get(&attr) == value.as_ref() {
                self.changed.remove(&attr);
            } else {
                self.changed
                    .insert(attr.clone(), value.clone().unwrap_or(Value::Null));
            }

            match value {
                Some(value) => {
                    self.attributes.insert(attr, value);
                }
                None => {
                    self.attributes.remove(&attr);
                }
            }
        }

        trace!(changes = changes.len(), nested, silent = options.silent, "Applied attributes");

        if !options.silent {
            if !changes.is_empty() {
                self.pending = Some(options.clone());
            }
            for attr in changes {
                let value = self.attributes.get(&attr).cloned();
                self.trigger(Event::AttributeChanged {
                    attr,
                    value,
                    options: options.clone(),
                });
            }
        }

        if nested {
            return;
        }

        if !options.silent {
            while let Some(pending) = self.pending.take() {
                self.trigger(Event::Changed { options: pending });
            }
        }
        self.pending = None;
        self.changing = false;
    }

    /// Draw a new last-persisted line at the current attributes.
    pub(crate) fn checkpoint(&mut self) {
        self.previous = self.attributes.clone();
        self.changed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::to_attributes;
    use crate::transport::mock::RecordingTransport;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;

    fn attrs(value: Value) -> Attributes {
        to_attributes(value).unwrap()
    }

    fn model_with(schema: Schema, initial: Value) -> Model {
        Model::new(Rc::new(schema), Rc::new(RecordingTransport::new()), attrs(initial))
    }

    fn record(model: &mut Model, log: &Rc<RefCell<Vec<String>>>, events: &[&str]) {
        for event in events {
            let log = Rc::clone(log);
            model.on(*event, move |_, e| log.borrow_mut().push(e.name().into_owned()));
        }
    }

    #[test]
    fn test_construction_snapshots() {
        let schema = Schema::new().with_defaults(attrs(json!({"state": "TODO", "title": "Untitled"})));
        let model = model_with(schema, json!({"title": "Write docs"}));

        assert_eq!(model.get("state"), Some(&json!("TODO")));
        assert_eq!(model.get("title"), Some(&json!("Write docs")));
        assert_eq!(model.previous_attributes(), model.attributes());
        assert!(!model.has_changed());
        assert!(model.is_new());
    }

    #[test]
    fn test_identity_tracking() {
        let mut model = model_with(Schema::new().with_id_attribute("_id"), json!({"_id": "n1"}));
        assert!(!model.is_new());
        assert_eq!(model.id(), Some(&json!("n1")));

        model.set_attr("_id", Value::Null, SetOptions::new()).unwrap();
        assert!(model.is_new());
    }

    #[test]
    fn test_changed_tracks_difference_from_previous() {
        let mut model = model_with(Schema::new(), json!({"a": 1, "b": 2}));

        model.set(attrs(json!({"a": 5, "c": 3})), SetOptions::new()).unwrap();
        assert_eq!(Value::Object(model.changed().clone()), json!({"a": 5, "c": 3}));

        // Returning to the persisted value clears the dirty flag.
        model.set_attr("a", 1, SetOptions::new()).unwrap();
        assert_eq!(Value::Object(model.changed().clone()), json!({"c": 3}));
        assert_eq!(model.previous("a"), Some(&json!(1)));
    }

    #[test]
    fn test_unset_marks_removed_fields() {
        let mut model = model_with(Schema::new(), json!({"a": 1}));

        model.unset("a", SetOptions::new()).unwrap();
        assert!(model.get("a").is_none());
        assert_eq!(model.changed().get("a"), Some(&Value::Null));

        model.set_attr("a", 1, SetOptions::new()).unwrap();
        assert!(!model.has_changed());
    }

    #[test]
    fn test_unset_absent_field_is_not_a_change() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&mut model, &log, &["change:ghost", "change"]);

        model.unset("ghost", SetOptions::new()).unwrap();
        assert!(log.borrow().is_empty());
        assert!(!model.has_changed());
    }

    #[test]
    fn test_clear() {
        let mut model = model_with(Schema::new(), json!({"a": 1, "b": 2}));
        model.clear(SetOptions::new()).unwrap();

        assert!(model.attributes().is_empty());
        assert_eq!(Value::Object(model.changed().clone()), json!({"a": null, "b": null}));
    }

    #[test]
    fn test_excluded_and_transformed_fields() {
        let schema = Schema::new()
            .exclude(Operation::Set, ["computed_total"])
            .with_transform("title", |v| json!(v.as_str().unwrap_or_default().to_uppercase()));
        let mut model = model_with(schema, json!({}));

        model
            .set(attrs(json!({"title": "draft", "computed_total": 9})), SetOptions::new())
            .unwrap();

        assert_eq!(model.get("title"), Some(&json!("DRAFT")));
        assert!(model.get("computed_total").is_none());
        assert!(!model.has_changed_attr("computed_total"));
    }

    #[test]
    fn test_dynamic_exclusion_sees_model() {
        let schema = Schema::new().exclude_with(Operation::Set, |m| {
            if m.get("locked") == Some(&json!(true)) {
                vec!["title".to_string()]
            } else {
                Vec::new()
            }
        });
        let mut model = model_with(schema, json!({"title": "a", "locked": true}));

        model.set_attr("title", "b", SetOptions::new()).unwrap();
        assert_eq!(model.get("title"), Some(&json!("a")));
    }

    #[test]
    fn test_validation_failure_mutates_nothing() {
        let schema = Schema::new().with_validator(|candidate| {
            match candidate.get("count").and_then(Value::as_i64) {
                Some(n) if n < 0 => Err("count must be positive".to_string()),
                _ => Ok(()),
            }
        });
        let mut model = model_with(schema, json!({"count": 1}));
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&mut model, &log, &["change:count", "change"]);

        let result = model.set(attrs(json!({"count": -1, "other": true})), SetOptions::new().validated());

        assert!(matches!(result, Err(CoreError::Invalid(_))));
        assert_eq!(model.get("count"), Some(&json!(1)));
        assert!(model.get("other").is_none());
        assert!(!model.has_changed());
        assert!(log.borrow().is_empty());
        assert_eq!(model.validation_error(), Some("count must be positive"));

        // Validation only runs when asked for.
        model.set_attr("count", -1, SetOptions::new()).unwrap();
        assert_eq!(model.get("count"), Some(&json!(-1)));
    }

    #[test]
    fn test_per_field_then_batch_order() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&mut model, &log, &["change:b", "change:a", "change"]);

        model.set(attrs(json!({"b": 1, "a": 2})), SetOptions::new()).unwrap();

        assert_eq!(*log.borrow(), vec!["change:b", "change:a", "change"]);
    }

    #[test]
    fn test_same_value_twice_is_silent() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));

        model.set_attr("a", 1, SetOptions::new()).unwrap();
        record(&mut model, &log, &["change:a", "change"]);
        model.set_attr("a", 1, SetOptions::new()).unwrap();

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_silent_set_still_tracks() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&mut model, &log, &["change:a", "change"]);

        model.set_attr("a", 1, SetOptions::new().silent()).unwrap();

        assert!(log.borrow().is_empty());
        assert!(model.has_changed_attr("a"));
    }

    #[test]
    fn test_field_handler_set_is_coalesced_into_outer_batch() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        model.on("change:x", |m, _| {
            m.set_attr("y", 2, SetOptions::new()).unwrap();
        });
        record(&mut model, &log, &["change:x", "change:y", "change"]);

        model.set_attr("x", 1, SetOptions::new()).unwrap();

        // The nested set notifies its field immediately and joins the pending batch.
        assert_eq!(*log.borrow(), vec!["change:y", "change:x", "change"]);
        assert_eq!(model.get("y"), Some(&json!(2)));
    }

    #[test]
    fn test_batch_handler_set_produces_second_batch() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&mut model, &log, &["change:x", "change:y", "change"]);
        model.on("change", |m, _| {
            if m.get("y").is_none() {
                m.set_attr("y", 2, SetOptions::new()).unwrap();
            }
        });

        model.set_attr("x", 1, SetOptions::new()).unwrap();

        assert_eq!(*log.borrow(), vec!["change:x", "change", "change:y", "change"]);
    }

    #[test]
    fn test_batch_carries_latest_pending_options() {
        let mut model = model_with(Schema::new(), json!({}));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        model.on("change", move |_, e| {
            if let Event::Changed { options } = e {
                sink.borrow_mut().push(options.payload.clone());
            }
        });

        model
            .set_attr("x", 1, SetOptions::new().with_payload("ctx"))
            .unwrap();

        assert_eq!(*seen.borrow(), vec![Some(json!("ctx"))]);
    }

    #[test]
    fn test_field_event_payload() {
        let mut model = model_with(Schema::new(), json!({}));
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        model.on("change:title", move |m, e| {
            if let Event::AttributeChanged { value, .. } = e {
                *sink.borrow_mut() = Some((value.clone(), m.get("title").cloned()));
            }
        });

        model.set_attr("title", "x", SetOptions::new()).unwrap();

        assert_eq!(*seen.borrow(), Some((Some(json!("x")), Some(json!("x")))));
    }

    #[test]
    fn test_off_removes_handler() {
        let mut model = model_with(Schema::new(), json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let id = model.on("change", move |_, _| sink.borrow_mut().push(()));

        assert!(model.off(id));
        model.set_attr("a", 1, SetOptions::new()).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_schema_events_bound_at_construction() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let schema = Schema::new().on("change:title", move |_, _| sink.borrow_mut().push("title"));
        let mut model = model_with(schema, json!({"title": "initial"}));

        assert!(log.borrow().is_empty());
        model.set_attr("title", "next", SetOptions::new()).unwrap();
        assert_eq!(*log.borrow(), vec!["title"]);
    }

    #[test]
    fn test_computed_accessor() {
        let schema = Schema::new().with_computed("label", |m| {
            json!(format!(
                "{} ({})",
                m.get("title").and_then(Value::as_str).unwrap_or_default(),
                m.get("state").and_then(Value::as_str).unwrap_or_default()
            ))
        });
        let model = model_with(schema, json!({"title": "Docs", "state": "TODO"}));

        assert_eq!(model.computed("label"), Some(json!("Docs (TODO)")));
        assert!(model.computed("missing").is_none());
        assert!(model.get("label").is_none());
    }

    #[test]
    fn test_changed_attributes_with_diff() {
        let model = model_with(Schema::new(), json!({"a": 1, "b": 2}));

        assert!(model.changed_attributes(None).is_none());
        assert!(model.changed_attributes(Some(&attrs(json!({"a": 1})))).is_none());
        assert_eq!(
            model.changed_attributes(Some(&attrs(json!({"a": 1, "b": 3})))),
            Some(attrs(json!({"b": 3})))
        );
    }

    #[test]
    fn test_to_json_omits_save_excluded() {
        let schema = Schema::new().exclude(Operation::Save, ["draft_notes"]);
        let model = model_with(schema, json!({"title": "t", "draft_notes": "x"}));

        assert_eq!(Value::Object(model.to_json()), json!({"title": "t"}));
    }

    #[test]
    fn test_url_root() {
        let schema = Rc::new(Schema::new().with_url_root("/notes"));
        let transport = Rc::new(RecordingTransport::new());
        let fresh = Model::new(Rc::clone(&schema), transport.clone(), Attributes::new());
        let saved = Model::new(schema, transport, attrs(json!({"id": "a b"})));

        assert_eq!(fresh.url(&RequestOptions::default()).as_deref(), Some("/notes"));
        assert_eq!(saved.url(&RequestOptions::default()).as_deref(), Some("/notes/a%20b"));
    }
}
