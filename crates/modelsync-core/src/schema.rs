//! Per-model-type configuration, resolved once at construction.
//!
//! A [`Schema`] carries every hook the change tracker and save coordinator
//! consult: identity field, defaults, excluded fields per operation, field
//! transforms, validation, patch exclusion, response parsing, URL resolution,
//! a static event table and computed accessors.

use crate::event::{Event, Handler};
use crate::model::Model;
use crate::options::{RequestOptions, SaveOptions};
use crate::patch::{omit, Attributes};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type Transform = Rc<dyn Fn(Value) -> Value>;
pub type Validator = Rc<dyn Fn(&Attributes) -> Result<(), String>>;
pub type PatchFieldsFn = Rc<dyn Fn(&Model, &SaveOptions) -> Vec<String>>;
pub type ParseFn = Rc<dyn Fn(&Model, Value) -> Option<Attributes>>;
pub type UrlFn = Rc<dyn Fn(&Model, &RequestOptions) -> Option<String>>;
pub type ComputedFn = Rc<dyn Fn(&Model) -> Value>;

/// Operation an excluded-fields list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fields `set` silently skips.
    Set,
    /// Fields left out of the public representation.
    Save,
    /// Fields stripped from fetched data by the default parse hook.
    Fetch,
}

/// A list of field names, either fixed or computed from the model.
#[derive(Clone, Default)]
pub enum FieldPolicy {
    #[default]
    Empty,
    Static(Vec<String>),
    Dynamic(Rc<dyn Fn(&Model) -> Vec<String>>),
}

impl FieldPolicy {
    #[must_use]
    pub fn resolve(&self, model: &Model) -> Vec<String> {
        match self {
            Self::Empty => Vec::new(),
            Self::Static(fields) => fields.clone(),
            Self::Dynamic(f) => f(model),
        }
    }
}

impl fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Static(fields) => f.debug_tuple("Static").field(fields).finish(),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// How a model resolves its network address.
#[derive(Clone, Default)]
pub enum UrlPolicy {
    /// No address; `sync` fails unless the request names one.
    #[default]
    None,
    /// Collection root; saved models append their encoded id.
    Root(String),
    Custom(UrlFn),
}

/// Hooks and static configuration shared by every model of one type.
#[derive(Clone)]
pub struct Schema {
    id_attribute: String,
    defaults: Attributes,
    excluded: HashMap<Operation, FieldPolicy>,
    transforms: HashMap<String, Transform>,
    validator: Option<Validator>,
    patch_fields: Option<PatchFieldsFn>,
    parse: Option<ParseFn>,
    url: UrlPolicy,
    events: Vec<(String, Handler)>,
    computed: HashMap<String, ComputedFn>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            id_attribute: "id".to_string(),
            defaults: Attributes::new(),
            excluded: HashMap::new(),
            transforms: HashMap::new(),
            validator: None,
            patch_fields: None,
            parse: None,
            url: UrlPolicy::None,
            events: Vec::new(),
            computed: HashMap::new(),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id_attribute", &self.id_attribute)
            .field("defaults", &self.defaults)
            .field("excluded", &self.excluded)
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("events", &self.events.len())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the identity field (default `"id"`).
    #[must_use]
    pub fn with_id_attribute(mut self, attr: impl Into<String>) -> Self {
        self.id_attribute = attr.into();
        self
    }

    /// Values applied at construction for fields the caller leaves out.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.defaults = defaults;
        self
    }

    /// Static excluded-field list for an operation.
    #[must_use]
    pub fn exclude(mut self, op: Operation, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let fields = fields.into_iter().map(Into::into).collect();
        self.excluded.insert(op, FieldPolicy::Static(fields));
        self
    }

    /// Excluded-field list computed from the model on each use.
    #[must_use]
    pub fn exclude_with(mut self, op: Operation, f: impl Fn(&Model) -> Vec<String> + 'static) -> Self {
        self.excluded.insert(op, FieldPolicy::Dynamic(Rc::new(f)));
        self
    }

    /// Register a transform applied to incoming values of `attr`.
    #[must_use]
    pub fn with_transform(mut self, attr: impl Into<String>, f: impl Fn(Value) -> Value + 'static) -> Self {
        self.transforms.insert(attr.into(), Rc::new(f));
        self
    }

    /// Validator run against the candidate state (current overlaid with proposed).
    #[must_use]
    pub fn with_validator(mut self, f: impl Fn(&Attributes) -> Result<(), String> + 'static) -> Self {
        self.validator = Some(Rc::new(f));
        self
    }

    /// Fields that never qualify a save for a partial payload.
    #[must_use]
    pub fn with_patch_fields(mut self, f: impl Fn(&Model, &SaveOptions) -> Vec<String> + 'static) -> Self {
        self.patch_fields = Some(Rc::new(f));
        self
    }

    /// Replace the default response parser.
    #[must_use]
    pub fn with_parse(mut self, f: impl Fn(&Model, Value) -> Option<Attributes> + 'static) -> Self {
        self.parse = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_url_root(mut self, root: impl Into<String>) -> Self {
        self.url = UrlPolicy::Root(root.into());
        self
    }

    #[must_use]
    pub fn with_url(mut self, f: impl Fn(&Model, &RequestOptions) -> Option<String> + 'static) -> Self {
        self.url = UrlPolicy::Custom(Rc::new(f));
        self
    }

    /// Bind a handler to every model built from this schema.
    #[must_use]
    pub fn on(mut self, event: impl Into<String>, handler: impl Fn(&mut Model, &Event) + 'static) -> Self {
        self.events.push((event.into(), Rc::new(handler)));
        self
    }

    /// Register a derived value, read through `Model::computed`.
    #[must_use]
    pub fn with_computed(mut self, name: impl Into<String>, f: impl Fn(&Model) -> Value + 'static) -> Self {
        self.computed.insert(name.into(), Rc::new(f));
        self
    }

    #[must_use]
    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    #[must_use]
    pub const fn defaults(&self) -> &Attributes {
        &self.defaults
    }

    pub(crate) fn events(&self) -> &[(String, Handler)] {
        &self.events
    }

    pub(crate) fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    pub(crate) fn computed_fn(&self, name: &str) -> Option<&ComputedFn> {
        self.computed.get(name)
    }

    /// Excluded fields for `op`, resolved against `model`.
    #[must_use]
    pub fn excluded_fields(&self, op: Operation, model: &Model) -> Vec<String> {
        self.excluded
            .get(&op)
            .map(|policy| policy.resolve(model))
            .unwrap_or_default()
    }

    /// Apply the registered transform for `attr`, if any.
    #[must_use]
    pub fn transform(&self, attr: &str, value: Value) -> Value {
        match self.transforms.get(attr) {
            Some(f) => f(value),
            None => value,
        }
    }

    /// Patch-exclusion list for one save.
    #[must_use]
    pub fn patch_fields(&self, model: &Model, options: &SaveOptions) -> Vec<String> {
        self.patch_fields
            .as_ref()
            .map(|f| f(model, options))
            .unwrap_or_default()
    }

    /// Convert a raw response into attributes.
    ///
    /// The default strips the fetch-excluded fields from object responses and
    /// yields nothing for anything else.
    #[must_use]
    pub fn parse(&self, model: &Model, response: Value) -> Option<Attributes> {
        if let Some(f) = &self.parse {
            return f(model, response);
        }
        match response {
            Value::Object(data) => Some(omit(&data, &self.excluded_fields(Operation::Fetch, model))),
            _ => None,
        }
    }

    /// Resolve the address for `model`.
    #[must_use]
    pub fn url(&self, model: &Model, options: &RequestOptions) -> Option<String> {
        match &self.url {
            UrlPolicy::None => None,
            UrlPolicy::Custom(f) => f(model, options),
            UrlPolicy::Root(root) => Some(match model.id() {
                Some(id) if !model.is_new() => {
                    let mut base = root.clone();
                    if !base.ends_with('/') {
                        base.push('/');
                    }
                    base.push_str(&urlencoding::encode(&id_to_string(id)));
                    base
                }
                _ => root.clone(),
            }),
        }
    }
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::RecordingTransport;

    #[test]
    fn test_root_url_encodes_id() {
        let schema = Rc::new(Schema::new().with_url_root("/notes"));
        let url_for = |id: Value| {
            let mut attrs = Attributes::new();
            attrs.insert("id".to_string(), id);
            let model = Model::new(Rc::clone(&schema), Rc::new(RecordingTransport::new()), attrs);
            schema.url(&model, &RequestOptions::default())
        };

        assert_eq!(url_for(Value::from("abc-1")).as_deref(), Some("/notes/abc-1"));
        assert_eq!(url_for(Value::from("a b/c")).as_deref(), Some("/notes/a%20b%2Fc"));
        assert_eq!(url_for(Value::from("é")).as_deref(), Some("/notes/%C3%A9"));
        assert_eq!(url_for(Value::from(42)).as_deref(), Some("/notes/42"));
        assert_eq!(url_for(Value::Null).as_deref(), Some("/notes"));
    }

    #[test]
    fn test_id_to_string() {
        assert_eq!(id_to_string(&Value::from("x1")), "x1");
        assert_eq!(id_to_string(&Value::from(42)), "42");
    }

    #[test]
    fn test_transform_passthrough() {
        let schema = Schema::new().with_transform("title", |v| {
            Value::from(v.as_str().unwrap_or_default().trim().to_string())
        });

        assert_eq!(schema.transform("title", Value::from("  hi ")), Value::from("hi"));
        assert_eq!(schema.transform("other", Value::from("  hi ")), Value::from("  hi "));
    }
}
