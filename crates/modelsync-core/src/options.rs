//! Typed option sets for `set`, `save` and `fetch`.

use crate::model::Model;
use crate::patch::Attributes;
use crate::transport::TransportError;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Invoked after a successful merge with the raw response.
pub type SuccessCallback = Rc<dyn Fn(&mut Model, &Value)>;

/// Invoked with the transport error, before the `"error"` notification.
pub type ErrorCallback = Rc<dyn Fn(&mut Model, &TransportError)>;

/// Options recognized by [`Model::set`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Remove the named fields instead of assigning them.
    pub unset: bool,
    /// Suppress change notifications.
    pub silent: bool,
    /// Run the schema validator before applying anything.
    pub validate: bool,
    /// Opaque value handed to notification handlers.
    pub payload: Option<Value>,
}

impl SetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub const fn unset(mut self) -> Self {
        self.unset = true;
        self
    }

    #[must_use]
    pub const fn validated(mut self) -> Self {
        self.validate = true;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Caller overrides merged into the outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Explicit address; skips the schema's URL policy.
    pub url: Option<String>,
    /// Raw body; when present the model is not serialized.
    pub data: Option<String>,
    /// Explicit payload attributes (set by patch mode).
    pub attrs: Option<Attributes>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Options recognized by [`Model::save`].
#[derive(Clone)]
pub struct SaveOptions {
    /// Defer local mutation until the response arrives.
    pub wait: bool,
    /// Force the payload down to the changed fields on update.
    pub patch: bool,
    pub validate: bool,
    /// Run the schema parse hook on the response.
    pub parse: bool,
    pub silent: bool,
    pub request: RequestOptions,
    pub payload: Option<Value>,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            wait: false,
            patch: false,
            validate: true,
            parse: true,
            silent: false,
            request: RequestOptions::default(),
            payload: None,
            success: None,
            error: None,
        }
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("wait", &self.wait)
            .field("patch", &self.patch)
            .field("validate", &self.validate)
            .field("parse", &self.parse)
            .field("silent", &self.silent)
            .field("request", &self.request)
            .field("payload", &self.payload)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl SaveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn wait(mut self) -> Self {
        self.wait = true;
        self
    }

    #[must_use]
    pub const fn patch(mut self) -> Self {
        self.patch = true;
        self
    }

    #[must_use]
    pub const fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    #[must_use]
    pub const fn without_parse(mut self) -> Self {
        self.parse = false;
        self
    }

    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&mut Model, &Value) + 'static) -> Self {
        self.success = Some(Rc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&mut Model, &TransportError) + 'static) -> Self {
        self.error = Some(Rc::new(callback));
        self
    }

    /// The subset forwarded to the change tracker.
    #[must_use]
    pub fn set_options(&self) -> SetOptions {
        SetOptions {
            unset: false,
            silent: self.silent,
            validate: self.validate,
            payload: self.payload.clone(),
        }
    }
}

/// Options recognized by [`Model::fetch`].
#[derive(Clone)]
pub struct FetchOptions {
    pub parse: bool,
    pub validate: bool,
    pub silent: bool,
    pub request: RequestOptions,
    pub payload: Option<Value>,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            parse: true,
            validate: false,
            silent: false,
            request: RequestOptions::default(),
            payload: None,
            success: None,
            error: None,
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("parse", &self.parse)
            .field("validate", &self.validate)
            .field("silent", &self.silent)
            .field("request", &self.request)
            .field("payload", &self.payload)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn without_parse(mut self) -> Self {
        self.parse = false;
        self
    }

    #[must_use]
    pub const fn validated(mut self) -> Self {
        self.validate = true;
        self
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&mut Model, &Value) + 'static) -> Self {
        self.success = Some(Rc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&mut Model, &TransportError) + 'static) -> Self {
        self.error = Some(Rc::new(callback));
        self
    }

    #[must_use]
    pub fn set_options(&self) -> SetOptions {
        SetOptions {
            unset: false,
            silent: self.silent,
            validate: self.validate,
            payload: self.payload.clone(),
        }
    }
}
