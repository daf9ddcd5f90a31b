//! Save coordinator: `save`, `fetch`, `sync` and settlement of in-flight requests.

use crate::error::{CoreError, Result};
use crate::event::Event;
use crate::model::Model;
use crate::options::{ErrorCallback, FetchOptions, RequestOptions, SaveOptions};
use crate::patch::{difference, extend, to_attributes, Attributes};
use crate::transport::{
    Method, Outcome, Request, RequestHandle, RequestId, TransportError, Verb, JSON_CONTENT_TYPE,
};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Response handler context kept until a request settles.
pub(crate) enum InFlight {
    Save {
        attrs: Option<Attributes>,
        options: SaveOptions,
    },
    Fetch {
        options: FetchOptions,
    },
    Raw,
}

/// How a settled request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// Server state merged; success callback and `"sync"` ran.
    Synced,
    /// The merge of server state failed validation.
    Rejected(String),
    /// The transport reported an error.
    Failed(TransportError),
}

impl Model {
    /// Persist the model, optionally applying `attrs` first.
    ///
    /// Without `wait`, `attrs` go through `set` immediately. With `wait`, they
    /// are only visible to the outgoing request and are merged once the
    /// response settles. Whatever the outcome, settlement resets the
    /// last-persisted snapshot to the current attributes.
    ///
    /// # Errors
    /// Returns `CoreError::Invalid` when validation rejects the attributes (no
    /// request is issued) and `CoreError::MissingUrl` when no address resolves.
    pub fn save(&mut self, attrs: Option<Attributes>, options: SaveOptions) -> Result<RequestHandle> {
        match &attrs {
            Some(proposed) if !options.wait => {
                self.set(proposed.clone(), options.set_options())?;
            }
            _ => {
                let proposed = attrs.clone().unwrap_or_default();
                self.validate(&proposed, options.validate)?;
            }
        }

        // The overlay exists only while the request is built and dispatched.
        // It covers the dirty set too, so partial payloads carry the proposal.
        let original = match &attrs {
            Some(proposed) if options.wait => {
                let overlay = extend(self.attributes.clone(), proposed);
                let overlay_changed = self.overlay_changed(proposed);
                Some((
                    std::mem::replace(&mut self.attributes, overlay),
                    std::mem::replace(&mut self.changed, overlay_changed),
                ))
            }
            _ => None,
        };

        let dispatched = self.dispatch_save(&options);

        if let Some((attributes, changed)) = original {
            self.attributes = attributes;
            self.changed = changed;
        }

        let handle = dispatched?;
        self.in_flight.insert(handle.id, InFlight::Save { attrs, options });
        Ok(handle)
    }

    /// Persist after assigning a single field.
    ///
    /// # Errors
    /// Same as [`Model::save`].
    pub fn save_attr(&mut self, attr: impl Into<String>, value: impl Into<Value>, options: SaveOptions) -> Result<RequestHandle> {
        let mut attrs = Attributes::new();
        attrs.insert(attr.into(), value.into());
        self.save(Some(attrs), options)
    }

    /// Dirty fields as they would be with `proposed` applied.
    fn overlay_changed(&self, proposed: &Attributes) -> Attributes {
        let mut changed = self.changed.clone();
        for (attr, value) in proposed {
            if self.previous.get(attr) == Some(value) {
                changed.remove(attr);
            } else {
                changed.insert(attr.clone(), value.clone());
            }
        }
        changed
    }

    fn dispatch_save(&mut self, options: &SaveOptions) -> Result<RequestHandle> {
        let method = if self.is_new() {
            Method::Create
        } else {
            Method::Update
        };

        if method == Method::Update {
            self.trigger(Event::BeforeUpdate {
                payload: options.payload.clone(),
            });
        } else {
            self.trigger(Event::BeforeCreate {
                payload: options.payload.clone(),
            });
        }
        self.trigger(Event::BeforeSave {
            method,
            payload: options.payload.clone(),
        });

        // Partial payloads are chosen when no changed field lies outside the
        // patch-exclusion list, including when nothing changed at all.
        let schema = Rc::clone(&self.schema);
        let patch_fields = schema.patch_fields(self, options);
        let patch_eligible = difference(self.changed.keys(), &patch_fields).is_empty();

        let mut request = options.request.clone();
        if method == Method::Update && (options.patch || patch_eligible) {
            request.attrs = Some(self.changed.clone());
        }

        debug!(%method, patch = request.attrs.is_some(), "Saving model");
        self.send(method, &request, options.payload.clone())
    }

    /// Reload the model from its resource.
    ///
    /// # Errors
    /// Returns `CoreError::MissingUrl` when no address resolves.
    pub fn fetch(&mut self, options: FetchOptions) -> Result<RequestHandle> {
        let handle = self.send(Method::Read, &options.request, options.payload.clone())?;
        self.in_flight.insert(handle.id, InFlight::Fetch { options });
        Ok(handle)
    }

    /// Issue `method` for this model without save or fetch handling.
    ///
    /// Settling a raw request reports the outcome and emits nothing.
    ///
    /// # Errors
    /// Returns `CoreError::MissingUrl` when no address resolves, or
    /// `CoreError::Json` if the body cannot be serialized.
    pub fn sync(&mut self, method: Method, options: &RequestOptions) -> Result<RequestHandle> {
        let handle = self.send(method, options, None)?;
        self.in_flight.insert(handle.id, InFlight::Raw);
        Ok(handle)
    }

    /// Build the merged request, hand it to the transport and emit `"request"`.
    fn send(&mut self, method: Method, options: &RequestOptions, payload: Option<Value>) -> Result<RequestHandle> {
        let verb = method.verb();

        let url = match &options.url {
            Some(url) => url.clone(),
            None => self.url(options).ok_or(CoreError::MissingUrl)?,
        };

        let (body, content_type) = match &options.data {
            Some(data) => (Some(data.clone()), None),
            None if method.carries_body() => {
                let attrs = options.attrs.clone().unwrap_or_else(|| self.to_json());
                let body = serde_json::to_string(&Value::Object(attrs))?;
                (Some(body), Some(JSON_CONTENT_TYPE.to_string()))
            }
            None => (None, None),
        };

        let request = Request {
            verb,
            url,
            body,
            content_type,
            data_type: "json".to_string(),
            process_data: verb == Verb::Get,
            headers: options.headers.clone(),
        };

        let transport = Rc::clone(&self.transport);
        let handle = transport.dispatch(request);
        info!(id = %handle.id, verb = %handle.verb, url = %handle.url, "Dispatched request");

        self.trigger(Event::Request {
            handle: handle.clone(),
            payload,
        });
        Ok(handle)
    }

    /// Deliver the outcome of a request this model dispatched.
    ///
    /// # Errors
    /// Returns `CoreError::UnknownRequest` if `id` is not in flight for this model.
    pub fn settle(&mut self, id: RequestId, outcome: Outcome) -> Result<Settled> {
        let in_flight = self
            .in_flight
            .remove(&id)
            .ok_or(CoreError::UnknownRequest(id))?;

        let settled = match in_flight {
            InFlight::Save { attrs, options } => {
                let settled = match outcome {
                    Ok(response) => self.merge_saved(attrs, &options, response),
                    Err(error) => {
                        self.report_error(options.error.as_ref(), options.payload.clone(), error)
                    }
                };
                self.checkpoint();
                settled
            }
            InFlight::Fetch { options } => match outcome {
                Ok(response) => self.merge_fetched(&options, response),
                Err(error) => self.report_error(options.error.as_ref(), options.payload.clone(), error),
            },
            InFlight::Raw => match outcome {
                Ok(_) => Settled::Synced,
                Err(error) => Settled::Failed(error),
            },
        };

        debug!(id = %id, outcome = ?settled, "Settled request");
        Ok(settled)
    }

    fn merge_saved(&mut self, attrs: Option<Attributes>, options: &SaveOptions, response: Value) -> Settled {
        let parsed = if options.parse {
            let schema = Rc::clone(&self.schema);
            schema.parse(self, response.clone())
        } else {
            to_attributes(response.clone())
        };

        // Server values win; proposed values fill in what the server omitted.
        let server_attrs = if options.wait {
            Some(extend(attrs.unwrap_or_default(), &parsed.unwrap_or_default()))
        } else {
            parsed
        };

        if let Some(server_attrs) = server_attrs
            && let Err(err) = self.set(server_attrs, options.set_options())
        {
            warn!(error = %err, "Server attributes rejected");
            return Settled::Rejected(err.to_string());
        }

        if let Some(success) = &options.success {
            success(self, &response);
        }
        self.trigger(Event::Sync {
            response,
            payload: options.payload.clone(),
        });
        Settled::Synced
    }

    fn merge_fetched(&mut self, options: &FetchOptions, response: Value) -> Settled {
        let parsed = if options.parse {
            let schema = Rc::clone(&self.schema);
            schema.parse(self, response.clone())
        } else {
            to_attributes(response.clone())
        };

        if let Some(server_attrs) = parsed
            && let Err(err) = self.set(server_attrs, options.set_options())
        {
            warn!(error = %err, "Fetched attributes rejected");
            return Settled::Rejected(err.to_string());
        }

        if let Some(success) = &options.success {
            success(self, &response);
        }
        self.trigger(Event::Sync {
            response,
            payload: options.payload.clone(),
        });
        Settled::Synced
    }

    /// Caller callback first, then the `"error"` notification, with the
    /// transport's error passed through unchanged.
    fn report_error(
        &mut self,
        callback: Option<&ErrorCallback>,
        payload: Option<Value>,
        error: TransportError,
    ) -> Settled {
        warn!(status = ?error.status, error = %error, "Request failed");
        if let Some(callback) = callback {
            callback(self, &error);
        }
        self.trigger(Event::Error {
            error: error.clone(),
            payload,
        });
        Settled::Failed(error)
    }
}
