//! Create and edit forms driven by a field schema

use crate::api::ResourceApi;
use crate::error::{ClientError, ClientResult, FieldErrors};
use crate::schema::{Field, FieldKind, FormSchema, FormValues, input_text};
use klinika_core::{Resource, resource::validate_payload};
use serde_json::Value;
use std::{
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::Arc,
};
use tracing::{debug, warn};

/// Submission state of a form
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormState {
    /// Not submitted yet
    #[default]
    Idle,
    /// Request in flight
    Submitting,
    /// Saved; the form is closed
    Success,
    /// Rejected locally or by the server
    Error(FormError),
}

/// Why a submission failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Client-side messages shown next to each input
    Fields(FieldErrors),
    /// One message for the whole form
    Global(String),
}

/// Inputs, validator and state shared by create and edit forms
#[derive(Debug, Clone)]
pub struct FormModel {
    header: String,
    fields: Vec<Field>,
    schema: FormSchema,
    values: FormValues,
    state: FormState,
    open: bool,
}

impl FormModel {
    /// Open a form with every input at its initial value
    #[must_use]
    pub fn new(header: impl Into<String>, fields: Vec<Field>) -> Self {
        let schema = FormSchema::compile(&fields);
        let values = fields
            .iter()
            .map(|field| (field.identifier.clone(), field.initial_value()))
            .collect();
        Self {
            header: header.into(),
            fields,
            schema,
            values,
            state: FormState::Idle,
            open: true,
        }
    }

    /// Form title
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Field descriptors, in display order
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Set an input's raw value
    pub fn set(&mut self, identifier: impl Into<String>, value: impl Into<String>) {
        self.values.insert(identifier.into(), value.into());
    }

    /// Current raw value of an input
    #[must_use]
    pub fn value(&self, identifier: &str) -> Option<&str> {
        self.values.get(identifier).map(String::as_str)
    }

    /// Every raw value
    #[must_use]
    pub const fn values(&self) -> &FormValues {
        &self.values
    }

    /// Submission state
    #[must_use]
    pub const fn state(&self) -> &FormState {
        &self.state
    }

    /// Message to show next to `identifier` after a failed submission
    #[must_use]
    pub fn field_error(&self, identifier: &str) -> Option<&str> {
        match &self.state {
            FormState::Error(FormError::Fields(errors)) => errors.get(identifier).map(String::as_str),
            _ => None,
        }
    }

    /// Banner message after a failed submission
    #[must_use]
    pub fn global_error(&self) -> Option<&str> {
        match &self.state {
            FormState::Error(FormError::Global(message)) => Some(message),
            _ => None,
        }
    }

    /// Whether the modal is shown
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Hide the modal
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Fill inputs from a fetched record; password inputs stay empty
    fn prefill(&mut self, record: &Value) {
        for field in &self.fields {
            if matches!(field.kind, FieldKind::Password) {
                continue;
            }
            let text = match record.get(&field.identifier) {
                Some(Value::Null) | None => field.initial_value(),
                Some(_) => input_text(record, &field.identifier),
            };
            self.values.insert(field.identifier.clone(), text);
        }
    }

    fn fail(&mut self, error: FormError) {
        self.state = FormState::Error(error);
    }

    /// Validate inputs and build the payload; never touches the network
    fn prepare<P>(&mut self) -> ClientResult<P>
    where
        P: serde::de::DeserializeOwned + validator::Validate,
    {
        let body = match self.schema.validate(&self.values) {
            Ok(body) => body,
            Err(errors) => {
                self.fail(FormError::Fields(errors.clone()));
                return Err(ClientError::Validation { errors });
            }
        };

        let payload: P = match serde_json::from_value(Value::Object(body)) {
            Ok(payload) => payload,
            Err(err) => {
                self.fail(FormError::Global(format!("Invalid input: {err}")));
                return Err(err.into());
            }
        };

        if let Err(err) = validate_payload(&payload) {
            let err = ClientError::from(err);
            if let ClientError::Validation { errors } = &err {
                self.fail(FormError::Fields(errors.clone()));
            } else {
                self.fail(FormError::Global(err.display_message()));
            }
            return Err(err);
        }

        Ok(payload)
    }

    fn finish<R>(&mut self, result: ClientResult<R>) -> ClientResult<R> {
        match result {
            Ok(record) => {
                self.state = FormState::Success;
                self.open = false;
                Ok(record)
            }
            Err(err) => {
                warn!("{} failed: {}", self.header, err);
                self.fail(FormError::Global(err.display_message()));
                Err(err)
            }
        }
    }
}

/// Form creating a new record
pub struct CreateForm<R: Resource, A: ResourceApi<R> + ?Sized> {
    api: Arc<A>,
    model: FormModel,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> std::fmt::Debug for CreateForm<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateForm")
            .field("resource", &R::NAME)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> CreateForm<R, A> {
    /// Open an empty create form
    pub fn new(api: Arc<A>, header: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            api,
            model: FormModel::new(header, fields),
            _resource: PhantomData,
        }
    }

    /// Validate, then create the record
    ///
    /// Invalid input is reported per field and nothing is sent. On success
    /// the form closes.
    ///
    /// # Errors
    ///
    /// Returns the validation error or the server's error.
    pub async fn submit(&mut self) -> ClientResult<R> {
        let payload: R::Payload = self.model.prepare()?;
        self.model.state = FormState::Submitting;
        debug!("Creating {}", R::NAME);
        let result = self.api.create(&payload).await;
        self.model.finish(result)
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> Deref for CreateForm<R, A> {
    type Target = FormModel;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> DerefMut for CreateForm<R, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.model
    }
}

/// Form editing an existing record
pub struct EditForm<R: Resource, A: ResourceApi<R> + ?Sized> {
    api: Arc<A>,
    id: R::Id,
    model: FormModel,
    load_error: Option<String>,
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> std::fmt::Debug for EditForm<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditForm")
            .field("resource", &R::NAME)
            .field("id", &self.id)
            .field("model", &self.model)
            .field("load_error", &self.load_error)
            .finish_non_exhaustive()
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> EditForm<R, A> {
    /// Fetch record `id` and open the form pre-filled with it
    ///
    /// A failed fetch still opens the form, showing the error; it then
    /// refuses to submit.
    pub async fn open(api: Arc<A>, header: impl Into<String>, fields: Vec<Field>, id: R::Id) -> Self {
        let mut model = FormModel::new(header, fields);
        let load_error = match api.get(id).await {
            Ok(record) => {
                let value = serde_json::to_value(&record).unwrap_or(Value::Null);
                model.prefill(&value);
                None
            }
            Err(err) => {
                warn!("Failed to load {} {}: {}", R::NAME, id, err);
                let message = err.display_message();
                model.fail(FormError::Global(message.clone()));
                Some(message)
            }
        };
        Self {
            api,
            id,
            model,
            load_error,
        }
    }

    /// Id of the record being edited
    #[must_use]
    pub const fn id(&self) -> R::Id {
        self.id
    }

    /// Whether the record was fetched
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.load_error.is_none()
    }

    /// Validate, then update the record
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotLoaded`] when the record never loaded, the
    /// validation error, or the server's error.
    pub async fn submit(&mut self) -> ClientResult<R> {
        if let Some(message) = &self.load_error {
            return Err(ClientError::NotLoaded {
                message: message.clone(),
            });
        }
        let payload: R::Payload = self.model.prepare()?;
        self.model.state = FormState::Submitting;
        debug!("Updating {} {}", R::NAME, self.id);
        let result = self.api.update(self.id, &payload).await;
        self.model.finish(result)
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> Deref for EditForm<R, A> {
    type Target = FormModel;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> DerefMut for EditForm<R, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.model
    }
}
