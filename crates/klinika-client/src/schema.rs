//! Declarative form fields and the validator compiled from them
//!
//! A page lists its inputs as [`Field`] descriptors. Each [`FieldKind`]
//! carries one pure rule that turns the raw text of an input into a JSON
//! value or a message. [`FormSchema::compile`] folds the whole list into a
//! single validator whose output object deserializes into the resource's
//! payload type.

use crate::error::FieldErrors;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use validator::ValidateEmail;

/// Raw input values keyed by field identifier
pub type FormValues = IndexMap<String, String>;

/// Minimum password length accepted by password inputs
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// One choice of a `select` input
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    /// Value sent to the server, e.g. a numeric id
    pub value: Value,
    /// Text shown to the user
    pub label: String,
}

impl SelectOption {
    /// Create an option
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }

    /// Option for a record returned by a reference endpoint
    ///
    /// Uses the record's `id` as value and `label_field` as label. Returns
    /// `None` when the record has no id.
    #[must_use]
    pub fn from_record(record: &Value, label_field: &str) -> Option<Self> {
        let value = record.get("id").filter(|v| !v.is_null())?.clone();
        let label = match record.get(label_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => value_text(&value),
            Some(other) => other.to_string(),
        };
        Some(Self { value, label })
    }

    /// Text form of the value, as held by the input
    #[must_use]
    pub fn key(&self) -> String {
        value_text(&self.value)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Input kind, each with its own validation rule
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Single-line free text
    Text,
    /// Email address
    Email,
    /// Secret of at least [`MIN_PASSWORD_LENGTH`] characters
    Password,
    /// Boolean toggle
    Checkbox,
    /// File path or name
    File,
    /// One of a fixed list of choices
    Select {
        /// Available choices
        options: Vec<SelectOption>,
    },
    /// Multi-line free text
    Textarea,
}

impl FieldKind {
    /// Input type name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Password => "password",
            Self::Checkbox => "checkbox",
            Self::File => "file",
            Self::Select { .. } => "select",
            Self::Textarea => "textarea",
        }
    }

    /// Convert non-empty raw input into its JSON value
    ///
    /// # Errors
    ///
    /// Returns the message to show next to the input.
    pub fn check(&self, raw: &str) -> Result<Value, String> {
        match self {
            Self::Text | Self::File | Self::Textarea => Ok(Value::String(raw.to_string())),
            Self::Email => {
                if raw.to_string().validate_email() {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err("must be a valid email address".to_string())
                }
            }
            Self::Password => {
                if raw.chars().count() >= MIN_PASSWORD_LENGTH {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(format!("must be at least {MIN_PASSWORD_LENGTH} characters"))
                }
            }
            Self::Checkbox => parse_checkbox(raw)
                .map(Value::Bool)
                .ok_or_else(|| "must be checked or unchecked".to_string()),
            Self::Select { options } => {
                if options.is_empty() {
                    return Err("has no options to choose from".to_string());
                }
                options
                    .iter()
                    .find(|option| option.key() == raw)
                    .map(|option| option.value.clone())
                    .ok_or_else(|| "is not one of the available options".to_string())
            }
        }
    }
}

fn parse_checkbox(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" | "" => Some(false),
        _ => None,
    }
}

/// Descriptor of one form input
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// JSON field the input writes, e.g. `categoryId`
    pub identifier: String,
    /// Label
    pub name: String,
    /// Input kind and its rule
    pub kind: FieldKind,
    /// Hint shown in an empty input
    pub placeholder: Option<String>,
    /// Kept out of the rendered form but still submitted
    pub hidden: bool,
    /// Empty input is an error; fields are required unless marked optional
    pub required: bool,
    /// Longest accepted input, in characters
    pub max_length: Option<usize>,
    /// Value the input starts with
    pub default_value: Option<String>,
}

impl Field {
    /// Create a required field of `kind`
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            kind,
            placeholder: None,
            hidden: false,
            required: true,
            max_length: None,
            default_value: None,
        }
    }

    /// Single-line text input
    pub fn text(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::Text)
    }

    /// Email input
    pub fn email(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::Email)
    }

    /// Password input
    pub fn password(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::Password)
    }

    /// Checkbox input
    pub fn checkbox(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::Checkbox)
    }

    /// File input
    pub fn file(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::File)
    }

    /// Select input; options may be filled in later from a reference endpoint
    pub fn select(
        identifier: impl Into<String>,
        name: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self::new(identifier, name, FieldKind::Select { options })
    }

    /// Multi-line text input
    pub fn textarea(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(identifier, name, FieldKind::Textarea)
    }

    /// Set the placeholder
    #[must_use]
    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Hide the input
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Accept an empty input, submitted as `null`
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Limit the input length
    #[must_use]
    pub const fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Set the starting value
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Replace the choices of a select input; other kinds are left alone
    pub fn set_options(&mut self, choices: Vec<SelectOption>) {
        if let FieldKind::Select { options } = &mut self.kind {
            *options = choices;
        }
    }

    /// Value the input holds when the form opens
    #[must_use]
    pub fn initial_value(&self) -> String {
        match (&self.default_value, &self.kind) {
            (Some(value), _) => value.clone(),
            (None, FieldKind::Checkbox) => "false".to_string(),
            (None, _) => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    identifier: String,
    kind: FieldKind,
    required: bool,
    max_length: Option<usize>,
}

impl CompiledRule {
    fn apply(&self, raw: Option<&str>) -> Result<Value, String> {
        let raw = raw.map(str::trim).unwrap_or_default();

        if raw.is_empty() && !matches!(self.kind, FieldKind::Checkbox) {
            return if self.required {
                Err("is required".to_string())
            } else {
                Ok(Value::Null)
            };
        }

        if let Some(max) = self.max_length
            && raw.chars().count() > max
        {
            return Err(format!("must be at most {max} characters"));
        }

        self.kind.check(raw)
    }
}

/// Combined validator for a list of fields
#[derive(Debug, Clone)]
pub struct FormSchema {
    rules: Vec<CompiledRule>,
}

impl FormSchema {
    /// Compile the rules of every field, in order
    #[must_use]
    pub fn compile(fields: &[Field]) -> Self {
        let rules = fields
            .iter()
            .map(|field| CompiledRule {
                identifier: field.identifier.clone(),
                kind: field.kind.clone(),
                required: field.required,
                max_length: field.max_length,
            })
            .collect();
        Self { rules }
    }

    /// Number of compiled fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the schema has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate raw input, producing the JSON body to submit
    ///
    /// Inputs without a field are ignored. Every failing field is reported,
    /// not just the first.
    ///
    /// # Errors
    ///
    /// Returns one message per invalid field.
    pub fn validate(&self, values: &FormValues) -> Result<Map<String, Value>, FieldErrors> {
        let mut body = Map::new();
        let mut errors = FieldErrors::new();

        for rule in &self.rules {
            match rule.apply(values.get(&rule.identifier).map(String::as_str)) {
                Ok(value) => {
                    body.insert(rule.identifier.clone(), value);
                }
                Err(message) => {
                    errors.insert(rule.identifier.clone(), message);
                }
            }
        }

        if errors.is_empty() {
            Ok(body)
        } else {
            Err(errors)
        }
    }
}

/// Convert a fetched record's field into the text an input would hold
#[must_use]
pub fn input_text(record: &Value, identifier: &str) -> String {
    record.get(identifier).map(value_text).unwrap_or_default()
}
