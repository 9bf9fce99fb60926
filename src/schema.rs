//! The schema contract consumed by forms.
//!
//! A form never interprets validation rules itself.  It asks a [`Schema`] for the description
//! of a field ([`Schema::get_field`]) and for the errors of a whole model
//! ([`Schema::validate`]).  Validation may finish immediately or later, so its result is a
//! [`Validation`], which can always be awaited.

use std::fmt::{Debug, Formatter};
use std::future::{Future, IntoFuture};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ValidationErrors;

/// A shared, type-erased schema.
pub type SchemaRef = Rc<dyn Schema>;

/// The future behind a pending [`Validation`].
pub type ValidationFuture = LocalBoxFuture<'static, ValidationErrors>;

/// A source of field descriptions and model validation.
pub trait Schema {
    /// Describes the field `name`, or `None` when the schema does not know it.
    fn get_field(&self, name: &str) -> Option<FieldSchema>;

    /// Validates a complete model.
    fn validate(&self, model: &Value) -> Validation;

    /// The model a fresh instance of this schema starts with, if it declares one.
    fn default_values(&self) -> Option<Value> {
        None
    }
}

/////////////////////////////////////////////// Validation ////////////////////////////////////////////////

/// The result of running a validator: either errors that are already known or a future that
/// will produce them.
pub enum Validation {
    /// Validation finished synchronously.
    Ready(ValidationErrors),
    /// Validation is still running.
    Pending(ValidationFuture),
}

impl Validation {
    /// Wraps a future producing errors.
    pub fn pending(future: impl Future<Output = ValidationErrors> + 'static) -> Self {
        Validation::Pending(Box::pin(future))
    }

    /// True when the errors are already known.
    pub fn is_ready(&self) -> bool {
        matches!(self, Validation::Ready(_))
    }

    /// Takes the errors when they are already known and gives the validation back otherwise.
    pub fn try_ready(self) -> Result<ValidationErrors, Validation> {
        match self {
            Validation::Ready(errors) => Ok(errors),
            pending => Err(pending),
        }
    }
}

impl From<ValidationErrors> for Validation {
    fn from(errors: ValidationErrors) -> Self {
        Validation::Ready(errors)
    }
}

impl IntoFuture for Validation {
    type Output = ValidationErrors;
    type IntoFuture = ValidationFuture;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Validation::Ready(errors) => Box::pin(futures::future::ready(errors)),
            Validation::Pending(future) => future,
        }
    }
}

impl Debug for Validation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Validation::Ready(errors) => f.debug_tuple("Ready").field(errors).finish(),
            Validation::Pending(_) => f.write_str("Pending"),
        }
    }
}

//////////////////////////////////////////////// FieldType ////////////////////////////////////////////////

/// The type of a field as declared by its schema.
#[derive(Clone)]
pub enum FieldType {
    /// No declared type.
    Any,
    /// Text.
    String,
    /// Any number.
    Number,
    /// Whole numbers.
    Integer,
    /// True or false.
    Boolean,
    /// A calendar date, carried as a `YYYY-MM-DD` string.
    Date,
    /// A nested object described by its own schema.
    Object(SchemaRef),
    /// A list whose entries are all described by one element schema.
    List(Box<FieldSchema>),
}

impl FieldType {
    /// A short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object(_) => "object",
            FieldType::List(_) => "list",
        }
    }

    /// The schema an object field resolves its children against.
    ///
    /// A plain object type yields its own schema.  A list of objects yields the element schema,
    /// which is what an object field sees when it is the template inside a list.
    pub fn object_schema(&self) -> Option<SchemaRef> {
        match self {
            FieldType::Object(schema) => Some(schema.clone()),
            FieldType::List(element) => match &element.field_type {
                FieldType::Object(schema) => Some(schema.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Debug for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::List(element) => f.debug_tuple("List").field(element).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/////////////////////////////////////////////// FieldSchema ///////////////////////////////////////////////

/// One choice of a select-style field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Text shown to the user.
    pub label: String,
    /// Value stored in the model.
    pub value: Value,
}

/// The description of one field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// The declared type.
    pub field_type: FieldType,
    /// A human-readable label.
    pub label: Option<String>,
    /// The allowed choices, for select-style fields.
    pub options: Option<Vec<SelectOption>>,
    /// The value a fresh field starts with.
    pub default_value: Option<Value>,
    /// Whether the field must be present.
    pub required: bool,
}

impl FieldSchema {
    /// Describes a field of the given type with no other settings.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            label: None,
            options: None,
            default_value: None,
            required: false,
        }
    }

    /// The value given to an entry appended to this list field: the element's declared
    /// default, else the element object schema's defaults, else nothing.
    pub fn element_default(&self) -> Option<Value> {
        let FieldType::List(element) = &self.field_type else {
            return None;
        };
        element.default_value.clone().or_else(|| {
            element
                .field_type
                .object_schema()
                .and_then(|schema| schema.default_values())
        })
    }
}
