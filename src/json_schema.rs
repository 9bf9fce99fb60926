//! # JSON Schema Backed Forms
//!
//! [`JsonSchema`] implements [`Schema`] over a JSON schema document.  Unlike a plain
//! conformance check it does not stop at the first failure: every property is checked and the
//! failures are collected into a [`ValidationErrors`] tree shaped like the model, so each field
//! of a form can find its own messages.
//!
//! Supported keywords:
//!
//! - `type`: null, boolean, integer, number, string, array, object
//! - `properties`, `required`, `items` (one schema, or one per position)
//! - `enum`, `oneOf`
//! - `minLength`, `maxLength`, `pattern`, `format: "date"`
//! - `minimum`, `maximum`
//! - `title` (used as the field label), `default`
//!
//! Required fields treat `null` and the empty string as missing, since that is what an
//! untouched text input holds.
//!
//! ```rust
//! use formulary::{JsonSchema, Schema};
//! use serde_json::json;
//!
//! let schema = JsonSchema::new(json!({
//!     "type": "object",
//!     "properties": {
//!         "login": {"type": "string", "title": "Login"},
//!         "age": {"type": "integer", "minimum": 18}
//!     },
//!     "required": ["login"]
//! }))
//! .unwrap();
//!
//! let errors = schema.validate(&json!({"login": "", "age": 12})).try_ready().unwrap();
//! assert_eq!(errors.messages("login"), ["Login is required".to_string()]);
//! assert_eq!(errors.messages("age"), ["age must be at least 18".to_string()]);
//! ```

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::{FieldErrors, ValidationErrors};
use crate::schema::{FieldSchema, FieldType, Schema, SelectOption, Validation};

pub(crate) const TYPE_KEY: &str = "type";
pub(crate) const PROPERTIES_KEY: &str = "properties";
pub(crate) const REQUIRED_KEY: &str = "required";
pub(crate) const ITEMS_KEY: &str = "items";
pub(crate) const ENUM_KEY: &str = "enum";
pub(crate) const ONE_OF_KEY: &str = "oneOf";
pub(crate) const TITLE_KEY: &str = "title";
pub(crate) const DEFAULT_KEY: &str = "default";
pub(crate) const FORMAT_KEY: &str = "format";
pub(crate) const PATTERN_KEY: &str = "pattern";
pub(crate) const MIN_LENGTH_KEY: &str = "minLength";
pub(crate) const MAX_LENGTH_KEY: &str = "maxLength";
pub(crate) const MINIMUM_KEY: &str = "minimum";
pub(crate) const MAXIMUM_KEY: &str = "maximum";

pub(crate) const TYPE_NULL: &str = "null";
pub(crate) const TYPE_BOOLEAN: &str = "boolean";
pub(crate) const TYPE_INTEGER: &str = "integer";
pub(crate) const TYPE_NUMBER: &str = "number";
pub(crate) const TYPE_STRING: &str = "string";
pub(crate) const TYPE_ARRAY: &str = "array";
pub(crate) const TYPE_OBJECT: &str = "object";

const FORMAT_DATE: &str = "date";
const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Returns the JSON type name of a value.
pub fn get_value_type(value: &Value) -> String {
    match value {
        Value::Null => TYPE_NULL,
        Value::Bool(_) => TYPE_BOOLEAN,
        Value::Number(n) if n.is_i64() || n.is_u64() => TYPE_INTEGER,
        Value::Number(_) => TYPE_NUMBER,
        Value::String(_) => TYPE_STRING,
        Value::Array(_) => TYPE_ARRAY,
        Value::Object(_) => TYPE_OBJECT,
    }
    .to_string()
}

//////////////////////////////////////////////// SchemaError ////////////////////////////////////////////////

/// Errors raised when a JSON schema document cannot back a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document is structurally unusable.
    InvalidSchema {
        /// Where in the document the problem is.
        location: String,
        /// What is wrong.
        reason: String,
    },
    /// A `pattern` keyword does not compile.
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// The regex compiler's complaint.
        reason: String,
    },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::InvalidSchema { location, reason } => {
                write!(f, "Invalid schema at '{}': {}", location, reason)
            }
            SchemaError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid pattern '{}': {}", pattern, reason)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

///////////////////////////////////////////////// JsonSchema ////////////////////////////////////////////////

type AsyncCheck = Rc<dyn Fn(Value) -> LocalBoxFuture<'static, bool>>;

#[derive(Clone)]
struct AsyncFieldValidator {
    field: String,
    message: String,
    check: AsyncCheck,
}

/// A form schema described by a JSON schema document.
#[derive(Clone)]
pub struct JsonSchema {
    schema: Value,
    patterns: Rc<HashMap<String, Regex>>,
    async_validators: Vec<AsyncFieldValidator>,
}

impl JsonSchema {
    /// Checks `schema` and wraps it.  The root must describe an object.
    pub fn new(schema: Value) -> Result<Self, SchemaError> {
        let mut patterns = HashMap::new();
        check_schema(&schema, "#", &mut patterns)?;
        let root_type = schema.get(TYPE_KEY).and_then(Value::as_str);
        if root_type != Some(TYPE_OBJECT) {
            return Err(SchemaError::InvalidSchema {
                location: "#".to_string(),
                reason: "form schemas must have type object".to_string(),
            });
        }
        Ok(JsonSchema {
            schema,
            patterns: Rc::new(patterns),
            async_validators: Vec::new(),
        })
    }

    /// Parses the document from JSON text.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let schema: Value = serde_json::from_str(text).map_err(|e| SchemaError::InvalidSchema {
            location: "#".to_string(),
            reason: e.to_string(),
        })?;
        Self::new(schema)
    }

    /// The underlying document.
    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Attaches a validator for the top-level property `field` that resolves later.  When it
    /// resolves to `false`, `message` is reported for the field.  A schema with any such
    /// validator returns pending validations.
    pub fn with_async_validator<F, Fut>(
        mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + 'static,
        Fut: Future<Output = bool> + 'static,
    {
        let check: AsyncCheck = Rc::new(move |value| Box::pin(check(value)));
        self.async_validators.push(AsyncFieldValidator {
            field: field.into(),
            message: message.into(),
            check,
        });
        self
    }

    /// Runs the synchronous keywords only.
    pub fn collect_errors(&self, model: &Value) -> ValidationErrors {
        let empty = Map::new();
        let object = model.as_object().unwrap_or(&empty);
        self.check_object(object, &self.schema)
    }

    fn child(&self, schema: &Value) -> JsonSchema {
        JsonSchema {
            schema: schema.clone(),
            patterns: self.patterns.clone(),
            async_validators: Vec::new(),
        }
    }

    fn properties(&self) -> Option<&Map<String, Value>> {
        self.schema.get(PROPERTIES_KEY).and_then(Value::as_object)
    }

    fn is_required(&self, name: &str) -> bool {
        required_names(&self.schema).any(|required| required == name)
    }

    fn field_schema(&self, schema: &Value, required: bool) -> FieldSchema {
        let field_type = match schema.get(TYPE_KEY).and_then(Value::as_str) {
            Some(TYPE_STRING) if schema.get(FORMAT_KEY).and_then(Value::as_str) == Some(FORMAT_DATE) => {
                FieldType::Date
            }
            Some(TYPE_STRING) => FieldType::String,
            Some(TYPE_INTEGER) => FieldType::Integer,
            Some(TYPE_NUMBER) => FieldType::Number,
            Some(TYPE_BOOLEAN) => FieldType::Boolean,
            Some(TYPE_OBJECT) => FieldType::Object(Rc::new(self.child(schema))),
            Some(TYPE_ARRAY) => {
                let element = match schema.get(ITEMS_KEY) {
                    Some(items @ Value::Object(_)) => self.field_schema(items, false),
                    _ => FieldSchema::new(FieldType::Any),
                };
                FieldType::List(Box::new(element))
            }
            _ => FieldType::Any,
        };
        let options = schema.get(ENUM_KEY).and_then(Value::as_array).map(|values| {
            values
                .iter()
                .map(|value| SelectOption {
                    label: match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                    value: value.clone(),
                })
                .collect()
        });
        FieldSchema {
            field_type,
            label: schema.get(TITLE_KEY).and_then(Value::as_str).map(str::to_string),
            options,
            default_value: schema.get(DEFAULT_KEY).cloned(),
            required,
        }
    }

    fn check_object(&self, object: &Map<String, Value>, schema: &Value) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        let required: Vec<&str> = required_names(schema).collect();
        let properties = schema.get(PROPERTIES_KEY).and_then(Value::as_object);

        if let Some(properties) = properties {
            for (name, prop_schema) in properties {
                let label = label_for(name, prop_schema);
                match object.get(name) {
                    Some(value) if !is_blank(value) => {
                        let node = self.check_node(value, prop_schema, &label);
                        if !node.is_empty() {
                            errors.insert(name.clone(), node);
                        }
                    }
                    _ => {
                        if required.contains(&name.as_str()) {
                            errors.push(name.clone(), format!("{} is required", label));
                        }
                    }
                }
            }
        }

        for name in required {
            let declared = properties.is_some_and(|p| p.contains_key(name));
            if !declared && object.get(name).is_none_or(is_blank) {
                errors.push(name, format!("{} is required", name));
            }
        }

        errors
    }

    fn check_node(&self, value: &Value, schema: &Value, label: &str) -> FieldErrors {
        let Some(schema_obj) = schema.as_object() else {
            return FieldErrors::default();
        };

        if let Some(alternatives) = schema_obj.get(ONE_OF_KEY).and_then(Value::as_array) {
            let matched = alternatives
                .iter()
                .any(|alternative| self.check_node(value, alternative, label).is_empty());
            return if matched {
                FieldErrors::default()
            } else {
                FieldErrors::message(format!("{} does not match any allowed alternative", label))
            };
        }

        match schema_obj.get(TYPE_KEY).and_then(Value::as_str) {
            Some(TYPE_OBJECT) => match value {
                Value::Object(object) => FieldErrors::Object(self.check_object(object, schema)),
                _ => type_mismatch(label, TYPE_OBJECT, value),
            },
            Some(TYPE_ARRAY) => match value {
                Value::Array(items) => self.check_array(items, schema_obj, label),
                _ => type_mismatch(label, TYPE_ARRAY, value),
            },
            Some(expected) if !type_matches(expected, value) => type_mismatch(label, expected, value),
            _ => FieldErrors::Messages(self.check_scalar(value, schema_obj, label)),
        }
    }

    fn check_array(&self, items: &[Value], schema: &Map<String, Value>, label: &str) -> FieldErrors {
        let item_schema = |index: usize| -> Option<&Value> {
            match schema.get(ITEMS_KEY)? {
                Value::Array(positional) => positional.get(index),
                single => Some(single),
            }
        };
        let errors = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let node = item_schema(index)
                    .map(|s| self.check_node(item, s, &format!("{} item {}", label, index + 1)))?;
                (!node.is_empty()).then_some(node)
            })
            .collect();
        FieldErrors::List(errors)
    }

    fn check_scalar(&self, value: &Value, schema: &Map<String, Value>, label: &str) -> Vec<String> {
        let mut messages = Vec::new();

        if let Some(allowed) = schema.get(ENUM_KEY).and_then(Value::as_array)
            && !allowed.contains(value)
        {
            let shown = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            messages.push(format!("'{}' is not an allowed value for {}", shown, label));
        }

        if let Value::String(text) = value {
            let length = text.chars().count() as u64;
            if let Some(min) = schema.get(MIN_LENGTH_KEY).and_then(Value::as_u64)
                && length < min
            {
                messages.push(format!("{} must be at least {} characters", label, min));
            }
            if let Some(max) = schema.get(MAX_LENGTH_KEY).and_then(Value::as_u64)
                && length > max
            {
                messages.push(format!("{} must be at most {} characters", label, max));
            }
            if let Some(pattern) = schema.get(PATTERN_KEY).and_then(Value::as_str)
                && let Some(regex) = self.patterns.get(pattern)
                && !regex.is_match(text)
            {
                messages.push(format!("{} does not match pattern {}", label, pattern));
            }
            if schema.get(FORMAT_KEY).and_then(Value::as_str) == Some(FORMAT_DATE)
                && chrono::NaiveDate::parse_from_str(text, DATE_LAYOUT).is_err()
            {
                messages.push(format!("{} must be a date in YYYY-MM-DD format", label));
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = schema.get(MINIMUM_KEY).and_then(Value::as_f64)
                && number < min
            {
                messages.push(format!("{} must be at least {}", label, schema[MINIMUM_KEY]));
            }
            if let Some(max) = schema.get(MAXIMUM_KEY).and_then(Value::as_f64)
                && number > max
            {
                messages.push(format!("{} must be at most {}", label, schema[MAXIMUM_KEY]));
            }
        }

        messages
    }
}

impl Schema for JsonSchema {
    fn get_field(&self, name: &str) -> Option<FieldSchema> {
        let schema = self.properties()?.get(name)?;
        Some(self.field_schema(schema, self.is_required(name)))
    }

    fn validate(&self, model: &Value) -> Validation {
        let errors = self.collect_errors(model);
        if self.async_validators.is_empty() {
            return Validation::Ready(errors);
        }
        let checks: Vec<_> = self
            .async_validators
            .iter()
            .map(|validator| {
                let value = model.get(&validator.field).cloned().unwrap_or(Value::Null);
                let field = validator.field.clone();
                let message = validator.message.clone();
                let check = (validator.check)(value);
                async move { (field, message, check.await) }
            })
            .collect();
        Validation::pending(async move {
            let mut errors = errors;
            for (field, message, passed) in futures::future::join_all(checks).await {
                if !passed {
                    errors.push(field, message);
                }
            }
            errors
        })
    }

    fn default_values(&self) -> Option<Value> {
        let mut defaults = Map::new();
        for (name, schema) in self.properties()? {
            if let Some(default) = schema.get(DEFAULT_KEY) {
                defaults.insert(name.clone(), default.clone());
            } else if schema.get(TYPE_KEY).and_then(Value::as_str) == Some(TYPE_OBJECT)
                && let Some(Value::Object(nested)) = self.child(schema).default_values()
                && !nested.is_empty()
            {
                defaults.insert(name.clone(), Value::Object(nested));
            }
        }
        Some(Value::Object(defaults))
    }
}

impl Debug for JsonSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema")
            .field("schema", &self.schema)
            .field("async_validators", &self.async_validators.len())
            .finish()
    }
}

fn required_names(schema: &Value) -> impl Iterator<Item = &str> {
    schema
        .get(REQUIRED_KEY)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn label_for(name: &str, schema: &Value) -> String {
    schema
        .get(TITLE_KEY)
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        TYPE_NULL => value.is_null(),
        TYPE_BOOLEAN => value.is_boolean(),
        TYPE_INTEGER => value.is_i64() || value.is_u64(),
        TYPE_NUMBER => value.is_number(),
        TYPE_STRING => value.is_string(),
        TYPE_ARRAY => value.is_array(),
        TYPE_OBJECT => value.is_object(),
        _ => true,
    }
}

fn type_mismatch(label: &str, expected: &str, value: &Value) -> FieldErrors {
    FieldErrors::message(format!(
        "{} must be of type {}, got {}",
        label,
        expected,
        get_value_type(value)
    ))
}

fn check_schema(
    schema: &Value,
    location: &str,
    patterns: &mut HashMap<String, Regex>,
) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidSchema {
        location: location.to_string(),
        reason: reason.to_string(),
    };
    let schema_obj = schema
        .as_object()
        .ok_or_else(|| invalid("schema must be an object"))?;

    if let Some(schema_type) = schema_obj.get(TYPE_KEY) {
        let schema_type = schema_type
            .as_str()
            .ok_or_else(|| invalid("type must be a string"))?;
        if !matches!(
            schema_type,
            TYPE_NULL | TYPE_BOOLEAN | TYPE_INTEGER | TYPE_NUMBER | TYPE_STRING | TYPE_ARRAY | TYPE_OBJECT
        ) {
            return Err(invalid(&format!("unknown schema type: {}", schema_type)));
        }
    }

    if let Some(properties) = schema_obj.get(PROPERTIES_KEY) {
        let properties = properties
            .as_object()
            .ok_or_else(|| invalid("properties must be an object"))?;
        for (name, property) in properties {
            check_schema(property, &format!("{}/{}", location, name), patterns)?;
        }
    }

    if let Some(required) = schema_obj.get(REQUIRED_KEY) {
        let required = required
            .as_array()
            .ok_or_else(|| invalid("required must be an array"))?;
        if !required.iter().all(Value::is_string) {
            return Err(invalid("required property names must be strings"));
        }
    }

    match schema_obj.get(ITEMS_KEY) {
        Some(Value::Array(positional)) => {
            for (index, item) in positional.iter().enumerate() {
                check_schema(item, &format!("{}/items/{}", location, index), patterns)?;
            }
        }
        Some(item) => check_schema(item, &format!("{}/items", location), patterns)?,
        None => {}
    }

    if let Some(alternatives) = schema_obj.get(ONE_OF_KEY) {
        let alternatives = alternatives
            .as_array()
            .ok_or_else(|| invalid("oneOf must be an array"))?;
        for (index, alternative) in alternatives.iter().enumerate() {
            check_schema(alternative, &format!("{}/oneOf/{}", location, index), patterns)?;
        }
    }

    if let Some(values) = schema_obj.get(ENUM_KEY)
        && !values.is_array()
    {
        return Err(invalid("enum must be an array"));
    }

    if let Some(pattern) = schema_obj.get(PATTERN_KEY) {
        let pattern = pattern
            .as_str()
            .ok_or_else(|| invalid("pattern must be a string"))?;
        if !patterns.contains_key(pattern) {
            let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            patterns.insert(pattern.to_string(), regex);
        }
    }

    Ok(())
}
