//! Form definitions.
//!
//! A form can be described in YAML (or JSON) instead of being assembled in code:
//!
//! ```yaml
//! name: book
//! validate_on_change: false
//! schema:
//!   type: object
//!   properties:
//!     title: { type: string }
//!     authors:
//!       type: array
//!       items:
//!         type: object
//!         properties:
//!           name: { type: string }
//!   required: [title]
//! fields:
//!   - kind: leaf
//!     name: title
//!   - kind: list
//!     name: authors
//!     min_length: 1
//!     item:
//!       kind: object
//!       name: author
//!       fields:
//!         - kind: leaf
//!           name: name
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FormError;
use crate::field::{FieldDef, ListDef};
use crate::form::{DEFAULT_FORM_NAME, FormBuilder};
use crate::json_schema::JsonSchema;

fn default_name() -> String {
    DEFAULT_FORM_NAME.to_string()
}

/// Form-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormConfig {
    /// The root path segment.
    #[serde(default = "default_name")]
    pub name: String,
    /// Validate after every field change.
    #[serde(default)]
    pub validate_on_change: bool,
    /// The form is nested inside another form.
    #[serde(default)]
    pub subform: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            validate_on_change: false,
            subform: false,
        }
    }
}

/// One field of a definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    /// A single input.
    Leaf { name: String },
    /// A keyed group of fields.
    Object {
        name: String,
        #[serde(default)]
        fields: Vec<FieldSpec>,
    },
    /// A list of entries built from `item`.
    List {
        name: String,
        item: Box<FieldSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default)]
        hide_add_button: bool,
        #[serde(default)]
        hide_remove_button: bool,
    },
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Leaf { name } | FieldSpec::Object { name, .. } | FieldSpec::List { name, .. } => name,
        }
    }

    /// Checks names and bounds throughout the subtree.
    pub fn validate(&self, location: &str) -> Result<(), FormError> {
        let here = format!("{}/{}", location, self.name());
        if self.name().is_empty() {
            return Err(FormError::InvalidDefinition(format!(
                "{}: field names must not be empty",
                location
            )));
        }
        if self.name().contains(crate::path::SEPARATOR) {
            return Err(FormError::InvalidDefinition(format!(
                "{}: field names must not contain '{}'",
                here,
                crate::path::SEPARATOR
            )));
        }
        match self {
            FieldSpec::Leaf { .. } => Ok(()),
            FieldSpec::Object { fields, .. } => validate_siblings(fields, &here),
            FieldSpec::List {
                item,
                min_length,
                max_length,
                ..
            } => {
                if let (Some(min), Some(max)) = (min_length, max_length)
                    && min > max
                {
                    return Err(FormError::InvalidDefinition(format!(
                        "{}: min_length {} exceeds max_length {}",
                        here, min, max
                    )));
                }
                item.validate(&here)
            }
        }
    }

    /// The field template this entry describes.
    pub fn to_def(&self) -> FieldDef {
        match self {
            FieldSpec::Leaf { name } => FieldDef::leaf(name.clone()),
            FieldSpec::Object { name, fields } => {
                FieldDef::object(name.clone(), fields.iter().map(FieldSpec::to_def).collect())
            }
            FieldSpec::List {
                name,
                item,
                min_length,
                max_length,
                hide_add_button,
                hide_remove_button,
            } => {
                let mut list = ListDef::new(name.clone(), item.to_def())
                    .hide_add_button(*hide_add_button)
                    .hide_remove_button(*hide_remove_button);
                list.min_length = *min_length;
                list.max_length = *max_length;
                FieldDef::List(list)
            }
        }
    }
}

fn validate_siblings(fields: &[FieldSpec], location: &str) -> Result<(), FormError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name()) {
            return Err(FormError::InvalidDefinition(format!(
                "{}: duplicate field name '{}'",
                location,
                field.name()
            )));
        }
        field.validate(location)?;
    }
    Ok(())
}

/// A complete form: settings, a JSON schema, an initial model and the field tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormDefinition {
    #[serde(flatten)]
    pub config: FormConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FormDefinition {
    /// Parses a YAML definition.
    pub fn from_yaml(content: &str) -> Result<Self, FormError> {
        let definition: FormDefinition = serde_yml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Parses a JSON definition.
    pub fn from_json(content: &str) -> Result<Self, FormError> {
        let definition: FormDefinition = serde_json::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Loads a definition from disk.  Files ending in `.json` are read as JSON and everything
    /// else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FormError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Checks the field tree.
    pub fn validate(&self) -> Result<(), FormError> {
        if self.config.name.is_empty() {
            return Err(FormError::InvalidDefinition(
                "form name must not be empty".to_string(),
            ));
        }
        if let Some(model) = &self.model
            && !model.is_object()
        {
            return Err(FormError::InvalidDefinition(
                "model must be an object".to_string(),
            ));
        }
        validate_siblings(&self.fields, "#")
    }

    /// The schema, checked and compiled.
    pub fn json_schema(&self) -> Result<Option<JsonSchema>, FormError> {
        self.schema
            .as_ref()
            .map(|schema| {
                JsonSchema::new(schema.clone())
                    .map_err(|e| FormError::InvalidDefinition(e.to_string()))
            })
            .transpose()
    }

    /// A builder configured from this definition.  Callbacks can be added before building.
    pub fn builder(&self) -> Result<FormBuilder, FormError> {
        let mut builder = FormBuilder::new()
            .name(self.config.name.clone())
            .validate_on_change(self.config.validate_on_change)
            .subform(self.config.subform)
            .fields(self.fields.iter().map(FieldSpec::to_def));
        if let Some(schema) = self.json_schema()? {
            builder = builder.schema(Rc::new(schema));
        }
        if let Some(model) = &self.model {
            builder = builder.model(model.clone());
        }
        Ok(builder)
    }
}
