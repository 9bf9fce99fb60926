//! # Formulary: Headless Forms
//!
//! Formulary builds forms out of composable fields and keeps them consistent with a model
//! tree.  It renders nothing.  Instead it produces a view tree that carries everything a
//! renderer needs: names, values, keys, errors, and which affordances to show.
//!
//! - **Fields**: leaves hold single values; [`ObjectField`] groups named children;
//!   [`ListField`] holds a resizable sequence of entries with stable identities
//! - **Validation**: a [`Schema`] and an optional custom function validate the whole model,
//!   synchronously or through futures, and their errors are merged field by field
//! - **Events**: every form has an [`EventBus`] on which outside code can `reset`,
//!   `setModel`, `submit` or `validate` the form, and on which fields announce
//!   `modelChange`
//! - **Definitions**: forms can be described in YAML with an embedded JSON schema
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ FormController (model, errors, events)  │
//! ├─────────────────────────────────────────┤
//! │ ObjectField / ListField (sub-models)    │
//! ├─────────────────────────────────────────┤
//! │ LeafField (single values)               │
//! └─────────────────────────────────────────┘
//!         ▲ FieldContext      │ set_model
//!         └───────────────────┘
//! ```
//!
//! Writes travel upward: a leaf writes into its parent's sub-model, which writes its new value
//! into its own parent, until the form's model is replaced.  Reads and errors travel downward
//! through the same [`FieldContext`] chain.
//!
//! ## A Login Form
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use formulary::{FieldDef, FormBuilder, JsonSchema};
//! use serde_json::json;
//!
//! let schema = JsonSchema::new(json!({
//!     "type": "object",
//!     "properties": {
//!         "login": {"type": "string"},
//!         "password": {"type": "string"}
//!     },
//!     "required": ["login", "password"]
//! }))
//! .unwrap();
//!
//! let failures = Rc::new(RefCell::new(Vec::new()));
//! let sink = failures.clone();
//! let form = FormBuilder::new()
//!     .schema(Rc::new(schema))
//!     .field(FieldDef::leaf("login"))
//!     .field(FieldDef::leaf("password"))
//!     .on_error(move |errors, _| sink.borrow_mut().push(errors.clone()))
//!     .build();
//! form.mount();
//!
//! form.events().submit();
//! assert_eq!(failures.borrow().len(), 1);
//! assert_eq!(failures.borrow()[0].len(), 2);
//! ```
//!
//! ## Lists
//!
//! ```rust
//! use formulary::{FieldDef, FormBuilder, ListDef};
//! use serde_json::json;
//!
//! let form = FormBuilder::new()
//!     .model(json!({"tags": ["rust"]}))
//!     .field(FieldDef::List(ListDef::new("tags", FieldDef::leaf("tag")).max_length(2)))
//!     .build();
//! form.mount();
//!
//! let tags = form.field("tags").unwrap();
//! let tags = tags.as_list().unwrap();
//! assert!(tags.add_list_element());
//! assert!(!tags.add_list_element());
//! assert_eq!(form.model(), json!({"tags": ["rust", null]}));
//! assert_eq!(form.field("form.tags.tags-1").unwrap().path(), "form.tags.tags-1");
//! ```

mod config;
mod errors;
mod event_bus;
mod field;
mod form;
mod json_schema;
mod list_field;
mod model_store;
mod object_field;
mod schema;
mod validate;

/// Command-line interface utilities for program termination and output formatting.
///
/// This module provides common CLI utilities for formulary binaries, including error
/// handling, formatted output, and program termination functions.
pub mod cli_utils;

/// Composing and parsing dotted field paths.
pub mod path;

pub use config::{FieldSpec, FormConfig, FormDefinition};
pub use errors::{FieldErrors, FormError, ValidationErrors};
pub use event_bus::{EventBus, EventKind, FormEvent, Listener, ListenerId, ModelChange};
pub use field::{
    EmitEvent, EventHandler, Field, FieldCallbacks, FieldContext, FieldDef, FieldNode, FieldProps,
    FieldView, LeafField, ListDef, ListItemView, ModelChangeHandler,
};
pub use form::{
    DEFAULT_FORM_NAME, ErrorHandler, FormBuilder, FormController, FormState, FormView,
    SubmitHandler,
};
pub use json_schema::{JsonSchema, SchemaError, get_value_type};
pub use list_field::{Entry, EntryErrors, EntryId, ListField, PositionalErrors};
pub use model_store::{ModelStore, StoreListenerId};
pub use object_field::ObjectField;
pub use schema::{FieldSchema, FieldType, Schema, SchemaRef, SelectOption, Validation, ValidationFuture};
pub use validate::{CustomValidation, validate_model};
