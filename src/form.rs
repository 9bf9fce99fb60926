//! # Form Controller
//!
//! The root of a form tree.  A [`FormController`] owns the model and the displayed errors, hands
//! a [`FieldContext`] to its top-level fields, and answers the control events of its
//! [`EventBus`]:
//!
//! | event      | effect                                                              |
//! |------------|---------------------------------------------------------------------|
//! | `reset`    | replace the model with the payload or the defaults, clear errors    |
//! | `setModel` | replace the model with the payload, keep errors                     |
//! | `submit`   | validate; call `on_submit` when valid and `on_error` otherwise      |
//! | `validate` | validate and display the errors                                     |
//!
//! Validation that finishes synchronously is applied before the event returns.  Pending
//! validation started by an event is parked on the form and driven by
//! [`FormController::settle`]; [`FormController::submit`] awaits its own pass directly.
//!
//! Passes are numbered.  A pass that resolves after a newer pass has already been applied runs
//! its callbacks but leaves the displayed errors alone.
//!
//! ```rust
//! use std::rc::Rc;
//! use formulary::{FieldDef, FormBuilder, JsonSchema};
//! use serde_json::json;
//!
//! let schema = JsonSchema::new(json!({
//!     "type": "object",
//!     "properties": {"title": {"type": "string"}},
//!     "required": ["title"]
//! }))
//! .unwrap();
//!
//! let form = FormBuilder::new()
//!     .schema(Rc::new(schema))
//!     .field(FieldDef::leaf("title"))
//!     .build();
//! form.mount();
//!
//! form.events().validate();
//! assert_eq!(form.errors().messages("title"), ["title is required".to_string()]);
//!
//! form.field("title").unwrap().change(json!("Dune"));
//! form.events().validate();
//! assert!(form.errors().is_empty());
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use futures::future::LocalBoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{FieldErrors, ValidationErrors};
use crate::event_bus::{EventBus, EventKind, FormEvent, ListenerId};
use crate::field::{FieldContext, FieldDef, FieldNode, FieldView};
use crate::path;
use crate::schema::{FieldSchema, SchemaRef, Validation};
use crate::validate::{CustomValidation, validate_model};

/// The name of the root path when none is given.
pub const DEFAULT_FORM_NAME: &str = "form";

/// Called with the model of a valid submission.
pub type SubmitHandler = Rc<dyn Fn(&Value)>;

/// Called with the errors and the model of a rejected submission.
pub type ErrorHandler = Rc<dyn Fn(&ValidationErrors, &Value)>;

/// Where the form is in its submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    #[default]
    Idle,
    /// A validation pass is pending.
    Validating,
    /// `on_submit` is running.
    Submitting,
}

/// The headless render output of a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormView {
    pub name: String,
    /// False for subforms, which render inside another form's wrapper.
    pub has_form_wrapper: bool,
    pub state: FormState,
    pub errors: ValidationErrors,
    pub fields: Vec<FieldView>,
}

//////////////////////////////////////////////// FormBuilder ///////////////////////////////////////////////

/// Collects the settings of a form.
#[derive(Default)]
pub struct FormBuilder {
    name: Option<String>,
    schema: Option<SchemaRef>,
    model: Option<Value>,
    on_submit: Option<SubmitHandler>,
    on_error: Option<ErrorHandler>,
    custom_validation: Option<CustomValidation>,
    validate_on_change: bool,
    subform: bool,
    events: Option<EventBus>,
    fields: Vec<FieldDef>,
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root path segment.  Defaults to `form`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// The initial model.  Defaults to an empty object.
    pub fn model(mut self, model: Value) -> Self {
        self.model = Some(model);
        self
    }

    pub fn on_submit(mut self, handler: impl Fn(&Value) + 'static) -> Self {
        self.on_submit = Some(Rc::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&ValidationErrors, &Value) + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }

    /// Validation run after the schema's, with its errors merged behind the schema's.
    pub fn custom_validation(mut self, validation: impl Fn(&Value) -> Validation + 'static) -> Self {
        self.custom_validation = Some(Rc::new(validation));
        self
    }

    /// Validate after every field change.
    pub fn validate_on_change(mut self, enabled: bool) -> Self {
        self.validate_on_change = enabled;
        self
    }

    /// Mark the form as nested inside another; it then has no submit wrapper of its own.
    pub fn subform(mut self, subform: bool) -> Self {
        self.subform = subform;
        self
    }

    /// Use an existing bus instead of creating one.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Builds the form and its fields.  Nothing listens until [`FormController::mount`].
    pub fn build(self) -> Rc<FormController> {
        let bus = self.events.unwrap_or_default();
        let model = self.model.unwrap_or_else(|| Value::Object(Map::new()));
        Rc::new_cyclic(|this: &Weak<FormController>| {
            let context: Weak<dyn FieldContext> = this.clone();
            let fields = self
                .fields
                .iter()
                .map(|def| def.build(None, context.clone(), &bus))
                .collect();
            FormController {
                name: self.name.unwrap_or_else(|| DEFAULT_FORM_NAME.to_string()),
                schema: self.schema,
                custom_validation: self.custom_validation,
                on_submit: self.on_submit,
                on_error: self.on_error,
                validate_on_change: self.validate_on_change,
                subform: self.subform,
                bus,
                model: RefCell::new(model),
                errors: RefCell::new(ValidationErrors::new()),
                state: Cell::new(FormState::Idle),
                generation: Cell::new(0),
                applied: Cell::new(0),
                fields,
                subscriptions: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
                this: this.clone(),
            }
        })
    }
}

////////////////////////////////////////////// FormController //////////////////////////////////////////////

/// The root orchestrator of one form.
pub struct FormController {
    name: String,
    schema: Option<SchemaRef>,
    custom_validation: Option<CustomValidation>,
    on_submit: Option<SubmitHandler>,
    on_error: Option<ErrorHandler>,
    validate_on_change: bool,
    subform: bool,
    bus: EventBus,
    model: RefCell<Value>,
    errors: RefCell<ValidationErrors>,
    state: Cell<FormState>,
    generation: Cell<u64>,
    applied: Cell<u64>,
    fields: Vec<FieldNode>,
    subscriptions: RefCell<Vec<ListenerId>>,
    pending: RefCell<Vec<(Pass, LocalBoxFuture<'static, ()>)>>,
    this: Weak<FormController>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Validate,
    Submit,
}

impl FormController {
    /// The root path segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bus this form listens on.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_subform(&self) -> bool {
        self.subform
    }

    /// A copy of the model.
    pub fn model(&self) -> Value {
        self.model.borrow().clone()
    }

    /// A copy of the displayed errors.
    pub fn errors(&self) -> ValidationErrors {
        self.errors.borrow().clone()
    }

    pub fn state(&self) -> FormState {
        self.state.get()
    }

    /// The top-level fields.
    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }

    /// Finds a field by path, with or without the form name in front:
    /// `title`, `form.title` and `authors.authors-0.name` all work.
    pub fn field(&self, path: &str) -> Option<FieldNode> {
        let relative = path
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix(path::SEPARATOR))
            .unwrap_or(path);
        let (head, rest) = match relative.split_once(path::SEPARATOR) {
            Some((head, rest)) => (head, rest),
            None => (relative, ""),
        };
        self.fields
            .iter()
            .find(|field| field.name() == head)?
            .find(rest)
    }

    /// Subscribes to the control events and mounts every field.
    pub fn mount(&self) {
        {
            let mut subscriptions = self.subscriptions.borrow_mut();
            if subscriptions.is_empty() {
                for kind in [
                    EventKind::Reset,
                    EventKind::SetModel,
                    EventKind::Submit,
                    EventKind::Validate,
                ] {
                    let this = self.this.clone();
                    subscriptions.push(self.bus.subscribe(kind, move |event| {
                        if let Some(form) = this.upgrade() {
                            form.handle(event);
                        }
                    }));
                }
            }
        }
        for field in &self.fields {
            field.mount();
        }
        self.refresh();
        tracing::debug!(form = %self.name, fields = self.fields.len(), "form mounted");
    }

    /// Removes every listener this form and its fields hold on the bus and drops parked
    /// validation, whose callbacks then never run.
    pub fn unmount(&self) {
        for id in self.subscriptions.borrow_mut().drain(..) {
            self.bus.unsubscribe(id);
        }
        let dropped = std::mem::take(&mut *self.pending.borrow_mut());
        if !dropped.is_empty() {
            tracing::debug!(form = %self.name, passes = dropped.len(), "dropping parked validation");
        }
        self.state.set(FormState::Idle);
        for field in &self.fields {
            field.unmount();
        }
        tracing::debug!(form = %self.name, "form unmounted");
    }

    /// Validates the model and submits it when valid, waiting for pending validation.
    pub async fn submit(&self) {
        if let Some(pending) = self.start(Pass::Submit) {
            pending.await;
        }
    }

    /// What the form wrapper does when the user submits it.  Subforms have no wrapper, so this
    /// does nothing for them.
    pub fn native_submit(&self) {
        if self.subform {
            tracing::debug!(form = %self.name, "subform ignores native submit");
            return;
        }
        self.park(Pass::Submit);
    }

    /// Validates the model and displays the errors without submitting.
    pub fn validate(&self) {
        self.park(Pass::Validate);
    }

    /// Drives every pending validation started by events until none is left.
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.pending.borrow_mut());
            if pending.is_empty() {
                break;
            }
            futures::future::join_all(pending.into_iter().map(|(_, pass)| pass)).await;
        }
    }

    /// True while event-started validation is waiting for [`FormController::settle`].
    pub fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Re-renders every field whose value or messages changed.
    pub fn refresh(&self) -> bool {
        self.fields
            .iter()
            .fold(false, |rendered, field| field.refresh() | rendered)
    }

    pub fn view(&self) -> FormView {
        FormView {
            name: self.name.clone(),
            has_form_wrapper: !self.subform,
            state: self.state.get(),
            errors: self.errors(),
            fields: self.fields.iter().map(|field| field.view()).collect(),
        }
    }

    fn handle(&self, event: &FormEvent) {
        match event {
            FormEvent::Reset(payload) => self.reset(payload.clone()),
            FormEvent::SetModel(model) => self.replace_model(model.clone()),
            FormEvent::Submit => self.park(Pass::Submit),
            FormEvent::Validate => self.park(Pass::Validate),
            FormEvent::ModelChange(_) | FormEvent::Custom { .. } => {}
        }
    }

    fn reset(&self, payload: Option<Value>) {
        let model = payload
            .or_else(|| self.schema.as_ref().and_then(|schema| schema.default_values()))
            .unwrap_or_else(|| Value::Object(Map::new()));
        let generation = self.next_generation();
        self.applied.set(generation);
        *self.errors.borrow_mut() = ValidationErrors::new();
        self.state.set(FormState::Idle);
        self.replace_model(model);
    }

    fn replace_model(&self, model: Value) {
        *self.model.borrow_mut() = model;
        for field in &self.fields {
            field.sync();
        }
        self.refresh();
    }

    fn next_generation(&self) -> u64 {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        generation
    }

    fn park(&self, pass: Pass) {
        if let Some(pending) = self.start(pass) {
            let mut parked = self.pending.borrow_mut();
            // A newer validate pass supersedes older ones; they could only display stale errors.
            if pass == Pass::Validate {
                parked.retain(|(parked_pass, _)| *parked_pass != Pass::Validate);
            }
            parked.push((pass, pending));
        }
    }

    fn start(&self, pass: Pass) -> Option<LocalBoxFuture<'static, ()>> {
        let model = self.model();
        let validation = validate_model(
            &model,
            self.schema.as_deref(),
            self.custom_validation.as_deref(),
        );
        let generation = self.next_generation();
        match validation.try_ready() {
            Ok(errors) => {
                self.finish(generation, pass, &model, errors);
                None
            }
            Err(pending) => {
                self.state.set(FormState::Validating);
                let this = self.this.clone();
                Some(Box::pin(async move {
                    let errors = pending.await;
                    if let Some(form) = this.upgrade() {
                        form.finish(generation, pass, &model, errors);
                    }
                }))
            }
        }
    }

    fn finish(&self, generation: u64, pass: Pass, model: &Value, errors: ValidationErrors) {
        if generation >= self.applied.get() {
            self.applied.set(generation);
            *self.errors.borrow_mut() = errors.clone();
            self.refresh();
        } else {
            tracing::debug!(form = %self.name, generation, "stale validation result not displayed");
        }
        if generation == self.generation.get() {
            self.state.set(FormState::Idle);
        }
        let Pass::Submit = pass else {
            return;
        };
        if errors.is_empty() {
            if let Some(on_submit) = &self.on_submit {
                let previous = self.state.replace(FormState::Submitting);
                on_submit(model);
                self.state.set(previous);
            }
        } else {
            tracing::debug!(form = %self.name, fields = errors.len(), "submission rejected");
            if let Some(on_error) = &self.on_error {
                on_error(&errors, model);
            }
        }
    }
}

impl FieldContext for FormController {
    fn set_model(&self, name: &str, value: Value) {
        {
            let mut model = self.model.borrow_mut();
            if !model.is_object() {
                tracing::warn!(form = %self.name, "replacing non-object model before writing {}", name);
                *model = Value::Object(Map::new());
            }
            if let Value::Object(map) = &mut *model {
                if map.get(name) == Some(&value) {
                    return;
                }
                map.insert(name.to_string(), value);
            }
        }
        if self.validate_on_change {
            self.validate();
        }
        self.refresh();
    }

    fn get_model(&self, name: &str) -> Value {
        self.model.borrow().get(name).cloned().unwrap_or(Value::Null)
    }

    fn get_schema(&self, name: &str) -> Option<FieldSchema> {
        self.schema.as_ref()?.get_field(name)
    }

    fn get_errors(&self, name: &str) -> Option<FieldErrors> {
        self.errors.borrow().get(name).cloned()
    }

    fn path(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for FormController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormController")
            .field("name", &self.name)
            .field("model", &self.model.borrow())
            .field("errors", &self.errors.borrow())
            .field("state", &self.state.get())
            .field("fields", &self.fields)
            .finish()
    }
}
