//! # Field Contract
//!
//! Every field of a form, whether a single input or an aggregate of other fields, implements
//! [`Field`].  A field does not own its value.  It reads and writes through the
//! [`FieldContext`] of its parent, which is the form itself for top-level fields and an
//! [`ObjectField`] or [`ListField`] below that.
//!
//! ```text
//! FormController ── FieldContext ──▶ ObjectField "publisher" ── FieldContext ──▶ LeafField "name"
//!        ▲                                  │
//!        └──────────── set_model ───────────┘
//! ```
//!
//! Forms are described by [`FieldDef`] templates and built into [`FieldNode`] trees when the form
//! is constructed.  Lists keep their template and build one child per entry as entries appear.
//!
//! Children hold their parent weakly.  A field whose parent has been dropped reads `null` and
//! ignores writes.

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::errors::FieldErrors;
use crate::event_bus::{EventBus, EventKind, FormEvent, ListenerId, ModelChange};
use crate::list_field::{EntryErrors, EntryId, ListField, PositionalErrors};
use crate::object_field::ObjectField;
use crate::path;
use crate::schema::{FieldSchema, SelectOption};

///////////////////////////////////////////////// contracts ////////////////////////////////////////////////

/// The capabilities a parent hands to its children.
pub trait FieldContext {
    /// Writes the value of the child `name`.
    fn set_model(&self, name: &str, value: Value);

    /// Reads the value of the child `name`; `null` when there is none.
    fn get_model(&self, name: &str) -> Value;

    /// Describes the child `name`.
    fn get_schema(&self, name: &str) -> Option<FieldSchema>;

    /// The validation errors reported for the child `name`.
    fn get_errors(&self, name: &str) -> Option<FieldErrors>;

    /// The full path of the parent.
    fn path(&self) -> String;
}

/// A mounted piece of a form.
pub trait Field {
    /// The name under which the parent stores this field's value.
    fn name(&self) -> String;

    /// Changes the name.  Lists rename their children when entries move.
    fn rename(&self, name: String);

    /// The dotted path from the form root, e.g. `form.authors.authors-1.name`.
    fn path(&self) -> String;

    /// The current value.
    fn value(&self) -> Value;

    /// Replaces the value, as an input does when the user edits it.
    fn change(&self, value: Value);

    /// The messages reported for this field itself.
    fn errors(&self) -> Vec<String>;

    /// True when [`Field::errors`] is non-empty.
    fn has_error(&self) -> bool {
        !self.errors().is_empty()
    }

    /// Resolves the schema and registers event listeners.
    fn mount(&self);

    /// Removes every listener registered by [`Field::mount`].
    fn unmount(&self);

    /// Re-reads the value from the parent after the model was replaced from outside.
    fn sync(&self);

    /// Re-renders when the value or the messages differ from the last render.  Returns true
    /// when anything in the subtree re-rendered.
    fn refresh(&self) -> bool;

    /// How many times this field has rendered.
    fn render_count(&self) -> usize;

    /// The headless view of this field and its children.
    fn view(&self) -> FieldView;
}

///////////////////////////////////////////////// FieldProps ///////////////////////////////////////////////

/// Called with every `modelChange` event and the field that listens for it.
pub type ModelChangeHandler = Rc<dyn Fn(&ModelChange, &dyn Field)>;

/// Called with an event registered through [`FieldProps::on_emit_events`].
pub type EventHandler = Rc<dyn Fn(&FormEvent, &dyn Field)>;

/// An event a field listens for while mounted.
#[derive(Clone)]
pub struct EmitEvent {
    /// The event to listen for.
    pub kind: EventKind,
    /// What to do when it arrives.
    pub method: EventHandler,
}

impl EmitEvent {
    /// Listens for the event called `name`.
    pub fn new(name: &str, method: impl Fn(&FormEvent, &dyn Field) + 'static) -> Self {
        Self {
            kind: EventKind::from_name(name),
            method: Rc::new(method),
        }
    }
}

/// Notifications for the owner of a field.
#[derive(Clone, Default)]
pub struct FieldCallbacks {
    /// Called with the new value after every change.
    pub on_change: Option<Rc<dyn Fn(&Value)>>,
    /// Called when the field renders with messages that differ from the last render.
    pub on_error: Option<Rc<dyn Fn(&[String])>>,
}

/// Optional behavior shared by every kind of field.
#[derive(Clone, Default)]
pub struct FieldProps {
    /// Listener for `modelChange` events from anywhere in the form.
    pub on_model_change: Option<ModelChangeHandler>,
    /// Listeners for other events.
    pub on_emit_events: Vec<EmitEvent>,
    /// Owner notifications.
    pub callbacks: FieldCallbacks,
}

impl Debug for FieldProps {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let events: Vec<&str> = self.on_emit_events.iter().map(|e| e.kind.name()).collect();
        f.debug_struct("FieldProps")
            .field("on_model_change", &self.on_model_change.is_some())
            .field("on_emit_events", &events)
            .field("on_change", &self.callbacks.on_change.is_some())
            .field("on_error", &self.callbacks.on_error.is_some())
            .finish()
    }
}

////////////////////////////////////////////////// FieldDef ////////////////////////////////////////////////

/// A list field template and its cardinality settings.
#[derive(Clone)]
pub struct ListDef {
    /// The list name.
    pub name: String,
    /// The field built for every entry.  Its own name is replaced by the entry name.
    pub template: Box<FieldDef>,
    /// Entries may not be removed below this count.
    pub min_length: Option<usize>,
    /// Entries may not be added beyond this count.
    pub max_length: Option<usize>,
    /// Hide the add affordance regardless of length.
    pub hide_add_button: bool,
    /// Hide the remove affordances regardless of length.
    pub hide_remove_button: bool,
    /// How entries find their validation errors.
    pub entry_errors: Rc<dyn EntryErrors>,
    /// Behavior of the list itself.
    pub props: FieldProps,
}

impl ListDef {
    pub fn new(name: impl Into<String>, template: FieldDef) -> Self {
        Self {
            name: name.into(),
            template: Box::new(template),
            min_length: None,
            max_length: None,
            hide_add_button: false,
            hide_remove_button: false,
            entry_errors: Rc::new(PositionalErrors),
            props: FieldProps::default(),
        }
    }

    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn hide_add_button(mut self, hide: bool) -> Self {
        self.hide_add_button = hide;
        self
    }

    pub fn hide_remove_button(mut self, hide: bool) -> Self {
        self.hide_remove_button = hide;
        self
    }

    pub fn entry_errors(mut self, strategy: impl EntryErrors + 'static) -> Self {
        self.entry_errors = Rc::new(strategy);
        self
    }
}

/// A description of a field, from which mounted fields are built.
#[derive(Clone)]
pub enum FieldDef {
    /// A single input.
    Leaf {
        /// The field name.
        name: String,
        /// Optional behavior.
        props: FieldProps,
    },
    /// A keyed group of fields.
    Object {
        /// The field name.
        name: String,
        /// The fields of the group.
        children: Vec<FieldDef>,
        /// Optional behavior.
        props: FieldProps,
    },
    /// A resizable list of entries built from one template.
    List(ListDef),
}

impl FieldDef {
    pub fn leaf(name: impl Into<String>) -> Self {
        FieldDef::Leaf {
            name: name.into(),
            props: FieldProps::default(),
        }
    }

    pub fn object(name: impl Into<String>, children: Vec<FieldDef>) -> Self {
        FieldDef::Object {
            name: name.into(),
            children,
            props: FieldProps::default(),
        }
    }

    pub fn list(name: impl Into<String>, template: FieldDef) -> Self {
        FieldDef::List(ListDef::new(name, template))
    }

    /// The field name.
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Leaf { name, .. } | FieldDef::Object { name, .. } => name,
            FieldDef::List(list) => &list.name,
        }
    }

    pub fn props(&self) -> &FieldProps {
        match self {
            FieldDef::Leaf { props, .. } | FieldDef::Object { props, .. } => props,
            FieldDef::List(list) => &list.props,
        }
    }

    pub fn props_mut(&mut self) -> &mut FieldProps {
        match self {
            FieldDef::Leaf { props, .. } | FieldDef::Object { props, .. } => props,
            FieldDef::List(list) => &mut list.props,
        }
    }

    /// Listens for `modelChange` events while mounted.
    pub fn on_model_change(mut self, handler: impl Fn(&ModelChange, &dyn Field) + 'static) -> Self {
        self.props_mut().on_model_change = Some(Rc::new(handler));
        self
    }

    /// Listens for one more event while mounted.
    pub fn on_emit(mut self, event: EmitEvent) -> Self {
        self.props_mut().on_emit_events.push(event);
        self
    }

    /// Listens for several events while mounted.
    pub fn on_emit_events(mut self, events: impl IntoIterator<Item = EmitEvent>) -> Self {
        self.props_mut().on_emit_events.extend(events);
        self
    }

    pub fn on_change(mut self, callback: impl Fn(&Value) + 'static) -> Self {
        self.props_mut().callbacks.on_change = Some(Rc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&[String]) + 'static) -> Self {
        self.props_mut().callbacks.on_error = Some(Rc::new(callback));
        self
    }

    /// Builds the field described by `self` under `parent`.  `name` overrides the declared name.
    pub fn build(&self, name: Option<String>, parent: Weak<dyn FieldContext>, bus: &EventBus) -> FieldNode {
        let name = name.unwrap_or_else(|| self.name().to_string());
        match self {
            FieldDef::Leaf { props, .. } => {
                FieldNode::Leaf(LeafField::new(name, props.clone(), parent, bus.clone()))
            }
            FieldDef::Object { children, props, .. } => FieldNode::Object(ObjectField::new(
                name,
                children,
                props.clone(),
                parent,
                bus.clone(),
            )),
            FieldDef::List(list) => FieldNode::List(ListField::new(name, list, parent, bus.clone())),
        }
    }
}

impl Debug for FieldDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldDef::Leaf { name, .. } => f.debug_tuple("Leaf").field(name).finish(),
            FieldDef::Object { name, children, .. } => f
                .debug_struct("Object")
                .field("name", name)
                .field("children", children)
                .finish(),
            FieldDef::List(list) => f
                .debug_struct("List")
                .field("name", &list.name)
                .field("template", &list.template)
                .field("min_length", &list.min_length)
                .field("max_length", &list.max_length)
                .finish(),
        }
    }
}

////////////////////////////////////////////////// FieldNode ///////////////////////////////////////////////

/// A built field with its concrete kind preserved.
#[derive(Clone)]
pub enum FieldNode {
    Leaf(Rc<LeafField>),
    Object(Rc<ObjectField>),
    List(Rc<ListField>),
}

impl FieldNode {
    pub fn as_leaf(&self) -> Option<&Rc<LeafField>> {
        match self {
            FieldNode::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<ObjectField>> {
        match self {
            FieldNode::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<ListField>> {
        match self {
            FieldNode::List(list) => Some(list),
            _ => None,
        }
    }

    /// The direct child called `name`: a keyed child of an object or a positional child of a
    /// list.
    pub fn child(&self, name: &str) -> Option<FieldNode> {
        match self {
            FieldNode::Leaf(_) => None,
            FieldNode::Object(object) => object.child(name),
            FieldNode::List(list) => list.child(path::item_index(name)?),
        }
    }

    /// Walks a dotted path relative to this field.
    pub fn find(&self, relative: &str) -> Option<FieldNode> {
        relative
            .split(path::SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .try_fold(self.clone(), |node, segment| node.child(segment))
    }
}

impl Deref for FieldNode {
    type Target = dyn Field;

    fn deref(&self) -> &Self::Target {
        match self {
            FieldNode::Leaf(leaf) => leaf.as_ref(),
            FieldNode::Object(object) => object.as_ref(),
            FieldNode::List(list) => list.as_ref(),
        }
    }
}

impl Debug for FieldNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            FieldNode::Leaf(_) => "Leaf",
            FieldNode::Object(_) => "Object",
            FieldNode::List(_) => "List",
        };
        f.debug_tuple(kind).field(&self.path()).finish()
    }
}

////////////////////////////////////////////////// FieldView ///////////////////////////////////////////////

/// The headless render output of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldView {
    /// A single input.
    Leaf {
        name: String,
        path: String,
        value: Value,
        errors: Vec<String>,
        label: Option<String>,
        required: bool,
        options: Option<Vec<SelectOption>>,
    },
    /// A keyed group.
    Object {
        name: String,
        path: String,
        errors: Vec<String>,
        children: Vec<FieldView>,
    },
    /// A resizable list.
    List {
        name: String,
        path: String,
        errors: Vec<String>,
        items: Vec<ListItemView>,
        /// Whether the add affordance is shown.
        can_add: bool,
        /// Whether the remove affordances are shown.
        can_remove: bool,
    },
}

/// One entry of a list view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItemView {
    /// The entry's stable identity.
    pub key: EntryId,
    /// The child built for the entry.
    pub field: FieldView,
}

impl FieldView {
    pub fn name(&self) -> &str {
        match self {
            FieldView::Leaf { name, .. } | FieldView::Object { name, .. } | FieldView::List { name, .. } => {
                name
            }
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FieldView::Leaf { path, .. } | FieldView::Object { path, .. } | FieldView::List { path, .. } => {
                path
            }
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            FieldView::Leaf { errors, .. }
            | FieldView::Object { errors, .. }
            | FieldView::List { errors, .. } => errors,
        }
    }

    /// Finds the view at `path` in this subtree.
    pub fn find(&self, path: &str) -> Option<&FieldView> {
        if self.path() == path {
            return Some(self);
        }
        match self {
            FieldView::Leaf { .. } => None,
            FieldView::Object { children, .. } => children.iter().find_map(|child| child.find(path)),
            FieldView::List { items, .. } => items.iter().find_map(|item| item.field.find(path)),
        }
    }
}

/////////////////////////////////////////////// shared plumbing //////////////////////////////////////////////

/// Remembers what a field last rendered.
#[derive(Default)]
pub(crate) struct RenderTracker {
    last: RefCell<Option<(Value, Vec<String>)>>,
    count: Cell<usize>,
}

impl RenderTracker {
    pub(crate) fn refresh(&self, value: Value, errors: Vec<String>, callbacks: &FieldCallbacks) -> bool {
        let errors_changed = {
            let mut last = self.last.borrow_mut();
            let (value_changed, errors_changed) = match last.as_ref() {
                Some((v, e)) => (*v != value, *e != errors),
                None => (true, true),
            };
            if !value_changed && !errors_changed {
                return false;
            }
            *last = Some((value, errors.clone()));
            errors_changed
        };
        self.count.set(self.count.get() + 1);
        if errors_changed
            && !errors.is_empty()
            && let Some(on_error) = &callbacks.on_error
        {
            on_error(&errors);
        }
        true
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }
}

/// The bus listeners a mounted field holds.
#[derive(Default)]
pub(crate) struct Subscriptions {
    ids: RefCell<Vec<ListenerId>>,
}

impl Subscriptions {
    pub(crate) fn subscribe(&self, bus: &EventBus, props: &FieldProps, field: Weak<dyn Field>) {
        let mut ids = self.ids.borrow_mut();
        if !ids.is_empty() {
            return;
        }
        if let Some(handler) = &props.on_model_change {
            let handler = handler.clone();
            let field = field.clone();
            ids.push(bus.subscribe(EventKind::ModelChange, move |event| {
                if let (FormEvent::ModelChange(change), Some(field)) = (event, field.upgrade()) {
                    handler(change, &*field);
                }
            }));
        }
        for emit in &props.on_emit_events {
            let method = emit.method.clone();
            let field = field.clone();
            ids.push(bus.subscribe(emit.kind.clone(), move |event| {
                if let Some(field) = field.upgrade() {
                    method(event, &*field);
                }
            }));
        }
    }

    pub(crate) fn unsubscribe(&self, bus: &EventBus) {
        for id in self.ids.borrow_mut().drain(..) {
            bus.unsubscribe(id);
        }
    }
}

/// Tells the form tree that the field at `path` now holds `value`.
pub(crate) fn announce(bus: &EventBus, props: &FieldProps, path: String, value: &Value) {
    bus.emit(FormEvent::ModelChange(ModelChange {
        name: path,
        value: value.clone(),
    }));
    if let Some(on_change) = &props.callbacks.on_change {
        on_change(value);
    }
}

////////////////////////////////////////////////// LeafField ///////////////////////////////////////////////

/// A single input bound to one value of its parent.
pub struct LeafField {
    name: RefCell<String>,
    parent: Weak<dyn FieldContext>,
    bus: EventBus,
    props: FieldProps,
    render: RenderTracker,
    subscriptions: Subscriptions,
    this: Weak<LeafField>,
}

impl LeafField {
    pub fn new(name: String, props: FieldProps, parent: Weak<dyn FieldContext>, bus: EventBus) -> Rc<Self> {
        Rc::new_cyclic(|this| LeafField {
            name: RefCell::new(name),
            parent,
            bus,
            props,
            render: RenderTracker::default(),
            subscriptions: Subscriptions::default(),
            this: this.clone(),
        })
    }

    /// The schema description of this field.
    pub fn schema(&self) -> Option<FieldSchema> {
        self.parent.upgrade()?.get_schema(&self.name())
    }
}

impl Field for LeafField {
    fn name(&self) -> String {
        self.name.borrow().clone()
    }

    fn rename(&self, name: String) {
        *self.name.borrow_mut() = name;
    }

    fn path(&self) -> String {
        match self.parent.upgrade() {
            Some(parent) => path::join(&parent.path(), &self.name()),
            None => self.name(),
        }
    }

    fn value(&self) -> Value {
        self.parent
            .upgrade()
            .map_or(Value::Null, |parent| parent.get_model(&self.name()))
    }

    fn change(&self, value: Value) {
        let Some(parent) = self.parent.upgrade() else {
            tracing::debug!(field = %self.name(), "change on a detached field ignored");
            return;
        };
        let name = self.name();
        let changed = parent.get_model(&name) != value;
        parent.set_model(&name, value.clone());
        if changed {
            announce(&self.bus, &self.props, self.path(), &value);
        } else if let Some(on_change) = &self.props.callbacks.on_change {
            on_change(&value);
        }
    }

    fn errors(&self) -> Vec<String> {
        self.parent
            .upgrade()
            .and_then(|parent| parent.get_errors(&self.name()))
            .map(|errors| errors.messages().to_vec())
            .unwrap_or_default()
    }

    fn mount(&self) {
        let field: Weak<dyn Field> = self.this.clone();
        self.subscriptions.subscribe(&self.bus, &self.props, field);
    }

    fn unmount(&self) {
        self.subscriptions.unsubscribe(&self.bus);
    }

    fn sync(&self) {}

    fn refresh(&self) -> bool {
        self.render
            .refresh(self.value(), self.errors(), &self.props.callbacks)
    }

    fn render_count(&self) -> usize {
        self.render.count()
    }

    fn view(&self) -> FieldView {
        let schema = self.schema();
        FieldView::Leaf {
            name: self.name(),
            path: self.path(),
            value: self.value(),
            errors: self.errors(),
            label: schema.as_ref().and_then(|s| s.label.clone()),
            required: schema.as_ref().is_some_and(|s| s.required),
            options: schema.and_then(|s| s.options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationErrors;
    use crate::test_utils::test_helpers::Recorder;
    use serde_json::{Map, json};

    #[derive(Default)]
    struct MapContext {
        model: RefCell<Map<String, Value>>,
        errors: RefCell<ValidationErrors>,
    }

    impl FieldContext for MapContext {
        fn set_model(&self, name: &str, value: Value) {
            self.model.borrow_mut().insert(name.to_string(), value);
        }

        fn get_model(&self, name: &str) -> Value {
            self.model.borrow().get(name).cloned().unwrap_or(Value::Null)
        }

        fn get_schema(&self, _name: &str) -> Option<FieldSchema> {
            None
        }

        fn get_errors(&self, name: &str) -> Option<FieldErrors> {
            self.errors.borrow().get(name).cloned()
        }

        fn path(&self) -> String {
            "form".to_string()
        }
    }

    fn leaf(context: &Rc<MapContext>, def: FieldDef, bus: &EventBus) -> Rc<LeafField> {
        let parent: Weak<dyn FieldContext> = Rc::downgrade(context) as Weak<dyn FieldContext>;
        match def.build(None, parent, bus) {
            FieldNode::Leaf(leaf) => leaf,
            other => panic!("expected a leaf, got {:?}", other),
        }
    }

    #[test]
    fn leaf_reads_and_writes_through_its_parent() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let title = leaf(&context, FieldDef::leaf("title"), &bus);

        assert_eq!(title.path(), "form.title");
        assert_eq!(title.value(), Value::Null);
        title.change(json!("Dune"));
        assert_eq!(context.get_model("title"), json!("Dune"));
        assert_eq!(title.value(), json!("Dune"));
    }

    #[test]
    fn change_announces_model_change_with_full_path() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let changes = Recorder::default();
        let sink = changes.clone();
        bus.subscribe(EventKind::ModelChange, move |event| {
            if let FormEvent::ModelChange(change) = event {
                sink.record(format!("{}={}", change.name, change.value));
            }
        });
        let title = leaf(&context, FieldDef::leaf("title"), &bus);

        title.change(json!("a"));
        title.change(json!("a"));
        title.change(json!("b"));
        assert_eq!(changes.entries(), vec!["form.title=\"a\"", "form.title=\"b\""]);
    }

    #[test]
    fn on_change_sees_every_edit() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let seen = Recorder::default();
        let sink = seen.clone();
        let title = leaf(
            &context,
            FieldDef::leaf("title").on_change(move |value| sink.record(value.to_string())),
            &bus,
        );
        title.change(json!("test"));
        title.change(json!("test"));
        assert_eq!(seen.entries(), vec!["\"test\"", "\"test\""]);
    }

    #[test]
    fn model_change_listener_lives_while_mounted() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let seen = Recorder::default();
        let sink = seen.clone();
        let description = leaf(
            &context,
            FieldDef::leaf("description").on_model_change(move |change, field| {
                sink.record(format!("{} seen by {}", change.name, field.path()));
            }),
            &bus,
        );
        let title = leaf(&context, FieldDef::leaf("title"), &bus);

        description.mount();
        description.mount();
        assert_eq!(bus.listener_count(&EventKind::ModelChange), 1);
        title.change(json!("x"));
        assert_eq!(seen.entries(), vec!["form.title seen by form.description"]);

        description.unmount();
        assert_eq!(bus.listener_count(&EventKind::ModelChange), 0);
        title.change(json!("y"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn emit_events_reach_the_field() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let title = leaf(
            &context,
            FieldDef::leaf("title").on_emit_events(vec![
                EmitEvent::new("clear", |_, field| field.change(Value::String(String::new()))),
                EmitEvent::new("fill", |event, field| {
                    field.change(event.payload().cloned().unwrap_or_default())
                }),
            ]),
            &bus,
        );
        title.mount();

        bus.emit_named("fill", json!("filled"));
        assert_eq!(title.value(), json!("filled"));
        bus.emit_named("clear", Value::Null);
        assert_eq!(title.value(), json!(""));
    }

    #[test]
    fn refresh_renders_on_message_change_with_same_count() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let reported = Recorder::default();
        let sink = reported.clone();
        let login = leaf(
            &context,
            FieldDef::leaf("login").on_error(move |errors| sink.record(errors.join(","))),
            &bus,
        );

        assert!(login.refresh());
        assert!(!login.refresh());
        assert_eq!(login.render_count(), 1);

        context.errors.borrow_mut().push("login", "too short");
        assert!(login.refresh());
        assert!(login.has_error());

        *context.errors.borrow_mut() = ValidationErrors::new();
        context.errors.borrow_mut().push("login", "taken");
        assert!(login.refresh());
        assert_eq!(login.render_count(), 3);
        assert_eq!(reported.entries(), vec!["too short", "taken"]);
    }

    #[test]
    fn detached_leaf_reads_null() {
        let bus = EventBus::new();
        let title = {
            let context = Rc::new(MapContext::default());
            leaf(&context, FieldDef::leaf("title"), &bus)
        };
        assert_eq!(title.value(), Value::Null);
        title.change(json!("ignored"));
        assert_eq!(title.path(), "title");
    }

    #[test]
    fn field_node_finds_nothing_below_a_leaf() {
        let context = Rc::new(MapContext::default());
        let bus = EventBus::new();
        let node = FieldNode::Leaf(leaf(&context, FieldDef::leaf("title"), &bus));
        assert!(node.child("anything").is_none());
        assert_eq!(node.find("").map(|n| n.name()), Some("title".to_string()));
    }
}
