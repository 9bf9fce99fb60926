//! Keyed aggregates.
//!
//! An [`ObjectField`] groups named children under one object value.  It mirrors its subtree in
//! a [`ModelStore`] and writes every child change upward as a whole new object, so the parent
//! never sees a partially updated value.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};

use crate::errors::FieldErrors;
use crate::event_bus::EventBus;
use crate::field::{
    Field, FieldContext, FieldDef, FieldNode, FieldProps, FieldView, RenderTracker, Subscriptions,
    announce,
};
use crate::model_store::ModelStore;
use crate::path;
use crate::schema::{FieldSchema, SchemaRef};

/// A field holding an object whose properties are its children.
pub struct ObjectField {
    name: RefCell<String>,
    parent: Weak<dyn FieldContext>,
    bus: EventBus,
    props: FieldProps,
    children: Vec<FieldNode>,
    store: ModelStore<Map<String, Value>>,
    schema: RefCell<Option<SchemaRef>>,
    render: RenderTracker,
    subscriptions: Subscriptions,
    this: Weak<ObjectField>,
}

impl ObjectField {
    pub fn new(
        name: String,
        children: &[FieldDef],
        props: FieldProps,
        parent: Weak<dyn FieldContext>,
        bus: EventBus,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<ObjectField>| {
            let context: Weak<dyn FieldContext> = this.clone();
            let children = children
                .iter()
                .map(|def| def.build(None, context.clone(), &bus))
                .collect();
            ObjectField {
                name: RefCell::new(name),
                parent,
                bus,
                props,
                children,
                store: ModelStore::new(Map::new()),
                schema: RefCell::new(None),
                render: RenderTracker::default(),
                subscriptions: Subscriptions::default(),
                this: this.clone(),
            }
        })
    }

    /// The children, in declaration order.
    pub fn children(&self) -> &[FieldNode] {
        &self.children
    }

    /// The child called `name`.
    pub fn child(&self, name: &str) -> Option<FieldNode> {
        self.children
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    /// The schema the children resolve against, once mounted.
    pub fn schema(&self) -> Option<SchemaRef> {
        self.schema.borrow().clone()
    }

    fn parent_value(&self) -> Map<String, Value> {
        match self.parent.upgrade().map(|parent| parent.get_model(&self.name())) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn replace(&self, map: Map<String, Value>) {
        let value = Value::Object(map.clone());
        self.store.set_model(map, None);
        match self.parent.upgrade() {
            Some(parent) => parent.set_model(&self.name(), value.clone()),
            None => tracing::debug!(field = %self.name(), "detached object keeps its change local"),
        }
        announce(&self.bus, &self.props, Field::path(self), &value);
    }
}

impl FieldContext for ObjectField {
    fn set_model(&self, name: &str, value: Value) {
        let unchanged = self
            .store
            .with_model(|model| model.get(name) == Some(&value));
        if unchanged {
            return;
        }
        let mut map = self.store.model();
        map.insert(name.to_string(), value);
        self.replace(map);
    }

    fn get_model(&self, name: &str) -> Value {
        self.store
            .with_model(|model| model.get(name).cloned())
            .unwrap_or(Value::Null)
    }

    fn get_schema(&self, name: &str) -> Option<FieldSchema> {
        self.schema.borrow().as_ref()?.get_field(name)
    }

    fn get_errors(&self, name: &str) -> Option<FieldErrors> {
        let own = self.parent.upgrade()?.get_errors(&self.name())?;
        own.child(name).cloned()
    }

    fn path(&self) -> String {
        Field::path(self)
    }
}

impl Field for ObjectField {
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
        Value::Object(self.store.model())
    }

    fn change(&self, value: Value) {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::warn!(field = %self.name(), "object field ignores non-object value {}", other);
                return;
            }
        };
        self.replace(map);
        // Children mirror the new map before anyone can write through them.
        for child in &self.children {
            child.sync();
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
        let resolved = self
            .parent
            .upgrade()
            .and_then(|parent| parent.get_schema(&self.name()))
            .and_then(|schema| schema.field_type.object_schema());
        if resolved.is_none() {
            tracing::debug!(field = %self.name(), "object field mounted without a schema");
        }
        *self.schema.borrow_mut() = resolved;
        self.store.set_model(self.parent_value(), None);
        let field: Weak<dyn Field> = self.this.clone();
        self.subscriptions.subscribe(&self.bus, &self.props, field);
        for child in &self.children {
            child.mount();
        }
    }

    fn unmount(&self) {
        self.subscriptions.unsubscribe(&self.bus);
        for child in &self.children {
            child.unmount();
        }
    }

    fn sync(&self) {
        let current = self.parent_value();
        let differs = self.store.with_model(|model| *model != current);
        if differs {
            self.store.set_model(current, None);
        }
        for child in &self.children {
            child.sync();
        }
    }

    fn refresh(&self) -> bool {
        let mut rendered = self
            .render
            .refresh(self.value(), self.errors(), &self.props.callbacks);
        for child in &self.children {
            rendered |= child.refresh();
        }
        rendered
    }

    fn render_count(&self) -> usize {
        self.render.count()
    }

    fn view(&self) -> FieldView {
        FieldView::Object {
            name: self.name(),
            path: Field::path(self),
            errors: self.errors(),
            children: self.children.iter().map(|child| child.view()).collect(),
        }
    }
}
