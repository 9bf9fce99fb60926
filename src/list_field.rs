//! # List Aggregates
//!
//! A [`ListField`] holds an ordered, resizable sequence of entries and builds one child field per
//! entry from its template.  Each entry carries an [`EntryId`] drawn from a counter owned by the
//! list.  The id survives additions, removals and edits, so a child keeps its state when its
//! neighbors move.  Children are named after their *position* (`authors-0`, `authors-1`) and are
//! renamed whenever the entries are reconciled.
//!
//! When the parent's value for the list is replaced from outside with something that differs
//! from the entries, element by element or in length, every entry gets a fresh id and every child
//! is rebuilt.
//!
//! Validation errors are produced per position.  [`EntryErrors`] is the seam that maps the
//! list's errors onto an entry; [`PositionalErrors`] is the default and simply indexes them.

use std::cell::{Cell, RefCell};
use std::fmt::{Display, Formatter};
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::errors::FieldErrors;
use crate::event_bus::EventBus;
use crate::field::{
    Field, FieldContext, FieldNode, FieldView, ListDef, ListItemView, RenderTracker, Subscriptions,
    announce,
};
use crate::model_store::ModelStore;
use crate::path;
use crate::schema::FieldSchema;

////////////////////////////////////////////////// EntryId /////////////////////////////////////////////////

/// The identity of one list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// A list entry: its identity and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub value: Value,
}

//////////////////////////////////////////////// EntryErrors ///////////////////////////////////////////////

/// Maps the errors reported for a whole list onto one of its entries.
pub trait EntryErrors {
    /// The errors of the entry at `index`, given the errors for the list.
    fn entry_errors(&self, list_errors: &FieldErrors, index: usize, entries: &[Entry]) -> Option<FieldErrors>;
}

/// Entry `i` receives the list's `i`-th error node.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalErrors;

impl EntryErrors for PositionalErrors {
    fn entry_errors(&self, list_errors: &FieldErrors, index: usize, _: &[Entry]) -> Option<FieldErrors> {
        list_errors.item(index).cloned()
    }
}

///////////////////////////////////////////////// ListField ////////////////////////////////////////////////

/// A field holding an array whose entries are built from one template.
pub struct ListField {
    name: RefCell<String>,
    parent: Weak<dyn FieldContext>,
    bus: EventBus,
    def: ListDef,
    store: ModelStore<Vec<Entry>>,
    next_id: Cell<u64>,
    children: RefCell<Vec<(EntryId, FieldNode)>>,
    schema: RefCell<Option<FieldSchema>>,
    mounted: Cell<bool>,
    render: RenderTracker,
    subscriptions: Subscriptions,
    this: Weak<ListField>,
}

impl ListField {
    pub fn new(name: String, def: &ListDef, parent: Weak<dyn FieldContext>, bus: EventBus) -> Rc<Self> {
        let list = Rc::new_cyclic(|this| ListField {
            name: RefCell::new(name),
            parent,
            bus,
            def: def.clone(),
            store: ModelStore::new(Vec::new()),
            next_id: Cell::new(0),
            children: RefCell::new(Vec::new()),
            schema: RefCell::new(None),
            mounted: Cell::new(false),
            render: RenderTracker::default(),
            subscriptions: Subscriptions::default(),
            this: this.clone(),
        });
        let this = Rc::downgrade(&list);
        list.store.listen(move |entries| {
            if let Some(list) = this.upgrade() {
                list.reconcile(entries);
            }
        });
        list
    }

    /// A copy of the entries.
    pub fn entries(&self) -> Vec<Entry> {
        self.store.model()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.store.with_model(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The child built for the entry at `index`.
    pub fn child(&self, index: usize) -> Option<FieldNode> {
        self.children
            .borrow()
            .get(index)
            .map(|(_, node)| node.clone())
    }

    /// The children, in entry order.
    pub fn children(&self) -> Vec<FieldNode> {
        self.children
            .borrow()
            .iter()
            .map(|(_, node)| node.clone())
            .collect()
    }

    /// True while another entry may be appended.
    pub fn is_add_allowed(&self) -> bool {
        self.def.max_length.is_none_or(|max| self.len() < max)
    }

    /// True while an entry may be removed.
    pub fn is_remove_allowed(&self) -> bool {
        self.len() > self.def.min_length.unwrap_or(0)
    }

    /// Appends an entry holding the element default.  Returns false, changing nothing, when the
    /// list is already at its maximum length.
    pub fn add_list_element(&self) -> bool {
        if !self.is_add_allowed() {
            tracing::debug!(field = %self.name(), "add refused at max length");
            return false;
        }
        let value = self
            .schema
            .borrow()
            .as_ref()
            .and_then(FieldSchema::element_default)
            .unwrap_or(Value::Null);
        let mut entries = self.store.model();
        entries.push(Entry {
            id: self.allocate_id(),
            value,
        });
        self.store.set_model(entries, None);
        self.propagate();
        true
    }

    /// Removes the entry at `index`.  Returns false, changing nothing, when the list is at its
    /// minimum length or there is no such entry.
    pub fn remove_list_element(&self, index: usize) -> bool {
        if !self.is_remove_allowed() || index >= self.len() {
            tracing::debug!(field = %self.name(), index, "remove refused");
            return false;
        }
        let mut entries = self.store.model();
        entries.remove(index);
        self.store.set_model(entries, None);
        self.propagate();
        true
    }

    /// Writes the value of the child called `name`, then runs `callback`.  Names without a
    /// position in range are ignored.
    pub fn set_model(&self, name: &str, value: Value, callback: Option<&dyn Fn()>) {
        let Some(index) = self.position_of(name) else {
            return;
        };
        let mut entries = self.store.model();
        if entries[index].value != value {
            entries[index].value = value;
            self.store.set_model(entries, None);
            self.propagate();
        }
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Reads the value of the child called `name`; `null` for names without a position in range.
    pub fn get_model(&self, name: &str) -> Value {
        self.position_of(name)
            .and_then(|index| self.store.with_model(|entries| entries.get(index).map(|e| e.value.clone())))
            .unwrap_or(Value::Null)
    }

    /// The validation errors of the child called `name`.
    pub fn get_validation_errors(&self, name: &str) -> Option<FieldErrors> {
        let index = self.position_of(name)?;
        let own = self.parent.upgrade()?.get_errors(&self.name())?;
        self.store
            .with_model(|entries| self.def.entry_errors.entry_errors(&own, index, entries))
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        let index = path::item_index(name);
        let len = self.len();
        match index {
            Some(index) if index < len => Some(index),
            _ => {
                tracing::debug!(list = %self.name(), name, "no entry at this name");
                None
            }
        }
    }

    fn allocate_id(&self) -> EntryId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        EntryId(id)
    }

    fn values(&self) -> Vec<Value> {
        self.store
            .with_model(|entries| entries.iter().map(|e| e.value.clone()).collect())
    }

    fn propagate(&self) {
        let value = Value::Array(self.values());
        if let Some(parent) = self.parent.upgrade() {
            parent.set_model(&self.name(), value.clone());
        }
        announce(&self.bus, &self.def.props, Field::path(self), &value);
    }

    fn fresh_entries(&self, values: Vec<Value>) -> Vec<Entry> {
        values
            .into_iter()
            .map(|value| Entry {
                id: self.allocate_id(),
                value,
            })
            .collect()
    }

    fn parent_values(&self) -> Vec<Value> {
        match self.parent.upgrade().map(|parent| parent.get_model(&self.name())) {
            Some(Value::Array(values)) => values,
            _ => Vec::new(),
        }
    }

    fn reconcile(&self, entries: &[Entry]) {
        let mut previous = std::mem::take(&mut *self.children.borrow_mut());
        let list_name = self.name();
        let context: Weak<dyn FieldContext> = self.this.clone();
        let mut next = Vec::with_capacity(entries.len());
        let mut fresh = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            let name = path::item_name(&list_name, index);
            let node = match previous.iter().position(|(id, _)| *id == entry.id) {
                Some(at) => {
                    let (_, node) = previous.swap_remove(at);
                    node.rename(name);
                    node
                }
                None => {
                    let node = self.def.template.build(Some(name), context.clone(), &self.bus);
                    fresh.push(node.clone());
                    node
                }
            };
            next.push((entry.id, node));
        }
        *self.children.borrow_mut() = next;
        for (_, dropped) in previous {
            dropped.unmount();
        }
        if self.mounted.get() {
            for node in fresh {
                node.mount();
            }
        }
    }
}

impl FieldContext for ListField {
    fn set_model(&self, name: &str, value: Value) {
        ListField::set_model(self, name, value, None);
    }

    fn get_model(&self, name: &str) -> Value {
        ListField::get_model(self, name)
    }

    fn get_schema(&self, _name: &str) -> Option<FieldSchema> {
        self.schema.borrow().clone()
    }

    fn get_errors(&self, name: &str) -> Option<FieldErrors> {
        self.get_validation_errors(name)
    }

    fn path(&self) -> String {
        Field::path(self)
    }
}

impl Field for ListField {
    fn name(&self) -> String {
        self.name.borrow().clone()
    }

    fn rename(&self, name: String) {
        *self.name.borrow_mut() = name;
        let entries = self.store.model();
        self.reconcile(&entries);
    }

    fn path(&self) -> String {
        match self.parent.upgrade() {
            Some(parent) => path::join(&parent.path(), &self.name()),
            None => self.name(),
        }
    }

    fn value(&self) -> Value {
        Value::Array(self.values())
    }

    fn change(&self, value: Value) {
        let values = match value {
            Value::Array(values) => values,
            Value::Null => Vec::new(),
            other => {
                tracing::warn!(field = %self.name(), "list field ignores non-array value {}", other);
                return;
            }
        };
        let entries = self.fresh_entries(values);
        self.store.set_model(entries, None);
        self.propagate();
    }

    fn errors(&self) -> Vec<String> {
        self.parent
            .upgrade()
            .and_then(|parent| parent.get_errors(&self.name()))
            .map(|errors| errors.messages().to_vec())
            .unwrap_or_default()
    }

    fn mount(&self) {
        *self.schema.borrow_mut() = self
            .parent
            .upgrade()
            .and_then(|parent| parent.get_schema(&self.name()));
        self.sync();
        self.mounted.set(true);
        let field: Weak<dyn Field> = self.this.clone();
        self.subscriptions.subscribe(&self.bus, &self.def.props, field);
        for child in self.children() {
            child.mount();
        }
    }

    fn unmount(&self) {
        self.mounted.set(false);
        self.subscriptions.unsubscribe(&self.bus);
        for child in self.children() {
            child.unmount();
        }
    }

    fn sync(&self) {
        let incoming = self.parent_values();
        let matches = self.store.with_model(|entries| {
            entries.len() == incoming.len()
                && entries.iter().zip(&incoming).all(|(entry, value)| entry.value == *value)
        });
        if matches {
            for child in self.children() {
                child.sync();
            }
        } else {
            tracing::debug!(field = %self.name(), "list value replaced from outside; rebuilding entries");
            let entries = self.fresh_entries(incoming);
            self.store.set_model(entries, None);
        }
    }

    fn refresh(&self) -> bool {
        let mut rendered = self
            .render
            .refresh(self.value(), self.errors(), &self.def.props.callbacks);
        for child in self.children() {
            rendered |= child.refresh();
        }
        rendered
    }

    fn render_count(&self) -> usize {
        self.render.count()
    }

    fn view(&self) -> FieldView {
        let items = self
            .children
            .borrow()
            .iter()
            .map(|(id, node)| ListItemView {
                key: *id,
                field: node.view(),
            })
            .collect();
        FieldView::List {
            name: self.name(),
            path: Field::path(self),
            errors: self.errors(),
            items,
            can_add: !self.def.hide_add_button && self.is_add_allowed(),
            can_remove: !self.def.hide_remove_button && self.is_remove_allowed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationErrors;
    use crate::field::FieldDef;
    use crate::schema::FieldType;
    use crate::test_utils::test_helpers::Recorder;
    use serde_json::{Map, json};

    #[derive(Default)]
    struct Root {
        model: RefCell<Map<String, Value>>,
        errors: RefCell<ValidationErrors>,
        schema: Option<FieldSchema>,
    }

    impl FieldContext for Root {
        fn set_model(&self, name: &str, value: Value) {
            self.model.borrow_mut().insert(name.to_string(), value);
        }

        fn get_model(&self, name: &str) -> Value {
            self.model.borrow().get(name).cloned().unwrap_or(Value::Null)
        }

        fn get_schema(&self, _name: &str) -> Option<FieldSchema> {
            self.schema.clone()
        }

        fn get_errors(&self, name: &str) -> Option<FieldErrors> {
            self.errors.borrow().get(name).cloned()
        }

        fn path(&self) -> String {
            "form".to_string()
        }
    }

    fn tags_schema() -> FieldSchema {
        let mut element = FieldSchema::new(FieldType::String);
        element.default_value = Some(json!("new"));
        FieldSchema::new(FieldType::List(Box::new(element)))
    }

    fn mounted(root: &Rc<Root>, def: ListDef, bus: &EventBus) -> Rc<ListField> {
        let parent: Weak<dyn FieldContext> = Rc::downgrade(root) as Weak<dyn FieldContext>;
        let list = FieldDef::List(def).build(None, parent, bus).as_list().cloned().unwrap();
        list.mount();
        list
    }

    fn ids(list: &ListField) -> Vec<EntryId> {
        list.entries().iter().map(|e| e.id).collect()
    }

    #[test]
    fn add_uses_the_element_default_and_reports_values() {
        let root = Rc::new(Root {
            schema: Some(tags_schema()),
            ..Root::default()
        });
        let reported = Recorder::default();
        let sink = reported.clone();
        let mut def = ListDef::new("tags", FieldDef::leaf("tag"));
        def.props.callbacks.on_change = Some(Rc::new(move |value: &Value| sink.record(value.to_string())));
        let list = mounted(&root, def, &EventBus::new());

        assert!(list.add_list_element());
        assert!(list.add_list_element());
        assert_eq!(root.get_model("tags"), json!(["new", "new"]));
        assert_eq!(reported.entries(), vec![r#"["new"]"#, r#"["new","new"]"#]);
        assert_eq!(list.child(1).unwrap().path(), "form.tags.tags-1");
    }

    #[test]
    fn add_without_schema_appends_null() {
        let root = Rc::new(Root::default());
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        assert!(list.add_list_element());
        assert_eq!(list.value(), json!([null]));
    }

    #[test]
    fn cardinality_bounds_block_add_and_remove() {
        let root = Rc::new(Root::default());
        root.model
            .borrow_mut()
            .insert("tags".to_string(), json!(["a"]));
        let def = ListDef::new("tags", FieldDef::leaf("tag"))
            .min_length(1)
            .max_length(2);
        let list = mounted(&root, def, &EventBus::new());

        assert!(!list.is_remove_allowed());
        assert!(!list.remove_list_element(0));
        assert!(list.add_list_element());
        assert!(!list.is_add_allowed());
        assert!(!list.add_list_element());
        assert_eq!(list.len(), 2);
        assert!(!list.remove_list_element(5));
        assert!(list.remove_list_element(0));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn affordances_follow_bounds_and_hide_flags() {
        let root = Rc::new(Root::default());
        let def = ListDef::new("tags", FieldDef::leaf("tag"))
            .max_length(1)
            .hide_remove_button(true);
        let list = mounted(&root, def, &EventBus::new());

        let FieldView::List { can_add, can_remove, .. } = list.view() else {
            panic!("expected a list view");
        };
        assert!(can_add);
        assert!(!can_remove);

        list.add_list_element();
        let FieldView::List { can_add, can_remove, items, .. } = list.view() else {
            panic!("expected a list view");
        };
        assert!(!can_add);
        assert!(!can_remove);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].field.name(), "tags-0");
    }

    #[test]
    fn ids_survive_add_remove_and_edit() {
        let root = Rc::new(Root::default());
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        list.add_list_element();
        list.add_list_element();
        list.add_list_element();
        let before = ids(&list);

        let survivor = list.child(2).unwrap();
        list.remove_list_element(0);
        assert_eq!(ids(&list), before[1..].to_vec());
        assert_eq!(survivor.name(), "tags-1");

        list.child(0).unwrap().change(json!("edited"));
        assert_eq!(ids(&list), before[1..].to_vec());
        assert_eq!(root.get_model("tags"), json!(["edited", null]));
    }

    #[test]
    fn external_replacement_regenerates_ids() {
        let root = Rc::new(Root::default());
        root.model
            .borrow_mut()
            .insert("tags".to_string(), json!(["a", "b"]));
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        let before = ids(&list);

        list.sync();
        assert_eq!(ids(&list), before);

        root.model
            .borrow_mut()
            .insert("tags".to_string(), json!(["a", "c"]));
        list.sync();
        let after = ids(&list);
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|id| !before.contains(id)));
        assert_eq!(list.child(1).unwrap().value(), json!("c"));
    }

    #[test]
    fn malformed_names_read_nothing_and_write_nothing() {
        let root = Rc::new(Root::default());
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        list.add_list_element();

        assert_eq!(list.get_model("tags"), Value::Null);
        assert_eq!(list.get_model("tags-7"), Value::Null);
        list.set_model("tags-x", json!("lost"), None);
        list.set_model("tags-3", json!("lost"), None);
        assert_eq!(list.value(), json!([null]));
        assert!(list.get_validation_errors("nonsense").is_none());
    }

    #[test]
    fn set_model_runs_callback_after_the_write() {
        let root = Rc::new(Root::default());
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        list.add_list_element();
        let calls = Recorder::default();
        let sink = calls.clone();
        list.set_model("tags-0", json!("x"), Some(&move || sink.record("done")));
        assert_eq!(calls.entries(), vec!["done"]);
        assert_eq!(root.get_model("tags"), json!(["x"]));
    }

    #[test]
    fn set_model_runs_callback_for_an_identical_write() {
        let root = Rc::new(Root::default());
        root.model
            .borrow_mut()
            .insert("tags".to_string(), json!(["a"]));
        let list = mounted(&root, ListDef::new("tags", FieldDef::leaf("tag")), &EventBus::new());
        let ids = list.entries();
        let calls = Recorder::default();
        let sink = calls.clone();
        list.set_model("tags-0", json!("a"), Some(&move || sink.record("done")));
        assert_eq!(calls.entries(), vec!["done"]);
        assert_eq!(list.entries(), ids);
        assert_eq!(root.get_model("tags"), json!(["a"]));
    }

    #[test]
    fn entry_errors_are_positional() {
        let root = Rc::new(Root::default());
        root.model
            .borrow_mut()
            .insert("authors".to_string(), json!([{"name": "A"}, {}]));
        root.errors.borrow_mut().insert(
            "authors",
            serde_json::from_value(json!([null, {"name": ["name is required"]}])).unwrap(),
        );
        let template = FieldDef::object("author", vec![FieldDef::leaf("name")]);
        let list = mounted(&root, ListDef::new("authors", template), &EventBus::new());

        assert!(list.get_validation_errors("authors-0").is_none());
        let second = list.child(1).unwrap();
        assert_eq!(
            second.find("name").unwrap().errors(),
            vec!["name is required"]
        );
        assert_eq!(second.find("name").unwrap().path(), "form.authors.authors-1.name");
    }

    struct Reversed;

    impl EntryErrors for Reversed {
        fn entry_errors(&self, list_errors: &FieldErrors, index: usize, entries: &[Entry]) -> Option<FieldErrors> {
            list_errors.item(entries.len() - 1 - index).cloned()
        }
    }

    #[test]
    fn entry_error_strategy_is_replaceable() {
        let root = Rc::new(Root::default());
        root.model
            .borrow_mut()
            .insert("tags".to_string(), json!(["a", "b"]));
        root.errors.borrow_mut().insert(
            "tags",
            serde_json::from_value(json!([["first is bad"], null])).unwrap(),
        );
        let def = ListDef::new("tags", FieldDef::leaf("tag")).entry_errors(Reversed);
        let list = mounted(&root, def, &EventBus::new());
        assert!(list.child(0).unwrap().errors().is_empty());
        assert_eq!(list.child(1).unwrap().errors(), vec!["first is bad"]);
    }
}
