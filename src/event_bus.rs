//! # Form Event Bus
//!
//! A publish/subscribe channel scoped to one form tree.  The five control events and the
//! `modelChange` system event are typed variants of [`FormEvent`]; application-defined events
//! travel through [`FormEvent::Custom`] and are subscribed to by name.
//!
//! ```text
//!  outside code ──emit()──┐
//!                         ▼
//!                 ┌───────────────┐   Reset / SetModel / Submit / Validate
//!                 │   EventBus    │ ─────────────────────────────────────▶ FormController
//!                 │ (FIFO queue)  │   ModelChange / Custom
//!                 └───────────────┘ ─────────────────────────────────────▶ fields
//! ```
//!
//! Delivery is synchronous.  An event emitted while another is being dispatched is queued and
//! delivered after the current one finishes, so listeners observe events in emission order.
//! Listeners may subscribe or unsubscribe from inside a callback; each dispatch works from a
//! snapshot and skips any listener that was removed before its turn.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use formulary::{EventBus, EventKind, FormEvent};
//!
//! let bus = EventBus::new();
//! let seen = Rc::new(Cell::new(0));
//! let counter = seen.clone();
//! let id = bus.subscribe(EventKind::Submit, move |_| counter.set(counter.get() + 1));
//!
//! bus.emit(FormEvent::Submit);
//! bus.unsubscribe(id);
//! bus.emit(FormEvent::Submit);
//! assert_eq!(seen.get(), 1);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;

//////////////////////////////////////////////// FormEvent ////////////////////////////////////////////////

/// The payload of the `modelChange` system event.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    /// Full path of the field whose value changed.
    pub name: String,
    /// The field's new value.
    pub value: Value,
}

/// An event carried by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    /// Replace the model with the payload, or the default model, and clear errors.
    Reset(Option<Value>),
    /// Replace the model with the payload, keeping errors.
    SetModel(Value),
    /// Validate and, when valid, submit.
    Submit,
    /// Validate and display errors without submitting.
    Validate,
    /// A field's value changed.
    ModelChange(ModelChange),
    /// An application-defined event.
    Custom {
        /// The event name.
        name: String,
        /// The event payload.
        payload: Value,
    },
}

impl FormEvent {
    /// Builds an event from a name and payload, mapping the core names onto their typed
    /// variants.  `setModel` without an object payload falls back to `Custom`.
    pub fn named(name: &str, payload: Value) -> Self {
        match EventKind::from_name(name) {
            EventKind::Reset => FormEvent::Reset(if payload.is_null() {
                None
            } else {
                Some(payload)
            }),
            EventKind::SetModel if !payload.is_null() => FormEvent::SetModel(payload),
            EventKind::Submit => FormEvent::Submit,
            EventKind::Validate => FormEvent::Validate,
            _ => FormEvent::Custom {
                name: name.to_string(),
                payload,
            },
        }
    }

    /// The subscription key this event is delivered to.
    pub fn kind(&self) -> EventKind {
        match self {
            FormEvent::Reset(_) => EventKind::Reset,
            FormEvent::SetModel(_) => EventKind::SetModel,
            FormEvent::Submit => EventKind::Submit,
            FormEvent::Validate => EventKind::Validate,
            FormEvent::ModelChange(_) => EventKind::ModelChange,
            FormEvent::Custom { name, .. } => EventKind::Custom(name.clone()),
        }
    }

    /// The payload, when the event carries one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            FormEvent::Reset(payload) => payload.as_ref(),
            FormEvent::SetModel(payload) => Some(payload),
            FormEvent::ModelChange(change) => Some(&change.value),
            FormEvent::Custom { payload, .. } => Some(payload),
            FormEvent::Submit | FormEvent::Validate => None,
        }
    }
}

//////////////////////////////////////////////// EventKind ////////////////////////////////////////////////

/// The key listeners subscribe under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `reset`
    Reset,
    /// `setModel`
    SetModel,
    /// `submit`
    Submit,
    /// `validate`
    Validate,
    /// `modelChange`
    ModelChange,
    /// Any other name.
    Custom(String),
}

impl EventKind {
    /// Maps an event name onto its kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "reset" => EventKind::Reset,
            "setModel" => EventKind::SetModel,
            "submit" => EventKind::Submit,
            "validate" => EventKind::Validate,
            "modelChange" => EventKind::ModelChange,
            other => EventKind::Custom(other.to_string()),
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        match self {
            EventKind::Reset => "reset",
            EventKind::SetModel => "setModel",
            EventKind::Submit => "submit",
            EventKind::Validate => "validate",
            EventKind::ModelChange => "modelChange",
            EventKind::Custom(name) => name,
        }
    }
}

///////////////////////////////////////////////// EventBus ////////////////////////////////////////////////

/// A callback registered on the bus.
pub type Listener = Rc<dyn Fn(&FormEvent)>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    queue: VecDeque<FormEvent>,
    dispatching: bool,
}

impl Registry {
    fn is_registered(&self, kind: &EventKind, id: ListenerId) -> bool {
        self.listeners
            .get(kind)
            .is_some_and(|listeners| listeners.iter().any(|(lid, _)| *lid == id))
    }
}

/// A cloneable handle to one form tree's event channel.
///
/// Clones share the same listener registry, so a bus created outside the form can be handed in
/// through [`FormBuilder::events`](crate::FormBuilder::events) and used to drive it.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
}

struct DispatchGuard<'a> {
    registry: &'a RefCell<Registry>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut registry = self.registry.borrow_mut();
        registry.dispatching = false;
        if std::thread::panicking() {
            registry.queue.clear();
        }
    }
}

impl EventBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events of `kind`.  Listeners of one kind run in registration
    /// order.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&FormEvent) + 'static) -> ListenerId {
        let mut registry = self.registry.borrow_mut();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener.  Returns false when it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let mut removed = false;
        for listeners in registry.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            removed |= listeners.len() != before;
        }
        registry.listeners.retain(|_, listeners| !listeners.is_empty());
        removed
    }

    /// The number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Delivers `event` to its listeners.  When called from inside a listener the event is
    /// queued behind the one currently being delivered.
    pub fn emit(&self, event: FormEvent) {
        {
            let mut registry = self.registry.borrow_mut();
            registry.queue.push_back(event);
            if registry.dispatching {
                return;
            }
            registry.dispatching = true;
        }
        let _guard = DispatchGuard {
            registry: &self.registry,
        };
        loop {
            let (event, snapshot) = {
                let mut registry = self.registry.borrow_mut();
                let Some(event) = registry.queue.pop_front() else {
                    break;
                };
                let snapshot = registry
                    .listeners
                    .get(&event.kind())
                    .cloned()
                    .unwrap_or_default();
                (event, snapshot)
            };
            let kind = event.kind();
            tracing::debug!(event = kind.name(), listeners = snapshot.len(), "dispatching form event");
            for (id, listener) in snapshot {
                let still_registered = self.registry.borrow().is_registered(&kind, id);
                if still_registered {
                    listener(&event);
                }
            }
        }
    }

    /// Emits `reset`.
    pub fn reset(&self, model: Option<Value>) {
        self.emit(FormEvent::Reset(model));
    }

    /// Emits `setModel`.
    pub fn set_model(&self, model: Value) {
        self.emit(FormEvent::SetModel(model));
    }

    /// Emits `submit`.
    pub fn submit(&self) {
        self.emit(FormEvent::Submit);
    }

    /// Emits `validate`.
    pub fn validate(&self) {
        self.emit(FormEvent::Validate);
    }

    /// Emits an event by name; see [`FormEvent::named`].
    pub fn emit_named(&self, name: &str, payload: Value) {
        self.emit(FormEvent::named(name, payload));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.borrow();
        let mut kinds: Vec<(&str, usize)> = registry
            .listeners
            .iter()
            .map(|(kind, listeners)| (kind.name(), listeners.len()))
            .collect();
        kinds.sort();
        f.debug_struct("EventBus").field("listeners", &kinds).finish()
    }
}
