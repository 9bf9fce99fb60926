//! A listener-notifying container for an aggregate's local model.
//!
//! Aggregates never mutate their model in place: they compute a new value and hand it to
//! [`ModelStore::set_model`], which replaces the stored value and then tells every listener.

use std::cell::RefCell;
use std::rc::Rc;

/// Handle returned by [`ModelStore::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreListenerId(u64);

type StoreListener<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    model: T,
    next_id: u64,
    listeners: Vec<(StoreListenerId, StoreListener<T>)>,
}

/// Holds a model value and the listeners interested in its replacement.
pub struct ModelStore<T> {
    inner: RefCell<Inner<T>>,
}

impl<T: Clone> ModelStore<T> {
    /// Creates a store holding `model`.
    pub fn new(model: T) -> Self {
        Self {
            inner: RefCell::new(Inner {
                model,
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    /// A copy of the current model.
    pub fn model(&self) -> T {
        self.inner.borrow().model.clone()
    }

    /// Reads the current model without copying it.
    pub fn with_model<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().model)
    }

    /// Replaces the model, notifies every listener once in registration order, then runs
    /// `callback`.
    ///
    /// Listeners receive the new model by reference and may call back into the store; the
    /// round of notification works from the listener set as it was when the call began.
    pub fn set_model(&self, model: T, callback: Option<&dyn Fn()>) {
        let listeners: Vec<StoreListener<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.model = model.clone();
            inner
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(&model);
        }
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Registers a change listener.
    pub fn listen(&self, listener: impl Fn(&T) + 'static) -> StoreListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = StoreListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Removes a change listener.  Returns false when it was not registered.
    pub fn unlisten(&self, id: StoreListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// The number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}
