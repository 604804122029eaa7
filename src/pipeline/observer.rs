//! Observers - callbacks on model changes.
//!
//! An observer registers on a node and, when the node changes, queues a keyed
//! runloop task. Many changes within one flush collapse into a single call
//! with the latest value; a change that reverts to the last seen value calls
//! nothing.

use std::cell::RefCell;

use crate::engine::arena::{Arena, Id};
use crate::engine::runloop::{self, TaskKey};
use crate::model::{self, DependantId, NodeId};
use crate::types::{ObserverCallback, Value};

pub type ObserverId = Id<Observer>;

pub struct Observer {
    node: NodeId,
    callback: ObserverCallback,
    last: Value,
}

thread_local! {
    static OBSERVERS: RefCell<Arena<Observer>> = const { RefCell::new(Arena::new()) };
}

fn with_observers<R>(f: impl FnOnce(&mut Arena<Observer>) -> R) -> R {
    OBSERVERS.with(|observers| f(&mut observers.borrow_mut()))
}

/// Watch `node`. With `init` the callback runs at once with the current value.
pub fn observe(node: NodeId, callback: ObserverCallback, init: bool) -> ObserverId {
    let current = model::peek(node);
    let id = with_observers(|observers| {
        observers.insert(Observer {
            node,
            callback: callback.clone(),
            last: current.clone(),
        })
    });
    model::register(node, DependantId::Observer(id));
    model::reference(node);
    if init {
        callback(&current, &Value::Null);
    }
    id
}

pub fn handle_change(id: ObserverId) {
    if with_observers(|observers| observers.contains(id)) {
        runloop::schedule_task_keyed(TaskKey::Observer(id), move || dispatch(id));
    }
}

fn dispatch(id: ObserverId) {
    let Some(node) = with_observers(|observers| observers.get(id).map(|o| o.node)) else {
        return;
    };
    let current = model::peek(node);
    let Some((callback, previous)) = with_observers(|observers| {
        let observer = observers.get_mut(id)?;
        if observer.last == current {
            return None;
        }
        let previous = std::mem::replace(&mut observer.last, current.clone());
        Some((observer.callback.clone(), previous))
    }) else {
        return;
    };
    callback(&current, &previous);
}

/// Stop observing. Cancelling twice is a no-op.
pub fn cancel(id: ObserverId) {
    let Some(observer) = with_observers(|observers| observers.remove(id)) else {
        return;
    };
    model::unregister(observer.node, DependantId::Observer(id));
    model::unreference(observer.node);
}

pub fn observer_count() -> usize {
    with_observers(|observers| observers.len())
}

/// Drop all observers (for testing).
pub fn reset_observers() {
    with_observers(|observers| observers.clear());
}

/// An id for tests that need one without observing anything real.
#[cfg(test)]
pub(crate) fn test_observer_id() -> ObserverId {
    let node = model::create_root(Value::Null);
    with_observers(|observers| {
        observers.insert(Observer {
            node,
            callback: std::rc::Rc::new(|_, _| {}),
            last: Value::Null,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::rc::Rc;

    #[test]
    fn test_changes_coalesce_per_flush() {
        crate::reset_all();
        let root = model::create_root(json!({ "a": 1 }));
        let a = model::child(root, "a").unwrap();

        let calls = Rc::new(RefCell::new(Vec::new()));
        let c = calls.clone();
        observe(a, Rc::new(move |new, old| c.borrow_mut().push((new.clone(), old.clone()))), false);

        runloop::batch(|| {
            model::set(a, json!(2));
            model::set(a, json!(3));
        });
        assert_eq!(*calls.borrow(), vec![(json!(3), json!(1))]);
    }

    #[test]
    fn test_init_and_cancel() {
        crate::reset_all();
        let root = model::create_root(json!({ "a": 1 }));
        let a = model::child(root, "a").unwrap();

        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        let id = observe(a, Rc::new(move |_, _| *c.borrow_mut() += 1), true);
        assert_eq!(*calls.borrow(), 1);

        cancel(id);
        cancel(id);
        runloop::batch(|| model::set(a, json!(5)));
        assert_eq!(*calls.borrow(), 1);
        assert!(model::deps(a).is_empty());
    }
}
