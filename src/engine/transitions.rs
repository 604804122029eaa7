//! Transition manager - one per runloop batch.
//!
//! Collects the intros and outros a batch produced and the DOM nodes it wants
//! removed. When the flush ends the manager starts:
//! - nodes that do not wait for outros are removed at once
//! - every queued transition is started
//!
//! The remaining nodes are removed once the last outro completes, and the
//! batch [`Completion`] resolves once every transition has completed.

use std::cell::RefCell;

use super::arena::{Arena, Id};
use crate::completion::Completion;
use crate::dom::{self, DomNodeId};
use crate::transition::TransitionHandle;

pub type ManagerId = Id<TransitionManager>;

struct Detach {
    node: DomNodeId,
    wait_for_outros: bool,
}

pub struct TransitionManager {
    intros: Vec<TransitionHandle>,
    outros: Vec<TransitionHandle>,
    detach_queue: Vec<Detach>,
    completion: Completion,
    started: bool,
}

thread_local! {
    static MANAGERS: RefCell<Arena<TransitionManager>> = const { RefCell::new(Arena::new()) };
}

fn with_managers<R>(f: impl FnOnce(&mut Arena<TransitionManager>) -> R) -> R {
    MANAGERS.with(|managers| f(&mut managers.borrow_mut()))
}

pub fn create() -> ManagerId {
    with_managers(|managers| {
        managers.insert(TransitionManager {
            intros: Vec::new(),
            outros: Vec::new(),
            detach_queue: Vec::new(),
            completion: Completion::new(),
            started: false,
        })
    })
}

/// Completion of the batch owning `id` (resolved if the manager is gone).
pub fn completion(id: ManagerId) -> Completion {
    with_managers(|managers| managers.get(id).map(|m| m.completion.clone()))
        .unwrap_or_else(Completion::resolved)
}

pub fn add(id: ManagerId, transition: TransitionHandle) {
    let added = with_managers(|managers| {
        let Some(manager) = managers.get_mut(id) else { return false };
        if transition.is_intro() {
            manager.intros.push(transition.clone());
        } else {
            manager.outros.push(transition.clone());
        }
        true
    });
    if added {
        transition.set_manager(id);
    }
}

pub fn detach_when_ready(id: ManagerId, node: DomNodeId, wait_for_outros: bool) {
    let queued = with_managers(|managers| {
        let Some(manager) = managers.get_mut(id) else { return false };
        manager.detach_queue.push(Detach {
            node,
            wait_for_outros,
        });
        true
    });
    if !queued {
        dom::destroy(node);
    }
}

/// Remove non-waiting nodes, then start every queued transition.
pub fn start(id: ManagerId) {
    let Some((immediate, transitions)) = with_managers(|managers| {
        let manager = managers.get_mut(id)?;
        manager.started = true;

        let (waiting, immediate): (Vec<Detach>, Vec<Detach>) =
            std::mem::take(&mut manager.detach_queue)
                .into_iter()
                .partition(|d| d.wait_for_outros);
        manager.detach_queue = waiting;

        let transitions: Vec<TransitionHandle> = manager
            .intros
            .iter()
            .chain(manager.outros.iter())
            .cloned()
            .collect();
        Some((immediate, transitions))
    }) else {
        return;
    };

    for detach in immediate {
        dom::destroy(detach.node);
    }
    tracing::trace!(target: "spark_view::runloop", transitions = transitions.len(), "starting transitions");
    for transition in transitions {
        transition.start();
    }
    check(id);
}

/// A transition of this manager completed.
pub fn remove(id: ManagerId, transition: &TransitionHandle) {
    with_managers(|managers| {
        if let Some(manager) = managers.get_mut(id) {
            manager.intros.retain(|t| !t.ptr_eq(transition));
            manager.outros.retain(|t| !t.ptr_eq(transition));
        }
    });
    check(id);
}

fn check(id: ManagerId) {
    let Some((detach, finished)) = with_managers(|managers| {
        let manager = managers.get_mut(id)?;
        if !manager.started {
            return None;
        }
        let detach = if manager.outros.is_empty() {
            std::mem::take(&mut manager.detach_queue)
        } else {
            Vec::new()
        };
        let finished = manager.intros.is_empty() && manager.outros.is_empty();
        Some((detach, finished))
    }) else {
        return;
    };

    for d in detach {
        dom::destroy(d.node);
    }
    if finished {
        if let Some(manager) = with_managers(|managers| managers.remove(id)) {
            manager.completion.resolve();
        }
    }
}

/// Number of managers still waiting on transitions.
pub fn active_managers() -> usize {
    with_managers(|managers| managers.len())
}

/// Drop all managers (for testing).
pub fn reset_managers() {
    with_managers(|managers| managers.clear());
}
