//! Runloop - batching and ordering of updates.
//!
//! Every mutation happens inside a batch (`start()` ... `end()`); batches nest
//! and only the outermost `end()` flushes. A flush runs in iterations:
//!
//! 1. Drain dirty model nodes, notifying their dependants. A node is notified
//!    at most once per iteration; if it is dirtied again it waits for the next
//!    iteration. Then update the view items that became dirty.
//! 2. Run scheduled tasks (observers, resolver retries, alias re-resolution).
//!    If they dirtied anything, start another iteration.
//! 3. Hand the batch's transition manager over: detach queued DOM nodes and
//!    start intros and outros.
//!
//! Mutations made while a flush is running are absorbed into it, so one
//! synchronous batch produces exactly one flush.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;

use super::transitions::{self, ManagerId};
use crate::completion::Completion;
use crate::dom::DomNodeId;
use crate::model::{self, Dependant, DependantId, NodeId};
use crate::pipeline::observer::ObserverId;
use crate::primitives::item::{self, ItemId};
use crate::resolver::pending::ResolverId;
use crate::transition::TransitionHandle;

/// Iterations after which a flush is abandoned as runaway feedback.
const MAX_ITERATIONS: usize = 1000;

/// Coalescing key: a keyed task is queued at most once until it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    Alias(ItemId),
    Observer(ObserverId),
    Resolver(ResolverId),
}

/// A registration deferred until every rebinding notification of a shuffle has
/// run, so that a dependant moved onto a node is not moved a second time by
/// that node's own rebinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleRegister {
    Dep {
        node: NodeId,
        dependant: DependantId,
        /// Notify the dependant once registered.
        mark: bool,
    },
    Link {
        node: NodeId,
        link: NodeId,
    },
}

struct Task {
    key: Option<TaskKey>,
    run: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct RunloopState {
    depth: usize,
    flushing: bool,
    dirty_nodes: IndexSet<NodeId>,
    dirty_items: IndexSet<ItemId>,
    tasks: VecDeque<Task>,
    task_keys: HashSet<TaskKey>,
    shuffle_registers: Vec<ShuffleRegister>,
    manager: Option<ManagerId>,
}

thread_local! {
    static RUNLOOP: RefCell<RunloopState> = RefCell::new(RunloopState::default());
}

fn with_runloop<R>(f: impl FnOnce(&mut RunloopState) -> R) -> R {
    RUNLOOP.with(|state| f(&mut state.borrow_mut()))
}

// =============================================================================
// Batches
// =============================================================================

/// Open a batch. Returns the completion of the batch's transitions.
pub fn start() -> Completion {
    let manager = with_runloop(|state| {
        state.depth += 1;
        state.manager
    });
    let manager = match manager {
        Some(manager) => manager,
        None => {
            let manager = transitions::create();
            with_runloop(|state| state.manager = Some(manager));
            manager
        }
    };
    transitions::completion(manager)
}

/// Close a batch, flushing when the outermost batch closes.
pub fn end() {
    let should_flush = with_runloop(|state| {
        state.depth = state.depth.saturating_sub(1);
        state.depth == 0 && !state.flushing
    });
    if should_flush {
        flush();
    }
}

/// Run `f` inside a batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    start();
    let result = f();
    end();
    result
}

/// Run `f` inside a batch and return the batch completion.
pub fn batch_completion(f: impl FnOnce()) -> Completion {
    let completion = start();
    f();
    end();
    completion
}

pub fn in_batch() -> bool {
    with_runloop(|state| state.depth > 0 || state.flushing)
}

pub fn is_flushing() -> bool {
    with_runloop(|state| state.flushing)
}

// =============================================================================
// Work Queues
// =============================================================================

pub fn add_dirty_node(node: NodeId) {
    with_runloop(|state| {
        state.dirty_nodes.insert(node);
    });
}

pub fn add_dirty_item(item: ItemId) {
    with_runloop(|state| {
        state.dirty_items.insert(item);
    });
}

pub fn schedule_task(task: impl FnOnce() + 'static) {
    with_runloop(|state| {
        state.tasks.push_back(Task {
            key: None,
            run: Box::new(task),
        })
    });
}

/// Schedule `task` unless a task with the same key is already queued.
pub fn schedule_task_keyed(key: TaskKey, task: impl FnOnce() + 'static) {
    with_runloop(|state| {
        if state.task_keys.insert(key) {
            state.tasks.push_back(Task {
                key: Some(key),
                run: Box::new(task),
            });
        }
    });
}

pub fn add_shuffle_register(register: ShuffleRegister) {
    with_runloop(|state| state.shuffle_registers.push(register));
}

/// Apply every deferred shuffle registration.
pub fn flush_shuffle_registers() {
    let registers = with_runloop(|state| std::mem::take(&mut state.shuffle_registers));
    for register in registers {
        match register {
            ShuffleRegister::Dep {
                node,
                dependant,
                mark,
            } => {
                model::register(node, dependant);
                if mark {
                    dependant.handle_change();
                }
            }
            ShuffleRegister::Link { node, link } => model::register_link(node, link),
        }
    }
}

fn current_manager() -> ManagerId {
    if let Some(manager) = with_runloop(|state| state.manager) {
        return manager;
    }
    let manager = transitions::create();
    with_runloop(|state| state.manager = Some(manager));
    manager
}

/// Queue a transition on the current batch.
pub fn register_transition(transition: TransitionHandle) {
    transitions::add(current_manager(), transition);
}

/// Detach (and free) `node` when the batch's transitions allow it.
///
/// With `wait_for_outros` the node stays in place until every outro of the
/// batch has completed.
pub fn detach_when_ready(node: DomNodeId, wait_for_outros: bool) {
    transitions::detach_when_ready(current_manager(), node, wait_for_outros);
}

// =============================================================================
// Flush
// =============================================================================

fn has_work(state: &RunloopState) -> bool {
    !state.dirty_nodes.is_empty() || !state.dirty_items.is_empty() || !state.tasks.is_empty()
}

fn flush() {
    with_runloop(|state| state.flushing = true);

    let mut iteration = 0;
    loop {
        iteration += 1;
        if iteration > MAX_ITERATIONS {
            tracing::warn!(
                target: "spark_view::runloop",
                iterations = MAX_ITERATIONS,
                "runloop did not settle, abandoning flush (possible feedback loop between observers)"
            );
            with_runloop(|state| {
                state.dirty_nodes.clear();
                state.dirty_items.clear();
                state.tasks.clear();
                state.task_keys.clear();
            });
            break;
        }
        tracing::trace!(target: "spark_view::runloop", iteration, "flush iteration");

        notify_dirty_nodes();
        update_dirty_items();
        run_tasks();

        if !with_runloop(|state| has_work(state)) {
            break;
        }
    }

    flush_shuffle_registers();
    let manager = with_runloop(|state| {
        state.flushing = false;
        state.manager.take()
    });
    model::reclaim();

    if let Some(manager) = manager {
        transitions::start(manager);
    }
}

/// Phase 1a: each dirty node is notified once per iteration.
fn notify_dirty_nodes() {
    let mut notified = HashSet::new();
    let mut deferred = IndexSet::new();
    loop {
        let batch = with_runloop(|state| std::mem::take(&mut state.dirty_nodes));
        if batch.is_empty() {
            break;
        }
        for node in batch {
            if notified.insert(node) {
                model::notify(node);
            } else {
                deferred.insert(node);
            }
        }
    }
    if !deferred.is_empty() {
        with_runloop(|state| state.dirty_nodes.extend(deferred));
    }
}

/// Phase 1b: update items dirtied by the notifications.
fn update_dirty_items() {
    loop {
        let items = with_runloop(|state| std::mem::take(&mut state.dirty_items));
        if items.is_empty() {
            break;
        }
        for id in items {
            item::update(id);
        }
    }
}

/// Phase 2: tasks queued so far. Tasks they schedule run next iteration.
fn run_tasks() {
    let tasks = with_runloop(|state| std::mem::take(&mut state.tasks));
    for task in tasks {
        if let Some(key) = task.key {
            with_runloop(|state| state.task_keys.remove(&key));
        }
        (task.run)();
    }
}

/// Drop all pending work (for testing).
pub fn reset_runloop() {
    with_runloop(|state| *state = RunloopState::default());
    transitions::reset_managers();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_nested_batches_flush_once() {
        reset_runloop();
        let runs = Rc::new(Cell::new(0));

        start();
        start();
        let r = runs.clone();
        schedule_task(move || r.set(r.get() + 1));
        end();
        assert_eq!(runs.get(), 0);
        end();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_keyed_tasks_coalesce() {
        reset_runloop();
        let runs = Rc::new(Cell::new(0));
        let key = TaskKey::Observer(crate::pipeline::observer::test_observer_id());

        batch(|| {
            for _ in 0..3 {
                let r = runs.clone();
                schedule_task_keyed(key, move || r.set(r.get() + 1));
            }
        });
        assert_eq!(runs.get(), 1);

        // runnable again once the first one ran
        batch(|| {
            let r = runs.clone();
            schedule_task_keyed(key, move || r.set(r.get() + 1));
        });
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_tasks_scheduled_during_flush_run_in_same_flush() {
        reset_runloop();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        batch(|| {
            schedule_task(move || {
                o.borrow_mut().push(1);
                let o2 = o.clone();
                batch(|| schedule_task(move || o2.borrow_mut().push(2)));
                // the nested batch does not flush while the outer flush runs
                assert_eq!(o.borrow().len(), 1);
            });
        });
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_batch_completion_resolves_without_transitions() {
        reset_runloop();
        let completion = batch_completion(|| {});
        assert!(completion.is_resolved());
        assert!(!in_batch());
    }
}
