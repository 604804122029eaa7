//! Pending resolvers.
//!
//! A reference that cannot resolve yet registers a resolver on every scope
//! node it depends on. Whenever one of them changes, a keyed runloop task
//! retries the resolution; the first success unregisters the resolver and
//! hands the node to the callback, exactly once.

use std::cell::RefCell;

use super::{try_resolve, Outcome, Reference, Resolved};
use crate::engine::arena::{Arena, Id};
use crate::engine::runloop::{self, TaskKey};
use crate::model::{self, DependantId, NodeId};
use crate::primitives::fragment::{self, FragmentId};

pub type ResolverId = Id<PendingResolver>;

/// Receives the node once resolution succeeds.
pub type ResolveCallback = Box<dyn FnOnce(Resolved)>;

pub struct PendingResolver {
    reference: Reference,
    fragment: FragmentId,
    watched: Vec<NodeId>,
    callback: Option<ResolveCallback>,
}

thread_local! {
    static RESOLVERS: RefCell<Arena<PendingResolver>> = const { RefCell::new(Arena::new()) };
}

fn with_resolvers<R>(f: impl FnOnce(&mut Arena<PendingResolver>) -> R) -> R {
    RESOLVERS.with(|resolvers| f(&mut resolvers.borrow_mut()))
}

/// Watch `watch` until `reference` resolves within `fragment`.
pub fn create(
    reference: Reference,
    fragment: FragmentId,
    watch: Vec<NodeId>,
    callback: ResolveCallback,
) -> ResolverId {
    tracing::debug!(target: "spark_view::resolver", reference = %reference.source, "reference pending");
    let id = with_resolvers(|resolvers| {
        resolvers.insert(PendingResolver {
            reference,
            fragment,
            watched: watch.clone(),
            callback: Some(callback),
        })
    });
    for node in watch {
        model::register(node, DependantId::Resolver(id));
    }
    id
}

/// A watched node changed: retry from a runloop task.
pub fn handle_change(id: ResolverId) {
    if with_resolvers(|resolvers| resolvers.contains(id)) {
        runloop::schedule_task_keyed(TaskKey::Resolver(id), move || retry(id));
    }
}

fn retry(id: ResolverId) {
    let Some((reference, fragment)) = with_resolvers(|resolvers| {
        resolvers
            .get(id)
            .map(|r| (r.reference.clone(), r.fragment))
    }) else {
        return;
    };

    if !fragment::exists(fragment) {
        cancel(id);
        return;
    }

    match try_resolve(&reference, fragment) {
        Outcome::Resolved(resolved) => {
            let callback = with_resolvers(|resolvers| resolvers.get_mut(id)?.callback.take());
            cancel(id);
            tracing::debug!(
                target: "spark_view::resolver",
                reference = %reference.source,
                keypath = %model::keypath(resolved.node),
                "reference resolved"
            );
            if let Some(callback) = callback {
                callback(resolved);
            }
        }
        Outcome::Pending { watch } => {
            let previous = with_resolvers(|resolvers| {
                resolvers
                    .get_mut(id)
                    .map(|r| std::mem::replace(&mut r.watched, watch.clone()))
            })
            .unwrap_or_default();
            if previous != watch {
                for node in previous {
                    model::unregister(node, DependantId::Resolver(id));
                }
                for node in watch {
                    model::register(node, DependantId::Resolver(id));
                }
            }
        }
    }
}

/// Stop watching and drop the resolver without calling back.
pub fn cancel(id: ResolverId) {
    let Some(resolver) = with_resolvers(|resolvers| resolvers.remove(id)) else {
        return;
    };
    for node in resolver.watched {
        model::unregister(node, DependantId::Resolver(id));
    }
}

/// Number of unresolved references.
pub fn pending_count() -> usize {
    with_resolvers(|resolvers| resolvers.len())
}

/// Drop all resolvers (for testing).
pub fn reset_resolvers() {
    with_resolvers(|resolvers| resolvers.clear());
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::pipeline::mount::{self, View, ViewOptions};
    use crate::template::Template;
    use serde_json::json;

    fn watch_root(calls: Rc<Cell<u32>>) -> (View, ResolverId) {
        crate::reset_all();
        let view = View::new(ViewOptions {
            template: Template::from_json(&json!(["x"])).unwrap(),
            data: json!({}),
            ..Default::default()
        })
        .unwrap();
        let root = mount::root_model(view).unwrap();
        let id = create(
            Reference::parse("later").unwrap(),
            view.root_fragment().unwrap(),
            vec![root],
            Box::new(move |_| calls.set(calls.get() + 1)),
        );
        (view, id)
    }

    #[test]
    fn test_resolves_exactly_once() {
        let calls = Rc::new(Cell::new(0));
        let (view, _) = watch_root(calls.clone());
        assert_eq!(pending_count(), 1);

        runloop::batch(|| {
            view.set("later", json!(1));
            view.set("other", json!(2));
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(pending_count(), 0);

        view.set("later", json!(3));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cancel_drops_the_callback() {
        let calls = Rc::new(Cell::new(0));
        let (view, id) = watch_root(calls.clone());

        cancel(id);
        cancel(id);
        view.set("later", json!(1));
        assert_eq!(calls.get(), 0);
        assert_eq!(pending_count(), 0);
    }
}
