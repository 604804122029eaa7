//! Plugin registries.
//!
//! Transition effects are registered per instance (through
//! [`crate::ViewOptions::transitions`]) or globally. Lookup walks from an
//! instance up through its parents and ends at the global registry.
//!
//! # Example
//!
//! ```ignore
//! plugins::register_transition("fade", |t, args| {
//!     let params = t.process_params(args.first(), &Map::new());
//!     t.set_style("opacity", &json!(0));
//!     Some(t.animate_style("opacity", json!(1), Some(&params)))
//! });
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::completion::Completion;
use crate::pipeline::mount::{self, View};
use crate::transition::TransitionHandle;
use crate::types::Value;

/// A transition effect. Returning a completion finishes the transition when
/// it resolves; returning `None` leaves finishing to the effect
/// ([`TransitionHandle::complete`]).
pub type TransitionEffect = Rc<dyn Fn(TransitionHandle, Vec<Value>) -> Option<Completion>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Transitions,
}

thread_local! {
    static GLOBAL_TRANSITIONS: RefCell<HashMap<String, TransitionEffect>> = RefCell::new(HashMap::new());
}

/// Register a transition effect for every instance.
pub fn register_transition(
    name: &str,
    effect: impl Fn(TransitionHandle, Vec<Value>) -> Option<Completion> + 'static,
) {
    GLOBAL_TRANSITIONS.with(|registry| {
        registry.borrow_mut().insert(name.to_string(), Rc::new(effect));
    });
}

pub fn unregister_transition(name: &str) {
    GLOBAL_TRANSITIONS.with(|registry| {
        registry.borrow_mut().remove(name);
    });
}

/// Find `name` on `view`, its ancestors, then the global registry.
pub fn find_in_view_hierarchy(kind: PluginKind, view: View, name: &str) -> Option<TransitionEffect> {
    let mut current = Some(view);
    while let Some(instance) = current {
        if let Some(found) = mount::own_plugin(instance, kind, name) {
            return Some(found);
        }
        current = mount::parent(instance);
    }
    match kind {
        PluginKind::Transitions => {
            GLOBAL_TRANSITIONS.with(|registry| registry.borrow().get(name).cloned())
        }
    }
}

/// Drop every global plugin (for testing).
pub fn reset_plugins() {
    GLOBAL_TRANSITIONS.with(|registry| registry.borrow_mut().clear());
}
