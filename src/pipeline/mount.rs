//! Mount API - view instances.
//!
//! A [`View`] binds a template to a root model and renders it into a target
//! node. It is the entry point for reading and writing data: every write goes
//! through the runloop and returns the [`Completion`] of the batch it ran in,
//! which resolves once the transitions that batch started have finished.
//!
//! # Example
//!
//! ```ignore
//! use spark_view::{Template, View, ViewOptions};
//!
//! let view = View::new(ViewOptions {
//!     template: Template::parse(r#"[{"t":7,"e":"p","f":[{"t":2,"r":"name"}]}]"#)?,
//!     data: json!({ "name": "world" }),
//!     ..Default::default()
//! })?;
//!
//! view.set("name", json!("there"));
//! assert_eq!(view.to_html(), "<p>there</p>");
//!
//! view.teardown();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::observer::{self, ObserverId};
use crate::completion::Completion;
use crate::config::{self, ViewConfig};
use crate::dom::{self, DomNodeId};
use crate::engine::arena::{Arena, Id};
use crate::engine::runloop;
use crate::error::{Result, ViewError};
use crate::model::shuffle::{self, ArrayOp};
use crate::model::{self, join_keypath, split_keypath, NodeId};
use crate::plugins::{PluginKind, TransitionEffect};
use crate::primitives::fragment::{self, FragmentId, NewFragment};
use crate::template::Template;
use crate::types::Value;

// =============================================================================
// Instances
// =============================================================================

pub struct Instance {
    root: NodeId,
    fragment: Option<FragmentId>,
    target: DomNodeId,
    config: ViewConfig,
    transitions: HashMap<String, TransitionEffect>,
    parent: Option<View>,
    observers: Vec<ObserverId>,
}

thread_local! {
    static INSTANCES: RefCell<Arena<Instance>> = const { RefCell::new(Arena::new()) };
}

fn with_instance<R>(view: View, f: impl FnOnce(&mut Instance) -> R) -> Option<R> {
    INSTANCES.with(|instances| instances.borrow_mut().get_mut(view.0).map(f))
}

/// Options for [`View::new`].
#[derive(Default)]
pub struct ViewOptions {
    pub template: Template,
    pub data: Value,
    /// Node to render into. A detached `div` is created when omitted.
    pub target: Option<DomNodeId>,
    /// Transition effects private to this instance (and its children).
    pub transitions: HashMap<String, TransitionEffect>,
    /// Instance whose plugins this one inherits.
    pub parent: Option<View>,
    pub config: ViewConfig,
}

/// Handle to a mounted view instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct View(Id<Instance>);

/// Returned by [`View::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverHandle {
    view: View,
    id: ObserverId,
}

impl ObserverHandle {
    /// Stop observing. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        with_instance(self.view, |i| i.observers.retain(|&o| o != self.id));
        observer::cancel(self.id);
    }
}

impl View {
    /// Create the root model, then bind and render the template in one batch.
    pub fn new(options: ViewOptions) -> Result<View> {
        let target = match options.target {
            Some(target) if !dom::exists(target) => return Err(ViewError::MissingTarget),
            Some(target) => target,
            None => dom::create_element("div"),
        };
        config::set_debug(options.config.debug);

        let root = model::create_root(options.data);
        let view = View(INSTANCES.with(|instances| {
            instances.borrow_mut().insert(Instance {
                root,
                fragment: None,
                target,
                config: options.config,
                transitions: options.transitions,
                parent: options.parent,
                observers: Vec::new(),
            })
        }));

        let fragment = fragment::create(NewFragment {
            view,
            owner: None,
            parent: None,
            template: options.template.items.clone(),
            context: Some(root),
            is_root: true,
            is_iteration: false,
            index_ref: None,
            index: 0,
            key: None,
        });
        with_instance(view, |i| i.fragment = Some(fragment));

        runloop::batch(|| {
            fragment::bind(fragment);
            fragment::render(fragment, target, None);
        });
        tracing::debug!(target: "spark_view::mount", ?view, "view mounted");
        Ok(view)
    }

    pub fn root_fragment(&self) -> Option<FragmentId> {
        with_instance(*self, |i| i.fragment).flatten()
    }

    pub fn target(&self) -> Option<DomNodeId> {
        with_instance(*self, |i| i.target)
    }

    pub fn is_mounted(&self) -> bool {
        self.root_fragment().is_some()
    }

    /// Model node at `keypath` (created on first access).
    pub fn model(&self, keypath: &str) -> Option<NodeId> {
        root_model(*self).and_then(|root| model::join(root, keypath))
    }

    fn node(&self, keypath: &str) -> Result<NodeId> {
        self.model(keypath).ok_or(ViewError::TornDown)
    }

    /// Parent node and last key of `keypath`.
    fn parent_and_key(&self, keypath: &str) -> Result<(NodeId, String)> {
        let mut keys = split_keypath(keypath);
        let key = keys
            .pop()
            .ok_or_else(|| ViewError::InvalidReference(keypath.to_string()))?;
        Ok((self.node(&join_keypath(&keys))?, key))
    }

    // =========================================================================
    // Data
    // =========================================================================

    /// Value at `keypath`. Inside a computed getter the read is captured.
    pub fn get(&self, keypath: &str) -> Value {
        self.model(keypath).map(model::get).unwrap_or(Value::Null)
    }

    /// Write `value` at `keypath`.
    pub fn set(&self, keypath: &str, value: Value) -> Completion {
        let Some(node) = self.model(keypath) else {
            return Completion::resolved();
        };
        runloop::batch_completion(|| model::set(node, value))
    }

    pub fn push(&self, keypath: &str, items: Vec<Value>) -> Result<Completion> {
        self.array_op(keypath, ArrayOp::Push(items))
    }

    pub fn pop(&self, keypath: &str) -> Result<Completion> {
        self.array_op(keypath, ArrayOp::Pop)
    }

    pub fn shift(&self, keypath: &str) -> Result<Completion> {
        self.array_op(keypath, ArrayOp::Shift)
    }

    pub fn unshift(&self, keypath: &str, items: Vec<Value>) -> Result<Completion> {
        self.array_op(keypath, ArrayOp::Unshift(items))
    }

    /// `start` may be negative; `remove: None` removes everything from `start`.
    pub fn splice(
        &self,
        keypath: &str,
        start: i64,
        remove: Option<usize>,
        items: Vec<Value>,
    ) -> Result<Completion> {
        self.array_op(keypath, ArrayOp::Splice { start, remove, items })
    }

    fn array_op(&self, keypath: &str, op: ArrayOp) -> Result<Completion> {
        let node = self.node(keypath)?;
        let mut outcome = Ok(Vec::new());
        let completion = runloop::batch_completion(|| outcome = shuffle::apply(node, op));
        outcome.map(|_| completion)
    }

    /// Call `callback(new, old)` after flushes that changed `keypath`.
    pub fn observe(
        &self,
        keypath: &str,
        callback: impl Fn(&Value, &Value) + 'static,
        init: bool,
    ) -> Result<ObserverHandle> {
        let node = self.node(keypath)?;
        let id = observer::observe(node, Rc::new(callback), init);
        with_instance(*self, |i| i.observers.push(id));
        Ok(ObserverHandle { view: *self, id })
    }

    /// Define `keypath` as computed by `getter`. Values the getter reads with
    /// [`View::get`] become its dependencies.
    pub fn compute(&self, keypath: &str, getter: impl Fn() -> Value + 'static) -> Result<()> {
        let (parent, key) = self.parent_and_key(keypath)?;
        model::create_computed(parent, &key, Rc::new(getter))
            .map(|_| ())
            .ok_or(ViewError::TornDown)
    }

    /// Make `dest` a proxy for the node at `source`.
    pub fn link(&self, source: &str, dest: &str) -> Result<()> {
        let target = self.node(source)?;
        let (parent, key) = self.parent_and_key(dest)?;
        model::create_link(parent, &key, target)
            .map(|_| ())
            .ok_or(ViewError::TornDown)
    }

    /// Undo [`View::link`]. Unlinking a plain keypath does nothing.
    pub fn unlink(&self, dest: &str) -> Result<()> {
        let (parent, key) = self.parent_and_key(dest)?;
        if let Some(link) = model::existing_child(parent, &key).filter(|&n| model::is_link(n)) {
            model::remove_link(link);
        }
        Ok(())
    }

    // =========================================================================
    // DOM
    // =========================================================================

    /// First rendered node matching `selector`.
    pub fn find(&self, selector: &str) -> Option<DomNodeId> {
        fragment::find(self.root_fragment()?, selector)
    }

    pub fn find_all(&self, selector: &str) -> Vec<DomNodeId> {
        let mut found = Vec::new();
        if let Some(fragment) = self.root_fragment() {
            fragment::find_all(fragment, selector, &mut found);
        }
        found
    }

    /// Serialized contents of the target.
    pub fn to_html(&self) -> String {
        self.target().map(dom::inner_html).unwrap_or_default()
    }

    /// Text of the rendered template.
    pub fn to_text(&self) -> String {
        self.root_fragment().map(fragment::to_string).unwrap_or_default()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Unrender (playing outros), unbind and release the instance. The
    /// completion resolves once the outros have finished.
    pub fn teardown(self) -> Completion {
        let Some((fragment, observers)) =
            with_instance(self, |i| (i.fragment.take(), std::mem::take(&mut i.observers)))
        else {
            return Completion::resolved();
        };
        for id in observers {
            observer::cancel(id);
        }

        let completion = runloop::batch_completion(|| {
            if let Some(fragment) = fragment {
                fragment::teardown(fragment);
            }
        });

        if let Some(instance) = INSTANCES.with(|instances| instances.borrow_mut().remove(self.0)) {
            model::destroy_tree(instance.root);
        }
        tracing::debug!(target: "spark_view::mount", view = ?self, "view torn down");
        completion
    }
}

// =============================================================================
// Instance Queries
// =============================================================================

pub fn root_model(view: View) -> Option<NodeId> {
    with_instance(view, |i| i.root)
}

/// Configuration of `view` (defaults once torn down).
pub fn config(view: View) -> ViewConfig {
    with_instance(view, |i| i.config.clone()).unwrap_or_default()
}

/// A plugin registered on `view` itself.
pub fn own_plugin(view: View, kind: PluginKind, name: &str) -> Option<TransitionEffect> {
    match kind {
        PluginKind::Transitions => with_instance(view, |i| i.transitions.get(name).cloned()).flatten(),
    }
}

pub fn parent(view: View) -> Option<View> {
    with_instance(view, |i| i.parent).flatten()
}

pub fn instance_count() -> usize {
    INSTANCES.with(|instances| instances.borrow().len())
}

/// Drop every instance (for testing).
pub fn reset_instances() {
    INSTANCES.with(|instances| instances.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn mount(template: Value, data: Value) -> View {
        crate::reset_all();
        View::new(ViewOptions {
            template: Template::from_json(&template).unwrap(),
            data,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_renders_and_updates() {
        let view = mount(json!([{ "t": 7, "e": "p", "f": [{ "t": 2, "r": "name" }] }]), json!({ "name": "a" }));
        assert_eq!(view.to_html(), "<p>a</p>");

        let done = view.set("name", json!("b"));
        assert!(done.is_resolved());
        assert_eq!(view.to_html(), "<p>b</p>");
        assert_eq!(view.get("name"), json!("b"));
    }

    #[test]
    fn test_missing_target_is_an_error() {
        crate::reset_all();
        let stale = dom::create_element("div");
        dom::destroy(stale);
        let result = View::new(ViewOptions {
            target: Some(stale),
            ..Default::default()
        });
        assert_eq!(result.err(), Some(ViewError::MissingTarget));
    }

    #[test]
    fn test_array_ops_reject_non_arrays() {
        let view = mount(json!([]), json!({ "n": 1, "list": [1] }));
        assert_eq!(view.push("n", vec![json!(2)]).err(), Some(ViewError::NotAnArray("n".into())));

        view.push("list", vec![json!(2)]).unwrap();
        view.shift("list").unwrap();
        assert_eq!(view.get("list"), json!([2]));
    }

    #[test]
    fn test_compute_tracks_reads() {
        let view = mount(json!([{ "t": 2, "r": "total" }]), json!({ "a": 1, "b": 2 }));
        view.compute("total", move || {
            let a = view.get("a").as_i64().unwrap_or(0);
            let b = view.get("b").as_i64().unwrap_or(0);
            json!(a + b)
        })
        .unwrap();
        assert_eq!(view.get("total"), json!(3));

        view.set("a", json!(10));
        assert_eq!(view.get("total"), json!(12));
        assert_eq!(view.to_html(), "12");
    }

    #[test]
    fn test_link_and_unlink() {
        let view = mount(json!([{ "t": 2, "r": "alias.name" }]), json!({ "user": { "name": "x" } }));
        view.link("user", "alias").unwrap();
        assert_eq!(view.to_html(), "x");

        view.set("user.name", json!("y"));
        assert_eq!(view.to_html(), "y");

        view.unlink("alias").unwrap();
        assert_eq!(view.get("alias.name"), Value::Null);
    }

    #[test]
    fn test_teardown_cancels_observers_and_releases() {
        let view = mount(json!([{ "t": 7, "e": "b", "f": ["x"] }]), json!({ "a": 1 }));
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        view.observe("a", move |_, _| c.set(c.get() + 1), false).unwrap();

        let done = view.teardown();
        assert!(done.is_resolved());
        assert_eq!(view.to_html(), "");
        assert!(!view.is_mounted());
        assert_eq!(observer::observer_count(), 0);
        assert_eq!(instance_count(), 0);

        // a torn down view is inert
        assert!(view.set("a", json!(2)).is_resolved());
        assert_eq!(view.observe("a", |_, _| {}, false).err(), Some(ViewError::TornDown));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_plugins_inherit_from_parent() {
        crate::reset_all();
        let mut transitions: HashMap<String, TransitionEffect> = HashMap::new();
        transitions.insert("fade".into(), Rc::new(|_, _| None));
        let parent = View::new(ViewOptions {
            transitions,
            ..Default::default()
        })
        .unwrap();
        let child = View::new(ViewOptions {
            parent: Some(parent),
            ..Default::default()
        })
        .unwrap();

        assert!(own_plugin(child, PluginKind::Transitions, "fade").is_none());
        assert!(crate::plugins::find_in_view_hierarchy(PluginKind::Transitions, child, "fade").is_some());
    }
}
