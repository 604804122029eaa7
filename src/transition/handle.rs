//! Transition handles - what an effect function receives.
//!
//! A handle is created when an element with an intro renders (or an element
//! with an outro is removed), queued on the batch's transition manager and
//! started once the flush ends. The effect animates the node through the
//! handle and finishes it by calling [`TransitionHandle::complete`] or by
//! returning a [`Completion`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{args, params};
use crate::completion::Completion;
use crate::dom::{self, animate, prefix, DomNodeId};
use crate::engine::transitions::{self, ManagerId};
use crate::error::{Result, ViewError};
use crate::log;
use crate::model::{self, NodeId};
use crate::plugins::TransitionEffect;
use crate::state::visibility;
use crate::types::{loose_eq, to_number, value_to_string, Map, Value};

/// An argument expression evaluated when its handle starts.
///
/// The nodes it reads are retained until then, so a flush that unbinds the
/// element first cannot reclaim them.
pub struct DeferredArgs {
    source: String,
    nodes: Vec<Option<NodeId>>,
}

impl DeferredArgs {
    /// `nodes[n]` supplies `_n` (`None` reads as null).
    pub fn new(source: String, nodes: Vec<Option<NodeId>>) -> Self {
        for &node in nodes.iter().flatten() {
            model::reference(node);
        }
        Self { source, nodes }
    }

    fn evaluate(self) -> Vec<Value> {
        let values: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| node.map(model::get).unwrap_or(Value::Null))
            .collect();
        self.release();
        args::evaluate_expression(&self.source, &values).unwrap_or_else(|error| {
            log::warn_once(&error.to_string());
            Vec::new()
        })
    }

    fn release(&self) {
        for &node in self.nodes.iter().flatten() {
            model::unreference(node);
        }
    }
}

struct HandleState {
    node: DomNodeId,
    name: String,
    is_intro: bool,
    effect: Option<TransitionEffect>,
    args: Vec<Value>,
    deferred: Option<DeferredArgs>,
    manager: Option<ManagerId>,
    original_style: Option<String>,
    started: bool,
    completed: bool,
    on_complete: Vec<Box<dyn FnOnce()>>,
}

/// Shared handle to one running (or queued) transition.
#[derive(Clone)]
pub struct TransitionHandle {
    inner: Rc<RefCell<HandleState>>,
}

impl fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("TransitionHandle")
            .field("name", &state.name)
            .field("is_intro", &state.is_intro)
            .field("started", &state.started)
            .field("completed", &state.completed)
            .finish()
    }
}

impl TransitionHandle {
    pub fn new(
        node: DomNodeId,
        name: &str,
        is_intro: bool,
        effect: Option<TransitionEffect>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HandleState {
                node,
                name: name.to_string(),
                is_intro,
                effect,
                args,
                deferred: None,
                manager: None,
                original_style: None,
                started: false,
                completed: false,
                on_complete: Vec::new(),
            })),
        }
    }

    /// Take the arguments from `deferred` when the handle starts.
    pub fn with_deferred_args(self, deferred: DeferredArgs) -> Self {
        self.inner.borrow_mut().deferred = Some(deferred);
        self
    }

    pub fn node(&self) -> DomNodeId {
        self.inner.borrow().node
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn is_intro(&self) -> bool {
        self.inner.borrow().is_intro
    }

    pub fn is_started(&self) -> bool {
        self.inner.borrow().started
    }

    pub fn is_complete(&self) -> bool {
        self.inner.borrow().completed
    }

    /// Arguments the effect is called with (final once started).
    pub fn args(&self) -> Vec<Value> {
        self.inner.borrow().args.clone()
    }

    pub fn ptr_eq(&self, other: &TransitionHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_manager(&self, manager: ManagerId) {
        self.inner.borrow_mut().manager = Some(manager);
    }

    /// Run `callback` when the transition completes.
    pub fn on_complete(&self, callback: impl FnOnce() + 'static) {
        self.inner.borrow_mut().on_complete.push(Box::new(callback));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Capture the original style and invoke the effect.
    pub fn start(&self) {
        let (effect, deferred, node) = {
            let mut state = self.inner.borrow_mut();
            if state.started || state.completed {
                return;
            }
            state.started = true;
            (state.effect.clone(), state.deferred.take(), state.node)
        };
        if let Some(deferred) = deferred {
            let evaluated = deferred.evaluate();
            self.inner.borrow_mut().args = evaluated;
        }
        let args = self.args();
        let original = dom::get_attribute(node, "style");
        self.inner.borrow_mut().original_style = original;

        let Some(effect) = effect else {
            self.complete(false);
            return;
        };
        tracing::debug!(target: "spark_view::transition", name = %self.name(), intro = self.is_intro(), "transition started");

        if let Some(done) = effect(self.clone(), args) {
            let handle = self.clone();
            done.then(move || handle.complete(false));
        }
    }

    /// Finish the transition. Intros restore the element's original inline
    /// style unless `no_reset`. Calling it again does nothing.
    pub fn complete(&self, no_reset: bool) {
        let (callbacks, reset, manager, deferred) = {
            let mut state = self.inner.borrow_mut();
            if state.completed {
                return;
            }
            state.completed = true;
            let reset = (!no_reset && state.is_intro && state.started)
                .then(|| (state.node, state.original_style.clone()));
            (
                std::mem::take(&mut state.on_complete),
                reset,
                state.manager,
                state.deferred.take(),
            )
        };

        // never started
        if let Some(deferred) = deferred {
            deferred.release();
        }

        for callback in callbacks {
            callback();
        }
        if let Some((node, original)) = reset {
            dom::reset_style(node, original.as_deref());
        }
        if let Some(manager) = manager {
            transitions::remove(manager, self);
        }
    }

    // =========================================================================
    // Styles
    // =========================================================================

    /// Normalise `params` over `defaults` (see [`params::process_params`]).
    pub fn process_params(&self, params: Option<&Value>, defaults: &Map) -> Map {
        params::process_params(params, defaults)
    }

    /// Computed value of one property. `"0px"` reads as `0`.
    pub fn get_style_value(&self, property: &str) -> Value {
        let computed = dom::computed_style(self.node());
        read_computed(&computed, property)
    }

    /// Computed values of several properties.
    pub fn get_styles(&self, properties: &[&str]) -> Map {
        let computed = dom::computed_style(self.node());
        properties
            .iter()
            .map(|&p| (p.to_string(), read_computed(&computed, p)))
            .collect()
    }

    /// `get_style("prop")` or `get_style(["a", "b"])`.
    pub fn get_style(&self, properties: &Value) -> Result<Value> {
        match properties {
            Value::String(property) => Ok(self.get_style_value(property)),
            Value::Array(list) => {
                let names: Option<Vec<&str>> = list.iter().map(Value::as_str).collect();
                let names = names.ok_or(ViewError::GetStyleArgument)?;
                Ok(Value::Object(self.get_styles(&names)))
            }
            _ => Err(ViewError::GetStyleArgument),
        }
    }

    pub fn set_style(&self, property: &str, value: &Value) -> &Self {
        dom::set_style(self.node(), &prefix(property), &value_to_string(value));
        self
    }

    pub fn set_styles(&self, styles: &Map) -> &Self {
        for (property, value) in styles {
            self.set_style(property, value);
        }
        self
    }

    /// Animate one property. See [`TransitionHandle::animate_styles`].
    pub fn animate_style(&self, property: &str, value: Value, options: Option<&Map>) -> Completion {
        let mut to = Map::new();
        to.insert(property.to_string(), value);
        self.animate_styles(&to, options)
    }

    /// Dynamic-arity form: `(property, value, options)` or `(styles, options)`.
    ///
    /// A fourth (callback) argument is rejected; chain on the returned
    /// completion instead.
    pub fn animate_style_args(&self, args: &[Value]) -> Result<Completion> {
        let options = |value: Option<&Value>| value.and_then(Value::as_object).cloned();
        match args {
            [_, _, _, _] => Err(ViewError::AnimateStyleCallback),
            [Value::String(property), value, opts] => {
                Ok(self.animate_style(property, value.clone(), options(Some(opts)).as_ref()))
            }
            [Value::String(property), value] => Ok(self.animate_style(property, value.clone(), None)),
            [Value::Object(to), opts] => Ok(self.animate_styles(to, options(Some(opts)).as_ref())),
            [Value::Object(to)] => Ok(self.animate_styles(to, None)),
            other => Err(ViewError::AnimateStyleArity(other.len())),
        }
    }

    /// Transition the element's style to `to`.
    ///
    /// - page hidden: styles are set at once and the completion is resolved
    /// - no `options`: the transition's own params apply (with a warning)
    /// - zero duration: styles are set synchronously, resolved
    /// - nothing actually changes: resolved without animating
    pub fn animate_styles(&self, to: &Map, options: Option<&Map>) -> Completion {
        if !visibility::is_visible() {
            self.set_styles(to);
            return Completion::resolved();
        }

        let options = match options {
            Some(options) => options.clone(),
            None => {
                log::warn_once_if_debug(&format!(
                    "The \"{}\" transition does not supply an options object to `animate_style()`",
                    self.name()
                ));
                let args = self.args();
                params::process_params(args.first(), &Map::new())
            }
        };

        let done = Completion::new();
        let duration = options.get("duration").and_then(to_number).unwrap_or(0.0);
        if duration <= 0.0 || duration.is_nan() {
            self.set_styles(to);
            done.resolve();
            return done;
        }

        let node = self.node();
        let computed = dom::computed_style(node);
        let mut changed = Vec::new();
        for (property, target) in to {
            let current = read_computed(&computed, property);
            if !loose_eq(&current, target) {
                changed.push(property.clone());
                // start from an explicit value
                dom::set_style(node, &prefix(property), &value_to_string(&current));
            }
        }
        if changed.is_empty() {
            done.resolve();
            return done;
        }

        let targets: IndexMap<String, String> = to
            .iter()
            .map(|(property, value)| (property.clone(), value_to_string(value)))
            .collect();
        let delay = options.get("delay").and_then(to_number).unwrap_or(0.0);
        let easing = options
            .get("easing")
            .and_then(Value::as_str)
            .unwrap_or("linear")
            .to_string();
        animate::create_transitions(node, &targets, duration, delay, &easing, &changed, done.clone());
        done
    }
}

fn read_computed(computed: &IndexMap<String, String>, property: &str) -> Value {
    match computed.get(&prefix(property)) {
        Some(value) if value == "0px" => Value::from(0),
        Some(value) => Value::String(value.clone()),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::runloop;
    use serde_json::json;

    #[test]
    fn test_expression_arguments_read_values_at_start() {
        crate::reset_all();
        let root = model::create_root(json!({ "ms": 10 }));
        let ms = model::child(root, "ms").unwrap();
        let node = dom::create_element("div");
        let handle = TransitionHandle::new(node, "x", true, None, Vec::new())
            .with_deferred_args(DeferredArgs::new("[{\"duration\": _0}]".to_string(), vec![Some(ms)]));

        // a flush in between must not reclaim what the arguments read
        runloop::batch(|| model::set(ms, json!(20)));
        assert!(model::exists(ms));
        assert_eq!(model::ref_count(ms), 1);

        handle.start();
        assert_eq!(handle.args(), vec![json!({ "duration": 20 })]);
        assert_eq!(model::ref_count(ms), 0);
    }

    #[test]
    fn test_unstarted_handle_releases_its_arguments() {
        crate::reset_all();
        let root = model::create_root(json!({ "a": 1 }));
        let a = model::child(root, "a").unwrap();
        let handle = TransitionHandle::new(dom::create_element("p"), "x", false, None, Vec::new())
            .with_deferred_args(DeferredArgs::new("[_0]".to_string(), vec![Some(a), None]));
        assert_eq!(model::ref_count(a), 1);

        handle.complete(true);
        assert_eq!(model::ref_count(a), 0);
        assert!(handle.args().is_empty());
    }
}
