//! Transitions - intro and outro effects of elements.
//!
//! A transition directive (`t0` intro-outro, `t1` intro, `t2` outro) binds
//! with its element:
//! - the effect name is literal or the text of a throwaway fragment
//! - arguments are static, an expression over references, or the text of a
//!   dynamic fragment
//! - the effect is looked up in the view hierarchy, then globally; a missing
//!   effect is reported once and the transition completes as soon as it starts
//!
//! When the element renders (intro) or is removed (outro) [`prepare`] creates
//! a [`TransitionHandle`] that the runloop starts at the end of the flush.
//! Expression arguments are evaluated as the handle starts.

pub mod args;
pub mod handle;
pub mod params;

use crate::dom::DomNodeId;
use crate::log;
use crate::pipeline::mount;
use crate::plugins::{self, PluginKind, TransitionEffect};
use crate::primitives::binding::{self, RefBinding};
use crate::primitives::fragment::{self, NewFragment};
use crate::primitives::item::{self, with_item, ItemId, ItemKind};
use crate::template::{TransitionName, TransitionParams};
use crate::types::{TransitionKind, Value};

pub use handle::{DeferredArgs, TransitionHandle};
pub use params::process_params;

pub struct TransitionItem {
    pub kind: TransitionKind,
    pub name: TransitionName,
    pub params: TransitionParams,
    pub element: Option<ItemId>,
    /// Effect name once bound (`None` for an empty dynamic name).
    pub resolved_name: Option<String>,
    pub effect: Option<TransitionEffect>,
    /// Bindings of the references an argument expression reads.
    pub bindings: Vec<RefBinding>,
    /// Static or dynamic-fragment arguments.
    pub args: Vec<Value>,
}

impl TransitionItem {
    pub fn new(
        kind: TransitionKind,
        name: TransitionName,
        params: TransitionParams,
        element: Option<ItemId>,
    ) -> Self {
        let bindings = match &params {
            TransitionParams::Expression { refs, .. } => {
                refs.iter().cloned().map(RefBinding::new).collect()
            }
            _ => Vec::new(),
        };
        Self {
            kind,
            name,
            params,
            element,
            resolved_name: None,
            effect: None,
            bindings,
            args: Vec::new(),
        }
    }
}

fn transition<R>(id: ItemId, f: impl FnOnce(&mut TransitionItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Transition(t) => Some(f(t)),
        _ => None,
    })
    .flatten()
}

/// Text of a throwaway fragment rendered from `template` in the item's scope.
fn evaluate_text(id: ItemId, template: std::rc::Rc<Vec<crate::template::TemplateItem>>) -> String {
    let Some(options) = item::parent_fragment(id).and_then(|parent| NewFragment::child(parent, id, template))
    else {
        return String::new();
    };
    let throwaway = fragment::create(options);
    fragment::bind(throwaway);
    let text = fragment::to_string(throwaway);
    fragment::destroy(throwaway);
    text
}

pub fn bind(id: ItemId) {
    let Some((name, params, slots)) = transition(id, |t| (t.name.clone(), t.params.clone(), t.bindings.len())) else {
        return;
    };

    let name = match name {
        TransitionName::Static(name) => name,
        TransitionName::Dynamic(template) => evaluate_text(id, template),
    };
    if name.is_empty() {
        // an empty name means no transition
        return;
    }

    let args = match params {
        TransitionParams::None | TransitionParams::Expression { .. } => Vec::new(),
        TransitionParams::Static(args) => args,
        TransitionParams::Dynamic(template) => {
            let text = evaluate_text(id, template);
            args::parse_args_list(&text).unwrap_or_else(|error| {
                log::warn_once(&error.to_string());
                Vec::new()
            })
        }
    };
    for slot in 0..slots {
        binding::bind_slot(id, slot);
    }

    let view = item::parent_fragment(id).and_then(fragment::view);
    let effect = view.and_then(|view| plugins::find_in_view_hierarchy(PluginKind::Transitions, view, &name));
    if effect.is_none() {
        log::warn_once_if_debug(&log::missing_plugin(&name, "transition"));
    }

    transition(id, |t| {
        t.resolved_name = Some(name);
        t.effect = effect;
        t.args = args;
    });
}

/// Create the handle for `node` entering (`is_intro`) or leaving the page.
///
/// `None` when transitions are disabled for the instance or the directive
/// has no effect name.
pub fn prepare(id: ItemId, node: DomNodeId, is_intro: bool) -> Option<TransitionHandle> {
    let enabled = item::parent_fragment(id)
        .and_then(fragment::view)
        .is_some_and(|view| mount::config(view).transitions_enabled);
    if !enabled {
        return None;
    }

    let (name, effect, static_args, params, bindings) = transition(id, |t| {
        (
            t.resolved_name.clone(),
            t.effect.clone(),
            t.args.clone(),
            t.params.clone(),
            t.bindings.clone(),
        )
    })?;
    let name = name?;

    tracing::trace!(target: "spark_view::transition", name = %name, is_intro, "transition queued");
    let handle = TransitionHandle::new(node, &name, is_intro, effect, static_args);
    Some(match params {
        TransitionParams::Expression { source, .. } => {
            let nodes = bindings.iter().map(|b| b.model).collect();
            handle.with_deferred_args(DeferredArgs::new(source, nodes))
        }
        _ => handle,
    })
}
