//! Alias blocks - `{{#with list.0 as first, other as second}}`.
//!
//! Each alias name resolves once, against the enclosing fragment, and the
//! block's fragment exposes the resolved nodes by name. Aliased nodes are
//! retained (reference counted) while the block is bound. When an aliased
//! node is rebound by an array shuffle the names are resolved again in a
//! runloop task.

use std::rc::Rc;

use indexmap::IndexMap;

use super::fragment::{self, AliasEntry, FragmentId, NewFragment};
use super::item::{self, with_item, ItemId, ItemKind};
use crate::dom::DomNodeId;
use crate::engine::runloop::{self, TaskKey};
use crate::model::{self, DependantId, NodeId};
use crate::resolver::{self, Reference};
use crate::template::TemplateItem;
use crate::types::ItemFlags;

pub struct AliasItem {
    pub aliases: Vec<(String, Reference)>,
    /// Resolved nodes, each retained once.
    pub nodes: IndexMap<String, NodeId>,
    pub fragment: Option<FragmentId>,
    pub template: Rc<Vec<TemplateItem>>,
}

impl AliasItem {
    pub fn new(aliases: &[(String, Reference)], template: Rc<Vec<TemplateItem>>) -> Self {
        Self {
            aliases: aliases.to_vec(),
            nodes: IndexMap::new(),
            fragment: None,
            template,
        }
    }
}

fn alias<R>(id: ItemId, f: impl FnOnce(&mut AliasItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Alias(a) => Some(f(a)),
        _ => None,
    })
    .flatten()
}

/// Resolve every alias in the enclosing fragment.
fn resolve_all(id: ItemId) -> IndexMap<String, AliasEntry> {
    let Some(parent) = item::parent_fragment(id) else {
        return IndexMap::new();
    };
    let aliases = alias(id, |a| a.aliases.clone()).unwrap_or_default();
    aliases
        .into_iter()
        .filter_map(|(name, reference)| {
            let resolved = resolver::resolve_or_fallback(&reference, parent)?;
            Some((
                name,
                AliasEntry {
                    node: resolved.node,
                    reference,
                },
            ))
        })
        .collect()
}

fn retain(id: ItemId, node: NodeId) {
    model::reference(node);
    model::register(node, DependantId::Item(id));
}

fn release(id: ItemId, node: NodeId) {
    model::unregister(node, DependantId::Item(id));
    model::unreference(node);
}

pub fn bind(id: ItemId) {
    let entries = resolve_all(id);
    for entry in entries.values() {
        retain(id, entry.node);
    }
    let Some(template) = alias(id, |a| {
        a.nodes = entries.iter().map(|(name, e)| (name.clone(), e.node)).collect();
        a.template.clone()
    }) else {
        return;
    };

    let Some(options) = item::parent_fragment(id).and_then(|parent| NewFragment::child(parent, id, template))
    else {
        return;
    };
    let fragment = fragment::create(options);
    alias(id, |a| a.fragment = Some(fragment));
    fragment::set_aliases(fragment, entries);
    fragment::bind(fragment);
}

pub fn unbind(id: ItemId) {
    let Some((nodes, fragment)) = alias(id, |a| (std::mem::take(&mut a.nodes), a.fragment)) else {
        return;
    };
    if let Some(fragment) = fragment {
        fragment::unbind(fragment);
    }
    for node in nodes.into_values() {
        release(id, node);
    }
}

pub(crate) fn destroy_fragment(id: ItemId) {
    if let Some(fragment) = alias(id, |a| a.fragment.take()).flatten() {
        fragment::destroy(fragment);
    }
}

/// An aliased node moved: resolve the names again once the shuffle settles.
pub fn rebinding(id: ItemId) {
    runloop::schedule_task_keyed(TaskKey::Alias(id), move || {
        if reresolve(id) {
            if let Some(fragment) = alias(id, |a| a.fragment).flatten() {
                fragment::rebound(fragment);
            }
        }
    });
}

/// An enclosing scope changed: resolve the names again, then the block.
pub fn rebound(id: ItemId) {
    reresolve(id);
    if let Some(fragment) = alias(id, |a| a.fragment).flatten() {
        fragment::rebound(fragment);
    }
}

/// Resolve the names again. Returns whether any of them moved.
fn reresolve(id: ItemId) -> bool {
    let bound = item::flags(id).contains(ItemFlags::BOUND);
    if !bound {
        return false;
    }
    let entries = resolve_all(id);
    let previous = alias(id, |a| a.nodes.clone()).unwrap_or_default();

    for (name, node) in &previous {
        if entries.get(name).map(|e| e.node) != Some(*node) {
            release(id, *node);
        }
    }
    for (name, entry) in &entries {
        if previous.get(name) != Some(&entry.node) {
            retain(id, entry.node);
        }
    }

    let moved = previous.len() != entries.len()
        || entries.iter().any(|(name, e)| previous.get(name) != Some(&e.node));
    let fragment = alias(id, |a| {
        a.nodes = entries.iter().map(|(name, e)| (name.clone(), e.node)).collect();
        a.fragment
    })
    .flatten();
    if let Some(fragment) = fragment {
        fragment::set_aliases(fragment, entries);
    }
    moved
}

pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    if let Some(fragment) = alias(id, |a| a.fragment).flatten() {
        fragment::render(fragment, parent, anchor);
    }
}

pub fn unrender(id: ItemId, should_destroy: bool) {
    if let Some(fragment) = alias(id, |a| a.fragment).flatten() {
        fragment::unrender(fragment, should_destroy);
    }
}

pub fn nodes(id: ItemId) -> Vec<DomNodeId> {
    alias(id, |a| a.fragment)
        .flatten()
        .map(fragment::nodes)
        .unwrap_or_default()
}

pub fn find_all(id: ItemId, selector: &str, out: &mut Vec<DomNodeId>) {
    if let Some(fragment) = alias(id, |a| a.fragment).flatten() {
        fragment::find_all(fragment, selector, out);
    }
}

pub fn to_string(id: ItemId) -> String {
    alias(id, |a| a.fragment)
        .flatten()
        .map(fragment::to_string)
        .unwrap_or_default()
}

/// Nodes the block currently exposes, by alias name.
pub fn resolved_nodes(id: ItemId) -> IndexMap<String, NodeId> {
    alias(id, |a| a.nodes.clone()).unwrap_or_default()
}
