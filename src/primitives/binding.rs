//! Reference bindings of view items.
//!
//! An item reading a reference holds a [`RefBinding`] per reference. Binding
//! resolves the reference (or leaves a pending resolver behind) and registers
//! the item as a dependant of the resolved node and of every node that
//! supplied a dynamic member.

use super::fragment;
use super::item::{self, with_item, ItemId};
use crate::engine::runloop::{self, ShuffleRegister};
use crate::model::{self, DependantId, NodeId};
use crate::resolver::pending::{self, ResolverId};
use crate::resolver::{self, expanded_keys, Outcome, Reference, Resolved};
use crate::types::Value;

#[derive(Debug, Clone)]
pub struct RefBinding {
    pub reference: Reference,
    pub model: Option<NodeId>,
    pub members: Vec<NodeId>,
    pub resolver: Option<ResolverId>,
}

impl RefBinding {
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            model: None,
            members: Vec::new(),
            resolver: None,
        }
    }

    /// Current value, `Null` while unresolved.
    pub fn value(&self) -> Value {
        self.model.map(model::get).unwrap_or(Value::Null)
    }
}

fn binding_of(id: ItemId, slot: usize) -> Option<RefBinding> {
    with_item(id, |s| s.binding(slot).cloned()).flatten()
}

fn update_binding(id: ItemId, slot: usize, f: impl FnOnce(&mut RefBinding)) {
    with_item(id, |s| {
        if let Some(binding) = s.binding_mut(slot) {
            f(binding);
        }
    });
}

/// Resolve binding `slot` of `id` within its fragment.
pub fn bind_slot(id: ItemId, slot: usize) {
    let Some(reference) = binding_of(id, slot).map(|b| b.reference) else {
        return;
    };
    let Some(fragment) = item::parent_fragment(id) else {
        return;
    };

    match resolver::try_resolve(&reference, fragment) {
        Outcome::Resolved(resolved) => attach(id, slot, resolved),
        Outcome::Pending { watch } => {
            let resolver = pending::create(
                reference,
                fragment,
                watch,
                Box::new(move |resolved| {
                    update_binding(id, slot, |b| b.resolver = None);
                    attach(id, slot, resolved);
                    item::handle_change(id);
                }),
            );
            update_binding(id, slot, |b| b.resolver = Some(resolver));
        }
    }
}

fn attach(id: ItemId, slot: usize, resolved: Resolved) {
    model::register(resolved.node, DependantId::Item(id));
    for &member in &resolved.members {
        model::register(member, DependantId::Item(id));
    }
    update_binding(id, slot, |b| {
        b.model = Some(resolved.node);
        b.members = resolved.members;
    });
}

fn detach(id: ItemId, slot: usize) {
    let Some(binding) = binding_of(id, slot) else {
        return;
    };
    if let Some(node) = binding.model {
        model::unregister(node, DependantId::Item(id));
    }
    for member in binding.members {
        model::unregister(member, DependantId::Item(id));
    }
    if let Some(resolver) = binding.resolver {
        pending::cancel(resolver);
    }
    update_binding(id, slot, |b| {
        b.model = None;
        b.members.clear();
        b.resolver = None;
    });
}

pub fn unbind_slot(id: ItemId, slot: usize) {
    detach(id, slot);
}

/// Re-resolve a binding with dynamic members; a member value may now point
/// it at another node. Returns whether the bound node changed.
pub fn refresh_members(id: ItemId, slot: usize) -> bool {
    let Some(binding) = binding_of(id, slot) else {
        return false;
    };
    if !binding.reference.has_members() || binding.resolver.is_some() {
        return false;
    }
    let Some(fragment) = item::parent_fragment(id) else {
        return false;
    };
    match resolver::try_resolve(&binding.reference, fragment) {
        Outcome::Resolved(resolved)
            if Some(resolved.node) == binding.model && resolved.members == binding.members =>
        {
            false
        }
        _ => {
            detach(id, slot);
            bind_slot(id, slot);
            true
        }
    }
}

/// Resolve binding `slot` again because its scope changed (an alias now
/// names another node). Returns whether the binding moved.
pub fn rebound_slot(id: ItemId, slot: usize) -> bool {
    let Some(binding) = binding_of(id, slot) else {
        return false;
    };
    let Some(fragment) = item::parent_fragment(id) else {
        return false;
    };
    let unchanged = matches!(
        resolver::try_resolve(&binding.reference, fragment),
        Outcome::Resolved(resolved)
            if Some(resolved.node) == binding.model && resolved.members == binding.members
    );
    if unchanged {
        return false;
    }
    detach(id, slot);
    bind_slot(id, slot);
    item::handle_change(id);
    true
}

/// Node `previous` this binding reads moved to `next` (array shuffle or a
/// relinked path).
pub fn rebind_slot(id: ItemId, slot: usize, next: Option<NodeId>, previous: NodeId) {
    let Some(binding) = binding_of(id, slot) else {
        return;
    };

    if binding.members.contains(&previous) {
        // a member moved: resolve from scratch after the shuffle settles
        detach(id, slot);
        bind_slot(id, slot);
        item::handle_change(id);
        return;
    }
    if binding.model != Some(previous) {
        return;
    }
    let Some(fragment) = item::parent_fragment(id) else {
        return;
    };

    let decided = rebind_match(&binding.reference, next, previous, fragment);
    if decided == Some(previous) {
        return;
    }

    model::unregister(previous, DependantId::Item(id));
    update_binding(id, slot, |b| b.model = decided);
    match decided {
        Some(node) => runloop::add_shuffle_register(ShuffleRegister::Dep {
            node,
            dependant: DependantId::Item(id),
            mark: true,
        }),
        None => item::handle_change(id),
    }
}

/// Decide which node a binding follows after a rebinding.
///
/// A reference that spells out the keys of the node it is bound to (say
/// `list.1` rather than `.` or `name` inside an iteration) keeps its node:
/// the path still means the same place even if the item there moved.
pub fn rebind_match(
    reference: &Reference,
    next: Option<NodeId>,
    previous: NodeId,
    fragment: fragment::FragmentId,
) -> Option<NodeId> {
    if reference.is_contextual() || model::is_key_name(next.unwrap_or(previous)) {
        return next;
    }
    let Some(keys) = expanded_keys(reference, fragment) else {
        return next;
    };

    let mut node = next.or(Some(previous));
    let mut matches = true;
    for key in keys.iter().rev() {
        let Some(current) = node else { break };
        if model::key(current).as_deref() != Some(key.as_str()) {
            matches = false;
        }
        node = model::parent(current);
    }

    match (next, matches) {
        (None, true) | (Some(_), false) => Some(previous),
        _ => next,
    }
}
