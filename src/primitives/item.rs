//! View items - the polymorphic nodes of a rendered tree.
//!
//! Items live in a thread-local arena and are addressed by [`ItemId`]. Each
//! item goes through the same lifecycle:
//!
//! ```text
//! create -> bind -> render <-> unrender -> unbind -> destroy
//! ```
//!
//! The functions here dispatch each lifecycle step to the module owning the
//! item kind. None of them holds the arena borrow while calling into the model
//! or the DOM, so item code is free to re-enter the engine.

use std::cell::RefCell;

use super::alias::{self, AliasItem};
use super::attribute::{self, AttributeItem};
use super::binding::RefBinding;
use super::control_flow::{self, SectionItem};
use super::element::{self, ElementItem};
use super::fragment::FragmentId;
use super::interpolator::{self, InterpolatorItem};
use super::text::{self, TextItem};
use crate::dom::DomNodeId;
use crate::engine::arena::{Arena, Id};
use crate::engine::runloop;
use crate::model::NodeId;
use crate::template::TemplateItem;
use crate::transition::{self, TransitionItem};
use crate::types::ItemFlags;

/// Handle to a view item.
pub type ItemId = Id<ItemSlot>;

pub enum ItemKind {
    Text(TextItem),
    Interpolator(InterpolatorItem),
    Attribute(AttributeItem),
    Element(ElementItem),
    Section(SectionItem),
    Alias(AliasItem),
    Transition(TransitionItem),
}

pub struct ItemSlot {
    /// Fragment the item belongs to.
    pub parent: FragmentId,
    pub flags: ItemFlags,
    pub kind: ItemKind,
}

impl ItemSlot {
    /// Reference binding number `slot` of this item.
    pub fn binding(&self, slot: usize) -> Option<&RefBinding> {
        match &self.kind {
            ItemKind::Interpolator(i) if slot == 0 => Some(&i.binding),
            ItemKind::Section(s) if slot == 0 => Some(&s.binding),
            ItemKind::Attribute(a) => a.bindings.get(slot),
            ItemKind::Transition(t) => t.bindings.get(slot),
            _ => None,
        }
    }

    pub fn binding_mut(&mut self, slot: usize) -> Option<&mut RefBinding> {
        match &mut self.kind {
            ItemKind::Interpolator(i) if slot == 0 => Some(&mut i.binding),
            ItemKind::Section(s) if slot == 0 => Some(&mut s.binding),
            ItemKind::Attribute(a) => a.bindings.get_mut(slot),
            ItemKind::Transition(t) => t.bindings.get_mut(slot),
            _ => None,
        }
    }

    fn binding_count(&self) -> usize {
        match &self.kind {
            ItemKind::Interpolator(_) | ItemKind::Section(_) => 1,
            ItemKind::Attribute(a) => a.bindings.len(),
            ItemKind::Transition(t) => t.bindings.len(),
            _ => 0,
        }
    }
}

thread_local! {
    static ITEMS: RefCell<Arena<ItemSlot>> = const { RefCell::new(Arena::new()) };
}

/// Run `f` against a live item.
pub(crate) fn with_item<R>(id: ItemId, f: impl FnOnce(&mut ItemSlot) -> R) -> Option<R> {
    ITEMS.with(|items| items.borrow_mut().get_mut(id).map(f))
}

pub fn exists(id: ItemId) -> bool {
    ITEMS.with(|items| items.borrow().contains(id))
}

pub fn parent_fragment(id: ItemId) -> Option<FragmentId> {
    with_item(id, |slot| slot.parent)
}

pub fn flags(id: ItemId) -> ItemFlags {
    with_item(id, |slot| slot.flags).unwrap_or_default()
}

pub(crate) fn set_flag(id: ItemId, flag: ItemFlags, on: bool) {
    with_item(id, |slot| slot.flags.set(flag, on));
}

/// Number of live items.
pub fn item_count() -> usize {
    ITEMS.with(|items| items.borrow().len())
}

/// Drop every item (for testing).
pub fn reset_items() {
    ITEMS.with(|items| items.borrow_mut().clear());
}

// =============================================================================
// Lifecycle Dispatch
// =============================================================================

/// Create an (unbound) item for `template` inside `parent`.
///
/// `owner` is the element an attribute or transition directive belongs to.
pub fn create(parent: FragmentId, template: &TemplateItem, owner: Option<ItemId>) -> ItemId {
    let kind = match template {
        TemplateItem::Text(_) | TemplateItem::Comment(_) => ItemKind::Text(TextItem::new(template)),
        TemplateItem::Interpolator { reference } => {
            ItemKind::Interpolator(InterpolatorItem::new(reference))
        }
        TemplateItem::Attribute { name, value } => {
            ItemKind::Attribute(AttributeItem::new(name, value, owner))
        }
        TemplateItem::Element { tag, .. } => ItemKind::Element(ElementItem::new(tag)),
        TemplateItem::Section {
            kind,
            reference,
            index_ref,
            children,
        } => ItemKind::Section(SectionItem::new(*kind, reference, index_ref.clone(), children.clone())),
        TemplateItem::Alias { aliases, children } => {
            ItemKind::Alias(AliasItem::new(aliases, children.clone()))
        }
        TemplateItem::Transition { kind, name, params } => {
            ItemKind::Transition(TransitionItem::new(*kind, name.clone(), params.clone(), owner))
        }
    };

    let id = ITEMS.with(|items| {
        items.borrow_mut().insert(ItemSlot {
            parent,
            flags: ItemFlags::NONE,
            kind,
        })
    });

    // Elements build their attributes and child fragment right away, they
    // need the element's own id.
    if let TemplateItem::Element {
        attributes,
        children,
        ..
    } = template
    {
        element::create_children(id, parent, attributes, children.clone());
    }
    id
}

pub fn bind(id: ItemId) {
    if flags(id).contains(ItemFlags::BOUND) {
        return;
    }
    set_flag(id, ItemFlags::BOUND, true);
    match kind_of(id) {
        Some(Kind::Text) => {}
        Some(Kind::Interpolator) => interpolator::bind(id),
        Some(Kind::Attribute) => attribute::bind(id),
        Some(Kind::Element) => element::bind(id),
        Some(Kind::Section) => control_flow::bind(id),
        Some(Kind::Alias) => alias::bind(id),
        Some(Kind::Transition) => transition::bind(id),
        None => {}
    }
}

pub fn unbind(id: ItemId) {
    if !flags(id).contains(ItemFlags::BOUND) {
        return;
    }
    set_flag(id, ItemFlags::UNBINDING, true);
    match kind_of(id) {
        Some(Kind::Text) => {}
        Some(Kind::Interpolator) | Some(Kind::Attribute) | Some(Kind::Transition) => {
            unbind_all_slots(id)
        }
        Some(Kind::Element) => element::unbind(id),
        Some(Kind::Section) => control_flow::unbind(id),
        Some(Kind::Alias) => alias::unbind(id),
        None => {}
    }
    with_item(id, |slot| {
        slot.flags
            .remove(ItemFlags::BOUND | ItemFlags::UNBINDING | ItemFlags::DIRTY)
    });
}

/// Render into `parent`, before `anchor` (append when `None`).
pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    if flags(id).contains(ItemFlags::RENDERED) {
        return;
    }
    set_flag(id, ItemFlags::RENDERED, true);
    match kind_of(id) {
        Some(Kind::Text) => text::render(id, parent, anchor),
        Some(Kind::Interpolator) => interpolator::render(id, parent, anchor),
        Some(Kind::Element) => element::render(id, parent, anchor),
        Some(Kind::Section) => control_flow::render(id, parent, anchor),
        Some(Kind::Alias) => alias::render(id, parent, anchor),
        Some(Kind::Attribute) | Some(Kind::Transition) | None => {}
    }
}

/// Remove from the DOM. Only the outermost unrendered items (`should_destroy`)
/// detach their nodes; nested ones leave with their ancestor.
pub fn unrender(id: ItemId, should_destroy: bool) {
    if !flags(id).contains(ItemFlags::RENDERED) {
        return;
    }
    set_flag(id, ItemFlags::RENDERED, false);
    match kind_of(id) {
        Some(Kind::Text) => text::unrender(id, should_destroy),
        Some(Kind::Interpolator) => interpolator::unrender(id, should_destroy),
        Some(Kind::Element) => element::unrender(id, should_destroy),
        Some(Kind::Section) => control_flow::unrender(id, should_destroy),
        Some(Kind::Alias) => alias::unrender(id, should_destroy),
        Some(Kind::Attribute) | Some(Kind::Transition) | None => {}
    }
}

/// Free the item (and the items it owns). Unbinds first if needed.
pub fn destroy(id: ItemId) {
    unbind(id);
    match kind_of(id) {
        Some(Kind::Element) => element::destroy_children(id),
        Some(Kind::Section) => control_flow::destroy_fragments(id),
        Some(Kind::Alias) => alias::destroy_fragment(id),
        _ => {}
    }
    ITEMS.with(|items| items.borrow_mut().remove(id));
}

/// A node this item reads changed: queue an update.
pub fn handle_change(id: ItemId) {
    let queue = with_item(id, |slot| {
        let bound = slot.flags.contains(ItemFlags::BOUND)
            && !slot.flags.contains(ItemFlags::UNBINDING);
        let dirty = slot.flags.contains(ItemFlags::DIRTY);
        if bound && !dirty {
            slot.flags.insert(ItemFlags::DIRTY);
        }
        bound && !dirty
    })
    .unwrap_or(false);
    if queue {
        runloop::add_dirty_item(id);
    }
}

/// Bring the item up to date with the model (runloop phase 1).
pub fn update(id: ItemId) {
    let was_dirty = with_item(id, |slot| {
        let dirty = slot.flags.contains(ItemFlags::DIRTY);
        slot.flags.remove(ItemFlags::DIRTY);
        dirty && slot.flags.contains(ItemFlags::BOUND)
    })
    .unwrap_or(false);
    if !was_dirty {
        return;
    }
    match kind_of(id) {
        Some(Kind::Interpolator) => interpolator::update(id),
        Some(Kind::Attribute) => attribute::update(id),
        Some(Kind::Section) => control_flow::update(id),
        _ => {}
    }
}

/// The node `previous` this item is bound to moved to `next`.
pub fn rebinding(id: ItemId, next: Option<NodeId>, previous: NodeId, _via_link: bool) {
    match kind_of(id) {
        Some(Kind::Alias) => alias::rebinding(id),
        Some(Kind::Interpolator)
        | Some(Kind::Attribute)
        | Some(Kind::Section)
        | Some(Kind::Transition) => {
            let slots = with_item(id, |slot| slot.binding_count()).unwrap_or(0);
            for slot in 0..slots {
                super::binding::rebind_slot(id, slot, next, previous);
            }
        }
        _ => {}
    }
}

/// The scope this item resolves in changed: resolve its references again,
/// then those of the items it owns.
pub fn rebound(id: ItemId) {
    match kind_of(id) {
        Some(Kind::Interpolator) | Some(Kind::Attribute) | Some(Kind::Transition) => {
            let slots = with_item(id, |slot| slot.binding_count()).unwrap_or(0);
            for slot in 0..slots {
                super::binding::rebound_slot(id, slot);
            }
        }
        Some(Kind::Section) => control_flow::rebound(id),
        Some(Kind::Element) => element::rebound(id),
        Some(Kind::Alias) => alias::rebound(id),
        Some(Kind::Text) | None => {}
    }
}

/// The array this item iterates was reordered.
pub fn shuffle(id: ItemId, new_indices: &[i64]) {
    if kind_of(id) == Some(Kind::Section) {
        control_flow::shuffle(id, new_indices);
    }
}

/// Top-level DOM nodes of the item, in document order.
pub fn nodes(id: ItemId) -> Vec<DomNodeId> {
    match kind_of(id) {
        Some(Kind::Text) | Some(Kind::Interpolator) | Some(Kind::Element) => {
            with_item(id, |slot| match &slot.kind {
                ItemKind::Text(t) => t.node,
                ItemKind::Interpolator(i) => i.node,
                ItemKind::Element(e) => e.node,
                _ => None,
            })
            .flatten()
            .into_iter()
            .collect()
        }
        Some(Kind::Section) => control_flow::nodes(id),
        Some(Kind::Alias) => alias::nodes(id),
        _ => Vec::new(),
    }
}

pub fn first_node(id: ItemId) -> Option<DomNodeId> {
    nodes(id).into_iter().next()
}

/// First element matching `selector` in this item's subtree.
pub fn find(id: ItemId, selector: &str) -> Option<DomNodeId> {
    let mut found = Vec::new();
    find_all(id, selector, &mut found);
    found.into_iter().next()
}

pub fn find_all(id: ItemId, selector: &str, out: &mut Vec<DomNodeId>) {
    match kind_of(id) {
        Some(Kind::Element) => element::find_all(id, selector, out),
        Some(Kind::Section) => control_flow::find_all(id, selector, out),
        Some(Kind::Alias) => alias::find_all(id, selector, out),
        _ => {}
    }
}

/// Text form of the item (used when a fragment is evaluated as a string).
pub fn to_string(id: ItemId) -> String {
    match kind_of(id) {
        Some(Kind::Text) => text::to_string(id),
        Some(Kind::Interpolator) => interpolator::to_string(id),
        Some(Kind::Element) => element::to_string(id),
        Some(Kind::Section) => control_flow::to_string(id),
        Some(Kind::Alias) => alias::to_string(id),
        _ => String::new(),
    }
}

fn unbind_all_slots(id: ItemId) {
    let slots = with_item(id, |slot| slot.binding_count()).unwrap_or(0);
    for slot in 0..slots {
        super::binding::unbind_slot(id, slot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Interpolator,
    Attribute,
    Element,
    Section,
    Alias,
    Transition,
}

fn kind_of(id: ItemId) -> Option<Kind> {
    with_item(id, |slot| match slot.kind {
        ItemKind::Text(_) => Kind::Text,
        ItemKind::Interpolator(_) => Kind::Interpolator,
        ItemKind::Attribute(_) => Kind::Attribute,
        ItemKind::Element(_) => Kind::Element,
        ItemKind::Section(_) => Kind::Section,
        ItemKind::Alias(_) => Kind::Alias,
        ItemKind::Transition(_) => Kind::Transition,
    })
}
