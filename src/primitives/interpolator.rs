//! Interpolators - `{{reference}}` text nodes.

use super::binding::{self, RefBinding};
use super::item::{with_item, ItemId, ItemKind};
use crate::dom::{self, DomNodeId};
use crate::resolver::Reference;
use crate::types::value_to_string;

pub struct InterpolatorItem {
    pub binding: RefBinding,
    pub node: Option<DomNodeId>,
    /// Text last written to the node.
    pub last: String,
}

impl InterpolatorItem {
    pub fn new(reference: &Reference) -> Self {
        Self {
            binding: RefBinding::new(reference.clone()),
            node: None,
            last: String::new(),
        }
    }
}

fn interpolator<R>(id: ItemId, f: impl FnOnce(&mut InterpolatorItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Interpolator(i) => Some(f(i)),
        _ => None,
    })
    .flatten()
}

pub fn bind(id: ItemId) {
    binding::bind_slot(id, 0);
}

/// Current text (model read happens outside the item borrow).
fn current_text(id: ItemId) -> String {
    let binding = interpolator(id, |i| i.binding.clone());
    binding.map(|b| value_to_string(&b.value())).unwrap_or_default()
}

pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    let text = current_text(id);
    let node = dom::create_text(&text);
    dom::insert_before(parent, node, anchor);
    interpolator(id, |i| {
        i.node = Some(node);
        i.last = text;
    });
}

pub fn update(id: ItemId) {
    binding::refresh_members(id, 0);
    let text = current_text(id);
    let Some(node) = interpolator(id, |i| {
        if i.last == text {
            return None;
        }
        i.last = text.clone();
        i.node
    })
    .flatten() else {
        return;
    };
    dom::set_text(node, &text);
}

pub fn unrender(id: ItemId, should_destroy: bool) {
    let node = interpolator(id, |i| i.node.take()).flatten();
    if let (Some(node), true) = (node, should_destroy) {
        dom::destroy(node);
    }
}

pub fn to_string(id: ItemId) -> String {
    current_text(id)
}
