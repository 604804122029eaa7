//! Attributes of elements.
//!
//! An attribute value is a list of parts, static text and references. The
//! rendered string is written as an attribute, except for the live properties
//! of form controls: `value` on inputs, textareas and selects, and `checked`.

use super::binding::{self, RefBinding};
use super::element;
use super::item::{with_item, ItemId, ItemKind};
use crate::dom::{self, DomNodeId};
use crate::model::NodeId;
use crate::template::AttributePart;
use crate::types::{is_truthy, value_to_string, Value};

pub struct AttributeItem {
    pub name: String,
    pub parts: Vec<AttributePart>,
    /// One binding per reference part, in order.
    pub bindings: Vec<RefBinding>,
    pub element: Option<ItemId>,
    pub node: Option<DomNodeId>,
    /// Last string written as an attribute.
    pub last: Option<String>,
}

impl AttributeItem {
    pub fn new(name: &str, parts: &[AttributePart], element: Option<ItemId>) -> Self {
        let bindings = parts
            .iter()
            .filter_map(|part| match part {
                AttributePart::Ref(reference) => Some(RefBinding::new(reference.clone())),
                AttributePart::Text(_) => None,
            })
            .collect();
        Self {
            name: name.to_string(),
            parts: parts.to_vec(),
            bindings,
            element,
            node: None,
            last: None,
        }
    }

    /// Value is exactly one reference.
    fn is_single_ref(&self) -> bool {
        matches!(self.parts.as_slice(), [AttributePart::Ref(_)])
    }
}

fn attribute<R>(id: ItemId, f: impl FnOnce(&mut AttributeItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Attribute(a) => Some(f(a)),
        _ => None,
    })
    .flatten()
}

pub fn name(id: ItemId) -> Option<String> {
    attribute(id, |a| a.name.clone())
}

/// Static text of an attribute without references (`type="checkbox"`).
pub fn static_value(id: ItemId) -> Option<String> {
    attribute(id, |a| {
        a.bindings.is_empty().then(|| {
            a.parts
                .iter()
                .map(|part| match part {
                    AttributePart::Text(text) => text.as_str(),
                    AttributePart::Ref(_) => "",
                })
                .collect::<String>()
        })
    })
    .flatten()
}

/// Node a single-reference attribute is bound to (two-way binding target).
pub fn bound_model(id: ItemId) -> Option<NodeId> {
    attribute(id, |a| if a.is_single_ref() { a.bindings[0].model } else { None }).flatten()
}

pub fn bind(id: ItemId) {
    let slots = attribute(id, |a| a.bindings.len()).unwrap_or(0);
    for slot in 0..slots {
        binding::bind_slot(id, slot);
    }
}

/// Write the initial value onto the freshly created element `node`.
pub fn render(id: ItemId, node: DomNodeId) {
    attribute(id, |a| {
        a.node = Some(node);
        a.last = None;
    });
    write(id);
}

pub fn update(id: ItemId) {
    let slots = attribute(id, |a| a.bindings.len()).unwrap_or(0);
    for slot in 0..slots {
        binding::refresh_members(id, slot);
    }
    write(id);
}

pub fn unrender(id: ItemId) {
    attribute(id, |a| {
        a.node = None;
        a.last = None;
    });
}

enum Target {
    Value,
    Checked,
    Attribute,
}

fn write(id: ItemId) {
    let Some((name, parts, bindings, node, element, single)) = attribute(id, |a| {
        (
            a.name.clone(),
            a.parts.clone(),
            a.bindings.clone(),
            a.node,
            a.element,
            a.is_single_ref(),
        )
    }) else {
        return;
    };
    let Some(node) = node else { return };

    let values: Vec<Value> = bindings.iter().map(RefBinding::value).collect();
    let mut refs = values.iter();
    let rendered: String = parts
        .iter()
        .map(|part| match part {
            AttributePart::Text(text) => text.clone(),
            AttributePart::Ref(_) => refs.next().map(value_to_string).unwrap_or_default(),
        })
        .collect();

    let tag = element.and_then(element::tag).unwrap_or_default();
    let target = match name.as_str() {
        "checked" => Target::Checked,
        "value" if matches!(tag.as_str(), "input" | "textarea" | "select") => Target::Value,
        _ => Target::Attribute,
    };

    match target {
        Target::Checked => {
            let on = if single {
                is_truthy(&values[0])
            } else {
                !rendered.is_empty()
            };
            dom::set_checked(node, on);
        }
        Target::Value => dom::set_value(node, &rendered),
        Target::Attribute => {
            let changed = attribute(id, |a| {
                let changed = a.last.as_deref() != Some(rendered.as_str());
                a.last = Some(rendered.clone());
                changed
            })
            .unwrap_or(false);
            if changed {
                dom::set_attribute(node, &name, &rendered);
            }
        }
    }
}
