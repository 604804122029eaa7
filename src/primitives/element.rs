//! Elements.
//!
//! An element owns its attributes, its transition directives and a child
//! fragment. Form controls whose `value` (or a checkbox's `checked`) is a
//! single reference are bound two ways: user input is written back into the
//! model, and on blur the control is reset to whatever the model holds (so
//! an observer that normalises the value wins).

use std::rc::Rc;

use super::attribute;
use super::fragment::{self, FragmentId, NewFragment};
use super::item::{self, with_item, ItemId, ItemKind};
use crate::dom::{self, DomEvent, DomNodeId, ListenerId};
use crate::engine::runloop;
use crate::model;
use crate::pipeline::mount;
use crate::state::visibility;
use crate::template::TemplateItem;
use crate::transition::{self, TransitionHandle};
use crate::types::{is_truthy, value_to_string, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundProperty {
    Value,
    Checked,
}

/// Two-way binding of a form control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoWay {
    /// Attribute holding the bound reference.
    pub attribute: ItemId,
    pub property: BoundProperty,
    /// `number` and `range` inputs write numbers.
    pub numeric: bool,
}

pub struct ElementItem {
    pub tag: String,
    pub attributes: Vec<ItemId>,
    pub fragment: Option<FragmentId>,
    pub intro: Option<ItemId>,
    pub outro: Option<ItemId>,
    pub node: Option<DomNodeId>,
    pub two_way: Option<TwoWay>,
    pub listeners: Vec<ListenerId>,
    pub running_intro: Option<TransitionHandle>,
}

impl ElementItem {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            fragment: None,
            intro: None,
            outro: None,
            node: None,
            two_way: None,
            listeners: Vec::new(),
            running_intro: None,
        }
    }
}

fn element<R>(id: ItemId, f: impl FnOnce(&mut ElementItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Element(e) => Some(f(e)),
        _ => None,
    })
    .flatten()
}

pub fn tag(id: ItemId) -> Option<String> {
    element(id, |e| e.tag.clone())
}

pub fn node(id: ItemId) -> Option<DomNodeId> {
    element(id, |e| e.node).flatten()
}

/// Build attribute, directive and child-fragment items of a new element.
pub(crate) fn create_children(
    id: ItemId,
    parent: FragmentId,
    directives: &[TemplateItem],
    children: Rc<Vec<TemplateItem>>,
) {
    let mut attributes = Vec::new();
    let mut intro = None;
    let mut outro = None;
    for directive in directives {
        let created = item::create(parent, directive, Some(id));
        match directive {
            TemplateItem::Transition { kind, .. } => {
                if kind.is_intro() {
                    intro = Some(created);
                }
                if kind.is_outro() {
                    outro = Some(created);
                }
            }
            _ => attributes.push(created),
        }
    }

    let fragment = if children.is_empty() {
        None
    } else {
        NewFragment::child(parent, id, children).map(fragment::create)
    };

    element(id, |e| {
        e.attributes = attributes;
        e.intro = intro;
        e.outro = outro;
        e.fragment = fragment;
    });
}

pub fn bind(id: ItemId) {
    let Some((attributes, intro, outro, fragment)) =
        element(id, |e| (e.attributes.clone(), e.intro, e.outro, e.fragment))
    else {
        return;
    };
    for &attr in &attributes {
        item::bind(attr);
    }
    for directive in [intro, outro].into_iter().flatten() {
        item::bind(directive);
    }
    if let Some(fragment) = fragment {
        fragment::bind(fragment);
    }
    setup_two_way(id, &attributes);
}

fn setup_two_way(id: ItemId, attributes: &[ItemId]) {
    let two_way_enabled = item::parent_fragment(id)
        .and_then(fragment::view)
        .map(|view| mount::config(view).two_way)
        .unwrap_or(false);
    let Some(tag) = tag(id) else { return };
    if !two_way_enabled || !matches!(tag.as_str(), "input" | "textarea" | "select") {
        return;
    }

    let find = |name: &str| {
        attributes
            .iter()
            .copied()
            .find(|&a| attribute::name(a).as_deref() == Some(name))
    };
    let input_type = find("type")
        .and_then(attribute::static_value)
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (property, attr) = match (tag.as_str(), input_type.as_str()) {
        ("input", "checkbox") => (BoundProperty::Checked, find("checked")),
        ("input", "radio") => return,
        _ => (BoundProperty::Value, find("value")),
    };
    let Some(attr) = attr else { return };
    let Some(model_node) = attribute::bound_model(attr) else {
        return;
    };

    // an uninitialised binding takes the control's empty state
    if model::peek(model_node).is_null() && !model::is_readonly(model_node) {
        let empty = match property {
            BoundProperty::Value => Value::String(String::new()),
            BoundProperty::Checked => Value::Bool(false),
        };
        runloop::batch(|| model::set(model_node, empty));
    }

    element(id, |e| {
        e.two_way = Some(TwoWay {
            attribute: attr,
            property,
            numeric: matches!(input_type.as_str(), "number" | "range"),
        });
    });
}

pub fn unbind(id: ItemId) {
    let Some((attributes, intro, outro, fragment, running)) = element(id, |e| {
        (
            e.attributes.clone(),
            e.intro,
            e.outro,
            e.fragment,
            e.running_intro.take(),
        )
    }) else {
        return;
    };
    if let Some(running) = running {
        if !running.is_complete() {
            running.complete(true);
        }
    }
    for attr in attributes {
        item::unbind(attr);
    }
    for directive in [intro, outro].into_iter().flatten() {
        item::unbind(directive);
    }
    if let Some(fragment) = fragment {
        fragment::unbind(fragment);
    }
}

pub fn rebound(id: ItemId) {
    let Some((attributes, intro, outro, fragment)) =
        element(id, |e| (e.attributes.clone(), e.intro, e.outro, e.fragment))
    else {
        return;
    };
    for item in attributes.into_iter().chain(intro).chain(outro) {
        item::rebound(item);
    }
    if let Some(fragment) = fragment {
        fragment::rebound(fragment);
    }
}

pub(crate) fn destroy_children(id: ItemId) {
    let Some((attributes, intro, outro, fragment)) =
        element(id, |e| (e.attributes.clone(), e.intro, e.outro, e.fragment))
    else {
        return;
    };
    for attr in attributes {
        item::destroy(attr);
    }
    if let Some(intro) = intro {
        item::destroy(intro);
    }
    if let Some(outro) = outro.filter(|&o| Some(o) != intro) {
        item::destroy(outro);
    }
    if let Some(fragment) = fragment {
        fragment::destroy(fragment);
    }
}

// =============================================================================
// Rendering
// =============================================================================

pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    let Some((tag, attributes, fragment, two_way, intro)) = element(id, |e| {
        (
            e.tag.clone(),
            e.attributes.clone(),
            e.fragment,
            e.two_way,
            e.intro,
        )
    }) else {
        return;
    };

    let node = dom::create_element(&tag);
    element(id, |e| e.node = Some(node));
    for attr in attributes {
        attribute::render(attr, node);
    }
    if let Some(fragment) = fragment {
        fragment::render(fragment, node, None);
    }
    dom::insert_before(parent, node, anchor);

    if let Some(two_way) = two_way {
        add_listeners(id, node, two_way);
    }

    if let Some(handle) = intro.and_then(|intro| transition::prepare(intro, node, true)) {
        runloop::register_transition(handle.clone());
        element(id, |e| e.running_intro = Some(handle));
    }
}

pub fn unrender(id: ItemId, should_destroy: bool) {
    let Some((node, attributes, fragment, listeners, outro)) = element(id, |e| {
        (
            e.node.take(),
            e.attributes.clone(),
            e.fragment,
            std::mem::take(&mut e.listeners),
            e.outro,
        )
    }) else {
        return;
    };
    let Some(node) = node else { return };

    for listener in listeners {
        dom::remove_event_listener(node, listener);
    }
    for attr in attributes {
        attribute::unrender(attr);
    }
    if let Some(fragment) = fragment {
        fragment::unrender(fragment, false);
    }

    if should_destroy {
        let outro = outro
            .filter(|_| visibility::is_visible())
            .and_then(|outro| transition::prepare(outro, node, false));
        let has_outro = outro.is_some();
        if let Some(handle) = outro {
            runloop::register_transition(handle);
        }
        runloop::detach_when_ready(node, has_outro);
    }
}

// =============================================================================
// Two-way Binding
// =============================================================================

fn add_listeners(id: ItemId, node: DomNodeId, two_way: TwoWay) {
    let lazy = item::parent_fragment(id)
        .and_then(fragment::view)
        .map(|view| mount::config(view).lazy)
        .unwrap_or(false);

    let mut kinds = vec!["change", "blur"];
    if !lazy {
        kinds.push("input");
    }
    let listeners: Vec<ListenerId> = kinds
        .into_iter()
        .map(|kind| {
            dom::add_event_listener(node, kind, move |event: &DomEvent| {
                handle_input(two_way, event.target, event.kind == "blur");
            })
        })
        .collect();
    element(id, |e| e.listeners = listeners);
}

fn handle_input(two_way: TwoWay, node: DomNodeId, blur: bool) {
    let Some(model_node) = attribute::bound_model(two_way.attribute) else {
        return;
    };

    let value = match two_way.property {
        BoundProperty::Checked => Value::Bool(dom::is_checked(node)),
        BoundProperty::Value => {
            let raw = dom::get_value(node);
            if two_way.numeric {
                parse_number(&raw)
            } else {
                Value::String(raw)
            }
        }
    };
    runloop::batch(|| model::set(model_node, value));

    if blur {
        let current = model::peek(model_node);
        match two_way.property {
            BoundProperty::Checked => dom::set_checked(node, is_truthy(&current)),
            BoundProperty::Value => dom::set_value(node, &value_to_string(&current)),
        }
    }
}

fn parse_number(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    match raw.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(number) => match number.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(f as i64),
            _ => Value::Number(number),
        },
        None => Value::String(raw.to_string()),
    }
}

// =============================================================================
// Queries
// =============================================================================

pub fn find_all(id: ItemId, selector: &str, out: &mut Vec<DomNodeId>) {
    let Some((node, fragment)) = element(id, |e| (e.node, e.fragment)) else {
        return;
    };
    if let Some(node) = node.filter(|&n| dom::matches(n, selector)) {
        out.push(node);
    }
    if let Some(fragment) = fragment {
        fragment::find_all(fragment, selector, out);
    }
}

pub fn to_string(id: ItemId) -> String {
    match element(id, |e| (e.node, e.fragment)) {
        Some((Some(node), _)) => dom::outer_html(node),
        Some((None, Some(fragment))) => fragment::to_string(fragment),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Value::from(42));
        assert_eq!(parse_number("1.5"), Value::from(1.5));
        assert_eq!(parse_number(""), Value::Null);
        assert_eq!(parse_number("abc"), Value::from("abc"));
    }
}
