//! DOM host - an in-memory document the view engine renders into.
//!
//! The engine only needs a small DOM surface:
//! - Node creation (element, text, comment, document fragment)
//! - Tree mutation (`append_child`, `insert_before`, `remove`)
//! - Attributes, inline style and form-control properties
//! - Event listeners with synchronous dispatch
//! - Selector queries and HTML serialization
//!
//! Every write is recorded as a [`Mutation`] (a MutationObserver analogue), so
//! callers can check that an update touched exactly the nodes it had to.
//!
//! # Example
//!
//! ```ignore
//! use spark_view::dom;
//!
//! let body = dom::create_element("body");
//! let p = dom::create_element("p");
//! dom::append_child(body, p);
//! dom::append_child(p, dom::create_text("hello"));
//! assert_eq!(dom::inner_html(body), "<p>hello</p>");
//! ```

pub mod animate;
pub mod style;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::engine::arena::{Arena, Id};

pub use style::{computed_style, get_style, prefix, remove_style, reset_style, set_style};

// =============================================================================
// Node Types
// =============================================================================

/// Handle to a DOM node.
pub type DomNodeId = Id<DomNode>;

/// Element payload.
#[derive(Debug, Clone, Default)]
pub struct ElementData {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    /// Inline style, keyed by (possibly prefixed) camelCase property name.
    pub style: IndexMap<String, String>,
    /// Live `value` property of form controls.
    pub value: String,
    /// Live `checked` property of checkboxes and radios.
    pub checked: bool,
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Element(ElementData),
    Text(String),
    Comment(String),
    Fragment,
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub data: NodeData,
    pub parent: Option<DomNodeId>,
    pub children: Vec<DomNodeId>,
}

/// A dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub kind: String,
    pub target: DomNodeId,
}

/// Event handler (Rc so dispatch can run it without holding the document).
pub type EventHandler = Rc<dyn Fn(&DomEvent)>;

/// Listener registration handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A recorded DOM write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Children added or removed.
    ChildList { target: DomNodeId },
    /// Text node content changed.
    CharacterData { target: DomNodeId },
    /// Attribute written or removed.
    Attribute { target: DomNodeId, name: String },
    /// Inline style property written.
    Style { target: DomNodeId, property: String },
    /// Form-control property (`value`, `checked`) written.
    Property { target: DomNodeId, name: String },
}

impl Mutation {
    pub fn target(&self) -> DomNodeId {
        match self {
            Mutation::ChildList { target }
            | Mutation::CharacterData { target }
            | Mutation::Attribute { target, .. }
            | Mutation::Style { target, .. }
            | Mutation::Property { target, .. } => *target,
        }
    }
}

struct Listener {
    id: ListenerId,
    kind: String,
    handler: EventHandler,
}

// =============================================================================
// Document State
// =============================================================================

pub(crate) struct Document {
    pub(crate) nodes: Arena<DomNode>,
    listeners: HashMap<DomNodeId, Vec<Listener>>,
    next_listener: u64,
    records: Vec<Mutation>,
}

impl Document {
    fn new() -> Self {
        Self {
            nodes: Arena::new(),
            listeners: HashMap::new(),
            next_listener: 0,
            records: Vec::new(),
        }
    }

    pub(crate) fn element_mut(&mut self, node: DomNodeId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(node).map(|n| &mut n.data) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element(&self, node: DomNodeId) -> Option<&ElementData> {
        match self.nodes.get(node).map(|n| &n.data) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn record(&mut self, mutation: Mutation) {
        self.records.push(mutation);
    }

    fn detach(&mut self, node: DomNodeId) {
        let parent = self.nodes.get(node).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|&child| child != node);
            }
            if let Some(n) = self.nodes.get_mut(node) {
                n.parent = None;
            }
            self.record(Mutation::ChildList { target: parent });
        }
    }

    /// Nodes to move when inserting `node`: a fragment contributes its children.
    fn take_insertable(&mut self, node: DomNodeId) -> Vec<DomNodeId> {
        let is_fragment = matches!(self.nodes.get(node).map(|n| &n.data), Some(NodeData::Fragment));
        if !is_fragment {
            self.detach(node);
            return vec![node];
        }

        let children = self
            .nodes
            .get_mut(node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for &child in &children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = None;
            }
        }
        children
    }

    fn insert(&mut self, parent: DomNodeId, node: DomNodeId, anchor: Option<DomNodeId>) {
        if !self.nodes.contains(parent) {
            return;
        }
        let moving = self.take_insertable(node);
        if moving.is_empty() {
            return;
        }

        for &child in &moving {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parent = Some(parent);
            }
        }

        if let Some(p) = self.nodes.get_mut(parent) {
            let position = anchor
                .and_then(|anchor| p.children.iter().position(|&c| c == anchor))
                .unwrap_or(p.children.len());
            p.children.splice(position..position, moving);
        }
        self.record(Mutation::ChildList { target: parent });
    }

    fn destroy(&mut self, node: DomNodeId) {
        self.detach(node);
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.nodes.remove(current) {
                stack.extend(removed.children);
            }
            self.listeners.remove(&current);
        }
    }
}

thread_local! {
    static DOCUMENT: RefCell<Document> = RefCell::new(Document::new());
}

pub(crate) fn with_document<R>(f: impl FnOnce(&mut Document) -> R) -> R {
    DOCUMENT.with(|doc| f(&mut doc.borrow_mut()))
}

// =============================================================================
// Node Creation
// =============================================================================

fn create(data: NodeData) -> DomNodeId {
    with_document(|doc| {
        doc.nodes.insert(DomNode {
            data,
            parent: None,
            children: Vec::new(),
        })
    })
}

pub fn create_element(tag: &str) -> DomNodeId {
    create(NodeData::Element(ElementData {
        tag: tag.to_ascii_lowercase(),
        ..Default::default()
    }))
}

pub fn create_text(text: &str) -> DomNodeId {
    create(NodeData::Text(text.to_string()))
}

pub fn create_comment(text: &str) -> DomNodeId {
    create(NodeData::Comment(text.to_string()))
}

/// A document fragment. Inserting it moves its children and leaves it empty.
pub fn create_fragment() -> DomNodeId {
    create(NodeData::Fragment)
}

// =============================================================================
// Tree Mutation
// =============================================================================

pub fn append_child(parent: DomNodeId, child: DomNodeId) {
    with_document(|doc| doc.insert(parent, child, None));
}

/// Insert `child` before `anchor` (append when `anchor` is `None` or not a child).
pub fn insert_before(parent: DomNodeId, child: DomNodeId, anchor: Option<DomNodeId>) {
    with_document(|doc| doc.insert(parent, child, anchor));
}

/// Detach a node from its parent. The node stays alive.
pub fn remove(node: DomNodeId) {
    with_document(|doc| doc.detach(node));
}

/// Detach and free a node with its whole subtree and listeners.
pub fn destroy(node: DomNodeId) {
    with_document(|doc| doc.destroy(node));
}

// =============================================================================
// Traversal
// =============================================================================

pub fn exists(node: DomNodeId) -> bool {
    with_document(|doc| doc.nodes.contains(node))
}

pub fn parent(node: DomNodeId) -> Option<DomNodeId> {
    with_document(|doc| doc.nodes.get(node).and_then(|n| n.parent))
}

pub fn children(node: DomNodeId) -> Vec<DomNodeId> {
    with_document(|doc| doc.nodes.get(node).map(|n| n.children.clone()).unwrap_or_default())
}

pub fn tag_name(node: DomNodeId) -> Option<String> {
    with_document(|doc| doc.element(node).map(|e| e.tag.clone()))
}

pub fn is_text(node: DomNodeId) -> bool {
    with_document(|doc| matches!(doc.nodes.get(node).map(|n| &n.data), Some(NodeData::Text(_))))
}

/// Whether `node` is `ancestor` or sits somewhere below it.
pub fn contains(ancestor: DomNodeId, node: DomNodeId) -> bool {
    with_document(|doc| {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = doc.nodes.get(id).and_then(|n| n.parent);
        }
        false
    })
}

// =============================================================================
// Text, Attributes, Properties
// =============================================================================

/// Content of a text or comment node.
pub fn text(node: DomNodeId) -> Option<String> {
    with_document(|doc| match doc.nodes.get(node).map(|n| &n.data) {
        Some(NodeData::Text(text)) | Some(NodeData::Comment(text)) => Some(text.clone()),
        _ => None,
    })
}

pub fn set_text(node: DomNodeId, value: &str) {
    with_document(|doc| {
        if let Some(NodeData::Text(text)) = doc.nodes.get_mut(node).map(|n| &mut n.data) {
            *text = value.to_string();
            doc.record(Mutation::CharacterData { target: node });
        }
    });
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(node: DomNodeId) -> String {
    with_document(|doc| {
        let mut out = String::new();
        collect_text(doc, node, &mut out);
        out
    })
}

fn collect_text(doc: &Document, node: DomNodeId, out: &mut String) {
    let Some(n) = doc.nodes.get(node) else { return };
    match &n.data {
        NodeData::Text(text) => out.push_str(text),
        NodeData::Element(_) | NodeData::Fragment => {
            for &child in &n.children {
                collect_text(doc, child, out);
            }
        }
        NodeData::Comment(_) => {}
    }
}

/// Read an attribute. `style` reflects the current inline style.
pub fn get_attribute(node: DomNodeId, name: &str) -> Option<String> {
    with_document(|doc| {
        let element = doc.element(node)?;
        if name == "style" {
            if element.style.is_empty() {
                return None;
            }
            return Some(style::serialize_style(&element.style));
        }
        element.attributes.get(name).cloned()
    })
}

/// Write an attribute. `style` replaces the inline style.
pub fn set_attribute(node: DomNodeId, name: &str, value: &str) {
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        if name == "style" {
            element.style = style::parse_style(value);
        } else {
            element.attributes.insert(name.to_string(), value.to_string());
        }
        doc.record(Mutation::Attribute {
            target: node,
            name: name.to_string(),
        });
    });
}

pub fn remove_attribute(node: DomNodeId, name: &str) {
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        let removed = if name == "style" {
            let had = !element.style.is_empty();
            element.style.clear();
            had
        } else {
            element.attributes.shift_remove(name).is_some()
        };
        if removed {
            doc.record(Mutation::Attribute {
                target: node,
                name: name.to_string(),
            });
        }
    });
}

/// Live `value` property.
pub fn get_value(node: DomNodeId) -> String {
    with_document(|doc| doc.element(node).map(|e| e.value.clone()).unwrap_or_default())
}

/// Write the `value` property (what a user typing into the control does).
pub fn set_value(node: DomNodeId, value: &str) {
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        if element.value != value {
            element.value = value.to_string();
            doc.record(Mutation::Property {
                target: node,
                name: "value".to_string(),
            });
        }
    });
}

pub fn is_checked(node: DomNodeId) -> bool {
    with_document(|doc| doc.element(node).is_some_and(|e| e.checked))
}

pub fn set_checked(node: DomNodeId, checked: bool) {
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        if element.checked != checked {
            element.checked = checked;
            doc.record(Mutation::Property {
                target: node,
                name: "checked".to_string(),
            });
        }
    });
}

// =============================================================================
// Events
// =============================================================================

pub fn add_event_listener(
    node: DomNodeId,
    kind: &str,
    handler: impl Fn(&DomEvent) + 'static,
) -> ListenerId {
    with_document(|doc| {
        let id = ListenerId(doc.next_listener);
        doc.next_listener += 1;
        doc.listeners.entry(node).or_default().push(Listener {
            id,
            kind: kind.to_string(),
            handler: Rc::new(handler),
        });
        id
    })
}

pub fn remove_event_listener(node: DomNodeId, id: ListenerId) {
    with_document(|doc| {
        if let Some(list) = doc.listeners.get_mut(&node) {
            list.retain(|listener| listener.id != id);
            if list.is_empty() {
                doc.listeners.remove(&node);
            }
        }
    });
}

pub fn listener_count(node: DomNodeId) -> usize {
    with_document(|doc| doc.listeners.get(&node).map_or(0, |list| list.len()))
}

/// Dispatch an event to the listeners registered on `node`.
///
/// Handlers run after the document borrow is released, so they are free to
/// mutate the document.
pub fn fire(node: DomNodeId, kind: &str) {
    let handlers: Vec<EventHandler> = with_document(|doc| {
        doc.listeners
            .get(&node)
            .map(|list| {
                list.iter()
                    .filter(|listener| listener.kind == kind)
                    .map(|listener| listener.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    });

    let event = DomEvent {
        kind: kind.to_string(),
        target: node,
    };
    for handler in handlers {
        handler(&event);
    }
}

// =============================================================================
// Selectors
// =============================================================================

/// Match a simple selector: `tag`, `#id`, `.class`, `tag.class`, `tag#id`.
pub fn matches(node: DomNodeId, selector: &str) -> bool {
    with_document(|doc| doc.element(node).is_some_and(|e| element_matches(e, selector)))
}

fn element_matches(element: &ElementData, selector: &str) -> bool {
    let selector = selector.trim();
    if selector.is_empty() {
        return false;
    }

    let split = selector.find(['#', '.']).unwrap_or(selector.len());
    let (tag, rest) = selector.split_at(split);
    if !tag.is_empty() && tag != "*" && !tag.eq_ignore_ascii_case(&element.tag) {
        return false;
    }

    let mut rest = rest;
    while !rest.is_empty() {
        let marker = &rest[..1];
        let body = &rest[1..];
        let end = body.find(['#', '.']).unwrap_or(body.len());
        let name = &body[..end];
        let ok = match marker {
            "#" => element.attributes.get("id").is_some_and(|id| id == name),
            _ => element
                .attributes
                .get("class")
                .is_some_and(|class| class.split_whitespace().any(|c| c == name)),
        };
        if !ok {
            return false;
        }
        rest = &body[end..];
    }
    true
}

/// First descendant of `root` (excluding `root`) matching `selector`.
pub fn query_selector(root: DomNodeId, selector: &str) -> Option<DomNodeId> {
    query_selector_all(root, selector).into_iter().next()
}

/// All descendants of `root` matching `selector`, in document order.
pub fn query_selector_all(root: DomNodeId, selector: &str) -> Vec<DomNodeId> {
    with_document(|doc| {
        let mut found = Vec::new();
        let mut stack: Vec<DomNodeId> = doc
            .nodes
            .get(root)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            let Some(n) = doc.nodes.get(node) else { continue };
            if let NodeData::Element(element) = &n.data {
                if element_matches(element, selector) {
                    found.push(node);
                }
            }
            stack.extend(n.children.iter().rev().copied());
        }
        found
    })
}

// =============================================================================
// Serialization
// =============================================================================

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serialize the children of `node`. Comments are omitted.
pub fn inner_html(node: DomNodeId) -> String {
    with_document(|doc| {
        let mut out = String::new();
        if let Some(n) = doc.nodes.get(node) {
            for &child in &n.children {
                write_html(doc, child, &mut out);
            }
        }
        out
    })
}

/// Serialize `node` itself.
pub fn outer_html(node: DomNodeId) -> String {
    with_document(|doc| {
        let mut out = String::new();
        write_html(doc, node, &mut out);
        out
    })
}

fn write_html(doc: &Document, node: DomNodeId, out: &mut String) {
    let Some(n) = doc.nodes.get(node) else { return };
    match &n.data {
        NodeData::Text(text) => out.push_str(&escape_html(text)),
        NodeData::Comment(_) => {}
        NodeData::Fragment => {
            for &child in &n.children {
                write_html(doc, child, out);
            }
        }
        NodeData::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attributes {
                out.push_str(&format!(" {name}=\"{}\"", escape_html(value)));
            }
            if !element.style.is_empty() {
                out.push_str(&format!(
                    " style=\"{}\"",
                    escape_html(&style::serialize_style(&element.style))
                ));
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return;
            }
            for &child in &n.children {
                write_html(doc, child, out);
            }
            out.push_str(&format!("</{}>", element.tag));
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// =============================================================================
// Mutation Records
// =============================================================================

/// Drain the recorded mutations.
pub fn take_mutations() -> Vec<Mutation> {
    with_document(|doc| std::mem::take(&mut doc.records))
}

/// Number of live nodes (for leak checks in tests).
pub fn node_count() -> usize {
    with_document(|doc| doc.nodes.len())
}

/// Reset the document (for testing).
pub fn reset_document() {
    with_document(|doc| {
        doc.nodes.clear();
        doc.listeners.clear();
        doc.next_listener = 0;
        doc.records.clear();
    });
    style::reset_style_state();
    animate::reset_animations();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_build_and_serialize() {
        reset_document();

        let body = create_element("body");
        let p = create_element("p");
        set_attribute(p, "class", "greeting");
        append_child(body, p);
        append_child(p, create_text("a < b"));
        append_child(body, create_comment("anchor"));

        assert_eq!(inner_html(body), "<p class=\"greeting\">a &lt; b</p>");
    }

    #[test]
    fn test_insert_before_and_fragments() {
        reset_document();

        let list = create_element("ul");
        let anchor = create_comment("");
        append_child(list, anchor);

        let frag = create_fragment();
        let a = create_element("li");
        let b = create_element("li");
        append_child(frag, a);
        append_child(frag, b);
        insert_before(list, frag, Some(anchor));

        assert_eq!(children(list), vec![a, b, anchor]);
        assert!(children(frag).is_empty());
        assert_eq!(parent(a), Some(list));
    }

    #[test]
    fn test_events_and_listeners() {
        reset_document();

        let input = create_element("input");
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        let id = add_event_listener(input, "change", move |event| {
            assert_eq!(event.kind, "change");
            fired_clone.set(fired_clone.get() + 1);
        });

        fire(input, "change");
        fire(input, "blur");
        assert_eq!(fired.get(), 1);

        remove_event_listener(input, id);
        fire(input, "change");
        assert_eq!(fired.get(), 1);
        assert_eq!(listener_count(input), 0);
    }

    #[test]
    fn test_selectors() {
        reset_document();

        let root = create_element("div");
        let a = create_element("span");
        set_attribute(a, "class", "x y");
        let b = create_element("span");
        set_attribute(b, "id", "main");
        append_child(root, a);
        append_child(root, b);

        assert_eq!(query_selector(root, "span"), Some(a));
        assert_eq!(query_selector(root, ".y"), Some(a));
        assert_eq!(query_selector(root, "span#main"), Some(b));
        assert_eq!(query_selector_all(root, "span").len(), 2);
        assert_eq!(query_selector(root, "div"), None);
    }

    #[test]
    fn test_mutation_records() {
        reset_document();

        let text = create_text("a");
        take_mutations();
        set_text(text, "b");
        assert_eq!(take_mutations(), vec![Mutation::CharacterData { target: text }]);

        let input = create_element("input");
        set_value(input, "x");
        set_value(input, "x");
        assert_eq!(take_mutations().len(), 1);
    }

    #[test]
    fn test_destroy_frees_subtree() {
        reset_document();

        let root = create_element("div");
        let child = create_element("p");
        append_child(root, child);
        append_child(child, create_text("x"));
        assert_eq!(node_count(), 3);

        destroy(child);
        assert_eq!(node_count(), 1);
        assert!(children(root).is_empty());
        assert!(!exists(child));
    }
}
