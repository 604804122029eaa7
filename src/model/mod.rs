//! Model graph - keypath-addressed reactive state.
//!
//! Every addressable piece of data is a [`ModelNode`] in a thread-local arena:
//! - `Root` owns the data value of a view
//! - `Key` is an object key or array index, read through its parent
//! - `KeyName` is a synthetic, read-only node exposing its parent's key
//! - `Computed` caches the result of a getter whose reads are captured
//! - `Link` proxies another node and sits in that node's `links` set
//!
//! Nodes are created lazily the first time a keypath segment is joined, and
//! are reclaimed at the end of a runloop flush once nothing depends on them.
//!
//! # Dependants
//!
//! Anything that reads a node registers itself as a [`DependantId`]. `deps`
//! keeps registration order and allows duplicates (several consumers may hold
//! the same registration), `links` is a set. When a node changes, the runloop
//! notifies its dependants; when array mutation moves data to another node,
//! [`rebinding`] hands every dependant the node now holding its data.

pub mod capture;
pub mod dependant;
pub mod keypath;
pub mod shuffle;

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};

use crate::engine::arena::{Arena, Id};
use crate::engine::runloop::{self, ShuffleRegister};
use crate::log;
use crate::types::{Getter, NodeFlags, Value};

pub use dependant::{Dependant, DependantId};
pub use keypath::{escape_key, join_keypath, split_keypath, unescape_key};

/// Handle to a model node.
pub type NodeId = Id<ModelNode>;

/// Hop limit when following links (guards link cycles).
const MAX_LINK_HOPS: usize = 64;

// =============================================================================
// Node Types
// =============================================================================

pub enum NodeKind {
    Root { value: Value },
    Key,
    KeyName,
    Computed {
        getter: Getter,
        cached: Option<Value>,
        sources: Vec<NodeId>,
    },
    Link { target: NodeId },
}

pub struct ModelNode {
    pub kind: NodeKind,
    /// Escaped key within the parent (empty for roots).
    pub key: String,
    pub parent: Option<NodeId>,
    pub children: IndexMap<String, NodeId>,
    pub key_node: Option<NodeId>,
    pub deps: Vec<DependantId>,
    pub links: IndexSet<NodeId>,
    pub refs: usize,
    pub flags: NodeFlags,
}

impl ModelNode {
    fn new(kind: NodeKind, key: String, parent: Option<NodeId>, flags: NodeFlags) -> Self {
        Self {
            kind,
            key,
            parent,
            children: IndexMap::new(),
            key_node: None,
            deps: Vec::new(),
            links: IndexSet::new(),
            refs: 0,
            flags,
        }
    }

    fn is_unused(&self) -> bool {
        self.deps.is_empty()
            && self.links.is_empty()
            && self.children.is_empty()
            && self.key_node.is_none()
            && self.refs == 0
    }
}

// =============================================================================
// Model State
// =============================================================================

struct ModelState {
    nodes: Arena<ModelNode>,
    /// Nodes that may have become unused since the last reclaim.
    candidates: Vec<NodeId>,
}

thread_local! {
    static MODEL: RefCell<ModelState> = const {
        RefCell::new(ModelState {
            nodes: Arena::new(),
            candidates: Vec::new(),
        })
    };
}

fn with_model<R>(f: impl FnOnce(&mut ModelState) -> R) -> R {
    MODEL.with(|model| f(&mut model.borrow_mut()))
}

// =============================================================================
// Creation & Navigation
// =============================================================================

/// Create a root node owning `value`.
pub fn create_root(value: Value) -> NodeId {
    with_model(|m| {
        m.nodes.insert(ModelNode::new(
            NodeKind::Root { value },
            String::new(),
            None,
            NodeFlags::NONE,
        ))
    })
}

pub fn exists(node: NodeId) -> bool {
    with_model(|m| m.nodes.contains(node))
}

/// Child node for an escaped `key`, created on first access.
///
/// Links delegate to their target, so `link.child(k)` is `target.child(k)`.
/// A fresh node is reclaimed at the end of the next flush unless something
/// registers on it or retains it with [`reference`].
pub fn child(parent: NodeId, key: &str) -> Option<NodeId> {
    let parent = follow_links(parent)?;
    with_model(|m| {
        let node = m.nodes.get(parent)?;
        if let Some(&existing) = node.children.get(key) {
            return Some(existing);
        }

        let id = m.nodes.insert(ModelNode::new(
            NodeKind::Key,
            key.to_string(),
            Some(parent),
            NodeFlags::KEY,
        ));
        if let Some(node) = m.nodes.get_mut(parent) {
            node.children.insert(key.to_string(), id);
        }
        m.candidates.push(id);
        Some(id)
    })
}

/// Child node for `key` if it has already been created.
pub fn existing_child(parent: NodeId, key: &str) -> Option<NodeId> {
    let parent = follow_links(parent)?;
    with_model(|m| m.nodes.get(parent)?.children.get(key).copied())
}

/// Descend along a keypath. The empty keypath is `node` itself.
pub fn join(node: NodeId, keypath: &str) -> Option<NodeId> {
    split_keypath(keypath)
        .iter()
        .try_fold(node, |current, key| child(current, key))
}

/// Synthetic read-only node exposing `node`'s key (or index).
pub fn key_model(node: NodeId) -> Option<NodeId> {
    with_model(|m| {
        let existing = m.nodes.get(node)?.key_node;
        if existing.is_some() {
            return existing;
        }

        let id = m.nodes.insert(ModelNode::new(
            NodeKind::KeyName,
            String::new(),
            Some(node),
            NodeFlags::READONLY | NodeFlags::KEY,
        ));
        if let Some(parent) = m.nodes.get_mut(node) {
            parent.key_node = Some(id);
        }
        m.candidates.push(id);
        Some(id)
    })
}

pub fn parent(node: NodeId) -> Option<NodeId> {
    with_model(|m| m.nodes.get(node).and_then(|n| n.parent))
}

/// Escaped key of `node` within its parent.
pub fn key(node: NodeId) -> Option<String> {
    with_model(|m| m.nodes.get(node).map(|n| n.key.clone()))
}

/// Whether `node` is a synthetic key node.
pub fn is_key_name(node: NodeId) -> bool {
    with_model(|m| matches!(m.nodes.get(node).map(|n| &n.kind), Some(NodeKind::KeyName)))
}

pub fn is_readonly(node: NodeId) -> bool {
    with_model(|m| {
        m.nodes
            .get(node)
            .is_some_and(|n| n.flags.contains(NodeFlags::READONLY))
    })
}

/// Full keypath from the root.
pub fn keypath(node: NodeId) -> String {
    with_model(|m| {
        let mut keys = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(n) = m.nodes.get(id) else { break };
            match n.kind {
                NodeKind::Root { .. } => break,
                NodeKind::KeyName => keys.push("@key".to_string()),
                _ => keys.push(n.key.clone()),
            }
            current = n.parent;
        }
        keys.reverse();
        join_keypath(&keys)
    })
}

/// Whether `node` has (or its value has) an entry for the escaped `key`.
pub fn has_child_for(node: NodeId, key: &str) -> bool {
    let Some(node) = follow_links(node) else { return false };
    let virtual_child = with_model(|m| {
        let child = m.nodes.get(node)?.children.get(key).copied()?;
        m.nodes
            .get(child)
            .map(|c| matches!(c.kind, NodeKind::Computed { .. } | NodeKind::Link { .. }))
    });
    if virtual_child == Some(true) {
        return true;
    }
    match peek(node) {
        Value::Object(map) => map.contains_key(&unescape_key(key)),
        Value::Array(items) => key
            .parse::<usize>()
            .is_ok_and(|index| index < items.len()),
        _ => false,
    }
}

fn follow_links(mut node: NodeId) -> Option<NodeId> {
    for _ in 0..MAX_LINK_HOPS {
        let target = with_model(|m| match m.nodes.get(node).map(|n| &n.kind) {
            None => Err(()),
            Some(NodeKind::Link { target }) => Ok(Some(*target)),
            Some(_) => Ok(None),
        });
        match target {
            Err(()) => return None,
            Ok(None) => return Some(node),
            Ok(Some(next)) => node = next,
        }
    }
    log::warn_once("Link cycle detected while following model links");
    None
}

// =============================================================================
// Reading
// =============================================================================

enum Base {
    Root(NodeId),
    Computed(NodeId),
    KeyOf(NodeId),
}

/// Find the node that owns the data for `node`, and the keys leading from it
/// (leaf first).
fn locate(m: &ModelState, node: NodeId) -> Option<(Base, Vec<String>)> {
    let mut path = Vec::new();
    let mut current = node;
    let mut hops = 0;
    loop {
        let n = m.nodes.get(current)?;
        match &n.kind {
            NodeKind::Root { .. } => return Some((Base::Root(current), path)),
            NodeKind::Computed { .. } => return Some((Base::Computed(current), path)),
            NodeKind::KeyName => {
                if path.is_empty() {
                    return Some((Base::KeyOf(n.parent?), path));
                }
                return None;
            }
            NodeKind::Link { target } => {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return None;
                }
                current = *target;
            }
            NodeKind::Key => {
                path.push(n.key.clone());
                current = n.parent?;
            }
        }
    }
}

fn walk(base: &Value, path: &[String]) -> Value {
    let mut current = base;
    for key in path.iter().rev() {
        current = match current {
            Value::Object(map) => match map.get(&unescape_key(key)) {
                Some(value) => value,
                None => return Value::Null,
            },
            Value::Array(items) if key == "length" => return Value::from(items.len()),
            Value::Array(items) => match key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(value) => value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// Current value of `node`, captured by the innermost capture frame.
///
/// A stale handle reads as `Null`.
pub fn get(node: NodeId) -> Value {
    if capture::is_capturing() && exists(node) {
        capture::capture(node);
    }
    peek(node)
}

/// Current value without capture.
pub fn peek(node: NodeId) -> Value {
    let Some((base, path)) = with_model(|m| locate(m, node)) else {
        return Value::Null;
    };

    match base {
        Base::Root(root) => with_model(|m| match m.nodes.get(root).map(|n| &n.kind) {
            Some(NodeKind::Root { value }) => walk(value, &path),
            _ => Value::Null,
        }),
        Base::Computed(computed) => {
            evaluate(computed);
            with_model(|m| match m.nodes.get(computed).map(|n| &n.kind) {
                Some(NodeKind::Computed {
                    cached: Some(value),
                    ..
                }) => walk(value, &path),
                _ => Value::Null,
            })
        }
        Base::KeyOf(owner) => key_value(owner),
    }
}

/// Value exposed by a key node: the unescaped key, or the index for array items.
fn key_value(owner: NodeId) -> Value {
    let Some((key, container)) =
        with_model(|m| m.nodes.get(owner).map(|n| (n.key.clone(), n.parent)))
    else {
        return Value::Null;
    };

    let in_array = container.is_some_and(|c| matches!(peek(c), Value::Array(_)));
    if in_array {
        if let Ok(index) = key.parse::<u64>() {
            return Value::from(index);
        }
    }
    Value::String(unescape_key(&key))
}

// =============================================================================
// Computed Nodes
// =============================================================================

/// Create a computed node at `parent.key`.
pub fn create_computed(parent: NodeId, key: &str, getter: Getter) -> Option<NodeId> {
    let id = with_model(|m| {
        m.nodes.get(parent)?;
        let id = m.nodes.insert(ModelNode::new(
            NodeKind::Computed {
                getter,
                cached: None,
                sources: Vec::new(),
            },
            key.to_string(),
            Some(parent),
            NodeFlags::READONLY,
        ));
        let replaced = m
            .nodes
            .get_mut(parent)
            .and_then(|p| p.children.insert(key.to_string(), id));
        Some((id, replaced))
    });

    let (id, replaced) = id?;
    runloop::start();
    if let Some(old) = replaced {
        rebinding(old, Some(id));
        runloop::flush_shuffle_registers();
        with_model(|m| m.candidates.push(old));
    }
    mark(id);
    runloop::end();
    Some(id)
}

fn evaluate(node: NodeId) {
    let getter = with_model(|m| {
        let n = m.nodes.get_mut(node)?;
        let evaluating = n.flags.contains(NodeFlags::EVALUATING);
        match &n.kind {
            NodeKind::Computed { cached: Some(_), .. } => None,
            NodeKind::Computed { getter, .. } if !evaluating => {
                let getter = getter.clone();
                n.flags.insert(NodeFlags::EVALUATING);
                Some(Ok(getter))
            }
            NodeKind::Computed { .. } => Some(Err(())),
            _ => None,
        }
    });

    let getter = match getter {
        None => return,
        Some(Err(())) => {
            log::warn_once(&format!(
                "Cyclic computation detected at '{}'",
                keypath(node)
            ));
            return;
        }
        Some(Ok(getter)) => getter,
    };

    let (value, captured) = capture::capturing(|| getter());
    let captured: Vec<NodeId> = captured.into_iter().filter(|&n| n != node).collect();

    let previous = with_model(|m| {
        let n = m.nodes.get_mut(node)?;
        n.flags.remove(NodeFlags::EVALUATING);
        match &mut n.kind {
            NodeKind::Computed { cached, sources, .. } => {
                *cached = Some(value);
                Some(std::mem::replace(sources, captured.clone()))
            }
            _ => None,
        }
    });
    let Some(previous) = previous else { return };

    for source in previous.iter().filter(|s| !captured.contains(s)) {
        unregister(*source, DependantId::Computation(node));
    }
    for source in captured.iter().filter(|s| !previous.contains(s)) {
        register(*source, DependantId::Computation(node));
    }
    tracing::trace!(target: "spark_view::model", node = ?node, sources = captured.len(), "computed");
}

/// Drop a computed node's cached value and mark it (and what reads it) dirty.
pub fn invalidate(node: NodeId) {
    let invalidated = with_model(|m| match m.nodes.get_mut(node).map(|n| &mut n.kind) {
        Some(NodeKind::Computed { cached, .. }) => {
            *cached = None;
            true
        }
        _ => false,
    });
    if invalidated {
        mark_down(node);
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Write `value` at `node`.
///
/// Missing intermediate objects are created and arrays are padded. Writes to
/// read-only nodes are ignored, and a write that does not change the value is
/// a no-op. Changed nodes (with their descendants, ancestors and links) are
/// marked dirty inside a runloop batch.
pub fn set(node: NodeId, value: Value) {
    let Some(target) = follow_links(node) else { return };
    if is_readonly(target) || write_path_of(target).is_none() {
        log::warn_once_if_debug(&format!(
            "Cannot write to read-only keypath '{}'",
            keypath(target)
        ));
        return;
    }

    runloop::start();
    if write_value(target, value) {
        tracing::debug!(target: "spark_view::model", keypath = %keypath(target), "set");
        mark(target);
    }
    runloop::end();
}

/// Root and escaped keys (root first) for a writable node.
fn write_path_of(node: NodeId) -> Option<(NodeId, Vec<String>)> {
    with_model(|m| match locate(m, node)? {
        (Base::Root(root), mut path) => {
            path.reverse();
            Some((root, path))
        }
        _ => None,
    })
}

/// Write without marking anything. Returns whether the value changed.
pub(crate) fn write_value(node: NodeId, value: Value) -> bool {
    let Some((root, path)) = write_path_of(node) else {
        return false;
    };
    with_model(|m| match m.nodes.get_mut(root).map(|n| &mut n.kind) {
        Some(NodeKind::Root { value: data }) => write_path(data, &path, value),
        _ => false,
    })
}

fn is_index(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Step into `key` of `container`, turning non-containers into one.
fn branch<'a>(container: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    if !matches!(container, Value::Object(_) | Value::Array(_)) {
        *container = if is_index(key) {
            Value::Array(Vec::new())
        } else {
            Value::Object(Default::default())
        };
    }

    match container {
        Value::Object(map) => Some(map.entry(unescape_key(key)).or_insert(Value::Null)),
        Value::Array(items) => {
            let index = key.parse::<usize>().ok()?;
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        _ => None,
    }
}

fn write_path(data: &mut Value, path: &[String], value: Value) -> bool {
    let Some((last, init)) = path.split_last() else {
        if *data == value {
            return false;
        }
        *data = value;
        return true;
    };

    let mut current = data;
    for key in init {
        match branch(current, key) {
            Some(next) => current = next,
            None => return false,
        }
    }

    let unchanged = match &*current {
        Value::Object(map) => map.get(&unescape_key(last)).unwrap_or(&Value::Null) == &value,
        Value::Array(items) => last
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .unwrap_or(&Value::Null)
            == &value,
        _ => false,
    };
    if unchanged {
        return false;
    }

    match branch(current, last) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

// =============================================================================
// Marking
// =============================================================================

/// Mark `node`, its descendants, its ancestors and every link onto them dirty.
///
/// A link onto `node` or a descendant is marked with its own subtree, since
/// bindings made through the link live below it. A link onto an ancestor
/// marks the subtree it holds at the same relative place: nodes bound under
/// a key before it became a link stay there.
pub fn mark(node: NodeId) {
    let mut down = descendants(node);
    let mut ancestors = Vec::new();
    let mut path = Vec::new();
    let mut current = node;
    while let Some(ancestor) = parent(current) {
        path.push(current);
        for link in links(ancestor) {
            if let Some(shadow) = shadow_of(link, &path) {
                down.extend(descendants(shadow));
            }
        }
        ancestors.push(ancestor);
        current = ancestor;
    }
    add_with_links(down, ancestors);
}

/// Node held directly under `link` along `path` (leaf first), without
/// following the link.
fn shadow_of(link: NodeId, path: &[NodeId]) -> Option<NodeId> {
    with_model(|m| {
        path.iter().rev().try_fold(link, |current, &step| {
            let step = m.nodes.get(step)?;
            let n = m.nodes.get(current)?;
            match step.kind {
                NodeKind::KeyName => n.key_node,
                _ => n.children.get(&step.key).copied(),
            }
        })
    })
}

/// Mark `node` and its descendants dirty (computed invalidation).
fn mark_down(node: NodeId) {
    add_with_links(descendants(node), Vec::new());
}

fn add_with_links(down: Vec<NodeId>, up: Vec<NodeId>) {
    let links_of = |nodes: &[NodeId]| -> Vec<NodeId> {
        with_model(|m| {
            nodes
                .iter()
                .filter_map(|&n| m.nodes.get(n))
                .flat_map(|n| n.links.iter().copied())
                .collect()
        })
    };
    let down_links: Vec<NodeId> = links_of(&down).into_iter().flat_map(descendants).collect();
    let up_links = links_of(&up);
    for node in down.into_iter().chain(up).chain(down_links).chain(up_links) {
        runloop::add_dirty_node(node);
    }
}

fn descendants(node: NodeId) -> Vec<NodeId> {
    with_model(|m| {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(n) = m.nodes.get(current) else { continue };
            out.push(current);
            stack.extend(n.key_node);
            stack.extend(n.children.values().rev().copied());
        }
        out
    })
}

/// Notify every dependant of `node` that its value changed (runloop phase 1).
pub fn notify(node: NodeId) {
    for dependant in deps(node).iter().rev() {
        dependant.handle_change();
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Add a dependant. Duplicates are kept.
pub fn register(node: NodeId, dependant: DependantId) {
    with_model(|m| {
        if let Some(n) = m.nodes.get_mut(node) {
            n.deps.push(dependant);
        }
    });
}

/// Remove the first matching registration. Absent dependants are ignored.
pub fn unregister(node: NodeId, dependant: DependantId) {
    with_model(|m| {
        let Some(n) = m.nodes.get_mut(node) else { return };
        if let Some(position) = n.deps.iter().position(|&d| d == dependant) {
            n.deps.remove(position);
            if n.is_unused() {
                m.candidates.push(node);
            }
        }
    });
}

/// Snapshot of the dependants of `node`, in registration order.
pub fn deps(node: NodeId) -> Vec<DependantId> {
    with_model(|m| m.nodes.get(node).map(|n| n.deps.clone()).unwrap_or_default())
}

pub fn register_link(node: NodeId, link: NodeId) {
    with_model(|m| {
        if let Some(n) = m.nodes.get_mut(node) {
            n.links.insert(link);
        }
    });
}

pub fn unregister_link(node: NodeId, link: NodeId) {
    with_model(|m| {
        let Some(n) = m.nodes.get_mut(node) else { return };
        if n.links.shift_remove(&link) && n.is_unused() {
            m.candidates.push(node);
        }
    });
}

pub fn links(node: NodeId) -> Vec<NodeId> {
    with_model(|m| {
        m.nodes
            .get(node)
            .map(|n| n.links.iter().copied().collect())
            .unwrap_or_default()
    })
}

/// Retain `node` (no-op for key nodes).
pub fn reference(node: NodeId) {
    with_model(|m| {
        if let Some(n) = m.nodes.get_mut(node) {
            if !matches!(n.kind, NodeKind::KeyName) {
                n.refs += 1;
            }
        }
    });
}

/// Release a retention taken with [`reference`] (no-op for key nodes).
pub fn unreference(node: NodeId) {
    with_model(|m| {
        let Some(n) = m.nodes.get_mut(node) else { return };
        if matches!(n.kind, NodeKind::KeyName) {
            return;
        }
        n.refs = n.refs.saturating_sub(1);
        if n.is_unused() {
            m.candidates.push(node);
        }
    });
}

pub fn ref_count(node: NodeId) -> usize {
    with_model(|m| m.nodes.get(node).map_or(0, |n| n.refs))
}

// =============================================================================
// Rebinding
// =============================================================================

/// Tell everything bound to `node` that its data now lives at `next`.
///
/// Dependants, then links, are notified in reverse registration order over a
/// snapshot; children and the key node follow recursively.
pub fn rebinding(node: NodeId, next: Option<NodeId>) {
    rebind_tree(node, next, false);
}

fn rebind_tree(node: NodeId, next: Option<NodeId>, via_link: bool) {
    let Some((deps, links, children, key_node)) = with_model(|m| {
        m.nodes.get(node).map(|n| {
            (
                n.deps.clone(),
                n.links.iter().copied().collect::<Vec<_>>(),
                n.children.clone(),
                n.key_node,
            )
        })
    }) else {
        return;
    };

    for dependant in deps.iter().rev() {
        dependant.rebinding(next, node, via_link);
    }
    for &link in links.iter().rev() {
        relink(link, node, next);
    }

    for (key, child_node) in children {
        let next_child = next.and_then(|n| child(n, &key));
        rebind_tree(child_node, next_child, via_link);
    }
    if let Some(key_node) = key_node {
        let next_key = next.and_then(key_model);
        rebind_tree(key_node, next_key, via_link);
    }
}

/// Point a link at the node that now holds its target's data.
fn relink(link: NodeId, previous: NodeId, next: Option<NodeId>) {
    let Some(next) = next else { return };
    unregister_link(previous, link);
    with_model(|m| {
        if let Some(NodeKind::Link { target }) = m.nodes.get_mut(link).map(|n| &mut n.kind) {
            *target = next;
        }
    });
    runloop::add_shuffle_register(ShuffleRegister::Link { node: next, link });
}

// =============================================================================
// Links
// =============================================================================

/// Make `parent.key` a proxy for `target`.
pub fn create_link(parent: NodeId, key: &str, target: NodeId) -> Option<NodeId> {
    let target = follow_links(target)?;
    let existing = with_model(|m| m.nodes.get(parent).map(|p| p.children.get(key).copied()))?;

    let link = match existing {
        Some(node) => {
            let previous = with_model(|m| {
                let n = m.nodes.get_mut(node)?;
                match std::mem::replace(&mut n.kind, NodeKind::Link { target }) {
                    NodeKind::Link { target: previous } => Some(previous),
                    _ => None,
                }
            });
            if let Some(previous) = previous {
                unregister_link(previous, node);
            }
            node
        }
        None => with_model(|m| {
            let id = m.nodes.insert(ModelNode::new(
                NodeKind::Link { target },
                key.to_string(),
                Some(parent),
                NodeFlags::NONE,
            ));
            if let Some(p) = m.nodes.get_mut(parent) {
                p.children.insert(key.to_string(), id);
            }
            id
        }),
    };

    register_link(target, link);
    runloop::start();
    mark(link);
    runloop::end();
    Some(link)
}

/// Turn a link back into a plain key node.
pub fn remove_link(link: NodeId) {
    let target = with_model(|m| {
        let n = m.nodes.get_mut(link)?;
        match std::mem::replace(&mut n.kind, NodeKind::Key) {
            NodeKind::Link { target } => Some(target),
            other => {
                n.kind = other;
                None
            }
        }
    });
    let Some(target) = target else { return };

    unregister_link(target, link);
    runloop::start();
    mark(link);
    runloop::end();
}

pub fn is_link(node: NodeId) -> bool {
    with_model(|m| matches!(m.nodes.get(node).map(|n| &n.kind), Some(NodeKind::Link { .. })))
}

// =============================================================================
// Reclamation
// =============================================================================

/// Free unused key nodes (end of a runloop flush).
pub fn reclaim() {
    let freed = with_model(|m| {
        let mut freed = 0;
        while let Some(candidate) = m.candidates.pop() {
            let Some(n) = m.nodes.get(candidate) else { continue };
            if !matches!(n.kind, NodeKind::Key | NodeKind::KeyName) || !n.is_unused() {
                continue;
            }

            let is_key_name = matches!(n.kind, NodeKind::KeyName);
            let key = n.key.clone();
            let parent = n.parent;
            m.nodes.remove(candidate);
            freed += 1;

            let Some(parent) = parent else { continue };
            if let Some(p) = m.nodes.get_mut(parent) {
                if is_key_name {
                    p.key_node = None;
                } else if p.children.get(&key) == Some(&candidate) {
                    p.children.shift_remove(&key);
                }
                if p.is_unused() {
                    m.candidates.push(parent);
                }
            }
        }
        freed
    });
    if freed > 0 {
        tracing::trace!(target: "spark_view::model", freed, "reclaimed nodes");
    }
}

/// Free a root and everything below it (view teardown).
pub fn destroy_tree(root: NodeId) {
    let nodes = descendants(root);
    with_model(|m| {
        for node in nodes {
            let target = match m.nodes.get(node).map(|n| &n.kind) {
                Some(NodeKind::Link { target }) => Some(*target),
                _ => None,
            };
            if let Some(n) = target.and_then(|t| m.nodes.get_mut(t)) {
                n.links.shift_remove(&node);
            }
            m.nodes.remove(node);
        }
    });
}

/// Number of live nodes.
pub fn node_count() -> usize {
    with_model(|m| m.nodes.len())
}

/// Drop every node (for testing).
pub fn reset_model() {
    with_model(|m| {
        m.nodes.clear();
        m.candidates.clear();
    });
}

#[cfg(test)]
mod tests {
    use super::dependant::{probe_log, reset_probe_log, ProbeEvent};
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::rc::Rc;

    fn setup(value: Value) -> NodeId {
        reset_model();
        runloop::reset_runloop();
        create_root(value)
    }

    #[test]
    fn test_lazy_children_and_values() {
        let root = setup(json!({ "a": { "b": [10, 20] } }));
        let b1 = join(root, "a.b.1").unwrap();

        assert_eq!(get(b1), json!(20));
        assert_eq!(keypath(b1), "a.b.1");
        assert_eq!(join(root, "a.b.1"), Some(b1));
        assert_eq!(get(join(root, "a.b.length").unwrap()), json!(2));
        assert_eq!(get(join(root, "missing.deep").unwrap()), Value::Null);
    }

    #[test]
    fn test_escaped_keys() {
        let root = setup(json!({ "a.b": 1 }));
        let node = child(root, &escape_key("a.b")).unwrap();
        assert_eq!(get(node), json!(1));
        assert_eq!(get(key_model(node).unwrap()), json!("a.b"));
    }

    #[test]
    fn test_set_creates_branches() {
        let root = setup(Value::Null);
        set(join(root, "a.list.2").unwrap(), json!("x"));
        assert_eq!(peek(root), json!({ "a": { "list": [null, null, "x"] } }));
    }

    #[test]
    fn test_key_nodes_are_readonly() {
        let root = setup(json!({ "list": ["a", "b"] }));
        let item = join(root, "list.1").unwrap();
        let key = key_model(item).unwrap();

        assert_eq!(get(key), json!(1));
        set(key, json!(5));
        assert_eq!(get(key), json!(1));

        reference(key);
        assert_eq!(ref_count(key), 0);
    }

    #[test]
    fn test_unchanged_write_is_noop() {
        let root = setup(json!({ "a": 1 }));
        let a = child(root, "a").unwrap();
        assert!(!write_value(a, json!(1)));
        assert!(write_value(a, json!(2)));
    }

    #[test]
    fn test_computed_tracks_sources() {
        let root = setup(json!({ "a": 2, "b": 3 }));
        let a = child(root, "a").unwrap();
        let b = child(root, "b").unwrap();
        // the getter holds the handles across flushes
        reference(a);
        reference(b);
        let getter: Getter = Rc::new(move || {
            let sum = get(a).as_i64().unwrap_or(0) + get(b).as_i64().unwrap_or(0);
            json!(sum)
        });
        let total = create_computed(root, "total", getter).unwrap();

        assert_eq!(get(total), json!(5));
        assert_eq!(deps(a), vec![DependantId::Computation(total)]);

        write_value(a, json!(10));
        invalidate(total);
        assert_eq!(get(total), json!(13));
        assert!(is_readonly(total));
    }

    #[test]
    fn test_unretained_children_are_reclaimed_by_a_flush() {
        let root = setup(json!({ "a": 1 }));
        let kept = child(root, "a").unwrap();
        reference(kept);
        let loose = child(root, "b").unwrap();

        runloop::batch(|| {});
        assert!(exists(kept));
        assert!(!exists(loose));
        assert_eq!(get(kept), json!(1));
    }

    #[test]
    fn test_links_proxy_reads_and_writes() {
        let root = setup(json!({ "source": { "x": 1 } }));
        let source = child(root, "source").unwrap();
        let link = create_link(root, "alias", source).unwrap();

        assert_eq!(get(join(root, "alias.x").unwrap()), json!(1));
        set(join(root, "alias.x").unwrap(), json!(2));
        assert_eq!(peek(root)["source"]["x"], json!(2));
        assert_eq!(links(source), vec![link]);

        remove_link(link);
        assert!(links(source).is_empty());
        assert!(!is_link(link));
    }

    #[test]
    fn test_link_over_bound_key_keeps_notifying() {
        let root = setup(json!({ "user": { "name": "x" } }));
        let bound = join(root, "alias.name").unwrap();
        register(bound, DependantId::Probe(1));

        let user = child(root, "user").unwrap();
        create_link(root, "alias", user).unwrap();
        assert_eq!(get(bound), json!("x"));

        reset_probe_log();
        set(join(root, "user.name").unwrap(), json!("y"));
        assert_eq!(get(bound), json!("y"));
        assert!(probe_log().contains(&ProbeEvent::Change(1)));
    }

    #[test]
    fn test_reclaim_frees_unused_nodes() {
        let root = setup(json!({ "a": { "b": 1 } }));
        let count = node_count();
        let b = join(root, "a.b").unwrap();
        register(b, DependantId::Probe(1));
        reclaim();
        assert_eq!(node_count(), count + 2);

        unregister(b, DependantId::Probe(1));
        reclaim();
        assert_eq!(node_count(), count);
        assert!(!exists(b));
        assert_eq!(peek(b), Value::Null);
    }

    #[test]
    fn test_register_then_unregister_absent_is_silent() {
        let root = setup(json!({}));
        unregister(root, DependantId::Probe(9));
        unregister_link(root, root);
        assert!(deps(root).is_empty());
    }

    proptest! {
        #[test]
        fn prop_register_unregister_leaves_no_trace(
            ids in proptest::collection::vec(0u32..6, 0..20),
            removals in proptest::collection::vec(0u32..6, 0..20),
        ) {
            let root = setup(json!({}));
            for &id in &ids {
                register(root, DependantId::Probe(id));
            }
            for &id in &ids {
                unregister(root, DependantId::Probe(id));
            }
            prop_assert!(deps(root).is_empty());

            // removing what was never registered changes nothing
            for &id in &ids {
                register(root, DependantId::Probe(id));
            }
            let before = deps(root);
            for &id in removals.iter().filter(|id| !ids.contains(id)) {
                unregister(root, DependantId::Probe(id));
            }
            prop_assert_eq!(deps(root), before);
        }

        #[test]
        fn prop_rebinding_runs_in_reverse_registration_order(
            ids in proptest::collection::vec(0u32..100, 1..12),
        ) {
            let root = setup(json!({ "a": 1, "b": 2 }));
            let a = child(root, "a").unwrap();
            let b = child(root, "b").unwrap();
            for &id in &ids {
                register(a, DependantId::Probe(id));
            }

            reset_probe_log();
            rebinding(a, Some(b));

            let seen: Vec<u32> = probe_log()
                .into_iter()
                .filter_map(|event| match event {
                    ProbeEvent::Rebinding { probe, next, previous } => {
                        assert_eq!(next, Some(b));
                        assert_eq!(previous, a);
                        Some(probe)
                    }
                    _ => None,
                })
                .collect();
            let expected: Vec<u32> = ids.iter().rev().copied().collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
