//! Sections - `{{#if}}`, `{{#unless}}`, `{{#each}}`, `{{#with}}` and the
//! untyped `{{#ref}}` form.
//!
//! A section renders an empty comment as its anchor and keeps its fragments
//! immediately before it. Whenever the bound value changes the fragment list
//! is reconciled against it:
//!
//! | value            | behaviour                                        |
//! |------------------|--------------------------------------------------|
//! | array (each)     | one iteration fragment per item                  |
//! | object (each)    | one iteration fragment per key                   |
//! | object (with)    | one fragment with the object as context          |
//! | anything (if)    | one fragment while truthy                        |
//!
//! Array mutations do not rebuild: [`shuffle`] moves existing fragments to
//! their new positions and creates fragments only for new items.

use std::rc::Rc;

use super::binding::{self, RefBinding};
use super::fragment::{self, FragmentId, NewFragment};
use super::item::{self, with_item, ItemId, ItemKind};
use crate::dom::{self, DomNodeId};
use crate::model::{self, NodeId};
use crate::resolver::Reference;
use crate::template::TemplateItem;
use crate::types::{is_truthy, ItemFlags, SectionKind, Value};

/// What a section currently renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionMode {
    Empty,
    Conditional,
    Context,
    ListArray,
    ListObject(Vec<String>),
}

pub struct SectionItem {
    /// `None` infers the behaviour from the value.
    pub kind: Option<SectionKind>,
    pub binding: RefBinding,
    pub index_ref: Option<String>,
    pub template: Rc<Vec<TemplateItem>>,
    pub fragments: Vec<FragmentId>,
    pub mode: SectionMode,
    pub anchor: Option<DomNodeId>,
}

impl SectionItem {
    pub fn new(
        kind: Option<SectionKind>,
        reference: &Reference,
        index_ref: Option<String>,
        template: Rc<Vec<TemplateItem>>,
    ) -> Self {
        Self {
            kind,
            binding: RefBinding::new(reference.clone()),
            index_ref,
            template,
            fragments: Vec::new(),
            mode: SectionMode::Empty,
            anchor: None,
        }
    }
}

fn section<R>(id: ItemId, f: impl FnOnce(&mut SectionItem) -> R) -> Option<R> {
    with_item(id, |slot| match &mut slot.kind {
        ItemKind::Section(s) => Some(f(s)),
        _ => None,
    })
    .flatten()
}

fn desired_mode(kind: Option<SectionKind>, value: &Value) -> SectionMode {
    let object_keys = |value: &Value| match value {
        Value::Object(map) => map.keys().map(|k| model::escape_key(k)).collect(),
        _ => Vec::new(),
    };
    match kind {
        Some(SectionKind::If) if is_truthy(value) => SectionMode::Conditional,
        Some(SectionKind::Unless) if !is_truthy(value) => SectionMode::Conditional,
        Some(SectionKind::If | SectionKind::Unless) => SectionMode::Empty,
        Some(SectionKind::Each) => match value {
            Value::Array(_) => SectionMode::ListArray,
            Value::Object(_) => SectionMode::ListObject(object_keys(value)),
            _ => SectionMode::Empty,
        },
        Some(SectionKind::With) => match value {
            Value::Object(map) if !map.is_empty() => SectionMode::Context,
            Value::Array(items) if !items.is_empty() => SectionMode::Context,
            _ => SectionMode::Empty,
        },
        None => match value {
            Value::Array(_) => SectionMode::ListArray,
            Value::Object(_) => SectionMode::Context,
            other if is_truthy(other) => SectionMode::Conditional,
            _ => SectionMode::Empty,
        },
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

pub fn bind(id: ItemId) {
    binding::bind_slot(id, 0);
    reconcile(id);
}

pub fn unbind(id: ItemId) {
    binding::unbind_slot(id, 0);
    for fragment in section(id, |s| s.fragments.clone()).unwrap_or_default() {
        fragment::unbind(fragment);
    }
}

pub(crate) fn destroy_fragments(id: ItemId) {
    let fragments = section(id, |s| std::mem::take(&mut s.fragments)).unwrap_or_default();
    for fragment in fragments {
        fragment::destroy(fragment);
    }
}

pub fn render(id: ItemId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    let own_anchor = dom::create_comment("");
    dom::insert_before(parent, own_anchor, anchor);
    let fragments = section(id, |s| {
        s.anchor = Some(own_anchor);
        s.fragments.clone()
    })
    .unwrap_or_default();
    for fragment in fragments {
        fragment::render(fragment, parent, Some(own_anchor));
    }
}

pub fn unrender(id: ItemId, should_destroy: bool) {
    let Some((fragments, anchor)) = section(id, |s| (s.fragments.clone(), s.anchor.take())) else {
        return;
    };
    for fragment in fragments {
        fragment::unrender(fragment, should_destroy);
    }
    if let (Some(anchor), true) = (anchor, should_destroy) {
        dom::destroy(anchor);
    }
}

pub fn update(id: ItemId) {
    if binding::refresh_members(id, 0) {
        rebuild(id);
    }
    reconcile(id);
}

/// Bound to another node now: drop every fragment so the next reconcile
/// starts from scratch.
fn rebuild(id: ItemId) {
    let fragments = section(id, |s| {
        s.mode = SectionMode::Empty;
        std::mem::take(&mut s.fragments)
    })
    .unwrap_or_default();
    for fragment in fragments {
        fragment::teardown(fragment);
    }
}

/// The enclosing scope changed. A section that now reads another node is
/// rebuilt by its queued update; otherwise its fragments re-resolve.
pub fn rebound(id: ItemId) {
    if binding::rebound_slot(id, 0) {
        rebuild(id);
        return;
    }
    for fragment in fragments(id) {
        fragment::rebound(fragment);
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

fn reconcile(id: ItemId) {
    let Some((kind, binding, mode, current)) =
        section(id, |s| (s.kind, s.binding.clone(), s.mode.clone(), s.fragments.len()))
    else {
        return;
    };
    let value = binding.value();
    let desired = desired_mode(kind, &value);

    let same_shape = match (&mode, &desired) {
        (SectionMode::ListObject(a), SectionMode::ListObject(b)) => a == b,
        (a, b) => a == b,
    };
    if !same_shape {
        remove_fragments(id, 0);
    }
    section(id, |s| s.mode = desired.clone());

    let existing = if same_shape { current } else { 0 };
    match desired {
        SectionMode::Empty => {}
        SectionMode::Conditional => {
            if existing == 0 {
                add_fragment(id, None, 0, None, false);
            }
        }
        SectionMode::Context => {
            if existing == 0 {
                add_fragment(id, binding.model, 0, None, false);
            } else if let Some(&fragment) = section(id, |s| s.fragments.clone()).unwrap_or_default().first() {
                fragment::set_context(fragment, binding.model);
            }
        }
        SectionMode::ListArray => {
            let len = match &value {
                Value::Array(items) => items.len(),
                _ => 0,
            };
            if existing > len {
                remove_fragments(id, len);
            }
            let Some(list) = binding.model else { return };
            for index in existing..len {
                let context = model::child(list, &index.to_string());
                add_fragment(id, context, index, None, true);
            }
        }
        SectionMode::ListObject(keys) => {
            if existing == 0 {
                let Some(object) = binding.model else { return };
                for (index, key) in keys.iter().enumerate() {
                    let context = model::child(object, key);
                    add_fragment(id, context, index, Some(key.clone()), true);
                }
            }
        }
    }
}

/// Tear down fragments from position `from` onwards.
fn remove_fragments(id: ItemId, from: usize) {
    let removed = section(id, |s| {
        if from >= s.fragments.len() {
            Vec::new()
        } else {
            s.fragments.split_off(from)
        }
    })
    .unwrap_or_default();
    for fragment in removed {
        fragment::teardown(fragment);
    }
}

fn new_fragment(
    id: ItemId,
    context: Option<NodeId>,
    index: usize,
    key: Option<String>,
    is_iteration: bool,
) -> Option<FragmentId> {
    let parent = item::parent_fragment(id)?;
    let (template, index_ref) = section(id, |s| (s.template.clone(), s.index_ref.clone()))?;
    let mut options = NewFragment::child(parent, id, template)?;
    options.context = context;
    options.is_iteration = is_iteration;
    options.index_ref = index_ref.filter(|_| is_iteration);
    options.index = index;
    options.key = key;

    let fragment = fragment::create(options);
    fragment::bind(fragment);
    Some(fragment)
}

/// Append a fragment, rendering it before the anchor when the section is live.
fn add_fragment(
    id: ItemId,
    context: Option<NodeId>,
    index: usize,
    key: Option<String>,
    is_iteration: bool,
) {
    let Some(fragment) = new_fragment(id, context, index, key, is_iteration) else {
        return;
    };
    let anchor = section(id, |s| {
        s.fragments.push(fragment);
        s.anchor
    })
    .flatten();

    if let Some(anchor) = anchor.filter(|_| item::flags(id).contains(ItemFlags::RENDERED)) {
        if let Some(parent) = dom::parent(anchor) {
            fragment::render(fragment, parent, Some(anchor));
        }
    }
}

// =============================================================================
// Shuffle
// =============================================================================

/// The iterated array was reordered: `new_indices[old]` is where each old
/// fragment goes, `-1` when its item was removed.
pub fn shuffle(id: ItemId, new_indices: &[i64]) {
    let Some((mode, list, old)) = section(id, |s| (s.mode.clone(), s.binding.model, s.fragments.clone())) else {
        return;
    };
    if mode != SectionMode::ListArray {
        return;
    }
    let Some(list) = list else { return };
    let len = match model::peek(list) {
        Value::Array(items) => items.len(),
        _ => 0,
    };

    let mut slots: Vec<Option<FragmentId>> = vec![None; len];
    let mut removed = Vec::new();
    for (old_index, &fragment) in old.iter().enumerate() {
        match new_indices.get(old_index).copied() {
            Some(new_index) if new_index >= 0 && (new_index as usize) < len => {
                slots[new_index as usize] = Some(fragment);
            }
            _ => removed.push(fragment),
        }
    }
    for fragment in removed {
        fragment::teardown(fragment);
    }

    let rendered = item::flags(id).contains(ItemFlags::RENDERED);
    let holder = rendered.then(dom::create_fragment);
    let mut fragments = Vec::with_capacity(len);
    for (index, slot) in slots.into_iter().enumerate() {
        let fragment = match slot {
            Some(fragment) => {
                fragment::set_index(fragment, index);
                if let Some(holder) = holder {
                    for node in fragment::nodes(fragment) {
                        dom::append_child(holder, node);
                    }
                }
                fragment
            }
            None => {
                let context = model::child(list, &index.to_string());
                let Some(fragment) = new_fragment(id, context, index, None, true) else {
                    continue;
                };
                if let Some(holder) = holder {
                    fragment::render(fragment, holder, None);
                }
                fragment
            }
        };
        fragments.push(fragment);
    }

    let anchor = section(id, |s| {
        s.fragments = fragments;
        s.anchor
    })
    .flatten();
    if let (Some(holder), Some(anchor)) = (holder, anchor) {
        if let Some(parent) = dom::parent(anchor) {
            dom::insert_before(parent, holder, Some(anchor));
        }
        dom::destroy(holder);
    }
}

// =============================================================================
// Queries
// =============================================================================

pub fn nodes(id: ItemId) -> Vec<DomNodeId> {
    let Some((fragments, anchor)) = section(id, |s| (s.fragments.clone(), s.anchor)) else {
        return Vec::new();
    };
    let mut nodes: Vec<DomNodeId> = fragments.into_iter().flat_map(fragment::nodes).collect();
    nodes.extend(anchor);
    nodes
}

pub fn find_all(id: ItemId, selector: &str, out: &mut Vec<DomNodeId>) {
    for fragment in section(id, |s| s.fragments.clone()).unwrap_or_default() {
        fragment::find_all(fragment, selector, out);
    }
}

pub fn to_string(id: ItemId) -> String {
    section(id, |s| s.fragments.clone())
        .unwrap_or_default()
        .into_iter()
        .map(fragment::to_string)
        .collect()
}

/// Fragments currently rendered by the section.
pub fn fragments(id: ItemId) -> Vec<FragmentId> {
    section(id, |s| s.fragments.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_desired_mode_inference() {
        assert_eq!(desired_mode(None, &json!([1])), SectionMode::ListArray);
        assert_eq!(desired_mode(None, &json!({ "a": 1 })), SectionMode::Context);
        assert_eq!(desired_mode(None, &json!(1)), SectionMode::Conditional);
        assert_eq!(desired_mode(None, &json!("")), SectionMode::Empty);
        assert_eq!(desired_mode(Some(SectionKind::Unless), &json!(false)), SectionMode::Conditional);
        assert_eq!(desired_mode(Some(SectionKind::With), &json!({})), SectionMode::Empty);
        assert_eq!(
            desired_mode(Some(SectionKind::Each), &json!({ "a": 1, "b": 2 })),
            SectionMode::ListObject(vec!["a".into(), "b".into()])
        );
    }
}
