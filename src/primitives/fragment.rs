//! Fragments - ordered lists of items sharing a scope.
//!
//! Every instance has a root fragment; sections, elements and alias blocks own
//! child fragments. A fragment may introduce a context (a section iteration or
//! `with` block), an index reference and aliases; together these make up the
//! [`Scope`] chain references resolve against.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::item::{self, ItemId};
use crate::dom::{self, DomNodeId};
use crate::engine::arena::{Arena, Id};
use crate::engine::runloop::{self, ShuffleRegister};
use crate::model::{self, DependantId, NodeId};
use crate::pipeline::mount::{self, View};
use crate::resolver::{Reference, Scope};
use crate::template::TemplateItem;
use crate::types::ItemFlags;

pub type FragmentId = Id<Fragment>;

/// An alias introduced by a fragment.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub node: NodeId,
    pub reference: Reference,
}

pub struct Fragment {
    pub view: View,
    /// Item owning the fragment (`None` for the root fragment).
    pub owner: Option<ItemId>,
    pub parent: Option<FragmentId>,
    pub context: Option<NodeId>,
    pub is_root: bool,
    pub is_iteration: bool,
    pub index_ref: Option<String>,
    pub index: usize,
    /// Object key of an iteration over an object.
    pub key: Option<String>,
    pub aliases: IndexMap<String, AliasEntry>,
    pub template: Rc<Vec<TemplateItem>>,
    pub items: Vec<ItemId>,
    pub flags: ItemFlags,
}

/// Options for [`create`].
pub struct NewFragment {
    pub view: View,
    pub owner: Option<ItemId>,
    pub parent: Option<FragmentId>,
    pub template: Rc<Vec<TemplateItem>>,
    pub context: Option<NodeId>,
    pub is_root: bool,
    pub is_iteration: bool,
    pub index_ref: Option<String>,
    pub index: usize,
    pub key: Option<String>,
}

impl NewFragment {
    /// A plain child fragment of `parent`.
    pub fn child(parent: FragmentId, owner: ItemId, template: Rc<Vec<TemplateItem>>) -> Option<Self> {
        let view = view(parent)?;
        Some(Self {
            view,
            owner: Some(owner),
            parent: Some(parent),
            template,
            context: None,
            is_root: false,
            is_iteration: false,
            index_ref: None,
            index: 0,
            key: None,
        })
    }
}

thread_local! {
    static FRAGMENTS: RefCell<Arena<Fragment>> = const { RefCell::new(Arena::new()) };
}

fn with_fragment<R>(id: FragmentId, f: impl FnOnce(&mut Fragment) -> R) -> Option<R> {
    FRAGMENTS.with(|fragments| fragments.borrow_mut().get_mut(id).map(f))
}

pub fn create(options: NewFragment) -> FragmentId {
    FRAGMENTS.with(|fragments| {
        fragments.borrow_mut().insert(Fragment {
            view: options.view,
            owner: options.owner,
            parent: options.parent,
            context: options.context,
            is_root: options.is_root,
            is_iteration: options.is_iteration,
            index_ref: options.index_ref,
            index: options.index,
            key: options.key,
            aliases: IndexMap::new(),
            template: options.template,
            items: Vec::new(),
            flags: ItemFlags::NONE,
        })
    })
}

pub fn exists(id: FragmentId) -> bool {
    FRAGMENTS.with(|fragments| fragments.borrow().contains(id))
}

pub fn view(id: FragmentId) -> Option<View> {
    with_fragment(id, |f| f.view)
}

pub fn context(id: FragmentId) -> Option<NodeId> {
    with_fragment(id, |f| f.context).flatten()
}

/// Point a `with` fragment at a new context.
pub fn set_context(id: FragmentId, context: Option<NodeId>) {
    with_fragment(id, |f| f.context = context);
}

pub fn index(id: FragmentId) -> usize {
    with_fragment(id, |f| f.index).unwrap_or(0)
}

pub fn set_index(id: FragmentId, index: usize) {
    with_fragment(id, |f| f.index = index);
}

pub fn set_aliases(id: FragmentId, aliases: IndexMap<String, AliasEntry>) {
    with_fragment(id, |f| f.aliases = aliases);
}

pub fn items(id: FragmentId) -> Vec<ItemId> {
    with_fragment(id, |f| f.items.clone()).unwrap_or_default()
}

pub fn is_rendered(id: FragmentId) -> bool {
    with_fragment(id, |f| f.flags.contains(ItemFlags::RENDERED)).unwrap_or(false)
}

pub fn fragment_count() -> usize {
    FRAGMENTS.with(|fragments| fragments.borrow().len())
}

/// Drop every fragment (for testing).
pub fn reset_fragments() {
    FRAGMENTS.with(|fragments| fragments.borrow_mut().clear());
}

// =============================================================================
// Scope Chain
// =============================================================================

/// Scopes from `id` outwards, innermost first.
pub fn scopes(id: FragmentId) -> Vec<Scope> {
    let mut scopes = Vec::new();
    let mut current = Some(id);
    while let Some(fragment) = current {
        let Some((scope, parent)) = with_fragment(fragment, |f| {
            let scope = Scope {
                context: f.context,
                aliases: f
                    .aliases
                    .iter()
                    .map(|(name, alias)| (name.clone(), alias.node))
                    .collect(),
                index_ref: f.index_ref.clone(),
                is_iteration: f.is_iteration,
                is_root: f.is_root,
            };
            (scope, f.parent)
        }) else {
            break;
        };
        scopes.push(scope);
        current = parent;
    }
    scopes
}

/// Root model of the instance `id` belongs to.
pub fn root_model(id: FragmentId) -> Option<NodeId> {
    view(id).and_then(mount::root_model)
}

/// The reference an alias named `name` stands for, nearest fragment first.
pub fn alias_reference(id: FragmentId, name: &str) -> Option<Reference> {
    let mut current = Some(id);
    while let Some(fragment) = current {
        let (found, parent) = with_fragment(fragment, |f| {
            (f.aliases.get(name).map(|a| a.reference.clone()), f.parent)
        })?;
        if found.is_some() {
            return found;
        }
        current = parent;
    }
    None
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Create and bind the fragment's items.
pub fn bind(id: FragmentId) {
    let Some((template, iteration_context)) = with_fragment(id, |f| {
        f.flags.insert(ItemFlags::BOUND);
        (f.template.clone(), f.context.filter(|_| f.is_iteration))
    }) else {
        return;
    };

    if let Some(context) = iteration_context {
        model::register(context, DependantId::Fragment(id));
    }

    let items: Vec<ItemId> = template.iter().map(|t| item::create(id, t, None)).collect();
    with_fragment(id, |f| f.items = items.clone());
    for item in items {
        item::bind(item);
    }
}

pub fn unbind(id: FragmentId) {
    let Some((items, iteration_context)) = with_fragment(id, |f| {
        let bound = f.flags.contains(ItemFlags::BOUND);
        f.flags.remove(ItemFlags::BOUND);
        bound.then(|| (f.items.clone(), f.context.filter(|_| f.is_iteration)))
    })
    .flatten() else {
        return;
    };
    for item in items {
        item::unbind(item);
    }
    if let Some(context) = iteration_context {
        model::unregister(context, DependantId::Fragment(id));
    }
}

/// Render every item into `parent` before `anchor`.
pub fn render(id: FragmentId, parent: DomNodeId, anchor: Option<DomNodeId>) {
    let Some(items) = with_fragment(id, |f| {
        f.flags.insert(ItemFlags::RENDERED);
        f.items.clone()
    }) else {
        return;
    };
    for item in items {
        item::render(item, parent, anchor);
    }
}

pub fn unrender(id: FragmentId, should_destroy: bool) {
    let Some(items) = with_fragment(id, |f| {
        let rendered = f.flags.contains(ItemFlags::RENDERED);
        f.flags.remove(ItemFlags::RENDERED);
        rendered.then(|| f.items.clone())
    })
    .flatten() else {
        return;
    };
    for item in items {
        item::unrender(item, should_destroy);
    }
}

/// Unbind and free the fragment with its items.
pub fn destroy(id: FragmentId) {
    unbind(id);
    let Some(fragment) = FRAGMENTS.with(|fragments| fragments.borrow_mut().remove(id)) else {
        return;
    };
    for item in fragment.items {
        item::destroy(item);
    }
}

/// Unrender (detaching top-level nodes), then destroy.
pub fn teardown(id: FragmentId) {
    unrender(id, true);
    destroy(id);
}

/// The context node of an iteration fragment moved (array shuffle).
pub fn rebinding(id: FragmentId, next: Option<NodeId>, previous: NodeId) {
    let follows = with_fragment(id, |f| f.is_iteration && f.context == Some(previous)).unwrap_or(false);
    if !follows {
        return;
    }
    let Some(next) = next else {
        // removed item: the section drops this fragment after the shuffle
        return;
    };
    model::unregister(previous, DependantId::Fragment(id));
    with_fragment(id, |f| f.context = Some(next));
    runloop::add_shuffle_register(ShuffleRegister::Dep {
        node: next,
        dependant: DependantId::Fragment(id),
        mark: false,
    });
}

/// Scope names changed (alias re-resolution): re-resolve every item.
pub fn rebound(id: FragmentId) {
    for item in items(id) {
        item::rebound(item);
    }
}

// =============================================================================
// DOM Queries
// =============================================================================

/// Top-level DOM nodes of the fragment, in document order.
pub fn nodes(id: FragmentId) -> Vec<DomNodeId> {
    items(id).into_iter().flat_map(item::nodes).collect()
}

pub fn first_node(id: FragmentId) -> Option<DomNodeId> {
    items(id).into_iter().find_map(item::first_node)
}

/// Move the fragment's nodes into a new document fragment.
pub fn detach(id: FragmentId) -> DomNodeId {
    let holder = dom::create_fragment();
    for node in nodes(id) {
        dom::append_child(holder, node);
    }
    holder
}

pub fn find(id: FragmentId, selector: &str) -> Option<DomNodeId> {
    items(id).into_iter().find_map(|item| item::find(item, selector))
}

pub fn find_all(id: FragmentId, selector: &str, out: &mut Vec<DomNodeId>) {
    for item in items(id) {
        item::find_all(item, selector, out);
    }
}

/// Concatenated text of the fragment's items.
pub fn to_string(id: FragmentId) -> String {
    items(id).into_iter().map(item::to_string).collect()
}
