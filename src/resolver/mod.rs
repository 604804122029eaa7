//! Resolver - from a reference to a model node.
//!
//! A plain reference `name.rest` is looked up, innermost scope first:
//! 1. aliases and index references of the enclosing fragments
//! 2. members of each enclosing context
//! 3. the root model
//!
//! A name found nowhere resolves to `root.name` when the reference sits
//! outside any nested context. Inside a nested context the lookup is ambiguous
//! (a later mutation may give a context that member), so the reference stays
//! pending and a [`pending`] resolver watches every scope of the chain.

pub mod pending;
pub mod reference;

use indexmap::IndexMap;

use crate::model::{self, escape_key, NodeId};
use crate::primitives::fragment::{self, FragmentId};
use crate::types::value_to_string;

pub use reference::{RefBase, Reference, Segment};

/// One fragment's contribution to name lookup, innermost first.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Context introduced by this fragment (`None` inherits the outer one).
    pub context: Option<NodeId>,
    pub aliases: IndexMap<String, NodeId>,
    pub index_ref: Option<String>,
    pub is_iteration: bool,
    /// The instance's root fragment (its context is the root model).
    pub is_root: bool,
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub node: NodeId,
    /// Nodes whose values supplied dynamic members.
    pub members: Vec<NodeId>,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(Resolved),
    /// Not resolvable yet; retry when any of `watch` changes.
    Pending { watch: Vec<NodeId> },
}

struct Lookup {
    scopes: Vec<Scope>,
    root: Option<NodeId>,
}

impl Lookup {
    fn new(fragment: FragmentId) -> Self {
        Self {
            scopes: fragment::scopes(fragment),
            root: fragment::root_model(fragment),
        }
    }

    /// Contexts from innermost outwards (the root context last).
    fn contexts(&self) -> Vec<NodeId> {
        let mut contexts: Vec<NodeId> = self.scopes.iter().filter_map(|s| s.context).collect();
        if let Some(root) = self.root {
            if contexts.last() != Some(&root) {
                contexts.push(root);
            }
        }
        contexts
    }

    fn nested_contexts(&self) -> Vec<NodeId> {
        self.scopes
            .iter()
            .filter(|s| !s.is_root)
            .filter_map(|s| s.context)
            .collect()
    }

    fn watch_list(&self) -> Vec<NodeId> {
        let mut watch = self.nested_contexts();
        watch.extend(self.root);
        watch
    }
}

/// Try to resolve `reference` within `fragment`.
pub fn try_resolve(reference: &Reference, fragment: FragmentId) -> Outcome {
    let lookup = Lookup::new(fragment);
    let pending = || Outcome::Pending {
        watch: lookup.watch_list(),
    };

    let Some(root) = lookup.root else {
        return Outcome::Pending { watch: Vec::new() };
    };

    let (base, skip) = match &reference.base {
        RefBase::Plain => match find_name(&lookup, reference.head().unwrap_or_default()) {
            Some(node) => (node, 1),
            None if lookup.nested_contexts().is_empty() => {
                match model::child(root, reference.head().unwrap_or_default()) {
                    Some(node) => (node, 1),
                    None => return pending(),
                }
            }
            None => return pending(),
        },
        RefBase::Context => (lookup.contexts().first().copied().unwrap_or(root), 0),
        RefBase::Ancestor(levels) => {
            let contexts = lookup.contexts();
            (contexts.get(*levels).copied().unwrap_or(root), 0)
        }
        RefBase::Root => (root, 0),
        RefBase::Index | RefBase::Key => {
            let iteration = lookup
                .scopes
                .iter()
                .find(|s| s.is_iteration)
                .and_then(|s| s.context)
                .and_then(model::key_model);
            match iteration {
                Some(node) => (node, 0),
                None => return pending(),
            }
        }
    };

    match descend(base, &reference.segments[skip..], fragment) {
        Some(resolved) => Outcome::Resolved(resolved),
        None => pending(),
    }
}

/// Resolve, falling back to the innermost context when the name is unknown.
pub fn resolve_or_fallback(reference: &Reference, fragment: FragmentId) -> Option<Resolved> {
    match try_resolve(reference, fragment) {
        Outcome::Resolved(resolved) => Some(resolved),
        Outcome::Pending { .. } => {
            let lookup = Lookup::new(fragment);
            let head = reference.head()?;
            let context = lookup.contexts().first().copied()?;
            let base = model::child(context, head)?;
            descend(base, &reference.segments[1..], fragment)
        }
    }
}

/// Look `name` up through aliases, index refs and contexts, then the root.
fn find_name(lookup: &Lookup, name: &str) -> Option<NodeId> {
    for scope in &lookup.scopes {
        if let Some(&node) = scope.aliases.get(name) {
            return Some(node);
        }
        if scope.is_iteration && scope.index_ref.as_deref() == Some(name) {
            if let Some(key) = scope.context.and_then(model::key_model) {
                return Some(key);
            }
        }
        if let Some(context) = scope.context.filter(|_| !scope.is_root) {
            if model::has_child_for(context, name) {
                return model::child(context, name);
            }
        }
    }

    let root = lookup.root?;
    if model::has_child_for(root, name) {
        return model::child(root, name);
    }
    None
}

fn descend(base: NodeId, segments: &[Segment], fragment: FragmentId) -> Option<Resolved> {
    let mut node = base;
    let mut members = Vec::new();
    for segment in segments {
        let key = match segment {
            Segment::Key(key) => key.clone(),
            Segment::Member(member) => {
                let Outcome::Resolved(resolved) = try_resolve(member, fragment) else {
                    return None;
                };
                members.extend(resolved.members);
                members.push(resolved.node);
                escape_key(&value_to_string(&model::get(resolved.node)))
            }
        };
        node = model::child(node, &key)?;
    }
    Some(Resolved { node, members })
}

/// Static keys a reference stands for, expanding a leading alias name into
/// the aliased reference.
pub fn expanded_keys(reference: &Reference, fragment: FragmentId) -> Option<Vec<String>> {
    let keys = reference.static_keys()?;
    if keys.len() == 1 {
        if let Some(aliased) = fragment::alias_reference(fragment, &keys[0]) {
            return aliased.static_keys();
        }
    }
    Some(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mount::{View, ViewOptions};
    use crate::template::Template;
    use serde_json::json;

    #[test]
    fn test_root_level_names_resolve_to_root() {
        crate::reset_all();
        let view = View::new(ViewOptions {
            template: Template::from_json(&json!(["x"])).unwrap(),
            data: json!({ "a": 1 }),
            ..Default::default()
        })
        .unwrap();
        let fragment = view.root_fragment().unwrap();

        let a = try_resolve(&Reference::parse("a").unwrap(), fragment);
        assert!(matches!(a, Outcome::Resolved(_)));

        // unknown names still bind to the root when there is no nested context
        let Outcome::Resolved(missing) = try_resolve(&Reference::parse("missing.x").unwrap(), fragment)
        else {
            panic!("expected resolution");
        };
        assert_eq!(model::keypath(missing.node), "missing.x");
    }

    #[test]
    fn test_dynamic_member_reports_member_nodes() {
        crate::reset_all();
        let view = View::new(ViewOptions {
            template: Template::from_json(&json!(["x"])).unwrap(),
            data: json!({ "list": ["a", "b"], "i": 1 }),
            ..Default::default()
        })
        .unwrap();

        let Outcome::Resolved(resolved) =
            try_resolve(&Reference::parse("list[i]").unwrap(), view.root_fragment().unwrap())
        else {
            panic!("expected resolution");
        };
        assert_eq!(model::get(resolved.node), json!("b"));
        assert_eq!(resolved.members.len(), 1);
    }
}
