//! Array mutation as a shuffle.
//!
//! `push`, `pop`, `shift`, `unshift` and `splice` do not simply overwrite the
//! array. They compute where every existing item ends up (`new_indices[old]`,
//! `-1` when removed), write the new array, then move everything bound to an
//! index node over to the node now holding the same item. List sections
//! reorder their iteration fragments instead of re-rendering them.

use super::{child, deps, existing_child, keypath, links, mark, peek, rebinding, write_value};
use super::{Dependant, NodeId};
use crate::engine::runloop;
use crate::error::{Result, ViewError};
use crate::types::Value;

/// An array mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOp {
    Push(Vec<Value>),
    Pop,
    Shift,
    Unshift(Vec<Value>),
    /// `start` may be negative (counted from the end); `remove: None` removes
    /// everything from `start`.
    Splice {
        start: i64,
        remove: Option<usize>,
        items: Vec<Value>,
    },
}

impl ArrayOp {
    /// Where each of `len` existing items ends up.
    pub fn new_indices(&self, len: usize) -> Vec<i64> {
        match self {
            ArrayOp::Push(_) => (0..len as i64).collect(),
            ArrayOp::Pop => (0..len as i64)
                .map(|i| if i + 1 == len as i64 { -1 } else { i })
                .collect(),
            ArrayOp::Shift => (0..len as i64).map(|i| i - 1).collect(),
            ArrayOp::Unshift(items) => (0..len as i64).map(|i| i + items.len() as i64).collect(),
            ArrayOp::Splice {
                start,
                remove,
                items,
            } => {
                let (start, removed) = splice_range(len, *start, *remove);
                let delta = items.len() as i64 - removed as i64;
                (0..len)
                    .map(|i| {
                        if i < start {
                            i as i64
                        } else if i < start + removed {
                            -1
                        } else {
                            i as i64 + delta
                        }
                    })
                    .collect()
            }
        }
    }

    /// Apply to `items`, returning the removed values.
    fn apply(self, items: &mut Vec<Value>) -> Vec<Value> {
        match self {
            ArrayOp::Push(new) => {
                items.extend(new);
                Vec::new()
            }
            ArrayOp::Pop => items.pop().into_iter().collect(),
            ArrayOp::Shift => {
                if items.is_empty() {
                    Vec::new()
                } else {
                    vec![items.remove(0)]
                }
            }
            ArrayOp::Unshift(new) => {
                items.splice(0..0, new);
                Vec::new()
            }
            ArrayOp::Splice {
                start,
                remove,
                items: new,
            } => {
                let (start, removed) = splice_range(items.len(), start, remove);
                items.splice(start..start + removed, new).collect()
            }
        }
    }
}

/// Clamp a splice request to `(start, remove_count)` within `len`.
fn splice_range(len: usize, start: i64, remove: Option<usize>) -> (usize, usize) {
    let start = if start < 0 {
        len.saturating_sub(start.unsigned_abs() as usize)
    } else {
        (start as usize).min(len)
    };
    let removed = remove.unwrap_or(len - start).min(len - start);
    (start, removed)
}

/// Run `op` against the array at `node`. Returns the removed values.
pub fn apply(node: NodeId, op: ArrayOp) -> Result<Vec<Value>> {
    let Value::Array(mut items) = peek(node) else {
        return Err(ViewError::NotAnArray(keypath(node)));
    };
    if super::is_readonly(node) {
        return Err(ViewError::ReadOnly(keypath(node)));
    }

    let new_indices = op.new_indices(items.len());
    let removed = op.apply(&mut items);

    runloop::start();
    write_value(node, Value::Array(items));
    shuffle(node, &new_indices);
    runloop::end();

    Ok(removed)
}

/// Move bindings of `node`'s index children according to `new_indices`, let
/// list dependants reorder, then mark the array dirty.
pub fn shuffle(node: NodeId, new_indices: &[i64]) {
    tracing::debug!(target: "spark_view::model", keypath = %keypath(node), ?new_indices, "shuffle");
    runloop::start();

    for (old, &new) in new_indices.iter().enumerate().rev() {
        if new == old as i64 {
            continue;
        }
        let Some(previous) = existing_child(node, &old.to_string()) else {
            continue;
        };
        let next = if new < 0 {
            None
        } else {
            child(node, &new.to_string())
        };
        rebinding(previous, next);
    }
    runloop::flush_shuffle_registers();

    for link in links(node) {
        for dependant in deps(link).iter().rev() {
            dependant.shuffle(new_indices);
        }
    }
    for dependant in deps(node).iter().rev() {
        dependant.shuffle(new_indices);
    }
    runloop::flush_shuffle_registers();

    mark(node);
    runloop::end();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dependant::{probe_log, reset_probe_log, ProbeEvent};
    use crate::model::{create_root, join, register, reset_model, DependantId};
    use serde_json::json;

    #[test]
    fn test_new_indices() {
        assert_eq!(ArrayOp::Push(vec![json!(1)]).new_indices(2), vec![0, 1]);
        assert_eq!(ArrayOp::Pop.new_indices(3), vec![0, 1, -1]);
        assert_eq!(ArrayOp::Shift.new_indices(3), vec![-1, 0, 1]);
        assert_eq!(ArrayOp::Unshift(vec![json!(0), json!(0)]).new_indices(2), vec![2, 3]);
        assert_eq!(
            ArrayOp::Splice {
                start: 1,
                remove: Some(1),
                items: vec![json!("x"), json!("y")],
            }
            .new_indices(4),
            vec![0, -1, 3, 4]
        );
        assert_eq!(
            ArrayOp::Splice {
                start: -1,
                remove: None,
                items: Vec::new(),
            }
            .new_indices(3),
            vec![0, 1, -1]
        );
    }

    #[test]
    fn test_apply_rejects_non_arrays() {
        reset_model();
        runloop::reset_runloop();
        let root = create_root(json!({ "a": 1 }));
        let a = join(root, "a").unwrap();
        assert_eq!(apply(a, ArrayOp::Pop), Err(ViewError::NotAnArray("a".into())));
    }

    #[test]
    fn test_unshift_rebinds_index_nodes() {
        reset_model();
        runloop::reset_runloop();
        let root = create_root(json!({ "list": ["a", "b"] }));
        let list = join(root, "list").unwrap();
        let first = join(root, "list.0").unwrap();
        register(first, DependantId::Probe(1));
        register(list, DependantId::Probe(2));

        reset_probe_log();
        let removed = apply(list, ArrayOp::Unshift(vec![json!("z")])).unwrap();
        assert!(removed.is_empty());

        let log = probe_log();
        assert!(matches!(
            log[0],
            ProbeEvent::Rebinding {
                probe: 1,
                next: Some(_),
                previous,
            } if previous == first
        ));
        assert!(log.contains(&ProbeEvent::Shuffle {
            probe: 2,
            new_indices: vec![1, 2],
        }));
        assert_eq!(peek(list), json!(["z", "a", "b"]));
    }
}
