//! Dependency capture.
//!
//! While a computation runs, every node read through [`super::get`] is
//! recorded in the innermost capture frame. Frames nest: a computed value read
//! from inside another computation captures into its own frame only.

use std::cell::RefCell;

use super::NodeId;

thread_local! {
    static FRAMES: RefCell<Vec<Vec<NodeId>>> = const { RefCell::new(Vec::new()) };
}

/// Open a new capture frame.
pub fn start_capturing() {
    FRAMES.with(|frames| frames.borrow_mut().push(Vec::new()));
}

/// Close the innermost frame and return what it captured, in read order.
pub fn stop_capturing() -> Vec<NodeId> {
    FRAMES.with(|frames| frames.borrow_mut().pop().unwrap_or_default())
}

pub fn is_capturing() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Record a read in the innermost frame (no-op when nothing is capturing).
pub fn capture(node: NodeId) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            if !frame.contains(&node) {
                frame.push(node);
            }
        }
    });
}

/// Run `f` inside a fresh frame, returning its result and the captured nodes.
pub fn capturing<R>(f: impl FnOnce() -> R) -> (R, Vec<NodeId>) {
    start_capturing();
    let result = f();
    let captured = stop_capturing();
    (result, captured)
}
