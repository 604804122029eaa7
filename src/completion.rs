//! Completion - a single-resolution deferred value.
//!
//! Transition effects finish at some arbitrary later point (when a CSS
//! transition ends, or when the effect decides it is done). A [`Completion`]
//! represents that moment: it resolves at most once, and callbacks attached
//! with [`Completion::then`] run exactly once, either at resolution or
//! immediately when attached to an already-resolved completion.
//!
//! # Example
//!
//! ```ignore
//! let done = Completion::new();
//! done.then(|| println!("finished"));
//! done.resolve(); // prints
//! done.resolve(); // no-op
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Default)]
struct CompletionInner {
    resolved: bool,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

/// Shared handle to a deferred completion. Clones observe the same state.
#[derive(Clone, Default)]
pub struct Completion {
    inner: Rc<RefCell<CompletionInner>>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Completion {
    /// A pending completion.
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-resolved completion.
    pub fn resolved() -> Self {
        let completion = Self::new();
        completion.inner.borrow_mut().resolved = true;
        completion
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.borrow().resolved
    }

    /// Resolve, running pending callbacks. Returns `false` if already resolved.
    pub fn resolve(&self) -> bool {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.resolved {
                return false;
            }
            inner.resolved = true;
            std::mem::take(&mut inner.callbacks)
        };

        for callback in callbacks {
            callback();
        }
        true
    }

    /// Run `callback` once this completion resolves.
    pub fn then(&self, callback: impl FnOnce() + 'static) {
        let resolved = self.inner.borrow().resolved;
        if resolved {
            callback();
        } else {
            self.inner.borrow_mut().callbacks.push(Box::new(callback));
        }
    }

    /// A completion that resolves once every completion in `all` has resolved.
    pub fn all(all: Vec<Completion>) -> Completion {
        let combined = Completion::new();
        let remaining = Rc::new(RefCell::new(all.len()));

        if all.is_empty() {
            combined.resolve();
            return combined;
        }

        for completion in all {
            let remaining = remaining.clone();
            let combined = combined.clone();
            completion.then(move || {
                let left = {
                    let mut remaining = remaining.borrow_mut();
                    *remaining -= 1;
                    *remaining
                };
                if left == 0 {
                    combined.resolve();
                }
            });
        }

        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_resolve_runs_callbacks_once() {
        let calls = Rc::new(Cell::new(0));
        let completion = Completion::new();

        let calls_clone = calls.clone();
        completion.then(move || calls_clone.set(calls_clone.get() + 1));

        assert!(completion.resolve());
        assert!(!completion.resolve());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_then_after_resolution_runs_immediately() {
        let completion = Completion::resolved();
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        completion.then(move || called_clone.set(true));
        assert!(called.get());
    }

    #[test]
    fn test_all() {
        let a = Completion::new();
        let b = Completion::new();
        let both = Completion::all(vec![a.clone(), b.clone()]);

        a.resolve();
        assert!(!both.is_resolved());
        b.resolve();
        assert!(both.is_resolved());

        assert!(Completion::all(Vec::new()).is_resolved());
    }
}
