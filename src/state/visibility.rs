//! Page visibility.
//!
//! A hidden page never delivers CSS `transitionend` events, so transitions
//! short-circuit to their final state while hidden. The flag is a signal so
//! hosts can react to visibility changes the same way they react to any other
//! reactive state.
//!
//! # Example
//!
//! ```ignore
//! use spark_view::state::visibility;
//!
//! visibility::set_visible(false); // tab moved to background
//! assert!(!visibility::is_visible());
//! ```

use spark_signals::{signal, Signal};

thread_local! {
    static VISIBLE: Signal<bool> = signal(true);
}

/// Whether the page is currently visible.
pub fn is_visible() -> bool {
    VISIBLE.with(|s| s.get())
}

/// Update page visibility (hosts call this from their visibility change hook).
pub fn set_visible(visible: bool) {
    VISIBLE.with(|s| {
        if s.get() != visible {
            s.set(visible);
        }
    });
}

/// The underlying signal, for reactive consumers.
pub fn visibility_signal() -> Signal<bool> {
    VISIBLE.with(|s| s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_toggle() {
        assert!(is_visible());

        set_visible(false);
        assert!(!is_visible());
        assert!(!visibility_signal().get());

        set_visible(true);
        assert!(is_visible());
    }
}
