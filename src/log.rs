//! Logging helpers on top of `tracing`.
//!
//! Soft configuration issues are reported once per distinct message so that a
//! template rendering a missing effect in a loop does not flood the log.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::config;

thread_local! {
    /// Messages already reported by [`warn_once`].
    static WARNED: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Emit a warning the first time `message` is seen on this thread.
///
/// Returns `true` if the warning was emitted.
pub fn warn_once(message: &str) -> bool {
    let first = WARNED.with(|warned| warned.borrow_mut().insert(message.to_string()));
    if first {
        tracing::warn!(target: "spark_view", "{message}");
    }
    first
}

/// [`warn_once`], but only when debug warnings are enabled.
pub fn warn_once_if_debug(message: &str) -> bool {
    if !config::is_debug() {
        return false;
    }
    warn_once(message)
}

/// Message for a plugin that was referenced but never registered.
pub fn missing_plugin(name: &str, kind: &str) -> String {
    format!("Missing \"{name}\" {kind} plugin. You may need to register it before use")
}

/// Forget reported warnings (for testing).
pub fn reset_warnings() {
    WARNED.with(|warned| warned.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_deduplicates() {
        reset_warnings();
        assert!(warn_once("first"));
        assert!(!warn_once("first"));
        assert!(warn_once("second"));
    }

    #[test]
    fn test_missing_plugin_message() {
        let message = missing_plugin("fade", "transition");
        assert!(message.contains("\"fade\" transition"));
    }
}
