//! Configuration.
//!
//! Per-instance options live in [`ViewConfig`]; engine-wide switches are
//! thread-local, like the rest of the engine state.

use std::cell::Cell;

use serde::Deserialize;

/// Options for a [`crate::View`].
///
/// Deserializable from JSON so hosts can pass options through unchanged:
///
/// ```ignore
/// let config: ViewConfig = serde_json::from_value(json!({ "lazy": true }))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewConfig {
    /// Form controls write back into the model.
    pub two_way: bool,
    /// Only `change`/`blur` update the model (no per-keystroke `input` updates).
    pub lazy: bool,
    /// Intro/outro effects play. When off, elements attach and detach instantly.
    pub transitions_enabled: bool,
    /// Debug-only warnings (missing plugins, options-less `animate_style`).
    /// Applied engine-wide when a view is created.
    pub debug: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            two_way: true,
            lazy: false,
            transitions_enabled: true,
            debug: true,
        }
    }
}

thread_local! {
    static DEBUG: Cell<bool> = const { Cell::new(true) };
}

/// Whether debug-only warnings are emitted.
pub fn is_debug() -> bool {
    DEBUG.with(|debug| debug.get())
}

/// Enable or disable debug-only warnings.
pub fn set_debug(enabled: bool) {
    DEBUG.with(|debug| debug.set(enabled));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert!(config.two_way);
        assert!(!config.lazy);
        assert!(config.transitions_enabled);
        assert!(config.debug);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ViewConfig =
            serde_json::from_value(json!({ "lazy": true, "transitionsEnabled": false })).unwrap();
        assert!(config.lazy);
        assert!(!config.transitions_enabled);
        assert!(config.two_way);
    }

    #[test]
    fn test_debug_switch() {
        set_debug(false);
        assert!(!is_debug());
        set_debug(true);
        assert!(is_debug());
    }
}
