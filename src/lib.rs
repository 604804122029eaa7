//! # spark-view
//!
//! Reactive view engine for Rust.
//!
//! Templates (in an intermediate JSON tree format) are bound to a keypath
//! addressed model and rendered into a DOM-like document. Mutations are
//! batched by a runloop that updates exactly the view items depending on what
//! changed, reorders list sections on array shuffles, and plays intro/outro
//! transitions once the flush ends.
//!
//! ## Architecture
//!
//! ```text
//! View ─> model graph ─> runloop ─> view items ─> dom
//!              ^                        │
//!              └──── two-way bindings ──┘
//! ```
//!
//! Engine objects live in thread-local generational arenas and refer to each
//! other by handle, so the cyclic dependency graph has no ownership cycles.
//!
//! ## Modules
//!
//! - [`model`] - Model nodes, dependants, links, computed values, shuffles
//! - [`resolver`] - Reference parsing and resolution against fragment scopes
//! - [`engine`] - Arenas, the runloop and transition managers
//! - [`primitives`] - View items (text, interpolator, element, attribute, section, alias)
//! - [`transition`] - Transition directives and handles
//! - [`dom`] - The in-memory document the engine renders into
//! - [`pipeline`] - View instances and observers

pub mod completion;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod log;
pub mod model;
pub mod pipeline;
pub mod plugins;
pub mod primitives;
pub mod resolver;
pub mod state;
pub mod template;
pub mod transition;
pub mod types;

pub use completion::Completion;
pub use config::ViewConfig;
pub use error::{Result, ViewError};
pub use pipeline::{ObserverHandle, View, ViewOptions};
pub use plugins::{register_transition, unregister_transition, TransitionEffect};
pub use template::Template;
pub use transition::TransitionHandle;
pub use types::{Map, Value};

/// Reset every thread-local engine structure (for testing).
#[doc(hidden)]
pub fn reset_all() {
    engine::runloop::reset_runloop();
    pipeline::observer::reset_observers();
    pipeline::mount::reset_instances();
    resolver::pending::reset_resolvers();
    primitives::item::reset_items();
    primitives::fragment::reset_fragments();
    model::reset_model();
    dom::reset_document();
    plugins::reset_plugins();
    log::reset_warnings();
    config::set_debug(true);
    state::visibility::set_visible(true);
}
