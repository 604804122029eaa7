//! View Engine - Arenas, runloop and transition scheduling.
//!
//! The engine manages the core scheduling structures:
//! - Arena: generational slot storage every engine object lives in
//! - Runloop: batches mutations and flushes them in ordered phases
//! - Transitions: per-batch manager for intros, outros and deferred detaches
//!
//! # Architecture
//!
//! Engine objects are NOT linked by references. They are handles into
//! thread-local arenas:
//!
//! ```text
//! model node #3v0 (list.0) ──deps──> [Item(#7v0), Fragment(#2v0)]
//! item #7v0 (interpolator)  ──model──> #3v0
//! ```
//!
//! This keeps cyclic graphs (parents, dependants, links) free of ownership
//! cycles, and a handle to a released object simply stops resolving.

pub mod arena;
pub mod runloop;
pub mod transitions;

pub use arena::{Arena, Id};
pub use runloop::{batch, batch_completion, schedule_task, schedule_task_keyed, TaskKey};
