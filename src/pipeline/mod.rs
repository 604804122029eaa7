//! Instance pipeline.
//!
//! ```text
//! View::set ─> model::set ─> runloop flush ─> items update ─> DOM
//!                                   └──> observers
//! ```
//!
//! - [`mount`] - view instances: root model, root fragment and render target
//! - [`observer`] - change callbacks coalesced per flush

pub mod mount;
pub mod observer;

pub use mount::{ObserverHandle, View, ViewOptions};
