//! View primitives - the items a template instantiates.
//!
//! This module provides:
//! - [`item`] - the item arena and lifecycle dispatch
//! - [`fragment`] - ordered item lists carrying the scope chain
//! - [`text`], [`interpolator`], [`attribute`], [`element`] - content items
//! - [`control_flow`] - sections (`if`/`unless`/`each`/`with`)
//! - [`alias`] - named references scoped to a block
//!
//! # Architecture
//!
//! Items and fragments are indices into thread-local arenas. The model holds
//! only `Copy` tags of the items reading it (see [`crate::model::DependantId`]),
//! so an item removed mid-flush simply stops receiving notifications.
//!
//! Every item walks the same lifecycle:
//!
//! ```text
//! create -> bind -> render <-> unrender -> unbind -> destroy
//! ```
//!
//! Binding resolves references and registers on model nodes; rendering
//! creates DOM nodes. Updates arrive as dirty marks from the runloop and are
//! applied during phase 1 of a flush.

pub mod alias;
pub mod attribute;
pub mod binding;
pub mod control_flow;
pub mod element;
pub mod fragment;
pub mod interpolator;
pub mod item;
pub mod text;

pub use fragment::FragmentId;
pub use item::ItemId;
