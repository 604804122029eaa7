//! Host state the engine reacts to.
//!
//! - **Visibility** - whether the page is visible (transitions short-circuit
//!   while hidden)

pub mod visibility;
