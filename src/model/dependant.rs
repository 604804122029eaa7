//! Dependants - everything that can register on a model node.
//!
//! A dependant is a small `Copy` tag naming its owner. The model stores tags,
//! never references, and dispatches through the [`Dependant`] trait, so the
//! owner is looked up (and may already be gone) at notification time.

use super::NodeId;
use crate::pipeline::observer::{self, ObserverId};
use crate::primitives::fragment::{self, FragmentId};
use crate::primitives::item::{self, ItemId};
use crate::resolver::pending::{self, ResolverId};

/// Tagged handle of a registered dependant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependantId {
    /// A view item (element, attribute, interpolator, section, alias, transition).
    Item(ItemId),
    /// An iteration fragment following its context node.
    Fragment(FragmentId),
    /// A computed node reading its sources.
    Computation(NodeId),
    Observer(ObserverId),
    /// A reference waiting to resolve.
    Resolver(ResolverId),
    #[cfg(test)]
    Probe(u32),
}

/// Notifications a model node delivers to its dependants.
pub trait Dependant {
    /// The value of a node this dependant reads has changed.
    fn handle_change(&self);

    /// The data this dependant was bound to now lives at `next` (or nowhere).
    fn rebinding(&self, next: Option<NodeId>, previous: NodeId, via_link: bool);

    /// The array this dependant iterates was reordered. `new_indices[old]` is
    /// the new index of each old item, `-1` for removed items.
    fn shuffle(&self, _new_indices: &[i64]) {}
}

impl Dependant for DependantId {
    fn handle_change(&self) {
        match *self {
            DependantId::Item(id) => item::handle_change(id),
            DependantId::Fragment(_) => {}
            DependantId::Computation(node) => super::invalidate(node),
            DependantId::Observer(id) => observer::handle_change(id),
            DependantId::Resolver(id) => pending::handle_change(id),
            #[cfg(test)]
            DependantId::Probe(probe) => record(ProbeEvent::Change(probe)),
        }
    }

    fn rebinding(&self, next: Option<NodeId>, previous: NodeId, via_link: bool) {
        match *self {
            DependantId::Item(id) => item::rebinding(id, next, previous, via_link),
            DependantId::Fragment(id) => fragment::rebinding(id, next, previous),
            DependantId::Computation(node) => super::invalidate(node),
            DependantId::Observer(_) => {}
            DependantId::Resolver(id) => pending::handle_change(id),
            #[cfg(test)]
            DependantId::Probe(probe) => record(ProbeEvent::Rebinding {
                probe,
                next,
                previous,
            }),
        }
    }

    fn shuffle(&self, new_indices: &[i64]) {
        match *self {
            DependantId::Item(id) => item::shuffle(id, new_indices),
            #[cfg(test)]
            DependantId::Probe(probe) => record(ProbeEvent::Shuffle {
                probe,
                new_indices: new_indices.to_vec(),
            }),
            _ => {}
        }
    }
}

// =============================================================================
// Test Probe
// =============================================================================

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    Change(u32),
    Rebinding {
        probe: u32,
        next: Option<NodeId>,
        previous: NodeId,
    },
    Shuffle {
        probe: u32,
        new_indices: Vec<i64>,
    },
}

#[cfg(test)]
thread_local! {
    static PROBE_LOG: std::cell::RefCell<Vec<ProbeEvent>> = const { std::cell::RefCell::new(Vec::new()) };
}

#[cfg(test)]
fn record(event: ProbeEvent) {
    PROBE_LOG.with(|log| log.borrow_mut().push(event));
}

#[cfg(test)]
pub fn probe_log() -> Vec<ProbeEvent> {
    PROBE_LOG.with(|log| log.borrow().clone())
}

#[cfg(test)]
pub fn reset_probe_log() {
    PROBE_LOG.with(|log| log.borrow_mut().clear());
}
