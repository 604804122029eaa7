//! CSS transition driver.
//!
//! The in-memory document has no clock. A started CSS transition writes its
//! `transition-*` properties and the target styles at once, then waits until
//! enough time has been fed through [`advance`] to cover its delay and
//! duration. At that point the node receives a `transitionend` event, its
//! previous `transition-*` properties are restored and the completion
//! resolves (inside a runloop batch, so model writes made by completion
//! handlers flush normally).
//!
//! # Example
//!
//! ```ignore
//! let done = Completion::new();
//! animate::create_transitions(node, &to, 300.0, 0.0, "ease", changed, done.clone());
//! animate::advance(299.0);
//! assert!(!done.is_resolved());
//! animate::advance(1.0);
//! assert!(done.is_resolved());
//! ```

use std::cell::RefCell;

use indexmap::IndexMap;

use super::style::{self, hyphenate, prefix};
use super::{exists, fire, DomNodeId};
use crate::completion::Completion;
use crate::engine::runloop;

const TRANSITION_PROPERTIES: [&str; 4] = [
    "transitionProperty",
    "transitionDuration",
    "transitionTimingFunction",
    "transitionDelay",
];

struct Animation {
    node: DomNodeId,
    /// Milliseconds until `transitionend`.
    remaining: f64,
    /// `transition-*` inline values before the transition started.
    previous: Vec<(String, Option<String>)>,
    done: Completion,
}

thread_local! {
    static ANIMATIONS: RefCell<Vec<Animation>> = const { RefCell::new(Vec::new()) };
}

/// Transition `changed` properties of `node` towards `to`.
pub fn create_transitions(
    node: DomNodeId,
    to: &IndexMap<String, String>,
    duration: f64,
    delay: f64,
    easing: &str,
    changed: &[String],
    done: Completion,
) {
    let previous: Vec<(String, Option<String>)> = TRANSITION_PROPERTIES
        .iter()
        .map(|&p| {
            let name = prefix(p);
            let value = style::get_style(node, &name);
            (name, value)
        })
        .collect();

    let properties = changed
        .iter()
        .map(|p| hyphenate(&prefix(p)))
        .collect::<Vec<_>>()
        .join(", ");
    style::set_style(node, &prefix("transitionProperty"), &properties);
    style::set_style(node, &prefix("transitionDuration"), &format!("{}s", duration / 1000.0));
    style::set_style(node, &prefix("transitionTimingFunction"), easing);
    style::set_style(node, &prefix("transitionDelay"), &format!("{}s", delay / 1000.0));

    for (property, value) in to {
        style::set_style(node, &prefix(property), value);
    }

    tracing::trace!(target: "spark_view::dom", duration, delay, properties = %properties, "css transition started");
    ANIMATIONS.with(|animations| {
        animations.borrow_mut().push(Animation {
            node,
            remaining: delay + duration,
            previous,
            done,
        })
    });
}

/// Let `ms` milliseconds pass, ending every transition that ran its course.
pub fn advance(ms: f64) {
    let finished: Vec<Animation> = ANIMATIONS.with(|animations| {
        let mut animations = animations.borrow_mut();
        for animation in animations.iter_mut() {
            animation.remaining -= ms;
        }
        let (finished, running) = std::mem::take(&mut *animations)
            .into_iter()
            .partition(|a| a.remaining <= 0.0);
        *animations = running;
        finished
    });

    for animation in finished {
        if exists(animation.node) {
            for (name, value) in &animation.previous {
                match value {
                    Some(value) => style::set_style(animation.node, name, value),
                    None => style::remove_style(animation.node, name),
                }
            }
            fire(animation.node, "transitionend");
        }
        runloop::batch(|| {
            animation.done.resolve();
        });
    }
}

/// End every running transition.
pub fn finish_all() {
    while active_animation_count() > 0 {
        advance(f64::INFINITY);
    }
}

pub fn active_animation_count() -> usize {
    ANIMATIONS.with(|animations| animations.borrow().len())
}

/// Drop running transitions without resolving them (for testing).
pub fn reset_animations() {
    ANIMATIONS.with(|animations| animations.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;

    #[test]
    fn test_transition_ends_after_duration() {
        dom::reset_document();
        runloop::reset_runloop();

        let node = dom::create_element("div");
        let done = Completion::new();
        let to: IndexMap<String, String> = [("opacity".to_string(), "1".to_string())].into();
        create_transitions(node, &to, 300.0, 0.0, "linear", &["opacity".to_string()], done.clone());

        assert_eq!(dom::get_style(node, "opacity").as_deref(), Some("1"));
        assert_eq!(dom::get_style(node, "transitionProperty").as_deref(), Some("opacity"));

        advance(299.0);
        assert!(!done.is_resolved());
        advance(1.0);
        assert!(done.is_resolved());
        assert_eq!(dom::get_style(node, "transitionProperty"), None);
        assert_eq!(active_animation_count(), 0);
    }

    #[test]
    fn test_finish_all() {
        dom::reset_document();
        runloop::reset_runloop();

        let node = dom::create_element("div");
        let done = Completion::new();
        let to: IndexMap<String, String> = [("width".to_string(), "10px".to_string())].into();
        create_transitions(node, &to, 1000.0, 500.0, "ease", &["width".to_string()], done.clone());
        finish_all();
        assert!(done.is_resolved());
    }
}
