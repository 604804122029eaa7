//! Intro/outro transitions driven through the runloop.

use std::cell::Cell;
use std::rc::Rc;

use serde_json::{json, Value};
use spark_view::dom::{self, animate};
use spark_view::state::visibility;
use spark_view::{log, Map, Template, TransitionHandle, View, ViewConfig, ViewError, ViewOptions};

fn mount_with(template: Value, data: Value, config: ViewConfig) -> View {
    spark_view::reset_all();
    register_fade();
    View::new(ViewOptions {
        template: Template::from_json(&template).unwrap(),
        data,
        config,
        ..Default::default()
    })
    .unwrap()
}

fn mount(template: Value, data: Value) -> View {
    mount_with(template, data, ViewConfig::default())
}

fn register_fade() {
    spark_view::register_transition("fade", |t, args| {
        let params = t.process_params(args.first(), &Map::new());
        if t.is_intro() {
            t.set_style("opacity", &json!(0));
            Some(t.animate_style("opacity", json!(1), Some(&params)))
        } else {
            Some(t.animate_style("opacity", json!(0), Some(&params)))
        }
    });
}

/// `{{#if show}}<div fade-in-out>hi</div>{{/if}}` with the given directive body.
fn faded(directive: Value) -> Value {
    json!([{ "t": 4, "n": 50, "r": "show", "f": [
        { "t": 7, "e": "div", "m": [{ "t": 72, "v": "t0", "f": directive }], "f": ["hi"] }
    ]}])
}

fn options(value: Value) -> Map {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_intro_plays_then_restores_style() {
    let view = mount(faded(json!({ "n": "fade", "a": [{ "duration": 300 }] })), json!({ "show": false }));

    let done = view.set("show", json!(true));
    let div = view.find("div").unwrap();
    assert!(!done.is_resolved());
    assert_eq!(dom::get_style(div, "opacity").as_deref(), Some("1"));

    animate::advance(299.0);
    assert!(!done.is_resolved());
    animate::advance(1.0);
    assert!(done.is_resolved());
    // intros reset to the original inline style
    assert_eq!(dom::get_style(div, "opacity"), None);
}

#[test]
fn test_outro_detach_waits_for_completion() {
    let view = mount(faded(json!({ "n": "fade", "a": [{ "duration": 200 }] })), json!({ "show": true }));
    animate::finish_all();
    assert_eq!(view.to_html(), "<div>hi</div>");

    let done = view.set("show", json!(false));
    assert!(!done.is_resolved());
    assert!(view.to_html().contains("hi"));

    animate::advance(200.0);
    assert!(done.is_resolved());
    assert_eq!(view.to_html(), "");
}

#[test]
fn test_expression_arguments_read_the_model() {
    let view = mount(
        faded(json!({ "n": "fade", "a": { "s": "[{\"duration\": _0}]", "r": ["ms"] } })),
        json!({ "show": false, "ms": 50 }),
    );
    let done = view.set("show", json!(true));
    animate::advance(49.0);
    assert!(!done.is_resolved());
    animate::advance(1.0);
    assert!(done.is_resolved());
}

#[test]
fn test_expression_arguments_take_values_from_when_the_transition_starts() {
    let view = mount(
        faded(json!({ "n": "fade", "a": { "s": "[{\"duration\": _0}]", "r": ["ms"] } })),
        json!({ "show": false, "ms": 50 }),
    );
    // runs later in the same flush that renders the element
    view.observe(
        "show",
        move |_, _| {
            view.set("ms", json!(80));
        },
        false,
    )
    .unwrap();

    let done = view.set("show", json!(true));
    animate::advance(50.0);
    assert!(!done.is_resolved());
    animate::advance(30.0);
    assert!(done.is_resolved());
}

#[test]
fn test_dynamic_name_and_arguments() {
    let view = mount(
        faded(json!({
            "n": [{ "t": 2, "r": "effect" }],
            "d": ["{\"duration\":", { "t": 2, "r": "ms" }, "}"]
        })),
        json!({ "show": false, "effect": "fade", "ms": 80 }),
    );
    let done = view.set("show", json!(true));
    assert!(!done.is_resolved());
    animate::advance(80.0);
    assert!(done.is_resolved());
}

#[test]
fn test_missing_plugin_warns_once_and_completes() {
    let view = mount(
        json!([{ "t": 4, "n": 52, "r": "rows", "f": [
            { "t": 7, "e": "p", "m": [{ "t": 72, "v": "t1", "f": "nope" }], "f": [{ "t": 2, "r": "." }] }
        ]}]),
        json!({ "rows": [] }),
    );
    let done = view.push("rows", vec![json!(1), json!(2)]).unwrap();
    assert!(done.is_resolved());
    assert_eq!(view.to_html(), "<p>1</p><p>2</p>");

    // already reported while binding
    assert!(!log::warn_once(&log::missing_plugin("nope", "transition")));
}

#[test]
fn test_disabled_transitions_attach_and_detach_instantly() {
    let config = ViewConfig {
        transitions_enabled: false,
        ..Default::default()
    };
    let view = mount_with(faded(json!("fade")), json!({ "show": false }), config);

    assert!(view.set("show", json!(true)).is_resolved());
    assert_eq!(animate::active_animation_count(), 0);
    assert!(view.set("show", json!(false)).is_resolved());
    assert_eq!(view.to_html(), "");
}

#[test]
fn test_hidden_page_skips_outros() {
    let view = mount(faded(json!({ "n": "fade", "a": [{ "duration": 200 }] })), json!({ "show": true }));
    animate::finish_all();

    visibility::set_visible(false);
    let done = view.set("show", json!(false));
    assert!(done.is_resolved());
    assert_eq!(view.to_html(), "");
    visibility::set_visible(true);
}

#[test]
fn test_teardown_completes_running_intro() {
    let view = mount(faded(json!({ "n": "fade", "a": [{ "duration": 300 }] })), json!({ "show": false }));
    let intro = view.set("show", json!(true));
    assert!(!intro.is_resolved());

    let outro = view.teardown();
    assert!(intro.is_resolved());
    animate::finish_all();
    assert!(outro.is_resolved());
}

#[test]
fn test_zero_duration_sets_styles_synchronously() {
    spark_view::reset_all();
    let node = dom::create_element("div");
    let handle = TransitionHandle::new(node, "x", true, None, Vec::new());

    let done = handle.animate_style("opacity", json!(0.5), Some(&options(json!({ "duration": 0 }))));
    assert!(done.is_resolved());
    assert_eq!(dom::get_style(node, "opacity").as_deref(), Some("0.5"));
    assert_eq!(animate::active_animation_count(), 0);
}

#[test]
fn test_animating_to_current_style_resolves_at_once() {
    spark_view::reset_all();
    let node = dom::create_element("div");
    let handle = TransitionHandle::new(node, "x", true, None, Vec::new());
    handle.set_style("opacity", &json!(1));

    let done = handle.animate_style("opacity", json!(1), Some(&options(json!({ "duration": 300 }))));
    assert!(done.is_resolved());
    assert_eq!(animate::active_animation_count(), 0);
}

#[test]
fn test_complete_is_idempotent() {
    spark_view::reset_all();
    let node = dom::create_element("div");
    let handle = TransitionHandle::new(node, "x", false, None, Vec::new());
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    handle.on_complete(move || c.set(c.get() + 1));

    handle.complete(false);
    handle.complete(false);
    handle.complete(true);
    assert_eq!(calls.get(), 1);
    assert!(handle.is_complete());
}

#[test]
fn test_handle_misuse_is_reported() {
    spark_view::reset_all();
    let node = dom::create_element("div");
    let handle = TransitionHandle::new(node, "x", true, None, Vec::new());

    assert_eq!(
        handle
            .animate_style_args(&[json!("opacity"), json!(1), json!({}), json!("callback")])
            .err(),
        Some(ViewError::AnimateStyleCallback)
    );
    assert_eq!(handle.get_style(&json!(5)).err(), Some(ViewError::GetStyleArgument));

    handle.set_style("width", &json!("10px"));
    assert_eq!(
        handle.get_style(&json!(["width"])).unwrap(),
        json!({ "width": "10px" })
    );
}
