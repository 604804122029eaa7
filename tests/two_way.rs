//! Two-way binding of form controls.

use serde_json::{json, Value};
use spark_view::{dom, Template, View, ViewConfig, ViewOptions};

fn mount(template: Value, data: Value, config: ViewConfig) -> View {
    spark_view::reset_all();
    View::new(ViewOptions {
        template: Template::from_json(&template).unwrap(),
        data,
        config,
        ..Default::default()
    })
    .unwrap()
}

fn input_bound_to(reference: &str) -> Value {
    json!([{ "t": 7, "e": "input", "m": [
        { "t": 13, "n": "value", "f": [{ "t": 2, "r": reference }] }
    ]}])
}

#[test]
fn test_input_events_write_the_model() {
    let view = mount(input_bound_to("name"), json!({ "name": "a" }), ViewConfig::default());
    let input = view.find("input").unwrap();
    assert_eq!(dom::get_value(input), "a");

    dom::set_value(input, "b");
    dom::fire(input, "input");
    assert_eq!(view.get("name"), json!("b"));

    // model to control
    view.set("name", json!("c"));
    assert_eq!(dom::get_value(input), "c");
}

#[test]
fn test_change_event_updates_model_and_co_bound_text() {
    let template = json!([
        { "t": 7, "e": "input", "m": [
            { "t": 13, "n": "value", "f": [{ "t": 2, "r": "foo" }] }
        ]},
        { "t": 2, "r": "foo" }
    ]);
    let view = mount(template, json!({ "foo": "bar" }), ViewConfig::default());
    assert_eq!(view.to_html(), "<input>bar");
    let input = view.find("input").unwrap();

    dom::set_value(input, "baz");
    dom::fire(input, "change");
    assert_eq!(view.get("foo"), json!("baz"));
    assert_eq!(view.to_html(), "<input>baz");
}

#[test]
fn test_lazy_waits_for_change() {
    let config = ViewConfig {
        lazy: true,
        ..Default::default()
    };
    let view = mount(input_bound_to("name"), json!({ "name": "a" }), config);
    let input = view.find("input").unwrap();

    dom::set_value(input, "b");
    dom::fire(input, "input");
    assert_eq!(view.get("name"), json!("a"));

    dom::fire(input, "change");
    assert_eq!(view.get("name"), json!("b"));
}

#[test]
fn test_disabled_two_way_leaves_the_model_alone() {
    let config = ViewConfig {
        two_way: false,
        ..Default::default()
    };
    let view = mount(input_bound_to("name"), json!({ "name": "a" }), config);
    let input = view.find("input").unwrap();

    dom::set_value(input, "b");
    dom::fire(input, "change");
    assert_eq!(view.get("name"), json!("a"));
}

#[test]
fn test_uninitialised_value_becomes_empty_string() {
    let view = mount(input_bound_to("user.name"), json!({}), ViewConfig::default());
    assert_eq!(view.get("user.name"), json!(""));
    assert_eq!(view.get("user"), json!({ "name": "" }));
}

#[test]
fn test_checkbox_binds_checked() {
    let template = json!([{ "t": 7, "e": "input", "m": [
        { "t": 13, "n": "type", "f": "checkbox" },
        { "t": 13, "n": "checked", "f": [{ "t": 2, "r": "done" }] }
    ]}]);
    let view = mount(template, json!({}), ViewConfig::default());
    let input = view.find("input").unwrap();
    assert_eq!(view.get("done"), json!(false));
    assert!(!dom::is_checked(input));

    dom::set_checked(input, true);
    dom::fire(input, "change");
    assert_eq!(view.get("done"), json!(true));

    view.set("done", json!(false));
    assert!(!dom::is_checked(input));
}

#[test]
fn test_number_inputs_write_numbers() {
    let template = json!([{ "t": 7, "e": "input", "m": [
        { "t": 13, "n": "type", "f": "number" },
        { "t": 13, "n": "value", "f": [{ "t": 2, "r": "count" }] }
    ]}]);
    let view = mount(template, json!({ "count": 1 }), ViewConfig::default());
    let input = view.find("input").unwrap();

    dom::set_value(input, "42");
    dom::fire(input, "input");
    assert_eq!(view.get("count"), json!(42));
}

#[test]
fn test_blur_resets_control_to_normalised_model() {
    let view = mount(input_bound_to("name"), json!({ "name": "A" }), ViewConfig::default());
    let input = view.find("input").unwrap();

    // an observer that normalises whatever the user typed
    view.observe(
        "name",
        move |new, _| {
            if let Some(text) = new.as_str() {
                let upper = text.to_uppercase();
                if upper != text {
                    view.set("name", json!(upper));
                }
            }
        },
        false,
    )
    .unwrap();

    dom::set_value(input, "b");
    dom::fire(input, "blur");
    assert_eq!(view.get("name"), json!("B"));
    assert_eq!(dom::get_value(input), "B");
}
