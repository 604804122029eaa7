//! Reference resolution: pending resolvers, aliases, dynamic members.

use serde_json::{json, Value};
use spark_view::model;
use spark_view::resolver::pending;
use spark_view::{Template, View, ViewOptions};

fn mount(template: Value, data: Value) -> View {
    spark_view::reset_all();
    View::new(ViewOptions {
        template: Template::from_json(&template).unwrap(),
        data,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_pending_reference_resolves_once_it_appears() {
    let view = mount(
        json!([{ "t": 4, "n": 53, "r": "ctx", "f": [{ "t": 2, "r": "later" }] }]),
        json!({ "ctx": { "a": 1 } }),
    );
    assert_eq!(view.to_html(), "");
    assert_eq!(pending::pending_count(), 1);

    // unrelated changes leave it pending
    view.set("other", json!(1));
    assert_eq!(pending::pending_count(), 1);

    view.set("later", json!("here"));
    assert_eq!(pending::pending_count(), 0);
    assert_eq!(view.to_html(), "here");

    // bound like any other reference from now on
    view.set("later", json!("again"));
    assert_eq!(view.to_html(), "again");
    assert_eq!(pending::pending_count(), 0);
}

#[test]
fn test_pending_reference_prefers_nearest_scope() {
    let view = mount(
        json!([{ "t": 4, "n": 53, "r": "ctx", "f": [{ "t": 2, "r": "later" }] }]),
        json!({ "ctx": { "a": 1 } }),
    );
    view.set("ctx.later", json!("inner"));
    assert_eq!(view.to_html(), "inner");
    assert_eq!(pending::pending_count(), 0);
}

#[test]
fn test_pending_resolvers_are_cancelled_with_their_item() {
    let view = mount(
        json!([{ "t": 4, "n": 50, "r": "show", "f": [
            { "t": 4, "n": 53, "r": "ctx", "f": [{ "t": 2, "r": "later" }] }
        ]}]),
        json!({ "show": true, "ctx": { "a": 1 } }),
    );
    assert_eq!(pending::pending_count(), 1);

    view.set("show", json!(false));
    assert_eq!(pending::pending_count(), 0);
}

#[test]
fn test_alias_references_are_balanced() {
    let view = mount(
        json!([{ "t": 4, "n": 50, "r": "show", "f": [
            { "t": 19, "z": [{ "n": "u", "x": { "r": "user" } }], "f": [{ "t": 2, "r": "u.name" }] }
        ]}]),
        json!({ "show": true, "user": { "name": "ann" } }),
    );
    let user = view.model("user").unwrap();
    assert_eq!(view.to_html(), "ann");
    assert_eq!(model::ref_count(user), 1);

    view.set("user.name", json!("bob"));
    assert_eq!(view.to_html(), "bob");

    view.set("show", json!(false));
    assert_eq!(view.to_html(), "");
    assert_eq!(model::ref_count(user), 0);

    // the released node may have been reclaimed; the block retains afresh
    view.set("show", json!(true));
    assert_eq!(view.to_html(), "bob");
    assert_eq!(model::ref_count(view.model("user").unwrap()), 1);
}

#[test]
fn test_alias_follows_rebinding() {
    let view = mount(
        json!([{ "t": 4, "n": 52, "r": "people", "f": [
            { "t": 19, "z": [{ "n": "p", "x": { "r": "." } }], "f": [{ "t": 2, "r": "p.name" }, ","] }
        ]}]),
        json!({ "people": [{ "name": "a" }, { "name": "b" }] }),
    );
    assert_eq!(view.to_html(), "a,b,");

    view.shift("people").unwrap();
    assert_eq!(view.to_html(), "b,");
    view.set("people.0.name", json!("c"));
    assert_eq!(view.to_html(), "c,");
}

#[test]
fn test_dynamic_member_follows_its_index() {
    let view = mount(
        json!([{ "t": 2, "r": "list[i]" }]),
        json!({ "list": ["x", "y", "z"], "i": 0 }),
    );
    assert_eq!(view.to_html(), "x");

    view.set("i", json!(2));
    assert_eq!(view.to_html(), "z");

    view.set("list.2", json!("w"));
    assert_eq!(view.to_html(), "w");
}

#[test]
fn test_root_and_ancestor_references() {
    let view = mount(
        json!([{ "t": 4, "n": 53, "r": "a", "f": [
            { "t": 4, "n": 53, "r": "b", "f": [
                { "t": 2, "r": "~/title" }, "-", { "t": 2, "r": "../x" }, "-", { "t": 2, "r": "this.y" }
            ]}
        ]}]),
        json!({ "title": "T", "a": { "x": 1, "b": { "y": 2 } } }),
    );
    assert_eq!(view.to_html(), "T-1-2");
}
