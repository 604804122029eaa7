//! Sections: conditionals, contexts, lists and array shuffles.

use serde_json::{json, Value};
use spark_view::dom::{self, Mutation};
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

fn indexed_list() -> Value {
    json!([{ "t": 7, "e": "ul", "f": [
        { "t": 4, "n": 52, "r": "items", "i": "i", "f": [
            { "t": 7, "e": "li", "f": [{ "t": 2, "r": "i" }, ": ", { "t": 2, "r": "." }] }
        ]}
    ]}])
}

#[test]
fn test_conditionals_follow_truthiness() {
    let view = mount(
        json!([
            { "t": 4, "n": 50, "r": "show", "f": [{ "t": 7, "e": "b", "f": ["yes"] }] },
            { "t": 4, "n": 51, "r": "show", "f": ["no"] }
        ]),
        json!({ "show": false }),
    );
    assert_eq!(view.to_html(), "no");

    view.set("show", json!(true));
    assert_eq!(view.to_html(), "<b>yes</b>");

    view.set("show", json!(0));
    assert_eq!(view.to_html(), "no");
}

#[test]
fn test_with_changes_context() {
    let view = mount(
        json!([{ "t": 4, "n": 53, "r": "user", "f": [{ "t": 2, "r": "name" }, "/", { "t": 2, "r": "../title" }] }]),
        json!({ "user": { "name": "ann" }, "title": "t" }),
    );
    assert_eq!(view.to_html(), "ann/t");

    view.set("user.name", json!("bob"));
    assert_eq!(view.to_html(), "bob/t");
}

#[test]
fn test_each_over_object_exposes_keys() {
    let view = mount(
        json!([{ "t": 4, "n": 52, "r": "scores", "i": "k", "f": [
            { "t": 2, "r": "k" }, "=", { "t": 2, "r": "." }, ";"
        ]}]),
        json!({ "scores": { "a": 1, "b": 2 } }),
    );
    assert_eq!(view.to_html(), "a=1;b=2;");

    view.set("scores.b", json!(5));
    assert_eq!(view.to_html(), "a=1;b=5;");
}

#[test]
fn test_index_refs_update_with_minimal_dom_writes() {
    let view = mount(indexed_list(), json!({ "items": ["a", "b", "c"] }));
    assert_eq!(view.to_html(), "<ul><li>0: a</li><li>1: b</li><li>2: c</li></ul>");
    let before = view.find_all("li");

    dom::take_mutations();
    view.shift("items").unwrap();
    assert_eq!(view.to_html(), "<ul><li>0: b</li><li>1: c</li></ul>");

    // the surviving rows are the same elements
    let after = view.find_all("li");
    assert_eq!(after, before[1..].to_vec());

    let mutations = dom::take_mutations();
    let text_writes: Vec<_> = mutations
        .iter()
        .filter(|m| matches!(m, Mutation::CharacterData { .. }))
        .collect();
    // only the two index texts changed
    assert_eq!(text_writes.len(), 2);
    assert!(mutations
        .iter()
        .all(|m| !matches!(m, Mutation::ChildList { target } if after.contains(target))));
}

#[test]
fn test_push_and_unshift_render_only_new_rows() {
    let view = mount(indexed_list(), json!({ "items": ["b"] }));
    let original = view.find("li").unwrap();

    view.push("items", vec![json!("c")]).unwrap();
    view.unshift("items", vec![json!("a")]).unwrap();
    assert_eq!(view.to_html(), "<ul><li>0: a</li><li>1: b</li><li>2: c</li></ul>");
    assert_eq!(view.find_all("li")[1], original);
}

#[test]
fn test_splice_removes_and_inserts() {
    let view = mount(indexed_list(), json!({ "items": ["a", "b", "c", "d"] }));
    view.splice("items", 1, Some(2), vec![json!("x")]).unwrap();
    assert_eq!(view.get("items"), json!(["a", "x", "d"]));
    assert_eq!(view.to_html(), "<ul><li>0: a</li><li>1: x</li><li>2: d</li></ul>");

    view.pop("items").unwrap();
    assert_eq!(view.to_html(), "<ul><li>0: a</li><li>1: x</li></ul>");
}

#[test]
fn test_replacing_the_array_rebuilds_the_list() {
    let view = mount(indexed_list(), json!({ "items": ["a", "b"] }));
    view.set("items", json!(["z"]));
    assert_eq!(view.to_html(), "<ul><li>0: z</li></ul>");

    view.set("items", json!([]));
    assert_eq!(view.to_html(), "<ul></ul>");
}

#[test]
fn test_member_through_index_ref_touches_one_node() {
    let view = mount(
        json!([{ "t": 4, "n": 52, "r": "items", "i": "i", "f": [
            { "t": 7, "e": "p", "f": [{ "t": 2, "r": "items[i].name" }] }
        ]}]),
        json!({ "items": [{ "name": "a" }, { "name": "b" }, { "name": "c" }] }),
    );
    assert_eq!(view.to_html(), "<p>a</p><p>b</p><p>c</p>");
    let rows = view.find_all("p");

    dom::take_mutations();
    view.set("items.0.name", json!("z"));
    assert_eq!(view.to_html(), "<p>z</p><p>b</p><p>c</p>");

    let mutations = dom::take_mutations();
    assert_eq!(mutations.len(), 1);
    let Mutation::CharacterData { target } = &mutations[0] else {
        panic!("expected a text write, got {mutations:?}");
    };
    assert_eq!(dom::parent(*target), Some(rows[0]));
}
