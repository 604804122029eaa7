//! Templates - the intermediate tree format.
//!
//! Templates arrive as JSON produced by an external compiler. Items are plain
//! strings (text) or objects tagged by a numeric `t` code:
//!
//! | `t` | item          | fields                                              |
//! |-----|---------------|-----------------------------------------------------|
//! | 2   | interpolator  | `r` reference                                       |
//! | 4   | section       | `n` 50 if / 51 unless / 52 each / 53 with, `r`, `i` index ref, `f` |
//! | 7   | element       | `e` tag, `m` attributes and directives, `f`         |
//! | 9   | comment       | `c` text                                            |
//! | 13  | attribute     | `n` name, `f` string or parts                       |
//! | 19  | alias         | `z` list of `{n, x: {r}}`, `f`                      |
//! | 72  | transition    | `v` t0/t1/t2, `f` name or `{n, a, d}`               |
//!
//! The top level is either an item array or `{"v": version, "t": [...]}`.

use std::rc::Rc;

use serde::Deserialize;

use crate::error::{Result, ViewError};
use crate::resolver::Reference;
use crate::types::{SectionKind, TemplateCode, TransitionKind, Value};

// =============================================================================
// Template Types
// =============================================================================

/// A piece of an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributePart {
    Text(String),
    Ref(Reference),
}

/// Transition effect name.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionName {
    Static(String),
    /// Evaluated from a throwaway fragment.
    Dynamic(Rc<Vec<TemplateItem>>),
}

/// Transition parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionParams {
    None,
    /// `f.a` as a literal argument list.
    Static(Vec<Value>),
    /// `f.a` as `{s, r}`: a JSON argument list where `_N` stands for the
    /// value of the `N`th reference.
    Expression { source: String, refs: Vec<Reference> },
    /// `f.d`: a fragment whose text is parsed as an argument list.
    Dynamic(Rc<Vec<TemplateItem>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateItem {
    Text(String),
    Comment(String),
    Interpolator {
        reference: Reference,
    },
    Section {
        /// `None` infers the behaviour from the value.
        kind: Option<SectionKind>,
        reference: Reference,
        index_ref: Option<String>,
        children: Rc<Vec<TemplateItem>>,
    },
    Element {
        tag: String,
        /// Attributes and transition directives.
        attributes: Vec<TemplateItem>,
        children: Rc<Vec<TemplateItem>>,
    },
    Attribute {
        name: String,
        value: Vec<AttributePart>,
    },
    Alias {
        /// `(name, reference)` pairs.
        aliases: Vec<(String, Reference)>,
        children: Rc<Vec<TemplateItem>>,
    },
    Transition {
        kind: TransitionKind,
        name: TransitionName,
        params: TransitionParams,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub version: Option<u32>,
    pub items: Rc<Vec<TemplateItem>>,
}

impl Template {
    pub fn from_json(value: &Value) -> Result<Self> {
        let raw: RawTemplate = serde_json::from_value(value.clone())
            .map_err(|e| ViewError::MalformedTemplate(e.to_string()))?;
        let (version, items) = match raw {
            RawTemplate::Items(items) => (None, items),
            RawTemplate::Versioned { v, t } => (v, t),
        };
        Ok(Self {
            version,
            items: Rc::new(convert_items(items)?),
        })
    }

    pub fn parse(source: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(source).map_err(|e| ViewError::MalformedTemplate(e.to_string()))?;
        Self::from_json(&value)
    }
}

// =============================================================================
// Raw (serde) Form
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Items(Vec<RawItem>),
    Versioned {
        v: Option<u32>,
        t: Vec<RawItem>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawItem {
    Text(String),
    Node(Box<RawNode>),
}

#[derive(Deserialize)]
struct RawNode {
    t: u8,
    r: Option<String>,
    n: Option<Value>,
    i: Option<String>,
    e: Option<String>,
    c: Option<String>,
    v: Option<String>,
    m: Option<Vec<RawItem>>,
    z: Option<Vec<RawAlias>>,
    f: Option<Value>,
}

#[derive(Deserialize)]
struct RawAlias {
    n: String,
    x: RawAliasTarget,
}

#[derive(Deserialize)]
struct RawAliasTarget {
    r: String,
}

#[derive(Deserialize)]
struct RawTransition {
    n: Option<Value>,
    a: Option<Value>,
    d: Option<Value>,
}

#[derive(Deserialize)]
struct RawExpression {
    s: String,
    #[serde(default)]
    r: Vec<String>,
}

fn malformed(message: impl Into<String>) -> ViewError {
    ViewError::MalformedTemplate(message.into())
}

fn convert_items(items: Vec<RawItem>) -> Result<Vec<TemplateItem>> {
    items.into_iter().map(TemplateItem::try_from).collect()
}

fn children_of(f: Option<Value>) -> Result<Rc<Vec<TemplateItem>>> {
    let Some(f) = f else {
        return Ok(Rc::new(Vec::new()));
    };
    let items: Vec<RawItem> =
        serde_json::from_value(f).map_err(|e| malformed(format!("children: {e}")))?;
    Ok(Rc::new(convert_items(items)?))
}

fn reference(field: Option<String>, what: &str) -> Result<Reference> {
    Reference::parse(&required(field, what)?)
}

fn required(field: Option<String>, what: &str) -> Result<String> {
    field.ok_or_else(|| malformed(format!("{what} is missing")))
}

impl TryFrom<RawItem> for TemplateItem {
    type Error = ViewError;

    fn try_from(raw: RawItem) -> Result<Self> {
        let node = match raw {
            RawItem::Text(text) => return Ok(TemplateItem::Text(text)),
            RawItem::Node(node) => *node,
        };
        let code = TemplateCode::try_from(node.t).map_err(ViewError::UnsupportedTemplateItem)?;

        match code {
            TemplateCode::Interpolator => Ok(TemplateItem::Interpolator {
                reference: reference(node.r, "interpolator reference (r)")?,
            }),
            TemplateCode::Section => {
                let kind = match node.n {
                    None => None,
                    Some(n) => {
                        let code = n
                            .as_u64()
                            .and_then(|c| u8::try_from(c).ok())
                            .ok_or_else(|| malformed("section type (n) must be a number"))?;
                        Some(
                            SectionKind::from_code(code)
                                .ok_or_else(|| malformed(format!("unknown section type {code}")))?,
                        )
                    }
                };
                Ok(TemplateItem::Section {
                    kind,
                    reference: reference(node.r, "section reference (r)")?,
                    index_ref: node.i,
                    children: children_of(node.f)?,
                })
            }
            TemplateCode::Element => {
                let attributes = convert_items(node.m.unwrap_or_default())?;
                if let Some(other) = attributes.iter().find(|a| {
                    !matches!(a, TemplateItem::Attribute { .. } | TemplateItem::Transition { .. })
                }) {
                    return Err(malformed(format!("unexpected element directive {other:?}")));
                }
                Ok(TemplateItem::Element {
                    tag: required(node.e, "element tag (e)")?,
                    attributes,
                    children: children_of(node.f)?,
                })
            }
            TemplateCode::Comment => Ok(TemplateItem::Comment(node.c.unwrap_or_default())),
            TemplateCode::Attribute => {
                let name = match node.n {
                    Some(Value::String(name)) => name,
                    _ => return Err(malformed("attribute name (n) must be a string")),
                };
                Ok(TemplateItem::Attribute {
                    name,
                    value: attribute_parts(node.f)?,
                })
            }
            TemplateCode::Alias => Ok(TemplateItem::Alias {
                aliases: node
                    .z
                    .ok_or_else(|| malformed("alias list (z) is missing"))?
                    .into_iter()
                    .map(|alias| Ok((alias.n, Reference::parse(&alias.x.r)?)))
                    .collect::<Result<_>>()?,
                children: children_of(node.f)?,
            }),
            TemplateCode::Transition => {
                let tag = required(node.v, "transition type (v)")?;
                let kind = TransitionKind::from_tag(&tag)
                    .ok_or_else(|| malformed(format!("unknown transition type {tag}")))?;
                let (name, params) = transition_parts(node.f)?;
                Ok(TemplateItem::Transition { kind, name, params })
            }
        }
    }
}

fn attribute_parts(f: Option<Value>) -> Result<Vec<AttributePart>> {
    match f {
        None => Ok(Vec::new()),
        Some(Value::String(text)) => Ok(vec![AttributePart::Text(text)]),
        Some(Value::Array(parts)) => parts
            .into_iter()
            .map(|part| match part {
                Value::String(text) => Ok(AttributePart::Text(text)),
                Value::Object(ref map) if map.get("t") == Some(&Value::from(2)) => {
                    match map.get("r") {
                        Some(Value::String(r)) => Ok(AttributePart::Ref(Reference::parse(r)?)),
                        _ => Err(malformed("attribute interpolator needs a reference (r)")),
                    }
                }
                other => Err(malformed(format!("unsupported attribute part {other}"))),
            })
            .collect(),
        Some(other) => Err(malformed(format!("unsupported attribute value {other}"))),
    }
}

fn transition_parts(f: Option<Value>) -> Result<(TransitionName, TransitionParams)> {
    let raw = match f {
        Some(Value::String(name)) => {
            return Ok((TransitionName::Static(name), TransitionParams::None));
        }
        Some(value @ Value::Object(_)) => serde_json::from_value::<RawTransition>(value)
            .map_err(|e| malformed(format!("transition: {e}")))?,
        _ => return Err(malformed("transition needs a name (f)")),
    };

    let name = match raw.n {
        Some(Value::String(name)) => TransitionName::Static(name),
        Some(parts @ Value::Array(_)) => TransitionName::Dynamic(children_of(Some(parts))?),
        _ => return Err(malformed("transition name (f.n) is missing")),
    };

    let params = match (raw.a, raw.d) {
        (Some(Value::Array(args)), _) => TransitionParams::Static(args),
        (Some(expression @ Value::Object(_)), _) => {
            let expression: RawExpression = serde_json::from_value(expression)
                .map_err(|e| malformed(format!("transition arguments: {e}")))?;
            TransitionParams::Expression {
                source: expression.s,
                refs: expression
                    .r
                    .iter()
                    .map(|r| Reference::parse(r))
                    .collect::<Result<_>>()?,
            }
        }
        (Some(other), _) => TransitionParams::Static(vec![other]),
        (None, Some(parts)) => TransitionParams::Dynamic(children_of(Some(parts))?),
        (None, None) => TransitionParams::None,
    };

    Ok((name, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_template() {
        let template = Template::from_json(&json!({
            "v": 4,
            "t": [
                { "t": 7, "e": "ul", "f": [
                    { "t": 4, "n": 52, "r": "items", "i": "i", "f": [
                        { "t": 7, "e": "li", "f": [{ "t": 2, "r": "i" }, ": ", { "t": 2, "r": "." }] }
                    ]}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(template.version, Some(4));
        let TemplateItem::Element { tag, children, .. } = &template.items[0] else {
            panic!("expected element");
        };
        assert_eq!(tag, "ul");
        let TemplateItem::Section { kind, index_ref, .. } = &children[0] else {
            panic!("expected section");
        };
        assert_eq!(*kind, Some(SectionKind::Each));
        assert_eq!(index_ref.as_deref(), Some("i"));
    }

    #[test]
    fn test_attribute_parts() {
        let template = Template::from_json(&json!([
            { "t": 7, "e": "input", "m": [
                { "t": 13, "n": "value", "f": [{ "t": 2, "r": "name" }] },
                { "t": 13, "n": "class", "f": "big" }
            ]}
        ]))
        .unwrap();

        let TemplateItem::Element { attributes, .. } = &template.items[0] else {
            panic!("expected element");
        };
        assert_eq!(
            attributes[0],
            TemplateItem::Attribute {
                name: "value".into(),
                value: vec![AttributePart::Ref(Reference::parse("name").unwrap())],
            }
        );
    }

    #[test]
    fn test_transition_forms() {
        let template = Template::from_json(&json!([
            { "t": 72, "v": "t1", "f": "fade" },
            { "t": 72, "v": "t2", "f": { "n": "fly", "a": [{ "duration": 100 }] } },
            { "t": 72, "v": "t0", "f": { "n": "fly", "a": { "s": "[_0,2]", "r": ["speed"] } } },
            { "t": 72, "v": "t0", "f": { "n": [{ "t": 2, "r": "effect" }], "d": ["{\"duration\":", { "t": 2, "r": "ms" }, "}"] } }
        ]))
        .unwrap();

        assert!(matches!(
            &template.items[0],
            TemplateItem::Transition { kind: TransitionKind::Intro, name: TransitionName::Static(n), params: TransitionParams::None } if n == "fade"
        ));
        assert!(matches!(
            &template.items[1],
            TemplateItem::Transition { params: TransitionParams::Static(args), .. } if args.len() == 1
        ));
        assert!(matches!(
            &template.items[2],
            TemplateItem::Transition { params: TransitionParams::Expression { refs, .. }, .. } if refs.len() == 1 && refs[0].source == "speed"
        ));
        assert!(matches!(
            &template.items[3],
            TemplateItem::Transition { name: TransitionName::Dynamic(_), params: TransitionParams::Dynamic(_), .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_codes() {
        assert_eq!(
            Template::from_json(&json!([{ "t": 99 }])),
            Err(ViewError::UnsupportedTemplateItem(99))
        );
        assert!(matches!(
            Template::from_json(&json!([{ "t": 4, "n": 77, "r": "x" }])),
            Err(ViewError::MalformedTemplate(_))
        ));
        assert!(Template::parse("{ not json").is_err());
    }

    #[test]
    fn test_rejects_invalid_references() {
        assert_eq!(
            Template::from_json(&json!([{ "t": 2, "r": "a..b" }])),
            Err(ViewError::InvalidReference("a..b".into()))
        );
    }
}
