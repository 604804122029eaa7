//! Inline style, computed style and vendor prefixes.
//!
//! Style properties are stored camelCased (`backgroundColor`), the way a
//! `style` object exposes them, and hyphenated when serialized into the
//! `style` attribute.
//!
//! The computed style of an element is its stylesheet defaults (global, then
//! per tag) overlaid with its inline style. Hosts and tests seed defaults with
//! [`set_stylesheet_default`].

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;

use super::{with_document, DomNodeId, Mutation};

/// Vendor prefixes tried, in order, for properties the host lacks.
const VENDORS: [&str; 4] = ["webkit", "moz", "ms", "o"];

#[derive(Default)]
struct StyleState {
    /// Tag-independent defaults.
    global_defaults: IndexMap<String, String>,
    /// Per-tag defaults, on top of the global ones.
    tag_defaults: HashMap<String, IndexMap<String, String>>,
    /// Properties the host only knows under a vendor prefix.
    vendor_only: HashMap<String, &'static str>,
    prefix_cache: HashMap<String, String>,
}

thread_local! {
    static STYLE: RefCell<StyleState> = RefCell::new(StyleState::default());
}

fn with_style<R>(f: impl FnOnce(&mut StyleState) -> R) -> R {
    STYLE.with(|state| f(&mut state.borrow_mut()))
}

// =============================================================================
// Names
// =============================================================================

/// `background-color` -> `backgroundColor`, `-webkit-transform` -> `webkitTransform`.
pub fn camelize(name: &str) -> String {
    let name = name.trim().strip_prefix('-').unwrap_or(name.trim());
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `backgroundColor` -> `background-color`, `webkitTransform` -> `-webkit-transform`.
pub fn hyphenate(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    if VENDORS
        .iter()
        .any(|v| name.starts_with(v) && name[v.len()..].starts_with(|c: char| c.is_ascii_uppercase()))
    {
        out.push('-');
    }
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The name the host knows `property` by, vendor-prefixed if needed.
pub fn prefix(property: &str) -> String {
    let property = camelize(property);
    if let Some(cached) = with_style(|s| s.prefix_cache.get(&property).cloned()) {
        return cached;
    }
    let resolved = with_style(|s| match s.vendor_only.get(&property) {
        Some(vendor) => {
            let mut capped = property.clone();
            if let Some(first) = capped.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            format!("{vendor}{capped}")
        }
        None => property.clone(),
    });
    with_style(|s| s.prefix_cache.insert(property, resolved.clone()));
    resolved
}

/// Make the host support `property` only as `<vendor>Property`.
pub fn set_vendor_only(property: &str, vendor: &str) {
    let Some(vendor) = VENDORS.into_iter().find(|v| *v == vendor) else {
        tracing::warn!(target: "spark_view::dom", vendor, "unknown vendor prefix");
        return;
    };
    let property = camelize(property);
    with_style(|s| {
        s.prefix_cache.remove(&property);
        s.vendor_only.insert(property, vendor);
    });
}

// =============================================================================
// Style Attribute
// =============================================================================

/// Parse a `style` attribute into camelCased properties.
pub fn parse_style(source: &str) -> IndexMap<String, String> {
    source
        .split(';')
        .filter_map(|declaration| {
            let (name, value) = declaration.split_once(':')?;
            let name = camelize(name);
            let value = value.trim();
            (!name.is_empty() && !value.is_empty()).then(|| (name, value.to_string()))
        })
        .collect()
}

pub fn serialize_style(style: &IndexMap<String, String>) -> String {
    style
        .iter()
        .map(|(name, value)| format!("{}: {value};", hyphenate(name)))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Inline Style
// =============================================================================

/// Inline style property (name as given, camelCased).
pub fn get_style(node: DomNodeId, property: &str) -> Option<String> {
    let property = camelize(property);
    with_document(|doc| doc.element(node)?.style.get(&property).cloned())
}

/// Write an inline style property. An empty value removes it.
pub fn set_style(node: DomNodeId, property: &str, value: &str) {
    let property = camelize(property);
    if value.is_empty() {
        remove_style(node, &property);
        return;
    }
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        if element.style.get(&property).map(String::as_str) == Some(value) {
            return;
        }
        element.style.insert(property.clone(), value.to_string());
        doc.record(Mutation::Style {
            target: node,
            property,
        });
    });
}

pub fn remove_style(node: DomNodeId, property: &str) {
    let property = camelize(property);
    with_document(|doc| {
        let Some(element) = doc.element_mut(node) else { return };
        if element.style.shift_remove(&property).is_some() {
            doc.record(Mutation::Style {
                target: node,
                property,
            });
        }
    });
}

/// Restore the `style` attribute captured before a transition ran.
pub fn reset_style(node: DomNodeId, original: Option<&str>) {
    match original {
        Some(original) => super::set_attribute(node, "style", original),
        None => super::remove_attribute(node, "style"),
    }
}

// =============================================================================
// Computed Style
// =============================================================================

/// Seed a stylesheet default, for every element (`tag: None`) or one tag.
pub fn set_stylesheet_default(tag: Option<&str>, property: &str, value: &str) {
    let property = camelize(property);
    with_style(|s| {
        let defaults = match tag {
            Some(tag) => s.tag_defaults.entry(tag.to_ascii_lowercase()).or_default(),
            None => &mut s.global_defaults,
        };
        defaults.insert(property, value.to_string());
    });
}

/// Stylesheet defaults overlaid with the inline style.
pub fn computed_style(node: DomNodeId) -> IndexMap<String, String> {
    let Some((tag, inline)) =
        with_document(|doc| doc.element(node).map(|e| (e.tag.clone(), e.style.clone())))
    else {
        return IndexMap::new();
    };

    let mut computed = with_style(|s| {
        let mut computed = s.global_defaults.clone();
        if let Some(defaults) = s.tag_defaults.get(&tag) {
            computed.extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        computed
    });
    computed.extend(inline);
    computed
}

/// Drop defaults, vendor rules and the prefix cache (for testing).
pub fn reset_style_state() {
    with_style(|s| *s = StyleState::default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom;

    #[test]
    fn test_name_conversions() {
        assert_eq!(camelize("background-color"), "backgroundColor");
        assert_eq!(camelize("-webkit-transform"), "webkitTransform");
        assert_eq!(hyphenate("backgroundColor"), "background-color");
        assert_eq!(hyphenate("webkitTransform"), "-webkit-transform");
        assert_eq!(hyphenate("opacity"), "opacity");
    }

    #[test]
    fn test_parse_and_serialize() {
        let style = parse_style("opacity: 0; background-color : red;;");
        assert_eq!(style.get("opacity").map(String::as_str), Some("0"));
        assert_eq!(style.get("backgroundColor").map(String::as_str), Some("red"));
        assert_eq!(serialize_style(&style), "opacity: 0; background-color: red;");
    }

    #[test]
    fn test_prefix() {
        dom::reset_document();
        assert_eq!(prefix("opacity"), "opacity");
        set_vendor_only("transform", "webkit");
        assert_eq!(prefix("transform"), "webkitTransform");
        assert_eq!(prefix("transform"), "webkitTransform");
    }

    #[test]
    fn test_computed_style_layers() {
        dom::reset_document();
        set_stylesheet_default(None, "opacity", "1");
        set_stylesheet_default(Some("div"), "display", "block");

        let div = dom::create_element("div");
        set_style(div, "opacity", "0.5");
        let computed = computed_style(div);
        assert_eq!(computed.get("opacity").map(String::as_str), Some("0.5"));
        assert_eq!(computed.get("display").map(String::as_str), Some("block"));

        let span = dom::create_element("span");
        assert!(computed_style(span).get("display").is_none());
    }

    #[test]
    fn test_reset_style() {
        dom::reset_document();
        let div = dom::create_element("div");
        set_style(div, "opacity", "0");
        reset_style(div, Some("color: red;"));
        assert_eq!(dom::get_attribute(div, "style").as_deref(), Some("color: red;"));
        reset_style(div, None);
        assert_eq!(dom::get_attribute(div, "style"), None);
    }
}
