//! Core types for spark-view.
//!
//! These types define the foundation that everything builds on: the value
//! representation flowing through the model graph, state flags for view items
//! and model nodes, and the JavaScript-flavoured coercions that templates rely
//! on when values are stringified or tested for truthiness.

use std::rc::Rc;

/// A model value.
///
/// `Null` doubles as "undefined": absent keys read as `Null`.
pub type Value = serde_json::Value;

/// An ordered key/value map (object values, style maps).
pub type Map = serde_json::Map<String, Value>;

// =============================================================================
// Callback Types
// =============================================================================

/// Cleanup function returned by registrations.
///
/// Call this to undo the registration.
pub type Cleanup = Box<dyn FnOnce()>;

/// Observer callback, receives `(new_value, old_value)`.
pub type ObserverCallback = Rc<dyn Fn(&Value, &Value)>;

/// Computed-value getter. Reads performed through [`crate::View::get`] while it
/// runs are captured as dependencies.
pub type Getter = Rc<dyn Fn() -> Value>;

// =============================================================================
// Item Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Lifecycle state of a view item.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u8 {
        const NONE = 0;
        const BOUND = 1 << 0;
        const RENDERED = 1 << 1;
        const DIRTY = 1 << 2;
        const UNBINDING = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Model node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const NONE = 0;
        /// Writes are ignored.
        const READONLY = 1 << 0;
        /// Synthetic node exposing its parent's key.
        const KEY = 1 << 1;
        /// Computed node currently evaluating (cycle guard).
        const EVALUATING = 1 << 2;
    }
}

// =============================================================================
// Template Type Codes
// =============================================================================

/// Numeric item codes of the template intermediate format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TemplateCode {
    Interpolator = 2,
    Section = 4,
    Element = 7,
    Comment = 9,
    Attribute = 13,
    Alias = 19,
    Transition = 72,
}

impl TryFrom<u8> for TemplateCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Interpolator),
            4 => Ok(Self::Section),
            7 => Ok(Self::Element),
            9 => Ok(Self::Comment),
            13 => Ok(Self::Attribute),
            19 => Ok(Self::Alias),
            72 => Ok(Self::Transition),
            other => Err(other),
        }
    }
}

/// Section flavour (`n` field of a section template).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    If,
    Unless,
    Each,
    With,
}

impl SectionKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            50 => Some(Self::If),
            51 => Some(Self::Unless),
            52 => Some(Self::Each),
            53 => Some(Self::With),
            _ => None,
        }
    }
}

/// Transition directive type (`v` field): `t0`, `t1` or `t2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    IntroOutro,
    Intro,
    Outro,
}

impl TransitionKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "t0" => Some(Self::IntroOutro),
            "t1" => Some(Self::Intro),
            "t2" => Some(Self::Outro),
            _ => None,
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            Self::IntroOutro => "intro-outro",
            Self::Intro => "intro",
            Self::Outro => "outro",
        }
    }

    pub fn is_intro(self) -> bool {
        matches!(self, Self::IntroOutro | Self::Intro)
    }

    pub fn is_outro(self) -> bool {
        matches!(self, Self::IntroOutro | Self::Outro)
    }
}

// =============================================================================
// Value Coercions
// =============================================================================

/// Stringify a value the way a text node displays it.
///
/// `Null` renders as the empty string, arrays are comma-joined.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn number_to_string(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

/// JavaScript truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric reading of a value, following `Number(x)` coercion.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Loose (`==`) equality between two values.
///
/// Computed style reads return strings while callers pass numbers, so
/// `"1" == 1` must hold. Objects and arrays never compare loosely equal.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!(2)), "2");
        assert_eq!(value_to_string(&json!(2.5)), "2.5");
        assert_eq!(value_to_string(&json!([1, "a"])), "1,a");
        assert_eq!(value_to_string(&json!(true)), "true");
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("0")));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!("1"), &json!(1)));
        assert!(loose_eq(&json!(0), &json!("0")));
        assert!(loose_eq(&json!(""), &json!(0)));
        assert!(!loose_eq(&json!("10px"), &json!(10)));
        assert!(!loose_eq(&json!(0), &json!("0px")));
        assert!(!loose_eq(&Value::Null, &json!(0)));
    }

    #[test]
    fn test_transition_kind_tags() {
        assert_eq!(TransitionKind::from_tag("t0"), Some(TransitionKind::IntroOutro));
        assert_eq!(TransitionKind::from_tag("t2").map(|k| k.event_name()), Some("outro"));
        assert!(TransitionKind::Intro.is_intro());
        assert!(!TransitionKind::Intro.is_outro());
        assert_eq!(TransitionKind::from_tag("t9"), None);
    }
}
