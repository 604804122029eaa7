//! Transition parameter normalisation.

use crate::types::{Map, Value};

/// Duration of the `"slow"` shorthand, in milliseconds.
pub const SLOW: u64 = 600;
/// Duration of the `"fast"` shorthand.
pub const FAST: u64 = 200;
/// Duration of any other string shorthand.
pub const DEFAULT: u64 = 400;

/// Normalise the params an effect received and merge them over `defaults`.
///
/// | params       | meaning                 |
/// |--------------|-------------------------|
/// | number `n`   | `{ duration: n }`       |
/// | `"slow"`     | `{ duration: 600 }`     |
/// | `"fast"`     | `{ duration: 200 }`     |
/// | other string | `{ duration: 400 }`     |
/// | object       | itself                  |
/// | anything else| `{}`                    |
pub fn process_params(params: Option<&Value>, defaults: &Map) -> Map {
    let mut processed = defaults.clone();
    let duration = |ms: Value| {
        let mut map = Map::new();
        map.insert("duration".to_string(), ms);
        map
    };

    let params = match params {
        Some(Value::Number(n)) => duration(Value::Number(n.clone())),
        Some(Value::String(s)) => duration(Value::from(match s.as_str() {
            "slow" => SLOW,
            "fast" => FAST,
            _ => DEFAULT,
        })),
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    processed.extend(params);
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Map {
        json!({ "duration": 300, "easing": "linear" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_shorthands() {
        let slow = process_params(Some(&json!("slow")), &defaults());
        assert_eq!(slow["duration"], json!(600));
        assert_eq!(slow["easing"], json!("linear"));

        assert_eq!(process_params(Some(&json!("fast")), &Map::new())["duration"], json!(200));
        assert_eq!(process_params(Some(&json!("medium")), &Map::new())["duration"], json!(400));
        assert_eq!(process_params(Some(&json!(150)), &Map::new())["duration"], json!(150));
    }

    #[test]
    fn test_objects_merge_over_defaults() {
        let merged = process_params(Some(&json!({ "duration": 50, "delay": 10 })), &defaults());
        assert_eq!(merged["duration"], json!(50));
        assert_eq!(merged["delay"], json!(10));
        assert_eq!(merged["easing"], json!("linear"));
    }

    #[test]
    fn test_missing_params_keep_defaults() {
        assert_eq!(process_params(None, &defaults()), defaults());
        assert_eq!(process_params(Some(&json!(false)), &defaults()), defaults());
    }
}
