//! Keypath strings.
//!
//! A keypath joins keys with `.`; a `.` that belongs to a key is escaped as
//! `\.`. Model nodes store keys in escaped form and unescape them only when the
//! key is read as data.

/// Escape a raw key for use inside a keypath.
pub fn escape_key(key: &str) -> String {
    key.replace('.', "\\.")
}

/// Undo [`escape_key`].
pub fn unescape_key(key: &str) -> String {
    key.replace("\\.", ".")
}

/// Split a keypath into escaped keys, honouring `\.`.
///
/// The empty keypath has no keys.
pub fn split_keypath(keypath: &str) -> Vec<String> {
    if keypath.is_empty() {
        return Vec::new();
    }

    let mut keys = Vec::new();
    let mut current = String::new();
    let mut chars = keypath.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('\\');
                current.push('.');
                chars.next();
            }
            '.' => keys.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    keys.push(current);
    keys
}

/// Join escaped keys back into a keypath.
pub fn join_keypath<S: AsRef<str>>(keys: &[S]) -> String {
    keys.iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        assert_eq!(escape_key("a.b"), "a\\.b");
        assert_eq!(unescape_key("a\\.b"), "a.b");
    }

    #[test]
    fn test_split_honours_escapes() {
        assert_eq!(split_keypath("a.b\\.c.d"), vec!["a", "b\\.c", "d"]);
        assert_eq!(split_keypath("list.0"), vec!["list", "0"]);
        assert!(split_keypath("").is_empty());
    }

    #[test]
    fn test_join() {
        assert_eq!(join_keypath(&["a", "b\\.c"]), "a.b\\.c");
    }
}
