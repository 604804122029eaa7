//! Reference syntax.
//!
//! ```text
//! name.sub.0          plain keypath, first key looked up through the scopes
//! list[0] obj["a.b"]  bracketed index / quoted key
//! list[i].name        dynamic member: `i` is itself a reference
//! .  this  ./x        the current context
//! ../x  ../../x       an ancestor context
//! ~/x                 the root
//! @index  @key        key node of the nearest iteration
//! ```

use crate::error::{Result, ViewError};
use crate::model::escape_key;

/// Where a reference starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefBase {
    /// First key is looked up through aliases, index refs, contexts, root.
    Plain,
    /// The innermost context.
    Context,
    /// `n` contexts up (`../` repeated `n` times).
    Ancestor(usize),
    Root,
    Index,
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Static key (escaped).
    Key(String),
    /// Key taken from the value of another reference.
    Member(Reference),
}

/// A parsed reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source: String,
    pub base: RefBase,
    pub segments: Vec<Segment>,
}

impl Reference {
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        let invalid = || ViewError::InvalidReference(source.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (base, rest) = if trimmed == "@index" {
            (RefBase::Index, "")
        } else if trimmed == "@key" {
            (RefBase::Key, "")
        } else if let Some(rest) = trimmed.strip_prefix("~/") {
            (RefBase::Root, rest)
        } else if trimmed.starts_with("../") {
            let mut rest = trimmed;
            let mut levels = 0;
            while let Some(next) = rest.strip_prefix("../") {
                levels += 1;
                rest = next;
            }
            (RefBase::Ancestor(levels), rest)
        } else if trimmed == "." || trimmed == "this" {
            (RefBase::Context, "")
        } else if let Some(rest) = trimmed
            .strip_prefix("this.")
            .or_else(|| trimmed.strip_prefix("./"))
            .or_else(|| trimmed.strip_prefix('.'))
        {
            (RefBase::Context, rest)
        } else {
            (RefBase::Plain, trimmed)
        };

        let segments = parse_segments(rest).ok_or_else(invalid)?;
        let starts_with_key = matches!(segments.first(), Some(Segment::Key(_))) && !rest.starts_with('[');
        if base == RefBase::Plain && !starts_with_key {
            return Err(invalid());
        }

        Ok(Self {
            source: source.to_string(),
            base,
            segments,
        })
    }

    /// Static keys of the reference, `None` when it has dynamic members.
    pub fn static_keys(&self) -> Option<Vec<String>> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Key(key) => Some(key.clone()),
                Segment::Member(_) => None,
            })
            .collect()
    }

    /// First key of a plain reference.
    pub fn head(&self) -> Option<&str> {
        match (&self.base, self.segments.first()) {
            (RefBase::Plain, Some(Segment::Key(key))) => Some(key),
            _ => None,
        }
    }

    /// References that compute dynamic members.
    pub fn members(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Member(reference) => Some(reference),
            Segment::Key(_) => None,
        })
    }

    pub fn has_members(&self) -> bool {
        self.members().next().is_some()
    }

    /// Whether the reference always follows whatever node it is bound to.
    pub fn is_contextual(&self) -> bool {
        matches!(self.base, RefBase::Context | RefBase::Index | RefBase::Key)
            && self.segments.is_empty()
    }
}

fn parse_segments(input: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut current = String::new();
    let mut after_bracket = false;

    while i < chars.len() {
        match chars[i] {
            '\\' if chars.get(i + 1) == Some(&'.') => {
                current.push_str("\\.");
                i += 2;
            }
            '.' => {
                if current.is_empty() && !after_bracket {
                    return None;
                }
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                after_bracket = false;
                i += 1;
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                let (segment, next) = parse_bracket(&chars, i + 1)?;
                segments.push(segment);
                after_bracket = true;
                i = next;
            }
            ']' => return None,
            c => {
                current.push(c);
                after_bracket = false;
                i += 1;
            }
        }
    }
    if !current.is_empty() {
        segments.push(Segment::Key(current));
    } else if input.ends_with('.') {
        return None;
    }
    Some(segments)
}

/// Parse the inside of `[...]` starting at `start`; returns the segment and
/// the index after the closing bracket.
fn parse_bracket(chars: &[char], start: usize) -> Option<(Segment, usize)> {
    let first = *chars.get(start)?;
    if first == '"' || first == '\'' {
        let mut literal = String::new();
        let mut i = start + 1;
        while *chars.get(i)? != first {
            literal.push(chars[i]);
            i += 1;
        }
        if *chars.get(i + 1)? != ']' {
            return None;
        }
        return Some((Segment::Key(escape_key(&literal)), i + 2));
    }

    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return None;
    }

    let inner: String = chars[start..i].iter().collect::<String>().trim().to_string();
    if inner.is_empty() {
        return None;
    }
    let segment = if inner.bytes().all(|b| b.is_ascii_digit()) {
        Segment::Key(inner)
    } else {
        Segment::Member(Reference::parse(&inner).ok()?)
    };
    Some((segment, i + 1))
}
