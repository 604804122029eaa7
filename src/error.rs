//! Error types.
//!
//! Only programmer misuse surfaces as an error. Soft configuration problems
//! (a missing transition effect, say) are logged once and degrade to a no-op,
//! and an unresolvable reference simply stays pending.

/// Errors returned by the public API.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error("animate_style() returns a completion - use .then() instead of passing a callback")]
    AnimateStyleCallback,

    #[error("animate_style() expects (property, value, options) or (styles, options), got {0} arguments")]
    AnimateStyleArity(usize),

    #[error("get_style must be passed a string, or an array of strings representing CSS properties")]
    GetStyleArgument,

    #[error("unsupported template item type {0}")]
    UnsupportedTemplateItem(u8),

    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    #[error("invalid reference '{0}'")]
    InvalidReference(String),

    #[error("keypath '{0}' does not hold an array")]
    NotAnArray(String),

    #[error("keypath '{0}' is read-only")]
    ReadOnly(String),

    #[error("render target does not exist")]
    MissingTarget,

    #[error("view has been torn down")]
    TornDown,
}

pub type Result<T> = std::result::Result<T, ViewError>;
