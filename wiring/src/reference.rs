//! Deferred values embedded in definition arguments.
//!
//! A definition argument is either a literal JSON value or a [`Reference`]
//! that is resolved when the service is built:
//!
//! - `%key%` asks the container for the service at `key`;
//! - `@group.path@` asks the configuration source for `group` and walks the
//!   dotted `path` inside it.
//!
//! The sigils are parsed once, when a fragment is built from configuration.
//!
//! ```rust
//! use wiring::{Argument, Reference};
//!
//! assert_eq!(
//!     Argument::parse(serde_json::json!("%swift.transport%")),
//!     Argument::Reference(Reference::service("swift.transport")),
//! );
//! assert_eq!(
//!     Reference::parse("@email.host@"),
//!     Some(Reference::config("email", Some("host"))),
//! );
//! assert_eq!(Reference::parse("100%"), None);
//! ```

use std::fmt;

use serde_json::Value as JsonValue;

const SERVICE_SIGIL: char = '%';
const CONFIG_SIGIL: char = '@';

/// Pointer to a value that lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Another service in the same container.
    Service(String),
    /// A value inside a configuration group.
    Config { group: String, path: Option<String> },
}

impl Reference {
    pub fn service(key: impl Into<String>) -> Self {
        Self::Service(key.into())
    }

    pub fn config(group: impl Into<String>, path: Option<&str>) -> Self {
        Self::Config {
            group: group.into(),
            path: path.map(Into::into),
        }
    }

    /// Parses `%key%` or `@group.path@`.
    ///
    /// Returns `None` when the text carries no sigils or the inner text is
    /// not a well-formed key, in which case the text stays a literal.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(key) = strip_sigils(text, SERVICE_SIGIL) {
            return Some(Self::service(key));
        }
        let inner = strip_sigils(text, CONFIG_SIGIL)?;
        Some(match inner.split_once('.') {
            Some((group, path)) => Self::config(group, Some(path)),
            None => Self::config(inner, None),
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Service(key) => write!(f, "{SERVICE_SIGIL}{key}{SERVICE_SIGIL}"),
            Reference::Config { group, path: None } => {
                write!(f, "{CONFIG_SIGIL}{group}{CONFIG_SIGIL}")
            }
            Reference::Config {
                group,
                path: Some(path),
            } => write!(f, "{CONFIG_SIGIL}{group}.{path}{CONFIG_SIGIL}"),
        }
    }
}

fn strip_sigils(text: &str, sigil: char) -> Option<&str> {
    let inner = text.strip_prefix(sigil)?.strip_suffix(sigil)?;
    is_valid_key(inner).then_some(inner)
}

/// A single definition argument as written in configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Literal(JsonValue),
    Reference(Reference),
}

impl Argument {
    /// Turns a raw configuration value into an argument, recognising
    /// reference sigils in strings.
    pub fn parse(value: JsonValue) -> Self {
        if let JsonValue::String(text) = &value
            && let Some(reference) = Reference::parse(text)
        {
            return Self::Reference(reference);
        }
        Self::Literal(value)
    }

    pub fn literal(value: impl Into<JsonValue>) -> Self {
        Self::Literal(value.into())
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Serializes the argument back to its configuration form.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Argument::Literal(v) => v.clone(),
            Argument::Reference(r) => JsonValue::String(r.to_string()),
        }
    }
}

impl From<Reference> for Argument {
    fn from(value: Reference) -> Self {
        Self::Reference(value)
    }
}

/// Reports whether `key` is a dotted path of `[0-9A-Za-z_-]+` segments.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Walks a dotted path through nested objects and arrays.
pub(crate) fn lookup_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(value, |current, segment| match current {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_service_reference() {
        assert_eq!(
            Reference::parse("%model.user%"),
            Some(Reference::service("model.user"))
        );
        assert_eq!(Reference::parse("%%"), None);
        assert_eq!(Reference::parse("%a b%"), None);
        assert_eq!(Reference::parse("%a..b%"), None);
    }

    #[test]
    fn test_parse_config_reference() {
        assert_eq!(
            Reference::parse("@email.smtp.host@"),
            Some(Reference::config("email", Some("smtp.host")))
        );
        assert_eq!(
            Reference::parse("@email@"),
            Some(Reference::config("email", None))
        );
        assert_eq!(Reference::parse("user@example.com"), None);
    }

    #[test]
    fn test_argument_round_trips_display() {
        for text in ["%session%", "@email.port@", "@email@"] {
            assert_eq!(Argument::parse(json!(text)).to_json(), json!(text));
        }
        assert_eq!(Argument::parse(json!(42)), Argument::literal(42));
        assert!(!Argument::parse(json!("native")).is_reference());
    }

    #[test]
    fn test_lookup_path() {
        let tree = json!({"smtp": {"hosts": ["a", "b"], "port": 25}});
        assert_eq!(lookup_path(&tree, "smtp.port"), Some(&json!(25)));
        assert_eq!(lookup_path(&tree, "smtp.hosts.1"), Some(&json!("b")));
        assert_eq!(lookup_path(&tree, "smtp.missing"), None);
        assert_eq!(lookup_path(&tree, "smtp.port.deeper"), None);
    }
}
