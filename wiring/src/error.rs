use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Type alias for boxed errors that can be sent across threads.
///
/// Failures raised by user types inside constructors, factories and methods
/// are carried in this form.
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while resolving definitions, building services or compiling
/// the accessor surface.
#[derive(Debug, Error)]
pub enum Error {
    /// A definition or lookup key is not a well-formed dotted path.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// No definition fragment exists anywhere on the key's path.
    #[error("undefined service {key:?}")]
    UndefinedService { key: String },

    /// The merged definition breaks one of the definition invariants.
    #[error("invalid definition for {key:?}: {reason}")]
    InvalidDefinition { key: String, reason: String },

    /// The unit that should provide a class could not be located.
    #[error("cannot load unit {path:?} providing class {class:?}")]
    LoadError { class: String, path: String },

    /// Construction or a post-construction call failed.
    #[error("cannot instantiate {class} for {key:?} via {target}: {source}")]
    InstantiationError {
        key: String,
        class: String,
        target: Target,
        #[source]
        source: CallError,
    },

    /// Service references nested deeper than the configured bound.
    #[error("recursion limit of {limit} exceeded while resolving {key:?}")]
    RecursionLimitExceeded { key: String, limit: usize },

    /// A service was requested as a type it is not.
    #[error("service {key:?}: expected {expected}, got instance of {actual}")]
    UnexpectedType {
        key: String,
        expected: String,
        actual: &'static str,
    },

    /// Aggregated compiler validation failure.
    #[error("service configuration is not valid:{}", list_entries(.entries))]
    InvalidConfiguration { entries: Vec<ValidationEntry> },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The callable a construction step was aimed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Constructor,
    Factory(String),
    Method(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Constructor => write!(f, "constructor"),
            Target::Factory(name) => write!(f, "factory `{name}`"),
            Target::Method(name) => write!(f, "method `{name}`"),
        }
    }
}

/// Failure of a single catalog call: a constructor, a factory or a method.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("type {class:?} is not registered")]
    MissingType { class: String },

    #[error("type {type_name} has no default constructor")]
    MissingConstructor { type_name: &'static str },

    #[error("type {type_name} has no factory named {name:?}")]
    MissingFactory {
        type_name: &'static str,
        name: String,
    },

    #[error("type {type_name} has no method named {name:?}")]
    MissingMethod { type_name: &'static str, name: String },

    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index}: {reason}")]
    Argument { index: usize, reason: String },

    #[error("receiver is not an exclusively owned {expected}")]
    Receiver { expected: &'static str },

    #[error("{0}")]
    Failed(#[source] StdError),
}

impl CallError {
    /// Wraps an error raised by the target type itself.
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<StdError>,
    {
        Self::Failed(err.into())
    }
}

/// One failing accessor collected by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEntry {
    pub key: String,
    pub reason: String,
}

impl ValidationEntry {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

fn list_entries(entries: &[ValidationEntry]) -> String {
    entries.iter().map(|v| format!("\n - {v}")).collect()
}
