use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::reference::is_valid_key;
use crate::{Definition, Error, Fragment, Result};

/// Reserved key marking a node's own settings in nested configuration.
pub const SETTINGS_KEY: &str = "settings";

/// Hierarchical key space of definition fragments.
///
/// Resolving `model.user` overlays the fragments at `model` and
/// `model.user`, so a service family can declare its class once and let
/// each member override only what differs.
///
/// ```rust
/// use serde_json::json;
/// use wiring::{Argument, Registry};
///
/// let registry = Registry::from_config(&json!({
///     "model": {
///         "settings": {"class": "Model", "constructor": "factory"},
///         "user": {"settings": {"arguments": ["user"]}},
///     },
/// }))
/// .unwrap();
///
/// let definition = registry.resolve("model.user").unwrap();
/// assert_eq!(definition.class(), "Model");
/// assert_eq!(definition.constructor(), Some("factory"));
/// assert_eq!(definition.arguments(), &[Argument::literal("user")]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    fragments: BTreeMap<String, Fragment>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a nested configuration document.
    pub fn from_config(config: &JsonValue) -> Result<Self> {
        let mut registry = Self::new();
        registry.load(config, "")?;
        Ok(registry)
    }

    /// Adds every fragment found in a nested configuration document under
    /// `parent` (empty for the root).
    pub fn load(&mut self, config: &JsonValue, parent: &str) -> Result<&mut Self> {
        let JsonValue::Object(nodes) = config else {
            return Err(Error::InvalidDefinition {
                key: parent.to_owned(),
                reason: "expected a mapping of service namespaces".into(),
            });
        };
        for (name, node) in nodes {
            if name == SETTINGS_KEY {
                if parent.is_empty() {
                    return Err(Error::InvalidKey {
                        key: name.clone(),
                        reason: "settings at the root belong to no service",
                    });
                }
                continue;
            }
            let key = if parent.is_empty() {
                name.clone()
            } else {
                format!("{parent}.{name}")
            };
            let JsonValue::Object(children) = node else {
                return Err(Error::InvalidDefinition {
                    key,
                    reason: "expected a mapping".into(),
                });
            };
            if let Some(settings) = children.get(SETTINGS_KEY) {
                let fragment = Fragment::from_settings(&key, settings)?;
                if !fragment.is_empty() {
                    self.add(key.clone(), fragment)?;
                }
            }
            self.load(node, &key)?;
        }
        Ok(self)
    }

    /// Inserts a fragment, overlaying it onto any fragment already stored at
    /// the same key.
    pub fn add(&mut self, key: impl Into<String>, fragment: Fragment) -> Result<&mut Self> {
        let key = key.into();
        validate_key(&key)?;
        match self.fragments.get_mut(&key) {
            Some(existing) => existing.overlay(&fragment),
            None => {
                self.fragments.insert(key, fragment);
            }
        }
        Ok(self)
    }

    /// Merges every fragment on the path to `key`, root first.
    pub fn resolve(&self, key: &str) -> Result<Definition> {
        validate_key(key)?;
        let mut merged: Option<Fragment> = None;
        let mut end = 0;
        for segment in key.split('.') {
            end += segment.len();
            if let Some(fragment) = self.fragments.get(&key[..end]) {
                merged.get_or_insert_with(Fragment::new).overlay(fragment);
            }
            end += 1;
        }
        let merged = merged.ok_or_else(|| Error::UndefinedService {
            key: key.to_owned(),
        })?;
        Definition::from_fragment(key, merged)
    }

    /// Keys carrying a fragment, in ascending lexical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn fragment(&self, key: &str) -> Option<&Fragment> {
        self.fragments.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fragments.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey {
            key: key.to_owned(),
            reason: "key is empty",
        });
    }
    if !is_valid_key(key) {
        return Err(Error::InvalidKey {
            key: key.to_owned(),
            reason: "expected dot-separated segments of [0-9A-Za-z_-]",
        });
    }
    Ok(())
}
