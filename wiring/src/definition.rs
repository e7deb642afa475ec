use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::{Argument, Error, Result, Target};

/// A named call made on a freshly built instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub name: String,
    pub arguments: Vec<Argument>,
}

impl MethodCall {
    pub fn new<I>(name: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = Argument>,
    {
        Self {
            name: name.into(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// Accepts `"name"`, `["name"]`, `["name", [args...]]` or
    /// `{"name": ..., "arguments": [...]}`.
    fn from_settings(key: &str, value: JsonValue) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDefinition {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };
        let (name, arguments) = match value {
            JsonValue::String(name) => (name, Vec::new()),
            JsonValue::Array(items) => {
                let mut items = items.into_iter();
                let name = match items.next() {
                    Some(JsonValue::String(name)) => name,
                    _ => return Err(invalid("method entry must start with a name")),
                };
                let arguments = match items.next() {
                    None | Some(JsonValue::Null) => Vec::new(),
                    Some(JsonValue::Array(args)) => args,
                    Some(_) => return Err(invalid("method arguments must be a list")),
                };
                if items.next().is_some() {
                    return Err(invalid("method entry has trailing items"));
                }
                (name, arguments)
            }
            JsonValue::Object(mut table) => {
                let name = match table.remove("name") {
                    Some(JsonValue::String(name)) => name,
                    _ => return Err(invalid("method entry must have a name")),
                };
                let arguments = match table.remove("arguments") {
                    None | Some(JsonValue::Null) => Vec::new(),
                    Some(JsonValue::Array(args)) => args,
                    Some(_) => return Err(invalid("method arguments must be a list")),
                };
                (name, arguments)
            }
            _ => return Err(invalid("method entry must be a name or a list")),
        };
        Ok(Self::new(name, arguments.into_iter().map(Argument::parse)))
    }

    fn to_json(&self) -> JsonValue {
        JsonValue::Array(vec![
            JsonValue::String(self.name.clone()),
            JsonValue::Array(self.arguments.iter().map(Argument::to_json).collect()),
        ])
    }
}

#[derive(Deserialize)]
struct Settings {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    constructor: Option<String>,
    #[serde(default)]
    arguments: Vec<JsonValue>,
    #[serde(default)]
    shared: Option<bool>,
    #[serde(default)]
    methods: Vec<JsonValue>,
}

/// Partial service settings found at one registry node.
///
/// Every field is optional; a fragment only carries what its level of the
/// key space overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub class: Option<String>,
    pub path: Option<String>,
    pub constructor: Option<String>,
    pub arguments: Vec<Argument>,
    pub shared: Option<bool>,
    pub methods: Vec<MethodCall>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn constructor(mut self, constructor: impl Into<String>) -> Self {
        self.constructor = Some(constructor.into());
        self
    }

    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn method(mut self, method: MethodCall) -> Self {
        self.methods.push(method);
        self
    }

    /// Builds a fragment from a `settings` object.
    ///
    /// Unknown fields are ignored. Empty strings and `shared: false` count as
    /// absent.
    pub fn from_settings(key: &str, settings: &JsonValue) -> Result<Self> {
        let settings =
            Settings::deserialize(settings).map_err(|err| Error::InvalidDefinition {
                key: key.to_owned(),
                reason: err.to_string(),
            })?;
        let methods = settings
            .methods
            .into_iter()
            .map(|v| MethodCall::from_settings(key, v))
            .collect::<Result<_>>()?;
        Ok(Self {
            class: non_empty(settings.class),
            path: non_empty(settings.path),
            constructor: non_empty(settings.constructor),
            arguments: settings.arguments.into_iter().map(Argument::parse).collect(),
            shared: settings.shared.filter(|shared| *shared),
            methods,
        })
    }

    /// Copies every populated field of `other` over this fragment.
    ///
    /// `shared` only ever turns on: a `false` never clears an inherited
    /// `true`.
    pub fn overlay(&mut self, other: &Fragment) {
        if other.class.is_some() {
            self.class.clone_from(&other.class);
        }
        if other.path.is_some() {
            self.path.clone_from(&other.path);
        }
        if other.constructor.is_some() {
            self.constructor.clone_from(&other.constructor);
        }
        if !other.arguments.is_empty() {
            self.arguments.clone_from(&other.arguments);
        }
        if other.shared == Some(true) {
            self.shared = Some(true);
        }
        if !other.methods.is_empty() {
            self.methods.clone_from(&other.methods);
        }
    }

    /// Returns `true` when overlaying this fragment changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Field-by-field dump using the configuration field names.
    pub fn as_map(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        let mut put = |name: &str, value: Option<JsonValue>| {
            if let Some(value) = value {
                map.insert(name.to_owned(), value);
            }
        };
        put("class", self.class.clone().map(JsonValue::String));
        put("path", self.path.clone().map(JsonValue::String));
        put("constructor", self.constructor.clone().map(JsonValue::String));
        put(
            "arguments",
            (!self.arguments.is_empty()).then(|| arguments_json(&self.arguments)),
        );
        put("shared", self.shared.map(JsonValue::Bool));
        put(
            "methods",
            (!self.methods.is_empty())
                .then(|| JsonValue::Array(self.methods.iter().map(MethodCall::to_json).collect())),
        );
        map
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn arguments_json(arguments: &[Argument]) -> JsonValue {
    JsonValue::Array(arguments.iter().map(Argument::to_json).collect())
}

/// Fully merged settings of one service key.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    key: String,
    class: String,
    path: Option<String>,
    constructor: Option<String>,
    arguments: Vec<Argument>,
    shared: bool,
    methods: Vec<MethodCall>,
}

impl Definition {
    /// Checks the definition invariants on a merged fragment.
    pub fn from_fragment(key: impl Into<String>, fragment: Fragment) -> Result<Self> {
        let key = key.into();
        let invalid = |reason: String| Error::InvalidDefinition {
            key: key.clone(),
            reason,
        };
        let class = match fragment.class {
            Some(class) if is_valid_type_name(&class) => class,
            Some(class) => return Err(invalid(format!("invalid class name {class:?}"))),
            None => return Err(invalid("no class given".into())),
        };
        if let Some(constructor) = &fragment.constructor
            && !is_valid_identifier(constructor)
        {
            return Err(invalid(format!("invalid constructor name {constructor:?}")));
        }
        if let Some(method) = fragment
            .methods
            .iter()
            .find(|v| !is_valid_identifier(&v.name))
        {
            return Err(invalid(format!("invalid method name {:?}", method.name)));
        }
        Ok(Self {
            key,
            class,
            path: fragment.path,
            constructor: fragment.constructor,
            arguments: fragment.arguments,
            shared: fragment.shared.unwrap_or(false),
            methods: fragment.methods,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the catalog type to build.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Logical path of the unit providing the class.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Factory function used instead of the default constructor.
    pub fn constructor(&self) -> Option<&str> {
        self.constructor.as_deref()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn methods(&self) -> &[MethodCall] {
        &self.methods
    }

    /// The callable that builds the instance.
    pub fn target(&self) -> Target {
        match &self.constructor {
            Some(name) => Target::Factory(name.clone()),
            None => Target::Constructor,
        }
    }

    pub fn as_map(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert("class".into(), JsonValue::String(self.class.clone()));
        map.insert(
            "path".into(),
            self.path.clone().map_or(JsonValue::Null, JsonValue::String),
        );
        map.insert(
            "constructor".into(),
            self.constructor
                .clone()
                .map_or(JsonValue::Null, JsonValue::String),
        );
        map.insert("arguments".into(), arguments_json(&self.arguments));
        map.insert("shared".into(), JsonValue::Bool(self.shared));
        map.insert(
            "methods".into(),
            JsonValue::Array(self.methods.iter().map(MethodCall::to_json).collect()),
        );
        map
    }
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_type_name(name: &str) -> bool {
    name.split("::").all(is_valid_identifier)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Reference;

    #[test]
    fn test_from_settings() {
        let fragment = Fragment::from_settings(
            "model.user",
            &json!({
                "class": "Model",
                "constructor": "",
                "arguments": ["user", "%session%"],
                "methods": [["set_session", ["%session%"]], "reset"],
                "unknown": true,
            }),
        )
        .unwrap();
        assert_eq!(fragment.class.as_deref(), Some("Model"));
        assert_eq!(fragment.constructor, None);
        assert_eq!(
            fragment.arguments,
            vec![
                Argument::literal("user"),
                Reference::service("session").into()
            ]
        );
        assert_eq!(
            fragment.methods,
            vec![
                MethodCall::new("set_session", [Reference::service("session").into()]),
                MethodCall::new("reset", []),
            ]
        );
    }

    #[test]
    fn test_from_settings_rejects_bad_shapes() {
        for settings in [
            json!({"arguments": "user"}),
            json!({"shared": "yes"}),
            json!({"methods": [[1]]}),
            json!({"methods": [["a", "b"]]}),
        ] {
            assert!(matches!(
                Fragment::from_settings("x", &settings),
                Err(Error::InvalidDefinition { .. })
            ));
        }
    }

    #[test]
    fn test_overlay_with_empty_is_noop() {
        let mut fragment = Fragment::new()
            .class("Model")
            .constructor("factory")
            .shared(true)
            .argument(Argument::literal(1));
        let before = fragment.clone();
        fragment.overlay(&Fragment::new());
        assert_eq!(fragment, before);
    }

    #[test]
    fn test_overlay_replaces_populated_fields() {
        let mut fragment = Fragment::new()
            .class("Model")
            .argument(Argument::literal("base"));
        fragment.overlay(&Fragment::new().argument(Argument::literal("user")).shared(true));
        assert_eq!(fragment.class.as_deref(), Some("Model"));
        assert_eq!(fragment.arguments, vec![Argument::literal("user")]);
        assert_eq!(fragment.shared, Some(true));
    }

    #[test]
    fn test_overlay_keeps_inherited_shared() {
        let mut fragment = Fragment::new().class("Session").shared(true);
        fragment.overlay(&Fragment::new().shared(false));
        assert_eq!(fragment.shared, Some(true));

        let settings = Fragment::from_settings("session.admin", &json!({"shared": false})).unwrap();
        assert_eq!(settings.shared, None);
        assert!(settings.is_empty());
    }

    #[test]
    fn test_definition_invariants() {
        assert!(Definition::from_fragment("a", Fragment::new()).is_err());
        assert!(Definition::from_fragment("a", Fragment::new().class("9Lives")).is_err());
        assert!(
            Definition::from_fragment("a", Fragment::new().class("X").constructor("make-it"))
                .is_err()
        );
        assert!(
            Definition::from_fragment(
                "a",
                Fragment::new().class("X").method(MethodCall::new("", []))
            )
            .is_err()
        );
        let definition =
            Definition::from_fragment("a", Fragment::new().class("mail::Transport")).unwrap();
        assert_eq!(definition.class(), "mail::Transport");
        assert!(!definition.is_shared());
        assert_eq!(definition.target(), Target::Constructor);
        assert_eq!(definition.as_map()["arguments"], json!([]));
    }
}
