use std::any::{Any, TypeId, type_name};
use std::mem::take;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::reference::lookup_path;
use crate::{
    Argument, Args, CallError, Definition, Error, Instance, Reference, Registry, Result, Target,
    TypeCatalog, TypeEntry, UnitLoader, Value,
};

/// Default bound on nested service references.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Collaborator answering `@group.path@` references.
pub trait ConfigSource: Send + Sync {
    /// Returns the whole value tree of a configuration group.
    fn load_group(&self, group: &str) -> Option<JsonValue>;
}

/// A JSON object whose top-level keys are configuration groups.
impl ConfigSource for JsonValue {
    fn load_group(&self, group: &str) -> Option<JsonValue> {
        self.get(group).cloned()
    }
}

struct NoConfig;

impl ConfigSource for NoConfig {
    fn load_group(&self, _group: &str) -> Option<JsonValue> {
        None
    }
}

struct NoUnits;

impl UnitLoader for NoUnits {
    fn load_unit(&self, _logical_path: &str) -> Option<TypeCatalog> {
        None
    }
}

/// Resolves service keys into live instances.
///
/// Each key follows `unresolved -> resolving -> cached | transient`: shared
/// definitions are built once and kept for the life of the container, the
/// others are built on every call.
///
/// # Examples
///
/// ```rust
/// use serde_json::json;
/// use wiring::{Args, Container, Instantiable, Registry, TypeBuilder, TypeCatalog};
///
/// struct Clock;
///
/// impl Instantiable for Clock {
///     fn describe(ty: &mut TypeBuilder<Self>) {
///         ty.constructor(|args: &mut Args| {
///             args.expect(0)?;
///             Ok(Clock)
///         });
///     }
/// }
///
/// let registry = Registry::from_config(&json!({
///     "clock": {"settings": {"class": "Clock", "shared": true}},
/// }))
/// .unwrap();
/// let container = Container::builder()
///     .definitions(registry)
///     .catalog(TypeCatalog::builder().register::<Clock>("Clock").build())
///     .build();
///
/// let a = container.get("clock").unwrap();
/// let b = container.get("clock").unwrap();
/// assert!(a.ptr_eq(&b));
/// ```
pub struct Container {
    definitions: Arc<Registry>,
    catalog: Arc<TypeCatalog>,
    config: Arc<dyn ConfigSource>,
    loader: Arc<dyn UnitLoader>,
    max_depth: usize,
    cache: DashMap<String, Instance>,
    units: DashMap<String, Arc<TypeCatalog>>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    pub fn new(definitions: Arc<Registry>, catalog: Arc<TypeCatalog>) -> Self {
        Self::builder()
            .shared_definitions(definitions)
            .shared_catalog(catalog)
            .build()
    }

    /// A fresh container over the same definitions and collaborators, with
    /// an empty cache.
    pub fn fork(&self) -> Self {
        Self {
            definitions: self.definitions.clone(),
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            loader: self.loader.clone(),
            max_depth: self.max_depth,
            cache: DashMap::new(),
            units: DashMap::new(),
        }
    }

    pub fn definitions(&self) -> &Arc<Registry> {
        &self.definitions
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns `true` if a shared instance for `key` has been built.
    pub fn is_cached(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Returns the instance for `key`, building it if needed.
    pub fn get(&self, key: &str) -> Result<Instance> {
        self.get_at(key, 0)
    }

    /// Returns the instance for `key` as a concrete type.
    pub fn get_as<T>(&self, key: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let instance = self.get(key)?;
        instance.downcast::<T>().ok_or_else(|| Error::UnexpectedType {
            key: key.to_owned(),
            expected: type_name::<T>().to_owned(),
            actual: instance.type_name(),
        })
    }

    fn get_at(&self, key: &str, depth: usize) -> Result<Instance> {
        if let Some(instance) = self.cache.get(key) {
            tracing::trace!(key, "Shared service served from cache");
            return Ok(instance.clone());
        }
        if depth > self.max_depth {
            return Err(Error::RecursionLimitExceeded {
                key: key.to_owned(),
                limit: self.max_depth,
            });
        }
        let definition = self.definitions.resolve(key)?;
        let instance = self.build(&definition, depth)?;
        if definition.is_shared() {
            self.cache.insert(key.to_owned(), instance.clone());
        }
        Ok(instance)
    }

    fn build(&self, definition: &Definition, depth: usize) -> Result<Instance> {
        tracing::debug!(
            key = definition.key(),
            class = definition.class(),
            shared = definition.is_shared(),
            "Building service"
        );
        let entry = self.type_entry(definition)?;
        let mut args = Args::new(self.resolve_arguments(definition.arguments(), depth)?);
        let mut instance = match definition.constructor() {
            Some(name) => entry.call_factory(name, &mut args),
            None => entry.construct(&mut args),
        }
        .map_err(|source| instantiation_error(definition, definition.target(), source))?;
        for method in definition.methods() {
            let mut args = Args::new(self.resolve_arguments(&method.arguments, depth)?);
            let target = Target::Method(method.name.clone());
            let owner = self.find_type_id(instance.type_id()).ok_or_else(|| {
                instantiation_error(
                    definition,
                    target.clone(),
                    CallError::MissingMethod {
                        type_name: instance.type_name(),
                        name: method.name.clone(),
                    },
                )
            })?;
            owner
                .call_method(&method.name, &mut instance, &mut args)
                .map_err(|source| instantiation_error(definition, target, source))?;
        }
        Ok(instance)
    }

    /// Finds the catalog entry for a definition's class, loading the unit
    /// named by its `path` when the class is not known yet.
    pub(crate) fn type_entry(&self, definition: &Definition) -> Result<Arc<TypeEntry>> {
        let class = definition.class();
        if let Some(entry) = self.find_type(class) {
            return Ok(entry);
        }
        if let Some(path) = definition.path() {
            self.load_unit(class, path)?;
            if let Some(entry) = self.find_type(class) {
                return Ok(entry);
            }
        }
        Err(instantiation_error(
            definition,
            definition.target(),
            CallError::MissingType {
                class: class.to_owned(),
            },
        ))
    }

    fn load_unit(&self, class: &str, path: &str) -> Result<()> {
        if self.units.contains_key(path) {
            return Ok(());
        }
        tracing::debug!(class, path, "Loading unit");
        let unit = self.loader.load_unit(path).ok_or_else(|| Error::LoadError {
            class: class.to_owned(),
            path: path.to_owned(),
        })?;
        self.units.insert(path.to_owned(), Arc::new(unit));
        Ok(())
    }

    fn find_type(&self, class: &str) -> Option<Arc<TypeEntry>> {
        if let Some(entry) = self.catalog.get(class) {
            return Some(entry.clone());
        }
        self.units.iter().find_map(|unit| unit.get(class).cloned())
    }

    pub(crate) fn find_type_id(&self, type_id: TypeId) -> Option<Arc<TypeEntry>> {
        if let Some(entry) = self.catalog.by_type_id(type_id) {
            return Some(entry.clone());
        }
        self.units
            .iter()
            .find_map(|unit| unit.by_type_id(type_id).cloned())
    }

    fn resolve_arguments(&self, arguments: &[Argument], depth: usize) -> Result<Vec<Value>> {
        arguments
            .iter()
            .map(|argument| match argument {
                Argument::Literal(value) => Ok(Value::Literal(value.clone())),
                Argument::Reference(reference) => self.resolve_reference(reference, depth),
            })
            .collect()
    }

    fn resolve_reference(&self, reference: &Reference, depth: usize) -> Result<Value> {
        match reference {
            Reference::Service(key) => self.get_at(key, depth + 1).map(Value::Service),
            Reference::Config { group, path } => {
                let tree = self.config.load_group(group);
                let value = match (tree, path) {
                    (Some(tree), Some(path)) => lookup_path(&tree, path).cloned(),
                    (tree, None) => tree,
                    (None, Some(_)) => None,
                };
                Ok(Value::Literal(value.unwrap_or(JsonValue::Null)))
            }
        }
    }
}

fn instantiation_error(definition: &Definition, target: Target, source: CallError) -> Error {
    Error::InstantiationError {
        key: definition.key().to_owned(),
        class: definition.class().to_owned(),
        target,
        source,
    }
}

/// Builder for a [`Container`].
pub struct ContainerBuilder {
    definitions: Arc<Registry>,
    catalog: Arc<TypeCatalog>,
    config: Arc<dyn ConfigSource>,
    loader: Arc<dyn UnitLoader>,
    max_depth: usize,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self {
            definitions: Arc::default(),
            catalog: Arc::default(),
            config: Arc::new(NoConfig),
            loader: Arc::new(NoUnits),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ContainerBuilder {
    pub fn definitions(&mut self, definitions: Registry) -> &mut Self {
        self.shared_definitions(Arc::new(definitions))
    }

    pub fn shared_definitions(&mut self, definitions: Arc<Registry>) -> &mut Self {
        self.definitions = definitions;
        self
    }

    pub fn catalog(&mut self, catalog: TypeCatalog) -> &mut Self {
        self.shared_catalog(Arc::new(catalog))
    }

    pub fn shared_catalog(&mut self, catalog: Arc<TypeCatalog>) -> &mut Self {
        self.catalog = catalog;
        self
    }

    pub fn config<C>(&mut self, config: C) -> &mut Self
    where
        C: ConfigSource + 'static,
    {
        self.shared_config(Arc::new(config))
    }

    pub fn shared_config(&mut self, config: Arc<dyn ConfigSource>) -> &mut Self {
        self.config = config;
        self
    }

    pub fn loader<L>(&mut self, loader: L) -> &mut Self
    where
        L: UnitLoader + 'static,
    {
        self.loader = Arc::new(loader);
        self
    }

    /// Bounds how many service references may nest below one `get()`.
    pub fn max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.max_depth = max_depth;
        self
    }

    pub fn build(&mut self) -> Container {
        let defaults = Self::default();
        Container {
            definitions: take(&mut self.definitions),
            catalog: take(&mut self.catalog),
            config: std::mem::replace(&mut self.config, defaults.config),
            loader: std::mem::replace(&mut self.loader, defaults.loader),
            max_depth: self.max_depth,
            cache: DashMap::new(),
            units: DashMap::new(),
        }
    }
}
