//! Explicit registry of constructible types.
//!
//! Configuration names a class, a factory and methods by string; the catalog
//! maps those names onto typed closures registered at startup, so the
//! container can build arbitrary configured types without runtime
//! reflection.
//!
//! # Examples
//!
//! ```rust
//! use wiring::{Args, CallError, Instantiable, TypeBuilder, TypeCatalog};
//!
//! struct Mailer {
//!     host: String,
//!     encryption: Option<String>,
//! }
//!
//! impl Instantiable for Mailer {
//!     fn describe(ty: &mut TypeBuilder<Self>) {
//!         ty.constructor(|args: &mut Args| {
//!             args.expect(1)?;
//!             Ok(Mailer {
//!                 host: args.next()?,
//!                 encryption: None,
//!             })
//!         })
//!         .method("set_encryption", |this: &mut Mailer, args: &mut Args| {
//!             args.expect(1)?;
//!             this.encryption = args.next()?;
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let catalog = TypeCatalog::builder().register::<Mailer>("Mailer").build();
//! assert!(catalog.contains("Mailer"));
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap, btree_map};
use std::marker::PhantomData;
use std::mem::take;
use std::sync::Arc;

use crate::{Args, CallError, Instance};

type ConstructFn = dyn Fn(&mut Args) -> Result<Instance, CallError> + Send + Sync;
type MethodFn =
    dyn Fn(&mut (dyn Any + Send + Sync), &mut Args) -> Result<(), CallError> + Send + Sync;

/// Trait for types the container can build from configuration.
///
/// Implementations describe their constructor, factories and methods on a
/// [`TypeBuilder`]. With the `macros` feature the description can be
/// generated by `#[instantiable]` or `#[derive(Instantiable)]`.
pub trait Instantiable: Any + Send + Sync + Sized {
    fn describe(ty: &mut TypeBuilder<Self>);
}

/// Statically known type produced by a constructor or factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnType {
    pub rust_path: &'static str,
    pub type_id: TypeId,
    /// Crate that registered the type; its leading segment in `rust_path`
    /// is spelled `crate` in generated source.
    pub local_crate: Option<&'static str>,
}

impl ReturnType {
    pub fn of<T>() -> Self
    where
        T: Any,
    {
        Self {
            rust_path: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            local_crate: None,
        }
    }
}

struct Factory {
    call: Box<ConstructFn>,
    returns: Option<ReturnType>,
}

/// Everything the container knows about one registered type.
pub struct TypeEntry {
    name: String,
    rust_path: &'static str,
    type_id: TypeId,
    local_crate: Option<&'static str>,
    constructor: Option<Box<ConstructFn>>,
    factories: HashMap<String, Factory>,
    methods: HashMap<String, Box<MethodFn>>,
}

impl TypeEntry {
    /// Configuration-facing class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path used for the type in generated source.
    pub fn rust_path(&self) -> &'static str {
        self.rust_path
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the crate that described the type, as `CARGO_CRATE_NAME`.
    pub fn local_crate(&self) -> Option<&'static str> {
        self.local_crate
    }

    pub fn return_type(&self) -> ReturnType {
        ReturnType {
            rust_path: self.rust_path,
            type_id: self.type_id,
            local_crate: self.local_crate,
        }
    }

    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Declared return type of a factory, `None` when the factory is
    /// missing or produces an untyped [`Instance`].
    pub fn factory_return_type(&self, name: &str) -> Option<ReturnType> {
        self.factories.get(name).and_then(|v| v.returns)
    }

    pub fn construct(&self, args: &mut Args) -> Result<Instance, CallError> {
        let constructor = self
            .constructor
            .as_ref()
            .ok_or(CallError::MissingConstructor {
                type_name: self.rust_path,
            })?;
        constructor(args)
    }

    pub fn call_factory(&self, name: &str, args: &mut Args) -> Result<Instance, CallError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CallError::MissingFactory {
                type_name: self.rust_path,
                name: name.to_owned(),
            })?;
        (factory.call)(args)
    }

    /// Invokes a method on an instance nobody else holds yet.
    pub fn call_method(
        &self,
        name: &str,
        target: &mut Instance,
        args: &mut Args,
    ) -> Result<(), CallError> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| CallError::MissingMethod {
                type_name: self.rust_path,
                name: name.to_owned(),
            })?;
        let receiver = target.get_mut().ok_or(CallError::Receiver {
            expected: self.rust_path,
        })?;
        method(receiver, args)
    }
}

/// Collects the callables of one type `T`.
pub struct TypeBuilder<T> {
    entry: TypeEntry,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypeBuilder<T>
where
    T: Any + Send + Sync,
{
    fn new(name: String) -> Self {
        Self {
            entry: TypeEntry {
                name,
                rust_path: type_name::<T>(),
                type_id: TypeId::of::<T>(),
                local_crate: None,
                constructor: None,
                factories: HashMap::new(),
                methods: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Overrides the path emitted for this type in generated source, e.g.
    /// `crate::model::User` instead of the `std::any::type_name` spelling.
    pub fn rust_path(&mut self, path: &'static str) -> &mut Self {
        self.entry.rust_path = path;
        self
    }

    /// Names the crate the type lives in, so generated source refers to its
    /// paths through `crate::`. The derive macros pass `CARGO_CRATE_NAME`.
    pub fn local_crate(&mut self, name: &'static str) -> &mut Self {
        self.entry.local_crate = Some(name);
        self
    }

    /// Sets the default constructor.
    pub fn constructor<F>(&mut self, func: F) -> &mut Self
    where
        F: Fn(&mut Args) -> Result<T, CallError> + Send + Sync + 'static,
    {
        self.entry.constructor =
            Some(Box::new(move |args: &mut Args| func(args).map(Instance::new)));
        self
    }

    /// Adds a static factory whose return type is known.
    pub fn factory<R, F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        R: Any + Send + Sync,
        F: Fn(&mut Args) -> Result<R, CallError> + Send + Sync + 'static,
    {
        self.entry.factories.insert(
            name.into(),
            Factory {
                call: Box::new(move |args: &mut Args| func(args).map(Instance::new)),
                returns: Some(ReturnType::of::<R>()),
            },
        );
        self
    }

    /// Adds a static factory whose return type is only known at runtime.
    ///
    /// Methods still run on the returned instance, so it must not be shared
    /// yet: a factory handing out a clone of a cached singleton makes every
    /// configured method fail with [`CallError::Receiver`].
    pub fn dynamic_factory<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut Args) -> Result<Instance, CallError> + Send + Sync + 'static,
    {
        self.entry.factories.insert(
            name.into(),
            Factory {
                call: Box::new(func),
                returns: None,
            },
        );
        self
    }

    /// Adds a method callable after construction.
    pub fn method<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut T, &mut Args) -> Result<(), CallError> + Send + Sync + 'static,
    {
        self.entry.methods.insert(
            name.into(),
            Box::new(move |target: &mut (dyn Any + Send + Sync), args: &mut Args| {
                let this = target
                    .downcast_mut::<T>()
                    .ok_or(CallError::Receiver {
                        expected: type_name::<T>(),
                    })?;
                func(this, args)
            }),
        );
        self
    }
}

/// Immutable set of registered types, looked up by class name or by
/// [`TypeId`].
#[derive(Default)]
pub struct TypeCatalog {
    entries: BTreeMap<String, Arc<TypeEntry>>,
    by_type: HashMap<TypeId, Arc<TypeEntry>>,
}

impl TypeCatalog {
    pub fn builder() -> TypeCatalogBuilder {
        TypeCatalogBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeEntry>> {
        self.entries.get(name)
    }

    /// First entry registered for the Rust type `type_id`.
    pub fn by_type_id(&self, type_id: TypeId) -> Option<&Arc<TypeEntry>> {
        self.by_type.get(&type_id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Builder for a [`TypeCatalog`].
#[derive(Default)]
pub struct TypeCatalogBuilder {
    entries: BTreeMap<String, TypeEntry>,
}

impl TypeCatalogBuilder {
    /// Registers an [`Instantiable`] type under a class name.
    ///
    /// # Panics
    ///
    /// Panics if the class name is already registered.
    pub fn register<T>(&mut self, name: impl Into<String>) -> &mut Self
    where
        T: Instantiable,
    {
        self.register_with::<T, _>(name, T::describe)
    }

    /// Registers a type described by a closure, for types that cannot
    /// implement [`Instantiable`] themselves.
    ///
    /// # Panics
    ///
    /// Panics if the class name is already registered.
    pub fn register_with<T, F>(&mut self, name: impl Into<String>, describe: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&mut TypeBuilder<T>),
    {
        let name = name.into();
        match self.entries.entry(name) {
            btree_map::Entry::Occupied(v) => panic!("Type {} already registered", v.key()),
            btree_map::Entry::Vacant(v) => {
                let mut builder = TypeBuilder::<T>::new(v.key().clone());
                describe(&mut builder);
                v.insert(builder.entry);
            }
        }
        self
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn build(&mut self) -> TypeCatalog {
        let mut catalog = TypeCatalog::default();
        for (name, entry) in take(&mut self.entries) {
            let entry = Arc::new(entry);
            catalog
                .by_type
                .entry(entry.type_id)
                .or_insert_with(|| entry.clone());
            catalog.entries.insert(name, entry);
        }
        catalog
    }
}

/// Collaborator that makes more types available on demand.
///
/// The container asks it for the unit named by a definition's `path` when
/// the definition's class is not in the catalog yet.
pub trait UnitLoader: Send + Sync {
    fn load_unit(&self, logical_path: &str) -> Option<TypeCatalog>;
}

impl<F> UnitLoader for F
where
    F: Fn(&str) -> Option<TypeCatalog> + Send + Sync,
{
    fn load_unit(&self, logical_path: &str) -> Option<TypeCatalog> {
        self(logical_path)
    }
}

/// Fixed table of units keyed by logical path.
#[derive(Default)]
pub struct Units {
    units: HashMap<String, fn() -> TypeCatalog>,
}

impl Units {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, logical_path: impl Into<String>, unit: fn() -> TypeCatalog) -> &mut Self {
        self.units.insert(logical_path.into(), unit);
        self
    }
}

impl UnitLoader for Units {
    fn load_unit(&self, logical_path: &str) -> Option<TypeCatalog> {
        self.units.get(logical_path).map(|unit| unit())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Value;

    struct Counter {
        value: i64,
    }

    impl Instantiable for Counter {
        fn describe(ty: &mut TypeBuilder<Self>) {
            ty.constructor(|args| {
                args.expect(1)?;
                Ok(Counter { value: args.next()? })
            })
            .factory("zero", |args| {
                args.expect(0)?;
                Ok(Counter { value: 0 })
            })
            .dynamic_factory("boxed", |_| Ok(Instance::new(7i64)))
            .method("add", |this, args| {
                args.expect(1)?;
                this.value += args.next::<i64>()?;
                Ok(())
            });
        }
    }

    fn catalog() -> TypeCatalog {
        TypeCatalog::builder().register::<Counter>("Counter").build()
    }

    #[test]
    fn test_construct_and_call_method() {
        let catalog = catalog();
        let entry = catalog.get("Counter").unwrap();
        let mut instance = entry
            .construct(&mut Args::new(vec![Value::Literal(json!(2))]))
            .unwrap();
        entry
            .call_method("add", &mut instance, &mut Args::new(vec![Value::Literal(json!(3))]))
            .unwrap();
        assert_eq!(instance.downcast_ref::<Counter>().unwrap().value, 5);
    }

    #[test]
    fn test_method_requires_exclusive_instance() {
        let catalog = catalog();
        let entry = catalog.get("Counter").unwrap();
        let mut instance = entry.call_factory("zero", &mut Args::new(vec![])).unwrap();
        let _other = instance.clone();
        assert!(matches!(
            entry.call_method("add", &mut instance, &mut Args::new(vec![Value::Literal(json!(1))])),
            Err(CallError::Receiver { .. })
        ));
    }

    #[test]
    fn test_factory_return_types() {
        let catalog = catalog();
        let entry = catalog.get("Counter").unwrap();
        assert_eq!(
            entry.factory_return_type("zero"),
            Some(ReturnType::of::<Counter>())
        );
        assert_eq!(entry.factory_return_type("boxed"), None);
        assert_eq!(entry.factory_return_type("missing"), None);
        assert!(matches!(
            entry.call_factory("missing", &mut Args::new(vec![])),
            Err(CallError::MissingFactory { .. })
        ));
    }

    #[test]
    fn test_lookup_by_type_id() {
        let catalog = catalog();
        assert_eq!(
            catalog.by_type_id(TypeId::of::<Counter>()).unwrap().name(),
            "Counter"
        );
        assert!(catalog.by_type_id(TypeId::of::<String>()).is_none());
    }

    #[test]
    #[should_panic]
    fn test_duplicate_registration() {
        TypeCatalog::builder()
            .register::<Counter>("Counter")
            .register::<Counter>("Counter");
    }

    #[test]
    fn test_units() {
        let mut units = Units::new();
        units.add("vendor/counter", catalog);
        assert!(units.load_unit("vendor/counter").unwrap().contains("Counter"));
        assert!(units.load_unit("vendor/missing").is_none());
    }
}
