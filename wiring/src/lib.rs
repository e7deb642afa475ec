//! # wiring
//!
//! A configuration-driven service container for Rust applications: service
//! graphs are declared as nested configuration, resolved through a
//! hierarchical registry and built from an explicit catalog of types.
//!
//! ## Core Concepts
//!
//! - **Registry**: Hierarchical key space of definition fragments merged root to leaf
//! - **Reference**: `%key%` and `@group.path@` arguments resolved at build time
//! - **TypeCatalog**: Constructors, factories and methods registered per type
//! - **Container**: Builds services on demand and caches the shared ones
//! - **Compiler**: Emits a typed accessor struct and validates every service
//!
//! ## Basic Usage
//!
//! ```rust
//! use serde_json::json;
//! use wiring::{Args, Container, Instantiable, Registry, TypeBuilder, TypeCatalog};
//!
//! struct Transport {
//!     host: String,
//!     port: u16,
//! }
//!
//! impl Instantiable for Transport {
//!     fn describe(ty: &mut TypeBuilder<Self>) {
//!         ty.constructor(|args: &mut Args| {
//!             args.expect(2)?;
//!             Ok(Transport {
//!                 host: args.next()?,
//!                 port: args.next()?,
//!             })
//!         });
//!     }
//! }
//!
//! struct Mailer {
//!     transport: std::sync::Arc<Transport>,
//! }
//!
//! impl Instantiable for Mailer {
//!     fn describe(ty: &mut TypeBuilder<Self>) {
//!         ty.constructor(|args: &mut Args| {
//!             args.expect(1)?;
//!             Ok(Mailer {
//!                 transport: args.next()?,
//!             })
//!         });
//!     }
//! }
//!
//! let registry = Registry::from_config(&json!({
//!     "swift": {
//!         "transport": {
//!             "settings": {
//!                 "class": "Transport",
//!                 "arguments": ["@email.host@", "@email.port@"],
//!                 "shared": true,
//!             },
//!         },
//!         "mailer": {
//!             "settings": {"class": "Mailer", "arguments": ["%swift.transport%"]},
//!         },
//!     },
//! }))
//! .unwrap();
//!
//! let container = Container::builder()
//!     .definitions(registry)
//!     .catalog(
//!         TypeCatalog::builder()
//!             .register::<Transport>("Transport")
//!             .register::<Mailer>("Mailer")
//!             .build(),
//!     )
//!     .config(json!({"email": {"host": "localhost", "port": 25}}))
//!     .build();
//!
//! let mailer = container.get_as::<Mailer>("swift.mailer").unwrap();
//! assert_eq!(mailer.transport.host, "localhost");
//! assert_eq!(mailer.transport.port, 25);
//! ```
//!
//! ## Using Macros
//!
//! With the `macros` feature enabled, the catalog description is generated:
//!
//! ```rust
//! use wiring::{Instantiable, TypeCatalog, instantiable};
//!
//! #[derive(Instantiable)]
//! struct Transport {
//!     host: String,
//!     port: u16,
//! }
//!
//! struct Model {
//!     table: String,
//! }
//!
//! #[instantiable]
//! impl Model {
//!     #[factory]
//!     fn factory(table: String) -> Model {
//!         Model { table }
//!     }
//!
//!     #[method]
//!     fn set_table(&mut self, table: String) {
//!         self.table = table;
//!     }
//! }
//!
//! let catalog = TypeCatalog::builder()
//!     .register::<Transport>("Transport")
//!     .register::<Model>("Model")
//!     .build();
//! assert_eq!(catalog.len(), 2);
//! ```
//!
//! ## Features
//!
//! - `macros` (default): Enables `#[derive(Instantiable)]` and `#[instantiable]`

mod catalog;
mod compiler;
mod container;
mod definition;
mod error;
mod instance;
mod reference;
mod registry;

pub use catalog::*;
pub use compiler::*;
pub use container::*;
pub use definition::{Definition, Fragment, MethodCall};
pub use error::*;
pub use instance::*;
pub use reference::{Argument, Reference, is_valid_key};
pub use registry::*;

#[cfg(feature = "macros")]
pub use wiring_macros::*;
