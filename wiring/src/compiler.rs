//! Typed accessor generation and build-time validation.
//!
//! The compiler turns the keys of a [`Registry`](crate::Registry) into a Rust
//! source file holding one struct with a typed getter per service. The file
//! is meant to be checked in and built with the rest of the application;
//! [`Compiler::compile`] also runs every getter against a throwaway container
//! so misconfigured services are reported before the artifact ships.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::definition::is_valid_identifier;
use crate::{Container, Error, Result, ReturnType, TypeEntry, ValidationEntry};

/// Marker rendered for accessors whose type is only known at runtime.
pub const MIXED: &str = "mixed";

/// Name of the base container type.
pub const BASE_CONTAINER_NAME: &str = "Container";

/// Prefix of every generated accessor.
pub const ACCESSOR_PREFIX: &str = "get_";

const HEADER: &str = "\
// Auto-generated from your services configuration.
// [!!] Changes will be overwritten.
";

/// Declared return type of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Concrete(ReturnType),
    Mixed,
}

impl ServiceType {
    /// Path of the type as spelled in generated source.
    pub fn rust_path(&self) -> String {
        match self {
            ServiceType::Concrete(v) => source_path(v.rust_path, v.local_crate),
            ServiceType::Mixed => MIXED.to_owned(),
        }
    }
}

/// Rewrites a `std::any::type_name` spelling into a path that resolves
/// inside the crate including the generated file.
///
/// The leading segment of every path naming `local_crate` becomes `crate`
/// and the `alloc` and `core` roots become `std`.
pub fn source_path(type_name: &str, local_crate: Option<&str>) -> String {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = String::with_capacity(type_name.len());
    let mut rest = type_name;
    while let Some(start) = rest.find(is_ident) {
        let (before, tail) = rest.split_at(start);
        out.push_str(before);
        let end = tail.find(|c: char| !is_ident(c)).unwrap_or(tail.len());
        let (segment, after) = tail.split_at(end);
        let is_root = !out.ends_with("::") && after.starts_with("::");
        match segment {
            "alloc" | "core" if is_root => out.push_str("std"),
            _ if is_root && Some(segment) == local_crate => out.push_str("crate"),
            _ => out.push_str(segment),
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// One generated getter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub method_name: String,
    pub key: String,
    pub service_type: ServiceType,
}

/// Accessors in key order, plus keys that could not become one.
#[derive(Debug, Default)]
pub struct Plan {
    pub accessors: Vec<Accessor>,
    pub errors: Vec<ValidationEntry>,
}

/// Derives the accessor name of a service key.
pub fn accessor_name(key: &str) -> String {
    let mut name = String::with_capacity(ACCESSOR_PREFIX.len() + key.len());
    name.push_str(ACCESSOR_PREFIX);
    name.extend(
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }),
    );
    name
}

pub struct Compiler {
    container: Container,
}

impl Compiler {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Infers the return type of every registry key.
    ///
    /// Units needed for inference are loaded into a fork, never into the
    /// container handed to [`Compiler::new`].
    pub fn plan(&self) -> Plan {
        let container = self.container.fork();
        let mut plan = Plan::default();
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for key in self.container.definitions().keys() {
            let definition = match self.container.definitions().resolve(key) {
                Ok(v) => v,
                Err(err) => {
                    plan.errors.push(ValidationEntry::new(key, err.to_string()));
                    continue;
                }
            };
            let method_name = accessor_name(key);
            if let Some(other) = names.get(&method_name) {
                plan.errors.push(ValidationEntry::new(
                    key,
                    format!("accessor `{method_name}` is already generated for {other:?}"),
                ));
                continue;
            }
            names.insert(method_name.clone(), key.to_owned());
            // Unknown classes degrade to mixed; validation reports them.
            let service_type = match container.type_entry(&definition) {
                Ok(entry) => match definition.constructor() {
                    None => ServiceType::Concrete(entry.return_type()),
                    Some(name) => entry
                        .factory_return_type(name)
                        .map_or(ServiceType::Mixed, |v| {
                            ServiceType::Concrete(registered_path(&container, v, &entry))
                        }),
                },
                Err(_) => ServiceType::Mixed,
            };
            plan.accessors.push(Accessor {
                method_name,
                key: key.to_owned(),
                service_type,
            });
        }
        plan
    }

    /// Renders the accessor struct named `class_name`.
    pub fn render(&self, class_name: &str) -> Result<String> {
        validate_class_name(class_name)?;
        Ok(render_plan(class_name, &self.plan()))
    }

    /// Calls every accessor on a fresh container and collects what fails.
    pub fn validate(&self) -> Vec<ValidationEntry> {
        let plan = self.plan();
        let mut errors = plan.errors;
        errors.extend(self.check(&plan.accessors));
        errors.sort_by(|a, b| a.key.cmp(&b.key));
        errors
    }

    /// Writes the accessor struct to `path`, then validates every accessor.
    pub fn compile(&self, class_name: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        validate_class_name(class_name)?;
        let plan = self.plan();
        tracing::info!(
            class_name,
            path = %path.display(),
            accessors = plan.accessors.len(),
            "Compiling services"
        );
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        fs::write(path, render_plan(class_name, &plan)).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut errors = plan.errors;
        errors.extend(self.check(&plan.accessors));
        if !errors.is_empty() {
            errors.sort_by(|a, b| a.key.cmp(&b.key));
            for entry in &errors {
                tracing::warn!(key = %entry.key, reason = %entry.reason, "Invalid service");
            }
            return Err(Error::InvalidConfiguration { entries: errors });
        }
        tracing::info!(path = %path.display(), "Services compiled");
        Ok(())
    }

    fn check(&self, accessors: &[Accessor]) -> Vec<ValidationEntry> {
        let container = self.container.fork();
        let mut errors = Vec::new();
        for accessor in accessors {
            let instance = match container.get(&accessor.key) {
                Ok(v) => v,
                Err(err) => {
                    errors.push(ValidationEntry::new(&accessor.key, err.to_string()));
                    continue;
                }
            };
            if let ServiceType::Concrete(expected) = accessor.service_type
                && instance.type_id() != expected.type_id
            {
                errors.push(ValidationEntry::new(
                    &accessor.key,
                    format!(
                        "expected instance of {}, got {}",
                        accessor.service_type.rust_path(),
                        instance.type_name()
                    ),
                ));
            }
        }
        errors
    }
}

/// Prefers the path registered in the catalog for a returned type. An
/// unregistered type is assumed to live next to the factory's owner.
fn registered_path(container: &Container, returns: ReturnType, owner: &TypeEntry) -> ReturnType {
    container
        .find_type_id(returns.type_id)
        .map_or_else(
            || ReturnType {
                local_crate: owner.local_crate(),
                ..returns
            },
            |entry| entry.return_type(),
        )
}

fn validate_class_name(class_name: &str) -> Result<()> {
    if !is_valid_identifier(class_name) {
        return Err(Error::InvalidKey {
            key: class_name.to_owned(),
            reason: "generated class name must be an identifier",
        });
    }
    Ok(())
}

fn render_plan(class_name: &str, plan: &Plan) -> String {
    // A struct named like the base cannot import it.
    let base = if class_name == BASE_CONTAINER_NAME {
        "::wiring::Container"
    } else {
        BASE_CONTAINER_NAME
    };
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str("use std::ops::Deref;\n");
    out.push_str("use std::sync::Arc;\n");
    if class_name != BASE_CONTAINER_NAME {
        out.push_str("\nuse wiring::Container;\n");
    }
    let _ = write!(
        out,
        "\npub struct {class_name} {{\n    base: {base},\n}}\n\n\
         impl {class_name} {{\n    \
         pub fn new(base: {base}) -> Self {{\n        Self {{ base }}\n    }}\n"
    );
    for accessor in &plan.accessors {
        let key = &accessor.key;
        let name = &accessor.method_name;
        out.push('\n');
        let _ = match accessor.service_type {
            ServiceType::Concrete(_) => write!(
                out,
                "    pub fn {name}(&self) -> ::wiring::Result<Arc<{path}>> {{\n        \
                 self.base.get_as::<{path}>({key:?})\n    }}\n",
                path = accessor.service_type.rust_path(),
            ),
            ServiceType::Mixed => write!(
                out,
                "    /// Returns {MIXED}: the service type is only known at runtime.\n    \
                 pub fn {name}(&self) -> ::wiring::Result<::wiring::Instance> {{\n        \
                 self.base.get({key:?})\n    }}\n",
            ),
        };
    }
    let _ = write!(
        out,
        "}}\n\nimpl Deref for {class_name} {{\n    type Target = {base};\n\n    \
         fn deref(&self) -> &{base} {{\n        &self.base\n    }}\n}}\n"
    );
    out
}
