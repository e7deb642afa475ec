//! Command-line interface for wiring build steps.
//!
//! Commands are subcommands of one CLI sharing the `--config` and
//! `--config-override` flags. The CLI loads and merges the configuration
//! files, sets up tracing and then runs the selected command with a
//! [`Context`] holding the configuration and the application's type catalog.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::process::ExitCode;
//!
//! use wiring::TypeCatalog;
//! use wiring_base::{CommandRegistry, CompileCommand};
//!
//! fn main() -> ExitCode {
//!     let mut commands = CommandRegistry::default();
//!     commands.add_command::<CompileCommand>();
//!     commands.run_main(TypeCatalog::default(), std::env::args_os())
//! }
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches};
use wiring::{Compiler, Container, StdError, TypeCatalog, UnitLoader};

use crate::{Config, ContainerConfig, Tracing};

/// Default name of the generated accessor struct.
pub const DEFAULT_CLASS_NAME: &str = "Container";
/// Default output path of the generated accessor struct.
pub const DEFAULT_PATH: &str = "src/container.rs";
/// Default configuration group holding service definitions.
pub const DEFAULT_CONFIG_GROUP: &str = "dependencies";

/// Everything a command can use.
pub struct Context {
    pub config: Config,
    pub catalog: Arc<TypeCatalog>,
    pub loader: Option<Arc<dyn UnitLoader>>,
}

impl Context {
    pub fn new(config: Config, catalog: TypeCatalog) -> Self {
        Self {
            config,
            catalog: Arc::new(catalog),
            loader: None,
        }
    }

    /// Builds a container over the definitions stored in `group`.
    ///
    /// The configuration itself answers `@group.path@` references and its
    /// `container` section bounds the reference depth.
    pub fn container(&self, group: &str) -> Result<Container, StdError> {
        let registry = self.config.registry(group)?;
        let settings = self.config.section::<ContainerConfig>()?;
        let mut builder = Container::builder();
        builder
            .definitions(registry)
            .shared_catalog(self.catalog.clone())
            .config(self.config.clone())
            .max_depth(settings.max_depth);
        if let Some(loader) = &self.loader {
            builder.loader(SharedLoader(loader.clone()));
        }
        Ok(builder.build())
    }
}

struct SharedLoader(Arc<dyn UnitLoader>);

impl UnitLoader for SharedLoader {
    fn load_unit(&self, logical_path: &str) -> Option<TypeCatalog> {
        self.0.load_unit(logical_path)
    }
}

/// A CLI subcommand.
pub trait Command {
    fn command() -> clap::Command
    where
        Self: Sized;

    fn main(context: &Context, matches: &ArgMatches) -> ExitCode
    where
        Self: Sized,
    {
        let _ = (context, matches);
        ExitCode::FAILURE
    }
}

trait DynCommand {
    fn command(&self) -> clap::Command;

    fn main(&self, context: &Context, matches: &ArgMatches) -> ExitCode;
}

struct CommandWrapper<T>(PhantomData<fn() -> T>);

impl<T> DynCommand for CommandWrapper<T>
where
    T: Command,
{
    fn command(&self) -> clap::Command {
        T::command()
    }

    fn main(&self, context: &Context, matches: &ArgMatches) -> ExitCode {
        T::main(context, matches)
    }
}

/// Registered subcommands.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<TypeId, Box<dyn DynCommand>>,
    loader: Option<Arc<dyn UnitLoader>>,
}

impl CommandRegistry {
    pub fn add_command<T>(&mut self) -> &mut Self
    where
        T: Command + 'static,
    {
        let type_id = TypeId::of::<T>();
        self.commands
            .insert(type_id, Box::new(CommandWrapper::<T>(PhantomData)));
        self
    }

    pub fn has_command<T>(&self) -> bool
    where
        T: Command + 'static,
    {
        let type_id = TypeId::of::<T>();
        self.commands.contains_key(&type_id)
    }

    /// Sets the loader used for units named by definition paths.
    pub fn loader<L>(&mut self, loader: L) -> &mut Self
    where
        L: UnitLoader + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn build_cli(&self) -> clap::Command {
        let mut cli = clap::Command::default()
            .subcommand_required(true)
            .arg(Arg::new("config").long("config").short('c').required(true))
            .arg(
                Arg::new("config-override")
                    .long("config-override")
                    .short('o')
                    .action(ArgAction::Append),
            );
        let mut subcommands: Vec<_> = self.commands.values().map(|v| v.command()).collect();
        subcommands.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        for subcmd in subcommands {
            cli = cli.subcommand(subcmd);
        }
        cli
    }

    /// Parses `args`, loads the configuration and runs the chosen command.
    pub fn run_main<I, T>(&self, catalog: TypeCatalog, args: I) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.build_cli().try_get_matches_from(args) {
            Ok(v) => v,
            Err(err) => {
                let _ = err.print();
                return if err.use_stderr() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                };
            }
        };
        let config = match load_config(&matches) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("Cannot load config: {err}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = Tracing::init(&config) {
            eprintln!("Cannot setup tracing: {err}");
            return ExitCode::FAILURE;
        }
        let mut context = Context::new(config, catalog);
        context.loader = self.loader.clone();
        self.run_command(&context, &matches)
    }

    /// Runs the subcommand selected in `matches`.
    pub fn run_command(&self, context: &Context, matches: &ArgMatches) -> ExitCode {
        let Some((name, matches)) = matches.subcommand() else {
            eprintln!("No command given");
            return ExitCode::FAILURE;
        };
        match self
            .commands
            .values()
            .find(|v| v.command().get_name() == name)
        {
            Some(command) => command.main(context, matches),
            None => {
                eprintln!("Unknown command {name:?}");
                ExitCode::FAILURE
            }
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config, StdError> {
    let path = matches
        .get_one::<String>("config")
        .ok_or("--config is required")?;
    let mut config = Config::parse_file(path)?;
    let overrides = matches
        .get_many::<String>("config-override")
        .unwrap_or_default();
    for path in overrides {
        config.merge_from(Config::parse_file(path)?)?;
    }
    Ok(config)
}

/// Options of [`CompileCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub class_name: String,
    pub path: PathBuf,
    pub config_group: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            class_name: DEFAULT_CLASS_NAME.into(),
            path: DEFAULT_PATH.into(),
            config_group: DEFAULT_CONFIG_GROUP.into(),
        }
    }
}

impl CompileOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();
        Self {
            class_name: matches
                .get_one::<String>("class-name")
                .cloned()
                .unwrap_or(defaults.class_name),
            path: matches
                .get_one::<String>("path")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            config_group: matches
                .get_one::<String>("config-group")
                .cloned()
                .unwrap_or(defaults.config_group),
        }
    }
}

/// Generates the typed accessor struct and validates every service.
pub struct CompileCommand;

impl CompileCommand {
    /// Runs the compilation, printing progress to stdout and failures to
    /// stderr.
    pub fn run(context: &Context, options: &CompileOptions) -> ExitCode {
        println!("Loading dependency list from config");
        let container = match context.container(&options.config_group) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("Cannot load dependencies: {err}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = ensure_writable(&options.path) {
            eprintln!("Path {} is not writable: {err}", options.path.display());
            return ExitCode::FAILURE;
        }
        println!(
            "Compiling dependencies to {} in {}",
            options.class_name,
            options.path.display()
        );
        if let Err(err) = Compiler::new(container).compile(&options.class_name, &options.path) {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
        println!("Done");
        ExitCode::SUCCESS
    }
}

impl Command for CompileCommand {
    fn command() -> clap::Command {
        clap::Command::new("compile")
            .about("Generates typed service accessors and validates every service")
            .arg(
                Arg::new("class-name")
                    .long("class-name")
                    .default_value(DEFAULT_CLASS_NAME),
            )
            .arg(Arg::new("path").long("path").default_value(DEFAULT_PATH))
            .arg(
                Arg::new("config-group")
                    .long("config-group")
                    .default_value(DEFAULT_CONFIG_GROUP),
            )
    }

    fn main(context: &Context, matches: &ArgMatches) -> ExitCode {
        Self::run(context, &CompileOptions::from_matches(matches))
    }
}

/// Prints the merged configuration.
pub struct ConfigCommand;

impl Command for ConfigCommand {
    fn command() -> clap::Command {
        clap::Command::new("config")
    }

    fn main(context: &Context, _matches: &ArgMatches) -> ExitCode {
        match serde_json::to_string_pretty(&context.config.configs) {
            Ok(v) => {
                println!("{v}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("Cannot print config: {err}");
                ExitCode::FAILURE
            }
        }
    }
}

/// Creates the parent directories of `path` and checks the file can be
/// opened for writing.
pub fn ensure_writable(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
}
