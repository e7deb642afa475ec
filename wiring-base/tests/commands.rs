use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::{ArgMatches, Command as ClapCommand};
use serde_json::json;
use tempfile::{NamedTempFile, TempDir};
use wiring::{Instantiable, TypeCatalog, Units};
use wiring_base::{
    Command, CommandRegistry, CompileCommand, CompileOptions, Config, ConfigCommand, Context,
    DEFAULT_CLASS_NAME, DEFAULT_CONFIG_GROUP, DEFAULT_PATH, ensure_writable,
};

#[derive(Instantiable)]
struct DateTime;

#[derive(Instantiable)]
struct Transport {
    host: String,
}

#[derive(Instantiable)]
struct Clock;

struct MockCommand;

impl Command for MockCommand {
    fn command() -> ClapCommand {
        ClapCommand::new("mock").arg(clap::Arg::new("test-arg").long("test-arg"))
    }

    fn main(_context: &Context, matches: &ArgMatches) -> ExitCode {
        if matches.contains_id("test-arg") {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

struct DefaultCommand;

impl Command for DefaultCommand {
    fn command() -> ClapCommand {
        ClapCommand::new("default")
    }
}

fn catalog() -> TypeCatalog {
    TypeCatalog::builder()
        .register::<DateTime>("DateTime")
        .register::<Transport>("Transport")
        .build()
}

fn registry() -> CommandRegistry {
    let mut registry = CommandRegistry::default();
    registry
        .add_command::<CompileCommand>()
        .add_command::<ConfigCommand>();
    registry
}

fn write_config(dir: &Path, name: &str, config: serde_json::Value) -> String {
    let path = dir.join(name);
    fs::write(&path, config.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

fn compile_args<'a>(config: &'a str, output: &'a str, overrides: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec!["app", "-c", config];
    args.extend_from_slice(overrides);
    args.extend(["compile", "--config-group", "services", "--path", output]);
    args
}

#[test]
fn test_command_registry() {
    let mut registry = registry();
    assert_eq!(registry.len(), 2);
    assert!(registry.has_command::<CompileCommand>());
    assert!(!registry.has_command::<MockCommand>());
    registry.add_command::<MockCommand>();
    assert_eq!(registry.len(), 3);

    let cli = registry.build_cli();
    let subcommands: Vec<_> = cli.get_subcommands().map(|s| s.get_name()).collect();
    assert_eq!(subcommands, ["compile", "config", "mock"]);
    assert!(cli.get_arguments().any(|arg| arg.get_id() == "config"));
    assert!(
        cli.get_arguments()
            .any(|arg| arg.get_id() == "config-override")
    );
    assert!(cli.is_subcommand_required_set());
}

#[test]
fn test_compile_options() {
    let matches = CompileCommand::command().get_matches_from(["compile"]);
    let options = CompileOptions::from_matches(&matches);
    assert_eq!(options, CompileOptions::default());
    assert_eq!(options.class_name, DEFAULT_CLASS_NAME);
    assert_eq!(options.path, Path::new(DEFAULT_PATH));
    assert_eq!(options.config_group, DEFAULT_CONFIG_GROUP);

    let matches = CompileCommand::command().get_matches_from([
        "compile",
        "--class-name",
        "AppContainer",
        "--path",
        "gen/services.rs",
        "--config-group",
        "services",
    ]);
    let options = CompileOptions::from_matches(&matches);
    assert_eq!(options.class_name, "AppContainer");
    assert_eq!(options.path, Path::new("gen/services.rs"));
    assert_eq!(options.config_group, "services");
}

#[test]
fn test_compile_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "config.json",
        json!({
            "email": {"host": "localhost"},
            "dependencies": {
                "date": {"settings": {"class": "DateTime"}},
                "swift": {
                    "transport": {
                        "settings": {"class": "Transport", "arguments": ["@email.host@"]},
                    },
                },
            },
        }),
    );
    let output = dir.path().join("src/generated/container.rs");
    let exit_code = registry().run_main(
        catalog(),
        [
            "app",
            "-c",
            config.as_str(),
            "compile",
            "--class-name",
            "AppContainer",
            "--path",
            output.to_str().unwrap(),
        ],
    );
    assert_eq!(exit_code, ExitCode::SUCCESS);
    let source = fs::read_to_string(&output).unwrap();
    assert!(source.contains("pub struct AppContainer"));
    assert!(source.contains("pub fn get_date("));
    assert!(source.contains("pub fn get_swift_transport("));
    assert!(source.contains("::wiring::Result<Arc<crate::DateTime>>"));
    assert!(source.contains("self.base.get_as::<crate::Transport>(\"swift.transport\")"));
}

#[test]
fn test_compile_with_override() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "config.json",
        json!({
            "services": {
                "date": {"settings": {"class": "DateTime"}},
                "transport": {"settings": {"class": "Transport", "arguments": []}},
            },
        }),
    );
    let fix = write_config(
        dir.path(),
        "override.json",
        json!({
            "services": {
                "transport": {"settings": {"arguments": ["localhost"]}},
            },
        }),
    );
    let output = dir.path().join("container.rs");
    let output = output.to_str().unwrap();
    // Transport misses its host until the override appends it.
    assert_eq!(
        registry().run_main(catalog(), compile_args(&config, output, &[])),
        ExitCode::FAILURE
    );
    assert_eq!(
        registry().run_main(catalog(), compile_args(&config, output, &["-o", fix.as_str()])),
        ExitCode::SUCCESS
    );
}

#[test]
fn test_compile_failures() {
    let dir = TempDir::new().unwrap();
    let context = Context::new(
        Config::new().with(
            "dependencies",
            json!({
                "date": {"settings": {"class": "DateTime"}},
                "clock": {"settings": {"class": "Clock", "path": "vendor/clock"}},
            }),
        ),
        catalog(),
    );
    let options = CompileOptions {
        path: dir.path().join("container.rs"),
        ..Default::default()
    };
    // No loader knows "vendor/clock".
    assert_eq!(CompileCommand::run(&context, &options), ExitCode::FAILURE);
    assert!(options.path.exists());

    let missing_group = CompileOptions {
        config_group: "services".into(),
        ..options.clone()
    };
    assert_eq!(
        CompileCommand::run(&context, &missing_group),
        ExitCode::FAILURE
    );

    let file = NamedTempFile::new().unwrap();
    let unwritable = CompileOptions {
        path: file.path().join("container.rs"),
        ..options.clone()
    };
    assert_eq!(CompileCommand::run(&context, &unwritable), ExitCode::FAILURE);
}

#[test]
fn test_compile_with_loader() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "config.json",
        json!({
            "dependencies": {
                "clock": {"settings": {"class": "Clock", "path": "vendor/clock"}},
            },
        }),
    );
    let output = dir.path().join("container.rs");
    let mut units = Units::new();
    units.add("vendor/clock", || {
        TypeCatalog::builder().register::<Clock>("Clock").build()
    });
    let mut registry = registry();
    registry.loader(units);
    let exit_code = registry.run_main(
        catalog(),
        ["app", "-c", config.as_str(), "compile", "--path", output.to_str().unwrap()],
    );
    assert_eq!(exit_code, ExitCode::SUCCESS);
}

#[test]
fn test_missing_config_file() {
    let exit_code = registry().run_main(
        catalog(),
        ["app", "-c", "/nonexistent/config.json", "config"],
    );
    assert_eq!(exit_code, ExitCode::FAILURE);
    let exit_code = registry().run_main(catalog(), ["app", "config"]);
    assert_eq!(exit_code, ExitCode::FAILURE);
}

#[test]
fn test_run_command() {
    let mut registry = registry();
    registry
        .add_command::<MockCommand>()
        .add_command::<DefaultCommand>();
    let cli = registry.build_cli();
    let context = Context::new(Config::new().with("app_name", "test_app"), catalog());
    let run = |args: &[&str]| {
        let matches = cli.clone().get_matches_from(args);
        registry.run_command(&context, &matches)
    };
    assert_eq!(run(&["app", "-c", "x", "config"]), ExitCode::SUCCESS);
    assert_eq!(
        run(&["app", "-c", "x", "mock", "--test-arg", "1"]),
        ExitCode::SUCCESS
    );
    assert_eq!(run(&["app", "-c", "x", "mock"]), ExitCode::FAILURE);
    // Default implementation returns FAILURE
    assert_eq!(run(&["app", "-c", "x", "default"]), ExitCode::FAILURE);
}

#[test]
fn test_ensure_writable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a/b/container.rs");
    ensure_writable(&path).unwrap();
    assert!(path.exists());
    let file = NamedTempFile::new().unwrap();
    assert!(ensure_writable(&file.path().join("container.rs")).is_err());
}
