//! # wiring-base
//!
//! Base functionality for wiring applications: configuration files, tracing
//! setup and the command-line build step that compiles service definitions
//! into typed accessors.
//!
//! ## Core Components
//!
//! - **Configuration System**: JSON configuration groups loaded from files and deep-merged
//! - **Command System**: CLI framework with the `compile` and `config` subcommands
//! - **Tracing Integration**: Structured logging configured from the `tracing` group
//!
//! ## Configuration Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use wiring::ConfigSource as _;
//! use wiring_base::Config;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct EmailConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let config = Config::new().with(
//!     "email",
//!     EmailConfig {
//!         host: "localhost".to_string(),
//!         port: 25,
//!     },
//! );
//!
//! let email = config.get::<EmailConfig>("email").unwrap();
//! assert_eq!(email.port, 25);
//! assert_eq!(config.load_group("email").unwrap()["host"], "localhost");
//! ```

mod command;
mod config;
mod tracing;

pub use command::*;
pub use config::*;
pub use tracing::*;
