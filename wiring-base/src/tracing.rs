use std::str::FromStr as _;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use wiring::StdError;

use crate::{Config, ConfigSection};

/// Installs the global `tracing` subscriber.
pub struct Tracing;

impl Tracing {
    /// Initializes tracing from the `tracing` section of `config`.
    ///
    /// Does nothing when the section is absent. Returns an error if a
    /// directive cannot be parsed or a global subscriber is already set.
    pub fn init(config: &Config) -> Result<(), StdError> {
        let config = match config.get::<Option<TracingConfig>>(TracingConfig::key())? {
            Some(v) => v,
            None => return Ok(()),
        };
        Self::init_with(&config)
    }

    pub fn init_with(config: &TracingConfig) -> Result<(), StdError> {
        let filter = config.env_filter()?;
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr))
            .try_init()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(
        serialize_with = "serialize_level",
        deserialize_with = "deserialize_level",
        default = "default_level"
    )]
    pub level: tracing::Level,
    #[serde(default)]
    pub directives: Vec<String>,
}

impl TracingConfig {
    /// Builds the filter: every directive plus the default level.
    pub fn env_filter(&self) -> Result<EnvFilter, StdError> {
        let mut directives = Vec::new();
        for directive in &self.directives {
            directives.push(directive.parse::<Directive>().map_err(Box::new)?);
        }
        Ok(new_env_filter(directives, self.level))
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directives: Default::default(),
        }
    }
}

impl ConfigSection for TracingConfig {
    fn key() -> &'static str {
        "tracing"
    }
}

fn new_env_filter(directives: Vec<Directive>, level: tracing::Level) -> EnvFilter {
    let mut filter = EnvFilter::default();
    for directive in directives {
        filter = filter.add_directive(directive);
    }
    filter.add_directive(level.into())
}

fn serialize_level<S>(v: &tracing::Level, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(v.as_str())
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    String::deserialize(deserializer)
        .and_then(|v| tracing::Level::from_str(&v).map_err(|v| Error::custom(format!("{v}"))))
}

fn default_level() -> tracing::Level {
    tracing::Level::INFO
}
