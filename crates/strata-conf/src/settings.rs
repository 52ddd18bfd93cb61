//! Migrator settings and the sources they are loaded from

pub mod builder;
pub mod sources;

use builder::SettingsBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sources::{DefaultSource, EnvSource, SourceError, TomlFileSource};
use std::path::Path;

/// Default command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 90;

/// Settings whose environment values are never parsed as numbers or booleans
const STRING_SETTINGS: [&str; 4] = ["database_url", "context_key", "default_schema", "history_table"];

/// Everything the migrator needs to reach and track one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorSettings {
	pub database_url: String,
	/// Discriminates history rows of independent migration sets sharing a database
	pub context_key: String,
	pub default_schema: String,
	pub history_table: String,
	/// Seconds per database command; `None` or `0` waits indefinitely
	pub command_timeout: Option<u64>,
	pub seed: bool,
	pub seed_for_test: bool,
	/// Create a missing database before upgrading
	pub create_database: bool,
}

impl Default for MigratorSettings {
	fn default() -> Self {
		Self {
			database_url: String::new(),
			context_key: "strata".to_string(),
			default_schema: "dbo".to_string(),
			history_table: "Migration".to_string(),
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
			seed: false,
			seed_for_test: false,
			create_database: true,
		}
	}
}

impl MigratorSettings {
	/// Defaults, overridden by the TOML file at `path`, overridden by `STRATA_*`
	/// environment variables
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
		let settings: Self = SettingsBuilder::new()
			.add_source(Self::defaults())
			.add_source(TomlFileSource::new(path.as_ref()))
			.add_source(Self::env_source())
			.build_into()?;
		settings.validate()?;
		Ok(settings)
	}

	/// `STRATA_*` variables, with the name-like settings kept as strings
	///
	/// A numeric context key or schema name must not be read as a number.
	pub fn env_source() -> EnvSource {
		EnvSource::default().with_string_keys(&STRING_SETTINGS)
	}

	/// The defaults as a source, for custom source stacks
	pub fn defaults() -> DefaultSource {
		let defaults = Self::default();
		DefaultSource::new()
			.with_value("context_key", Value::String(defaults.context_key))
			.with_value("default_schema", Value::String(defaults.default_schema))
			.with_value("history_table", Value::String(defaults.history_table))
			.with_value("command_timeout", Value::from(defaults.command_timeout))
			.with_value("seed", Value::Bool(defaults.seed))
			.with_value("seed_for_test", Value::Bool(defaults.seed_for_test))
			.with_value("create_database", Value::Bool(defaults.create_database))
	}

	pub fn validate(&self) -> Result<(), SourceError> {
		if self.database_url.trim().is_empty() {
			return Err(SourceError::InvalidSource(
				"database_url must be set".to_string(),
			));
		}
		if self.context_key.trim().is_empty() {
			return Err(SourceError::InvalidSource(
				"context_key must not be empty".to_string(),
			));
		}
		Ok(())
	}

	/// Timeout to apply, with `0` meaning none
	pub fn effective_command_timeout(&self) -> Option<u64> {
		self.command_timeout.filter(|seconds| *seconds > 0)
	}
}
