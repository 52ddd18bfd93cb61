//! Configuration sources for layered migrator settings
//!
//! Sources are merged in priority order (environment variables > config file
//! > defaults).

use indexmap::IndexMap;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Prefix of environment variables read by [`EnvSource::default`]
pub const ENV_PREFIX: &str = "STRATA_";

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync {
	/// Load configuration from this source
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError>;

	/// Priority of this source (higher wins)
	fn priority(&self) -> u8;

	fn description(&self) -> String;
}

/// Error type for configuration sources
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Parse error: {0}")]
	Parse(String),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Invalid source: {0}")]
	InvalidSource(String),
}

/// Environment variable configuration source
///
/// Keys lose the prefix and are lowercased, so `STRATA_CONTEXT_KEY` becomes
/// `context_key`. Integer and boolean values are parsed, except for keys
/// registered with [`with_string_keys`](Self::with_string_keys).
#[derive(Debug, Clone)]
pub struct EnvSource {
	prefix: Option<String>,
	string_keys: Vec<String>,
}

impl EnvSource {
	/// Source reading every environment variable
	pub fn new() -> Self {
		Self {
			prefix: None,
			string_keys: Vec::new(),
		}
	}

	/// Keep the values of these (lowercased, unprefixed) keys verbatim
	///
	/// # Examples
	///
	/// ```
	/// use strata_conf::EnvSource;
	///
	/// // STRATA_CONTEXT_KEY=2024 stays the string "2024"
	/// let source = EnvSource::default().with_string_keys(&["context_key"]);
	/// ```
	pub fn with_string_keys(mut self, keys: &[&str]) -> Self {
		self.string_keys
			.extend(keys.iter().map(|key| key.to_lowercase()));
		self
	}

	/// Only read variables starting with `prefix`
	///
	/// # Examples
	///
	/// ```
	/// use strata_conf::EnvSource;
	///
	/// let source = EnvSource::new().with_prefix("GOODS_");
	/// ```
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = Some(prefix.into());
		self
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new().with_prefix(ENV_PREFIX)
	}
}

impl ConfigSource for EnvSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		let mut config = IndexMap::new();

		for (key, value) in std::env::vars() {
			let clean_key = match &self.prefix {
				Some(prefix) => match key.strip_prefix(prefix.as_str()) {
					Some(stripped) => stripped.to_string(),
					None => continue,
				},
				None => key.clone(),
			};

			let lower_key = clean_key.to_lowercase();

			let parsed_value = if self.string_keys.contains(&lower_key) {
				Value::String(value)
			} else if let Ok(num) = value.parse::<i64>() {
				Value::Number(num.into())
			} else if let Ok(b) = value.trim().to_lowercase().parse::<bool>() {
				Value::Bool(b)
			} else {
				Value::String(value)
			};

			config.insert(lower_key, parsed_value);
		}

		Ok(config)
	}

	fn priority(&self) -> u8 {
		100
	}

	fn description(&self) -> String {
		match &self.prefix {
			Some(prefix) => format!("Environment variables (prefix: {})", prefix),
			None => "Environment variables".to_string(),
		}
	}
}

/// TOML file configuration source; a missing file contributes nothing
#[derive(Debug, Clone)]
pub struct TomlFileSource {
	path: PathBuf,
}

impl TomlFileSource {
	/// # Examples
	///
	/// ```
	/// use strata_conf::TomlFileSource;
	///
	/// let source = TomlFileSource::new("strata.toml");
	/// ```
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlFileSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		if !self.path.exists() {
			return Ok(IndexMap::new());
		}

		let content = fs::read_to_string(&self.path)?;
		let toml_value: toml::Value = toml::from_str(&content)?;
		let json_value = serde_json::to_value(&toml_value)?;

		let map = json_value
			.as_object()
			.ok_or_else(|| SourceError::Parse("Expected table at root".to_string()))?;

		Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
	}

	fn priority(&self) -> u8 {
		50
	}

	fn description(&self) -> String {
		format!("TOML file: {}", self.path.display())
	}
}

/// Default values configuration source
#[derive(Debug, Clone, Default)]
pub struct DefaultSource {
	values: IndexMap<String, Value>,
}

impl DefaultSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// # Examples
	///
	/// ```
	/// use serde_json::Value;
	/// use strata_conf::DefaultSource;
	///
	/// let source = DefaultSource::new().with_value("seed", Value::Bool(false));
	/// ```
	pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
		self.values.insert(key.into(), value);
		self
	}
}

impl ConfigSource for DefaultSource {
	fn load(&self) -> Result<IndexMap<String, Value>, SourceError> {
		Ok(self.values.clone())
	}

	fn priority(&self) -> u8 {
		0
	}

	fn description(&self) -> String {
		"Default values".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serial_test::serial;
	use std::env;
	use std::fs::File;
	use std::io::Write;
	use tempfile::TempDir;

	#[test]
	#[serial]
	fn test_env_source_strips_prefix_and_parses_values() {
		// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::set_var("STRATA_CONTEXT_KEY", "goods");
			env::set_var("STRATA_COMMAND_TIMEOUT", "30");
			env::set_var("STRATA_SEED", "TRUE");
		}

		let config = EnvSource::default().load().unwrap();

		assert_eq!(config.get("context_key"), Some(&Value::String("goods".to_string())));
		assert_eq!(config.get("command_timeout"), Some(&Value::Number(30.into())));
		assert_eq!(config.get("seed"), Some(&Value::Bool(true)));

		// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::remove_var("STRATA_CONTEXT_KEY");
			env::remove_var("STRATA_COMMAND_TIMEOUT");
			env::remove_var("STRATA_SEED");
		}
	}

	#[test]
	#[serial]
	fn test_string_keys_are_not_parsed() {
		// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::set_var("STRATA_CONTEXT_KEY", "007");
			env::set_var("STRATA_HISTORY_TABLE", "true");
			env::set_var("STRATA_COMMAND_TIMEOUT", "30");
		}

		let config = EnvSource::default()
			.with_string_keys(&["CONTEXT_KEY", "history_table"])
			.load()
			.unwrap();

		assert_eq!(config.get("context_key"), Some(&Value::String("007".to_string())));
		assert_eq!(config.get("history_table"), Some(&Value::String("true".to_string())));
		assert_eq!(config.get("command_timeout"), Some(&Value::Number(30.into())));

		// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::remove_var("STRATA_CONTEXT_KEY");
			env::remove_var("STRATA_HISTORY_TABLE");
			env::remove_var("STRATA_COMMAND_TIMEOUT");
		}
	}

	#[test]
	#[serial]
	fn test_env_source_ignores_other_prefixes() {
		// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::set_var("OTHER_CONTEXT_KEY", "ignored");
		}

		let config = EnvSource::default().load().unwrap();

		assert!(!config.contains_key("other_context_key"));
		assert!(!config.contains_key("context_key"));

		// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
		// This test uses #[serial] to ensure exclusive access to environment variables.
		unsafe {
			env::remove_var("OTHER_CONTEXT_KEY");
		}
	}

	#[test]
	fn test_toml_source() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("strata.toml");

		let mut file = File::create(&config_path).unwrap();
		writeln!(
			file,
			r#"
database_url = "postgres://localhost/goods"
seed_for_test = true
        "#
		)
		.unwrap();

		let config = TomlFileSource::new(&config_path).load().unwrap();

		assert_eq!(
			config.get("database_url").unwrap(),
			&Value::String("postgres://localhost/goods".to_string())
		);
		assert_eq!(config.get("seed_for_test").unwrap(), &Value::Bool(true));
	}

	#[test]
	fn test_missing_toml_file_is_empty() {
		let temp_dir = TempDir::new().unwrap();

		let config = TomlFileSource::new(temp_dir.path().join("absent.toml"))
			.load()
			.unwrap();

		assert!(config.is_empty());
	}

	#[test]
	fn test_malformed_toml_is_an_error() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("strata.toml");
		std::fs::write(&config_path, "database_url = ").unwrap();

		let result = TomlFileSource::new(&config_path).load();

		assert!(matches!(result, Err(SourceError::Toml(_))));
	}

	#[test]
	fn test_source_priority() {
		assert_eq!(EnvSource::new().priority(), 100);
		assert_eq!(TomlFileSource::new("strata.toml").priority(), 50);
		assert_eq!(DefaultSource::new().priority(), 0);
	}
}
