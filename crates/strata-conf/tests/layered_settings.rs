//! Integration tests for merging settings from several sources.

use rstest::rstest;
use serial_test::serial;
use std::env;
use strata_conf::{
	DefaultSource, EnvSource, MigratorSettings, SettingsBuilder, SourceError, TomlFileSource,
};
use tempfile::TempDir;

#[test]
#[serial]
fn test_environment_values_are_typed() {
	// Arrange
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("strata.toml");
	std::fs::write(&path, "database_url = \"sqlite::memory:\"\ncommand_timeout = 10\n").unwrap();
	// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::set_var("STRATA_COMMAND_TIMEOUT", "45");
		env::set_var("STRATA_SEED_FOR_TEST", "TRUE");
	}

	// Act
	let settings = MigratorSettings::load(&path);

	// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::remove_var("STRATA_COMMAND_TIMEOUT");
		env::remove_var("STRATA_SEED_FOR_TEST");
	}

	// Assert
	let settings = settings.unwrap();
	assert_eq!(settings.command_timeout, Some(45));
	assert!(settings.seed_for_test);
	assert!(!settings.seed);
}

#[rstest]
#[case("2024")]
#[case("007")]
#[case("true")]
#[serial]
fn test_name_like_environment_values_stay_strings(#[case] context_key: &str) {
	// Arrange
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("strata.toml");
	std::fs::write(&path, "database_url = \"sqlite::memory:\"\n").unwrap();
	// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::set_var("STRATA_CONTEXT_KEY", context_key);
		env::set_var("STRATA_DEFAULT_SCHEMA", "2025");
	}

	// Act
	let settings = MigratorSettings::load(&path);

	// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::remove_var("STRATA_CONTEXT_KEY");
		env::remove_var("STRATA_DEFAULT_SCHEMA");
	}

	// Assert
	let settings = settings.unwrap();
	assert_eq!(settings.context_key, context_key);
	assert_eq!(settings.default_schema, "2025");
}

#[test]
#[serial]
fn test_custom_prefix_feeds_custom_settings_type() {
	#[derive(Debug, serde::Deserialize)]
	struct Reporting {
		schema: String,
		retention_days: i64,
	}

	// Arrange
	// SAFETY: Setting environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::set_var("REPORTING_RETENTION_DAYS", "14");
	}
	let builder = SettingsBuilder::new()
		.add_source(
			DefaultSource::new()
				.with_value("schema", serde_json::json!("reports"))
				.with_value("retention_days", serde_json::json!(7)),
		)
		.add_source(EnvSource::new().with_prefix("REPORTING_"));

	// Act
	let reporting: Result<Reporting, SourceError> = builder.build_into();

	// SAFETY: Removing environment variables is unsafe in multi-threaded programs.
	// This test uses #[serial] to ensure exclusive access to environment variables.
	unsafe {
		env::remove_var("REPORTING_RETENTION_DAYS");
	}

	// Assert
	let reporting = reporting.unwrap();
	assert_eq!(reporting.schema, "reports");
	assert_eq!(reporting.retention_days, 14);
}

#[rstest]
#[case("database_url = [")]
#[case("context_key = \"unterminated")]
#[serial]
fn test_malformed_file_is_a_toml_error(#[case] content: &str) {
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("strata.toml");
	std::fs::write(&path, content).unwrap();

	let result = SettingsBuilder::new()
		.add_source(TomlFileSource::new(&path))
		.build();

	assert!(matches!(result, Err(SourceError::Toml(_))));
}

#[test]
#[serial]
fn test_blank_context_key_is_rejected() {
	let temp_dir = TempDir::new().unwrap();
	let path = temp_dir.path().join("strata.toml");
	std::fs::write(&path, "database_url = \"sqlite::memory:\"\ncontext_key = \"  \"\n").unwrap();

	let result = MigratorSettings::load(&path);

	assert!(matches!(result, Err(SourceError::InvalidSource(message)) if message.contains("context_key")));
}
