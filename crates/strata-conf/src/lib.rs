//! # Strata Configuration
//!
//! Layered settings for the Strata migrator.
//!
//! Values come from several sources merged by priority: built-in defaults,
//! then a TOML file, then `STRATA_`-prefixed environment variables. The merged
//! map is deserialized into [`MigratorSettings`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata_conf::MigratorSettings;
//!
//! let settings = MigratorSettings::load("strata.toml")?;
//! println!("migrating {}", settings.context_key);
//! # Ok::<(), strata_conf::SourceError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`settings`]: Settings type, sources and the merging builder

pub mod settings;

pub use settings::MigratorSettings;
pub use settings::builder::SettingsBuilder;
pub use settings::sources::{
	ConfigSource, DefaultSource, EnvSource, SourceError, TomlFileSource,
};
