//! # Migration Manager
//!
//! Runs one migrator command (upgrade, downgrade, check, recreate, drop or
//! info) against a configured engine. Parsing command lines into a
//! [`ManagerAction`] is left to the caller.

use crate::catalog::MigrationCatalog;
use crate::dialect::SqlDialect;
use crate::checker::{CheckReport, MigrationChecker, MigrationSelector, resolve_target};
use crate::engine::{ExecutionResult, MigrationEngine};
use crate::executor::any::{SqlxDatabaseAdmin, SqlxExecutor};
use crate::generator::generator_for;
use crate::history::{HistoryTable, SqlHistoryStore};
use crate::schema::IntrospectingSchemaProvider;
use crate::{MigrationError, Result};
use std::fmt;
use std::sync::Arc;
use strata_conf::MigratorSettings;

/// One migrator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerAction {
	Upgrade(MigrationSelector),
	Downgrade(MigrationSelector),
	Check(MigrationSelector),
	/// Delete the database if it exists, then upgrade
	Recreate(MigrationSelector),
	/// Delete the database if it exists
	Drop,
	/// List local and installed migrations
	Info,
}

/// What a command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerOutcome {
	Upgraded {
		target: Option<String>,
		result: ExecutionResult,
	},
	Downgraded {
		target: Option<String>,
		result: ExecutionResult,
	},
	Checked(CheckReport),
	Recreated {
		target: Option<String>,
		result: ExecutionResult,
	},
	Dropped {
		existed: bool,
	},
	Info {
		local: Vec<String>,
		database: Vec<String>,
	},
}

impl fmt::Display for ManagerOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ManagerOutcome::Upgraded { result, .. } | ManagerOutcome::Recreated { result, .. } => {
				write!(f, "Applied {} migration(s)", result.applied.len())
			}
			ManagerOutcome::Downgraded { result, .. } => {
				write!(f, "Reverted {} migration(s)", result.reverted.len())
			}
			ManagerOutcome::Checked(report) => write!(f, "{report}"),
			ManagerOutcome::Dropped { existed: true } => write!(f, "Database deleted"),
			ManagerOutcome::Dropped { existed: false } => write!(f, "Database does not exist"),
			ManagerOutcome::Info { local, database } => {
				writeln!(f, "Local migrations:")?;
				for id in local {
					writeln!(f, "{id}")?;
				}
				write!(f, "Database migrations:")?;
				for id in database {
					write!(f, "\n{id}")?;
				}
				Ok(())
			}
		}
	}
}

/// Dispatches [`ManagerAction`]s to a [`MigrationEngine`]
///
/// # Examples
///
/// ```rust,no_run
/// use strata_conf::MigratorSettings;
/// use strata_migrations::{ManagerAction, MigrationCatalog, MigrationManager, MigrationSelector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = MigratorSettings::load("strata.toml")?;
/// let manager = MigrationManager::connect(MigrationCatalog::from_registered()?, &settings)?;
/// let outcome = manager
///     .run(ManagerAction::Upgrade(MigrationSelector::version("1.2")))
///     .await?;
/// println!("{outcome}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MigrationManager {
	engine: MigrationEngine,
}

impl MigrationManager {
	pub fn new(engine: MigrationEngine) -> Self {
		Self { engine }
	}

	/// Engine wired to the database named by `settings`
	///
	/// No connection is opened until the first command runs. The SQL dialect
	/// follows the URL scheme.
	pub fn connect(catalog: MigrationCatalog, settings: &MigratorSettings) -> Result<Self> {
		settings
			.validate()
			.map_err(|e| MigrationError::Configuration(e.to_string()))?;

		let dialect = SqlDialect::from_url(&settings.database_url);
		tracing::debug!(dialect = ?dialect, "Connecting migrator");
		let executor = Arc::new(
			SqlxExecutor::connect_lazy(&settings.database_url)?
				.with_command_timeout(settings.effective_command_timeout()),
		);
		let history = SqlHistoryStore::new(executor.clone(), settings.context_key.as_str())
			.with_table(
				HistoryTable::new(settings.default_schema.as_str(), settings.history_table.as_str())
					.with_dialect(dialect),
			);
		let schema_provider = IntrospectingSchemaProvider::new(executor.clone())
			.with_dialect(dialect)
			.with_default_schema(settings.default_schema.as_str());

		let engine = MigrationEngine::new(catalog, executor, Arc::new(history))
			.with_generator(generator_for(dialect))
			.with_schema_provider(Arc::new(schema_provider))
			.with_database_admin(Arc::new(SqlxDatabaseAdmin::new(settings.database_url.as_str())))
			.with_default_schema(settings.default_schema.as_str())
			.with_seed(settings.seed)
			.with_seed_for_test(settings.seed_for_test)
			.with_create_database(settings.create_database);

		Ok(Self::new(engine))
	}

	pub fn engine(&self) -> &MigrationEngine {
		&self.engine
	}

	pub async fn run(&self, action: ManagerAction) -> Result<ManagerOutcome> {
		let local = self.engine.local_migrations();
		match action {
			ManagerAction::Upgrade(selector) => {
				let target = resolve_target(&local, &selector, false)?;
				tracing::info!(target_migration = ?target, "Upgrading database");
				let result = self.engine.upgrade(target.as_deref()).await?;
				Ok(ManagerOutcome::Upgraded { target, result })
			}
			ManagerAction::Downgrade(selector) => {
				let target = resolve_target(&local, &selector, true)?;
				tracing::info!(target_migration = ?target, "Downgrading database");
				let result = self.engine.downgrade(target.as_deref()).await?;
				Ok(ManagerOutcome::Downgraded { target, result })
			}
			ManagerAction::Check(selector) => {
				self.engine.history().ensure_table().await?;
				let report = MigrationChecker::new(&self.engine).check(&selector).await?;
				tracing::info!(
					discrepancies = report.has_discrepancies(),
					"Checked migrations"
				);
				Ok(ManagerOutcome::Checked(report))
			}
			ManagerAction::Recreate(selector) => {
				let target = resolve_target(&local, &selector, false)?;
				tracing::info!(target_migration = ?target, "Recreating database");
				let result = self.engine.recreate(target.as_deref()).await?;
				Ok(ManagerOutcome::Recreated { target, result })
			}
			ManagerAction::Drop => {
				let existed = self.engine.drop_database().await?;
				Ok(ManagerOutcome::Dropped { existed })
			}
			ManagerAction::Info => {
				let exists = match self.engine.database_admin() {
					Some(admin) => admin.exists().await?,
					None => true,
				};
				let database = if exists {
					self.engine.history().ensure_table().await?;
					self.engine.database_migrations().await?
				} else {
					Vec::new()
				};
				Ok(ManagerOutcome::Info { local, database })
			}
		}
	}
}
