//! # Strata Migrations
//!
//! Versioned schema migrations for relational databases, with history tracking
//! and a generated reporting view that summarizes row-level change volume per
//! version.
//!
//! ## Features
//!
//! - **Version ordering**: Identifiers of the form `<major>.<minor>.<sequence>_<Name>`
//!   are ordered numerically per dotted segment, then by name
//! - **Explicit registration**: Migrations are registered through a catalog
//!   (directly, through a [`MigrationProvider`], or through the [`MIGRATIONS`]
//!   distributed slice) instead of being discovered at runtime
//! - **Transactional apply/revert**: Every migration runs in its own serializable
//!   transaction; a failing migration halts the batch
//! - **Foreign key inference**: Missing principal columns are filled in from a
//!   schema snapshot or from tables created in the same batch
//! - **Change-set view**: `vw_VersionChangesSet` is rebuilt once per batch from
//!   the tables registered by the applied migrations
//! - **Dialects**: DDL, history bookkeeping and the change-set view are rendered
//!   as T-SQL or for the Postgres, MySQL and SQLite backends of `sqlx`
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_migrations::{
//!     ColumnDefinition, InMemoryExecutor, InMemoryHistoryStore, Migration, MigrationBuilder,
//!     MigrationCatalog, MigrationEngine, Result,
//! };
//!
//! struct InitGoods;
//!
//! impl Migration for InitGoods {
//!     fn id(&self) -> &str {
//!         "1.1.1000_Init"
//!     }
//!
//!     fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
//!         m.create_table(
//!             "Goods",
//!             vec![
//!                 ColumnDefinition::new("Id", "int").not_null().identity(),
//!                 ColumnDefinition::new("Name", "nvarchar(max)"),
//!             ],
//!         )
//!         .primary_key(&["Id"]);
//!         Ok(())
//!     }
//!
//!     fn down(&self, m: &mut MigrationBuilder) -> Result<()> {
//!         m.drop_table("Goods");
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let catalog = MigrationCatalog::new(vec![Box::new(InitGoods)])?;
//! let engine = MigrationEngine::new(
//!     catalog,
//!     Arc::new(InMemoryExecutor::new()),
//!     Arc::new(InMemoryHistoryStore::new("strata")),
//! );
//! engine.upgrade(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod catalog;
pub mod change_set;
pub mod checker;
pub mod dialect;
pub mod engine;
pub mod executor;
pub mod foreign_key;
pub mod generator;
pub mod history;
pub mod manager;
pub mod migration;
pub mod name;
pub mod operations;
pub mod schema;
pub mod seed;
pub mod version;
pub mod view;

pub use builder::{Direction, MigrationBuilder, MigrationParts, TableBuilder, ViewFlags};
pub use catalog::MigrationCatalog;
pub use change_set::{ChangeSetDeclarations, ChangeSetEntry, ChangeSetRegistry};
pub use checker::{CheckReport, MigrationChecker, MigrationSelector, resolve_target};
pub use dialect::SqlDialect;
pub use engine::{ExecutionResult, MigrationEngine};
pub use executor::{
	DatabaseAdmin, Row, StatementExecutor,
	any::{SqlxDatabaseAdmin, SqlxExecutor},
	memory::{ExecutedBatch, InMemoryDatabaseAdmin, InMemoryExecutor},
};
pub use foreign_key::ForeignKeyResolver;
pub use generator::{
	MigrationStatement, SqlGenerator, SqlServerGenerator, StandardSqlGenerator, generator_for,
};
pub use history::{
	HistoryRecord, HistoryStore, HistoryTable, InMemoryHistoryStore, SqlHistoryStore,
};
pub use manager::{ManagerAction, ManagerOutcome, MigrationManager};
pub use migration::{MIGRATIONS, Migration, MigrationFactory, MigrationProvider};
pub use name::{DEFAULT_SCHEMA, DatabaseName};
pub use operations::{
	AddForeignKeyOperation, ColumnDefinition, CreateTableOperation, DropForeignKeyOperation,
	ForeignKeyTrigger, Operation, ParameterDefinition, PrimaryKey,
};
pub use schema::{
	IntrospectingSchemaProvider, SchemaModelProvider, SchemaSnapshot, StaticSchemaProvider,
};
pub use seed::{DataSeedOperation, InsertBuilder, PlaceholderStyle, SqlValue, UpdateBuilder};
pub use version::VersionComparer;
pub use view::{JoinType, SqlViewModel, ViewJoin, change_set::CHANGE_SET_VIEW_NAME};

use thiserror::Error;

/// Errors raised while ordering, planning, or executing migrations
#[derive(Debug, Error)]
pub enum MigrationError {
	/// A dotted segment in a migration identifier's version prefix is not an integer
	#[error("Invalid number in migration version: {0}")]
	InvalidVersionFormat(String),

	#[error("Duplicate migration id: {0}")]
	DuplicateMigrationId(String),

	/// A user-supplied filter matched more than one migration
	#[error("More than one migration matches '{filter}'. Candidates:\n{}", candidates.join("\n"))]
	AmbiguousMigrationMatch {
		filter: String,
		candidates: Vec<String>,
	},

	#[error("No migration matches '{0}'")]
	MigrationNotFound(String),

	#[error(
		"The Foreign Key on table '{dependent_table}' with columns '{columns}' could not be created because the principal key columns could not be determined. Use the add_foreign_key builder to fully specify the Foreign Key."
	)]
	UnresolvableForeignKey {
		dependent_table: String,
		columns: String,
	},

	#[error("Unsupported join: {0}")]
	UnsupportedJoinType(String),

	#[error("Invalid view definition: {0}")]
	InvalidViewDefinition(String),

	#[error("Invalid operation: {0}")]
	InvalidOperation(String),

	#[error("Invalid database name {0}")]
	InvalidDatabaseName(String),

	/// A statement failed inside the schema transaction
	#[error("Statement execution failed: {message}\n{statement}")]
	StatementExecutionFailed { statement: String, message: String },

	#[error("Commit failed: {0}")]
	CommitFailed(String),

	/// The separate data-seed transaction failed; the schema transaction stays committed
	#[error("Data seed commit failed: {0}")]
	DataSeedCommitFailed(String),

	#[error("Command timed out after {0} seconds")]
	CommandTimeout(u64),

	#[error("Invalid history record: {0}")]
	InvalidHistoryRecord(String),

	#[error("Database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("Configuration error: {0}")]
	Configuration(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;
