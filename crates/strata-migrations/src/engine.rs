//! # Migration Engine
//!
//! Orchestrates applying and reverting migrations against one database.
//!
//! Each migration runs through the same pipeline: invoke the hook on a fresh
//! [`MigrationBuilder`], resolve foreign keys, reorder, generate statements,
//! execute them in one transaction, then record history and run seed data in
//! a second transaction. A failure halts the batch; migrations applied before
//! the failing one stay applied.
//!
//! The `vw_VersionChangesSet` view is rebuilt once at the end of every batch
//! from the change-set registry reconstructed out of the installed history.

use crate::builder::{MigrationBuilder, MigrationParts};
use crate::catalog::MigrationCatalog;
use crate::change_set::{ChangeSetDeclarations, ChangeSetRegistry};
use crate::checker::CheckReport;
use crate::executor::{DatabaseAdmin, StatementExecutor};
use crate::foreign_key::ForeignKeyResolver;
use crate::generator::{SqlGenerator, SqlServerGenerator};
use crate::history::{HistoryRecord, HistoryStore};
use crate::migration::Migration;
use crate::name::DEFAULT_SCHEMA;
use crate::operations::Operation;
use crate::schema::{SchemaModelProvider, SchemaSnapshot, StaticSchemaProvider};
use crate::version::VersionComparer;
use crate::view;
use crate::{MigrationError, Result};
use md5::{Digest, Md5};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

/// What one upgrade or downgrade batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
	/// Applied identifiers, in apply order
	pub applied: Vec<String>,
	/// Reverted identifiers, in revert order
	pub reverted: Vec<String>,
	/// Tables in the rebuilt change-set view
	pub change_set_tables: Vec<String>,
}

impl ExecutionResult {
	pub fn is_empty(&self) -> bool {
		self.applied.is_empty() && self.reverted.is_empty()
	}
}

/// Applies and reverts catalog migrations, keeping history in step
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_migrations::{
///     InMemoryExecutor, InMemoryHistoryStore, MigrationCatalog, MigrationEngine,
/// };
///
/// # tokio_test::block_on(async {
/// let engine = MigrationEngine::new(
///     MigrationCatalog::new(Vec::new()).unwrap(),
///     Arc::new(InMemoryExecutor::new()),
///     Arc::new(InMemoryHistoryStore::new("strata")),
/// );
/// assert!(engine.pending_migrations().await.unwrap().is_empty());
/// # });
/// ```
pub struct MigrationEngine {
	catalog: MigrationCatalog,
	executor: Arc<dyn StatementExecutor>,
	history: Arc<dyn HistoryStore>,
	generator: Arc<dyn SqlGenerator>,
	schema_provider: Arc<dyn SchemaModelProvider>,
	admin: Option<Arc<dyn DatabaseAdmin>>,
	default_schema: String,
	seed: bool,
	seed_for_test: bool,
	create_database: bool,
}

impl MigrationEngine {
	/// Engine generating T-SQL, with an empty schema snapshot and no database admin
	pub fn new(
		catalog: MigrationCatalog,
		executor: Arc<dyn StatementExecutor>,
		history: Arc<dyn HistoryStore>,
	) -> Self {
		Self {
			catalog,
			executor,
			history,
			generator: Arc::new(SqlServerGenerator::new()),
			schema_provider: Arc::new(StaticSchemaProvider::default()),
			admin: None,
			default_schema: DEFAULT_SCHEMA.to_string(),
			seed: false,
			seed_for_test: false,
			create_database: true,
		}
	}

	pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
		self.generator = generator;
		self
	}

	pub fn with_schema_provider(mut self, provider: Arc<dyn SchemaModelProvider>) -> Self {
		self.schema_provider = provider;
		self
	}

	/// Enables database creation before upgrades and the drop/recreate actions
	pub fn with_database_admin(mut self, admin: Arc<dyn DatabaseAdmin>) -> Self {
		self.admin = Some(admin);
		self
	}

	pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
		self.default_schema = schema.into();
		self
	}

	pub fn with_seed(mut self, enabled: bool) -> Self {
		self.seed = enabled;
		self
	}

	pub fn with_seed_for_test(mut self, enabled: bool) -> Self {
		self.seed_for_test = enabled;
		self
	}

	pub fn with_create_database(mut self, enabled: bool) -> Self {
		self.create_database = enabled;
		self
	}

	pub fn catalog(&self) -> &MigrationCatalog {
		&self.catalog
	}

	pub fn history(&self) -> &Arc<dyn HistoryStore> {
		&self.history
	}

	pub fn generator(&self) -> &Arc<dyn SqlGenerator> {
		&self.generator
	}

	pub fn executor(&self) -> &Arc<dyn StatementExecutor> {
		&self.executor
	}

	pub fn database_admin(&self) -> Option<&Arc<dyn DatabaseAdmin>> {
		self.admin.as_ref()
	}

	/// Catalog identifiers, ascending
	pub fn local_migrations(&self) -> Vec<String> {
		self.catalog.all_identifiers()
	}

	/// Identifiers recorded in history, ascending
	pub async fn database_migrations(&self) -> Result<Vec<String>> {
		self.history.applied_ids().await
	}

	/// History identifiers starting with (`is_version`) or containing `filter`,
	/// ignoring case; every identifier when `filter` is `None`
	pub async fn database_migrations_matching(
		&self,
		filter: Option<&str>,
		is_version: bool,
	) -> Result<Vec<String>> {
		let ids = self.database_migrations().await?;
		let Some(filter) = filter else {
			return Ok(ids);
		};
		Ok(ids
			.into_iter()
			.filter(|id| matches_filter(id, filter, is_version))
			.collect())
	}

	/// Catalog identifiers not yet recorded in history, ascending
	pub async fn pending_migrations(&self) -> Result<Vec<String>> {
		let applied = self.database_migrations().await?;
		Ok(self
			.local_migrations()
			.into_iter()
			.filter(|id| !applied.contains(id))
			.collect())
	}

	/// Installed identifiers strictly newer than `target`, newest first
	///
	/// `None` selects every installed migration.
	pub async fn migrations_since(&self, target: Option<&str>) -> Result<Vec<String>> {
		let mut ids = self.database_migrations().await?;
		if let Some(target) = target {
			let mut newer = Vec::with_capacity(ids.len());
			for id in ids {
				if VersionComparer::compare_lowercase(&id, target)? == Ordering::Greater {
					newer.push(id);
				}
			}
			ids = newer;
		}
		VersionComparer::sort_ids_descending(&mut ids)?;
		Ok(ids)
	}

	/// Apply pending migrations up to and including `target`, or all of them
	///
	/// The database is created first when it is missing and creation is
	/// enabled. The change-set view is rebuilt once after the batch, even when
	/// nothing was pending.
	pub async fn upgrade(&self, target: Option<&str>) -> Result<ExecutionResult> {
		if let Some(target) = target
			&& !self.catalog.contains(target)
		{
			return Err(MigrationError::MigrationNotFound(target.to_string()));
		}
		self.ensure_database(self.upgrade_batch(target)).await
	}

	async fn upgrade_batch(&self, target: Option<&str>) -> Result<ExecutionResult> {
		self.history.ensure_table().await?;

		let mut pending = self.pending_migrations().await?;
		if let Some(target) = target {
			let mut within = Vec::with_capacity(pending.len());
			for id in pending {
				if VersionComparer::compare_lowercase(&id, target)? != Ordering::Greater {
					within.push(id);
				}
			}
			pending = within;
		}

		let mut registry = self.full_change_set_collection().await?;
		let mut snapshot = self.schema_provider.snapshot().await?;
		let mut result = ExecutionResult::default();

		for id in pending {
			tracing::info!(migration_id = %id, "Applying migration");
			let declarations = self.apply_with_snapshot(&id, &mut snapshot).await?;
			registry.merge(&declarations);
			result.applied.push(id);
		}

		self.build_change_set_view(&registry).await?;
		result.change_set_tables = registry.tables().into_iter().map(String::from).collect();
		Ok(result)
	}

	/// Revert installed migrations strictly newer than `target`, newest first
	///
	/// `None` reverts everything. Nothing is touched when no installed
	/// migration is newer than `target`.
	pub async fn downgrade(&self, target: Option<&str>) -> Result<ExecutionResult> {
		self.history.ensure_table().await?;

		let ids = self.migrations_since(target).await?;
		if ids.is_empty() {
			return Ok(ExecutionResult::default());
		}

		let mut registry = self.full_change_set_collection().await?;
		let mut snapshot = self.schema_provider.snapshot().await?;
		let mut result = ExecutionResult::default();

		for id in ids {
			tracing::info!(migration_id = %id, "Reverting migration");
			let declarations = self.revert_with_snapshot(&id, &mut snapshot).await?;
			registry.merge(&declarations);
			result.reverted.push(id);
		}

		self.build_change_set_view(&registry).await?;
		result.change_set_tables = registry.tables().into_iter().map(String::from).collect();
		Ok(result)
	}

	/// Apply one migration, returning its change-set declarations
	///
	/// Does not rebuild the change-set view.
	pub async fn apply_migration(&self, id: &str) -> Result<ChangeSetDeclarations> {
		let mut snapshot = self.schema_provider.snapshot().await?;
		self.apply_with_snapshot(id, &mut snapshot).await
	}

	/// Revert one migration, returning its change-set declarations
	pub async fn revert_migration(&self, id: &str) -> Result<ChangeSetDeclarations> {
		let mut snapshot = self.schema_provider.snapshot().await?;
		self.revert_with_snapshot(id, &mut snapshot).await
	}

	async fn apply_with_snapshot(
		&self,
		id: &str,
		snapshot: &mut SchemaSnapshot,
	) -> Result<ChangeSetDeclarations> {
		let migration = self.catalog.get(id)?;
		let parts = self.collect(|m| migration.up(m))?;

		let mut operations = parts.operations;
		ForeignKeyResolver::resolve(&mut operations, snapshot)?;
		let operations = ForeignKeyResolver::order_operations(operations);
		let statements = self.generator.generate(&operations)?;
		let hash = if migration.affects_history() {
			Some(self.migration_hash(id)?)
		} else {
			None
		};

		self.executor.execute_statements(&statements).await?;
		if let Some(hash) = hash {
			self.history
				.record_applied(HistoryRecord::new(id, self.history.context_key(), hash))
				.await?;
		}
		remember_created_tables(snapshot, &operations);

		let data_operations = self.data_operations(migration, parts.data_operations)?;
		if !data_operations.is_empty() {
			tracing::debug!(
				migration_id = %id,
				count = data_operations.len(),
				"Running data seed operations"
			);
			self.executor.execute_data_operations(&data_operations).await?;
		}

		Ok(parts.change_sets)
	}

	async fn revert_with_snapshot(
		&self,
		id: &str,
		snapshot: &mut SchemaSnapshot,
	) -> Result<ChangeSetDeclarations> {
		let migration = self.catalog.get(id)?;
		let parts = self.collect(|m| migration.down(m))?;

		let mut operations = parts.operations;
		ForeignKeyResolver::resolve(&mut operations, snapshot)?;
		let operations = ForeignKeyResolver::order_operations(operations);
		let statements = self.generator.generate(&operations)?;

		self.executor.execute_statements(&statements).await?;
		if migration.affects_history() {
			self.history.remove(id).await?;
		}
		remember_created_tables(snapshot, &operations);

		Ok(parts.change_sets)
	}

	fn data_operations(
		&self,
		migration: &dyn Migration,
		mut operations: Vec<crate::seed::DataSeedOperation>,
	) -> Result<Vec<crate::seed::DataSeedOperation>> {
		if self.seed {
			operations.extend(self.collect(|m| migration.seed(m))?.data_operations);
		}
		if self.seed_for_test {
			operations.extend(self.collect(|m| migration.seed_for_test(m))?.data_operations);
		}
		Ok(operations)
	}

	/// Registry rebuilt by replaying `up()` of every installed migration, ascending
	///
	/// Installed identifiers the catalog does not know are logged and skipped.
	pub async fn full_change_set_collection(&self) -> Result<ChangeSetRegistry> {
		let mut registry = ChangeSetRegistry::new();
		for id in self.database_migrations().await? {
			if !self.catalog.contains(&id) {
				tracing::error!(
					migration_id = %id,
					"Migration recorded in history is missing from the catalog"
				);
				continue;
			}
			let migration = self.catalog.get(&id)?;
			registry.merge(&self.collect(|m| migration.up(m))?.change_sets);
		}
		Ok(registry)
	}

	/// Drop and recreate `vw_VersionChangesSet` from `registry`
	///
	/// Runs as its own transaction and never touches history.
	pub async fn build_change_set_view(&self, registry: &ChangeSetRegistry) -> Result<()> {
		let tables = registry.tables().join(", ");
		tracing::info!(tables = %tables, "Building version change set view");
		let statements = view::change_set::statements_for(
			registry,
			self.generator.dialect(),
			&self.default_schema,
		)?;
		self.executor.execute_statements(&statements).await
	}

	/// Lowercase hex MD5 of the SQL generated by every catalog migration up to `id`
	///
	/// Foreign keys are hashed unresolved, so the hash does not depend on the
	/// live schema.
	pub fn migration_hash(&self, id: &str) -> Result<String> {
		let mut hasher = Md5::new();
		for candidate in self.catalog.all_identifiers() {
			if VersionComparer::compare_lowercase(&candidate, id)? == Ordering::Greater {
				break;
			}
			let migration = self.catalog.get(&candidate)?;
			let parts = self.collect(|m| migration.up(m))?;
			for statement in self.generator.generate(&parts.operations)? {
				hasher.update(statement.sql.as_bytes());
			}
		}
		Ok(hex::encode(hasher.finalize()))
	}

	/// Compare catalog ids up to `local_id` with history rows up to `db_id`
	///
	/// Hashes are compared only when both sides list the same migrations. A
	/// `None` bound selects nothing on that side.
	pub async fn check_migrations(
		&self,
		local_id: Option<&str>,
		db_id: Option<&str>,
	) -> Result<CheckReport> {
		let mut local = Vec::new();
		if let Some(local_id) = local_id {
			for id in self.local_migrations() {
				if VersionComparer::compare_lowercase(&id, local_id)? != Ordering::Greater {
					local.push(id);
				}
			}
		}

		let mut records = Vec::new();
		if let Some(db_id) = db_id {
			for record in self.history.applied_records().await? {
				if VersionComparer::compare_lowercase(&record.migration_id, db_id)? != Ordering::Greater {
					records.push(record);
				}
			}
		}
		records.sort_by(|a, b| {
			VersionComparer::compare_lowercase(&a.migration_id, &b.migration_id)
				.unwrap_or(Ordering::Equal)
		});

		let missing: Vec<String> = local
			.iter()
			.filter(|id| !records.iter().any(|r| &r.migration_id == *id))
			.cloned()
			.collect();
		let extra: Vec<String> = records
			.iter()
			.filter(|r| !local.contains(&r.migration_id))
			.map(|r| r.migration_id.clone())
			.collect();

		let mut hash_mismatches = Vec::new();
		if missing.is_empty() && extra.is_empty() {
			for record in &records {
				if self.migration_hash(&record.migration_id)? != record.hash_code {
					hash_mismatches.push(record.migration_id.clone());
				}
			}
		}

		Ok(CheckReport {
			missing,
			extra,
			hash_mismatches,
		})
	}

	/// Run `action`, creating the database first when it is missing
	///
	/// When this call created the database and `action` fails, the database is
	/// deleted again. A failed delete is logged and the original error returned.
	pub async fn ensure_database<T, F>(&self, action: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let mut created = false;
		if self.create_database
			&& let Some(admin) = &self.admin
			&& !admin.exists().await?
		{
			admin.create().await?;
			tracing::info!("Created database");
			created = true;
		}

		match action.await {
			Ok(value) => Ok(value),
			Err(error) => {
				if created && let Some(admin) = &self.admin {
					match admin.delete().await {
						Ok(()) => tracing::info!("Deleted database created for the failed run"),
						Err(cleanup) => tracing::warn!(
							error = %cleanup,
							"Failed to delete database created for the failed run"
						),
					}
				}
				Err(error)
			}
		}
	}

	/// Delete the database if it exists, then upgrade to `target`
	pub async fn recreate(&self, target: Option<&str>) -> Result<ExecutionResult> {
		self.drop_database().await?;
		self.upgrade(target).await
	}

	/// Delete the database if it exists; returns whether it existed
	pub async fn drop_database(&self) -> Result<bool> {
		let admin = self.admin.as_ref().ok_or_else(|| {
			MigrationError::Configuration("no database admin configured".to_string())
		})?;
		if !admin.exists().await? {
			return Ok(false);
		}
		admin.delete().await?;
		tracing::info!("Deleted database");
		Ok(true)
	}

	fn collect(
		&self,
		hook: impl FnOnce(&mut MigrationBuilder) -> Result<()>,
	) -> Result<MigrationParts> {
		let mut builder = MigrationBuilder::new(self.default_schema.as_str());
		hook(&mut builder)?;
		builder.finish()
	}
}

impl std::fmt::Debug for MigrationEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MigrationEngine")
			.field("catalog", &self.catalog)
			.field("context_key", &self.history.context_key())
			.field("default_schema", &self.default_schema)
			.field("seed", &self.seed)
			.field("seed_for_test", &self.seed_for_test)
			.field("create_database", &self.create_database)
			.finish_non_exhaustive()
	}
}

pub(crate) fn matches_filter(id: &str, filter: &str, is_version: bool) -> bool {
	let id = id.to_lowercase();
	let filter = filter.to_lowercase();
	if is_version {
		id.starts_with(&filter)
	} else {
		id.contains(&filter)
	}
}

/// Keep tables created in this batch resolvable for later migrations
fn remember_created_tables(snapshot: &mut SchemaSnapshot, operations: &[Operation]) {
	let default_schema = snapshot.default_schema().to_string();
	for operation in operations {
		if let Operation::CreateTable(create) = operation
			&& let Some(primary_key) = &create.primary_key
		{
			snapshot.insert(
				create.name.clone().with_default_schema(&default_schema),
				primary_key.columns.clone(),
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::executor::memory::{InMemoryDatabaseAdmin, InMemoryExecutor};
	use crate::history::InMemoryHistoryStore;
	use crate::operations::ColumnDefinition;
	use rstest::rstest;

	struct CreateGoods;

	impl Migration for CreateGoods {
		fn id(&self) -> &str {
			"1.1.1000_Init"
		}

		fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
			m.create_table("Goods", vec![ColumnDefinition::new("Id", "int").not_null()])
				.primary_key(&["Id"]);
			Ok(())
		}

		fn down(&self, m: &mut MigrationBuilder) -> Result<()> {
			m.drop_table("Goods");
			Ok(())
		}
	}

	struct AddPrices;

	impl Migration for AddPrices {
		fn id(&self) -> &str {
			"1.2.2000_AddPrices"
		}

		fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
			m.create_table("Prices", vec![ColumnDefinition::new("GoodId", "int")])
				.foreign_key(&["GoodId"], "Goods", false);
			Ok(())
		}
	}

	fn engine(executor: Arc<InMemoryExecutor>, history: Arc<InMemoryHistoryStore>) -> MigrationEngine {
		let catalog =
			MigrationCatalog::new(vec![Box::new(AddPrices), Box::new(CreateGoods)]).unwrap();
		MigrationEngine::new(catalog, executor, history)
	}

	#[rstest]
	#[case("1.1", true, vec!["1.1.1000_Init"])]
	#[case("PRICES", false, vec!["1.2.2000_AddPrices"])]
	#[case("2000", true, vec![])]
	#[tokio::test]
	async fn test_database_migrations_matching(
		#[case] filter: &str,
		#[case] is_version: bool,
		#[case] expected: Vec<&str>,
	) {
		// Arrange
		let history = Arc::new(InMemoryHistoryStore::new("strata").with_records(vec![
			HistoryRecord::new("1.2.2000_AddPrices", "strata", "b"),
			HistoryRecord::new("1.1.1000_Init", "strata", "a"),
		]));
		let engine = engine(Arc::new(InMemoryExecutor::new()), history);

		// Act
		let ids = engine
			.database_migrations_matching(Some(filter), is_version)
			.await
			.unwrap();

		// Assert
		assert_eq!(ids, expected);
	}

	#[tokio::test]
	async fn test_foreign_key_resolves_against_table_from_earlier_migration() {
		// Arrange
		let executor = Arc::new(InMemoryExecutor::new());
		let engine = engine(executor.clone(), Arc::new(InMemoryHistoryStore::new("strata")));

		// Act
		engine.upgrade(None).await.unwrap();

		// Assert
		assert!(
			executor
				.statements()
				.iter()
				.any(|sql| sql.contains("REFERENCES [dbo].[Goods] ([Id])"))
		);
	}

	#[tokio::test]
	async fn test_hash_is_stable_and_cumulative() {
		let engine = engine(
			Arc::new(InMemoryExecutor::new()),
			Arc::new(InMemoryHistoryStore::new("strata")),
		);

		let first = engine.migration_hash("1.1.1000_Init").unwrap();
		let second = engine.migration_hash("1.2.2000_AddPrices").unwrap();

		assert_eq!(first, engine.migration_hash("1.1.1000_Init").unwrap());
		assert_ne!(first, second);
		assert_eq!(first.len(), 32);
		assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[tokio::test]
	async fn test_upgrade_to_already_applied_target_applies_nothing() {
		// Arrange
		let executor = Arc::new(InMemoryExecutor::new());
		let history = Arc::new(InMemoryHistoryStore::new("strata"));
		let engine = engine(executor.clone(), history.clone());
		engine.upgrade(Some("1.1.1000_Init")).await.unwrap();

		// Act
		let result = engine.upgrade(Some("1.1.1000_Init")).await.unwrap();

		// Assert
		assert!(result.applied.is_empty());
		assert_eq!(engine.pending_migrations().await.unwrap(), vec!["1.2.2000_AddPrices"]);
	}

	#[tokio::test]
	async fn test_drop_without_admin_is_a_configuration_error() {
		let engine = engine(
			Arc::new(InMemoryExecutor::new()),
			Arc::new(InMemoryHistoryStore::new("strata")),
		);

		let result = engine.drop_database().await;

		assert!(matches!(result, Err(MigrationError::Configuration(_))));
	}

	#[tokio::test]
	async fn test_ensure_database_keeps_existing_database_on_failure() {
		// Arrange
		let admin = Arc::new(InMemoryDatabaseAdmin::existing());
		let engine = engine(
			Arc::new(InMemoryExecutor::new()),
			Arc::new(InMemoryHistoryStore::new("strata")),
		)
		.with_database_admin(admin.clone());

		// Act
		let result: Result<()> = engine
			.ensure_database(async { Err(MigrationError::CommitFailed("boom".to_string())) })
			.await;

		// Assert
		assert!(matches!(result, Err(MigrationError::CommitFailed(_))));
		assert!(admin.database_exists());
		assert_eq!(admin.delete_count(), 0);
	}

	#[rstest]
	#[case("1.1.1000_init", "1.1", true, true)]
	#[case("1.1.1000_Init", "INIT", false, true)]
	#[case("1.1.1000_Init", "1.2", true, false)]
	fn test_matches_filter(
		#[case] id: &str,
		#[case] filter: &str,
		#[case] is_version: bool,
		#[case] expected: bool,
	) {
		assert_eq!(matches_filter(id, filter, is_version), expected);
	}
}
