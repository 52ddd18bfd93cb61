//! Recording executor for dry runs and tests

use super::{DatabaseAdmin, Row, StatementExecutor};
use crate::generator::MigrationStatement;
use crate::seed::{DataSeedOperation, SqlValue};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// One committed transaction
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutedBatch {
	Schema(Vec<MigrationStatement>),
	Data(Vec<DataSeedOperation>),
}

impl ExecutedBatch {
	pub fn sql(&self) -> Vec<&str> {
		match self {
			ExecutedBatch::Schema(statements) => statements.iter().map(|s| s.sql.as_str()).collect(),
			ExecutedBatch::Data(operations) => operations.iter().map(|o| o.sql.as_str()).collect(),
		}
	}
}

#[derive(Debug, Default)]
struct ExecutorState {
	batches: Vec<ExecutedBatch>,
	fail_on: Vec<String>,
	fail_data_on: Vec<String>,
	responses: Vec<(String, Vec<Row>)>,
	queries: Vec<String>,
	commands: Vec<DataSeedOperation>,
}

/// Records committed batches instead of touching a database
///
/// A batch containing a statement that matches a configured failure fragment
/// is not recorded, mirroring a rolled back transaction.
///
/// # Examples
///
/// ```
/// use strata_migrations::{InMemoryExecutor, MigrationStatement, StatementExecutor};
///
/// # tokio_test::block_on(async {
/// let executor = InMemoryExecutor::new();
/// executor
///     .execute_statements(&[MigrationStatement::new("DROP TABLE [dbo].[Goods]")])
///     .await
///     .unwrap();
/// assert_eq!(executor.statements(), vec!["DROP TABLE [dbo].[Goods]"]);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryExecutor {
	state: Mutex<ExecutorState>,
}

impl InMemoryExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fail any schema batch with a statement containing `fragment`
	pub fn fail_on(self, fragment: impl Into<String>) -> Self {
		self.state.lock().fail_on.push(fragment.into());
		self
	}

	/// Fail any data batch with a statement containing `fragment`
	pub fn fail_data_on(self, fragment: impl Into<String>) -> Self {
		self.state.lock().fail_data_on.push(fragment.into());
		self
	}

	/// Answer queries containing `fragment` with `rows`
	pub fn respond_to(self, fragment: impl Into<String>, rows: Vec<Row>) -> Self {
		self.state.lock().responses.push((fragment.into(), rows));
		self
	}

	pub fn batches(&self) -> Vec<ExecutedBatch> {
		self.state.lock().batches.clone()
	}

	/// SQL of every committed schema statement, in execution order
	pub fn statements(&self) -> Vec<String> {
		self.state
			.lock()
			.batches
			.iter()
			.filter_map(|batch| match batch {
				ExecutedBatch::Schema(statements) => Some(statements.iter().map(|s| s.sql.clone())),
				ExecutedBatch::Data(_) => None,
			})
			.flatten()
			.collect()
	}

	/// Every committed seed operation, in execution order
	pub fn data_operations(&self) -> Vec<DataSeedOperation> {
		self.state
			.lock()
			.batches
			.iter()
			.filter_map(|batch| match batch {
				ExecutedBatch::Data(operations) => Some(operations.iter().cloned()),
				ExecutedBatch::Schema(_) => None,
			})
			.flatten()
			.collect()
	}

	pub fn queries(&self) -> Vec<String> {
		self.state.lock().queries.clone()
	}

	/// Standalone statements run through [`StatementExecutor::execute`]
	pub fn commands(&self) -> Vec<DataSeedOperation> {
		self.state.lock().commands.clone()
	}

	pub fn clear(&self) {
		self.state.lock().batches.clear();
	}
}

#[async_trait]
impl StatementExecutor for InMemoryExecutor {
	async fn execute_statements(&self, statements: &[MigrationStatement]) -> Result<()> {
		let mut state = self.state.lock();
		let executed: Vec<MigrationStatement> = statements
			.iter()
			.filter(|s| !s.sql.trim().is_empty())
			.cloned()
			.collect();

		if let Some(failing) = executed
			.iter()
			.find(|s| state.fail_on.iter().any(|f| s.sql.contains(f.as_str())))
		{
			return Err(MigrationError::StatementExecutionFailed {
				statement: failing.sql.clone(),
				message: "injected failure".to_string(),
			});
		}

		state.batches.push(ExecutedBatch::Schema(executed));
		Ok(())
	}

	async fn execute_data_operations(&self, operations: &[DataSeedOperation]) -> Result<()> {
		let mut state = self.state.lock();
		if let Some(failing) = operations
			.iter()
			.find(|o| state.fail_data_on.iter().any(|f| o.sql.contains(f.as_str())))
		{
			return Err(MigrationError::DataSeedCommitFailed(failing.sql.clone()));
		}

		state.batches.push(ExecutedBatch::Data(operations.to_vec()));
		Ok(())
	}

	async fn execute(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<u64> {
		let mut state = self.state.lock();
		if state.fail_on.iter().any(|f| sql.contains(f.as_str())) {
			return Err(MigrationError::StatementExecutionFailed {
				statement: sql.to_string(),
				message: "injected failure".to_string(),
			});
		}
		state.commands.push(DataSeedOperation {
			sql: sql.to_string(),
			params: params.to_vec(),
		});
		Ok(1)
	}

	async fn fetch_all(&self, sql: &str, _params: &[(String, SqlValue)]) -> Result<Vec<Row>> {
		let mut state = self.state.lock();
		state.queries.push(sql.to_string());
		Ok(state
			.responses
			.iter()
			.find(|(fragment, _)| sql.contains(fragment.as_str()))
			.map(|(_, rows)| rows.clone())
			.unwrap_or_default())
	}
}

#[derive(Debug, Default)]
struct AdminState {
	exists: bool,
	created: usize,
	deleted: usize,
	fail_delete: bool,
}

/// Database lifecycle double tracking existence and call counts
#[derive(Debug, Default)]
pub struct InMemoryDatabaseAdmin {
	state: Mutex<AdminState>,
}

impl InMemoryDatabaseAdmin {
	/// An admin whose database already exists
	pub fn existing() -> Self {
		let admin = Self::default();
		admin.state.lock().exists = true;
		admin
	}

	/// An admin whose database has not been created yet
	pub fn missing() -> Self {
		Self::default()
	}

	pub fn failing_delete(self) -> Self {
		self.state.lock().fail_delete = true;
		self
	}

	pub fn database_exists(&self) -> bool {
		self.state.lock().exists
	}

	pub fn create_count(&self) -> usize {
		self.state.lock().created
	}

	pub fn delete_count(&self) -> usize {
		self.state.lock().deleted
	}
}

#[async_trait]
impl DatabaseAdmin for InMemoryDatabaseAdmin {
	async fn exists(&self) -> Result<bool> {
		Ok(self.state.lock().exists)
	}

	async fn create(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.exists = true;
		state.created += 1;
		Ok(())
	}

	async fn delete(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.deleted += 1;
		if state.fail_delete {
			return Err(MigrationError::Configuration(
				"database is in use and cannot be deleted".to_string(),
			));
		}
		state.exists = false;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_failed_batch_is_not_recorded() {
		// Arrange
		let executor = InMemoryExecutor::new().fail_on("Broken");
		let statements = vec![
			MigrationStatement::new("CREATE TABLE [dbo].[Goods] ([Id] [int])"),
			MigrationStatement::new("ALTER TABLE Broken"),
		];

		// Act
		let result = executor.execute_statements(&statements).await;

		// Assert
		assert!(matches!(
			result,
			Err(MigrationError::StatementExecutionFailed { statement, .. }) if statement == "ALTER TABLE Broken"
		));
		assert!(executor.batches().is_empty());
	}

	#[tokio::test]
	async fn test_blank_statements_are_skipped() {
		let executor = InMemoryExecutor::new();

		executor
			.execute_statements(&[MigrationStatement::new("  "), MigrationStatement::new("SELECT 1")])
			.await
			.unwrap();

		assert_eq!(executor.statements(), vec!["SELECT 1"]);
	}

	#[tokio::test]
	async fn test_data_failures_use_the_seed_error() {
		let executor = InMemoryExecutor::new().fail_data_on("Prices");

		let result = executor
			.execute_data_operations(&[DataSeedOperation::raw("DELETE FROM Prices")])
			.await;

		assert!(matches!(result, Err(MigrationError::DataSeedCommitFailed(_))));
	}

	#[tokio::test]
	async fn test_canned_rows_are_returned() {
		let executor = InMemoryExecutor::new()
			.respond_to("INFORMATION_SCHEMA", vec![Row::new().with("TABLE_NAME", "Goods")]);

		let rows = executor
			.fetch_all("SELECT * FROM INFORMATION_SCHEMA.TABLES", &[])
			.await
			.unwrap();

		assert_eq!(rows.len(), 1);
		assert_eq!(executor.queries().len(), 1);
	}

	#[tokio::test]
	async fn test_admin_tracks_lifecycle() {
		let admin = InMemoryDatabaseAdmin::missing();

		admin.create().await.unwrap();
		assert!(admin.database_exists());
		admin.delete().await.unwrap();

		assert!(!admin.database_exists());
		assert_eq!((admin.create_count(), admin.delete_count()), (1, 1));
	}
}
