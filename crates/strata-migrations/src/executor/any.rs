//! `sqlx` `AnyPool` backed executor and database admin

use super::{DatabaseAdmin, Row, StatementExecutor};
use crate::dialect::SqlDialect;
use crate::generator::MigrationStatement;
use crate::seed::{DataSeedOperation, PlaceholderStyle, SqlValue};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::migrate::MigrateDatabase;
use sqlx::pool::PoolOptions;
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column, Executor as _, Row as _};
use std::future::Future;
use std::time::Duration;

/// Default command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 90;

/// Executes migration statements through an `AnyPool`
///
/// # Examples
///
/// ```rust,no_run
/// use strata_migrations::SqlxExecutor;
///
/// # async fn example() -> strata_migrations::Result<()> {
/// let executor = SqlxExecutor::connect("postgres://localhost/goods")
///     .await?
///     .with_command_timeout(Some(30));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlxExecutor {
	pool: AnyPool,
	command_timeout: Option<u64>,
	isolation_statement: Option<String>,
	placeholder_style: PlaceholderStyle,
	dialect: SqlDialect,
}

impl SqlxExecutor {
	/// Connect to `url`, choosing placeholder and isolation syntax from its scheme
	pub async fn connect(url: &str) -> Result<Self> {
		sqlx::any::install_default_drivers();
		let pool = pool_options(SqlDialect::from_url(url))
			.min_connections(1)
			.connect(url)
			.await?;

		Ok(Self::from_pool(pool).for_url(url))
	}

	/// Like [`connect`](Self::connect), but opens no connection until first use
	///
	/// Lets the database be created after the executor is built.
	pub fn connect_lazy(url: &str) -> Result<Self> {
		sqlx::any::install_default_drivers();
		let pool = pool_options(SqlDialect::from_url(url))
			.min_connections(0)
			.connect_lazy(url)?;

		Ok(Self::from_pool(pool).for_url(url))
	}

	fn for_url(self, url: &str) -> Self {
		self.with_dialect(SqlDialect::from_url(url))
	}

	/// Adopt the placeholder and transaction isolation syntax of `dialect`
	///
	/// Session-level isolation is applied when the pool opens a connection,
	/// so pools built outside [`connect`](Self::connect) must do that themselves.
	pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
		self.dialect = dialect;
		self.placeholder_style = match dialect {
			SqlDialect::Postgres => PlaceholderStyle::Dollar,
			_ => PlaceholderStyle::Question,
		};
		self.isolation_statement = dialect.transaction_isolation().map(str::to_string);
		self
	}

	/// Wrap an existing pool; placeholders default to `?`
	pub fn from_pool(pool: AnyPool) -> Self {
		Self {
			pool,
			command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
			isolation_statement: None,
			placeholder_style: PlaceholderStyle::Question,
			dialect: SqlDialect::default(),
		}
	}

	/// Per-statement timeout in seconds; `None` waits indefinitely
	pub fn with_command_timeout(mut self, seconds: Option<u64>) -> Self {
		self.command_timeout = seconds;
		self
	}

	/// Statement run first in every transaction to raise its isolation level
	pub fn with_isolation_statement(mut self, statement: Option<String>) -> Self {
		self.isolation_statement = statement;
		self
	}

	pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
		self.placeholder_style = style;
		self
	}

	pub fn pool(&self) -> &AnyPool {
		&self.pool
	}

	pub fn dialect(&self) -> SqlDialect {
		self.dialect
	}

	pub fn isolation_statement(&self) -> Option<&str> {
		self.isolation_statement.as_deref()
	}

	pub fn placeholder_style(&self) -> PlaceholderStyle {
		self.placeholder_style
	}

	async fn timed<T, F>(&self, future: F) -> Result<std::result::Result<T, sqlx::Error>>
	where
		F: Future<Output = std::result::Result<T, sqlx::Error>>,
	{
		match self.command_timeout {
			Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), future)
				.await
				.map_err(|_| MigrationError::CommandTimeout(seconds)),
			None => Ok(future.await),
		}
	}

	fn positional(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<(String, Vec<SqlValue>)> {
		DataSeedOperation {
			sql: sql.to_string(),
			params: params.to_vec(),
		}
		.bind_positional(self.placeholder_style)
	}

	async fn execute_data_operations_inner(&self, operations: &[DataSeedOperation]) -> Result<()> {
		let mut transaction = self.pool.begin().await?;
		if let Some(isolation) = &self.isolation_statement {
			sqlx::query(isolation).execute(&mut *transaction).await?;
		}

		for operation in operations {
			let (sql, values) = operation.bind_positional(self.placeholder_style)?;
			let query = bind_values(sqlx::query(&sql), &values);
			self.timed(query.execute(&mut *transaction))
				.await?
				.map_err(|e| MigrationError::DataSeedCommitFailed(format!("{e}\n{sql}")))?;
		}

		transaction
			.commit()
			.await
			.map_err(|e| MigrationError::DataSeedCommitFailed(e.to_string()))
	}
}

#[async_trait]
impl StatementExecutor for SqlxExecutor {
	async fn execute_statements(&self, statements: &[MigrationStatement]) -> Result<()> {
		let mut transaction = self.pool.begin().await?;
		if let Some(isolation) = &self.isolation_statement {
			sqlx::query(isolation).execute(&mut *transaction).await?;
		}

		for statement in statements {
			if statement.sql.trim().is_empty() {
				continue;
			}
			let query = sqlx::query(&statement.sql);
			let outcome = if statement.suppress_transaction {
				self.timed(query.execute(&self.pool)).await?
			} else {
				self.timed(query.execute(&mut *transaction)).await?
			};
			outcome.map_err(|e| MigrationError::StatementExecutionFailed {
				statement: statement.sql.clone(),
				message: e.to_string(),
			})?;
		}

		transaction
			.commit()
			.await
			.map_err(|e| MigrationError::CommitFailed(e.to_string()))
	}

	async fn execute_data_operations(&self, operations: &[DataSeedOperation]) -> Result<()> {
		self.execute_data_operations_inner(operations)
			.await
			.map_err(|e| match e {
				MigrationError::Database(inner) => MigrationError::DataSeedCommitFailed(inner.to_string()),
				other => other,
			})
	}

	async fn execute(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<u64> {
		let (sql, values) = self.positional(sql, params)?;
		let query = bind_values(sqlx::query(&sql), &values);
		let result = self
			.timed(query.execute(&self.pool))
			.await?
			.map_err(|e| MigrationError::StatementExecutionFailed {
				statement: sql.clone(),
				message: e.to_string(),
			})?;
		Ok(result.rows_affected())
	}

	async fn fetch_all(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<Vec<Row>> {
		let (sql, values) = self.positional(sql, params)?;
		let query = bind_values(sqlx::query(&sql), &values);
		let rows = self.timed(query.fetch_all(&self.pool)).await??;
		Ok(rows.iter().map(convert_row).collect())
	}
}

/// Shared pool settings; MySQL connections start at serializable isolation
fn pool_options(dialect: SqlDialect) -> PoolOptions<Any> {
	let options = PoolOptions::<Any>::new()
		.max_connections(4)
		.acquire_timeout(Duration::from_secs(30));
	match dialect.session_isolation() {
		Some(statement) => options.after_connect(move |connection, _meta| {
			Box::pin(async move {
				connection.execute(statement).await?;
				Ok(())
			})
		}),
		None => options,
	}
}

fn bind_values<'q>(
	mut query: Query<'q, Any, AnyArguments<'q>>,
	values: &[SqlValue],
) -> Query<'q, Any, AnyArguments<'q>> {
	for value in values {
		query = match value {
			SqlValue::Null => query.bind(None::<String>),
			SqlValue::Bool(v) => query.bind(*v),
			SqlValue::Int(v) => query.bind(*v),
			SqlValue::Float(v) => query.bind(*v),
			SqlValue::Text(v) => query.bind(v.clone()),
		};
	}
	query
}

fn convert_row(row: &AnyRow) -> Row {
	let mut converted = Row::new();
	for (index, column) in row.columns().iter().enumerate() {
		let value = if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
			SqlValue::from(v)
		} else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
			SqlValue::from(v)
		} else if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
			SqlValue::from(v)
		} else if let Ok(v) = row.try_get::<Option<String>, _>(index) {
			SqlValue::from(v)
		} else {
			SqlValue::Null
		};
		converted.insert(column.name(), value);
	}
	converted
}

/// Creates, checks for and deletes the database named by a connection URL
#[derive(Debug, Clone)]
pub struct SqlxDatabaseAdmin {
	url: String,
}

impl SqlxDatabaseAdmin {
	pub fn new(url: impl Into<String>) -> Self {
		sqlx::any::install_default_drivers();
		Self { url: url.into() }
	}
}

#[async_trait]
impl DatabaseAdmin for SqlxDatabaseAdmin {
	async fn exists(&self) -> Result<bool> {
		Ok(Any::database_exists(&self.url).await?)
	}

	async fn create(&self) -> Result<()> {
		Ok(Any::create_database(&self.url).await?)
	}

	async fn delete(&self) -> Result<()> {
		Ok(Any::drop_database(&self.url).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("postgres://localhost/goods", SqlDialect::Postgres, PlaceholderStyle::Dollar, Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"))]
	#[case("mysql://root@localhost/goods", SqlDialect::Mysql, PlaceholderStyle::Question, None)]
	#[case("sqlite://goods.db?mode=rwc", SqlDialect::Sqlite, PlaceholderStyle::Question, None)]
	#[tokio::test]
	async fn test_lazy_executor_follows_url_dialect(
		#[case] url: &str,
		#[case] dialect: SqlDialect,
		#[case] placeholders: PlaceholderStyle,
		#[case] isolation: Option<&str>,
	) {
		// Act
		let executor = SqlxExecutor::connect_lazy(url).unwrap();

		// Assert
		assert_eq!(executor.dialect(), dialect);
		assert_eq!(executor.placeholder_style(), placeholders);
		assert_eq!(executor.isolation_statement(), isolation);
	}

	#[test]
	fn test_mysql_pool_raises_session_isolation() {
		// MySQL cannot change isolation inside an open transaction, so the
		// session default carries it instead of a per-transaction statement.
		assert_eq!(SqlDialect::Mysql.transaction_isolation(), None);
		assert_eq!(
			SqlDialect::Mysql.session_isolation(),
			Some("SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE")
		);
	}
}
