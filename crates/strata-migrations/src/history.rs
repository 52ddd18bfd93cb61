//! # Migration History
//!
//! Applied migrations are tracked in the `Migration` table, one row per
//! migration and context key. A row is inserted after a migration's schema
//! transaction commits and deleted, by key alone, when it is reverted.

use crate::dialect::SqlDialect;
use crate::executor::StatementExecutor;
use crate::generator::MigrationStatement;
use crate::name::{DEFAULT_SCHEMA, DatabaseName};
use crate::seed::SqlValue;
use crate::version::VersionComparer;
use crate::{MigrationError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default history table name
pub const HISTORY_TABLE: &str = "Migration";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// One applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
	pub migration_id: String,
	pub context_key: String,
	/// Serialized model snapshot; never written by this crate
	pub model: Option<String>,
	pub hash_code: String,
	pub migration_time: DateTime<Utc>,
}

impl HistoryRecord {
	/// A record stamped with the current time
	pub fn new(
		migration_id: impl Into<String>,
		context_key: impl Into<String>,
		hash_code: impl Into<String>,
	) -> Self {
		Self {
			migration_id: migration_id.into(),
			context_key: context_key.into(),
			model: None,
			hash_code: hash_code.into(),
			migration_time: Utc::now(),
		}
	}

	pub fn with_migration_time(mut self, time: DateTime<Utc>) -> Self {
		self.migration_time = time;
		self
	}
}

/// Location and SQL of the history table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTable {
	name: DatabaseName,
	dialect: SqlDialect,
}

impl HistoryTable {
	pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
		Self {
			name: DatabaseName::new(schema, table),
			dialect: SqlDialect::default(),
		}
	}

	/// Render DDL and queries for `dialect` instead of T-SQL
	pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
		self.dialect = dialect;
		self
	}

	pub fn name(&self) -> &DatabaseName {
		&self.name
	}

	pub fn dialect(&self) -> SqlDialect {
		self.dialect
	}

	fn object(&self) -> String {
		self.dialect.object_name(&self.name)
	}

	fn q(&self, identifier: &str) -> String {
		self.dialect.quote(identifier)
	}

	/// Create the table unless it already exists
	pub fn create_if_missing(&self) -> String {
		if self.dialect == SqlDialect::SqlServer {
			let quoted = self.name.quoted();
			return format!(
				"IF OBJECT_ID(N'{quoted}', N'U') IS NULL\n\
				CREATE TABLE {quoted} (\n    \
				[MigrationId] [nvarchar](150) NOT NULL,\n    \
				[ContextKey] [nvarchar](300) NOT NULL,\n    \
				[Model] [varbinary](max),\n    \
				[HashCode] [nvarchar](max),\n    \
				[MigrationTime] [datetime] NOT NULL,\n    \
				CONSTRAINT [PK_{}] PRIMARY KEY ([MigrationId], [ContextKey])\n\
				)",
				self.name
			);
		}

		let (id, context, model, hash, time) = match self.dialect {
			SqlDialect::Postgres => ("varchar(150)", "varchar(300)", "bytea", "text", "timestamp"),
			SqlDialect::Mysql => ("varchar(150)", "varchar(300)", "longblob", "longtext", "datetime(3)"),
			_ => ("TEXT", "TEXT", "BLOB", "TEXT", "TEXT"),
		};
		format!(
			"CREATE TABLE IF NOT EXISTS {} (\n    \
			{} {id} NOT NULL,\n    \
			{} {context} NOT NULL,\n    \
			{} {model},\n    \
			{} {hash},\n    \
			{} {time} NOT NULL,\n    \
			CONSTRAINT {} PRIMARY KEY ({}, {})\n\
			)",
			self.object(),
			self.q("MigrationId"),
			self.q("ContextKey"),
			self.q("Model"),
			self.q("HashCode"),
			self.q("MigrationTime"),
			self.q(&format!("PK_{}", self.name)),
			self.q("MigrationId"),
			self.q("ContextKey"),
		)
	}

	/// Rows of one context, with `Model` as hex text and `MigrationTime` as text
	pub fn select_sql(&self) -> String {
		let (model, time) = match self.dialect {
			SqlDialect::SqlServer => {
				return format!(
					"SELECT [MigrationId], [ContextKey], CONVERT(nvarchar(max), [Model], 2) AS [Model], [HashCode], \
					CONVERT(nvarchar(33), [MigrationTime], 126) AS [MigrationTime] \
					FROM {} WHERE [ContextKey] = @ContextKey",
					self.name.quoted()
				);
			}
			SqlDialect::Postgres => (
				format!("encode({}, 'hex')", self.q("Model")),
				format!("CAST({} AS text)", self.q("MigrationTime")),
			),
			SqlDialect::Mysql => (
				format!("HEX({})", self.q("Model")),
				format!("CAST({} AS CHAR)", self.q("MigrationTime")),
			),
			// hex(NULL) is an empty string in SQLite
			SqlDialect::Sqlite => (
				format!("NULLIF(hex({}), '')", self.q("Model")),
				self.q("MigrationTime"),
			),
		};
		format!(
			"SELECT {id}, {context}, {model} AS {model_alias}, {hash}, {time} AS {time_alias} \
			FROM {table} WHERE {context} = @ContextKey",
			id = self.q("MigrationId"),
			context = self.q("ContextKey"),
			model_alias = self.q("Model"),
			hash = self.q("HashCode"),
			time_alias = self.q("MigrationTime"),
			table = self.object(),
		)
	}

	pub fn insert_sql(&self) -> String {
		let time = match self.dialect {
			SqlDialect::Postgres => "CAST(@MigrationTime AS timestamp)",
			_ => "@MigrationTime",
		};
		format!(
			"INSERT INTO {} ({}, {}, {}, {}) \
			VALUES (@MigrationId, @ContextKey, @HashCode, {time})",
			self.object(),
			self.q("MigrationId"),
			self.q("ContextKey"),
			self.q("HashCode"),
			self.q("MigrationTime"),
		)
	}

	pub fn delete_sql(&self) -> String {
		format!(
			"DELETE FROM {} WHERE {} = @MigrationId AND {} = @ContextKey",
			self.object(),
			self.q("MigrationId"),
			self.q("ContextKey"),
		)
	}
}

impl Default for HistoryTable {
	fn default() -> Self {
		Self::new(DEFAULT_SCHEMA, HISTORY_TABLE)
	}
}

/// Read/write boundary for applied-migration state of one context
#[async_trait]
pub trait HistoryStore: Send + Sync {
	fn context_key(&self) -> &str;

	async fn ensure_table(&self) -> Result<()>;

	/// Records of this context, in no particular order
	async fn applied_records(&self) -> Result<Vec<HistoryRecord>>;

	/// Applied identifiers, ascending
	async fn applied_ids(&self) -> Result<Vec<String>> {
		let mut ids: Vec<String> = self
			.applied_records()
			.await?
			.into_iter()
			.map(|r| r.migration_id)
			.collect();
		VersionComparer::sort_ids(&mut ids)?;
		Ok(ids)
	}

	async fn record_applied(&self, record: HistoryRecord) -> Result<()>;

	/// Delete the row for `migration_id` without loading it first
	async fn remove(&self, migration_id: &str) -> Result<()>;
}

/// History stored in the database behind a [`StatementExecutor`]
pub struct SqlHistoryStore {
	executor: Arc<dyn StatementExecutor>,
	table: HistoryTable,
	context_key: String,
}

impl SqlHistoryStore {
	pub fn new(executor: Arc<dyn StatementExecutor>, context_key: impl Into<String>) -> Self {
		Self {
			executor,
			table: HistoryTable::default(),
			context_key: context_key.into(),
		}
	}

	pub fn with_table(mut self, table: HistoryTable) -> Self {
		self.table = table;
		self
	}

	fn key_params(&self, migration_id: &str) -> Vec<(String, SqlValue)> {
		vec![
			("MigrationId".to_string(), SqlValue::from(migration_id)),
			("ContextKey".to_string(), SqlValue::from(self.context_key.as_str())),
		]
	}
}

#[async_trait]
impl HistoryStore for SqlHistoryStore {
	fn context_key(&self) -> &str {
		&self.context_key
	}

	async fn ensure_table(&self) -> Result<()> {
		self.executor
			.execute_statements(&[MigrationStatement::new(self.table.create_if_missing())])
			.await
	}

	async fn applied_records(&self) -> Result<Vec<HistoryRecord>> {
		let params = vec![(
			"ContextKey".to_string(),
			SqlValue::from(self.context_key.as_str()),
		)];
		let rows = self
			.executor
			.fetch_all(&self.table.select_sql(), &params)
			.await?;

		rows.iter()
			.map(|row| {
				let migration_id = row
					.text("MigrationId")
					.ok_or_else(|| MigrationError::InvalidHistoryRecord(format!("{row:?}")))?;
				Ok(HistoryRecord {
					migration_id: migration_id.to_string(),
					context_key: row.text("ContextKey").unwrap_or(&self.context_key).to_string(),
					model: row.text("Model").map(str::to_string),
					hash_code: row.text("HashCode").unwrap_or_default().to_string(),
					migration_time: parse_time(row.text("MigrationTime").unwrap_or_default())?,
				})
			})
			.collect()
	}

	async fn record_applied(&self, record: HistoryRecord) -> Result<()> {
		let mut params = self.key_params(&record.migration_id);
		params.push(("HashCode".to_string(), SqlValue::from(record.hash_code)));
		params.push((
			"MigrationTime".to_string(),
			SqlValue::from(record.migration_time.format(TIME_FORMAT).to_string()),
		));
		self.executor
			.execute(&self.table.insert_sql(), &params)
			.await?;
		Ok(())
	}

	async fn remove(&self, migration_id: &str) -> Result<()> {
		self.executor
			.execute(&self.table.delete_sql(), &self.key_params(migration_id))
			.await?;
		Ok(())
	}
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
	if let Ok(time) = DateTime::parse_from_rfc3339(value) {
		return Ok(time.with_timezone(&Utc));
	}
	NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
		.or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
		.map(|naive| naive.and_utc())
		.map_err(|e| MigrationError::InvalidHistoryRecord(format!("MigrationTime '{value}': {e}")))
}

/// History kept in process memory
///
/// # Examples
///
/// ```
/// use strata_migrations::{HistoryRecord, HistoryStore, InMemoryHistoryStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryHistoryStore::new("strata");
/// store
///     .record_applied(HistoryRecord::new("1.1.1000_Init", "strata", "hash"))
///     .await
///     .unwrap();
/// assert_eq!(store.applied_ids().await.unwrap(), vec!["1.1.1000_Init"]);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
	context_key: String,
	records: Mutex<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
	pub fn new(context_key: impl Into<String>) -> Self {
		Self {
			context_key: context_key.into(),
			records: Mutex::new(Vec::new()),
		}
	}

	/// Seed with existing rows; rows of other contexts are kept but never returned
	pub fn with_records(self, records: Vec<HistoryRecord>) -> Self {
		self.records.lock().extend(records);
		self
	}

	/// Every stored row, in insertion order
	pub fn records(&self) -> Vec<HistoryRecord> {
		self.records.lock().clone()
	}
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
	fn context_key(&self) -> &str {
		&self.context_key
	}

	async fn ensure_table(&self) -> Result<()> {
		Ok(())
	}

	async fn applied_records(&self) -> Result<Vec<HistoryRecord>> {
		Ok(self
			.records
			.lock()
			.iter()
			.filter(|r| r.context_key == self.context_key)
			.cloned()
			.collect())
	}

	async fn record_applied(&self, record: HistoryRecord) -> Result<()> {
		let mut records = self.records.lock();
		records.retain(|r| !(r.migration_id == record.migration_id && r.context_key == record.context_key));
		records.push(record);
		Ok(())
	}

	async fn remove(&self, migration_id: &str) -> Result<()> {
		self.records
			.lock()
			.retain(|r| !(r.migration_id == migration_id && r.context_key == self.context_key));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::executor::Row;
	use crate::executor::memory::InMemoryExecutor;
	use chrono::TimeZone;

	#[test]
	fn test_create_if_missing_is_keyed_by_id_and_context() {
		let sql = HistoryTable::default().create_if_missing();

		assert!(sql.starts_with("IF OBJECT_ID(N'[dbo].[Migration]', N'U') IS NULL\nCREATE TABLE [dbo].[Migration] ("));
		assert!(sql.contains("CONSTRAINT [PK_dbo.Migration] PRIMARY KEY ([MigrationId], [ContextKey])"));
	}

	#[tokio::test]
	async fn test_sql_store_writes_by_key() {
		// Arrange
		let executor = Arc::new(InMemoryExecutor::new());
		let store = SqlHistoryStore::new(executor.clone(), "strata");
		let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

		// Act
		store
			.record_applied(HistoryRecord::new("1.1.1000_Init", "strata", "abc").with_migration_time(time))
			.await
			.unwrap();
		store.remove("1.1.1000_Init").await.unwrap();

		// Assert
		let commands = executor.commands();
		assert_eq!(commands.len(), 2);
		assert!(commands[0].sql.starts_with("INSERT INTO [dbo].[Migration]"));
		assert_eq!(
			commands[0].param("MigrationTime"),
			Some(&SqlValue::from("2024-03-01T12:30:00.000"))
		);
		assert_eq!(
			commands[1].sql,
			"DELETE FROM [dbo].[Migration] WHERE [MigrationId] = @MigrationId AND [ContextKey] = @ContextKey"
		);
		assert_eq!(commands[1].param("ContextKey"), Some(&SqlValue::from("strata")));
	}

	#[tokio::test]
	async fn test_sql_store_reads_rows() {
		let executor = InMemoryExecutor::new().respond_to(
			"FROM [dbo].[Migration]",
			vec![
				Row::new()
					.with("MigrationId", "1.2.2000_AddExcise")
					.with("ContextKey", "strata")
					.with("Model", SqlValue::Null)
					.with("HashCode", "def")
					.with("MigrationTime", "2024-03-02T08:00:00.500"),
				Row::new()
					.with("MigrationId", "1.1.1000_Init")
					.with("ContextKey", "strata")
					.with("HashCode", "abc")
					.with("MigrationTime", "2024-03-01T12:30:00"),
			],
		);
		let store = SqlHistoryStore::new(Arc::new(executor), "strata");

		let ids = store.applied_ids().await.unwrap();
		let records = store.applied_records().await.unwrap();

		assert_eq!(ids, vec!["1.1.1000_Init", "1.2.2000_AddExcise"]);
		assert_eq!(records[0].model, None);
		assert_eq!(
			records[1].migration_time,
			Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
		);
	}

	#[tokio::test]
	async fn test_malformed_time_is_rejected() {
		let executor = InMemoryExecutor::new().respond_to(
			"FROM [dbo].[Migration]",
			vec![
				Row::new()
					.with("MigrationId", "1.1.1000_Init")
					.with("MigrationTime", "yesterday"),
			],
		);
		let store = SqlHistoryStore::new(Arc::new(executor), "strata");

		let result = store.applied_records().await;

		assert!(matches!(result, Err(MigrationError::InvalidHistoryRecord(_))));
	}

	#[test]
	fn test_postgres_history_sql() {
		let table = HistoryTable::new("public", "Migration").with_dialect(SqlDialect::Postgres);

		let create = table.create_if_missing();
		let insert = table.insert_sql();

		assert!(create.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"Migration\" ("));
		assert!(create.contains("\"Model\" bytea"));
		assert!(create.contains("CONSTRAINT \"PK_public.Migration\" PRIMARY KEY (\"MigrationId\", \"ContextKey\")"));
		assert!(table.select_sql().contains("encode(\"Model\", 'hex') AS \"Model\""));
		assert!(insert.ends_with("VALUES (@MigrationId, @ContextKey, @HashCode, CAST(@MigrationTime AS timestamp))"));
	}

	#[test]
	fn test_sqlite_history_sql_drops_schema() {
		let table = HistoryTable::default().with_dialect(SqlDialect::Sqlite);

		assert!(table.create_if_missing().starts_with("CREATE TABLE IF NOT EXISTS \"Migration\" ("));
		assert!(table.select_sql().contains("NULLIF(hex(\"Model\"), '') AS \"Model\""));
		assert_eq!(
			table.delete_sql(),
			"DELETE FROM \"Migration\" WHERE \"MigrationId\" = @MigrationId AND \"ContextKey\" = @ContextKey"
		);
	}

	#[test]
	fn test_mysql_history_sql_uses_backticks() {
		let table = HistoryTable::default().with_dialect(SqlDialect::Mysql);

		assert!(table.create_if_missing().contains("`MigrationTime` datetime(3) NOT NULL"));
		assert!(table.select_sql().contains("CAST(`MigrationTime` AS CHAR) AS `MigrationTime`"));
	}

	#[rstest::rstest]
	#[case("2024-03-01T12:30:00.000")]
	#[case("2024-03-01 12:30:00")]
	#[case("2024-03-01 12:30:00.000")]
	#[case("2024-03-01T12:30:00Z")]
	fn test_parse_time_accepts_text_casts(#[case] value: &str) {
		let parsed = parse_time(value).unwrap();

		assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
	}

	#[tokio::test]
	async fn test_in_memory_store_is_scoped_to_context() {
		let store = InMemoryHistoryStore::new("strata").with_records(vec![
			HistoryRecord::new("1.1.1000_Init", "strata", "a"),
			HistoryRecord::new("1.1.1000_Init", "other", "b"),
		]);

		store.remove("1.1.1000_Init").await.unwrap();

		assert!(store.applied_ids().await.unwrap().is_empty());
		assert_eq!(store.records().len(), 1);
	}
}
