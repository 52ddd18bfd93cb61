//! Target schema snapshots for foreign key resolution
//!
//! A [`SchemaSnapshot`] maps each known table to its primary key columns. The
//! engine takes one snapshot per batch from a [`SchemaModelProvider`].

use crate::dialect::SqlDialect;
use crate::executor::StatementExecutor;
use crate::name::{DEFAULT_SCHEMA, DatabaseName};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

/// Table name to ordered primary key columns, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
	default_schema: String,
	tables: IndexMap<String, (DatabaseName, Vec<String>)>,
}

impl SchemaSnapshot {
	pub fn new(default_schema: impl Into<String>) -> Self {
		Self {
			default_schema: default_schema.into(),
			tables: IndexMap::new(),
		}
	}

	/// Add `table` (unqualified names get the default schema)
	pub fn with_table(mut self, table: &str, key_columns: &[&str]) -> Result<Self> {
		let name = DatabaseName::parse(table)?;
		self.insert(name, key_columns.iter().map(|c| c.to_string()).collect());
		Ok(self)
	}

	pub fn insert(&mut self, table: DatabaseName, key_columns: Vec<String>) {
		let table = table.with_default_schema(&self.default_schema);
		self.tables.insert(lookup_key(&table), (table, key_columns));
	}

	/// Key columns of `table`, if the snapshot knows it
	pub fn key_columns(&self, table: &DatabaseName) -> Option<&[String]> {
		let table = table.clone().with_default_schema(&self.default_schema);
		self.tables
			.get(&lookup_key(&table))
			.map(|(_, columns)| columns.as_slice())
	}

	pub fn default_schema(&self) -> &str {
		&self.default_schema
	}

	pub fn contains(&self, table: &DatabaseName) -> bool {
		self.key_columns(table).is_some()
	}

	pub fn tables(&self) -> impl Iterator<Item = &DatabaseName> {
		self.tables.values().map(|(name, _)| name)
	}

	pub fn len(&self) -> usize {
		self.tables.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}
}

impl Default for SchemaSnapshot {
	fn default() -> Self {
		Self::new(DEFAULT_SCHEMA)
	}
}

fn lookup_key(table: &DatabaseName) -> String {
	table.to_string().to_lowercase()
}

/// Source of the target schema model
#[async_trait]
pub trait SchemaModelProvider: Send + Sync {
	async fn snapshot(&self) -> Result<SchemaSnapshot>;
}

/// Serves a fixed snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaProvider {
	snapshot: SchemaSnapshot,
}

impl StaticSchemaProvider {
	pub fn new(snapshot: SchemaSnapshot) -> Self {
		Self { snapshot }
	}
}

#[async_trait]
impl SchemaModelProvider for StaticSchemaProvider {
	async fn snapshot(&self) -> Result<SchemaSnapshot> {
		Ok(self.snapshot.clone())
	}
}

/// Reads primary keys of the live database from its catalog views
pub struct IntrospectingSchemaProvider {
	executor: Arc<dyn StatementExecutor>,
	default_schema: String,
	dialect: SqlDialect,
}

impl IntrospectingSchemaProvider {
	pub fn new(executor: Arc<dyn StatementExecutor>) -> Self {
		Self {
			executor,
			default_schema: DEFAULT_SCHEMA.to_string(),
			dialect: SqlDialect::default(),
		}
	}

	pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
		self.dialect = dialect;
		self
	}

	pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
		self.default_schema = schema.into();
		self
	}
}

#[async_trait]
impl SchemaModelProvider for IntrospectingSchemaProvider {
	async fn snapshot(&self) -> Result<SchemaSnapshot> {
		let rows = self.executor.fetch_all(self.dialect.primary_key_query(), &[]).await?;

		let mut grouped: IndexMap<DatabaseName, Vec<String>> = IndexMap::new();
		for row in &rows {
			let (Some(table), Some(column)) = (row.text("TABLE_NAME"), row.text("COLUMN_NAME")) else {
				return Err(MigrationError::InvalidOperation(format!(
					"Primary key row without table or column: {row:?}"
				)));
			};
			let schema = row.text("TABLE_SCHEMA").unwrap_or(&self.default_schema);
			grouped
				.entry(DatabaseName::new(schema, table))
				.or_default()
				.push(column.to_string());
		}

		let mut snapshot = SchemaSnapshot::new(self.default_schema.clone());
		for (table, columns) in grouped {
			snapshot.insert(table, columns);
		}
		tracing::debug!(tables = snapshot.len(), "Loaded schema snapshot");
		Ok(snapshot)
	}
}
