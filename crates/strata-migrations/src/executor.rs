//! # Statement Execution
//!
//! The boundary between migration planning and the database. The engine hands
//! generated statements and seed operations to a [`StatementExecutor`] and
//! database lifecycle requests to a [`DatabaseAdmin`].
//!
//! Two implementations ship with the crate:
//!
//! - [`any`]: `sqlx` `AnyPool` backed, for real databases
//! - [`memory`]: records every batch, for dry runs and tests

pub mod any;
pub mod memory;

use crate::Result;
use crate::generator::MigrationStatement;
use crate::seed::{DataSeedOperation, SqlValue};
use async_trait::async_trait;
use indexmap::IndexMap;

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
	values: IndexMap<String, SqlValue>,
}

impl Row {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style column setter, mainly for canned rows in tests
	pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
		self.insert(column, value);
		self
	}

	pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
		self.values.insert(column.into(), value.into());
	}

	/// Value of `column`, matched case-insensitively
	pub fn get(&self, column: &str) -> Option<&SqlValue> {
		self.values.get(column).or_else(|| {
			self.values
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case(column))
				.map(|(_, value)| value)
		})
	}

	pub fn text(&self, column: &str) -> Option<&str> {
		match self.get(column)? {
			SqlValue::Text(value) => Some(value),
			_ => None,
		}
	}

	pub fn int(&self, column: &str) -> Option<i64> {
		match self.get(column)? {
			SqlValue::Int(value) => Some(*value),
			SqlValue::Bool(value) => Some(i64::from(*value)),
			_ => None,
		}
	}

	pub fn columns(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(String::as_str)
	}
}

/// Runs migration statements against one database
#[async_trait]
pub trait StatementExecutor: Send + Sync {
	/// Execute `statements` in order inside one serializable transaction
	///
	/// Blank statements are skipped. Statements flagged `suppress_transaction`
	/// run on their own connection outside the transaction. Any failure rolls
	/// the transaction back and is returned.
	async fn execute_statements(&self, statements: &[MigrationStatement]) -> Result<()>;

	/// Execute parameterized seed operations in their own serializable transaction
	async fn execute_data_operations(&self, operations: &[DataSeedOperation]) -> Result<()>;

	/// Run one statement outside any migration transaction, returning rows affected
	///
	/// Parameters bind to `@name` markers, as in seed operations.
	async fn execute(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<u64>;

	/// Run a query outside any migration transaction
	async fn fetch_all(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<Vec<Row>>;
}

/// Database lifecycle operations used around upgrades
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
	async fn exists(&self) -> Result<bool>;

	async fn create(&self) -> Result<()>;

	async fn delete(&self) -> Result<()>;
}
