//! Data seed operations
//!
//! Seed operations are parameterized statements run after the schema
//! transaction of a migration, in a transaction of their own. Parameters use
//! named `@column` placeholders; [`DataSeedOperation::bind_positional`]
//! rewrites them for drivers that only understand positional markers.

use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};

/// A bind value for a data seed statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
}

impl From<bool> for SqlValue {
	fn from(value: bool) -> Self {
		SqlValue::Bool(value)
	}
}

impl From<i32> for SqlValue {
	fn from(value: i32) -> Self {
		SqlValue::Int(value.into())
	}
}

impl From<i64> for SqlValue {
	fn from(value: i64) -> Self {
		SqlValue::Int(value)
	}
}

impl From<f64> for SqlValue {
	fn from(value: f64) -> Self {
		SqlValue::Float(value)
	}
}

impl From<&str> for SqlValue {
	fn from(value: &str) -> Self {
		SqlValue::Text(value.to_string())
	}
}

impl From<String> for SqlValue {
	fn from(value: String) -> Self {
		SqlValue::Text(value)
	}
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(SqlValue::Null, Into::into)
	}
}

/// Positional placeholder syntax of the target driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
	/// `?` (SQLite, MySQL)
	Question,
	/// `$1`, `$2`, ... (PostgreSQL)
	Dollar,
	/// Keep `@name` markers untouched (SQL Server)
	Named,
}

/// One parameterized seed statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSeedOperation {
	pub sql: String,
	/// Parameter name (without `@`) and value, in declaration order
	#[serde(default)]
	pub params: Vec<(String, SqlValue)>,
}

impl DataSeedOperation {
	/// A statement with no parameters
	pub fn raw(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			params: Vec::new(),
		}
	}

	pub fn param(&self, name: &str) -> Option<&SqlValue> {
		self.params
			.iter()
			.find(|(n, _)| n.eq_ignore_ascii_case(name))
			.map(|(_, v)| v)
	}

	/// Rewrite `@name` markers for `style` and return the values in marker order
	///
	/// A marker without a matching parameter fails with
	/// [`MigrationError::InvalidOperation`]. `@@` (T-SQL globals) is left alone.
	pub fn bind_positional(&self, style: PlaceholderStyle) -> Result<(String, Vec<SqlValue>)> {
		if style == PlaceholderStyle::Named || self.params.is_empty() {
			let values = self.params.iter().map(|(_, v)| v.clone()).collect();
			return Ok((self.sql.clone(), values));
		}

		let mut sql = String::with_capacity(self.sql.len());
		let mut values = Vec::new();
		let mut chars = self.sql.char_indices().peekable();

		while let Some((_, ch)) = chars.next() {
			if ch != '@' {
				sql.push(ch);
				continue;
			}
			if let Some(&(_, '@')) = chars.peek() {
				sql.push_str("@@");
				chars.next();
				continue;
			}

			let mut name = String::new();
			while let Some(&(_, next)) = chars.peek()
				&& (next.is_alphanumeric() || next == '_')
			{
				name.push(next);
				chars.next();
			}
			if name.is_empty() {
				sql.push('@');
				continue;
			}

			let value = self.param(&name).cloned().ok_or_else(|| {
				MigrationError::InvalidOperation(format!(
					"Data seed parameter @{} has no value in: {}",
					name, self.sql
				))
			})?;
			values.push(value);
			if style == PlaceholderStyle::Dollar {
				sql.push_str(&format!("${}", values.len()));
			} else {
				sql.push('?');
			}
		}

		Ok((sql, values))
	}
}

/// Collects `INSERT` seed statements for one table
pub struct InsertBuilder<'a> {
	table: String,
	columns: Vec<String>,
	sink: &'a mut Vec<DataSeedOperation>,
}

impl<'a> InsertBuilder<'a> {
	pub(crate) fn new(table: String, columns: Vec<String>, sink: &'a mut Vec<DataSeedOperation>) -> Self {
		Self {
			table,
			columns,
			sink,
		}
	}

	/// Queue `INSERT INTO t (a,b) Values(@a,@b)` with `values` bound in column order
	pub fn insert_or_update<I, V>(&mut self, values: I) -> Result<&mut Self>
	where
		I: IntoIterator<Item = V>,
		V: Into<SqlValue>,
	{
		let params = zip_params(&self.table, &self.columns, values)?;
		self.sink.push(DataSeedOperation {
			sql: format!(
				"INSERT INTO {} ({}) Values(@{})",
				self.table,
				self.columns.join(","),
				self.columns.join(",@")
			),
			params,
		});
		Ok(self)
	}
}

/// Collects keyed `UPDATE` seed statements for one table
pub struct UpdateBuilder<'a> {
	table: String,
	key_column: String,
	columns: Vec<String>,
	sink: &'a mut Vec<DataSeedOperation>,
}

impl<'a> UpdateBuilder<'a> {
	pub(crate) fn new(
		table: String,
		key_column: String,
		columns: Vec<String>,
		sink: &'a mut Vec<DataSeedOperation>,
	) -> Self {
		Self {
			table,
			key_column,
			columns,
			sink,
		}
	}

	/// Queue `UPDATE t SET a = @a, b = @b WHERE k = @k`
	pub fn update<K, I, V>(&mut self, key: K, values: I) -> Result<&mut Self>
	where
		K: Into<SqlValue>,
		I: IntoIterator<Item = V>,
		V: Into<SqlValue>,
	{
		let mut params = zip_params(&self.table, &self.columns, values)?;
		params.push((self.key_column.clone(), key.into()));

		let assignments: Vec<String> = self
			.columns
			.iter()
			.map(|c| format!("{c} = @{c}"))
			.collect();
		self.sink.push(DataSeedOperation {
			sql: format!(
				"UPDATE {} SET {} WHERE {k} = @{k}",
				self.table,
				assignments.join(", "),
				k = self.key_column
			),
			params,
		});
		Ok(self)
	}
}

fn zip_params<I, V>(table: &str, columns: &[String], values: I) -> Result<Vec<(String, SqlValue)>>
where
	I: IntoIterator<Item = V>,
	V: Into<SqlValue>,
{
	let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
	if values.len() != columns.len() {
		return Err(MigrationError::InvalidOperation(format!(
			"Seed row for {} has {} values for {} columns",
			table,
			values.len(),
			columns.len()
		)));
	}
	Ok(columns.iter().cloned().zip(values).collect())
}
