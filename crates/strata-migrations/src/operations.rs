//! Migration operations
//!
//! Operations are plain data collected by a [`MigrationBuilder`](crate::MigrationBuilder)
//! and turned into SQL by a [`SqlGenerator`](crate::SqlGenerator). Every table,
//! view, trigger and procedure name is a [`DatabaseName`] that already carries
//! its schema by the time it lands here.

pub mod templates;

use crate::name::DatabaseName;
use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};

/// Column definition used by table and column operations
///
/// # Examples
///
/// ```
/// use strata_migrations::ColumnDefinition;
///
/// let id = ColumnDefinition::new("Id", "int").not_null().identity();
/// assert!(!id.nullable);
/// assert!(id.identity);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
	pub name: String,
	/// Store type as written in DDL, e.g. `int` or `nvarchar(max)`
	pub store_type: String,
	#[serde(default = "default_nullable")]
	pub nullable: bool,
	#[serde(default)]
	pub identity: bool,
	/// Literal default value, e.g. `0`
	#[serde(default)]
	pub default_value: Option<String>,
	/// SQL expression default, e.g. `GETUTCDATE()`
	#[serde(default)]
	pub default_sql: Option<String>,
}

fn default_nullable() -> bool {
	true
}

impl ColumnDefinition {
	pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			store_type: store_type.into(),
			nullable: true,
			identity: false,
			default_value: None,
			default_sql: None,
		}
	}

	pub fn not_null(mut self) -> Self {
		self.nullable = false;
		self
	}

	pub fn identity(mut self) -> Self {
		self.identity = true;
		self
	}

	pub fn with_default_value(mut self, value: impl Into<String>) -> Self {
		self.default_value = Some(value.into());
		self
	}

	pub fn with_default_sql(mut self, sql: impl Into<String>) -> Self {
		self.default_sql = Some(sql.into());
		self
	}
}

/// Primary key over an ordered column list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
	/// Constraint name; `PK_<schema>.<table>` when absent
	pub name: Option<String>,
	pub columns: Vec<String>,
}

impl PrimaryKey {
	pub fn new(columns: &[&str]) -> Self {
		Self {
			name: None,
			columns: columns.iter().map(|c| c.to_string()).collect(),
		}
	}

	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Constraint name for `table`
	pub fn constraint_name(&self, table: &DatabaseName) -> String {
		self.name
			.clone()
			.unwrap_or_else(|| default_primary_key_name(table))
	}
}

pub(crate) fn default_primary_key_name(table: &DatabaseName) -> String {
	format!("PK_{}", table)
}

/// Stored procedure parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
	/// Name without the leading `@`
	pub name: String,
	pub store_type: String,
}

impl ParameterDefinition {
	pub fn new(name: impl Into<String>, store_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			store_type: store_type.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableOperation {
	pub name: DatabaseName,
	pub columns: Vec<ColumnDefinition>,
	#[serde(default)]
	pub primary_key: Option<PrimaryKey>,
}

/// Foreign key from a dependent table to a principal table
///
/// `principal_columns` may be empty until
/// [`ForeignKeyResolver`](crate::ForeignKeyResolver) fills it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddForeignKeyOperation {
	pub name: Option<String>,
	pub dependent_table: DatabaseName,
	pub dependent_columns: Vec<String>,
	pub principal_table: DatabaseName,
	#[serde(default)]
	pub principal_columns: Vec<String>,
	#[serde(default)]
	pub cascade_delete: bool,
}

impl AddForeignKeyOperation {
	pub fn has_principal_columns(&self) -> bool {
		!self.principal_columns.is_empty()
	}

	/// `FK_dbo.Goods_dbo.GoodGroups_GoodGroupId` unless a name was given
	pub fn constraint_name(&self) -> String {
		self.name.clone().unwrap_or_else(|| {
			default_foreign_key_name(
				&self.dependent_table,
				&self.principal_table,
				&self.dependent_columns,
			)
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropForeignKeyOperation {
	pub name: Option<String>,
	pub dependent_table: DatabaseName,
	#[serde(default)]
	pub dependent_columns: Vec<String>,
	pub principal_table: DatabaseName,
}

impl DropForeignKeyOperation {
	pub fn constraint_name(&self) -> String {
		self.name.clone().unwrap_or_else(|| {
			default_foreign_key_name(
				&self.dependent_table,
				&self.principal_table,
				&self.dependent_columns,
			)
		})
	}
}

fn default_foreign_key_name(
	dependent: &DatabaseName,
	principal: &DatabaseName,
	columns: &[String],
) -> String {
	format!("FK_{}_{}_{}", dependent, principal, columns.join("_"))
}

/// Trigger pair emulating a foreign key between two tables of one schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTrigger {
	pub schema: String,
	pub dependent_table: String,
	pub dependent_column: String,
	pub principal_table: String,
	pub principal_column: String,
}

/// A single schema change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
	CreateTable(CreateTableOperation),
	DropTable {
		name: DatabaseName,
	},
	AddColumn {
		table: DatabaseName,
		column: ColumnDefinition,
	},
	DropColumn {
		table: DatabaseName,
		column: String,
	},
	AlterColumn {
		table: DatabaseName,
		column: ColumnDefinition,
	},
	AddForeignKey(AddForeignKeyOperation),
	DropForeignKey(DropForeignKeyOperation),
	AddPrimaryKey {
		table: DatabaseName,
		primary_key: PrimaryKey,
	},
	DropPrimaryKey {
		table: DatabaseName,
		name: Option<String>,
	},
	CreateIndex {
		table: DatabaseName,
		columns: Vec<String>,
		#[serde(default)]
		unique: bool,
		#[serde(default)]
		name: Option<String>,
	},
	DropIndex {
		table: DatabaseName,
		columns: Vec<String>,
		#[serde(default)]
		name: Option<String>,
	},
	RenameTable {
		table: DatabaseName,
		new_name: String,
	},
	RenameColumn {
		table: DatabaseName,
		column: String,
		new_name: String,
	},
	MoveTable {
		table: DatabaseName,
		new_schema: String,
	},
	/// `definition` is the complete `CREATE VIEW` statement
	CreateView {
		name: DatabaseName,
		definition: String,
	},
	DropView {
		name: DatabaseName,
	},
	/// `definition` is the complete `CREATE TRIGGER` statement
	CreateTrigger {
		name: DatabaseName,
		definition: String,
	},
	DropTrigger {
		name: DatabaseName,
	},
	CreateForeignKeyTriggers(ForeignKeyTrigger),
	DropForeignKeyTriggers(ForeignKeyTrigger),
	CreateProcedure {
		name: DatabaseName,
		#[serde(default)]
		parameters: Vec<ParameterDefinition>,
		body: String,
	},
	DropProcedure {
		name: DatabaseName,
	},
	Sql {
		sql: String,
		#[serde(default)]
		suppress_transaction: bool,
	},
}

impl Operation {
	/// Short operation name used in logs and error messages
	pub fn kind(&self) -> &'static str {
		match self {
			Operation::CreateTable(_) => "CreateTable",
			Operation::DropTable { .. } => "DropTable",
			Operation::AddColumn { .. } => "AddColumn",
			Operation::DropColumn { .. } => "DropColumn",
			Operation::AlterColumn { .. } => "AlterColumn",
			Operation::AddForeignKey(_) => "AddForeignKey",
			Operation::DropForeignKey(_) => "DropForeignKey",
			Operation::AddPrimaryKey { .. } => "AddPrimaryKey",
			Operation::DropPrimaryKey { .. } => "DropPrimaryKey",
			Operation::CreateIndex { .. } => "CreateIndex",
			Operation::DropIndex { .. } => "DropIndex",
			Operation::RenameTable { .. } => "RenameTable",
			Operation::RenameColumn { .. } => "RenameColumn",
			Operation::MoveTable { .. } => "MoveTable",
			Operation::CreateView { .. } => "CreateView",
			Operation::DropView { .. } => "DropView",
			Operation::CreateTrigger { .. } => "CreateTrigger",
			Operation::DropTrigger { .. } => "DropTrigger",
			Operation::CreateForeignKeyTriggers(_) => "CreateForeignKeyTriggers",
			Operation::DropForeignKeyTriggers(_) => "DropForeignKeyTriggers",
			Operation::CreateProcedure { .. } => "CreateProcedure",
			Operation::DropProcedure { .. } => "DropProcedure",
			Operation::Sql { .. } => "Sql",
		}
	}

	/// Reject operations with empty table, column or object names
	pub fn validate(&self) -> Result<()> {
		let mut names: Vec<&str> = Vec::new();
		let mut lists: Vec<&[String]> = Vec::new();
		match self {
			Operation::CreateTable(op) => {
				names.push(&op.name.name);
				names.extend(op.columns.iter().map(|c| c.name.as_str()));
				if op.columns.is_empty() {
					return Err(self.invalid("table has no columns"));
				}
				if let Some(pk) = &op.primary_key {
					lists.push(&pk.columns);
				}
			}
			Operation::DropTable { name }
			| Operation::DropView { name }
			| Operation::DropTrigger { name }
			| Operation::DropProcedure { name } => names.push(&name.name),
			Operation::AddColumn { table, column } | Operation::AlterColumn { table, column } => {
				names.push(&table.name);
				names.push(&column.name);
			}
			Operation::DropColumn { table, column } => {
				names.push(&table.name);
				names.push(column);
			}
			Operation::AddForeignKey(op) => {
				names.push(&op.dependent_table.name);
				names.push(&op.principal_table.name);
				lists.push(&op.dependent_columns);
			}
			Operation::DropForeignKey(op) => {
				names.push(&op.dependent_table.name);
				names.push(&op.principal_table.name);
			}
			Operation::AddPrimaryKey { table, primary_key } => {
				names.push(&table.name);
				lists.push(&primary_key.columns);
			}
			Operation::DropPrimaryKey { table, .. } => names.push(&table.name),
			Operation::CreateIndex { table, columns, .. }
			| Operation::DropIndex { table, columns, .. } => {
				names.push(&table.name);
				lists.push(columns);
			}
			Operation::RenameTable { table, new_name } => {
				names.push(&table.name);
				names.push(new_name);
			}
			Operation::RenameColumn {
				table,
				column,
				new_name,
			} => {
				names.push(&table.name);
				names.push(column);
				names.push(new_name);
			}
			Operation::MoveTable { table, new_schema } => {
				names.push(&table.name);
				names.push(new_schema);
			}
			Operation::CreateView { name, .. }
			| Operation::CreateTrigger { name, .. }
			| Operation::CreateProcedure { name, .. } => names.push(&name.name),
			Operation::CreateForeignKeyTriggers(trigger)
			| Operation::DropForeignKeyTriggers(trigger) => {
				names.extend([
					trigger.schema.as_str(),
					trigger.dependent_table.as_str(),
					trigger.dependent_column.as_str(),
					trigger.principal_table.as_str(),
					trigger.principal_column.as_str(),
				]);
			}
			Operation::Sql { .. } => {}
		}

		if names.iter().any(|n| n.trim().is_empty()) {
			return Err(self.invalid("name must not be empty"));
		}
		for list in lists {
			if list.is_empty() {
				return Err(self.invalid("column list must not be empty"));
			}
			if list.iter().any(|c| c.trim().is_empty()) {
				return Err(self.invalid("column name must not be empty"));
			}
		}
		Ok(())
	}

	fn invalid(&self, reason: &str) -> MigrationError {
		MigrationError::InvalidOperation(format!("{}: {}", self.kind(), reason))
	}
}
