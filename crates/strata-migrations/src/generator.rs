//! SQL generation from migration operations

use crate::dialect::SqlDialect;
use crate::name::{DatabaseName, quote_identifier};
use crate::operations::{
	AddForeignKeyOperation, ColumnDefinition, CreateTableOperation, Operation,
	ParameterDefinition, default_primary_key_name, templates,
};
use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INDENT: &str = "    ";

/// One executable SQL batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatement {
	pub sql: String,
	/// Run outside the migration transaction
	#[serde(default)]
	pub suppress_transaction: bool,
}

impl MigrationStatement {
	pub fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			suppress_transaction: false,
		}
	}

	pub fn without_transaction(mut self) -> Self {
		self.suppress_transaction = true;
		self
	}
}

/// Turns operations into executable statements for one database provider
pub trait SqlGenerator: Send + Sync {
	/// Generate statements for `operations`, in order
	fn generate(&self, operations: &[Operation]) -> Result<Vec<MigrationStatement>>;

	/// Provider identification, e.g. a server version token
	fn provider_token(&self) -> &str;

	/// Dialect of the generated SQL, used for history and view bookkeeping
	fn dialect(&self) -> SqlDialect {
		SqlDialect::SqlServer
	}
}

/// T-SQL generator with bracket-quoted identifiers
#[derive(Debug, Clone)]
pub struct SqlServerGenerator {
	provider_token: String,
}

impl SqlServerGenerator {
	pub fn new() -> Self {
		Self {
			provider_token: "2008".to_string(),
		}
	}

	pub fn with_provider_token(mut self, token: impl Into<String>) -> Self {
		self.provider_token = token.into();
		self
	}

	fn generate_operation(&self, operation: &Operation, out: &mut Vec<MigrationStatement>) {
		let mut push = |sql: String| out.push(MigrationStatement::new(sql));

		match operation {
			Operation::CreateTable(op) => push(create_table(op)),
			Operation::DropTable { name } => push(format!("DROP TABLE {}", name.quoted())),
			Operation::AddColumn { table, column } => push(format!(
				"ALTER TABLE {} ADD {}",
				table.quoted(),
				column_definition(column, true)
			)),
			Operation::DropColumn { table, column } => push(format!(
				"ALTER TABLE {} DROP COLUMN {}",
				table.quoted(),
				quote_identifier(column)
			)),
			Operation::AlterColumn { table, column } => push(format!(
				"ALTER TABLE {} ALTER COLUMN {}",
				table.quoted(),
				column_definition(column, false)
			)),
			Operation::AddForeignKey(op) => push(add_foreign_key(op)),
			Operation::DropForeignKey(op) => push(format!(
				"ALTER TABLE {} DROP CONSTRAINT {}",
				op.dependent_table.quoted(),
				quote_identifier(&op.constraint_name())
			)),
			Operation::AddPrimaryKey { table, primary_key } => push(format!(
				"ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
				table.quoted(),
				quote_identifier(&primary_key.constraint_name(table)),
				quote_list(&primary_key.columns)
			)),
			Operation::DropPrimaryKey { table, name } => {
				let name = name
					.clone()
					.unwrap_or_else(|| default_primary_key_name(table));
				push(format!(
					"ALTER TABLE {} DROP CONSTRAINT {}",
					table.quoted(),
					quote_identifier(&name)
				))
			}
			Operation::CreateIndex {
				table,
				columns,
				unique,
				name,
			} => push(format!(
				"CREATE {}INDEX {} ON {}({})",
				if *unique { "UNIQUE " } else { "" },
				quote_identifier(&index_name(name, columns)),
				table.quoted(),
				quote_list(columns)
			)),
			Operation::DropIndex {
				table,
				columns,
				name,
			} => push(format!(
				"DROP INDEX {} ON {}",
				quote_identifier(&index_name(name, columns)),
				table.quoted()
			)),
			Operation::RenameTable { table, new_name } => {
				push(sp_rename(&table.to_string(), new_name, "OBJECT"))
			}
			Operation::RenameColumn {
				table,
				column,
				new_name,
			} => push(sp_rename(
				&format!("{}.{}", table, column),
				new_name,
				"COLUMN",
			)),
			Operation::MoveTable { table, new_schema } => push(format!(
				"ALTER SCHEMA {} TRANSFER {}",
				quote_identifier(new_schema),
				table.quoted()
			)),
			Operation::CreateView { definition, .. }
			| Operation::CreateTrigger { definition, .. } => push(definition.clone()),
			Operation::DropView { name } => push(templates::drop_view(name)),
			Operation::DropTrigger { name } => push(templates::drop_trigger(name)),
			Operation::CreateForeignKeyTriggers(trigger) => {
				templates::foreign_key_triggers(trigger).into_iter().for_each(push)
			}
			Operation::DropForeignKeyTriggers(trigger) => {
				templates::drop_foreign_key_triggers(trigger).into_iter().for_each(push)
			}
			Operation::CreateProcedure {
				name,
				parameters,
				body,
			} => push(create_procedure(name, parameters, body)),
			Operation::DropProcedure { name } => {
				push(format!("DROP PROCEDURE {}", name.quoted()))
			}
			Operation::Sql {
				sql,
				suppress_transaction,
			} => {
				let statement = MigrationStatement::new(sql.clone());
				out.push(if *suppress_transaction {
					statement.without_transaction()
				} else {
					statement
				});
			}
		}
	}
}

impl Default for SqlServerGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl SqlGenerator for SqlServerGenerator {
	fn generate(&self, operations: &[Operation]) -> Result<Vec<MigrationStatement>> {
		let mut statements = Vec::with_capacity(operations.len());
		for operation in operations {
			operation.validate()?;
			self.generate_operation(operation, &mut statements);
		}
		Ok(statements)
	}

	fn provider_token(&self) -> &str {
		&self.provider_token
	}
}

/// SQL for the backends reachable through `sqlx`: PostgreSQL, MySQL and SQLite
///
/// Store types are written SQL Server style and mapped per dialect. SQLite
/// cannot add constraints to an existing table, so foreign keys of tables
/// created in the same batch are folded into their `CREATE TABLE`. Operations
/// a dialect has no equivalent for fail with [`MigrationError::InvalidOperation`].
///
/// # Examples
///
/// ```
/// use strata_migrations::{
///     ColumnDefinition, CreateTableOperation, DatabaseName, Operation, PrimaryKey, SqlDialect,
///     SqlGenerator, StandardSqlGenerator,
/// };
///
/// let generator = StandardSqlGenerator::new(SqlDialect::Postgres);
/// let statements = generator
///     .generate(&[Operation::CreateTable(CreateTableOperation {
///         name: DatabaseName::new("public", "Goods"),
///         columns: vec![ColumnDefinition::new("Id", "int").not_null()],
///         primary_key: Some(PrimaryKey::new(&["Id"])),
///     })])
///     .unwrap();
/// assert_eq!(
///     statements[0].sql,
///     "CREATE TABLE \"public\".\"Goods\" (\n    \"Id\" int NOT NULL,\n    CONSTRAINT \"PK_public.Goods\" PRIMARY KEY (\"Id\")\n)"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct StandardSqlGenerator {
	dialect: SqlDialect,
}

impl StandardSqlGenerator {
	pub fn new(dialect: SqlDialect) -> Self {
		Self { dialect }
	}

	fn name(&self, name: &DatabaseName) -> String {
		self.dialect.object_name(name)
	}

	fn quote(&self, identifier: &str) -> String {
		self.dialect.quote(identifier)
	}

	fn quote_list(&self, columns: &[String]) -> String {
		columns
			.iter()
			.map(|c| self.quote(c))
			.collect::<Vec<_>>()
			.join(", ")
	}

	fn unsupported(&self, operation: &Operation) -> MigrationError {
		MigrationError::InvalidOperation(format!(
			"{} is not supported by the {:?} dialect",
			operation.kind(),
			self.dialect
		))
	}

	fn column_definition(&self, column: &ColumnDefinition, with_defaults: bool) -> String {
		let mut sql = format!(
			"{} {}",
			self.quote(&column.name),
			self.dialect.store_type(&column.store_type)
		);
		if !column.nullable {
			sql.push_str(" NOT NULL");
		}
		if with_defaults {
			if let Some(value) = &column.default_value {
				sql.push_str(&format!(" DEFAULT {}", value));
			} else if let Some(expression) = &column.default_sql {
				sql.push_str(&format!(" DEFAULT {}", expression));
			}
		}
		if column.identity {
			match self.dialect {
				SqlDialect::Postgres => sql.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
				SqlDialect::Mysql => sql.push_str(" AUTO_INCREMENT"),
				// An INTEGER primary key is already the rowid
				SqlDialect::Sqlite | SqlDialect::SqlServer => {}
			}
		}
		sql
	}

	fn foreign_key_clause(&self, op: &AddForeignKeyOperation) -> String {
		let mut sql = format!(
			"CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
			self.quote(&op.constraint_name()),
			self.quote_list(&op.dependent_columns),
			self.name(&op.principal_table)
		);
		if op.has_principal_columns() {
			sql.push_str(&format!(" ({})", self.quote_list(&op.principal_columns)));
		}
		if op.cascade_delete {
			sql.push_str(" ON DELETE CASCADE");
		}
		sql
	}

	fn create_table(&self, op: &CreateTableOperation, foreign_keys: &[&AddForeignKeyOperation]) -> String {
		let mut lines: Vec<String> = op
			.columns
			.iter()
			.map(|c| format!("{INDENT}{}", self.column_definition(c, true)))
			.collect();
		if let Some(pk) = &op.primary_key {
			lines.push(format!(
				"{INDENT}CONSTRAINT {} PRIMARY KEY ({})",
				self.quote(&pk.constraint_name(&op.name)),
				self.quote_list(&pk.columns)
			));
		}
		lines.extend(
			foreign_keys
				.iter()
				.map(|fk| format!("{INDENT}{}", self.foreign_key_clause(fk))),
		);
		format!("CREATE TABLE {} (\n{}\n)", self.name(&op.name), lines.join(",\n"))
	}

	fn index_name(&self, table: &DatabaseName, name: &Option<String>, columns: &[String]) -> String {
		// Index names are schema-wide outside SQL Server
		name.clone()
			.unwrap_or_else(|| format!("IX_{}_{}", table.name, columns.join("_")))
	}

	fn generate_operation(&self, operation: &Operation, out: &mut Vec<MigrationStatement>) -> Result<()> {
		let dialect = self.dialect;
		let sql = match operation {
			Operation::CreateTable(op) => self.create_table(op, &[]),
			Operation::DropTable { name } => format!("DROP TABLE {}", self.name(name)),
			Operation::AddColumn { table, column } => format!(
				"ALTER TABLE {} ADD COLUMN {}",
				self.name(table),
				self.column_definition(column, true)
			),
			Operation::DropColumn { table, column } => format!(
				"ALTER TABLE {} DROP COLUMN {}",
				self.name(table),
				self.quote(column)
			),
			Operation::AlterColumn { table, column } => match dialect {
				SqlDialect::Postgres => {
					let quoted = self.quote(&column.name);
					format!(
						"ALTER TABLE {} ALTER COLUMN {quoted} TYPE {}, ALTER COLUMN {quoted} {} NOT NULL",
						self.name(table),
						dialect.store_type(&column.store_type),
						if column.nullable { "DROP" } else { "SET" }
					)
				}
				SqlDialect::Mysql => format!(
					"ALTER TABLE {} MODIFY COLUMN {}",
					self.name(table),
					self.column_definition(column, false)
				),
				_ => return Err(self.unsupported(operation)),
			},
			Operation::AddForeignKey(op) if dialect != SqlDialect::Sqlite => format!(
				"ALTER TABLE {} ADD {}",
				self.name(&op.dependent_table),
				self.foreign_key_clause(op)
			),
			Operation::DropForeignKey(op) => match dialect {
				SqlDialect::Postgres => format!(
					"ALTER TABLE {} DROP CONSTRAINT {}",
					self.name(&op.dependent_table),
					self.quote(&op.constraint_name())
				),
				SqlDialect::Mysql => format!(
					"ALTER TABLE {} DROP FOREIGN KEY {}",
					self.name(&op.dependent_table),
					self.quote(&op.constraint_name())
				),
				_ => return Err(self.unsupported(operation)),
			},
			Operation::AddPrimaryKey { table, primary_key } if dialect != SqlDialect::Sqlite => format!(
				"ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
				self.name(table),
				self.quote(&primary_key.constraint_name(table)),
				self.quote_list(&primary_key.columns)
			),
			Operation::DropPrimaryKey { table, name } => match dialect {
				SqlDialect::Postgres => format!(
					"ALTER TABLE {} DROP CONSTRAINT {}",
					self.name(table),
					self.quote(&name.clone().unwrap_or_else(|| default_primary_key_name(table)))
				),
				SqlDialect::Mysql => format!("ALTER TABLE {} DROP PRIMARY KEY", self.name(table)),
				_ => return Err(self.unsupported(operation)),
			},
			Operation::CreateIndex {
				table,
				columns,
				unique,
				name,
			} => format!(
				"CREATE {}INDEX {} ON {} ({})",
				if *unique { "UNIQUE " } else { "" },
				self.quote(&self.index_name(table, name, columns)),
				self.name(table),
				self.quote_list(columns)
			),
			Operation::DropIndex {
				table,
				columns,
				name,
			} => {
				let index = self.index_name(table, name, columns);
				match dialect {
					SqlDialect::Postgres => format!(
						"DROP INDEX {}",
						self.name(&DatabaseName {
							schema: table.schema.clone(),
							name: index,
						})
					),
					SqlDialect::Mysql => {
						format!("DROP INDEX {} ON {}", self.quote(&index), self.name(table))
					}
					_ => format!("DROP INDEX {}", self.quote(&index)),
				}
			}
			Operation::RenameTable { table, new_name } => format!(
				"ALTER TABLE {} RENAME TO {}",
				self.name(table),
				self.quote(new_name)
			),
			Operation::RenameColumn {
				table,
				column,
				new_name,
			} => format!(
				"ALTER TABLE {} RENAME COLUMN {} TO {}",
				self.name(table),
				self.quote(column),
				self.quote(new_name)
			),
			Operation::MoveTable { table, new_schema } if dialect == SqlDialect::Postgres => format!(
				"ALTER TABLE {} SET SCHEMA {}",
				self.name(table),
				self.quote(new_schema)
			),
			Operation::CreateView { definition, .. }
			| Operation::CreateTrigger { definition, .. } => definition.clone(),
			Operation::DropView { name } => format!("DROP VIEW IF EXISTS {}", self.name(name)),
			Operation::DropTrigger { name } if dialect != SqlDialect::Postgres => {
				format!("DROP TRIGGER IF EXISTS {}", self.name(name))
			}
			Operation::Sql {
				sql,
				suppress_transaction,
			} => {
				let statement = MigrationStatement::new(sql.clone());
				out.push(if *suppress_transaction {
					statement.without_transaction()
				} else {
					statement
				});
				return Ok(());
			}
			_ => return Err(self.unsupported(operation)),
		};
		out.push(MigrationStatement::new(sql));
		Ok(())
	}
}

impl SqlGenerator for StandardSqlGenerator {
	fn generate(&self, operations: &[Operation]) -> Result<Vec<MigrationStatement>> {
		let created: Vec<&DatabaseName> = operations
			.iter()
			.filter_map(|op| match op {
				Operation::CreateTable(table) => Some(&table.name),
				_ => None,
			})
			.collect();
		let folded = |fk: &AddForeignKeyOperation| {
			self.dialect == SqlDialect::Sqlite
				&& created.iter().any(|table| table.matches(&fk.dependent_table))
		};

		let mut statements = Vec::with_capacity(operations.len());
		for operation in operations {
			operation.validate()?;
			match operation {
				Operation::CreateTable(table) => {
					let foreign_keys: Vec<&AddForeignKeyOperation> = operations
						.iter()
						.filter_map(|op| match op {
							Operation::AddForeignKey(fk)
								if folded(fk) && fk.dependent_table.matches(&table.name) =>
							{
								Some(fk)
							}
							_ => None,
						})
						.collect();
					statements.push(MigrationStatement::new(self.create_table(table, &foreign_keys)));
				}
				Operation::AddForeignKey(fk) if folded(fk) => {}
				other => self.generate_operation(other, &mut statements)?,
			}
		}
		Ok(statements)
	}

	fn provider_token(&self) -> &str {
		match self.dialect {
			SqlDialect::SqlServer => "sqlserver",
			SqlDialect::Postgres => "postgres",
			SqlDialect::Mysql => "mysql",
			SqlDialect::Sqlite => "sqlite",
		}
	}

	fn dialect(&self) -> SqlDialect {
		self.dialect
	}
}

/// Generator matching `dialect`
pub fn generator_for(dialect: SqlDialect) -> Arc<dyn SqlGenerator> {
	match dialect {
		SqlDialect::SqlServer => Arc::new(SqlServerGenerator::new()),
		other => Arc::new(StandardSqlGenerator::new(other)),
	}
}

fn create_table(op: &CreateTableOperation) -> String {
	let mut lines: Vec<String> = op
		.columns
		.iter()
		.map(|c| format!("{INDENT}{}", column_definition(c, true)))
		.collect();
	if let Some(pk) = &op.primary_key {
		lines.push(format!(
			"{INDENT}CONSTRAINT {} PRIMARY KEY ({})",
			quote_identifier(&pk.constraint_name(&op.name)),
			quote_list(&pk.columns)
		));
	}
	format!("CREATE TABLE {} (\n{}\n)", op.name.quoted(), lines.join(",\n"))
}

fn add_foreign_key(op: &AddForeignKeyOperation) -> String {
	let mut sql = format!(
		"ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
		op.dependent_table.quoted(),
		quote_identifier(&op.constraint_name()),
		quote_list(&op.dependent_columns),
		op.principal_table.quoted()
	);
	if op.has_principal_columns() {
		sql.push_str(&format!(" ({})", quote_list(&op.principal_columns)));
	}
	if op.cascade_delete {
		sql.push_str(" ON DELETE CASCADE");
	}
	sql
}

fn create_procedure(name: &DatabaseName, parameters: &[ParameterDefinition], body: &str) -> String {
	let mut sql = format!("CREATE PROCEDURE {}", name.quoted());
	if !parameters.is_empty() {
		let rendered: Vec<String> = parameters
			.iter()
			.map(|p| format!("{INDENT}@{} {}", p.name, store_type(&p.store_type)))
			.collect();
		sql.push('\n');
		sql.push_str(&rendered.join(",\n"));
	}
	sql.push_str(&format!("\nAS\nBEGIN\n{}\nEND", body));
	sql
}

/// `[Name] [nvarchar](max) NOT NULL DEFAULT 0 IDENTITY`
fn column_definition(column: &ColumnDefinition, with_defaults: bool) -> String {
	let mut sql = format!(
		"{} {}",
		quote_identifier(&column.name),
		store_type(&column.store_type)
	);
	if !column.nullable {
		sql.push_str(" NOT NULL");
	}
	if with_defaults {
		if let Some(value) = &column.default_value {
			sql.push_str(&format!(" DEFAULT {}", value));
		} else if let Some(expression) = &column.default_sql {
			sql.push_str(&format!(" DEFAULT {}", expression));
		}
	}
	if column.identity {
		sql.push_str(" IDENTITY");
	}
	sql
}

/// `nvarchar(max)` becomes `[nvarchar](max)`
fn store_type(raw: &str) -> String {
	SqlDialect::SqlServer.store_type(raw)
}

fn index_name(name: &Option<String>, columns: &[String]) -> String {
	name.clone()
		.unwrap_or_else(|| format!("IX_{}", columns.join("_")))
}

fn quote_list(columns: &[String]) -> String {
	columns
		.iter()
		.map(|c| quote_identifier(c))
		.collect::<Vec<_>>()
		.join(", ")
}

fn sp_rename(object: &str, new_name: &str, object_type: &str) -> String {
	format!(
		"EXECUTE sp_rename @objname = N'{}', @newname = N'{}', @objtype = N'{}'",
		object.replace('\'', "''"),
		new_name.replace('\'', "''"),
		object_type
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operations::{DropForeignKeyOperation, ForeignKeyTrigger, PrimaryKey};
	use rstest::{fixture, rstest};

	#[fixture]
	fn generator() -> SqlServerGenerator {
		SqlServerGenerator::new()
	}

	fn goods() -> DatabaseName {
		DatabaseName::new("dbo", "Goods")
	}

	fn single(generator: &SqlServerGenerator, op: Operation) -> String {
		let mut statements = generator.generate(&[op]).unwrap();
		assert_eq!(statements.len(), 1);
		statements.remove(0).sql
	}

	#[rstest]
	fn test_create_table(generator: SqlServerGenerator) {
		let op = Operation::CreateTable(CreateTableOperation {
			name: goods(),
			columns: vec![
				ColumnDefinition::new("Id", "int").not_null().identity(),
				ColumnDefinition::new("Name", "nvarchar(max)"),
			],
			primary_key: Some(PrimaryKey::new(&["Id"])),
		});

		assert_eq!(
			single(&generator, op),
			"CREATE TABLE [dbo].[Goods] (\n    [Id] [int] NOT NULL IDENTITY,\n    [Name] [nvarchar](max),\n    CONSTRAINT [PK_dbo.Goods] PRIMARY KEY ([Id])\n)"
		);
	}

	#[rstest]
	fn test_add_column_with_default(generator: SqlServerGenerator) {
		let op = Operation::AddColumn {
			table: goods(),
			column: ColumnDefinition::new("Excise", "bit")
				.not_null()
				.with_default_value("0"),
		};

		assert_eq!(
			single(&generator, op),
			"ALTER TABLE [dbo].[Goods] ADD [Excise] [bit] NOT NULL DEFAULT 0"
		);
	}

	#[rstest]
	fn test_alter_column_drops_default(generator: SqlServerGenerator) {
		let op = Operation::AlterColumn {
			table: goods(),
			column: ColumnDefinition::new("Name", "nvarchar(200)").with_default_value("''"),
		};

		assert_eq!(
			single(&generator, op),
			"ALTER TABLE [dbo].[Goods] ALTER COLUMN [Name] [nvarchar](200)"
		);
	}

	#[rstest]
	#[case(vec!["Id".to_string()], false, "ALTER TABLE [dbo].[Goods] ADD CONSTRAINT [FK_dbo.Goods_dbo.GoodGroups_GroupId] FOREIGN KEY ([GroupId]) REFERENCES [dbo].[GoodGroups] ([Id])")]
	#[case(vec![], true, "ALTER TABLE [dbo].[Goods] ADD CONSTRAINT [FK_dbo.Goods_dbo.GoodGroups_GroupId] FOREIGN KEY ([GroupId]) REFERENCES [dbo].[GoodGroups] ON DELETE CASCADE")]
	fn test_add_foreign_key(
		generator: SqlServerGenerator,
		#[case] principal_columns: Vec<String>,
		#[case] cascade_delete: bool,
		#[case] expected: &str,
	) {
		let op = Operation::AddForeignKey(AddForeignKeyOperation {
			name: None,
			dependent_table: goods(),
			dependent_columns: vec!["GroupId".to_string()],
			principal_table: DatabaseName::new("dbo", "GoodGroups"),
			principal_columns,
			cascade_delete,
		});

		assert_eq!(single(&generator, op), expected);
	}

	#[rstest]
	fn test_drop_foreign_key_uses_default_name(generator: SqlServerGenerator) {
		let op = Operation::DropForeignKey(DropForeignKeyOperation {
			name: None,
			dependent_table: goods(),
			dependent_columns: vec!["GroupId".to_string()],
			principal_table: DatabaseName::unqualified("GoodGroups"),
		});

		assert_eq!(
			single(&generator, op),
			"ALTER TABLE [dbo].[Goods] DROP CONSTRAINT [FK_dbo.Goods_GoodGroups_GroupId]"
		);
	}

	#[rstest]
	#[case(true, None, "CREATE UNIQUE INDEX [IX_Name] ON [dbo].[Goods]([Name])")]
	#[case(false, Some("IX_Custom"), "CREATE INDEX [IX_Custom] ON [dbo].[Goods]([Name])")]
	fn test_create_index(
		generator: SqlServerGenerator,
		#[case] unique: bool,
		#[case] name: Option<&str>,
		#[case] expected: &str,
	) {
		let op = Operation::CreateIndex {
			table: goods(),
			columns: vec!["Name".to_string()],
			unique,
			name: name.map(str::to_string),
		};

		assert_eq!(single(&generator, op), expected);
	}

	#[rstest]
	fn test_renames_use_sp_rename(generator: SqlServerGenerator) {
		let table = Operation::RenameTable {
			table: goods(),
			new_name: "Items".to_string(),
		};
		let column = Operation::RenameColumn {
			table: goods(),
			column: "Name".to_string(),
			new_name: "Title".to_string(),
		};

		assert_eq!(
			single(&generator, table),
			"EXECUTE sp_rename @objname = N'dbo.Goods', @newname = N'Items', @objtype = N'OBJECT'"
		);
		assert_eq!(
			single(&generator, column),
			"EXECUTE sp_rename @objname = N'dbo.Goods.Name', @newname = N'Title', @objtype = N'COLUMN'"
		);
	}

	#[rstest]
	fn test_move_table(generator: SqlServerGenerator) {
		let op = Operation::MoveTable {
			table: goods(),
			new_schema: "archive".to_string(),
		};

		assert_eq!(single(&generator, op), "ALTER SCHEMA [archive] TRANSFER [dbo].[Goods]");
	}

	#[rstest]
	fn test_create_procedure(generator: SqlServerGenerator) {
		let op = Operation::CreateProcedure {
			name: DatabaseName::new("dbo", "GetGoods"),
			parameters: vec![
				ParameterDefinition::new("GroupId", "int"),
				ParameterDefinition::new("Filter", "nvarchar(50)"),
			],
			body: "SELECT * FROM dbo.Goods".to_string(),
		};

		assert_eq!(
			single(&generator, op),
			"CREATE PROCEDURE [dbo].[GetGoods]\n    @GroupId [int],\n    @Filter [nvarchar](50)\nAS\nBEGIN\nSELECT * FROM dbo.Goods\nEND"
		);
	}

	#[rstest]
	fn test_foreign_key_triggers_emit_two_statements(generator: SqlServerGenerator) {
		let trigger = ForeignKeyTrigger {
			schema: "dbo".to_string(),
			dependent_table: "Goods".to_string(),
			dependent_column: "GroupId".to_string(),
			principal_table: "GoodGroups".to_string(),
			principal_column: "Id".to_string(),
		};

		let create = generator
			.generate(&[Operation::CreateForeignKeyTriggers(trigger.clone())])
			.unwrap();
		let drop = generator
			.generate(&[Operation::DropForeignKeyTriggers(trigger)])
			.unwrap();

		assert_eq!(create.len(), 2);
		assert_eq!(drop.len(), 2);
	}

	#[rstest]
	fn test_sql_keeps_transaction_flag(generator: SqlServerGenerator) {
		let statements = generator
			.generate(&[
				Operation::Sql {
					sql: "ALTER DATABASE CURRENT SET READ_COMMITTED_SNAPSHOT ON".to_string(),
					suppress_transaction: true,
				},
				Operation::Sql {
					sql: "UPDATE dbo.Goods SET Excise = 0".to_string(),
					suppress_transaction: false,
				},
			])
			.unwrap();

		assert!(statements[0].suppress_transaction);
		assert!(!statements[1].suppress_transaction);
	}

	#[rstest]
	fn test_generate_validates_operations(generator: SqlServerGenerator) {
		let result = generator.generate(&[Operation::DropTable {
			name: DatabaseName::new("dbo", ""),
		}]);

		assert!(result.is_err());
	}

	fn prices_with_goods_fk() -> Vec<Operation> {
		let prices = DatabaseName::new("dbo", "Prices");
		vec![
			Operation::CreateTable(CreateTableOperation {
				name: prices.clone(),
				columns: vec![
					ColumnDefinition::new("Id", "int").not_null(),
					ColumnDefinition::new("GoodId", "int").not_null(),
				],
				primary_key: Some(PrimaryKey::new(&["Id"])),
			}),
			Operation::AddForeignKey(AddForeignKeyOperation {
				name: None,
				dependent_table: prices,
				dependent_columns: vec!["GoodId".to_string()],
				principal_table: goods(),
				principal_columns: vec!["Id".to_string()],
				cascade_delete: true,
			}),
		]
	}

	#[rstest]
	#[case(SqlDialect::Sqlite, "CREATE TABLE \"Goods\" (\n    \"Id\" INTEGER NOT NULL,\n    \"Name\" TEXT,\n    CONSTRAINT \"PK_dbo.Goods\" PRIMARY KEY (\"Id\")\n)")]
	#[case(SqlDialect::Postgres, "CREATE TABLE \"dbo\".\"Goods\" (\n    \"Id\" int NOT NULL GENERATED BY DEFAULT AS IDENTITY,\n    \"Name\" text,\n    CONSTRAINT \"PK_dbo.Goods\" PRIMARY KEY (\"Id\")\n)")]
	#[case(SqlDialect::Mysql, "CREATE TABLE `Goods` (\n    `Id` int NOT NULL AUTO_INCREMENT,\n    `Name` longtext,\n    CONSTRAINT `PK_dbo.Goods` PRIMARY KEY (`Id`)\n)")]
	fn test_standard_create_table(#[case] dialect: SqlDialect, #[case] expected: &str) {
		let generator = StandardSqlGenerator::new(dialect);
		let op = Operation::CreateTable(CreateTableOperation {
			name: goods(),
			columns: vec![
				ColumnDefinition::new("Id", "int").not_null().identity(),
				ColumnDefinition::new("Name", "nvarchar(max)"),
			],
			primary_key: Some(PrimaryKey::new(&["Id"])),
		});

		let statements = generator.generate(&[op]).unwrap();

		assert_eq!(statements.len(), 1);
		assert_eq!(statements[0].sql, expected);
	}

	#[test]
	fn test_sqlite_folds_foreign_keys_into_new_tables() {
		let generator = StandardSqlGenerator::new(SqlDialect::Sqlite);

		let statements = generator.generate(&prices_with_goods_fk()).unwrap();

		assert_eq!(statements.len(), 1);
		assert!(statements[0].sql.ends_with(
			"CONSTRAINT \"FK_dbo.Prices_dbo.Goods_GoodId\" FOREIGN KEY (\"GoodId\") REFERENCES \"Goods\" (\"Id\") ON DELETE CASCADE\n)"
		));
	}

	#[test]
	fn test_postgres_keeps_foreign_keys_separate() {
		let generator = StandardSqlGenerator::new(SqlDialect::Postgres);

		let statements = generator.generate(&prices_with_goods_fk()).unwrap();

		assert_eq!(statements.len(), 2);
		assert_eq!(
			statements[1].sql,
			"ALTER TABLE \"dbo\".\"Prices\" ADD CONSTRAINT \"FK_dbo.Prices_dbo.Goods_GoodId\" FOREIGN KEY (\"GoodId\") REFERENCES \"dbo\".\"Goods\" (\"Id\") ON DELETE CASCADE"
		);
	}

	#[test]
	fn test_sqlite_rejects_foreign_key_on_existing_table() {
		let generator = StandardSqlGenerator::new(SqlDialect::Sqlite);
		let operations = prices_with_goods_fk();

		let result = generator.generate(&operations[1..]);

		assert!(matches!(
			result,
			Err(MigrationError::InvalidOperation(message)) if message.contains("AddForeignKey")
		));
	}

	#[rstest]
	#[case(SqlDialect::Postgres, "ALTER TABLE \"dbo\".\"Goods\" DROP CONSTRAINT \"FK_dbo.Goods_GoodGroups_GroupId\"")]
	#[case(SqlDialect::Mysql, "ALTER TABLE `Goods` DROP FOREIGN KEY `FK_dbo.Goods_GoodGroups_GroupId`")]
	fn test_standard_drop_foreign_key(#[case] dialect: SqlDialect, #[case] expected: &str) {
		let generator = StandardSqlGenerator::new(dialect);
		let op = Operation::DropForeignKey(DropForeignKeyOperation {
			name: None,
			dependent_table: goods(),
			dependent_columns: vec!["GroupId".to_string()],
			principal_table: DatabaseName::unqualified("GoodGroups"),
		});

		let statements = generator.generate(&[op]).unwrap();

		assert_eq!(statements[0].sql, expected);
	}

	#[rstest]
	#[case(SqlDialect::Postgres, "ALTER TABLE \"dbo\".\"Goods\" ALTER COLUMN \"Name\" TYPE varchar(100), ALTER COLUMN \"Name\" SET NOT NULL")]
	#[case(SqlDialect::Mysql, "ALTER TABLE `Goods` MODIFY COLUMN `Name` nvarchar(100) NOT NULL")]
	fn test_standard_alter_column(#[case] dialect: SqlDialect, #[case] expected: &str) {
		let generator = StandardSqlGenerator::new(dialect);
		let op = Operation::AlterColumn {
			table: goods(),
			column: ColumnDefinition::new("Name", "nvarchar(100)").not_null(),
		};

		let statements = generator.generate(&[op]).unwrap();

		assert_eq!(statements[0].sql, expected);
	}

	#[test]
	fn test_procedures_are_sql_server_only() {
		let generator = StandardSqlGenerator::new(SqlDialect::Postgres);

		let result = generator.generate(&[Operation::CreateProcedure {
			name: DatabaseName::new("dbo", "RefreshPrices"),
			parameters: Vec::new(),
			body: "SELECT 1".to_string(),
		}]);

		assert!(matches!(
			result,
			Err(MigrationError::InvalidOperation(message))
				if message == "CreateProcedure is not supported by the Postgres dialect"
		));
	}

	#[rstest]
	#[case(SqlDialect::SqlServer, "2008")]
	#[case(SqlDialect::Sqlite, "sqlite")]
	fn test_generator_for_dialect(#[case] dialect: SqlDialect, #[case] token: &str) {
		let generator = generator_for(dialect);

		assert_eq!(generator.dialect(), dialect);
		assert_eq!(generator.provider_token(), token);
	}
}
