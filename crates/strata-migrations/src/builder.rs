//! Per-invocation operation collector
//!
//! A fresh [`MigrationBuilder`] is handed to every `up`, `down`, `seed` and
//! `seed_for_test` call. Unqualified names get the builder's default schema.
//! Name errors do not interrupt the fluent calls; the first one is reported
//! by [`MigrationBuilder::finish`].

use crate::change_set::{ChangeSetDeclarations, ChangeSetEntry};
use crate::name::{DEFAULT_SCHEMA, DatabaseName};
use crate::operations::{
	AddForeignKeyOperation, ColumnDefinition, CreateTableOperation, DropForeignKeyOperation,
	ForeignKeyTrigger, Operation, ParameterDefinition, PrimaryKey,
};
use crate::seed::{DataSeedOperation, InsertBuilder, UpdateBuilder};
use crate::view::SqlViewModel;
use crate::{MigrationError, Result};

/// Which half of a migration is being collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Up,
	Down,
}

/// Options for [`MigrationBuilder::actual_view`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFlags {
	pub is_register: bool,
	pub is_simple: bool,
	/// View is `vw_<view_name>` instead of `vw_<table>`
	pub view_name: Option<String>,
}

impl ViewFlags {
	pub fn register() -> Self {
		Self {
			is_register: true,
			..Self::default()
		}
	}

	pub fn simple() -> Self {
		Self {
			is_simple: true,
			..Self::default()
		}
	}

	pub fn with_view_name(mut self, name: impl Into<String>) -> Self {
		self.view_name = Some(name.into());
		self
	}
}

/// Everything one invocation collected
#[derive(Debug, Clone, Default)]
pub struct MigrationParts {
	pub operations: Vec<Operation>,
	pub data_operations: Vec<DataSeedOperation>,
	pub change_sets: ChangeSetDeclarations,
}

/// Collects operations, data seeds and change-set declarations
#[derive(Debug)]
pub struct MigrationBuilder {
	default_schema: String,
	operations: Vec<Operation>,
	data_operations: Vec<DataSeedOperation>,
	change_sets: ChangeSetDeclarations,
	error: Option<MigrationError>,
}

impl MigrationBuilder {
	pub fn new(default_schema: impl Into<String>) -> Self {
		Self {
			default_schema: default_schema.into(),
			operations: Vec::new(),
			data_operations: Vec::new(),
			change_sets: ChangeSetDeclarations::new(),
			error: None,
		}
	}

	pub fn default_schema(&self) -> &str {
		&self.default_schema
	}

	pub fn operations(&self) -> &[Operation] {
		&self.operations
	}

	pub fn data_operations(&self) -> &[DataSeedOperation] {
		&self.data_operations
	}

	pub fn change_sets(&self) -> &ChangeSetDeclarations {
		&self.change_sets
	}

	/// Consume the builder, surfacing the first recorded error
	pub fn finish(self) -> Result<MigrationParts> {
		if let Some(error) = self.error {
			return Err(error);
		}
		Ok(MigrationParts {
			operations: self.operations,
			data_operations: self.data_operations,
			change_sets: self.change_sets,
		})
	}

	/// Append an operation as-is
	pub fn push(&mut self, operation: Operation) {
		self.operations.push(operation);
	}

	fn record_error(&mut self, error: MigrationError) {
		if self.error.is_none() {
			self.error = Some(error);
		}
	}

	fn qualified(&mut self, raw: &str) -> DatabaseName {
		match DatabaseName::qualify(raw, &self.default_schema) {
			Ok(name) => name,
			Err(error) => {
				self.record_error(error);
				DatabaseName::new(self.default_schema.clone(), raw)
			}
		}
	}

	fn parsed(&mut self, raw: &str) -> DatabaseName {
		match DatabaseName::parse(raw) {
			Ok(name) => name,
			Err(error) => {
				self.record_error(error);
				DatabaseName::unqualified(raw)
			}
		}
	}

	pub fn create_table(&mut self, name: &str, columns: Vec<ColumnDefinition>) -> TableBuilder<'_> {
		let table = self.qualified(name);
		self.operations.push(Operation::CreateTable(CreateTableOperation {
			name: table.clone(),
			columns,
			primary_key: None,
		}));
		let index = self.operations.len() - 1;
		TableBuilder {
			builder: self,
			index,
			table,
		}
	}

	pub fn drop_table(&mut self, name: &str) {
		let name = self.qualified(name);
		self.operations.push(Operation::DropTable { name });
	}

	pub fn move_table(&mut self, name: &str, new_schema: &str) {
		let table = self.qualified(name);
		self.operations.push(Operation::MoveTable {
			table,
			new_schema: new_schema.to_string(),
		});
	}

	pub fn rename_table(&mut self, name: &str, new_name: &str) {
		let table = self.qualified(name);
		self.operations.push(Operation::RenameTable {
			table,
			new_name: new_name.to_string(),
		});
	}

	pub fn rename_column(&mut self, table: &str, column: &str, new_name: &str) {
		let table = self.qualified(table);
		self.operations.push(Operation::RenameColumn {
			table,
			column: column.to_string(),
			new_name: new_name.to_string(),
		});
	}

	pub fn add_column(&mut self, table: &str, column: ColumnDefinition) {
		let table = self.qualified(table);
		self.operations.push(Operation::AddColumn { table, column });
	}

	pub fn drop_column(&mut self, table: &str, column: &str) {
		let table = self.qualified(table);
		self.operations.push(Operation::DropColumn {
			table,
			column: column.to_string(),
		});
	}

	pub fn alter_column(&mut self, table: &str, column: ColumnDefinition) {
		let table = self.qualified(table);
		self.operations.push(Operation::AlterColumn { table, column });
	}

	pub fn add_primary_key(&mut self, table: &str, columns: &[&str], name: Option<&str>) {
		let table = self.qualified(table);
		let mut primary_key = PrimaryKey::new(columns);
		if let Some(name) = name {
			primary_key = primary_key.with_name(name);
		}
		self.operations
			.push(Operation::AddPrimaryKey { table, primary_key });
	}

	pub fn drop_primary_key(&mut self, table: &str, name: Option<&str>) {
		let table = self.qualified(table);
		self.operations.push(Operation::DropPrimaryKey {
			table,
			name: name.map(str::to_string),
		});
	}

	pub fn create_index(&mut self, table: &str, columns: &[&str], unique: bool, name: Option<&str>) {
		let table = self.qualified(table);
		self.operations.push(Operation::CreateIndex {
			table,
			columns: to_owned(columns),
			unique,
			name: name.map(str::to_string),
		});
	}

	/// Drop the index named after `columns` (`IX_a_b`)
	pub fn drop_index(&mut self, table: &str, columns: &[&str]) {
		let table = self.qualified(table);
		self.operations.push(Operation::DropIndex {
			table,
			columns: to_owned(columns),
			name: None,
		});
	}

	pub fn drop_index_named(&mut self, table: &str, name: &str) {
		let table = self.qualified(table);
		self.operations.push(Operation::DropIndex {
			table,
			columns: vec![name.to_string()],
			name: Some(name.to_string()),
		});
	}

	/// Foreign key from `dependent_table`; empty `principal_columns` are
	/// resolved from the schema snapshot or the batch before execution
	pub fn add_foreign_key(
		&mut self,
		dependent_table: &str,
		dependent_columns: &[&str],
		principal_table: &str,
		principal_columns: &[&str],
		cascade_delete: bool,
	) {
		let dependent_table = self.qualified(dependent_table);
		let principal_table = self.qualified(principal_table);
		self.operations
			.push(Operation::AddForeignKey(AddForeignKeyOperation {
				name: None,
				dependent_table,
				dependent_columns: to_owned(dependent_columns),
				principal_table,
				principal_columns: to_owned(principal_columns),
				cascade_delete,
			}));
	}

	/// Drop a foreign key by constraint name
	pub fn drop_foreign_key(&mut self, dependent_table: &str, name: &str) {
		let dependent_table = self.qualified(dependent_table);
		self.operations
			.push(Operation::DropForeignKey(DropForeignKeyOperation {
				name: Some(name.to_string()),
				principal_table: dependent_table.clone(),
				dependent_table,
				dependent_columns: Vec::new(),
			}));
	}

	/// Drop a foreign key by its columns
	///
	/// Emits two drops: one naming the principal table as given and one with
	/// the principal table schema-qualified, covering both naming forms of
	/// the default constraint name.
	pub fn drop_foreign_key_by_columns(
		&mut self,
		dependent_table: &str,
		dependent_columns: &[&str],
		principal_table: &str,
	) {
		let dependent_table = self.qualified(dependent_table);
		let as_given = self.parsed(principal_table);
		let qualified = self.qualified(principal_table);

		for principal_table in [as_given, qualified] {
			self.operations
				.push(Operation::DropForeignKey(DropForeignKeyOperation {
					name: None,
					dependent_table: dependent_table.clone(),
					dependent_columns: to_owned(dependent_columns),
					principal_table,
				}));
		}
	}

	pub fn create_procedure(&mut self, name: &str, parameters: Vec<ParameterDefinition>, body: &str) {
		let name = self.qualified(name);
		self.operations.push(Operation::CreateProcedure {
			name,
			parameters,
			body: body.to_string(),
		});
	}

	pub fn drop_procedure(&mut self, name: &str) {
		let name = self.qualified(name);
		self.operations.push(Operation::DropProcedure { name });
	}

	pub fn sql(&mut self, sql: &str) {
		self.operations.push(Operation::Sql {
			sql: sql.to_string(),
			suppress_transaction: false,
		});
	}

	pub fn sql_without_transaction(&mut self, sql: &str) {
		self.operations.push(Operation::Sql {
			sql: sql.to_string(),
			suppress_transaction: true,
		});
	}

	/// Several raw batches, each executed as its own statement
	pub fn raw_sql(&mut self, batches: &[&str]) {
		for batch in batches {
			self.sql(batch);
		}
	}

	pub fn drop_view(&mut self, name: &str) {
		let name = self.qualified(name);
		self.operations.push(Operation::DropView { name });
	}

	pub fn drop_trigger(&mut self, name: &str) {
		let name = self.qualified(name);
		self.operations.push(Operation::DropTrigger { name });
	}

	/// Emulate a foreign key with insert/update and delete/update triggers
	pub fn foreign_key_trigger(
		&mut self,
		dependent_table: &str,
		dependent_column: &str,
		principal_table: &str,
		principal_column: &str,
	) {
		let trigger = self.trigger(dependent_table, dependent_column, principal_table, principal_column);
		self.operations
			.push(Operation::CreateForeignKeyTriggers(trigger));
	}

	pub fn drop_foreign_key_trigger(
		&mut self,
		dependent_table: &str,
		dependent_column: &str,
		principal_table: &str,
		principal_column: &str,
	) {
		let trigger = self.trigger(dependent_table, dependent_column, principal_table, principal_column);
		self.operations
			.push(Operation::DropForeignKeyTriggers(trigger));
	}

	fn trigger(
		&self,
		dependent_table: &str,
		dependent_column: &str,
		principal_table: &str,
		principal_column: &str,
	) -> ForeignKeyTrigger {
		ForeignKeyTrigger {
			schema: self.default_schema.clone(),
			dependent_table: dependent_table.to_string(),
			dependent_column: dependent_column.to_string(),
			principal_table: principal_table.to_string(),
			principal_column: principal_column.to_string(),
		}
	}

	/// Create the view described by `model`
	pub fn actual_entities_view(&mut self, model: SqlViewModel) {
		match model.create_view() {
			Ok(definition) => self.operations.push(Operation::CreateView {
				name: DatabaseName::new(model.schema(), model.view_name()),
				definition,
			}),
			Err(error) => self.record_error(error),
		}
	}

	/// `vw_<table>` over the current rows of `table`
	///
	/// On [`Direction::Up`] the view is built from `properties` and `keys` and
	/// passed through `customize` for joins. On [`Direction::Down`] the same
	/// view is dropped.
	pub fn actual_view<F>(
		&mut self,
		direction: Direction,
		table: &str,
		properties: &[&str],
		keys: &[&str],
		flags: ViewFlags,
		customize: F,
	) where
		F: FnOnce(SqlViewModel) -> Result<SqlViewModel>,
	{
		let view_name = format!(
			"vw_{}",
			flags.view_name.as_deref().unwrap_or(table)
		);

		if direction == Direction::Down {
			self.drop_view(&view_name);
			return;
		}

		let model = SqlViewModel::new(view_name)
			.with_schema(self.default_schema.clone())
			.init(table, properties, keys, flags.is_register, flags.is_simple, true)
			.and_then(customize);
		match model {
			Ok(model) => self.actual_entities_view(model),
			Err(error) => self.record_error(error),
		}
	}

	/// Run `create` on the way up, drop the table on the way down
	pub fn table<F>(&mut self, direction: Direction, name: &str, create: F)
	where
		F: FnOnce(&mut Self, &str),
	{
		match direction {
			Direction::Up => create(self, name),
			Direction::Down => self.drop_table(name),
		}
	}

	/// Run `create` on the way up, drop the procedure on the way down
	pub fn procedure<F>(&mut self, direction: Direction, name: &str, body: &str, create: F)
	where
		F: FnOnce(&mut Self, &str, &str),
	{
		match direction {
			Direction::Up => create(self, name, body),
			Direction::Down => self.drop_procedure(name),
		}
	}

	pub fn add_change_set_table(&mut self, table: &str, version_table: &str, keys: &[&str]) {
		self.change_sets
			.add(ChangeSetEntry::new(table, version_table, keys));
	}

	pub fn remove_change_set_table(&mut self, table: &str) {
		self.change_sets.remove(table);
	}

	pub fn clear_change_sets(&mut self) {
		self.change_sets.clear();
	}

	pub fn create_insert(&mut self, table: &str, columns: &[&str]) -> InsertBuilder<'_> {
		InsertBuilder::new(table.to_string(), to_owned(columns), &mut self.data_operations)
	}

	pub fn create_update(&mut self, table: &str, key_column: &str, columns: &[&str]) -> UpdateBuilder<'_> {
		UpdateBuilder::new(
			table.to_string(),
			key_column.to_string(),
			to_owned(columns),
			&mut self.data_operations,
		)
	}

	pub fn raw_data_seed_sql(&mut self, sql: &str) {
		self.data_operations.push(DataSeedOperation::raw(sql));
	}
}

impl Default for MigrationBuilder {
	fn default() -> Self {
		Self::new(DEFAULT_SCHEMA)
	}
}

/// Adds keys, indexes and foreign keys to a table created in the same migration
pub struct TableBuilder<'a> {
	builder: &'a mut MigrationBuilder,
	index: usize,
	table: DatabaseName,
}

impl TableBuilder<'_> {
	pub fn primary_key(self, columns: &[&str]) -> Self {
		self.set_primary_key(PrimaryKey::new(columns))
	}

	pub fn primary_key_named(self, name: &str, columns: &[&str]) -> Self {
		self.set_primary_key(PrimaryKey::new(columns).with_name(name))
	}

	fn set_primary_key(self, primary_key: PrimaryKey) -> Self {
		if let Some(Operation::CreateTable(op)) = self.builder.operations.get_mut(self.index) {
			op.primary_key = Some(primary_key);
		}
		self
	}

	pub fn index(self, columns: &[&str]) -> Self {
		self.push_index(columns, false)
	}

	pub fn unique_index(self, columns: &[&str]) -> Self {
		self.push_index(columns, true)
	}

	fn push_index(self, columns: &[&str], unique: bool) -> Self {
		self.builder.operations.push(Operation::CreateIndex {
			table: self.table.clone(),
			columns: to_owned(columns),
			unique,
			name: None,
		});
		self
	}

	/// Foreign key whose principal columns are resolved before execution
	pub fn foreign_key(self, columns: &[&str], principal_table: &str, cascade_delete: bool) -> Self {
		let principal_table = self.builder.qualified(principal_table);
		self.builder
			.operations
			.push(Operation::AddForeignKey(AddForeignKeyOperation {
				name: None,
				dependent_table: self.table.clone(),
				dependent_columns: to_owned(columns),
				principal_table,
				principal_columns: Vec::new(),
				cascade_delete,
			}));
		self
	}
}

fn to_owned(values: &[&str]) -> Vec<String> {
	values.iter().map(|v| v.to_string()).collect()
}
