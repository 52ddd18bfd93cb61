//! Aggregate `vw_VersionChangesSet` reporting view
//!
//! For every registered table the view counts, per version, the rows that
//! replaced a soft-deleted predecessor (changes), the rows deleted without a
//! successor (deletes) and the rows added without a predecessor (adds). Rows
//! are paired across versions by their full natural key.

use crate::change_set::{ChangeSetEntry, ChangeSetRegistry};
use crate::dialect::SqlDialect;
use crate::generator::MigrationStatement;
use crate::name::DatabaseName;
use crate::Result;

pub const CHANGE_SET_VIEW_NAME: &str = "vw_VersionChangesSet";

const DROP_STATEMENT: &str =
	"IF OBJECT_ID('vw_VersionChangesSet', 'V') IS NOT NULL DROP VIEW vw_VersionChangesSet;";

const EMPTY_VIEW: &str = "CREATE VIEW [dbo].[vw_VersionChangesSet] AS SELECT NULL as VersionId, NULL as TableName, NULL as VersionTableName, 0 as [ChangesCount], 0 as [DeleteCount], 0 as [AddCount]";

/// Drop and recreate statements for the current registry, in T-SQL
pub fn statements(registry: &ChangeSetRegistry) -> Vec<MigrationStatement> {
	vec![
		MigrationStatement::new(DROP_STATEMENT),
		MigrationStatement::new(create_view(registry)),
	]
}

/// Drop and recreate statements rendered for `dialect`
///
/// Outside SQL Server the view and every registered table live in `schema`
/// and all identifiers are quoted, since unquoted names may fold case.
pub fn statements_for(
	registry: &ChangeSetRegistry,
	dialect: SqlDialect,
	schema: &str,
) -> Result<Vec<MigrationStatement>> {
	if dialect == SqlDialect::SqlServer {
		return Ok(statements(registry));
	}

	let view = dialect.object_name(&DatabaseName::new(schema, CHANGE_SET_VIEW_NAME));
	let body = if registry.is_empty() {
		let q = |name: &str| dialect.quote(name);
		format!(
			"SELECT NULL as {}, NULL as {}, NULL as {}, 0 as {}, 0 as {}, 0 as {}",
			q("VersionId"),
			q("TableName"),
			q("VersionTableName"),
			q("ChangesCount"),
			q("DeleteCount"),
			q("AddCount")
		)
	} else {
		let renderer = Renderer { dialect: Some(dialect) };
		registry
			.entries()
			.map(|entry| {
				let table = DatabaseName::qualify(&entry.table, schema)?;
				let version_table = DatabaseName::qualify(&entry.version_table, schema)?;
				Ok(renderer.table_select(entry, &table, &version_table))
			})
			.collect::<Result<Vec<_>>>()?
			.join(" union ")
	};

	Ok(vec![
		MigrationStatement::new(format!("DROP VIEW IF EXISTS {view}")),
		MigrationStatement::new(format!("CREATE VIEW {view} AS {body}")),
	])
}

/// `CREATE VIEW` text: one `SELECT` per table joined by `union`, or a
/// single all-null row when nothing is registered
pub fn create_view(registry: &ChangeSetRegistry) -> String {
	if registry.is_empty() {
		return EMPTY_VIEW.to_string();
	}

	let renderer = Renderer { dialect: None };
	let selects: Vec<String> = registry
		.entries()
		.map(|entry| {
			let table = DatabaseName::unqualified(entry.table.as_str());
			let version_table = DatabaseName::unqualified(entry.version_table.as_str());
			renderer.table_select(entry, &table, &version_table)
		})
		.collect();
	format!(
		"CREATE VIEW [dbo].[{}] AS {}",
		CHANGE_SET_VIEW_NAME,
		selects.join(" union ")
	)
}

/// Identifier rendering; without a dialect names are written as registered
struct Renderer {
	dialect: Option<SqlDialect>,
}

impl Renderer {
	fn ident(&self, name: &str) -> String {
		match self.dialect {
			Some(dialect) => dialect.quote(name),
			None => name.to_string(),
		}
	}

	/// Output column names keep the bracketed T-SQL form
	fn column_alias(&self, name: &str) -> String {
		match self.dialect {
			Some(dialect) => dialect.quote(name),
			None => format!("[{name}]"),
		}
	}

	fn table(&self, name: &DatabaseName) -> String {
		match self.dialect {
			Some(dialect) => dialect.object_name(name),
			None => name.name.clone(),
		}
	}

	fn table_select(&self, entry: &ChangeSetEntry, table: &DatabaseName, version_table: &DatabaseName) -> String {
		let prefix = &table.name;
		let vt = self.table(version_table);
		let tbl = self.table(table);
		let version_id = self.ident("VersionId");
		let delete_in = self.ident("DeleteInVersionId");
		let count = self.column_alias("Count");
		let key_list = entry
			.keys
			.iter()
			.map(|k| format!("t1.{}", self.ident(k)))
			.collect::<Vec<_>>()
			.join(", ");
		let pairs = |other: &str| {
			entry
				.keys
				.iter()
				.map(|k| {
					let k = self.ident(k);
					format!("t1.{k} = {other}.{k}")
				})
				.collect::<Vec<_>>()
				.join(" and ")
		};
		let predecessor_match = pairs("tc");
		let self_match = pairs("t2");

		let replaced = format!(
			"SELECT {key_list}, t1.{version_id} FROM {tbl} as t1 join {tbl} as t2 on {self_match} and t1.{version_id} != t2.{version_id} and t1.{delete_in} is not null"
		);

		[
			format!(
				"SELECT {vt}.{version_id}, '{}' as {}, '{}' as {}, {prefix}C.{count} as {}, {prefix}D.{count} as {}, {prefix}A.{count} as {}",
				entry.table,
				self.ident("TableName"),
				entry.version_table,
				self.ident("VersionTableName"),
				self.column_alias("ChangesCount"),
				self.column_alias("DeleteCount"),
				self.column_alias("AddCount"),
			),
			format!("FROM {vt}"),
			format!("left join (SELECT t1.{delete_in} as Version, COUNT(*) AS {count}"),
			format!(
				"FROM {tbl} as t1 join {tbl} as t2 on {self_match} and t1.{version_id} != t2.{version_id} and t1.{delete_in} is not null"
			),
			format!("GROUP BY t1.{delete_in} ) AS {prefix}C on {prefix}C.Version = {vt}.{version_id}"),
			format!("left join (SELECT t1.{delete_in} as Version, COUNT(*) AS {count}"),
			format!("FROM {tbl} as t1 left join ({replaced}) as tc on {predecessor_match}"),
			format!("where t1.{delete_in} is not null and tc.{version_id} is NULL"),
			format!("GROUP BY t1.{delete_in}) AS {prefix}D on {prefix}D.Version = {vt}.{version_id}"),
			format!("left join (SELECT t1.{version_id} as Version, COUNT(*) AS {count} FROM {tbl} as t1"),
			format!("left join ({replaced}) as tc on {predecessor_match}"),
			format!("where tc.{version_id} is null"),
			format!("GROUP BY t1.{version_id}) AS {prefix}A on {prefix}A.Version = {vt}.{version_id}"),
		]
		.join("\n")
	}
}
