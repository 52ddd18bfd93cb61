//! # View synthesis
//!
//! [`SqlViewModel`] renders a `CREATE VIEW` statement over a versioned root
//! table and any number of joined tables. Versioned tables carry a
//! `DeleteInVersionId` soft-delete marker; rows with the marker set are
//! filtered out of the view.
//!
//! ## Join kinds
//!
//! - **Dictionary-versioned** (default): direct join plus a
//!   `DeleteInVersionId is NULL` predicate on the joined table
//! - **Simple**: direct join on key equality only
//! - **Max-distinct**: when distinct properties are given, the joined table is
//!   reduced to the rows holding the maximum of those properties per key
//!
//! Table aliases are the lowercase singular form of the table name, so
//! `GoodGroups` becomes `goodgroup`.

pub mod change_set;

use crate::name::DEFAULT_SCHEMA;
use crate::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

const NEW_LINE: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinType {
	#[default]
	Inner,
	Left,
	Right,
	Full,
}

impl JoinType {
	fn keyword(self) -> Result<&'static str> {
		match self {
			JoinType::Inner => Ok("INNER JOIN"),
			JoinType::Left => Ok("LEFT JOIN"),
			other => Err(MigrationError::UnsupportedJoinType(other.to_string())),
		}
	}
}

impl fmt::Display for JoinType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			JoinType::Inner => "Inner",
			JoinType::Left => "Left",
			JoinType::Right => "Right",
			JoinType::Full => "Full",
		};
		f.write_str(name)
	}
}

/// A joined table of a [`SqlViewModel`]
///
/// `outer_keys` are columns of the joined table; `inner_keys` are the
/// matching root columns, pairwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewJoin {
	table: String,
	properties: Vec<String>,
	outer_keys: Vec<String>,
	inner_keys: Vec<String>,
	join_type: JoinType,
	alias: Option<String>,
	is_simple: bool,
	is_register: bool,
	unique_named_properties: Vec<String>,
	distinct_properties: Vec<String>,
}

impl ViewJoin {
	pub fn new(table: &str, properties: &[&str], outer_keys: &[&str], inner_keys: &[&str]) -> Self {
		Self {
			table: table.to_string(),
			properties: to_owned(properties),
			outer_keys: to_owned(outer_keys),
			inner_keys: to_owned(inner_keys),
			join_type: JoinType::Inner,
			alias: None,
			is_simple: false,
			is_register: false,
			unique_named_properties: Vec::new(),
			distinct_properties: Vec::new(),
		}
	}

	pub fn with_join_type(mut self, join_type: JoinType) -> Self {
		self.join_type = join_type;
		self
	}

	pub fn with_alias(mut self, alias: &str) -> Self {
		if !alias.trim().is_empty() {
			self.alias = Some(alias.to_string());
		}
		self
	}

	/// Join on key equality without the soft-delete predicate
	pub fn simple(mut self) -> Self {
		self.is_simple = true;
		self
	}

	pub fn register(mut self) -> Self {
		self.is_register = true;
		self
	}

	/// Properties selected under their own name instead of `alias_name`
	pub fn with_unique_named_properties(mut self, properties: &[&str]) -> Self {
		self.unique_named_properties = to_owned(properties);
		self
	}

	/// Reduce the joined table to the rows with the maximum of these properties per key
	pub fn with_distinct_properties(mut self, properties: &[&str]) -> Self {
		self.distinct_properties = to_owned(properties);
		self
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn is_register(&self) -> bool {
		self.is_register
	}

	fn alias(&self) -> String {
		self.alias
			.clone()
			.unwrap_or_else(|| default_alias(&self.table))
	}
}

#[derive(Debug, Clone)]
struct RootSource {
	table: String,
	alias: String,
	properties: Vec<String>,
	keys: Vec<String>,
	is_not_versioned: bool,
}

#[derive(Debug, Clone)]
struct JoinSource {
	join: ViewJoin,
	alias: String,
}

/// Builder for one entity view
///
/// # Examples
///
/// ```
/// use strata_migrations::SqlViewModel;
///
/// let sql = SqlViewModel::new("vw_Goods")
///     .init("Goods", &["Id", "Name"], &["Id"], false, false, false)?
///     .left_simple_join("Countries", &["Name"], &["Id"], &["CountryId"], None, &[])?
///     .create_view()?;
///
/// assert!(sql.starts_with("CREATE VIEW [dbo].[vw_Goods] AS \nSELECT \n"));
/// assert!(sql.contains("LEFT JOIN [dbo].[Countries] as country \n"));
/// # Ok::<(), strata_migrations::MigrationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SqlViewModel {
	view_name: String,
	schema: String,
	root: Option<RootSource>,
	joined: Vec<JoinSource>,
}

impl SqlViewModel {
	pub fn new(view_name: impl Into<String>) -> Self {
		Self {
			view_name: view_name.into(),
			schema: DEFAULT_SCHEMA.to_string(),
			root: None,
			joined: Vec::new(),
		}
	}

	pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
		self.schema = schema.into();
		self
	}

	pub fn view_name(&self) -> &str {
		&self.view_name
	}

	pub fn schema(&self) -> &str {
		&self.schema
	}

	/// Root key columns, including `UseFromDateTime` for time-sliced registers
	pub fn root_keys(&self) -> &[String] {
		self.root.as_ref().map_or(&[], |r| r.keys.as_slice())
	}

	/// Set the root table
	///
	/// A register root that is not simple is keyed by its declared keys plus
	/// `UseFromDateTime`.
	pub fn init(
		mut self,
		table: &str,
		properties: &[&str],
		keys: &[&str],
		is_register: bool,
		is_simple: bool,
		is_not_versioned: bool,
	) -> Result<Self> {
		if table.trim().is_empty() {
			return Err(invalid("root table name is empty"));
		}
		if keys.is_empty() {
			return Err(invalid("root table has no key columns"));
		}

		let mut keys = to_owned(keys);
		if is_register && !is_simple {
			keys.push("UseFromDateTime".to_string());
		}

		self.root = Some(RootSource {
			table: table.to_string(),
			alias: default_alias(table),
			properties: to_owned(properties),
			keys,
			is_not_versioned,
		});
		Ok(self)
	}

	/// Inner join with the soft-delete predicate; `alias` overrides the
	/// singularized table name
	pub fn join(
		self,
		table: &str,
		properties: &[&str],
		outer_keys: &[&str],
		inner_keys: &[&str],
		alias: Option<&str>,
		is_register: bool,
	) -> Result<Self> {
		let mut join = ViewJoin::new(table, properties, outer_keys, inner_keys);
		if let Some(alias) = alias {
			join = join.with_alias(alias);
		}
		if is_register {
			join = join.register();
		}
		self.join_with(join)
	}

	/// Left join, optionally reduced to the max of `distinct_properties` per key
	pub fn left_join(
		self,
		table: &str,
		properties: &[&str],
		outer_keys: &[&str],
		inner_keys: &[&str],
		distinct_properties: &[&str],
	) -> Result<Self> {
		self.join_with(
			ViewJoin::new(table, properties, outer_keys, inner_keys)
				.with_join_type(JoinType::Left)
				.with_distinct_properties(distinct_properties),
		)
	}

	/// Left join on key equality only
	pub fn left_simple_join(
		self,
		table: &str,
		properties: &[&str],
		outer_keys: &[&str],
		inner_keys: &[&str],
		alias: Option<&str>,
		unique_properties: &[&str],
	) -> Result<Self> {
		let mut join = ViewJoin::new(table, properties, outer_keys, inner_keys)
			.with_join_type(JoinType::Left)
			.simple()
			.with_unique_named_properties(unique_properties);
		if let Some(alias) = alias {
			join = join.with_alias(alias);
		}
		self.join_with(join)
	}

	pub fn join_with(mut self, join: ViewJoin) -> Result<Self> {
		if join.table.trim().is_empty() {
			return Err(invalid("joined table name is empty"));
		}
		if join.outer_keys.is_empty() || join.inner_keys.is_empty() {
			return Err(invalid(&format!("join on {} has no key columns", join.table)));
		}
		if join.outer_keys.len() != join.inner_keys.len() {
			return Err(invalid(&format!(
				"join on {} has {} outer keys and {} inner keys",
				join.table,
				join.outer_keys.len(),
				join.inner_keys.len()
			)));
		}

		let alias = join.alias();
		self.joined.push(JoinSource { join, alias });
		Ok(self)
	}

	/// Render the `CREATE VIEW` statement
	pub fn create_view(&self) -> Result<String> {
		let root = self
			.root
			.as_ref()
			.ok_or_else(|| invalid(&format!("view {} has no root table", self.view_name)))?;

		let mut sql = format!(
			"CREATE VIEW [{}].[{}] AS {NEW_LINE}",
			self.schema, self.view_name
		);
		self.write_select(&mut sql, root);
		self.write_from(&mut sql, root);
		for source in &self.joined {
			self.write_join(&mut sql, root, source)?;
		}
		if !root.is_not_versioned {
			let _ = write!(sql, "WHERE {}.DeleteInVersionId is NULL", root.alias);
		}
		Ok(sql)
	}

	fn write_select(&self, sql: &mut String, root: &RootSource) {
		sql.push_str(&format!("SELECT {NEW_LINE}"));

		let root_columns: Vec<String> = root
			.properties
			.iter()
			.map(|p| format!("{}.{p} as '{p}'", root.alias))
			.collect();
		sql.push_str(&root_columns.join(&format!(", {NEW_LINE}")));

		for source in &self.joined {
			let shared_alias = self
				.joined
				.iter()
				.filter(|other| other.alias == source.alias)
				.count() > 1;

			for property in &source.join.properties {
				sql.push_str(&format!(", {NEW_LINE}"));
				let unique_named = source
					.join
					.unique_named_properties
					.iter()
					.any(|p| p == property);

				let alias = &source.alias;
				let column = match (unique_named, shared_alias) {
					(false, true) => format!("{alias}.{property} as '{}_{property}'", source.join.table),
					(false, false) | (true, true) => format!("{alias}.{property} as '{alias}_{property}'"),
					(true, false) => format!("{alias}.{property} as '{property}'"),
				};
				sql.push_str(&column);
			}
		}
	}

	fn write_from(&self, sql: &mut String, root: &RootSource) {
		let _ = write!(
			sql,
			"{NEW_LINE}FROM [{}].[{}] AS {} {NEW_LINE}",
			self.schema, root.table, root.alias
		);
	}

	fn write_join(&self, sql: &mut String, root: &RootSource, source: &JoinSource) -> Result<()> {
		let join = &source.join;
		let keyword = join.join_type.keyword()?;
		let alias = &source.alias;

		if !join.distinct_properties.is_empty() {
			self.write_max_distinct_join(sql, keyword, source);
			write_on(sql, root, source);
			return Ok(());
		}

		let _ = write!(
			sql,
			"{keyword} [{}].[{}] as {alias} {NEW_LINE}",
			self.schema, join.table
		);
		write_on(sql, root, source);
		if !join.is_simple {
			let _ = write!(sql, "AND {alias}.DeleteInVersionId is NULL {NEW_LINE}");
		}
		Ok(())
	}

	fn write_max_distinct_join(&self, sql: &mut String, keyword: &str, source: &JoinSource) {
		let join = &source.join;
		let alias = &source.alias;

		let _ = write!(sql, "{keyword} (SELECT {NEW_LINE}");
		let inner_columns: Vec<String> = join
			.properties
			.iter()
			.map(|p| format!("{alias}inner.{p}"))
			.collect();
		sql.push_str(&inner_columns.join(&format!(", {NEW_LINE}")));
		for key in &join.outer_keys {
			if !join.properties.contains(key) {
				let _ = write!(sql, ",{NEW_LINE}{alias}inner.{key}");
			}
		}
		sql.push_str(NEW_LINE);

		let outer_keys = join.outer_keys.join(",");
		let _ = write!(
			sql,
			"FROM [{}].[{}] AS {alias}inner {NEW_LINE}",
			self.schema, join.table
		);
		let _ = write!(sql, "INNER JOIN (SELECT {NEW_LINE}{outer_keys}");
		for property in &join.distinct_properties {
			let _ = write!(sql, ", MAX({property}) as Max{property}");
		}
		sql.push_str(NEW_LINE);
		let _ = write!(sql, "FROM [{}].[{}] {NEW_LINE}", self.schema, join.table);
		let _ = write!(sql, "GROUP BY {outer_keys}) AS {alias}innergrouped {NEW_LINE}");

		let group_conditions: Vec<String> = join
			.outer_keys
			.iter()
			.map(|k| {
				format!(
					"(({alias}inner.{k}= {alias}innergrouped.{k}) OR ({alias}inner.{k} is NULL AND {alias}innergrouped.{k} is NULL))"
				)
			})
			.collect();
		let _ = write!(sql, "ON {} ", group_conditions.join(" AND "));
		for property in &join.distinct_properties {
			let _ = write!(
				sql,
				" AND {alias}inner.{property} = {alias}innergrouped.Max{property}"
			);
		}
		let _ = write!(sql, ") AS {alias} {NEW_LINE}");
	}
}

fn write_on(sql: &mut String, root: &RootSource, source: &JoinSource) {
	let conditions: Vec<String> = source
		.join
		.inner_keys
		.iter()
		.zip(&source.join.outer_keys)
		.map(|(inner, outer)| format!("{}.{inner} = {}.{outer}", root.alias, source.alias))
		.collect();
	let _ = write!(sql, "ON {} {NEW_LINE}", conditions.join(" AND "));
}

fn invalid(reason: &str) -> MigrationError {
	MigrationError::InvalidViewDefinition(reason.to_string())
}

fn to_owned(values: &[&str]) -> Vec<String> {
	values.iter().map(|v| v.to_string()).collect()
}

/// Lowercase singular form of a table name
pub(crate) fn default_alias(table: &str) -> String {
	singularize(table).to_lowercase()
}

/// Plural endings that add `es` to the singular rather than `s`
const SIBILANT_PLURALS: [&str; 5] = ["sses", "shes", "ches", "xes", "zzes"];

fn singularize(name: &str) -> String {
	let lower = name.to_ascii_lowercase();
	if lower.ends_with("ies") && name.len() > 3 {
		format!("{}y", &name[..name.len() - 3])
	} else if SIBILANT_PLURALS.iter().any(|suffix| lower.ends_with(suffix)) {
		name[..name.len() - 2].to_string()
	} else if lower.ends_with('s') && !lower.ends_with("ss") && name.len() > 1 {
		// Purchases, Licenses: the `e` belongs to the singular
		name[..name.len() - 1].to_string()
	} else {
		name.to_string()
	}
}
