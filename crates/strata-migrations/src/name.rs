//! Schema-qualified database object names

use super::{MigrationError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema applied to every unqualified table, view, trigger and procedure name
pub const DEFAULT_SCHEMA: &str = "dbo";

/// `schema.name`, where either part may be bracket-quoted with `]]` escapes
static PART_EXTRACTOR: Lazy<Regex> = Lazy::new(|| {
	let part = |n: u8| {
		format!(
			r"(?:(?:\[(?P<bracketed{n}>(?:\]\]|[^\]])+)\])|(?P<plain{n}>[^\.\[\]]+))"
		)
	};
	Regex::new(&format!(r"^{}(?:\.{})?$", part(1), part(2)))
		.unwrap_or_else(|e| panic!("database name pattern must compile: {e}"))
});

/// A database object name with an optional schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseName {
	pub schema: Option<String>,
	pub name: String,
}

impl DatabaseName {
	/// Create a schema-qualified name
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::DatabaseName;
	///
	/// let name = DatabaseName::new("dbo", "Goods");
	/// assert_eq!(name.to_string(), "dbo.Goods");
	/// ```
	pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			schema: Some(schema.into()),
			name: name.into(),
		}
	}

	/// Create a name without a schema
	pub fn unqualified(name: impl Into<String>) -> Self {
		Self {
			schema: None,
			name: name.into(),
		}
	}

	/// Parse `name`, `schema.name`, or their bracket-quoted forms
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::DatabaseName;
	///
	/// let name = DatabaseName::parse("[my.schema].Goods").unwrap();
	/// assert_eq!(name.schema.as_deref(), Some("my.schema"));
	/// assert_eq!(name.name, "Goods");
	/// ```
	pub fn parse(value: &str) -> Result<Self> {
		let trimmed = value.trim();
		let captures = PART_EXTRACTOR
			.captures(trimmed)
			.ok_or_else(|| MigrationError::InvalidDatabaseName(value.to_string()))?;

		let part = |n: u8| {
			captures
				.name(&format!("bracketed{n}"))
				.or_else(|| captures.name(&format!("plain{n}")))
				.map(|m| m.as_str().replace("]]", "]"))
		};

		let first = part(1).ok_or_else(|| MigrationError::InvalidDatabaseName(value.to_string()))?;
		match part(2) {
			Some(second) if !second.trim().is_empty() => Ok(Self::new(first, second)),
			_ => Ok(Self::unqualified(first)),
		}
	}

	/// Parse `value` and apply `default_schema` when it carries no schema
	pub fn qualify(value: &str, default_schema: &str) -> Result<Self> {
		let parsed = Self::parse(value)?;
		Ok(parsed.with_default_schema(default_schema))
	}

	/// Return this name with `default_schema` filled in when missing
	pub fn with_default_schema(mut self, default_schema: &str) -> Self {
		if self.schema.as_deref().is_none_or(|s| s.trim().is_empty()) {
			self.schema = Some(default_schema.to_string());
		}
		self
	}

	/// Bracket-quoted form for DDL, e.g. `[dbo].[Goods]`
	pub fn quoted(&self) -> String {
		match &self.schema {
			Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
			None => quote_identifier(&self.name),
		}
	}

	/// Case-insensitive comparison of the display forms
	pub fn matches(&self, other: &DatabaseName) -> bool {
		self.to_string().eq_ignore_ascii_case(&other.to_string())
	}
}

impl fmt::Display for DatabaseName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(schema) = &self.schema {
			write!(f, "{}.", escape(schema))?;
		}
		write!(f, "{}", escape(&self.name))
	}
}

/// Quote an identifier only if it contains `]`, `[` or `.`
fn escape(name: &str) -> String {
	if name.contains([']', '[', '.']) {
		quote_identifier(name)
	} else {
		name.to_string()
	}
}

/// Always bracket-quote an identifier, doubling any closing bracket
///
/// # Examples
///
/// ```
/// use strata_migrations::name::quote_identifier;
///
/// assert_eq!(quote_identifier("Goods"), "[Goods]");
/// assert_eq!(quote_identifier("a]b"), "[a]]b]");
/// ```
pub fn quote_identifier(name: &str) -> String {
	format!("[{}]", name.replace(']', "]]"))
}
