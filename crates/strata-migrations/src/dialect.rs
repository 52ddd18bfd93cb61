//! # SQL Dialects
//!
//! Migrations describe schema changes once; the dialect decides how names are
//! quoted, which bookkeeping SQL the history table and reporting view use, and
//! how a transaction is raised to serializable isolation.
//!
//! [`SqlDialect::SqlServer`] renders bracket-quoted T-SQL. The other dialects
//! cover the backends reachable through `sqlx`'s `Any` driver. MySQL and
//! SQLite have no schemas inside a connection, so schema qualifiers are
//! dropped for them.

use crate::name::{DatabaseName, quote_identifier};
use serde::{Deserialize, Serialize};

/// SQL dialect for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SqlDialect {
	#[default]
	SqlServer,
	Postgres,
	Mysql,
	Sqlite,
}

impl SqlDialect {
	/// Dialect implied by a connection URL scheme; unknown schemes are SQL Server
	///
	/// # Examples
	///
	/// ```
	/// use strata_migrations::SqlDialect;
	///
	/// assert_eq!(SqlDialect::from_url("postgres://localhost/goods"), SqlDialect::Postgres);
	/// assert_eq!(SqlDialect::from_url("sqlite://goods.db?mode=rwc"), SqlDialect::Sqlite);
	/// assert_eq!(SqlDialect::from_url("mssql://localhost/goods"), SqlDialect::SqlServer);
	/// ```
	pub fn from_url(url: &str) -> Self {
		let scheme = url
			.split_once(':')
			.map(|(scheme, _)| scheme)
			.unwrap_or_default()
			.to_ascii_lowercase();
		match scheme.as_str() {
			"postgres" | "postgresql" => Self::Postgres,
			"mysql" | "mariadb" => Self::Mysql,
			"sqlite" => Self::Sqlite,
			_ => Self::SqlServer,
		}
	}

	/// Quote one identifier
	pub fn quote(self, identifier: &str) -> String {
		match self {
			Self::SqlServer => quote_identifier(identifier),
			Self::Postgres | Self::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
			Self::Mysql => format!("`{}`", identifier.replace('`', "``")),
		}
	}

	/// Whether objects can live in a schema other than the connection's own
	pub fn supports_schemas(self) -> bool {
		matches!(self, Self::SqlServer | Self::Postgres)
	}

	/// Quoted object name, schema-qualified where the dialect has schemas
	pub fn object_name(self, name: &DatabaseName) -> String {
		match (self, &name.schema) {
			(Self::SqlServer, _) => name.quoted(),
			(Self::Postgres, Some(schema)) => format!("{}.{}", self.quote(schema), self.quote(&name.name)),
			_ => self.quote(&name.name),
		}
	}

	/// Statement run first inside every migration transaction
	pub fn transaction_isolation(self) -> Option<&'static str> {
		match self {
			Self::SqlServer | Self::Postgres => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
			Self::Mysql | Self::Sqlite => None,
		}
	}

	/// Statement run once on every new connection
	///
	/// MySQL rejects isolation changes inside an open transaction, so the
	/// session default is raised instead. SQLite transactions are always
	/// serializable.
	pub fn session_isolation(self) -> Option<&'static str> {
		match self {
			Self::Mysql => Some("SET SESSION TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
			_ => None,
		}
	}

	/// Query listing primary key columns as `TABLE_SCHEMA`, `TABLE_NAME`,
	/// `COLUMN_NAME`, ordered by table and key position
	pub fn primary_key_query(self) -> &'static str {
		match self {
			Self::SqlServer | Self::Postgres => PRIMARY_KEY_QUERY,
			Self::Mysql => MYSQL_PRIMARY_KEY_QUERY,
			Self::Sqlite => SQLITE_PRIMARY_KEY_QUERY,
		}
	}

	/// Column type for this dialect from a SQL Server style store type
	///
	/// Types without a known counterpart pass through unchanged.
	pub fn store_type(self, raw: &str) -> String {
		let raw = raw.trim();
		let (base, facets) = match raw.find('(') {
			Some(position) => (raw[..position].trim(), raw[position..].trim()),
			None => (raw, ""),
		};
		let base_lower = base.to_ascii_lowercase();
		let facets_lower = facets.to_ascii_lowercase().replace(' ', "");
		let unbounded = facets_lower == "(max)";

		let mapped = match (self, base_lower.as_str()) {
			(Self::SqlServer, _) => return store_type_brackets(base, facets),
			(Self::Sqlite, "int" | "integer" | "bigint" | "smallint" | "tinyint" | "bit") => {
				return "INTEGER".to_string();
			}
			(Self::Sqlite, "nvarchar" | "varchar" | "nchar" | "char" | "ntext" | "text") => {
				return "TEXT".to_string();
			}
			(Self::Sqlite, "varbinary" | "binary" | "image") => return "BLOB".to_string(),
			(Self::Sqlite, "datetime" | "datetime2" | "date" | "uniqueidentifier") => {
				return "TEXT".to_string();
			}
			(Self::Postgres, "nvarchar" | "varchar") if unbounded => "text",
			(Self::Postgres, "nvarchar") => "varchar",
			(Self::Postgres, "nchar") => "char",
			(Self::Postgres, "ntext") => "text",
			(Self::Postgres, "bit" | "tinyint") => return "smallint".to_string(),
			(Self::Postgres, "datetime" | "datetime2") => return "timestamp".to_string(),
			(Self::Postgres, "uniqueidentifier") => return "uuid".to_string(),
			(Self::Postgres, "varbinary" | "binary" | "image") => return "bytea".to_string(),
			(Self::Mysql, "nvarchar" | "varchar") if unbounded => return "longtext".to_string(),
			(Self::Mysql, "ntext") => return "longtext".to_string(),
			(Self::Mysql, "varbinary") if unbounded => return "longblob".to_string(),
			(Self::Mysql, "bit") => return "tinyint(1)".to_string(),
			(Self::Mysql, "datetime2") => return "datetime(6)".to_string(),
			(Self::Mysql, "uniqueidentifier") => return "char(36)".to_string(),
			_ => base,
		};
		if unbounded {
			mapped.to_string()
		} else {
			format!("{mapped}{facets}")
		}
	}
}

/// `nvarchar(max)` becomes `[nvarchar](max)`
fn store_type_brackets(base: &str, facets: &str) -> String {
	format!("{}{}", quote_identifier(base), facets)
}

const PRIMARY_KEY_QUERY: &str = "SELECT CAST(kcu.TABLE_SCHEMA AS varchar(256)) AS TABLE_SCHEMA, \
CAST(kcu.TABLE_NAME AS varchar(256)) AS TABLE_NAME, CAST(kcu.COLUMN_NAME AS varchar(256)) AS COLUMN_NAME \
FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA AND tc.TABLE_NAME = kcu.TABLE_NAME \
WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
ORDER BY kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.ORDINAL_POSITION";

const MYSQL_PRIMARY_KEY_QUERY: &str = "SELECT NULL AS TABLE_SCHEMA, \
CAST(kcu.TABLE_NAME AS CHAR(256)) AS TABLE_NAME, CAST(kcu.COLUMN_NAME AS CHAR(256)) AS COLUMN_NAME \
FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
WHERE kcu.CONSTRAINT_NAME = 'PRIMARY' AND kcu.TABLE_SCHEMA = DATABASE() \
ORDER BY kcu.TABLE_NAME, kcu.ORDINAL_POSITION";

const SQLITE_PRIMARY_KEY_QUERY: &str = "SELECT NULL AS TABLE_SCHEMA, m.name AS TABLE_NAME, p.name AS COLUMN_NAME \
FROM sqlite_master m JOIN pragma_table_info(m.name) p \
WHERE m.type = 'table' AND p.pk > 0 \
ORDER BY m.name, p.pk";
