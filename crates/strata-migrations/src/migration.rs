//! Migration definitions and compile-time registration
//!
//! A migration is data: each hook receives a fresh [`MigrationBuilder`] and
//! describes what it changes. The engine decides when to call which hook.
//!
//! # Registration
//!
//! Migrations reach a [`MigrationCatalog`](crate::MigrationCatalog) in one of
//! three ways: passed directly, grouped by a [`MigrationProvider`], or added
//! to the [`MIGRATIONS`] distributed slice:
//!
//! ```rust,ignore
//! use strata_migrations::{MIGRATIONS, Migration, MigrationBuilder, MigrationFactory, Result};
//!
//! struct AddExcise;
//!
//! impl Migration for AddExcise {
//!     fn id(&self) -> &str {
//!         "1.2.2000_AddExcise"
//!     }
//!
//!     fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
//!         m.add_column("Goods", ColumnDefinition::new("Excise", "bit"));
//!         Ok(())
//!     }
//! }
//!
//! #[linkme::distributed_slice(MIGRATIONS)]
//! static ADD_EXCISE: MigrationFactory = || Box::new(AddExcise);
//! ```

use crate::Result;
use crate::builder::MigrationBuilder;
use linkme::distributed_slice;

/// One versioned unit of schema and data change
///
/// Only [`id`](Migration::id) and [`up`](Migration::up) are required; the
/// other hooks default to doing nothing.
pub trait Migration: Send + Sync {
	/// Identifier of the form `<major>.<minor>.<sequence>_<Name>`
	fn id(&self) -> &str;

	fn up(&self, m: &mut MigrationBuilder) -> Result<()>;

	fn down(&self, _m: &mut MigrationBuilder) -> Result<()> {
		Ok(())
	}

	/// Reference data, run when seeding is enabled
	fn seed(&self, _m: &mut MigrationBuilder) -> Result<()> {
		Ok(())
	}

	/// Fixture data, run when test seeding is enabled
	fn seed_for_test(&self, _m: &mut MigrationBuilder) -> Result<()> {
		Ok(())
	}

	/// Whether applying or reverting writes to the history table
	fn affects_history(&self) -> bool {
		true
	}
}

impl std::fmt::Debug for dyn Migration {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Migration").field("id", &self.id()).finish()
	}
}

/// Constructor stored in the [`MIGRATIONS`] slice
pub type MigrationFactory = fn() -> Box<dyn Migration>;

/// Migrations registered at link time
///
/// ```rust,ignore
/// #[linkme::distributed_slice(strata_migrations::MIGRATIONS)]
/// static INIT: strata_migrations::MigrationFactory = || Box::new(Init);
/// ```
#[distributed_slice]
pub static MIGRATIONS: [MigrationFactory];

/// Groups the migrations of one application
///
/// ```rust,ignore
/// pub struct GoodsMigrations;
///
/// impl MigrationProvider for GoodsMigrations {
///     fn migrations() -> Vec<Box<dyn Migration>> {
///         vec![Box::new(Init), Box::new(AddExcise)]
///     }
/// }
/// ```
pub trait MigrationProvider {
	fn migrations() -> Vec<Box<dyn Migration>>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::operations::ColumnDefinition;

	struct OnlyUp;

	impl Migration for OnlyUp {
		fn id(&self) -> &str {
			"1.0.1_OnlyUp"
		}

		fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
			m.add_column("Goods", ColumnDefinition::new("Code", "nvarchar(20)"));
			Ok(())
		}
	}

	#[test]
	fn test_optional_hooks_collect_nothing() {
		let migration = OnlyUp;
		let mut m = MigrationBuilder::default();

		migration.down(&mut m).unwrap();
		migration.seed(&mut m).unwrap();
		migration.seed_for_test(&mut m).unwrap();

		assert!(m.operations().is_empty());
		assert!(m.data_operations().is_empty());
		assert!(migration.affects_history());
	}

	#[test]
	fn test_debug_shows_id() {
		let migration: Box<dyn Migration> = Box::new(OnlyUp);

		assert_eq!(format!("{migration:?}"), "Migration { id: \"1.0.1_OnlyUp\" }");
	}
}
