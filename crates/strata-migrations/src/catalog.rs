//! Registry of known migrations, indexed by identifier

use crate::migration::{MIGRATIONS, Migration, MigrationProvider};
use crate::version::{VersionComparer, split_identifier};
use crate::{MigrationError, Result};
use indexmap::IndexMap;

/// Every migration the application ships, in ascending identifier order
#[derive(Debug)]
pub struct MigrationCatalog {
	migrations: IndexMap<String, Box<dyn Migration>>,
}

impl MigrationCatalog {
	/// Build a catalog from explicit definitions
	///
	/// Definitions with a blank id are skipped. Two definitions sharing an id
	/// fail with [`MigrationError::DuplicateMigrationId`], and a malformed
	/// version prefix with [`MigrationError::InvalidVersionFormat`].
	pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
		let mut by_id: IndexMap<String, Box<dyn Migration>> = IndexMap::new();
		for migration in migrations {
			let id = migration.id().to_string();
			if id.trim().is_empty() {
				tracing::warn!("Skipping migration without an id");
				continue;
			}
			if by_id.contains_key(&id) {
				return Err(MigrationError::DuplicateMigrationId(id));
			}
			by_id.insert(id, migration);
		}

		let mut ids: Vec<String> = by_id.keys().cloned().collect();
		VersionComparer::sort_ids(&mut ids)?;

		let mut sorted = IndexMap::with_capacity(ids.len());
		for id in ids {
			if let Some(migration) = by_id.shift_remove(&id) {
				sorted.insert(id, migration);
			}
		}
		Ok(Self { migrations: sorted })
	}

	/// Catalog of every migration in the [`MIGRATIONS`] slice
	pub fn from_registered() -> Result<Self> {
		Self::new(MIGRATIONS.iter().map(|factory| factory()).collect())
	}

	pub fn from_provider<P: MigrationProvider>() -> Result<Self> {
		Self::new(P::migrations())
	}

	/// All identifiers, ascending
	pub fn all_identifiers(&self) -> Vec<String> {
		self.migrations.keys().cloned().collect()
	}

	/// The definition registered under exactly `id`
	pub fn get(&self, id: &str) -> Result<&dyn Migration> {
		self.migrations
			.get(id)
			.map(|m| m.as_ref())
			.ok_or_else(|| MigrationError::MigrationNotFound(id.to_string()))
	}

	pub fn contains(&self, id: &str) -> bool {
		self.migrations.contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.migrations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.migrations.is_empty()
	}

	/// `name`, or `name` with the first numeric suffix no migration is named by
	///
	/// A migration's name is the part of its id after the version, e.g.
	/// `Init` for `1.1.1000_Init`.
	pub fn disambiguate_name(&self, name: &str) -> String {
		let mut candidate = name.to_string();
		let mut suffix = 1;
		while self.migrations.keys().any(|id| migration_name(id) == candidate) {
			candidate = format!("{name}{suffix}");
			suffix += 1;
		}
		candidate
	}
}

fn migration_name(id: &str) -> &str {
	let (_, suffix) = split_identifier(id);
	suffix.strip_prefix('_').unwrap_or(suffix)
}
