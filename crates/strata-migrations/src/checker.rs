//! # Migration Checks
//!
//! Diagnostic comparison of the local catalog against recorded history, and
//! resolution of user-supplied version or name filters to concrete ids.

use crate::engine::{MigrationEngine, matches_filter};
use crate::{MigrationError, Result};
use std::fmt;

/// How a command picks its migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MigrationSelector {
	/// The newest migration, or a clean database when downgrading
	#[default]
	Latest,
	/// The last migration whose id starts with this version prefix
	Version(String),
	/// The single migration whose id contains this text
	Name(String),
}

impl MigrationSelector {
	pub fn version(prefix: impl Into<String>) -> Self {
		Self::Version(prefix.into())
	}

	pub fn name(text: impl Into<String>) -> Self {
		Self::Name(text.into())
	}
}

/// Outcome of comparing local migrations with history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
	/// Local migrations with no history row
	pub missing: Vec<String>,
	/// History rows with no local migration
	pub extra: Vec<String>,
	/// Installed migrations whose recorded hash differs from the local one
	pub hash_mismatches: Vec<String>,
}

impl CheckReport {
	pub fn has_discrepancies(&self) -> bool {
		!self.missing.is_empty() || !self.extra.is_empty() || !self.hash_mismatches.is_empty()
	}

	/// Report text, one line per heading or id
	pub fn lines(&self) -> Vec<String> {
		let mut lines = Vec::new();
		if !self.missing.is_empty() {
			lines.push("Found migrations missing from the database:".to_string());
			lines.extend(self.missing.iter().cloned());
		}
		if !self.extra.is_empty() {
			lines.push("Found 'extra' migrations in the database:".to_string());
			lines.extend(self.extra.iter().cloned());
		}
		if self.missing.is_empty() && self.extra.is_empty() {
			if self.hash_mismatches.is_empty() {
				lines.push("No discrepancies found in migrations".to_string());
			} else {
				lines.push("Found hash mismatches in migrations:".to_string());
				lines.extend(self.hash_mismatches.iter().cloned());
			}
		}
		lines
	}
}

impl fmt::Display for CheckReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.lines().join("\n"))
	}
}

/// Pick the migration `selector` designates among the ascending `local_ids`
///
/// `Ok(None)` means a clean database and is only returned when downgrading.
///
/// # Examples
///
/// ```
/// use strata_migrations::{MigrationSelector, resolve_target};
///
/// let ids = vec!["1.1.1000_Init".to_string(), "1.2.2000_AddExcise".to_string()];
///
/// let target = resolve_target(&ids, &MigrationSelector::name("excise"), false).unwrap();
/// assert_eq!(target.as_deref(), Some("1.2.2000_AddExcise"));
///
/// let target = resolve_target(&ids, &MigrationSelector::Latest, true).unwrap();
/// assert_eq!(target, None);
/// ```
pub fn resolve_target(
	local_ids: &[String],
	selector: &MigrationSelector,
	downgrade: bool,
) -> Result<Option<String>> {
	match selector {
		MigrationSelector::Name(name) => unique_match(local_ids, name).map(Some),
		MigrationSelector::Version(version) => local_ids
			.iter()
			.rfind(|id| matches_filter(id, version, true))
			.cloned()
			.map(Some)
			.ok_or_else(|| MigrationError::MigrationNotFound(version.clone())),
		MigrationSelector::Latest => {
			let last = local_ids
				.last()
				.ok_or_else(|| MigrationError::MigrationNotFound("latest".to_string()))?;
			Ok((!downgrade).then(|| last.clone()))
		}
	}
}

fn unique_match(ids: &[String], name: &str) -> Result<String> {
	let candidates: Vec<String> = ids
		.iter()
		.filter(|id| matches_filter(id, name, false))
		.cloned()
		.collect();
	match candidates.as_slice() {
		[] => Err(MigrationError::MigrationNotFound(name.to_string())),
		[single] => Ok(single.clone()),
		_ => Err(MigrationError::AmbiguousMigrationMatch {
			filter: name.to_string(),
			candidates,
		}),
	}
}

/// Runs [`MigrationEngine::check_migrations`] with bounds picked by a selector
#[derive(Debug)]
pub struct MigrationChecker<'a> {
	engine: &'a MigrationEngine,
}

impl<'a> MigrationChecker<'a> {
	pub fn new(engine: &'a MigrationEngine) -> Self {
		Self { engine }
	}

	pub async fn check(&self, selector: &MigrationSelector) -> Result<CheckReport> {
		match selector {
			MigrationSelector::Latest => self.check_last_migration().await,
			MigrationSelector::Version(version) => self.check_by_version(version).await,
			MigrationSelector::Name(name) => self.check_by_migration_name(name).await,
		}
	}

	/// Compare everything up to the newest local and newest installed migration
	pub async fn check_last_migration(&self) -> Result<CheckReport> {
		let local = self.engine.local_migrations();
		let installed = self.engine.database_migrations().await?;
		self.engine
			.check_migrations(local.last().map(String::as_str), installed.last().map(String::as_str))
			.await
	}

	/// Compare up to the last local and last installed id starting with `version`
	pub async fn check_by_version(&self, version: &str) -> Result<CheckReport> {
		let local = self.engine.local_migrations();
		let local_id = local
			.iter()
			.rfind(|id| matches_filter(id, version, true))
			.ok_or_else(|| MigrationError::MigrationNotFound(version.to_string()))?;

		let installed = self
			.engine
			.database_migrations_matching(Some(version), true)
			.await?;
		let db_id = installed
			.last()
			.ok_or_else(|| MigrationError::MigrationNotFound(version.to_string()))?;

		self.engine.check_migrations(Some(local_id), Some(db_id)).await
	}

	/// Compare up to the single local and single installed id containing `name`
	pub async fn check_by_migration_name(&self, name: &str) -> Result<CheckReport> {
		let local_id = unique_match(&self.engine.local_migrations(), name)?;
		let installed = self
			.engine
			.database_migrations_matching(Some(name), false)
			.await?;
		let db_id = unique_match(&installed, name)?;

		self.engine
			.check_migrations(Some(&local_id), Some(&db_id))
			.await
	}
}
