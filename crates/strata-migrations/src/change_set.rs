//! Tables participating in version change-volume reporting

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A table registered for the change-set view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetEntry {
	pub table: String,
	/// Table holding the `VersionId` rows the counts are grouped by
	pub version_table: String,
	/// Natural key used to pair a row with its soft-deleted predecessor
	pub keys: Vec<String>,
}

impl ChangeSetEntry {
	pub fn new(table: impl Into<String>, version_table: impl Into<String>, keys: &[&str]) -> Self {
		Self {
			table: table.into(),
			version_table: version_table.into(),
			keys: keys.iter().map(|k| k.to_string()).collect(),
		}
	}
}

/// Additions and removals declared by one invocation of a migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetDeclarations {
	adds: IndexMap<String, ChangeSetEntry>,
	removes: Vec<String>,
}

impl ChangeSetDeclarations {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declare `entry`, replacing an earlier declaration for the same table
	pub fn add(&mut self, entry: ChangeSetEntry) {
		self.adds.insert(entry.table.clone(), entry);
	}

	/// Cancel a pending add for `table`, or queue its removal from the registry
	pub fn remove(&mut self, table: &str) {
		if self.adds.shift_remove(table).is_none() {
			self.removes.push(table.to_string());
		}
	}

	pub fn clear(&mut self) {
		self.adds.clear();
		self.removes.clear();
	}

	pub fn is_empty(&self) -> bool {
		self.adds.is_empty() && self.removes.is_empty()
	}

	pub fn added(&self) -> impl Iterator<Item = &ChangeSetEntry> {
		self.adds.values()
	}

	pub fn removed(&self) -> &[String] {
		&self.removes
	}
}

/// Ordered set of change-set tables, keyed by table name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSetRegistry {
	entries: IndexMap<String, ChangeSetEntry>,
}

impl ChangeSetRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Apply `declarations`: removals first, then adds (upserting)
	pub fn merge(&mut self, declarations: &ChangeSetDeclarations) {
		for table in &declarations.removes {
			self.entries.shift_remove(table);
		}
		for (table, entry) in &declarations.adds {
			self.entries.insert(table.clone(), entry.clone());
		}
	}

	pub fn get(&self, table: &str) -> Option<&ChangeSetEntry> {
		self.entries.get(table)
	}

	pub fn entries(&self) -> impl Iterator<Item = &ChangeSetEntry> {
		self.entries.values()
	}

	pub fn tables(&self) -> Vec<&str> {
		self.entries.keys().map(String::as_str).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
