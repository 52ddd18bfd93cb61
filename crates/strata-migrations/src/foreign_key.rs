//! Principal column inference and foreign key ordering

use crate::name::DatabaseName;
use crate::operations::{AddForeignKeyOperation, Operation};
use crate::schema::SchemaSnapshot;
use crate::{MigrationError, Result};

/// Completes foreign keys declared without principal columns
#[derive(Debug, Default, Clone, Copy)]
pub struct ForeignKeyResolver;

impl ForeignKeyResolver {
	/// Fill in missing principal columns
	///
	/// The snapshot is consulted first; a table created by `operations` itself
	/// is the fallback. A foreign key neither source can complete fails the
	/// whole call with [`MigrationError::UnresolvableForeignKey`].
	pub fn resolve(operations: &mut [Operation], snapshot: &SchemaSnapshot) -> Result<()> {
		let default_schema = snapshot.default_schema();
		let created: Vec<(DatabaseName, Option<Vec<String>>)> = operations
			.iter()
			.filter_map(|op| match op {
				Operation::CreateTable(create) => Some((
					create.name.clone().with_default_schema(default_schema),
					create.primary_key.as_ref().map(|pk| pk.columns.clone()),
				)),
				_ => None,
			})
			.collect();

		for operation in operations.iter_mut() {
			let Operation::AddForeignKey(foreign_key) = operation else {
				continue;
			};
			if foreign_key.has_principal_columns() {
				continue;
			}

			if let Some(columns) = snapshot.key_columns(&foreign_key.principal_table) {
				foreign_key.principal_columns = columns.to_vec();
				continue;
			}

			let principal = foreign_key
				.principal_table
				.clone()
				.with_default_schema(default_schema);
			let created_keys = created
				.iter()
				.find(|(name, _)| name.matches(&principal))
				.and_then(|(_, keys)| keys.clone());
			match created_keys {
				Some(columns) => foreign_key.principal_columns = columns,
				None => return Err(unresolvable(foreign_key)),
			}
		}
		Ok(())
	}

	/// Move foreign keys on tables created in the same batch behind everything else
	///
	/// Stable partition: relative order inside each group is preserved.
	pub fn order_operations(operations: Vec<Operation>) -> Vec<Operation> {
		let created: Vec<DatabaseName> = operations
			.iter()
			.filter_map(|op| match op {
				Operation::CreateTable(create) => Some(create.name.clone()),
				_ => None,
			})
			.collect();

		let (deferred, mut ordered): (Vec<Operation>, Vec<Operation>) =
			operations.into_iter().partition(|op| match op {
				Operation::AddForeignKey(foreign_key) => created
					.iter()
					.any(|name| name.matches(&foreign_key.dependent_table)),
				_ => false,
			});
		ordered.extend(deferred);
		ordered
	}
}

fn unresolvable(foreign_key: &AddForeignKeyOperation) -> MigrationError {
	MigrationError::UnresolvableForeignKey {
		dependent_table: foreign_key.dependent_table.to_string(),
		columns: foreign_key.dependent_columns.join(", "),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builder::MigrationBuilder;
	use crate::operations::ColumnDefinition;

	fn principal_columns(operations: &[Operation]) -> Vec<Vec<String>> {
		operations
			.iter()
			.filter_map(|op| match op {
				Operation::AddForeignKey(fk) => Some(fk.principal_columns.clone()),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn test_resolves_from_snapshot() {
		// Arrange
		let mut m = MigrationBuilder::default();
		m.add_foreign_key("Goods", &["GroupId"], "GoodGroups", &[], false);
		let mut operations = m.finish().unwrap().operations;
		let snapshot = SchemaSnapshot::default()
			.with_table("dbo.GoodGroups", &["Id"])
			.unwrap();

		// Act
		ForeignKeyResolver::resolve(&mut operations, &snapshot).unwrap();

		// Assert
		assert_eq!(principal_columns(&operations), vec![vec!["Id".to_string()]]);
	}

	#[test]
	fn test_resolves_from_table_created_in_batch() {
		let mut m = MigrationBuilder::default();
		m.create_table(
			"Stores",
			vec![
				ColumnDefinition::new("Inn", "nvarchar(12)").not_null(),
				ColumnDefinition::new("Kpp", "nvarchar(9)").not_null(),
			],
		)
		.primary_key(&["Inn", "Kpp"]);
		m.add_foreign_key("Prices", &["StoreInn", "StoreKpp"], "Stores", &[], true);
		let mut operations = m.finish().unwrap().operations;

		ForeignKeyResolver::resolve(&mut operations, &SchemaSnapshot::default()).unwrap();

		assert_eq!(
			principal_columns(&operations),
			vec![vec!["Inn".to_string(), "Kpp".to_string()]]
		);
	}

	#[test]
	fn test_explicit_columns_are_kept() {
		let mut m = MigrationBuilder::default();
		m.add_foreign_key("Goods", &["GroupCode"], "GoodGroups", &["Code"], false);
		let mut operations = m.finish().unwrap().operations;

		ForeignKeyResolver::resolve(&mut operations, &SchemaSnapshot::default()).unwrap();

		assert_eq!(principal_columns(&operations), vec![vec!["Code".to_string()]]);
	}

	#[test]
	fn test_unresolvable_foreign_key_fails() {
		let mut m = MigrationBuilder::default();
		m.add_foreign_key("Goods", &["GroupId"], "GoodGroups", &[], false);
		let mut operations = m.finish().unwrap().operations;

		let result = ForeignKeyResolver::resolve(&mut operations, &SchemaSnapshot::default());

		assert!(matches!(
			result,
			Err(MigrationError::UnresolvableForeignKey { dependent_table, columns })
				if dependent_table == "dbo.Goods" && columns == "GroupId"
		));
	}

	#[test]
	fn test_created_table_without_primary_key_is_unresolvable() {
		let mut m = MigrationBuilder::default();
		m.create_table("GoodGroups", vec![ColumnDefinition::new("Id", "int")]);
		m.add_foreign_key("Goods", &["GroupId"], "GoodGroups", &[], false);
		let mut operations = m.finish().unwrap().operations;

		let result = ForeignKeyResolver::resolve(&mut operations, &SchemaSnapshot::default());

		assert!(matches!(result, Err(MigrationError::UnresolvableForeignKey { .. })));
	}

	#[test]
	fn test_foreign_keys_of_created_tables_move_last() {
		// Arrange
		let mut m = MigrationBuilder::default();
		m.create_table("Goods", vec![ColumnDefinition::new("Id", "int")])
			.primary_key(&["Id"])
			.foreign_key(&["GroupId"], "GoodGroups", false);
		m.create_table("GoodGroups", vec![ColumnDefinition::new("Id", "int")])
			.primary_key(&["Id"]);
		m.add_foreign_key("Stores", &["RegionId"], "Regions", &["Id"], false);
		let operations = m.finish().unwrap().operations;

		// Act
		let ordered = ForeignKeyResolver::order_operations(operations);

		// Assert
		let kinds: Vec<&str> = ordered.iter().map(Operation::kind).collect();
		assert_eq!(kinds, vec!["CreateTable", "CreateTable", "AddForeignKey", "AddForeignKey"]);
		let Operation::AddForeignKey(last) = &ordered[3] else {
			panic!("expected AddForeignKey");
		};
		assert_eq!(last.dependent_table, DatabaseName::new("dbo", "Goods"));
	}
}
