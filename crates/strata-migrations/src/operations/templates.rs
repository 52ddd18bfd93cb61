//! T-SQL templates for guarded drops and foreign key emulation triggers

use super::ForeignKeyTrigger;
use crate::name::{DEFAULT_SCHEMA, DatabaseName};

fn schema_of(name: &DatabaseName) -> &str {
	name.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
}

/// `DROP VIEW` guarded by a `sys.views` lookup
pub fn drop_view(view: &DatabaseName) -> String {
	let schema = schema_of(view);
	format!(
		"IF  EXISTS (SELECT * FROM sys.views WHERE object_id = OBJECT_ID(N'[{schema}].[{name}]'))\nDROP VIEW [{schema}].[{name}]",
		name = view.name
	)
}

/// `DROP TRIGGER` guarded by a `sys.triggers` lookup
pub fn drop_trigger(trigger: &DatabaseName) -> String {
	guarded_trigger_drop(schema_of(trigger), &trigger.name)
}

fn guarded_trigger_drop(schema: &str, name: &str) -> String {
	format!(
		"IF  EXISTS (SELECT * FROM sys.triggers WHERE object_id = OBJECT_ID(N'[{schema}].[{name}]'))  \nDROP TRIGGER [{schema}].[{name}]\n"
	)
}

pub(crate) fn insert_update_trigger_name(trigger: &ForeignKeyTrigger) -> String {
	format!(
		"Check_InsertUpdate_{}_{}",
		trigger.dependent_table, trigger.dependent_column
	)
}

pub(crate) fn delete_update_trigger_name(trigger: &ForeignKeyTrigger) -> String {
	format!(
		"Check_DeleteUpdate_{}{}",
		trigger.dependent_table, trigger.dependent_column
	)
}

/// Both emulation triggers
///
/// The first rejects dependent rows whose column points at a missing
/// principal row; the second rejects deleting a principal row that is still
/// referenced.
pub fn foreign_key_triggers(trigger: &ForeignKeyTrigger) -> [String; 2] {
	let ForeignKeyTrigger {
		schema: s,
		dependent_table: fk_table,
		dependent_column: fk_column,
		principal_table: pk_table,
		principal_column: pk_column,
	} = trigger;

	let insert_update = format!(
		"CREATE TRIGGER [{s}].[{name}] \n\
		 ON  [{s}].[{fk_table}] \n\
		 AFTER INSERT,UPDATE \n\
		 AS \n\
		 SET NOCOUNT ON;\n\
		 IF NOT EXISTS(select 1 from inserted) RETURN;\n\
		 IF  EXISTS (SELECT 1 FROM inserted as i WHERE i.{fk_column} is NULL) RETURN;\n\
		 IF NOT EXISTS (SELECT 1 FROM {s}.{pk_table} t \n\
		 JOIN inserted AS i ON t.{pk_column} = i.{fk_column}) \n\
		 BEGIN \n\
		 RAISERROR ('{fk_table}.{fk_column} doesnot exist',1,1); \n\
		 ROLLBACK TRANSACTION; \n\
		 RETURN ;\n\
		 END  \n",
		name = insert_update_trigger_name(trigger)
	);

	let delete_update = format!(
		"CREATE TRIGGER [{s}].[{name}] \n\
		 ON  [{s}].[{pk_table}] \n\
		 AFTER DELETE,UPDATE \n\
		 AS \n\
		 SET NOCOUNT ON;\n\
		 IF (NOT EXISTS(select 1 from inserted)) AND (NOT EXISTS(select 1 from deleted)) RETURN;\n\
		 IF NOT EXISTS (SELECT 1 FROM {s}.{pk_table} as p\n\
		 JOIN deleted as d on p.{pk_column} = d.{pk_column})\n\
		 BEGIN\n\
		 IF EXISTS (SELECT 1 FROM {s}.{fk_table} as f\n\
		 JOIN deleted as d on f.{fk_column} = d.{pk_column})\n\
		 BEGIN\n\
		 RAISERROR ('Record cannot be deleted because it used in {s}.{fk_table}',1,1);\n\
		 ROLLBACK TRANSACTION;\n\
		 RETURN ;\n\
		 END\n\
		 END;\n",
		name = delete_update_trigger_name(trigger)
	);

	[insert_update, delete_update]
}

/// Guarded drops for both emulation triggers
pub fn drop_foreign_key_triggers(trigger: &ForeignKeyTrigger) -> [String; 2] {
	[
		guarded_trigger_drop(&trigger.schema, &insert_update_trigger_name(trigger)),
		guarded_trigger_drop(&trigger.schema, &delete_update_trigger_name(trigger)),
	]
}
