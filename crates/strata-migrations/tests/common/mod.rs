//! Shared migrations and fixtures for engine integration tests

#![allow(dead_code)]

use rstest::fixture;
use std::sync::{Arc, Mutex};
use strata_migrations::{
	ColumnDefinition, InMemoryExecutor, InMemoryHistoryStore, Migration, MigrationBuilder,
	MigrationCatalog, MigrationEngine, Result, SqlValue,
};

pub const CONTEXT_KEY: &str = "strata";

/// Creates `Goods`, registers it for change-set reporting and seeds one row
pub struct Init;

impl Migration for Init {
	fn id(&self) -> &str {
		"1.1.1000_Init"
	}

	fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.create_table(
			"Goods",
			vec![
				ColumnDefinition::new("Id", "int").not_null(),
				ColumnDefinition::new("Name", "nvarchar(max)"),
				ColumnDefinition::new("VersionId", "int").not_null(),
				ColumnDefinition::new("DeleteInVersionId", "int"),
			],
		)
		.primary_key(&["Id", "VersionId"]);
		m.add_change_set_table("Goods", "Versions", &["Id"]);
		Ok(())
	}

	fn down(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.drop_table("Goods");
		m.remove_change_set_table("Goods");
		Ok(())
	}

	fn seed(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.create_insert("dbo.Goods", &["Id", "Name", "VersionId"])
			.insert_or_update([SqlValue::from(1), SqlValue::from("Bread"), SqlValue::from(1)])?;
		Ok(())
	}

	fn seed_for_test(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.raw_data_seed_sql("INSERT INTO dbo.Goods (Id, Name, VersionId) VALUES (99, 'Fixture', 1)");
		Ok(())
	}
}

/// Adds the `Excise` flag to `Goods`
pub struct AddExcise;

impl Migration for AddExcise {
	fn id(&self) -> &str {
		"1.2.2000_AddExcise"
	}

	fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.add_column(
			"Goods",
			ColumnDefinition::new("Excise", "bit")
				.not_null()
				.with_default_value("0"),
		);
		Ok(())
	}

	fn down(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.drop_column("Goods", "Excise");
		Ok(())
	}
}

/// Creates `Prices` referencing `Goods` without naming the principal columns
pub struct AddPrices;

impl Migration for AddPrices {
	fn id(&self) -> &str {
		"1.2.2010_AddPrices"
	}

	fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.create_table(
			"Prices",
			vec![
				ColumnDefinition::new("GoodId", "int").not_null(),
				ColumnDefinition::new("GoodVersionId", "int").not_null(),
				ColumnDefinition::new("Value", "decimal(18, 2)").not_null(),
				ColumnDefinition::new("VersionId", "int").not_null(),
				ColumnDefinition::new("DeleteInVersionId", "int"),
			],
		)
		.foreign_key(&["GoodId", "GoodVersionId"], "Goods", true);
		m.add_change_set_table("Prices", "Versions", &["GoodId"]);
		Ok(())
	}

	fn down(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.drop_table("Prices");
		m.remove_change_set_table("Prices");
		Ok(())
	}
}

/// Maintenance script that leaves no history row
pub struct RefreshStatistics;

impl Migration for RefreshStatistics {
	fn id(&self) -> &str {
		"1.3.3000_RefreshStatistics"
	}

	fn up(&self, m: &mut MigrationBuilder) -> Result<()> {
		m.sql_without_transaction("UPDATE STATISTICS dbo.Goods");
		Ok(())
	}

	fn affects_history(&self) -> bool {
		false
	}
}

pub fn catalog() -> MigrationCatalog {
	MigrationCatalog::new(vec![Box::new(AddExcise), Box::new(Init)]).unwrap()
}

/// In-memory engine wiring, with handles kept for assertions
pub struct Harness {
	pub executor: Arc<InMemoryExecutor>,
	pub history: Arc<InMemoryHistoryStore>,
	pub engine: MigrationEngine,
}

impl Harness {
	pub fn new(catalog: MigrationCatalog) -> Self {
		Self::with_executor(catalog, InMemoryExecutor::new())
	}

	pub fn with_executor(catalog: MigrationCatalog, executor: InMemoryExecutor) -> Self {
		let executor = Arc::new(executor);
		let history = Arc::new(InMemoryHistoryStore::new(CONTEXT_KEY));
		let engine = MigrationEngine::new(catalog, executor.clone(), history.clone());
		Self {
			executor,
			history,
			engine,
		}
	}

	pub fn map_engine(mut self, f: impl FnOnce(MigrationEngine) -> MigrationEngine) -> Self {
		self.engine = f(self.engine);
		self
	}

	pub fn recorded_ids(&self) -> Vec<String> {
		let mut ids: Vec<String> = self
			.history
			.records()
			.into_iter()
			.map(|r| r.migration_id)
			.collect();
		ids.sort();
		ids
	}
}

#[fixture]
pub fn harness() -> Harness {
	Harness::new(catalog())
}

/// A tracing layer that captures log lines as `[LEVEL] message field=value`
pub struct LogCapture {
	pub logs: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogCapture {
	fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
		struct MessageVisitor {
			message: String,
			fields: Vec<String>,
		}

		impl tracing::field::Visit for MessageVisitor {
			fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
				if field.name() == "message" {
					self.message = format!("{:?}", value);
				} else {
					self.fields.push(format!("{}={:?}", field.name(), value));
				}
			}

			fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
				if field.name() == "message" {
					self.message = value.to_string();
				} else {
					self.fields.push(format!("{}={}", field.name(), value));
				}
			}
		}

		let mut visitor = MessageVisitor {
			message: String::new(),
			fields: Vec::new(),
		};
		event.record(&mut visitor);

		let mut logs = self.logs.lock().unwrap();
		logs.push(format!(
			"[{}] {} {}",
			event.metadata().level(),
			visitor.message,
			visitor.fields.join(" ")
		));
	}
}
