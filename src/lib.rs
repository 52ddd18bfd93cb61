//! # Strata
//!
//! Versioned database migrations with history tracking and a generated
//! change-set reporting view.
//!
//! This crate re-exports the workspace members behind feature flags:
//!
//! - `migrations` (default): the migration engine, catalog, history store,
//!   checker and manager from [`strata_migrations`]
//! - `conf` (default): layered migrator settings from [`strata_conf`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata::conf::MigratorSettings;
//! use strata::migrations::{ManagerAction, MigrationCatalog, MigrationManager, MigrationSelector};
//!
//! # async fn run(catalog: MigrationCatalog) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = MigratorSettings::load("strata.toml")?;
//! let manager = MigrationManager::connect(catalog, &settings)?;
//! let outcome = manager
//!     .run(ManagerAction::Upgrade(MigrationSelector::Latest))
//!     .await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "migrations")]
pub use strata_migrations as migrations;

#[cfg(feature = "conf")]
pub use strata_conf as conf;
