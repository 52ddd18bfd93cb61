//! Merges configuration sources by priority

use super::sources::{ConfigSource, SourceError};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Collects sources and merges them, higher priority last
///
/// # Examples
///
/// ```
/// use serde_json::Value;
/// use strata_conf::{DefaultSource, SettingsBuilder};
///
/// let merged = SettingsBuilder::new()
///     .add_source(DefaultSource::new().with_value("seed", Value::Bool(false)))
///     .build()
///     .unwrap();
/// assert_eq!(merged.get("seed"), Some(&Value::Bool(false)));
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl SettingsBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_source(mut self, source: impl ConfigSource + 'static) -> Self {
		self.sources.push(Box::new(source));
		self
	}

	/// Merged key/value map; on equal priority the later source wins
	pub fn build(mut self) -> Result<IndexMap<String, Value>, SourceError> {
		self.sources.sort_by_key(|source| source.priority());

		let mut merged = IndexMap::new();
		for source in &self.sources {
			let values = source.load()?;
			tracing::debug!(
				source = %source.description(),
				keys = values.len(),
				"Loaded configuration source"
			);
			merged.extend(values);
		}
		Ok(merged)
	}

	/// Merge and deserialize into `T`
	pub fn build_into<T: DeserializeOwned>(self) -> Result<T, SourceError> {
		let merged = self.build()?;
		let object: serde_json::Map<String, Value> = merged.into_iter().collect();
		Ok(serde_json::from_value(Value::Object(object))?)
	}
}

impl std::fmt::Debug for SettingsBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let sources: Vec<String> = self.sources.iter().map(|s| s.description()).collect();
		f.debug_struct("SettingsBuilder")
			.field("sources", &sources)
			.finish()
	}
}
