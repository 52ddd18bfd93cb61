//! Migration identifier ordering
//!
//! Identifiers look like `1.7.2202_MessageUnread`: a dotted numeric version,
//! then an underscore and a name. Versions compare numerically segment by
//! segment, so `1.2.3_X` sorts before `1.10.0_Y`.

use super::{MigrationError, Result};
use std::cmp::Ordering;

/// Total order over migration identifiers
///
/// # Examples
///
/// ```
/// use strata_migrations::VersionComparer;
/// use std::cmp::Ordering;
///
/// let ordering = VersionComparer::compare("1.2.3_X", "1.10.0_Y").unwrap();
/// assert_eq!(ordering, Ordering::Less);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionComparer;

impl VersionComparer {
	/// Compare two identifiers
	///
	/// Shared dotted segments compare as integers. When every shared segment is
	/// equal the shorter version sorts first. Equal versions fall back to an
	/// ordinal, case-insensitive comparison of the `_Name` suffix.
	pub fn compare(a: &str, b: &str) -> Result<Ordering> {
		let (version_a, suffix_a) = split_identifier(a);
		let (version_b, suffix_b) = split_identifier(b);

		let segments_a = parse_segments(version_a)?;
		let segments_b = parse_segments(version_b)?;

		for (index, segment) in segments_a.iter().enumerate() {
			let Some(other) = segments_b.get(index) else {
				return Ok(Ordering::Greater);
			};
			match segment.cmp(other) {
				Ordering::Equal => continue,
				unequal => return Ok(unequal),
			}
		}

		if segments_a.len() < segments_b.len() {
			return Ok(Ordering::Less);
		}

		Ok(suffix_a.to_lowercase().cmp(&suffix_b.to_lowercase()))
	}

	/// Compare after lowercasing both identifiers
	pub fn compare_lowercase(a: &str, b: &str) -> Result<Ordering> {
		Self::compare(&a.to_lowercase(), &b.to_lowercase())
	}

	/// Sort identifiers ascending
	///
	/// Every identifier is validated before sorting, so a malformed id fails the
	/// whole call instead of leaving the slice half sorted.
	pub fn sort_ids(ids: &mut [String]) -> Result<()> {
		for id in ids.iter() {
			parse_segments(split_identifier(id).0)?;
		}
		ids.sort_by(|a, b| {
			Self::compare_lowercase(a, b).unwrap_or_else(|_| a.to_lowercase().cmp(&b.to_lowercase()))
		});
		Ok(())
	}

	/// Sort identifiers descending
	pub fn sort_ids_descending(ids: &mut [String]) -> Result<()> {
		Self::sort_ids(ids)?;
		ids.reverse();
		Ok(())
	}
}

/// Split `1.1.1410_InitTable` into `("1.1.1410", "_InitTable")`
///
/// The suffix keeps its leading underscore; an identifier without one has an
/// empty suffix.
pub(crate) fn split_identifier(id: &str) -> (&str, &str) {
	match id.find('_') {
		Some(position) => id.split_at(position),
		None => (id, ""),
	}
}

fn parse_segments(version: &str) -> Result<Vec<i64>> {
	version
		.split('.')
		.map(|segment| {
			segment
				.trim()
				.parse::<i64>()
				.map_err(|_| MigrationError::InvalidVersionFormat(version.to_string()))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rstest::rstest;

	#[rstest]
	#[case("1.2.3_X", "1.10.0_Y", Ordering::Less)]
	#[case("1.10.0_Y", "1.2.3_X", Ordering::Greater)]
	#[case("1.1.1000_Init", "1.2.2000_AddExcise", Ordering::Less)]
	#[case("1.1_A", "1.1.0_A", Ordering::Less)]
	#[case("1.1.0_A", "1.1_A", Ordering::Greater)]
	#[case("1.1.1_Alpha", "1.1.1_beta", Ordering::Less)]
	#[case("1.1.1_Init", "1.1.1_init", Ordering::Equal)]
	#[case("2.0.0", "2.0.0_Named", Ordering::Less)]
	fn test_compare(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
		assert_eq!(VersionComparer::compare(a, b).unwrap(), expected);
	}

	#[rstest]
	#[case("1.x.3_Broken", "1.0.0_Fine")]
	#[case("1.0.0_Fine", "abc_Broken")]
	fn test_compare_rejects_non_numeric_segments(#[case] a: &str, #[case] b: &str) {
		let err = VersionComparer::compare(a, b).unwrap_err();
		assert!(matches!(err, MigrationError::InvalidVersionFormat(_)));
	}

	#[test]
	fn test_sort_ids_orders_numerically() {
		let mut ids = vec![
			"1.10.0_Later".to_string(),
			"1.2.3_Early".to_string(),
			"1.2.10_Middle".to_string(),
		];

		VersionComparer::sort_ids(&mut ids).unwrap();

		assert_eq!(ids, vec!["1.2.3_Early", "1.2.10_Middle", "1.10.0_Later"]);
	}

	#[test]
	fn test_sort_ids_fails_before_touching_the_slice() {
		let mut ids = vec!["1.2.0_B".to_string(), "bad_A".to_string()];

		let result = VersionComparer::sort_ids(&mut ids);

		assert!(result.is_err());
		assert_eq!(ids, vec!["1.2.0_B", "bad_A"]);
	}

	#[test]
	fn test_split_identifier_keeps_underscore() {
		assert_eq!(split_identifier("1.1.1410_InitTable"), ("1.1.1410", "_InitTable"));
		assert_eq!(split_identifier("1.1"), ("1.1", ""));
	}

	fn identifier() -> impl Strategy<Value = String> {
		(
			proptest::collection::vec(0u16..50, 1..4),
			"[A-Za-z]{1,6}",
		)
			.prop_map(|(segments, name)| {
				let version: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
				format!("{}_{}", version.join("."), name)
			})
	}

	proptest! {
		#[test]
		fn prop_sort_is_idempotent(mut ids in proptest::collection::vec(identifier(), 0..20)) {
			VersionComparer::sort_ids(&mut ids).unwrap();
			let once = ids.clone();
			VersionComparer::sort_ids(&mut ids).unwrap();
			prop_assert_eq!(once, ids);
		}

		#[test]
		fn prop_compare_is_antisymmetric(a in identifier(), b in identifier()) {
			let forward = VersionComparer::compare(&a, &b).unwrap();
			let backward = VersionComparer::compare(&b, &a).unwrap();
			prop_assert_eq!(forward, backward.reverse());
		}

		#[test]
		fn prop_compare_is_transitive(a in identifier(), b in identifier(), c in identifier()) {
			let ab = VersionComparer::compare(&a, &b).unwrap();
			let bc = VersionComparer::compare(&b, &c).unwrap();
			if ab != Ordering::Greater && bc != Ordering::Greater {
				prop_assert_ne!(VersionComparer::compare(&a, &c).unwrap(), Ordering::Greater);
			}
		}
	}
}
