//! Caller-assigned identities and the instanced `base/index` scheme.
//!
//! # Why this exists
//! Nothing that lives inside the worker can be referenced from the caller side, so every
//! body, constraint, spring, ray, vehicle and contact material is addressed by a string the
//! caller chose. Instanced collections share one base identity and differ only by index.
//!
//! # Format
//! - plain identity: any string that does not end in `/<digits>`
//! - instance identity: `<base>/<index>` where `index` is a decimal `usize`
//!
//! # Invariants
//! - `split_instance_id(&instance_id(b, i)) == (b, Some(i))` for every base `b`.
//! - A plain identity splits to `(id, None)`.
//!
//! Treat the format as a wire format: both sides of the boundary parse it.

use crate::constants::INSTANCE_SEPARATOR;

/// Builds the identity of instance `index` of the collection `base`.
pub fn instance_id(base: &str, index: usize) -> String {
    format!("{base}{INSTANCE_SEPARATOR}{index}")
}

/// Builds the identities `base/0 .. base/(count - 1)` in order.
pub fn instance_ids(base: &str, count: usize) -> Vec<String> {
    (0..count).map(|index| instance_id(base, index)).collect()
}

/// Splits an identity into its base and, when present, its instance index.
///
/// Only the last separator counts, so bases may themselves contain `/`.
pub fn split_instance_id(id: &str) -> (&str, Option<usize>) {
    match id.rsplit_once(INSTANCE_SEPARATOR) {
        Some((base, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
            match index.parse() {
                Ok(index) => (base, Some(index)),
                Err(_) => (id, None),
            }
        }
        _ => (id, None),
    }
}

/// Base identity of `id` (the identity itself when it is not an instance).
pub fn base_id(id: &str) -> &str {
    split_instance_id(id).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_split_back_into_base_and_index() {
        for base in ["cubes", "level/1/crates", ""] {
            for index in [0usize, 1, 42, usize::MAX] {
                let id = instance_id(base, index);
                assert_eq!(split_instance_id(&id), (base, Some(index)));
                assert_eq!(base_id(&id), base);
            }
        }
    }

    #[test]
    fn plain_identities_have_no_index() {
        assert_eq!(split_instance_id("chassis"), ("chassis", None));
        assert_eq!(split_instance_id("wheel/left"), ("wheel/left", None));
        assert_eq!(split_instance_id("trailing/"), ("trailing/", None));
        assert_eq!(split_instance_id("signed/-1"), ("signed/-1", None));
    }

    #[test]
    fn index_overflow_is_treated_as_plain() {
        let id = "big/999999999999999999999999999999";
        assert_eq!(split_instance_id(id), (id, None));
    }

    #[test]
    fn instance_ids_are_ordered() {
        assert_eq!(instance_ids("b", 3), vec!["b/0", "b/1", "b/2"]);
        assert!(instance_ids("b", 0).is_empty());
    }
}
