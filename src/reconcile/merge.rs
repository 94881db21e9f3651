use std::hash::Hash;

use indexmap::map::Entry;
use indexmap::IndexMap;

/// Field-level overwrite: every field present in `later` replaces the same
/// field of `self`; fields absent from `later` are left untouched.
pub trait Overlay {
    fn overlay(&mut self, later: Self);
}

/// Merge two record lists by key.
///
/// Records are visited in the order of `first` followed by `second`. The first
/// record seen for a key fixes its output position; later records with the same
/// key are overlaid onto it. Records whose key is `None` pass through unmerged
/// at their position. Every key present in either input appears exactly once.
pub fn merge_by_key<T, K, F>(first: Vec<T>, second: Vec<T>, key: F) -> Vec<T>
where
    T: Overlay,
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut merged: IndexMap<Slot<K>, T> = IndexMap::with_capacity(first.len() + second.len());
    let mut keyless = 0usize;
    for item in first.into_iter().chain(second) {
        let slot = match key(&item) {
            Some(k) => Slot::Key(k),
            None => {
                keyless += 1;
                Slot::Keyless(keyless)
            }
        };
        match merged.entry(slot) {
            Entry::Occupied(mut e) => e.get_mut().overlay(item),
            Entry::Vacant(e) => {
                e.insert(item);
            }
        }
    }
    merged.into_values().collect()
}

#[derive(PartialEq, Eq, Hash)]
enum Slot<K> {
    Key(K),
    Keyless(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Row {
        id: Option<u32>,
        a: Option<&'static str>,
        b: Option<&'static str>,
    }

    impl Overlay for Row {
        fn overlay(&mut self, later: Self) {
            if later.id.is_some() {
                self.id = later.id;
            }
            if later.a.is_some() {
                self.a = later.a;
            }
            if later.b.is_some() {
                self.b = later.b;
            }
        }
    }

    fn row(id: Option<u32>, a: Option<&'static str>, b: Option<&'static str>) -> Row {
        Row { id, a, b }
    }

    fn keys(rows: &[Row]) -> BTreeSet<u32> {
        rows.iter().filter_map(|r| r.id).collect()
    }

    #[test]
    fn later_fields_win_and_first_seen_order_holds() {
        let a = vec![row(Some(3), Some("a3"), None), row(Some(1), Some("a1"), Some("b1"))];
        let b = vec![row(Some(1), Some("A1"), None), row(Some(2), None, Some("b2"))];
        let merged = merge_by_key(a, b, |r| r.id);
        assert_eq!(
            merged,
            vec![
                row(Some(3), Some("a3"), None),
                row(Some(1), Some("A1"), Some("b1")),
                row(Some(2), None, Some("b2")),
            ]
        );
    }

    #[test]
    fn key_coverage_is_the_union() {
        let a = vec![row(Some(1), None, None), row(Some(5), None, None), row(Some(9), None, None)];
        let b = vec![row(Some(5), None, None), row(Some(7), None, None)];
        let expected: BTreeSet<u32> = keys(&a).union(&keys(&b)).copied().collect();
        let merged = merge_by_key(a, b, |r| r.id);
        assert_eq!(keys(&merged), expected);
        assert_eq!(merged.len(), expected.len());
    }

    #[test]
    fn merging_with_nothing_is_identity_on_merged_output() {
        let a = vec![row(Some(1), Some("x"), None), row(Some(2), None, None)];
        let b = vec![row(Some(2), Some("y"), Some("z")), row(Some(1), None, Some("w"))];
        let once = merge_by_key(a, b, |r| r.id);
        let twice = merge_by_key(once.clone(), Vec::new(), |r| r.id);
        assert_eq!(once, twice);
    }

    #[test]
    fn keyless_records_pass_through() {
        let a = vec![row(None, Some("orphan"), None), row(Some(1), None, None)];
        let b = vec![row(None, Some("orphan2"), None)];
        let merged = merge_by_key(a, b, |r| r.id);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].a, Some("orphan"));
        assert_eq!(merged[2].a, Some("orphan2"));
    }
}
