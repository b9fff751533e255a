//! Text normalization and minimized identifiers
//!
//! Field keys are long and arbitrary; hosts need short ids that stay
//! unique. [`minimize`] walks the keys as a branching trie: every id starts
//! with the key's first character, then takes one more character at each
//! position where its group of keys splits. Keys that remain identical
//! after normalization are told apart by a 1-based index.

use std::collections::{BTreeMap, HashSet};

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lowercase `text` and strip diacritics
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Shortest collision-free identifiers for `keys`, in input order
///
/// ```
/// use netlens::minimize::minimize;
///
/// assert_eq!(minimize(&["john", "marius", "maxime"]), ["j", "mr", "mx"]);
/// assert_eq!(minimize(&["cassis", "creme", "crème"]), ["ca", "cr1", "cr2"]);
/// ```
pub fn minimize<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    let normalized: Vec<Vec<char>> = keys
        .iter()
        .map(|k| normalize(k.as_ref()).chars().collect())
        .collect();
    let mut ids = vec![String::new(); keys.len()];

    let mut roots: BTreeMap<Option<char>, Vec<usize>> = BTreeMap::new();
    for (i, chars) in normalized.iter().enumerate() {
        roots.entry(chars.first().copied()).or_default().push(i);
    }
    for (first, group) in roots {
        let prefix = first.map(String::from).unwrap_or_default();
        resolve(&normalized, group, 1, prefix, &mut ids);
    }

    ensure_unique(ids)
}

/// Assign ids to `group`, whose members share `prefix` and agree before `pos`
fn resolve(normalized: &[Vec<char>], group: Vec<usize>, pos: usize, prefix: String, ids: &mut [String]) {
    if group.len() == 1 {
        ids[group[0]] = if prefix.is_empty() { "1".to_string() } else { prefix };
        return;
    }

    let first = &normalized[group[0]];
    if group.iter().all(|&i| normalized[i] == *first) {
        for (k, &i) in group.iter().enumerate() {
            ids[i] = format!("{prefix}{}", k + 1);
        }
        return;
    }

    // Skip the characters the whole group shares
    let mut pos = pos;
    while group
        .iter()
        .all(|&i| normalized[i].get(pos) == first.get(pos))
    {
        pos += 1;
    }

    let mut branches: BTreeMap<Option<char>, Vec<usize>> = BTreeMap::new();
    for &i in &group {
        branches.entry(normalized[i].get(pos).copied()).or_default().push(i);
    }
    for (c, branch) in branches {
        match c {
            Some(c) => resolve(normalized, branch, pos + 1, format!("{prefix}{c}"), ids),
            // Keys ending here are identical to each other
            None => resolve(normalized, branch, pos, prefix.clone(), ids),
        }
    }
}

/// Disambiguate the rare ids that collide across branches (e.g. `c` twice and `c1`)
fn ensure_unique(ids: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = ids.iter().cloned().collect();
    if taken.len() == ids.len() {
        return ids;
    }
    let mut seen = HashSet::new();
    ids.into_iter()
        .map(|id| {
            if seen.insert(id.clone()) {
                return id;
            }
            let mut n = 2;
            loop {
                let candidate = format!("{id}_{n}");
                if taken.insert(candidate.clone()) {
                    seen.insert(candidate.clone());
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_folds_case_and_diacritics() {
        assert_eq!(normalize("Crème Brûlée"), "creme brulee");
        assert_eq!(normalize("ÉCOLE"), "ecole");
    }

    #[test]
    fn single_letters_when_enough() {
        assert_eq!(minimize(&["john", "marius", "albert"]), ["j", "m", "a"]);
    }

    #[test]
    fn second_letter_splits_shared_initial() {
        assert_eq!(minimize(&["john", "marius", "maxime"]), ["j", "mr", "mx"]);
    }

    #[test]
    fn deeper_clusters_take_more_letters() {
        assert_eq!(
            minimize(&["maxime", "marius", "marcellus"]),
            ["mx", "mri", "mrc"]
        );
    }

    #[test]
    fn identical_normalized_keys_use_index() {
        assert_eq!(minimize(&["creme", "crème", "crémé"]), ["c1", "c2", "c3"]);
    }

    #[test]
    fn mixed_letter_and_index_resolution() {
        assert_eq!(minimize(&["cassis", "creme", "crème"]), ["ca", "cr1", "cr2"]);
    }

    #[test]
    fn prefix_keys_stay_distinct() {
        assert_eq!(minimize(&["a", "ab", "ac"]), ["a", "ab", "ac"]);
    }

    #[test]
    fn index_collisions_are_resolved() {
        let ids = minimize(&["c", "c", "c1"]);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn empty_input_and_empty_keys() {
        assert!(minimize::<&str>(&[]).is_empty());
        assert_eq!(minimize(&[""]), ["1"]);
    }

    proptest! {
        #[test]
        fn ids_are_nonempty_and_match_input_length(keys in prop::collection::vec("[a-zA-Zéèà ]{0,8}", 0..20)) {
            let ids = minimize(&keys);
            prop_assert_eq!(ids.len(), keys.len());
            prop_assert!(ids.iter().all(|id| !id.is_empty()));
        }

        #[test]
        fn ids_are_pairwise_distinct(keys in prop::collection::vec("[a-cé]{0,5}", 0..20)) {
            let ids = minimize(&keys);
            let unique: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
