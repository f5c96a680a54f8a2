use std::collections::HashMap;
use std::hash::Hash;

/// Outcome of reconciling two snapshots of keyed elements. `entered` and
/// `updated` follow the order of the new snapshot, `exited` the order of the
/// old one.
pub struct Delta<'a, T> {
    pub entered: Vec<&'a T>,
    pub updated: Vec<(&'a T, &'a T)>,
    pub exited: Vec<&'a T>,
}

/// Key-based snapshot diff. Knows nothing about what the elements are or how
/// they get drawn; the same reconciliation drives nodes, groups and links.
pub fn diff<'a, T, K, F>(prev: &'a [T], next: &'a [T], key: F) -> Delta<'a, T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut remaining: HashMap<K, &T> = prev.iter().map(|item| (key(item), item)).collect();

    let mut entered = Vec::new();
    let mut updated = Vec::new();
    for item in next {
        match remaining.remove(&key(item)) {
            Some(old) => updated.push((old, item)),
            None => entered.push(item),
        }
    }

    let exited = prev
        .iter()
        .filter(|item| remaining.contains_key(&key(item)))
        .collect();

    Delta {
        entered,
        updated,
        exited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_into_enter_update_exit() {
        let prev = vec!["a", "b", "c"];
        let next = vec!["b", "d", "c"];

        let delta = diff(&prev, &next, |item| item.to_owned());
        assert_eq!(delta.entered, vec![&"d"]);
        assert_eq!(
            delta.updated.iter().map(|(_, new)| **new).collect::<Vec<_>>(),
            vec!["b", "c"],
        );
        assert_eq!(delta.exited, vec![&"a"]);
    }

    #[test]
    fn empty_snapshots_produce_empty_sets() {
        let none: Vec<&str> = Vec::new();
        let delta = diff(&none, &none, |item| item.to_owned());
        assert!(delta.entered.is_empty());
        assert!(delta.updated.is_empty());
        assert!(delta.exited.is_empty());
    }

    #[test]
    fn update_pairs_old_with_new() {
        #[derive(PartialEq, Debug)]
        struct Item(&'static str, i32);

        let prev = vec![Item("a", 1)];
        let next = vec![Item("a", 2)];
        let delta = diff(&prev, &next, |item| item.0);

        assert_eq!(delta.updated, vec![(&Item("a", 1), &Item("a", 2))]);
    }
}
