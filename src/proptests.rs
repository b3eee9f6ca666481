use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

fn validate_map<V>(t: &SortedSparseMap<V>) {
    assert_eq!(
        t.keys.len(),
        t.values.len(),
        "backing arrays must stay aligned"
    );
    assert!(t.size <= t.keys.len(), "size past capacity");

    for (i, pair) in t.keys[..t.size].windows(2).enumerate() {
        assert!(
            pair[0] < pair[1],
            "keys must be strictly ascending (idx={i}): {} >= {}",
            pair[0],
            pair[1]
        );
    }

    let mut live = 0usize;
    let mut tombstones = 0usize;
    for slot in &t.values[..t.size] {
        match slot {
            Slot::Occupied(_) => live += 1,
            Slot::Tombstone => tombstones += 1,
            Slot::Empty => panic!("empty slot below size"),
        }
    }
    assert_eq!(live, t.live, "live counter must match occupied slots");
    if tombstones > 0 {
        assert!(t.has_tombstones, "tombstones present but map marked clean");
    }
    assert!(
        t.values[t.size..].iter().all(|slot| matches!(slot, Slot::Empty)),
        "slots past size must be released"
    );
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 30)]
    Put(#[proptest(strategy = "-64i64..64")] i64, u32),
    #[proptest(weight = 10)]
    Append(#[proptest(strategy = "-64i64..128")] i64, u32),
    #[proptest(weight = 20)]
    Remove(#[proptest(strategy = "-64i64..64")] i64),
    #[proptest(weight = 5)]
    RemoveAt(usize),
    #[proptest(weight = 15)]
    Get(#[proptest(strategy = "-64i64..64")] i64),
    #[proptest(weight = 5)]
    KeyAt(usize),
    #[proptest(weight = 5)]
    IndexOfKey(#[proptest(strategy = "-64i64..64")] i64),
    #[proptest(weight = 3)]
    SetValueAt(usize, u32),
    #[proptest(weight = 3)]
    Size,
    #[proptest(weight = 1)]
    Clear,
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=1000)) {
        let mut t: SortedSparseMap<u32> = SortedSparseMap::new();
        let mut m: BTreeMap<i64, u32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    let had_slot = search(&t.keys, t.size, key).is_ok();
                    let outcome = t.put(key, value);
                    let old = m.insert(key, value);
                    prop_assert_eq!(outcome.is_inserted(), !had_slot);
                    if outcome.is_inserted() {
                        prop_assert_eq!(old, None);
                    }
                }
                Op::Append(key, value) => {
                    t.append(key, value);
                    m.insert(key, value);
                }
                Op::Remove(key) => {
                    prop_assert_eq!(t.remove(key), m.remove(&key));
                }
                Op::RemoveAt(raw) => {
                    // Raw slot positions, as left by the last compaction.
                    if t.size > 0 {
                        let index = raw % t.size;
                        let key = t.keys[index];
                        prop_assert_eq!(t.remove_at(index), m.remove(&key));
                    }
                }
                Op::Get(key) => {
                    prop_assert_eq!(t.get(key).copied(), m.get(&key).copied());
                }
                Op::KeyAt(raw) => {
                    if !m.is_empty() {
                        let index = raw % m.len();
                        let expected = m.iter().nth(index).map(|(k, v)| (*k, *v));
                        prop_assert_eq!(Some((t.key_at(index), *t.value_at(index))), expected);
                    }
                }
                Op::IndexOfKey(key) => {
                    let expected = match m.range(..=key).next_back() {
                        Some((&k, _)) if k == key => Ok(m.range(..key).count()),
                        _ => Err(m.range(..key).count()),
                    };
                    prop_assert_eq!(t.index_of_key(key), expected);
                }
                Op::SetValueAt(raw, value) => {
                    if !m.is_empty() {
                        let index = raw % m.len();
                        t.set_value_at(index, value);
                        if let Some(slot) = m.values_mut().nth(index) {
                            *slot = value;
                        }
                    }
                }
                Op::Size => {
                    prop_assert_eq!(t.size(), m.len());
                    prop_assert!(!t.has_tombstones());
                }
                Op::Clear => {
                    t.clear();
                    m.clear();
                }
            }

            prop_assert_eq!(t.len(), m.len());
            validate_map(&t);
        }

        let got: Vec<(i64, u32)> = t.iter().map(|(k, v)| (k, *v)).collect();
        let expected: Vec<(i64, u32)> = m.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(got, expected);

        let ascending: Vec<i64> = t.iterate_keys().collect();
        prop_assert_eq!(ascending, m.keys().copied().collect::<Vec<_>>());
    }

    #[test]
    fn prop_append_matches_put(
        keys in prop::collection::btree_set(any::<i64>(), 0..300),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..50),
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let mut appended: SortedSparseMap<i64> = SortedSparseMap::new();
        let mut put: SortedSparseMap<i64> = SortedSparseMap::new();

        for &key in &keys {
            appended.append(key, key.wrapping_mul(3));
            put.put(key, key.wrapping_mul(3));
        }

        prop_assert_eq!(&appended.keys, &put.keys);
        prop_assert_eq!(&appended.values, &put.values);
        prop_assert_eq!(appended.size, put.size);

        if !keys.is_empty() {
            for index in removals {
                let key = *index.get(&keys);
                prop_assert_eq!(appended.remove(key), put.remove(key));
            }
        }
        validate_map(&appended);
        prop_assert_eq!(appended.size(), put.size());
    }

    #[test]
    fn prop_compaction_is_transparent(
        keys in prop::collection::btree_set(-1000i64..1000, 1..200),
        remove_mask in prop::collection::vec(any::<bool>(), 200),
    ) {
        let mut t: SortedSparseMap<i64> = keys.iter().map(|&k| (k, -k)).collect();
        for (key, remove) in keys.iter().zip(&remove_mask) {
            if *remove {
                t.remove(*key);
            }
        }

        // Lookups and borrowing iteration before any compaction.
        let before: Vec<(i64, i64)> = t.iter().map(|(k, v)| (k, *v)).collect();
        for &(key, value) in &before {
            prop_assert_eq!(t.get(key), Some(&value));
        }

        let size = t.size();
        prop_assert_eq!(size, before.len());
        for (i, &(key, value)) in before.iter().enumerate() {
            prop_assert_eq!(t.key_at(i), key);
            prop_assert_eq!(*t.value_at(i), value);
            prop_assert_eq!(t.index_of_key(key), Ok(i));
        }
        validate_map(&t);
    }
}

#[test]
fn exhaustive_remove_order_small_set() {
    fn for_each_permutation(items: &[i64], f: &mut impl FnMut(&[i64])) {
        fn rec(items: &[i64], used: &mut [bool], out: &mut Vec<i64>, f: &mut impl FnMut(&[i64])) {
            if out.len() == items.len() {
                f(out);
                return;
            }
            for i in 0..items.len() {
                if used[i] {
                    continue;
                }
                used[i] = true;
                out.push(items[i]);
                rec(items, used, out, f);
                out.pop();
                used[i] = false;
            }
        }
        let mut used = vec![false; items.len()];
        let mut out = Vec::with_capacity(items.len());
        rec(items, &mut used, &mut out, f);
    }

    let keys = [-3i64, 0, 1, 7, 42, 1000];
    let base: SortedSparseMap<i64> = keys.iter().map(|&k| (k, k * 2)).collect();

    for_each_permutation(&keys, &mut |perm: &[i64]| {
        let mut t = base.clone();
        let mut m: BTreeMap<i64, i64> = keys.iter().map(|&k| (k, k * 2)).collect();

        for (n, &k) in perm.iter().enumerate() {
            assert_eq!(t.remove(k), m.remove(&k));
            assert_eq!(t.len(), m.len());
            validate_map(&t);
            if n % 2 == 1 {
                assert_eq!(t.size(), m.len());
                validate_map(&t);
            }
        }
        assert_eq!(t.size(), 0);
        assert!(!t.has_tombstones());
    });
}
