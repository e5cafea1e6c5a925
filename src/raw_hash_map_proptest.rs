#![cfg(test)]

// Property tests for RawHashMap kept inside the crate so they can force
// capability bundles (constant digest) without public test hooks.

use crate::capability::Capabilities;
use crate::raw_hash_map::{MapError, RawHashMap};
use proptest::prelude::*;
use std::collections::HashMap;

const KEY_LEN: usize = 4;
const VALUE_LEN: usize = 4;

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// keys, pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Assign(usize, u32),
    AssignNil(u32),
    Remove(usize),
    RemoveNil,
    Query(usize),
    QueryNil,
    Contains(usize),
    ContainsValue(u32),
    Reserve(u8),
    Clear,
    Iterate,
}

fn key_from(pool: &[u32], i: usize) -> [u8; KEY_LEN] {
    pool[i].to_le_bytes()
}

fn value_bytes(v: u32) -> [u8; VALUE_LEN] {
    v.to_le_bytes()
}

fn arb_scenario() -> impl Strategy<Value = (Vec<u32>, Vec<Op>)> {
    proptest::collection::vec(any::<u32>(), 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let small_val = 0u32..16; // few distinct values so ContainsValue sees duplicates
        let op = prop_oneof![
            4 => (idx.clone(), small_val.clone()).prop_map(|(i, v)| Op::Assign(i, v)),
            1 => small_val.clone().prop_map(Op::AssignNil),
            2 => idx.clone().prop_map(Op::Remove),
            1 => Just(Op::RemoveNil),
            2 => idx.clone().prop_map(Op::Query),
            1 => Just(Op::QueryNil),
            1 => idx.clone().prop_map(Op::Contains),
            1 => small_val.prop_map(Op::ContainsValue),
            1 => any::<u8>().prop_map(Op::Reserve),
            1 => Just(Op::Clear),
            1 => Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Key type of the reference model: None is the no-key slot.
type Model = HashMap<Option<[u8; KEY_LEN]>, [u8; VALUE_LEN]>;

fn run_scenario(
    mut sut: RawHashMap,
    pool: &[u32],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: Model = HashMap::new();

    for op in ops {
        match op {
            Op::Assign(i, v) => {
                let k = key_from(pool, i);
                sut.assign(Some(&k), &value_bytes(v)).expect("assign");
                model.insert(Some(k), value_bytes(v));
            }
            Op::AssignNil(v) => {
                sut.assign(None, &value_bytes(v)).expect("assign nil");
                model.insert(None, value_bytes(v));
            }
            Op::Remove(i) => {
                let k = key_from(pool, i);
                match (sut.remove(Some(&k)), model.remove(&Some(k))) {
                    (Ok(got), Some(want)) => prop_assert_eq!(&got[..], &want[..]),
                    (Err(MapError::NotFound), None) => {}
                    (got, want) => {
                        return Err(TestCaseError::fail(format!(
                            "remove mismatch: sut {:?}, model {:?}",
                            got, want
                        )))
                    }
                }
            }
            Op::RemoveNil => {
                match (sut.remove(None), model.remove(&None)) {
                    (Ok(got), Some(want)) => prop_assert_eq!(&got[..], &want[..]),
                    (Err(MapError::NotFound), None) => {}
                    (got, want) => {
                        return Err(TestCaseError::fail(format!(
                            "remove(nil) mismatch: sut {:?}, model {:?}",
                            got, want
                        )))
                    }
                }
            }
            Op::Query(i) => {
                let k = key_from(pool, i);
                match (sut.query(Some(&k)), model.get(&Some(k))) {
                    (Ok(got), Some(want)) => prop_assert_eq!(got, &want[..]),
                    (Err(MapError::NotFound), None) => {}
                    (got, want) => {
                        return Err(TestCaseError::fail(format!(
                            "query mismatch: sut {:?}, model {:?}",
                            got, want
                        )))
                    }
                }
            }
            Op::QueryNil => {
                prop_assert_eq!(sut.query(None).ok(), model.get(&None).map(|v| &v[..]));
            }
            Op::Contains(i) => {
                let k = key_from(pool, i);
                prop_assert_eq!(sut.contains_key(Some(&k)), model.contains_key(&Some(k)));
            }
            Op::ContainsValue(v) => {
                let vb = value_bytes(v);
                let want = model.values().filter(|mv| **mv == vb).count();
                prop_assert_eq!(sut.contains_value(&vb), want);
            }
            Op::Reserve(extra) => {
                let before = sut.capacity();
                let target = before + usize::from(extra);
                let res = sut.reserve(target);
                if target <= before {
                    prop_assert_eq!(res, Err(MapError::InvalidOperation));
                    prop_assert_eq!(sut.capacity(), before);
                } else {
                    prop_assert_eq!(res, Ok(()));
                    prop_assert_eq!(sut.capacity(), target.next_power_of_two());
                }
            }
            Op::Clear => {
                let cap = sut.capacity();
                sut.clear();
                model.clear();
                prop_assert_eq!(sut.capacity(), cap);
            }
            Op::Iterate => {
                let mut seen: Vec<(Option<Vec<u8>>, Vec<u8>)> = sut
                    .iter()
                    .map(|(k, v)| (k.map(<[u8]>::to_vec), v.to_vec()))
                    .collect();
                seen.sort();
                let mut want: Vec<(Option<Vec<u8>>, Vec<u8>)> = model
                    .iter()
                    .map(|(k, v)| (k.map(|k| k.to_vec()), v.to_vec()))
                    .collect();
                want.sort();
                prop_assert_eq!(seen, want);
            }
        }

        // Post-conditions after each op
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(sut.capacity().is_power_of_two());
        prop_assert!(sut.capacity() >= 8);
        prop_assert!(sut.load() <= 0.75);
    }
    Ok(())
}

// Property: state-machine equivalence against std's HashMap across random
// operation sequences, under the default digest. Exercises growth timing,
// the no-key slot, value counting, reserve, clear, and iteration parity.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let sut = RawHashMap::new(8, KEY_LEN, VALUE_LEN).expect("init");
        run_scenario(sut, &pool, ops)?;
    }
}

// Property: the same invariants under a constant digest, forcing every
// entry into one chain: worst-case collision probing, prepends, and
// trailing-pointer unlinks all on bucket 0.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let caps = Capabilities::new().with_digest(|_| 0);
        let sut = RawHashMap::with_capabilities(8, KEY_LEN, VALUE_LEN, caps).expect("init");
        run_scenario(sut, &pool, ops)?;
    }
}

// Property: a rehash (forced via reserve) never loses, duplicates, or
// corrupts a pair, whatever the key set.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_reserve_preserves_pairs(keys in proptest::collection::btree_set(any::<u32>(), 0..64)) {
        let mut m = RawHashMap::new(8, KEY_LEN, VALUE_LEN).expect("init");
        for &k in &keys {
            m.assign(Some(&k.to_le_bytes()), &k.wrapping_mul(3).to_le_bytes()).expect("assign");
        }
        let target = m.capacity() * 4;
        m.reserve(target).expect("reserve");
        prop_assert_eq!(m.capacity(), target); // target already a power of two
        prop_assert_eq!(m.len(), keys.len());
        for &k in &keys {
            prop_assert_eq!(m.query(Some(&k.to_le_bytes())).expect("present"), &k.wrapping_mul(3).to_le_bytes()[..]);
        }
    }
}
