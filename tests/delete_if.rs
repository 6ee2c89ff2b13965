//! Scenario 5 (`spec.md` §8): `delete_if` over a bounded range removes
//! exactly the matching entries and leaves everything outside the range
//! untouched, with indexes still verifying clean afterward.

mod common;

use std::ops::Bound;

use ixtree::FLAG_UNIQUE;

fn age_of(value: &[u8]) -> u32 {
    let text = std::str::from_utf8(value).unwrap();
    text.split(';')
        .find_map(|pair| pair.strip_prefix("age=").map(|v| v.parse().unwrap()))
        .unwrap()
}

#[test]
fn delete_if_only_touches_matching_entries_in_range() {
    let (_dir, db) = common::open_db();
    db.register_extractor(1, FLAG_UNIQUE, common::field_extractor("email")).unwrap();

    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "people").unwrap();
    tree.add_index(&mut txn, db.registry(), common::unique_index("email", 1)).unwrap();

    for i in 1..=20u32 {
        let key = format!("k{i:02}");
        let value = format!("email={i}@x;age={}", i % 3 * 10);
        tree.insert(&mut txn, key.as_bytes(), value.as_bytes()).unwrap();
    }
    txn.commit().unwrap();

    let mut txn = db.begin(true).unwrap();
    let expected = (5..15).filter(|i| age_of(format!("email={i}@x;age={}", i % 3 * 10).as_bytes()) > 10).count() as u64;

    let removed = tree
        .delete_if(
            &mut txn,
            Bound::Included(&b"k05"[..]),
            Bound::Excluded(&b"k15"[..]),
            |_key, value| age_of(value) > 10,
        )
        .unwrap();
    assert_eq!(removed, expected);
    txn.commit().unwrap();

    let txn = db.begin(false).unwrap();
    for i in 1..=20u32 {
        let key = format!("k{i:02}");
        let in_range = (5..15).contains(&i);
        let matched = in_range && age_of(format!("email={i}@x;age={}", i % 3 * 10).as_bytes()) > 10;
        assert_eq!(tree.exists(&txn, key.as_bytes()).unwrap(), !matched, "key {key}");
    }
    tree.verify_indexes(&txn).unwrap();
}
