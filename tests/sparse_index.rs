//! Scenario 3 (`spec.md` §8): a sparse index silently skips values whose
//! extractor returns absent, while still indexing the values it can.

mod common;

use ixtree::FLAG_SPARSE;

#[test]
fn sparse_index_skips_absent_values() {
    let (_dir, db) = common::open_db();
    db.register_extractor(1, FLAG_SPARSE, common::field_extractor("cat")).unwrap();

    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "products").unwrap();
    tree.add_index(&mut txn, db.registry(), common::sparse_index("cat", 1)).unwrap();

    tree.insert(&mut txn, b"p1", b"cat=X").unwrap();
    tree.insert(&mut txn, b"p2", b"name=nothing-here").unwrap();

    assert_eq!(tree.count(&txn).unwrap(), 2);

    let mut cursor = tree.index_cursor("cat").unwrap();
    assert!(cursor.index_seek(&txn, b"X").unwrap());
    assert_eq!(cursor.index_iterator_main_key(), Some(b"p1".to_vec()));

    assert!(cursor.first(&txn).unwrap());
    assert!(!cursor.next(&txn).unwrap(), "sparse index must contain exactly one entry");
}
