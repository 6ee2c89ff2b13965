//! Cursor traversal over both the main tree and a secondary index
//! (`spec.md` §4.6), exercised end to end through the public API rather
//! than `src/cursor.rs`'s own unit tests.

mod common;

use ixtree::FLAG_UNIQUE;

#[test]
fn main_tree_cursor_seeks_and_walks_both_directions() {
    let (_dir, db) = common::open_db();
    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "tree").unwrap();

    for i in 0..10u32 {
        let key = format!("k{i:02}");
        tree.insert(&mut txn, key.as_bytes(), b"v").unwrap();
    }

    let mut cursor = tree.cursor();
    assert!(cursor.first(&txn).unwrap());
    assert_eq!(cursor.key(), Some(b"k00".as_slice()));

    assert!(cursor.seek(&txn, b"k05").unwrap());
    assert_eq!(cursor.key(), Some(b"k05".as_slice()));

    assert!(cursor.next(&txn).unwrap());
    assert_eq!(cursor.key(), Some(b"k06".as_slice()));

    assert!(cursor.prev(&txn).unwrap());
    assert!(cursor.prev(&txn).unwrap());
    assert_eq!(cursor.key(), Some(b"k04".as_slice()));

    assert!(cursor.last(&txn).unwrap());
    assert_eq!(cursor.key(), Some(b"k09".as_slice()));
    assert!(!cursor.next(&txn).unwrap());

    assert!(cursor.seek_range(&txn, b"k04a").unwrap());
    assert_eq!(cursor.key(), Some(b"k05".as_slice()));
}

#[test]
fn cursor_delete_current_removes_the_row_and_its_index_entry() {
    let (_dir, db) = common::open_db();
    db.register_extractor(1, FLAG_UNIQUE, common::field_extractor("email")).unwrap();

    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "people").unwrap();
    tree.add_index(&mut txn, db.registry(), common::unique_index("email", 1)).unwrap();

    tree.insert(&mut txn, b"u1", b"email=a@x").unwrap();
    tree.insert(&mut txn, b"u2", b"email=b@x").unwrap();

    let mut cursor = tree.cursor();
    assert!(cursor.seek(&txn, b"u1").unwrap());
    cursor.delete_current(&mut txn).unwrap();

    assert!(!tree.exists(&txn, b"u1").unwrap());
    assert_eq!(tree.count(&txn).unwrap(), 1);

    // deleting a non-last entry repositions the cursor onto the next one
    assert!(cursor.valid());
    assert_eq!(cursor.key(), Some(b"u2".as_slice()));

    cursor.delete_current(&mut txn).unwrap();
    // that was the last entry left, so the cursor is now invalid
    assert!(!cursor.valid());

    let mut email_cursor = tree.index_cursor("email").unwrap();
    assert!(email_cursor.first(&txn).unwrap());
    assert_eq!(email_cursor.index_iterator_main_key(), Some(b"u2".to_vec()));
    assert!(!email_cursor.next(&txn).unwrap());
}

#[test]
fn index_cursor_seek_range_lands_on_the_next_key_in_order() {
    let (_dir, db) = common::open_db();
    db.register_extractor(1, FLAG_UNIQUE, common::field_extractor("email")).unwrap();

    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "people").unwrap();
    tree.add_index(&mut txn, db.registry(), common::unique_index("email", 1)).unwrap();

    tree.insert(&mut txn, b"u1", b"email=a@x").unwrap();
    tree.insert(&mut txn, b"u2", b"email=c@x").unwrap();

    let mut cursor = tree.index_cursor("email").unwrap();
    assert!(cursor.index_seek_range(&txn, b"b@x").unwrap());
    assert_eq!(cursor.key(), Some(b"c@x".as_slice()));
    assert_eq!(cursor.index_iterator_main_key(), Some(b"u2".to_vec()));
}
