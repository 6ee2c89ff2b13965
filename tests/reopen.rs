//! Scenario 6 (`spec.md` §8): closing and reopening a database with the
//! same extractors registered rehydrates every attached index.

mod common;

use ixtree::{Database, DbOptions, FLAG_SPARSE, FLAG_UNIQUE};
use tempfile::TempDir;

#[test]
fn reopened_tree_rehydrates_its_indexes() {
    let dir = TempDir::new().unwrap();

    {
        let db = Database::open(dir.path(), DbOptions::default()).unwrap();
        db.register_extractor(1, FLAG_UNIQUE, common::field_extractor("email")).unwrap();
        db.register_extractor(2, FLAG_SPARSE, common::field_extractor("cat")).unwrap();

        let mut txn = db.begin(true).unwrap();
        let tree = db.open_tree(&mut txn, "people").unwrap();
        tree.add_index(&mut txn, db.registry(), common::unique_index("email", 1)).unwrap();
        tree.add_index(&mut txn, db.registry(), common::sparse_index("cat", 2)).unwrap();

        for i in 0..100u32 {
            let key = format!("u{i}");
            let value = format!("email=u{i}@x;cat=c{}", i % 4);
            tree.insert(&mut txn, key.as_bytes(), value.as_bytes()).unwrap();
        }
        txn.commit().unwrap();
    }

    let db = Database::open(dir.path(), DbOptions::default()).unwrap();
    db.register_extractor(1, FLAG_UNIQUE, common::field_extractor("email")).unwrap();
    db.register_extractor(2, FLAG_SPARSE, common::field_extractor("cat")).unwrap();

    let mut txn = db.begin(true).unwrap();
    let tree = db.open_tree(&mut txn, "people").unwrap();

    assert_eq!(tree.index_count(), 2);
    assert_eq!(tree.count(&txn).unwrap(), 100);

    let mut email_cursor = tree.index_cursor("email").unwrap();
    assert!(email_cursor.index_seek(&txn, b"u42@x").unwrap());
    assert_eq!(email_cursor.index_iterator_main_key(), Some(b"u42".to_vec()));

    let mut cat_cursor = tree.index_cursor("cat").unwrap();
    assert!(cat_cursor.index_seek(&txn, b"c0").unwrap());

    tree.verify_indexes(&txn).unwrap();
}
