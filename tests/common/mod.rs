//! Shared harness for the end-to-end scenario tests (`spec.md` §8).

use ixtree::{Database, DbOptions, Extractor, IndexConfig};
use tempfile::TempDir;

/// A temp-directory-backed [`Database`] that the caller keeps alive for
/// the duration of the test (dropping the `TempDir` removes the files).
pub fn open_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("create tempdir");
    let db = Database::open(dir.path(), DbOptions::default()).expect("open database");
    (dir, db)
}

/// Registers an extractor that pulls a single `field=value` token out of
/// a `;`-separated record, e.g. `b"email=a@x;age=9"` with `field = "email"`
/// extracts `b"a@x"`. Absent fields extract to `None`, for sparse-index tests.
pub fn field_extractor(field: &'static str) -> Extractor {
    Extractor::new(move |value: &[u8], _user_data| {
        let text = std::str::from_utf8(value).ok()?;
        text.split(';').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == field).then(|| v.as_bytes().to_vec())
        })
    })
}

pub fn unique_index(name: &str, version: u32) -> IndexConfig {
    IndexConfig {
        name: name.to_string(),
        version,
        unique: true,
        sparse: false,
        user_data: Vec::new(),
        key_comparator: None,
        dup_comparator: None,
    }
}

pub fn sparse_index(name: &str, version: u32) -> IndexConfig {
    IndexConfig {
        name: name.to_string(),
        version,
        unique: false,
        sparse: true,
        user_data: Vec::new(),
        key_comparator: None,
        dup_comparator: None,
    }
}
