use ixtree::{Database, DbOptions, Extractor, ExtractorRegistry, Transaction, Tree, FLAG_UNIQUE};
use tempfile::{tempdir, TempDir};

pub mod storage;

pub(super) struct BenchDB {
    _dir: TempDir,
    db: Database,
}

impl BenchDB {
    pub(crate) fn new() -> Self {
        let dir = tempdir().expect("couldn't create tempdir");
        let db = Database::open(dir.path(), DbOptions::default()).expect("couldn't open database");
        db.register_extractor(1, FLAG_UNIQUE, Extractor::new(|v: &[u8], _ud| Some(v.to_vec())))
            .expect("couldn't register extractor");
        Self { _dir: dir, db }
    }

    pub(crate) fn registry(&self) -> &ExtractorRegistry {
        self.db.registry()
    }

    pub(crate) fn begin(&self, write: bool) -> Transaction<'_> {
        self.db.begin(write).expect("couldn't begin transaction")
    }

    pub(crate) fn open_tree(&self, txn: &mut Transaction<'_>, name: &str) -> Tree {
        self.db.open_tree(txn, name).expect("couldn't open tree")
    }
}

impl Default for BenchDB {
    fn default() -> Self {
        Self::new()
    }
}
