use std::ops::Bound;

use criterion::{
    black_box, AxisScale, Bencher, BenchmarkId, Criterion, PlotConfiguration, Throughput,
};
use ixtree::IndexConfig;

use super::BenchDB;

const SAMPLE_SIZE: usize = 10;
const CHUNK_SIZE: usize = 64;
const ITEM_COUNTS: [usize; 3] = [1_000, 10_000, 100_000];

fn generate_kv(len: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..len)
        .map(|i| (i.to_be_bytes().to_vec(), vec![0_u8; CHUNK_SIZE]))
        .collect()
}

fn by_value_index() -> IndexConfig {
    IndexConfig {
        name: "by_value".into(),
        version: 1,
        unique: true,
        sparse: false,
        user_data: Vec::new(),
        key_comparator: None,
        dup_comparator: None,
    }
}

fn insert_no_index(b: &mut Bencher<'_>, len: usize) {
    let data = generate_kv(len);
    b.iter_with_setup(
        || (BenchDB::default(), data.clone()),
        |(db, data)| {
            let mut txn = db.begin(true);
            let tree = db.open_tree(&mut txn, "bench");
            for (k, v) in &data {
                tree.insert(&mut txn, k, v).unwrap();
            }
            txn.commit().unwrap();
        },
    );
}

fn insert_with_unique_index(b: &mut Bencher<'_>, len: usize) {
    let data = generate_kv(len);
    b.iter_with_setup(
        || (BenchDB::default(), data.clone()),
        |(db, data)| {
            let mut txn = db.begin(true);
            let tree = db.open_tree(&mut txn, "bench");
            tree.add_index(&mut txn, db.registry(), by_value_index()).unwrap();
            for (k, v) in &data {
                tree.insert(&mut txn, k, v).unwrap();
            }
            txn.commit().unwrap();
        },
    );
}

fn scan_forward(b: &mut Bencher<'_>, len: usize) {
    let data = generate_kv(len);
    let db = BenchDB::default();
    let tree = {
        let mut txn = db.begin(true);
        let tree = db.open_tree(&mut txn, "bench");
        for (k, v) in &data {
            tree.insert(&mut txn, k, v).unwrap();
        }
        txn.commit().unwrap();
        tree
    };

    b.iter_with_setup(
        || db.begin(false),
        |txn| {
            let pairs = tree.scan_forward(&txn, Bound::Unbounded, Bound::Unbounded).unwrap();
            black_box(pairs);
        },
    );
}

fn point_reads(b: &mut Bencher<'_>, len: usize) {
    let data = generate_kv(len);
    let db = BenchDB::default();
    let tree = {
        let mut txn = db.begin(true);
        let tree = db.open_tree(&mut txn, "bench");
        for (k, v) in &data {
            tree.insert(&mut txn, k, v).unwrap();
        }
        txn.commit().unwrap();
        tree
    };

    b.iter_with_setup(
        || db.begin(false),
        |txn| {
            for (k, _) in &data {
                black_box(tree.get(&txn, k).unwrap());
            }
        },
    );
}

fn bench_fn<F>(c: &mut Criterion, name: &str, benchmark: F)
where
    F: Fn(&mut Bencher<'_>, usize) + 'static,
{
    let mut group = c.benchmark_group(name);
    for item_count in ITEM_COUNTS.iter() {
        group
            .bench_with_input(
                BenchmarkId::from_parameter(item_count),
                item_count,
                |b: &mut Bencher<'_>, len: &usize| benchmark(b, *len),
            )
            .throughput(Throughput::Elements(*item_count as u64))
            .plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic))
            .sample_size(SAMPLE_SIZE);
    }
    group.finish();
}

pub fn bench_storage(c: &mut Criterion) {
    bench_fn(c, "storage/insert/plain", insert_no_index);
    bench_fn(c, "storage/insert/with_unique_index", insert_with_unique_index);
    bench_fn(c, "storage/scan_forward", scan_forward);
    bench_fn(c, "storage/point_read", point_reads);
}
