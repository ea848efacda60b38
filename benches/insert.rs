use criterion::{criterion_group, criterion_main, Criterion};
use pagedb::{BTree, MemStore};

fn tree_insert_n(n: u32) {
    let mut store = MemStore::new();
    let mut tree = BTree::new();
    for i in 0..n {
        let key = format!("key-{:08}", i);
        tree.insert(&mut store, key.as_bytes(), &[0, 1, 2, 3, 4]);
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("tree_insert 100", |b| {
        b.iter(|| tree_insert_n(100));
    });
    c.bench_function("tree_insert 1,000", |b| {
        b.iter(|| tree_insert_n(1_000));
    });
    c.bench_function("tree_insert 10,000", |b| {
        b.iter(|| tree_insert_n(10_000));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
