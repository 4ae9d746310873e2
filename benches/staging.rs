use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;

use lsmcore::db::format::{InternalKey, KeyKind};
use lsmcore::opt::Options;
use lsmcore::storage::MemStorage;
use lsmcore::{BytewiseComparator, Session, SessionRecord};

const SIZE: u64 = 100_000;

fn ikey(i: u64) -> InternalKey {
    InternalKey::new(&(i as u32).to_be_bytes(), 0, KeyKind::Value)
}

fn bench_staging(c: &mut Criterion) {
    let session = Session::new(
        Arc::new(MemStorage::new()),
        BytewiseComparator::default(),
        Options {
            delete_obsolete_files: false,
            ..Options::default()
        },
    )
    .unwrap();
    let mut rec = SessionRecord::new();
    for i in 0..SIZE {
        rec.add_table(1, i, 1, ikey(i), ikey(i));
    }
    session.apply(&rec).unwrap();
    let base = session.current();

    let mut group = c.benchmark_group("version_staging");
    for &(name, trivial) in &[("non_trivial", false), ("trivial", true)] {
        let mut rng = rand::thread_rng();
        let mut next = SIZE;
        group.bench_function(name, |b| {
            b.iter(|| {
                // Replace up to four neighbouring tables with fresh ones
                // covering the same keys.
                let index = rng.gen_range(0..SIZE);
                let mut rec = SessionRecord::new();
                for j in index..SIZE.min(index + 4) {
                    rec.del_table(1, j);
                    rec.add_table(1, next, 1, ikey(j), ikey(j));
                    next += 1;
                }
                let mut staging = session.new_staging(&base);
                staging.commit(&rec).unwrap();
                staging.finish(trivial).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_staging);
criterion_main!(benches);
