use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ledgerkv_storage::Db;

fn bench_set_get_sequential(c: &mut Criterion) {
    c.bench_function("set_get_sequential_10k", |b| {
        b.iter(|| {
            let db = Db::new();
            for i in 0..10_000 {
                let key = Bytes::from(format!("key:{i}"));
                let value = Bytes::from(format!("value:{i}"));
                db.set(key.clone(), value);
                black_box(db.get(&key));
            }
        })
    });
}

fn bench_get_with_ttl(c: &mut Criterion) {
    let db = Db::new();
    for i in 0..10_000 {
        let key = Bytes::from(format!("key:{i}"));
        db.set(key.clone(), Bytes::from_static(b"v"));
        db.pexpire(&key, 3_600_000);
    }

    c.bench_function("get_with_ttl_10k", |b| {
        b.iter(|| {
            for i in 0..10_000 {
                black_box(db.get(format!("key:{i}").as_bytes()));
            }
        })
    });
}

fn bench_set_concurrent(c: &mut Criterion) {
    c.bench_function("set_concurrent_4_threads_10k", |b| {
        b.iter(|| {
            let db = Db::new();
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = db.clone();
                    std::thread::spawn(move || {
                        for i in 0..2_500 {
                            db.set(Bytes::from(format!("{t}:{i}")), Bytes::from_static(b"v"));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
        })
    });
}

criterion_group!(
    benches,
    bench_set_get_sequential,
    bench_get_with_ttl,
    bench_set_concurrent,
);
criterion_main!(benches);
