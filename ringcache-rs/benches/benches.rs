use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ringcache::consistenthash::HashRing;
use ringcache::group::{Group, LoaderFn};
use ringcache::lru::LruStore;
use ringcache::request::Request;

fn lru_benchmarks(c: &mut Criterion) {
    c.bench_function("add to a full LRU store", |b| {
        let mut lru = LruStore::new(64 * 1024);
        let mut index = 0;
        b.iter(|| {
            index += 1;
            lru.add(format!("key-{}", index), black_box(vec![0u8; 64]));
        })
    });

    c.bench_function("get from an LRU store", |b| {
        let mut lru = LruStore::new(0);
        for index in 0..1000 {
            lru.add(format!("key-{}", index), vec![0u8; 64]);
        }
        b.iter(|| {
            black_box(lru.get(black_box("key-500")).is_some());
        })
    });
}

fn ring_benchmarks(c: &mut Criterion) {
    c.bench_function("lookup the owner of a key", |b| {
        let mut ring = HashRing::new(50, None);
        ring.add(&["10.0.0.1:2410", "10.0.0.2:2410", "10.0.0.3:2410"]);
        b.iter(|| {
            black_box(ring.get(black_box("scores-of-Tom")));
        })
    });
}

fn request_benchmarks(c: &mut Criterion) {
    c.bench_function("parse a PEER.GET request", |b| {
        let request = Request::encode("PEER.GET", &[&b"scores"[..], &b"Tom"[..]]);
        b.iter(|| {
            black_box(Request::parse(black_box(&request)).unwrap());
        })
    });

    c.bench_function("parse a partial request", |b| {
        let request = BytesMut::from("*3\r\n$8\r\nPEER.G");
        b.iter(|| {
            black_box(Request::parse(black_box(&request)).unwrap());
        })
    });
}

fn group_benchmarks(c: &mut Criterion) {
    c.bench_function("get a cached value from a group", |b| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let group = Group::builder("scores")
            .max_bytes(1024 * 1024)
            .loader(LoaderFn::new(|_: &str| Ok(b"630".to_vec())))
            .build()
            .unwrap();
        let _ = runtime.block_on(group.get("Tom")).unwrap();

        b.iter(|| {
            black_box(runtime.block_on(group.get(black_box("Tom"))).unwrap());
        })
    });
}

criterion_group!(
    benches,
    lru_benchmarks,
    ring_benchmarks,
    request_benchmarks,
    group_benchmarks
);
criterion_main!(benches);
