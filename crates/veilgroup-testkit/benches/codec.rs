//! Envelope codec benchmarks.
//!
//! Benchmarks:
//! - seal / open at empty and full payload width
//! - key stream derivation
//! - ledger event CBOR encoding

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use veilgroup_core::{
    open, seal, GroupId, GroupSecret, Handle, KeyStream, LedgerEvent, MessageIndex, Principal,
};

fn bench_seal_open(c: &mut Criterion) {
    let secret = GroupSecret(0x0123_4567_89ab_cdef);
    let mut group = c.benchmark_group("envelope");

    for (label, text) in [("empty", ""), ("full", "abcdefghijklmnopqrstuvwxyz01234")] {
        group.bench_function(format!("seal/{}", label), |b| {
            b.iter(|| seal(black_box(text), black_box(secret)).unwrap())
        });

        let sealed = seal(text, secret).unwrap();
        group.bench_function(format!("open/{}", label), |b| {
            b.iter(|| open(black_box(&sealed), black_box(secret)).unwrap())
        });
    }

    group.bench_function("key_stream", |b| {
        b.iter(|| KeyStream::derive(black_box(secret)))
    });

    group.finish();
}

fn bench_event_encoding(c: &mut Criterion) {
    let event = LedgerEvent::MessageSent {
        group_id: GroupId(3),
        index: MessageIndex(1_024),
        sender: Principal::from_bytes([7; 32]),
        content_handle: Handle::from_bytes([8; 32]),
        timestamp: 1_736_870_400_000,
    };
    let bytes = event.to_bytes().unwrap();

    c.bench_function("event/encode", |b| b.iter(|| black_box(&event).to_bytes().unwrap()));
    c.bench_function("event/decode", |b| {
        b.iter(|| LedgerEvent::from_bytes(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_seal_open, bench_event_encoding);
criterion_main!(benches);
