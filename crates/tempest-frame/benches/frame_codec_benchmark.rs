//! Benchmarks for the frame codec's encode/decode hot path.
//!
//! Run with: `cargo bench -p tempest-frame`

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tempest_crypto::SessionCrypto;
use tempest_frame::{FrameCodec, Signer};
use tempest_protocol::control::Pong;
use tempest_types::SerializeContext;

const MAX_MESSAGE_LENGTH: u32 = 1 << 20;

fn bench_encode(c: &mut Criterion) {
    let crypto = SessionCrypto::generate();
    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("pong", "session_signed"), |b| {
        let codec = FrameCodec::new(SerializeContext::new(), MAX_MESSAGE_LENGTH);
        b.iter(|| {
            let mut message = Pong::new();
            let bytes = codec
                .encode_frame(black_box(&mut message), &Signer::Session(&crypto))
                .unwrap();
            black_box(bytes)
        });
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let crypto = SessionCrypto::generate();
    let codec = FrameCodec::new(SerializeContext::new(), MAX_MESSAGE_LENGTH);
    let mut message = Pong::new();
    let frame = codec
        .encode_frame(&mut message, &Signer::Session(&crypto))
        .unwrap();

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("pong", "session_verified"), |b| {
        b.iter(|| {
            let mut decode_codec = FrameCodec::new(SerializeContext::new(), MAX_MESSAGE_LENGTH);
            decode_codec.install_session_crypto(crypto.clone());
            let mut buf = BytesMut::from(&frame[..]);
            let decoded = decode_codec.decode(black_box(&mut buf)).unwrap();
            black_box(decoded)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
