//! Performance benchmarks for the cipher and frame codec

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use unicorn_server::cipher::SessionCipher;
use unicorn_server::protocol::{self, TargetAddr};

fn cipher_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cipher");
    group.throughput(Throughput::Bytes(16384));

    group.bench_function("keystream_16k", |b| {
        let mut cipher = SessionCipher::new("bench-secret");
        let mut buf = vec![0u8; 16384];
        b.iter(|| {
            cipher.encrypt(black_box(&mut buf));
        })
    });

    group.bench_function("session_setup", |b| {
        b.iter(|| {
            let cipher = SessionCipher::new(black_box("bench-secret"));
            black_box(cipher);
        })
    });

    group.finish();
}

fn codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let domain_frame = protocol::encode_request(
        protocol::CMD_CONNECT,
        &TargetAddr::Domain("example.com".into()),
        443,
    )
    .unwrap();

    group.bench_function("decode_domain_request", |b| {
        b.iter(|| protocol::decode_request(black_box(&domain_frame)).unwrap())
    });

    group.bench_function("encode_ipv4_request", |b| {
        let addr = TargetAddr::Ipv4("192.0.2.1".parse().unwrap());
        b.iter(|| protocol::encode_request(protocol::CMD_CONNECT, black_box(&addr), 443).unwrap())
    });

    group.finish();
}

criterion_group!(benches, cipher_benchmark, codec_benchmark);
criterion_main!(benches);
