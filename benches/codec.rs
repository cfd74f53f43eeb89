//! Benchmarks for the telemetry wire codec and payload cipher

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use electrometer::{CipherMode, CipherService, KeyValueRecord, TelemetryEnvelope};

fn generate_envelopes(count: usize) -> Vec<TelemetryEnvelope> {
    (0..count)
        .map(|i| {
            let mut envelope = TelemetryEnvelope::new();
            envelope.push(KeyValueRecord::new("deviceID", "QB5ckYt0CS7Yc7swMKPu").unwrap());
            envelope.push(KeyValueRecord::number("current", 1.0 + (i % 10) as f64 * 0.1, 3).unwrap());
            envelope.push(KeyValueRecord::number("voltage", 230.0, 2).unwrap());
            envelope
        })
        .collect()
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    let envelopes = generate_envelopes(1000);

    group.throughput(Throughput::Elements(1000));
    group.bench_function("serialize_1000_envelopes", |b| {
        b.iter(|| {
            for envelope in &envelopes {
                black_box(envelope.serialize());
            }
        })
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let wire: Vec<String> = generate_envelopes(1000)
        .iter()
        .map(TelemetryEnvelope::serialize)
        .collect();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("parse_1000_envelopes", |b| {
        b.iter(|| {
            for text in &wire {
                black_box(TelemetryEnvelope::parse(text).ok());
            }
        })
    });

    group.finish();
}

fn bench_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("cipher");
    let wire: Vec<Vec<u8>> = generate_envelopes(1000)
        .iter()
        .map(|e| e.serialize().into_bytes())
        .collect();

    for mode in [CipherMode::Ctr, CipherMode::Ecb] {
        let cipher = CipherService::with_key(mode, "0123456789abcdef");
        group.throughput(Throughput::Elements(1000));
        group.bench_function(format!("{mode}_encrypt_1000"), |b| {
            b.iter(|| {
                for payload in &wire {
                    black_box(cipher.encrypt(payload).ok());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_serialize, bench_parse, bench_cipher);
criterion_main!(benches);
