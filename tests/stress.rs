//! Stress tests for the telemetry codec and cipher
//!
//! Run with: cargo test --release stress -- --ignored

use electrometer::*;
use std::time::Instant;

fn reading(i: u64) -> TelemetryEnvelope {
    let mut envelope = TelemetryEnvelope::new();
    envelope.push(KeyValueRecord::new("deviceID", format!("node-{}", i % 16)).unwrap());
    envelope.push(KeyValueRecord::number("current", (i as f64 * 0.001).sin().abs() * 5.0, 3).unwrap());
    envelope.push(KeyValueRecord::number("voltage", 230.0, 2).unwrap());
    envelope
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_codec() {
    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let envelope = reading(i);
        let parsed = TelemetryEnvelope::parse(&envelope.serialize()).unwrap();
        assert_eq!(parsed.len(), 3);
    }

    let elapsed = start.elapsed();
    let rate = iterations as f64 / elapsed.as_secs_f64();

    println!("Round-tripped {} envelopes in {:?}", iterations, elapsed);
    println!("Rate: {:.0} envelopes/second", rate);

    assert!(
        rate > 100_000.0,
        "Should round-trip at least 100k envelopes/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_encrypted_roundtrip() {
    for mode in [CipherMode::Ctr, CipherMode::Ecb] {
        let cipher = CipherService::with_key(mode, "stress-key");
        let iterations = 100_000;
        let start = Instant::now();

        for i in 0..iterations {
            let envelope = reading(i);
            let payload = cipher.encrypt(envelope.serialize().as_bytes()).unwrap();
            let plaintext = cipher.decrypt(&payload).unwrap();
            let decoded = TelemetryEnvelope::parse_bytes(&plaintext).unwrap();
            assert_eq!(
                decoded, envelope,
                "{} roundtrip failed at iteration {}",
                mode, i
            );
        }

        println!(
            "{}: {} encrypted round-trips in {:?}",
            mode,
            iterations,
            start.elapsed()
        );
    }
}

#[test]
#[ignore]
fn stress_test_lossy_link() {
    let mut radio = radio::LossyRadio::new(0.3);
    let mut receiver = MemoryRadio::new();
    let iterations = 10_000;

    for i in 0..iterations {
        radio.send(reading(i).serialize().as_bytes()).unwrap();
        radio.inner_mut().transfer_to(&mut receiver);
        while let Some(packet) = receiver.receive(std::time::Duration::ZERO).unwrap() {
            TelemetryEnvelope::parse_bytes(&packet).unwrap();
        }
    }

    let metrics = radio.metrics();
    let loss = metrics.packets_lost as f64 / metrics.packets_sent as f64;
    println!("Lost {:.1}% of {} packets", loss * 100.0, iterations);
    assert!((0.2..0.4).contains(&loss), "loss rate {loss}");
}
