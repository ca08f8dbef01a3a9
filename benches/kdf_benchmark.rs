//! KEK derivation cost.
//!
//! The iteration count is the only throttle on passphrase guessing. A single
//! derivation should land in the hundreds of milliseconds: cheap enough for
//! one unlock per session, expensive for an attacker.
//!
//! Run with: `cargo bench --bench kdf_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use zkvault::config::{CryptoConfig, EngineLimits, HashAlgorithm};
use zkvault::keys::derive_key_blocking;

fn bench_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pbkdf2_kek");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);

    let limits = EngineLimits::default();
    let salt = [0u8; 16];

    for iterations in [100_000u32, 600_000, 1_000_000] {
        for hash in [HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            let config = CryptoConfig {
                iterations,
                hash,
                ..CryptoConfig::default()
            };
            group.bench_with_input(
                BenchmarkId::new(hash.to_string(), iterations),
                &config,
                |b, config| {
                    b.iter(|| {
                        derive_key_blocking(black_box("correct-horse"), &salt, config, &limits)
                            .unwrap()
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_derivation);
criterion_main!(benches);
