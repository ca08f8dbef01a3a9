use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use zkvault::config::CipherAlgorithm;
use zkvault::crypto;
use zkvault::keys::generate_dek;

fn bench_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");
    let dek = generate_dek(CipherAlgorithm::AesGcm, 256).unwrap();
    let iv_size = CipherAlgorithm::AesGcm.nonce_len();

    let sizes = [("16B", 16), ("1KB", 1024), ("10KB", 10 * 1024)];
    for (name, size) in sizes {
        let plaintext = "x".repeat(size);
        let sealed = crypto::encrypt(&plaintext, &dek, CipherAlgorithm::AesGcm, iv_size).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encrypt/{name}"), |b| {
            b.iter(|| {
                crypto::encrypt(black_box(&plaintext), &dek, CipherAlgorithm::AesGcm, iv_size)
                    .unwrap()
            });
        });
        group.bench_function(format!("decrypt/{name}"), |b| {
            b.iter(|| {
                crypto::decrypt(
                    black_box(&sealed.cipher_text),
                    &dek,
                    &sealed.iv,
                    CipherAlgorithm::AesGcm,
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_payload);
criterion_main!(benches);
