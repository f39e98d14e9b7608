use criterion::{criterion_group, criterion_main, Criterion};
use moksha_core::dhke::Dhke;
use secp256k1::{Secp256k1, SecretKey};

fn bench_dhke(c: &mut Criterion) {
    let secp = Secp256k1::new();
    let dhke = Dhke::new();
    let secret_msg = "test_message";
    let a = SecretKey::from_slice(&[1; 32]).unwrap();
    let blinding_factor = SecretKey::from_slice(&[1; 32]).unwrap();
    let blinding_bytes = blinding_factor.secret_bytes();

    c.bench_function("step1Alice", |b| {
        b.iter(|| {
            dhke.step1_alice(secret_msg, Some(&blinding_bytes))
                .unwrap()
        })
    });

    let (b_, r) = dhke.step1_alice(secret_msg, Some(&blinding_bytes)).unwrap();
    c.bench_function("step2Bob", |b| b.iter(|| dhke.step2_bob(b_, &a).unwrap()));

    let c_ = dhke.step2_bob(b_, &a).unwrap();
    c.bench_function("step3Alice", |b| {
        b.iter(|| dhke.step3_alice(c_, r, a.public_key(&secp)).unwrap())
    });

    let step3_c = dhke.step3_alice(c_, r, a.public_key(&secp)).unwrap();
    c.bench_function("verify", |b| {
        b.iter(|| dhke.verify(a, step3_c, secret_msg).unwrap())
    });

    c.bench_function("End-to-End BDHKE", |b| {
        b.iter(|| {
            let (b_, r) = dhke.step1_alice(secret_msg, Some(&blinding_bytes)).unwrap();
            let c_ = dhke.step2_bob(b_, &a).unwrap();
            let c = dhke.step3_alice(c_, r, a.public_key(&secp)).unwrap();
            dhke.verify(a, c, secret_msg).unwrap()
        })
    });
}

criterion_group!(benches, bench_dhke);
criterion_main!(benches);
