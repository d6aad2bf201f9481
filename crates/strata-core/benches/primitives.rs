use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use strata_core::keys::galois_element_for_step;
use strata_core::ntt::{negacyclic_ntt_forward, negacyclic_ntt_inverse, NttTables};
use strata_core::{CkksContext, CkksParams};

fn ntt_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ntt");
    for n in [2048usize, 8192] {
        let params = CkksParams::for_degree(n).unwrap();
        let tables = NttTables::new(n, params.moduli[0].value).unwrap();
        let data: Vec<u64> = (0..n as u64).map(|i| i % tables.q).collect();

        group.bench_with_input(BenchmarkId::new("forward", n), &n, |b, _| {
            b.iter(|| {
                let mut a = data.clone();
                negacyclic_ntt_forward(&mut a, &tables);
                a
            });
        });
        group.bench_with_input(BenchmarkId::new("roundtrip", n), &n, |b, _| {
            b.iter(|| {
                let mut a = data.clone();
                negacyclic_ntt_forward(&mut a, &tables);
                negacyclic_ntt_inverse(&mut a, &tables);
                a
            });
        });
    }
    group.finish();
}

fn ciphertext_benchmark(c: &mut Criterion) {
    let params = CkksParams::new(4096, &[60, 40, 40, 60], 40).unwrap();
    let ctx = CkksContext::new(params).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let sk = ctx.keygen(&mut rng);
    let pk = ctx.keygen_public(&sk, &mut rng);
    let rk = ctx.keygen_relin(&sk, &mut rng);
    let g = galois_element_for_step(1, ctx.params.poly_degree);
    let gk = ctx.keygen_galois(&sk, &[g], &mut rng).unwrap();

    let z: Vec<f64> = (0..ctx.num_slots()).map(|i| (i % 17) as f64 * 0.25).collect();
    let scale = ctx.params.default_scale();
    let pt = ctx.encode(&z, scale, ctx.max_level()).unwrap();
    let ct = ctx.encrypt(&pt, &pk, &mut rng).unwrap();

    let mut group = c.benchmark_group("ckks");
    group.bench_function("encode", |b| {
        b.iter(|| ctx.encode(&z, scale, ctx.max_level()).unwrap());
    });
    group.bench_function("encrypt", |b| {
        b.iter(|| ctx.encrypt(&pt, &pk, &mut rng).unwrap());
    });
    group.bench_function("multiply_relin_rescale", |b| {
        b.iter(|| {
            let mut prod = ctx.multiply(&ct, &ct).unwrap();
            ctx.relinearize_inplace(&mut prod, &rk);
            ctx.rescale_to_next_inplace(&mut prod).unwrap();
            prod
        });
    });
    group.bench_function("rotate", |b| {
        b.iter(|| {
            let mut rotated = ct.clone();
            ctx.rotate_inplace(&mut rotated, g, &gk).unwrap();
            rotated
        });
    });
    group.finish();
}

criterion_group!(benches, ntt_benchmark, ciphertext_benchmark);
criterion_main!(benches);
