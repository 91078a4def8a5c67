use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use mesh_adapt::metric::{fan_out_3d, MetricField3, SpdTensor, Tensor3};
use mesh_adapt::mesh::VertexId;

fn random_symmetric(rng: &mut SmallRng) -> [f64; 9] {
    let upper: [f64; 6] = [
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
    ];
    fan_out_3d(&upper)
}

fn random_spd(rng: &mut SmallRng) -> Tensor3 {
    Tensor3::try_from_raw(&random_symmetric(rng)).unwrap()
}

fn bench_projection(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);
    let raws: Vec<[f64; 9]> = (0..1024).map(|_| random_symmetric(&mut rng)).collect();

    c.bench_function("spd_projection_3d", |b| {
        b.iter(|| {
            for raw in &raws {
                let _ = Tensor3::try_from_raw(raw).unwrap();
            }
        });
    });
}

fn bench_constrain(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);
    let pairs: Vec<(Tensor3, Tensor3)> = (0..1024)
        .map(|_| (random_spd(&mut rng), random_spd(&mut rng)))
        .collect();

    c.bench_function("constrain_3d", |b| {
        b.iter(|| {
            for (a, other) in &pairs {
                let mut t = *a;
                t.constrain(other, true).unwrap();
            }
        });
    });
}

fn bench_aspect_clamp(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_max_aspect_ratio");
    for &n in &[1_000usize, 10_000, 100_000] {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut field = MetricField3::with_vertices(n);
        for i in 0..n {
            let raw = random_symmetric(&mut rng);
            field.set_metric(&raw, VertexId::new(i as u32));
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &field, |b, field| {
            b.iter(|| {
                let mut f = field.clone();
                f.apply_max_aspect_ratio(10.0).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_projection, bench_constrain, bench_aspect_clamp);
criterion_main!(benches);
