// Assignment throughput for typical taxonomy sizes
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use taxonorm_core::Vector;
use taxonorm_similarity::{nearest_category, EmbeddedInputs, HashingEmbedder};

const DIM: usize = 256;

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data)
}

fn benchmark_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_category");
    let mut rng = rand::rng();

    for size in [8, 32, 128].iter() {
        let canonical: Vec<Vector> = (0..*size)
            .map(|_| generate_random_vector(&mut rng, DIM))
            .collect();
        let query = generate_random_vector(&mut rng, DIM);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| nearest_category(black_box(&query), black_box(&canonical)));
        });
    }

    group.finish();
}

fn benchmark_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign");
    let mut rng = rand::rng();

    for raw_count in [100, 1000, 5000].iter() {
        let order: Vec<String> = (0..*raw_count).map(|i| format!("raw value {}", i)).collect();
        let raw: Vec<(String, Vector)> = order
            .iter()
            .map(|s| (s.clone(), generate_random_vector(&mut rng, DIM)))
            .collect();
        let names: Vec<String> = (0..20).map(|i| format!("category {}", i)).collect();
        let vectors: Vec<Vector> = names
            .iter()
            .map(|_| generate_random_vector(&mut rng, DIM))
            .collect();
        let inputs = EmbeddedInputs::from_vectors(order, raw, names, vectors).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(raw_count), raw_count, |b, _| {
            b.iter(|| black_box(inputs.assign()));
        });
    }

    group.finish();
}

fn benchmark_hashing_embedder(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(DIM);
    c.bench_function("hashing_embed", |b| {
        b.iter(|| embedder.embed_text(black_box("产品给用户带来的超出预期的即时满足的特点")));
    });
}

criterion_group!(benches, benchmark_nearest, benchmark_assign, benchmark_hashing_embedder);
criterion_main!(benches);
