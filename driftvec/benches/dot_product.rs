use criterion::{black_box, criterion_group, criterion_main, Criterion};
use driftvec::vec_simd;
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

const ARRAY_SIZE: usize = 512;

const SEED: [u8; 16] = [
    0xe9, 0xfe, 0xf0, 0xfb, 0x6a, 0x23, 0x2a, 0xb3, 0x7c, 0xce, 0x27, 0x9b, 0x56, 0xac, 0xdb,
    0xf8,
];

fn random_vec(n: usize, rng: &mut XorShiftRng) -> Vec<f32> {
    let range = Uniform::new(-1.0, 1.0);
    (0..n).map(|_| range.sample(rng)).collect()
}

fn dot_dispatched(c: &mut Criterion) {
    let mut rng = XorShiftRng::from_seed(SEED);
    let u = random_vec(ARRAY_SIZE, &mut rng);
    let v = random_vec(ARRAY_SIZE, &mut rng);
    c.bench_function("dot_dispatched", move |b| {
        b.iter(|| black_box(vec_simd::dot(&u, &v)))
    });
}

fn dot_unvectorized(c: &mut Criterion) {
    let mut rng = XorShiftRng::from_seed(SEED);
    let u = random_vec(ARRAY_SIZE, &mut rng);
    let v = random_vec(ARRAY_SIZE, &mut rng);
    c.bench_function("dot_unvectorized", move |b| {
        b.iter(|| black_box(vec_simd::dot_unvectorized(&u, &v)))
    });
}

fn scaled_add_dispatched(c: &mut Criterion) {
    let mut rng = XorShiftRng::from_seed(SEED);
    let mut u = random_vec(ARRAY_SIZE, &mut rng);
    let v = random_vec(ARRAY_SIZE, &mut rng);
    c.bench_function("scaled_add_dispatched", move |b| {
        b.iter(|| vec_simd::scaled_add(black_box(&mut u), &v, 0.5))
    });
}

criterion_group!(
    benches,
    dot_dispatched,
    dot_unvectorized,
    scaled_add_dispatched
);
criterion_main!(benches);
