use cfg_if::cfg_if;

#[cfg(target_arch = "x86")]
use std::arch::x86::*;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Dot product: u · v
///
/// This SIMD-vectorized function computes the dot product
/// (BLAS sdot).
cfg_if! {
    if #[cfg(target_feature = "avx")] {
        pub fn dot(u: &[f32], v: &[f32]) -> f32 {
            unsafe { dot_f32x8(u, v) }
        }
    } else if #[cfg(target_feature = "sse3")] {
        pub fn dot(u: &[f32], v: &[f32]) -> f32 {
            unsafe { dot_f32x4(u, v) }
        }
    } else {
        pub fn dot(u: &[f32], v: &[f32]) -> f32 {
            dot_unvectorized(u, v)
        }
    }
}

/// Scaling: u = au
///
/// This function performs SIMD-vectorized scaling (BLAS sscal).
cfg_if! {
    if #[cfg(target_feature = "avx")] {
        pub fn scale(u: &mut [f32], a: f32) {
            unsafe { scale_f32x8(u, a) }
        }
    } else if #[cfg(target_feature = "sse")] {
        pub fn scale(u: &mut [f32], a: f32) {
            unsafe { scale_f32x4(u, a) }
        }
    } else {
        pub fn scale(u: &mut [f32], a: f32) {
            scale_unvectorized(u, a)
        }
    }
}

/// Scaled addition: *u = u + av*
///
/// This function performs SIMD-vectorized scaled addition (BLAS saxpy).
cfg_if! {
    if #[cfg(target_feature = "avx")] {
        pub fn scaled_add(u: &mut [f32], v: &[f32], a: f32) {
            unsafe { scaled_add_f32x8(u, v, a) }
        }
    } else if #[cfg(target_feature = "sse")] {
        pub fn scaled_add(u: &mut [f32], v: &[f32], a: f32) {
            unsafe { scaled_add_f32x4(u, v, a) }
        }
    } else {
        pub fn scaled_add(u: &mut [f32], v: &[f32], a: f32) {
            scaled_add_unvectorized(u, v, a)
        }
    }
}

/// Euclidean norm of *u*.
pub fn norm(u: &[f32]) -> f32 {
    dot(u, u).sqrt()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn dot_f32x4(mut u: &[f32], v: &[f32]) -> f32 {
    assert_eq!(u.len(), v.len());

    let mut v = &v[..u.len()];

    let mut sums = _mm_setzero_ps();

    while u.len() >= 4 {
        let ux4 = _mm_loadu_ps(&u[0] as *const f32);
        let vx4 = _mm_loadu_ps(&v[0] as *const f32);

        sums = _mm_add_ps(_mm_mul_ps(ux4, vx4), sums);

        u = &u[4..];
        v = &v[4..];
    }

    sums = _mm_hadd_ps(sums, sums);
    sums = _mm_hadd_ps(sums, sums);

    _mm_cvtss_f32(sums) + dot_unvectorized(u, v)
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn dot_f32x8(mut u: &[f32], v: &[f32]) -> f32 {
    assert_eq!(u.len(), v.len());

    let mut v = &v[..u.len()];

    let mut sums = _mm256_setzero_ps();

    while u.len() >= 8 {
        let ux8 = _mm256_loadu_ps(&u[0] as *const f32);
        let vx8 = _mm256_loadu_ps(&v[0] as *const f32);

        sums = _mm256_add_ps(_mm256_mul_ps(ux8, vx8), sums);

        u = &u[8..];
        v = &v[8..];
    }

    sums = _mm256_hadd_ps(sums, sums);
    sums = _mm256_hadd_ps(sums, sums);

    // Sum sums[0..4] and sums[4..8].
    let sums = _mm_add_ps(_mm256_castps256_ps128(sums), _mm256_extractf128_ps(sums, 1));

    _mm_cvtss_f32(sums) + dot_unvectorized(u, v)
}

pub fn dot_unvectorized(u: &[f32], v: &[f32]) -> f32 {
    assert_eq!(u.len(), v.len());
    u.iter().zip(v).map(|(&a, &b)| a * b).sum()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn scaled_add_f32x4(mut u: &mut [f32], v: &[f32], a: f32) {
    assert_eq!(u.len(), v.len());

    let mut v = &v[..u.len()];

    let ax4 = _mm_set1_ps(a);

    while u.len() >= 4 {
        let mut ux4 = _mm_loadu_ps(&u[0] as *const f32);
        let vx4 = _mm_loadu_ps(&v[0] as *const f32);
        ux4 = _mm_add_ps(ux4, _mm_mul_ps(vx4, ax4));
        _mm_storeu_ps(&mut u[0] as *mut f32, ux4);
        u = &mut { u }[4..];
        v = &v[4..];
    }

    scaled_add_unvectorized(u, v, a);
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn scaled_add_f32x8(mut u: &mut [f32], v: &[f32], a: f32) {
    assert_eq!(u.len(), v.len());

    let mut v = &v[..u.len()];

    let ax8 = _mm256_set1_ps(a);

    while u.len() >= 8 {
        let mut ux8 = _mm256_loadu_ps(&u[0] as *const f32);
        let vx8 = _mm256_loadu_ps(&v[0] as *const f32);

        ux8 = _mm256_add_ps(ux8, _mm256_mul_ps(vx8, ax8));

        _mm256_storeu_ps(&mut u[0] as *mut f32, ux8);
        u = &mut { u }[8..];
        v = &v[8..];
    }

    scaled_add_unvectorized(u, v, a);
}

fn scaled_add_unvectorized(u: &mut [f32], v: &[f32], a: f32) {
    assert_eq!(u.len(), v.len());

    for i in 0..u.len() {
        u[i] += v[i] * a;
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn scale_f32x4(mut u: &mut [f32], a: f32) {
    let ax4 = _mm_set1_ps(a);

    while u.len() >= 4 {
        let mut ux4 = _mm_loadu_ps(&u[0] as *const f32);
        ux4 = _mm_mul_ps(ux4, ax4);
        _mm_storeu_ps(&mut u[0] as *mut f32, ux4);
        u = &mut { u }[4..];
    }

    scale_unvectorized(u, a);
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(dead_code)]
unsafe fn scale_f32x8(mut u: &mut [f32], a: f32) {
    let ax8 = _mm256_set1_ps(a);

    while u.len() >= 8 {
        let mut ux8 = _mm256_loadu_ps(&u[0] as *const f32);
        ux8 = _mm256_mul_ps(ux8, ax8);
        _mm256_storeu_ps(&mut u[0] as *mut f32, ux8);
        u = &mut { u }[8..];
    }

    scale_unvectorized(u, a);
}

fn scale_unvectorized(u: &mut [f32], a: f32) {
    for i in 0..u.len() {
        u[i] *= a;
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::{Distribution, Uniform};
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    use crate::util::{all_close, close};

    use super::{dot_unvectorized, scale_unvectorized, scaled_add_unvectorized};

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use super::{dot_f32x4, scale_f32x4, scaled_add_f32x4};

    const SEED: [u8; 16] = [
        0xe9, 0xfe, 0xf0, 0xfb, 0x6a, 0x23, 0x2a, 0xb3, 0x7c, 0xce, 0x27, 0x9b, 0x56, 0xac, 0xdb,
        0xf8,
    ];

    fn random_vec(n: usize) -> Vec<f32> {
        let mut rng = XorShiftRng::from_seed(SEED);
        let range = Uniform::new(-1.0, 1.0);
        (0..n).map(|_| range.sample(&mut rng)).collect()
    }

    #[test]
    fn dot_unvectorized_test() {
        let u = [1f32, -2f32, -3f32];
        let v = [2f32, 4f32, -2f32];
        let w = [-1f32, 3f32, 2.5f32];

        assert!(close(dot_unvectorized(&u, &v), 0f32, 1e-5));
        assert!(close(dot_unvectorized(&u, &w), -14.5f32, 1e-5));
        assert!(close(dot_unvectorized(&v, &w), 5f32, 1e-5));
    }

    #[test]
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn dot_f32x4_test() {
        let u = random_vec(102);
        let mut v = random_vec(102);
        v.reverse();
        assert!(close(
            unsafe { dot_f32x4(&u, &v) },
            dot_unvectorized(&u, &v),
            1e-4
        ));
    }

    #[test]
    fn scaled_add_unvectorized_test() {
        let u = &mut [1., 2., 3., 4., 5.];
        let v = &[5., 3., 3., 2., 1.];
        scaled_add_unvectorized(u, v, 0.5);
        assert!(all_close(u, &[3.5, 3.5, 4.5, 5.0, 5.5], 1e-5));
    }

    #[test]
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn scaled_add_f32x4_test() {
        let mut u = random_vec(102);
        let mut v = random_vec(102);
        v.reverse();
        let mut check = u.clone();
        scaled_add_unvectorized(&mut check, &v, 2.5);
        unsafe { scaled_add_f32x4(&mut u, &v, 2.5) };
        assert!(all_close(&check, &u, 1e-5));
    }

    #[test]
    fn scale_unvectorized_test() {
        let s = &mut [1., 2., 3., 4., 5.];
        scale_unvectorized(s, 0.5);
        assert!(all_close(s, &[0.5, 1.0, 1.5, 2.0, 2.5], 1e-5));
    }

    #[test]
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn scale_f32x4_test() {
        let mut u = random_vec(102);
        let mut check = u.clone();
        scale_unvectorized(&mut check, 2.);
        unsafe { scale_f32x4(&mut u, 2.) };
        assert!(all_close(&check, &u, 1e-5));
    }
}
