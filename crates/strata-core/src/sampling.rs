//! Cryptographic sampling for CKKS.
//!
//! - Secret key and encryption randomness: ternary distribution {-1, 0, 1}
//! - Error vectors: rounded Gaussian with σ ≈ 3.19
//! - Random polynomials: uniform in Z_q
//!
//! Signed samples are returned as `i64` so one draw can be reduced consistently
//! into every RNS limb (see [`crate::rns::RnsPoly::from_signed`]).

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Standard deviation for RLWE error distribution.
pub const ERROR_STD_DEV: f64 = 3.19;

/// Samples further than this many σ from zero are redrawn.
const GAUSSIAN_TAIL_CUT: f64 = 6.0;

/// Sample a ternary polynomial: each coefficient ∈ {-1, 0, 1} with probability 1/3.
pub fn sample_ternary<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<i64> {
    (0..n).map(|_| rng.gen_range(-1i64..=1)).collect()
}

/// Sample a rounded Gaussian error vector as signed integers.
pub fn sample_gaussian_signed<R: Rng + ?Sized>(rng: &mut R, n: usize, sigma: f64) -> Vec<i64> {
    let normal = match Normal::new(0.0, sigma) {
        Ok(normal) => normal,
        // Non-finite or negative σ degenerates to the zero vector.
        Err(_) => return vec![0; n],
    };
    let bound = GAUSSIAN_TAIL_CUT * sigma;
    (0..n)
        .map(|_| loop {
            let sample: f64 = normal.sample(rng);
            if sample.abs() <= bound {
                break sample.round() as i64;
            }
        })
        .collect()
}

/// Sample a uniform random vector in Z_q^N.
/// Used for the 'a' component in RLWE samples.
pub fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, n: usize, q: u64) -> Vec<u64> {
    (0..n).map(|_| rng.gen_range(0..q)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ternary_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10000;
        let samples = sample_ternary(&mut rng, n);

        let expected = n / 3;
        let tolerance = (n as f64 * 0.05) as usize;
        for value in [-1i64, 0, 1] {
            let count = samples.iter().filter(|&&x| x == value).count();
            assert!(
                (count as isize - expected as isize).unsigned_abs() < tolerance,
                "value {value}: count={count}, expected≈{expected}"
            );
        }
        assert!(samples.iter().all(|&s| (-1..=1).contains(&s)));
    }

    #[test]
    fn test_gaussian_distribution() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 10000;
        let samples = sample_gaussian_signed(&mut rng, n, ERROR_STD_DEV);

        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let variance: f64 =
            samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        let measured_sigma = variance.sqrt();

        assert!(mean.abs() < 0.2, "Gaussian mean too far from 0: {mean}");
        assert!(
            (measured_sigma - ERROR_STD_DEV).abs() < 0.3,
            "Gaussian sigma off: measured={measured_sigma}, expected={ERROR_STD_DEV}"
        );
        let bound = (GAUSSIAN_TAIL_CUT * ERROR_STD_DEV).ceil() as i64;
        assert!(samples.iter().all(|s| s.abs() <= bound));
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let q = 97u64;
        let samples = sample_uniform(&mut rng, 1000, q);
        assert!(samples.iter().all(|&s| s < q));
    }
}
