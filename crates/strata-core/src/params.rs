//! CKKS parameter sets.
//!
//! A parameter set fixes:
//! - the ring degree N (a power of two) and the slot count N/2
//! - the data-prime chain q_0..q_L (NTT-friendly primes: q_i ≡ 1 mod 2N)
//! - the special prime P used only during key switching
//! - the default scale Δ = 2^scale_bits
//!
//! Coefficient bit widths follow the SEAL convention: in `[60, 40, 40, 60]` the
//! first three entries are data primes and the last one is the special prime.
//! Level ℓ of a ciphertext means it lives modulo q_0·…·q_ℓ; fresh values sit at
//! `max_level()` and every rescale drops the last remaining prime.

use std::collections::HashSet;

use crate::error::{CkksError, CkksResult};
use crate::rns::mod_pow;

/// Default scale bits: Δ = 2^40.
pub const SCALE_BITS: u32 = 40;

/// Smallest prime width accepted by the prime search.
pub const MIN_PRIME_BITS: u32 = 20;

/// Largest prime width accepted; keeps every residue below 2^61 so sums fit in u64.
pub const MAX_PRIME_BITS: u32 = 61;

/// A single RNS modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulus {
    /// The prime modulus q_i.
    pub value: u64,
    /// Bit width of this modulus.
    pub bits: u32,
}

impl Modulus {
    /// Wrap a prime of the given bit width.
    pub const fn new(value: u64, bits: u32) -> Self {
        Self { value, bits }
    }
}

/// Complete CKKS parameter set for a given polynomial degree N.
#[derive(Debug, Clone, PartialEq)]
pub struct CkksParams {
    /// Polynomial degree N (ring dimension). Must be a power of 2.
    pub poly_degree: usize,
    /// Number of SIMD slots = N/2.
    pub num_slots: usize,
    /// log2(N).
    pub log_n: u32,
    /// Data-prime chain [q_0, q_1, ..., q_L].
    pub moduli: Vec<Modulus>,
    /// Special prime P for key switching.
    pub special: Modulus,
    /// Number of data primes (L + 1).
    pub num_limbs: usize,
    /// log2 of the default scale.
    pub scale_bits: u32,
}

impl CkksParams {
    /// Parameter set for N=8192 with chain [60, 40, 40 | 60].
    pub fn n8192() -> Self {
        // q ≡ 1 (mod 16384), verified prime.
        Self::from_primes(
            8192,
            vec![
                Modulus::new(1152921504606830593, 60),
                Modulus::new(1099511480321, 40),
                Modulus::new(1099510890497, 40),
            ],
            Modulus::new(1152921504606601217, 60),
            SCALE_BITS,
        )
    }

    /// Parameter set for N=16384 with chain [60, 40, 40 | 60].
    pub fn n16384() -> Self {
        // q ≡ 1 (mod 32768), verified prime.
        Self::from_primes(
            16384,
            vec![
                Modulus::new(1152921504606748673, 60),
                Modulus::new(1099510054913, 40),
                Modulus::new(1099508121601, 40),
            ],
            Modulus::new(1152921504606683137, 60),
            SCALE_BITS,
        )
    }

    /// Parameter set for N=32768 with chain [60, 40, 40 | 60].
    pub fn n32768() -> Self {
        // q ≡ 1 (mod 65536), verified prime.
        Self::from_primes(
            32768,
            vec![
                Modulus::new(1152921504606584833, 60),
                Modulus::new(1099507695617, 40),
                Modulus::new(1099506515969, 40),
            ],
            Modulus::new(1152921504598720513, 60),
            SCALE_BITS,
        )
    }

    /// Select a preset by polynomial degree.
    pub fn for_degree(n: usize) -> CkksResult<Self> {
        match n {
            8192 => Ok(Self::n8192()),
            16384 => Ok(Self::n16384()),
            32768 => Ok(Self::n32768()),
            _ => Err(CkksError::InvalidParams(format!(
                "no preset for degree {n}; use 8192, 16384 or 32768"
            ))),
        }
    }

    /// Build a parameter set from coefficient-modulus bit widths.
    ///
    /// The last width is the special prime, all others form the data chain.
    /// Primes are searched downward from 2^bits and never repeat, so
    /// `[60, 40, 40, 60]` yields four distinct primes.
    pub fn new(poly_degree: usize, coeff_bits: &[u32], scale_bits: u32) -> CkksResult<Self> {
        if !poly_degree.is_power_of_two() || poly_degree < 8 {
            return Err(CkksError::InvalidParams(format!(
                "poly_degree must be a power of 2 and at least 8, got {poly_degree}"
            )));
        }
        if coeff_bits.len() < 2 {
            return Err(CkksError::InvalidParams(
                "need at least one data prime and one special prime".into(),
            ));
        }
        if let Some(&bad) = coeff_bits
            .iter()
            .find(|&&b| !(MIN_PRIME_BITS..=MAX_PRIME_BITS).contains(&b))
        {
            return Err(CkksError::InvalidParams(format!(
                "prime width {bad} outside [{MIN_PRIME_BITS}, {MAX_PRIME_BITS}]"
            )));
        }
        if scale_bits == 0 || scale_bits >= 64 {
            return Err(CkksError::InvalidParams(format!(
                "scale_bits must be in 1..64, got {scale_bits}"
            )));
        }

        let two_n = (2 * poly_degree) as u64;
        let mut used = HashSet::new();
        let mut primes = Vec::with_capacity(coeff_bits.len());
        for &bits in coeff_bits {
            let q = find_ntt_friendly_prime(bits, two_n, &used).ok_or_else(|| {
                CkksError::InvalidParams(format!(
                    "no {bits}-bit NTT-friendly prime left for 2N={two_n}"
                ))
            })?;
            used.insert(q);
            primes.push(Modulus::new(q, bits));
        }
        let special = primes.pop().ok_or_else(|| {
            CkksError::InvalidParams("empty coefficient modulus".into())
        })?;

        Ok(Self::from_primes(poly_degree, primes, special, scale_bits))
    }

    fn from_primes(poly_degree: usize, moduli: Vec<Modulus>, special: Modulus, scale_bits: u32) -> Self {
        Self {
            poly_degree,
            num_slots: poly_degree / 2,
            log_n: poly_degree.trailing_zeros(),
            num_limbs: moduli.len(),
            moduli,
            special,
            scale_bits,
        }
    }

    /// Default scale Δ = 2^scale_bits.
    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    /// Highest chain index; fresh ciphertexts start here.
    pub fn max_level(&self) -> usize {
        self.num_limbs - 1
    }

    /// Data primes active at `level`.
    pub fn moduli_at(&self, level: usize) -> &[Modulus] {
        &self.moduli[..=level]
    }

    /// Total bit size of q_0·…·q_level.
    pub fn modulus_bits_at(&self, level: usize) -> u32 {
        self.moduli_at(level).iter().map(|m| m.bits).sum()
    }

    /// Data primes followed by the special prime, the basis of key-switching keys.
    pub fn key_moduli(&self) -> Vec<Modulus> {
        let mut all = self.moduli.clone();
        all.push(self.special);
        all
    }
}

/// Find the largest `bits`-bit prime q ≡ 1 (mod two_n) not already in `used`.
fn find_ntt_friendly_prime(bits: u32, two_n: u64, used: &HashSet<u64>) -> Option<u64> {
    let upper = (1u64 << bits) - 1;
    let lower = 1u64 << (bits - 1);

    // Largest candidate ≡ 1 mod two_n
    let mut candidate = upper - (upper % two_n) + 1;
    if candidate > upper {
        candidate = candidate.checked_sub(two_n)?;
    }

    while candidate >= lower {
        if !used.contains(&candidate) && is_prime_u64(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_sub(two_n)?;
    }
    None
}

/// Deterministic Miller–Rabin for 64-bit integers.
pub fn is_prime_u64(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &BASES {
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = ((x as u128 * x as u128) % n as u128) as u64;
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_n16384() {
        let p = CkksParams::n16384();
        assert_eq!(p.poly_degree, 16384);
        assert_eq!(p.num_slots, 8192);
        assert_eq!(p.log_n, 14);
        assert_eq!(p.num_limbs, 3);
        assert_eq!(p.max_level(), 2);
        assert_eq!(p.scale_bits, 40);
        assert_eq!(p.special.bits, 60);
    }

    #[test]
    fn test_modulus_ntt_friendly() {
        for n in [8192, 16384, 32768] {
            let p = CkksParams::for_degree(n).unwrap();
            let two_n = (2 * n) as u64;
            for (i, m) in p.key_moduli().iter().enumerate() {
                assert_eq!(
                    m.value % two_n,
                    1,
                    "Modulus {i} ({}) is not NTT-friendly for N={n}",
                    m.value
                );
            }
        }
    }

    #[test]
    fn test_modulus_primality() {
        for n in [8192, 16384, 32768] {
            let p = CkksParams::for_degree(n).unwrap();
            for (i, m) in p.key_moduli().iter().enumerate() {
                assert!(is_prime_u64(m.value), "Modulus {i} ({}) for N={n} is not prime", m.value);
                assert_eq!(64 - m.value.leading_zeros(), m.bits);
            }
        }
    }

    #[test]
    fn test_miller_rabin_small() {
        let primes: Vec<u64> = (0..100).filter(|&n| is_prime_u64(n)).collect();
        assert_eq!(
            primes,
            vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97]
        );
        // Carmichael numbers
        assert!(!is_prime_u64(561));
        assert!(!is_prime_u64(3_215_031_751));
    }

    #[test]
    fn test_custom_params_distinct_primes() {
        let p = CkksParams::new(4096, &[60, 40, 40, 60], 40).unwrap();
        assert_eq!(p.poly_degree, 4096);
        assert_eq!(p.num_slots, 2048);
        assert_eq!(p.num_limbs, 3);
        assert_eq!(p.log_n, 12);

        let all = p.key_moduli();
        let distinct: HashSet<u64> = all.iter().map(|m| m.value).collect();
        assert_eq!(distinct.len(), all.len(), "primes repeat: {all:?}");

        let two_n = (2 * p.poly_degree) as u64;
        for (i, m) in all.iter().enumerate() {
            assert_eq!(m.value % two_n, 1, "Custom modulus {i} is not NTT-friendly");
            assert!(is_prime_u64(m.value));
        }
    }

    #[test]
    fn test_custom_params_rejects_bad_input() {
        assert!(CkksParams::new(1000, &[60, 40, 60], 40).is_err());
        assert!(CkksParams::new(4096, &[60], 40).is_err());
        assert!(CkksParams::new(4096, &[60, 12, 60], 40).is_err());
        assert!(CkksParams::for_degree(4096).is_err());
    }

    #[test]
    fn test_modulus_bits_at_level() {
        let p = CkksParams::n8192();
        assert_eq!(p.modulus_bits_at(0), 60);
        assert_eq!(p.modulus_bits_at(2), 140);
        assert_eq!(p.moduli_at(1).len(), 2);
    }
}
