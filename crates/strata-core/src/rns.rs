//! RNS (Residue Number System) modular arithmetic.
//!
//! All CKKS operations decompose into independent sub-operations on 64-bit
//! residues, one per prime. This module provides the modular primitives and the
//! limb-wise polynomial container used everywhere else.

use crate::params::Modulus;

/// Modular addition: (a + b) mod q.
/// Assumes a, b < q < 2^63.
#[inline(always)]
pub fn mod_add(a: u64, b: u64, q: u64) -> u64 {
    let sum = a + b;
    if sum >= q {
        sum - q
    } else {
        sum
    }
}

/// Modular subtraction: (a - b) mod q.
/// Assumes a, b < q.
#[inline(always)]
pub fn mod_sub(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        q - b + a
    }
}

/// Modular multiplication: (a * b) mod q using a 128-bit intermediate.
#[inline(always)]
pub fn mod_mul(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

/// Reduce a signed integer into [0, q).
#[inline(always)]
pub fn reduce_i64(x: i64, q: u64) -> u64 {
    (x as i128).rem_euclid(q as i128) as u64
}

/// Reduce a signed 128-bit integer into [0, q).
#[inline(always)]
pub fn reduce_i128(x: i128, q: u64) -> u64 {
    x.rem_euclid(q as i128) as u64
}

/// Centered representative of a residue: maps [0, q) to (-q/2, q/2].
#[inline(always)]
pub fn center(x: u64, q: u64) -> i64 {
    if x > q / 2 {
        -((q - x) as i64)
    } else {
        x as i64
    }
}

/// Modular exponentiation: base^exp mod q.
pub fn mod_pow(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut result: u64 = 1 % q;
    base %= q;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, q);
        }
        exp >>= 1;
        base = mod_mul(base, base, q);
    }
    result
}

/// Modular inverse via Fermat's little theorem: a^{q-2} mod q.
/// Requires q prime and a ≢ 0 (mod q).
pub fn mod_inv(a: u64, q: u64) -> u64 {
    debug_assert!(a % q != 0, "Cannot invert zero");
    mod_pow(a, q - 2, q)
}

/// Find a primitive 2N-th root of unity modulo q.
///
/// For NTT on Z_q[X]/(X^N+1) we need ψ with ψ^{2N} ≡ 1 and ψ^N ≡ -1 (mod q).
/// Returns `None` unless q ≡ 1 (mod 2N).
pub fn find_primitive_root(n: usize, q: u64) -> Option<u64> {
    let two_n = (2 * n) as u64;
    if q % two_n != 1 {
        return None;
    }

    // ψ = g^((q-1)/(2N)) is a 2N-th root; it is primitive iff ψ^N = -1.
    let exponent = (q - 1) / two_n;
    (2..q).map(|g| mod_pow(g, exponent, q)).find(|&psi| mod_pow(psi, n as u64, q) == q - 1)
}

/// Powers of ψ in bit-reversed order: twiddles[k] = ψ^{bit_reverse(k)}.
pub fn compute_twiddle_factors(n: usize, psi: u64, q: u64) -> Vec<u64> {
    let log_n = n.trailing_zeros();
    let mut twiddles = vec![0u64; n];
    let mut power = 1u64;
    for i in 0..n {
        twiddles[bit_reverse(i as u32, log_n) as usize] = power;
        power = mod_mul(power, psi, q);
    }
    twiddles
}

/// Powers of ψ^{-1} in bit-reversed order.
pub fn compute_inv_twiddle_factors(n: usize, psi: u64, q: u64) -> Vec<u64> {
    compute_twiddle_factors(n, mod_inv(psi, q), q)
}

/// Bit-reverse an integer of given bit width.
#[inline]
pub fn bit_reverse(mut x: u32, bits: u32) -> u32 {
    let mut result = 0u32;
    for _ in 0..bits {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}

/// An RNS polynomial: one coefficient vector per modulus.
///
/// The container does not track its domain; callers keep ciphertext and
/// plaintext polynomials in NTT form and convert explicitly when they need
/// coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsPoly {
    /// Coefficients for each RNS limb: limbs[l][i] = coefficient i mod q_l.
    pub limbs: Vec<Vec<u64>>,
    /// Polynomial degree N.
    pub n: usize,
}

impl RnsPoly {
    /// Create a zero polynomial with `num_limbs` limbs of N coefficients each.
    pub fn zero(n: usize, num_limbs: usize) -> Self {
        Self {
            limbs: vec![vec![0u64; n]; num_limbs],
            n,
        }
    }

    /// Reduce signed coefficients into every modulus of `moduli`.
    ///
    /// The same integer polynomial is represented consistently across limbs,
    /// which is required for error and secret polynomials.
    pub fn from_signed(coeffs: &[i64], moduli: &[Modulus]) -> Self {
        let limbs = moduli
            .iter()
            .map(|m| coeffs.iter().map(|&c| reduce_i64(c, m.value)).collect())
            .collect();
        Self {
            limbs,
            n: coeffs.len(),
        }
    }

    /// Number of limbs.
    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    /// Chain index represented by the limb count.
    pub fn level(&self) -> usize {
        self.limbs.len().saturating_sub(1)
    }

    /// Drop limbs beyond `level`.
    pub fn truncate(&mut self, level: usize) {
        self.limbs.truncate(level + 1);
    }

    /// Copy of the first `level + 1` limbs.
    pub fn truncated(&self, level: usize) -> Self {
        Self {
            limbs: self.limbs[..=level].to_vec(),
            n: self.n,
        }
    }

    /// Element-wise addition of two RNS polynomials.
    pub fn add(&self, other: &Self, moduli: &[Modulus]) -> Self {
        let mut result = self.clone();
        result.add_assign(other, moduli);
        result
    }

    /// In-place element-wise addition.
    pub fn add_assign(&mut self, other: &Self, moduli: &[Modulus]) {
        debug_assert_eq!(self.n, other.n);
        debug_assert_eq!(self.limbs.len(), other.limbs.len());
        for ((dst, src), m) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = mod_add(*d, s, m.value);
            }
        }
    }

    /// Element-wise subtraction of two RNS polynomials.
    pub fn sub(&self, other: &Self, moduli: &[Modulus]) -> Self {
        let mut result = self.clone();
        result.sub_assign(other, moduli);
        result
    }

    /// In-place element-wise subtraction.
    pub fn sub_assign(&mut self, other: &Self, moduli: &[Modulus]) {
        debug_assert_eq!(self.n, other.n);
        debug_assert_eq!(self.limbs.len(), other.limbs.len());
        for ((dst, src), m) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = mod_sub(*d, s, m.value);
            }
        }
    }

    /// Element-wise (Hadamard) multiplication, used for NTT-domain products.
    pub fn hadamard_mul(&self, other: &Self, moduli: &[Modulus]) -> Self {
        let mut result = self.clone();
        result.hadamard_mul_assign(other, moduli);
        result
    }

    /// In-place Hadamard product.
    pub fn hadamard_mul_assign(&mut self, other: &Self, moduli: &[Modulus]) {
        debug_assert_eq!(self.n, other.n);
        debug_assert_eq!(self.limbs.len(), other.limbs.len());
        for ((dst, src), m) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = mod_mul(*d, s, m.value);
            }
        }
    }

    /// Accumulate `a ⊙ b` into `self`.
    pub fn fma_assign(&mut self, a: &Self, b: &Self, moduli: &[Modulus]) {
        for (l, m) in moduli.iter().enumerate().take(self.limbs.len()) {
            let q = m.value;
            for i in 0..self.n {
                let prod = mod_mul(a.limbs[l][i], b.limbs[l][i], q);
                self.limbs[l][i] = mod_add(self.limbs[l][i], prod, q);
            }
        }
    }

    /// Multiply limb l by `scalars[l]`.
    pub fn scalar_mul_assign(&mut self, scalars: &[u64], moduli: &[Modulus]) {
        for ((limb, &s), m) in self.limbs.iter_mut().zip(scalars).zip(moduli) {
            for c in limb.iter_mut() {
                *c = mod_mul(*c, s, m.value);
            }
        }
    }

    /// Negate all coefficients: result[i] = -self[i] mod q.
    pub fn negate(&self, moduli: &[Modulus]) -> Self {
        let mut result = self.clone();
        result.negate_assign(moduli);
        result
    }

    /// In-place negation.
    pub fn negate_assign(&mut self, moduli: &[Modulus]) {
        for (limb, m) in self.limbs.iter_mut().zip(moduli) {
            for c in limb.iter_mut() {
                if *c != 0 {
                    *c = m.value - *c;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_add() {
        let q = 17u64;
        assert_eq!(mod_add(5, 7, q), 12);
        assert_eq!(mod_add(10, 10, q), 3);
        assert_eq!(mod_add(0, 0, q), 0);
        assert_eq!(mod_add(16, 1, q), 0);
    }

    #[test]
    fn test_mod_sub() {
        let q = 17u64;
        assert_eq!(mod_sub(10, 3, q), 7);
        assert_eq!(mod_sub(3, 10, q), 10); // -7 mod 17
        assert_eq!(mod_sub(0, 0, q), 0);
    }

    #[test]
    fn test_mod_mul_and_pow() {
        let q = 17u64;
        assert_eq!(mod_mul(5, 4, q), 3);
        assert_eq!(mod_pow(2, 0, q), 1);
        assert_eq!(mod_pow(2, 4, q), 16);
        assert_eq!(mod_pow(3, 16, q), 1); // Fermat
    }

    #[test]
    fn test_mod_inv() {
        let q = 17u64;
        for a in 1..q {
            let inv = mod_inv(a, q);
            assert_eq!(mod_mul(a, inv, q), 1, "Inverse of {a} mod {q} failed");
        }
    }

    #[test]
    fn test_center_and_reduce() {
        let q = 17u64;
        assert_eq!(center(16, q), -1);
        assert_eq!(center(8, q), 8);
        assert_eq!(center(9, q), -8);
        assert_eq!(reduce_i64(-1, q), 16);
        assert_eq!(reduce_i64(-35, q), 16);
        assert_eq!(reduce_i128(1 << 70, q), mod_pow(2, 70, q));
    }

    #[test]
    fn test_bit_reverse() {
        assert_eq!(bit_reverse(0b0000, 4), 0b0000);
        assert_eq!(bit_reverse(0b0001, 4), 0b1000);
        assert_eq!(bit_reverse(0b0110, 4), 0b0110);
        assert_eq!(bit_reverse(0b1010, 4), 0b0101);
    }

    #[test]
    fn test_primitive_root() {
        // N=4, q=17 (17 ≡ 1 mod 8)
        let psi = find_primitive_root(4, 17).unwrap();
        assert_eq!(mod_pow(psi, 8, 17), 1);
        assert_eq!(mod_pow(psi, 4, 17), 16);
        assert!(find_primitive_root(4, 19).is_none());
    }

    #[test]
    fn test_primitive_root_large() {
        use crate::params::CkksParams;
        let params = CkksParams::n8192();
        let q = params.moduli[0].value;
        let n = params.poly_degree;
        let psi = find_primitive_root(n, q).unwrap();
        assert_eq!(mod_pow(psi, (2 * n) as u64, q), 1);
        assert_eq!(mod_pow(psi, n as u64, q), q - 1);
    }

    #[test]
    fn test_rns_poly_from_signed_consistent() {
        let moduli = [Modulus::new(17, 5), Modulus::new(97, 7)];
        let p = RnsPoly::from_signed(&[-1, 0, 5, -20], &moduli);
        assert_eq!(p.limbs[0], vec![16, 0, 5, 14]);
        assert_eq!(p.limbs[1], vec![96, 0, 5, 77]);
        assert_eq!(p.level(), 1);
    }

    #[test]
    fn test_rns_poly_arith() {
        let moduli = [Modulus::new(17, 5), Modulus::new(97, 7)];
        let a = RnsPoly::from_signed(&[1, 2, 3, 4], &moduli);
        let b = RnsPoly::from_signed(&[16, 6, 7, 8], &moduli);

        let c = a.add(&b, &moduli);
        assert_eq!(c.limbs[0], vec![0, 8, 10, 12]);
        assert_eq!(c.limbs[1], vec![17, 8, 10, 12]);

        let d = c.sub(&b, &moduli);
        assert_eq!(d, a);

        let neg = a.negate(&moduli);
        assert_eq!(neg.add(&a, &moduli), RnsPoly::zero(4, 2));

        let mut acc = RnsPoly::zero(4, 2);
        acc.fma_assign(&a, &b, &moduli);
        assert_eq!(acc, a.hadamard_mul(&b, &moduli));

        let mut t = a.clone();
        t.truncate(0);
        assert_eq!(t.num_limbs(), 1);
        assert_eq!(a.truncated(0), t);
    }
}
