//! CKKS ciphertext structure and primitive operations.
//!
//! A CKKS ciphertext is a tuple (c0, c1[, c2]) of RNS polynomials in the NTT
//! domain, decrypting to c0 + c1·s (+ c2·s²). Its level is the index of the last
//! data prime it still carries.
//!
//! Operations:
//! - encode/decode, encrypt(pt, pk), decrypt(ct, sk)
//! - ct ± ct, ct ± pt, ct × ct (three components), ct × pt
//! - relinearize, rescale_to_next, mod_switch_to, rotate
//!
//! These primitives never adjust scales or levels on their own; operands that
//! disagree are rejected.

use rand::Rng;

use crate::encoding::CkksEncoder;
use crate::error::{CkksError, CkksResult};
use crate::keys::{PublicKey, SecretKey};
use crate::ntt::{negacyclic_ntt_forward, negacyclic_ntt_inverse, NttTables};
use crate::params::{CkksParams, Modulus};
use crate::rns::{center, mod_inv, mod_mul, mod_sub, reduce_i64, RnsPoly};
use crate::sampling::{sample_gaussian_signed, sample_ternary, ERROR_STD_DEV};

/// Relative tolerance under which two scales are treated as equal.
pub const SCALE_TOLERANCE: f64 = 1e-9;

/// Relative floating-point comparison of two scales: |a-b| ≤ ε·max(|a|,|b|,1).
pub fn scales_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= SCALE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// A CKKS ciphertext in NTT domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Ciphertext {
    /// First component c0.
    pub c0: RnsPoly,
    /// Second component c1.
    pub c1: RnsPoly,
    /// Quadratic component left by ct × ct until relinearization.
    pub c2: Option<RnsPoly>,
    /// Current scale factor.
    pub scale: f64,
}

impl Ciphertext {
    /// Chain index of this ciphertext.
    pub fn level(&self) -> usize {
        self.c0.level()
    }

    /// Number of polynomial components (2, or 3 before relinearization).
    pub fn size(&self) -> usize {
        if self.c2.is_some() {
            3
        } else {
            2
        }
    }

    /// Polynomial degree N.
    pub fn poly_degree(&self) -> usize {
        self.c0.n
    }

    fn components_mut(&mut self) -> impl Iterator<Item = &mut RnsPoly> {
        [&mut self.c0, &mut self.c1].into_iter().chain(self.c2.as_mut())
    }
}

/// An encoded plaintext in NTT domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Plaintext {
    /// Encoded polynomial.
    pub poly: RnsPoly,
    /// Scale the values were encoded at.
    pub scale: f64,
}

impl Plaintext {
    /// Chain index this plaintext was encoded for.
    pub fn level(&self) -> usize {
        self.poly.level()
    }
}

/// Parameter set plus pre-computed NTT tables and encoder.
#[derive(Debug, Clone)]
pub struct CkksContext {
    /// Parameter set.
    pub params: CkksParams,
    /// NTT tables, one per data prime.
    pub ntt_tables: Vec<NttTables>,
    /// NTT tables for the special prime.
    pub special_tables: NttTables,
    /// Encoder.
    pub encoder: CkksEncoder,
}

impl CkksContext {
    /// Create a new CKKS context with pre-computed NTT tables.
    pub fn new(params: CkksParams) -> CkksResult<Self> {
        let ntt_tables = params
            .moduli
            .iter()
            .map(|m| NttTables::new(params.poly_degree, m.value))
            .collect::<CkksResult<Vec<_>>>()?;
        let special_tables = NttTables::new(params.poly_degree, params.special.value)?;
        let encoder = CkksEncoder::new(&params);

        Ok(Self {
            params,
            ntt_tables,
            special_tables,
            encoder,
        })
    }

    /// Number of slots per plaintext.
    pub fn num_slots(&self) -> usize {
        self.params.num_slots
    }

    /// Highest chain index.
    pub fn max_level(&self) -> usize {
        self.params.max_level()
    }

    /// Data primes active at `level`.
    pub fn moduli_at(&self, level: usize) -> &[Modulus] {
        self.params.moduli_at(level)
    }

    /// NTT tables for limb `i` of a key-switching basis (data primes, then P).
    pub(crate) fn key_tables(&self, i: usize) -> &NttTables {
        self.ntt_tables.get(i).unwrap_or(&self.special_tables)
    }

    /// Forward NTT on every limb of a data-prime polynomial.
    pub fn to_ntt(&self, poly: &mut RnsPoly) {
        for (limb, tables) in poly.limbs.iter_mut().zip(&self.ntt_tables) {
            negacyclic_ntt_forward(limb, tables);
        }
    }

    /// Inverse NTT on every limb of a data-prime polynomial.
    pub fn from_ntt(&self, poly: &mut RnsPoly) {
        for (limb, tables) in poly.limbs.iter_mut().zip(&self.ntt_tables) {
            negacyclic_ntt_inverse(limb, tables);
        }
    }

    fn check_level(&self, level: usize) -> CkksResult<()> {
        if level > self.max_level() {
            return Err(CkksError::InvalidLevel {
                from: self.max_level(),
                to: level,
            });
        }
        Ok(())
    }

    /// Encode real values at `scale` for chain index `level`.
    pub fn encode(&self, z: &[f64], scale: f64, level: usize) -> CkksResult<Plaintext> {
        self.check_level(level)?;
        let mut poly = self.encoder.encode(z, scale, self.moduli_at(level))?;
        self.to_ntt(&mut poly);
        Ok(Plaintext { poly, scale })
    }

    /// Decode a plaintext to all of its slot values.
    pub fn decode(&self, pt: &Plaintext) -> Vec<f64> {
        let mut poly = pt.poly.clone();
        self.from_ntt(&mut poly);
        self.encoder.decode(&poly, self.moduli_at(pt.level()), pt.scale)
    }

    /// Public-key encryption at the plaintext's level.
    ///
    ///   u ← ternary, e0, e1 ← Gaussian
    ///   c0 = b·u + e0 + m,  c1 = a·u + e1
    pub fn encrypt<R: Rng + ?Sized>(
        &self,
        pt: &Plaintext,
        pk: &PublicKey,
        rng: &mut R,
    ) -> CkksResult<Ciphertext> {
        let level = pt.level();
        self.check_level(level)?;
        let n = self.params.poly_degree;
        let moduli = self.moduli_at(level);

        let mut u = RnsPoly::from_signed(&sample_ternary(rng, n), moduli);
        let mut e0 = RnsPoly::from_signed(&sample_gaussian_signed(rng, n, ERROR_STD_DEV), moduli);
        let mut e1 = RnsPoly::from_signed(&sample_gaussian_signed(rng, n, ERROR_STD_DEV), moduli);
        self.to_ntt(&mut u);
        self.to_ntt(&mut e0);
        self.to_ntt(&mut e1);

        let mut c0 = pk.b.truncated(level).hadamard_mul(&u, moduli);
        c0.add_assign(&e0, moduli);
        c0.add_assign(&pt.poly, moduli);

        let mut c1 = pk.a.truncated(level).hadamard_mul(&u, moduli);
        c1.add_assign(&e1, moduli);

        Ok(Ciphertext {
            c0,
            c1,
            c2: None,
            scale: pt.scale,
        })
    }

    /// Decrypt: m = c0 + c1·s (+ c2·s²), still encoded.
    pub fn decrypt(&self, ct: &Ciphertext, sk: &SecretKey) -> Plaintext {
        let level = ct.level();
        let moduli = self.moduli_at(level);
        let s = sk.s_ntt.truncated(level);

        let mut m = ct.c0.clone();
        m.fma_assign(&ct.c1, &s, moduli);
        if let Some(c2) = &ct.c2 {
            let s2 = s.hadamard_mul(&s, moduli);
            m.fma_assign(c2, &s2, moduli);
        }

        Plaintext {
            poly: m,
            scale: ct.scale,
        }
    }

    fn check_aligned(&self, lhs_level: usize, lhs_scale: f64, rhs_level: usize, rhs_scale: f64) -> CkksResult<()> {
        if lhs_level != rhs_level {
            return Err(CkksError::LevelMismatch {
                lhs: lhs_level,
                rhs: rhs_level,
            });
        }
        if !scales_close(lhs_scale, rhs_scale) {
            return Err(CkksError::ScaleMismatch {
                lhs: lhs_scale,
                rhs: rhs_scale,
            });
        }
        Ok(())
    }

    /// ct + ct.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let mut result = a.clone();
        self.add_inplace(&mut result, b)?;
        Ok(result)
    }

    /// In-place ct + ct.
    pub fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> CkksResult<()> {
        self.check_aligned(a.level(), a.scale, b.level(), b.scale)?;
        let moduli = self.moduli_at(a.level());
        a.c0.add_assign(&b.c0, moduli);
        a.c1.add_assign(&b.c1, moduli);
        match (&mut a.c2, &b.c2) {
            (Some(x), Some(y)) => x.add_assign(y, moduli),
            (None, Some(y)) => a.c2 = Some(y.clone()),
            _ => {}
        }
        Ok(())
    }

    /// ct - ct.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let mut result = a.clone();
        self.sub_inplace(&mut result, b)?;
        Ok(result)
    }

    /// In-place ct - ct.
    pub fn sub_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> CkksResult<()> {
        self.check_aligned(a.level(), a.scale, b.level(), b.scale)?;
        let moduli = self.moduli_at(a.level());
        a.c0.sub_assign(&b.c0, moduli);
        a.c1.sub_assign(&b.c1, moduli);
        match (&mut a.c2, &b.c2) {
            (Some(x), Some(y)) => x.sub_assign(y, moduli),
            (None, Some(y)) => a.c2 = Some(y.negate(moduli)),
            _ => {}
        }
        Ok(())
    }

    /// In-place ct + pt.
    pub fn add_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> CkksResult<()> {
        self.check_aligned(ct.level(), ct.scale, pt.level(), pt.scale)?;
        ct.c0.add_assign(&pt.poly, self.moduli_at(ct.level()));
        Ok(())
    }

    /// In-place ct - pt.
    pub fn sub_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> CkksResult<()> {
        self.check_aligned(ct.level(), ct.scale, pt.level(), pt.scale)?;
        ct.c0.sub_assign(&pt.poly, self.moduli_at(ct.level()));
        Ok(())
    }

    /// In-place negation.
    pub fn negate_inplace(&self, ct: &mut Ciphertext) {
        let moduli = self.moduli_at(ct.level());
        for poly in ct.components_mut() {
            poly.negate_assign(moduli);
        }
    }

    /// ct × ct without relinearization: (a0·b0, a0·b1 + a1·b0, a1·b1).
    /// The result scale is the product of both scales.
    pub fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> CkksResult<Ciphertext> {
        let mut result = a.clone();
        self.multiply_inplace(&mut result, b)?;
        Ok(result)
    }

    /// In-place ct × ct without relinearization.
    pub fn multiply_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> CkksResult<()> {
        for ct in [&*a, b] {
            if ct.size() != 2 {
                return Err(CkksError::InvalidCiphertextSize {
                    size: ct.size(),
                    op: "multiply",
                });
            }
        }
        if a.level() != b.level() {
            return Err(CkksError::LevelMismatch {
                lhs: a.level(),
                rhs: b.level(),
            });
        }
        let moduli = self.moduli_at(a.level());

        let d0 = a.c0.hadamard_mul(&b.c0, moduli);
        let mut d1 = a.c0.hadamard_mul(&b.c1, moduli);
        d1.fma_assign(&a.c1, &b.c0, moduli);
        let d2 = a.c1.hadamard_mul(&b.c1, moduli);

        a.c0 = d0;
        a.c1 = d1;
        a.c2 = Some(d2);
        a.scale *= b.scale;
        Ok(())
    }

    /// In-place ct × pt. The result scale is the product of both scales.
    pub fn multiply_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> CkksResult<()> {
        if ct.level() != pt.level() {
            return Err(CkksError::LevelMismatch {
                lhs: ct.level(),
                rhs: pt.level(),
            });
        }
        let moduli = self.moduli_at(ct.level());
        for poly in ct.components_mut() {
            poly.hadamard_mul_assign(&pt.poly, moduli);
        }
        ct.scale *= pt.scale;
        Ok(())
    }

    /// Divide a polynomial by its last limb's prime with centered rounding and
    /// drop that limb. `last_tables` selects the prime of the last limb.
    ///
    /// c_i' = (c_i - [c_last]_centered mod q_i) · q_last^{-1}   (NTT domain)
    pub(crate) fn divide_round_by_last(&self, poly: &mut RnsPoly, last_tables: &NttTables) {
        let Some(mut last) = poly.limbs.pop() else {
            return;
        };
        let q_last = last_tables.q;
        negacyclic_ntt_inverse(&mut last, last_tables);
        let signed: Vec<i64> = last.iter().map(|&c| center(c, q_last)).collect();

        for (limb, tables) in poly.limbs.iter_mut().zip(&self.ntt_tables) {
            let q = tables.q;
            let mut t: Vec<u64> = signed.iter().map(|&c| reduce_i64(c, q)).collect();
            negacyclic_ntt_forward(&mut t, tables);
            let inv = mod_inv(q_last % q, q);
            for (c, &r) in limb.iter_mut().zip(&t) {
                *c = mod_mul(mod_sub(*c, r, q), inv, q);
            }
        }
    }

    /// Rescale: divide by the last prime q_ℓ, moving to level ℓ-1.
    pub fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> CkksResult<()> {
        let level = ct.level();
        if level == 0 {
            return Err(CkksError::InvalidLevel { from: 0, to: 0 });
        }
        let tables = &self.ntt_tables[level];
        let q_last = tables.q;
        for poly in ct.components_mut() {
            self.divide_round_by_last(poly, tables);
        }
        ct.scale /= q_last as f64;
        Ok(())
    }

    /// Modulus switch: drop primes down to `level`. Scale is unchanged.
    pub fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, level: usize) -> CkksResult<()> {
        let from = ct.level();
        if level > from {
            return Err(CkksError::InvalidLevel { from, to: level });
        }
        for poly in ct.components_mut() {
            poly.truncate(level);
        }
        Ok(())
    }

    /// The data prime that a rescale at `level` divides by.
    pub fn prime_at(&self, level: usize) -> Option<u64> {
        self.params.moduli.get(level).map(|m| m.value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub(crate) fn make_ctx_and_keys() -> (CkksContext, SecretKey, PublicKey, StdRng) {
        let params = CkksParams::new(2048, &[60, 40, 40, 60], 40).unwrap();
        let ctx = CkksContext::new(params).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let sk = ctx.keygen(&mut rng);
        let pk = ctx.keygen_public(&sk, &mut rng);
        (ctx, sk, pk, rng)
    }

    pub(crate) fn assert_close(decoded: &[f64], expected: &[f64], tol: f64) {
        for (i, &e) in expected.iter().enumerate() {
            let err = (decoded[i] - e).abs();
            assert!(
                err < tol,
                "Slot {i}: decoded={}, expected={e}, error={err}",
                decoded[i]
            );
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let z: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let pt = ctx.encode(&z, ctx.params.default_scale(), ctx.max_level()).unwrap();
        let ct = ctx.encrypt(&pt, &pk, &mut rng).unwrap();
        assert_eq!(ct.level(), 2);

        let decoded = ctx.decode(&ctx.decrypt(&ct, &sk));
        assert_close(&decoded, &z, 1e-4);
    }

    #[test]
    fn test_encrypt_at_lower_level() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let z = [1.0, -2.0, 3.0];
        let pt = ctx.encode(&z, ctx.params.default_scale(), 0).unwrap();
        let ct = ctx.encrypt(&pt, &pk, &mut rng).unwrap();
        assert_eq!(ct.level(), 0);
        assert_close(&ctx.decode(&ctx.decrypt(&ct, &sk)), &z, 1e-4);
    }

    #[test]
    fn test_add_and_sub() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let scale = ctx.params.default_scale();
        let x = [2.0, 1.0, 34.0, 45.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        let cx = ctx.encrypt(&ctx.encode(&x, scale, 2).unwrap(), &pk, &mut rng).unwrap();
        let cy = ctx.encrypt(&ctx.encode(&y, scale, 2).unwrap(), &pk, &mut rng).unwrap();

        let sum = ctx.add(&cx, &cy).unwrap();
        assert_close(&ctx.decode(&ctx.decrypt(&sum, &sk)), &[3.0, 3.0, 37.0, 49.0], 1e-4);

        let diff = ctx.sub(&cx, &cy).unwrap();
        assert_close(&ctx.decode(&ctx.decrypt(&diff, &sk)), &[1.0, -1.0, 31.0, 41.0], 1e-4);

        let mut with_plain = cx.clone();
        ctx.add_plain_inplace(&mut with_plain, &ctx.encode(&y, scale, 2).unwrap()).unwrap();
        assert_close(&ctx.decode(&ctx.decrypt(&with_plain, &sk)), &[3.0, 3.0, 37.0, 49.0], 1e-4);
    }

    #[test]
    fn test_mismatched_operands_rejected() {
        let (ctx, _sk, pk, mut rng) = make_ctx_and_keys();
        let scale = ctx.params.default_scale();
        let a = ctx.encrypt(&ctx.encode(&[1.0], scale, 2).unwrap(), &pk, &mut rng).unwrap();
        let b = ctx.encrypt(&ctx.encode(&[1.0], scale, 1).unwrap(), &pk, &mut rng).unwrap();
        let c = ctx.encrypt(&ctx.encode(&[1.0], scale * 2.0, 2).unwrap(), &pk, &mut rng).unwrap();

        assert!(matches!(ctx.add(&a, &b), Err(CkksError::LevelMismatch { lhs: 2, rhs: 1 })));
        assert!(matches!(ctx.add(&a, &c), Err(CkksError::ScaleMismatch { .. })));
    }

    #[test]
    fn test_ct_pt_multiply_and_rescale() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let scale = ctx.params.default_scale();
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let p = [0.5, -1.0, 2.0, 0.25, 3.0];

        let mut ct = ctx.encrypt(&ctx.encode(&x, scale, 2).unwrap(), &pk, &mut rng).unwrap();
        ctx.multiply_plain_inplace(&mut ct, &ctx.encode(&p, scale, 2).unwrap()).unwrap();
        assert_eq!(ct.scale, scale * scale);

        ctx.rescale_to_next_inplace(&mut ct).unwrap();
        assert_eq!(ct.level(), 1);
        let q2 = ctx.prime_at(2).unwrap() as f64;
        assert!(scales_close(ct.scale, scale * scale / q2));

        let expected: Vec<f64> = x.iter().zip(&p).map(|(a, b)| a * b).collect();
        assert_close(&ctx.decode(&ctx.decrypt(&ct, &sk)), &expected, 1e-3);
    }

    #[test]
    fn test_ct_ct_multiply_without_relin_decrypts() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let scale = ctx.params.default_scale();
        let x = [2.0, 1.0, 34.0, 45.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        let cx = ctx.encrypt(&ctx.encode(&x, scale, 2).unwrap(), &pk, &mut rng).unwrap();
        let cy = ctx.encrypt(&ctx.encode(&y, scale, 2).unwrap(), &pk, &mut rng).unwrap();

        let mut prod = ctx.multiply(&cx, &cy).unwrap();
        assert_eq!(prod.size(), 3);
        ctx.rescale_to_next_inplace(&mut prod).unwrap();
        assert_close(&ctx.decode(&ctx.decrypt(&prod, &sk)), &[2.0, 2.0, 102.0, 180.0], 1e-2);
    }

    #[test]
    fn test_mod_switch_keeps_scale() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let scale = ctx.params.default_scale();
        let z = [7.0, -8.0];
        let mut ct = ctx.encrypt(&ctx.encode(&z, scale, 2).unwrap(), &pk, &mut rng).unwrap();

        ctx.mod_switch_to_inplace(&mut ct, 0).unwrap();
        assert_eq!(ct.level(), 0);
        assert_eq!(ct.scale, scale);
        assert_close(&ctx.decode(&ctx.decrypt(&ct, &sk)), &z, 1e-4);

        assert!(ctx.mod_switch_to_inplace(&mut ct, 1).is_err());
        assert!(ctx.rescale_to_next_inplace(&mut ct).is_err());
    }

    #[test]
    fn test_scales_close() {
        assert!(scales_close(2f64.powi(40), 2f64.powi(40) * (1.0 + 1e-12)));
        assert!(!scales_close(2f64.powi(40), 2f64.powi(40) * (1.0 + 1e-6)));
        assert!(scales_close(0.0, 1e-12));
    }
}
