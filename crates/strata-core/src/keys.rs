//! Key material and hybrid key switching.
//!
//! Key-switching keys live over the extended basis q_0·…·q_L·P. For a source
//! key s' the key holds one RLWE pair per data prime j:
//!
//!   b_j = -a_j·s + e_j + P·s'·[j]     a_j ← uniform
//!
//! where `[j]` means the P·s' term is added on limb j only. Switching a
//! polynomial d at level ℓ decomposes it into its RNS digits [d]_{q_j}, forms
//! Σ_j [d]_{q_j}·(b_j, a_j) over q_0..q_ℓ and P, then divides by P. The result
//! (r0, r1) satisfies r0 + r1·s ≈ d·s'.
//!
//! Relinearization switches s² → s; a rotation by Galois element g switches
//! τ_g(s) → s after applying X → X^g to the ciphertext.

use std::collections::BTreeMap;
use std::iter;

use rand::Rng;

use crate::ciphertext::{Ciphertext, CkksContext};
use crate::encoding::SLOT_GENERATOR;
use crate::error::{CkksError, CkksResult};
use crate::ntt::{negacyclic_ntt_forward, negacyclic_ntt_inverse};
use crate::params::Modulus;
use crate::rns::{center, mod_add, mod_mul, mod_pow, reduce_i64, RnsPoly};
use crate::sampling::{sample_gaussian_signed, sample_ternary, sample_uniform, ERROR_STD_DEV};

/// Secret key: ternary polynomial s ∈ {-1, 0, 1}^N.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretKey {
    /// Signed coefficients of s.
    pub coeffs: Vec<i64>,
    /// s in NTT domain over the data primes followed by the special prime.
    pub s_ntt: RnsPoly,
}

/// Public key (b, a) = (-a·s + e, a) over the data primes, NTT domain.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    /// b = -a·s + e.
    pub b: RnsPoly,
    /// Uniform a.
    pub a: RnsPoly,
}

/// One RLWE pair per data prime over the extended basis, NTT domain.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySwitchKey {
    /// b_j components.
    pub b: Vec<RnsPoly>,
    /// a_j components.
    pub a: Vec<RnsPoly>,
}

/// Relinearization key: switches s² → s.
#[derive(Debug, Clone, PartialEq)]
pub struct RelinKey(pub KeySwitchKey);

/// Rotation keys indexed by Galois element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaloisKeys {
    keys: BTreeMap<usize, KeySwitchKey>,
}

impl GaloisKeys {
    /// Key for Galois element `g`, if generated.
    pub fn get(&self, g: usize) -> Option<&KeySwitchKey> {
        self.keys.get(&g)
    }

    /// Whether a key for `g` exists.
    pub fn contains(&self, g: usize) -> bool {
        self.keys.contains_key(&g)
    }

    /// Galois elements with keys, ascending.
    pub fn elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.keys().copied()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no keys were generated.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add or replace the key for `g`.
    pub fn insert(&mut self, g: usize, key: KeySwitchKey) {
        self.keys.insert(g, key);
    }
}

/// Galois element 5^k mod 2N that rotates slots left by `step`.
/// Negative steps rotate right.
pub fn galois_element_for_step(step: i64, poly_degree: usize) -> usize {
    let slots = (poly_degree / 2) as i64;
    let k = step.rem_euclid(slots) as u64;
    mod_pow(SLOT_GENERATOR as u64, k, 2 * poly_degree as u64) as usize
}

/// Apply X → X^g to signed coefficients.
pub fn apply_galois_signed(coeffs: &[i64], g: usize) -> Vec<i64> {
    let n = coeffs.len();
    let two_n = 2 * n;
    let mut out = vec![0i64; n];
    for (i, &c) in coeffs.iter().enumerate() {
        let idx = (i * g) % two_n;
        if idx < n {
            out[idx] = c;
        } else {
            out[idx - n] = -c;
        }
    }
    out
}

/// Apply X → X^g to one coefficient-domain limb modulo q.
pub fn apply_galois_limb(limb: &[u64], g: usize, q: u64) -> Vec<u64> {
    let n = limb.len();
    let two_n = 2 * n;
    let mut out = vec![0u64; n];
    for (i, &c) in limb.iter().enumerate() {
        let idx = (i * g) % two_n;
        if idx < n {
            out[idx] = c;
        } else {
            out[idx - n] = if c == 0 { 0 } else { q - c };
        }
    }
    out
}

impl CkksContext {
    fn check_galois_element(&self, g: usize) -> CkksResult<()> {
        let two_n = 2 * self.params.poly_degree;
        if g % 2 == 0 || g >= two_n {
            return Err(CkksError::InvalidGaloisElement(g));
        }
        Ok(())
    }

    /// Lift signed coefficients onto the extended basis in NTT domain.
    fn lift_key_basis(&self, coeffs: &[i64], key_moduli: &[Modulus]) -> RnsPoly {
        let mut poly = RnsPoly::from_signed(coeffs, key_moduli);
        for (i, limb) in poly.limbs.iter_mut().enumerate() {
            negacyclic_ntt_forward(limb, self.key_tables(i));
        }
        poly
    }

    /// Generate a ternary secret key.
    pub fn keygen<R: Rng + ?Sized>(&self, rng: &mut R) -> SecretKey {
        let coeffs = sample_ternary(rng, self.params.poly_degree);
        let s_ntt = self.lift_key_basis(&coeffs, &self.params.key_moduli());
        SecretKey { coeffs, s_ntt }
    }

    /// Rebuild a secret key from its signed coefficients.
    pub fn secret_key_from_coeffs(&self, coeffs: Vec<i64>) -> CkksResult<SecretKey> {
        if coeffs.len() != self.params.poly_degree || coeffs.iter().any(|c| c.abs() > 1) {
            return Err(CkksError::Deserialize(
                "secret key must have N ternary coefficients".into(),
            ));
        }
        let s_ntt = self.lift_key_basis(&coeffs, &self.params.key_moduli());
        Ok(SecretKey { coeffs, s_ntt })
    }

    /// Generate a public key (b, a) = (-a·s + e, a) over the data primes.
    pub fn keygen_public<R: Rng + ?Sized>(&self, sk: &SecretKey, rng: &mut R) -> PublicKey {
        let n = self.params.poly_degree;
        let moduli = &self.params.moduli;

        let a = RnsPoly {
            limbs: moduli.iter().map(|m| sample_uniform(rng, n, m.value)).collect(),
            n,
        };
        let mut e = RnsPoly::from_signed(&sample_gaussian_signed(rng, n, ERROR_STD_DEV), moduli);
        self.to_ntt(&mut e);

        let s = sk.s_ntt.truncated(self.max_level());
        let b = e.sub(&a.hadamard_mul(&s, moduli), moduli);
        PublicKey { b, a }
    }

    /// Key switching key from `source_ntt` (extended basis, NTT domain) to `sk`.
    pub fn keygen_switch<R: Rng + ?Sized>(
        &self,
        sk: &SecretKey,
        source_ntt: &RnsPoly,
        rng: &mut R,
    ) -> KeySwitchKey {
        let n = self.params.poly_degree;
        let key_moduli = self.params.key_moduli();
        let p = self.params.special.value;

        let mut b_parts = Vec::with_capacity(self.params.num_limbs);
        let mut a_parts = Vec::with_capacity(self.params.num_limbs);
        for j in 0..self.params.num_limbs {
            // Uniform in NTT domain is uniform in coefficient domain.
            let a = RnsPoly {
                limbs: key_moduli.iter().map(|m| sample_uniform(rng, n, m.value)).collect(),
                n,
            };
            let e = self.lift_key_basis(&sample_gaussian_signed(rng, n, ERROR_STD_DEV), &key_moduli);
            let mut b = e.sub(&a.hadamard_mul(&sk.s_ntt, &key_moduli), &key_moduli);

            let qj = key_moduli[j].value;
            let p_mod_qj = p % qj;
            for (dst, &src) in b.limbs[j].iter_mut().zip(&source_ntt.limbs[j]) {
                *dst = mod_add(*dst, mod_mul(src, p_mod_qj, qj), qj);
            }

            b_parts.push(b);
            a_parts.push(a);
        }
        KeySwitchKey {
            b: b_parts,
            a: a_parts,
        }
    }

    /// Relinearization key (s² → s).
    pub fn keygen_relin<R: Rng + ?Sized>(&self, sk: &SecretKey, rng: &mut R) -> RelinKey {
        let s2 = sk.s_ntt.hadamard_mul(&sk.s_ntt, &self.params.key_moduli());
        RelinKey(self.keygen_switch(sk, &s2, rng))
    }

    /// Rotation keys (τ_g(s) → s) for each Galois element.
    pub fn keygen_galois<R: Rng + ?Sized>(
        &self,
        sk: &SecretKey,
        elements: &[usize],
        rng: &mut R,
    ) -> CkksResult<GaloisKeys> {
        let key_moduli = self.params.key_moduli();
        let mut keys = GaloisKeys::default();
        for &g in elements {
            self.check_galois_element(g)?;
            if keys.contains(g) {
                continue;
            }
            let rotated = self.lift_key_basis(&apply_galois_signed(&sk.coeffs, g), &key_moduli);
            keys.insert(g, self.keygen_switch(sk, &rotated, rng));
        }
        Ok(keys)
    }

    /// Switch `d` (NTT domain, data primes 0..=ℓ) under key `ksk`.
    ///
    /// Returns (r0, r1) at the same level with r0 + r1·s ≈ d·s'.
    pub fn key_switch(&self, d: &RnsPoly, ksk: &KeySwitchKey) -> (RnsPoly, RnsPoly) {
        let level = d.level();
        let n = self.params.poly_degree;
        let key_moduli = self.params.key_moduli();
        let special_idx = self.params.num_limbs;
        // Extended basis at this level: q_0..q_ℓ, then P.
        let basis: Vec<usize> = (0..=level).chain(iter::once(special_idx)).collect();

        let mut acc0 = RnsPoly::zero(n, basis.len());
        let mut acc1 = RnsPoly::zero(n, basis.len());

        for j in 0..=level {
            let qj = key_moduli[j].value;
            let mut digit = d.limbs[j].clone();
            negacyclic_ntt_inverse(&mut digit, &self.ntt_tables[j]);
            let signed: Vec<i64> = digit.iter().map(|&c| center(c, qj)).collect();

            for (t, &i) in basis.iter().enumerate() {
                let q = key_moduli[i].value;
                let lifted = if i == j {
                    d.limbs[j].clone()
                } else {
                    let mut limb: Vec<u64> = signed.iter().map(|&c| reduce_i64(c, q)).collect();
                    negacyclic_ntt_forward(&mut limb, self.key_tables(i));
                    limb
                };
                let kb = &ksk.b[j].limbs[i];
                let ka = &ksk.a[j].limbs[i];
                for c in 0..n {
                    acc0.limbs[t][c] = mod_add(acc0.limbs[t][c], mod_mul(lifted[c], kb[c], q), q);
                    acc1.limbs[t][c] = mod_add(acc1.limbs[t][c], mod_mul(lifted[c], ka[c], q), q);
                }
            }
        }

        self.divide_round_by_last(&mut acc0, &self.special_tables);
        self.divide_round_by_last(&mut acc1, &self.special_tables);
        (acc0, acc1)
    }

    /// Collapse (c0, c1, c2) to (c0 + r0, c1 + r1) with (r0, r1) = switch(c2, s² → s).
    /// A ciphertext that is already linear is left unchanged.
    pub fn relinearize_inplace(&self, ct: &mut Ciphertext, rk: &RelinKey) {
        if let Some(c2) = ct.c2.take() {
            let (r0, r1) = self.key_switch(&c2, &rk.0);
            let moduli = self.moduli_at(ct.level());
            ct.c0.add_assign(&r0, moduli);
            ct.c1.add_assign(&r1, moduli);
        }
    }

    /// Apply the Galois automorphism `g` and switch back to s.
    /// Slots rotate left by k when g = 5^k mod 2N.
    pub fn rotate_inplace(&self, ct: &mut Ciphertext, g: usize, keys: &GaloisKeys) -> CkksResult<()> {
        self.check_galois_element(g)?;
        if ct.size() != 2 {
            return Err(CkksError::InvalidCiphertextSize {
                size: ct.size(),
                op: "rotate",
            });
        }
        if g == 1 {
            return Ok(());
        }
        let ksk = keys.get(g).ok_or(CkksError::MissingGaloisKey(g))?;

        let permute = |poly: &RnsPoly| -> RnsPoly {
            let mut out = poly.clone();
            for (limb, tables) in out.limbs.iter_mut().zip(&self.ntt_tables) {
                negacyclic_ntt_inverse(limb, tables);
                *limb = apply_galois_limb(limb, g, tables.q);
                negacyclic_ntt_forward(limb, tables);
            }
            out
        };

        let c0 = permute(&ct.c0);
        let c1 = permute(&ct.c1);
        let (r0, r1) = self.key_switch(&c1, ksk);

        let moduli = self.moduli_at(ct.level());
        ct.c0 = c0.add(&r0, moduli);
        ct.c1 = r1;
        Ok(())
    }
}
