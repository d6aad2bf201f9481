//! CKKS encode/decode via the canonical embedding.
//!
//! Encode: z ∈ R^{N/2} → m(X) = round(Δ · σ^{-1}(z)) ∈ R_q
//! Decode: m(X) ∈ R_q → z = σ(m) / Δ ∈ R^{N/2}
//!
//! Slot j holds the evaluation m(ζ^{5^j}) where ζ = e^{πi/N}; the conjugate
//! slot m(ζ^{-5^j}) carries the complex conjugate. With this ordering the
//! automorphism X → X^{5^k} rotates slots cyclically: slot j of the result
//! holds slot (j + k) mod N/2 of the input.

use std::f64::consts::PI;

use crate::error::{CkksError, CkksResult};
use crate::params::{CkksParams, Modulus};
use crate::rns::{mod_inv, mod_mul, mod_sub, reduce_i128, RnsPoly};

/// Generator of the slot rotation group modulo 2N.
pub const SLOT_GENERATOR: usize = 5;

/// Pre-computed tables for O(N log N) FFT-based canonical embedding.
///
/// The canonical embedding evaluates m(X) at ζ^{2k+1} for k=0..N-1,
/// where ζ = e^{πi/N}. This is a "twisted DFT":
///   m(ζ^{2k+1}) = conj(FFT_N(m[j] · conj(ζ^j)))[k]
///
/// Pre-computing twist factors and twiddles keeps trig calls out of the hot path.
#[derive(Debug, Clone)]
struct FftTables {
    n: usize,
    /// Twist factors: twist_re[j] = cos(πj/N), twist_im[j] = sin(πj/N)
    twist_re: Vec<f64>,
    twist_im: Vec<f64>,
    /// Bit-reversal permutation table for size N.
    bit_rev: Vec<usize>,
    /// FFT twiddle factors per stage: twiddle_re[s][k] = cos(-2πk/2^{s+1})
    twiddle_re: Vec<Vec<f64>>,
    /// FFT twiddle factors per stage: twiddle_im[s][k] = sin(-2πk/2^{s+1})
    twiddle_im: Vec<Vec<f64>>,
}

impl FftTables {
    fn new(n: usize) -> Self {
        let log_n = n.trailing_zeros() as usize;

        let (twist_re, twist_im) = (0..n)
            .map(|j| {
                let angle = PI * j as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();

        let bit_rev = (0..n)
            .map(|i| {
                let mut rev = 0usize;
                let mut val = i;
                for _ in 0..log_n {
                    rev = (rev << 1) | (val & 1);
                    val >>= 1;
                }
                rev
            })
            .collect();

        let mut twiddle_re = Vec::with_capacity(log_n);
        let mut twiddle_im = Vec::with_capacity(log_n);
        for s in 0..log_n {
            let half_len = 1 << s;
            let (tre, tim): (Vec<f64>, Vec<f64>) = (0..half_len)
                .map(|k| {
                    let angle = -2.0 * PI * k as f64 / (2 * half_len) as f64;
                    (angle.cos(), angle.sin())
                })
                .unzip();
            twiddle_re.push(tre);
            twiddle_im.push(tim);
        }

        Self { n, twist_re, twist_im, bit_rev, twiddle_re, twiddle_im }
    }

    /// In-place complex forward DFT (Cooley-Tukey radix-2 DIT):
    /// X[k] = Σ_t x[t]·e^{-2πikt/N}.
    fn fft(&self, re: &mut [f64], im: &mut [f64]) {
        let n = self.n;
        debug_assert_eq!(re.len(), n);
        debug_assert_eq!(im.len(), n);

        for i in 0..n {
            let j = self.bit_rev[i];
            if i < j {
                re.swap(i, j);
                im.swap(i, j);
            }
        }

        for s in 0..self.twiddle_re.len() {
            let half_len = 1 << s;
            let full_len = half_len << 1;
            for group_start in (0..n).step_by(full_len) {
                for k in 0..half_len {
                    let w_re = self.twiddle_re[s][k];
                    let w_im = self.twiddle_im[s][k];
                    let i0 = group_start + k;
                    let i1 = i0 + half_len;

                    let v_re = w_re * re[i1] - w_im * im[i1];
                    let v_im = w_re * im[i1] + w_im * re[i1];

                    let u_re = re[i0];
                    let u_im = im[i0];
                    re[i0] = u_re + v_re;
                    im[i0] = u_im + v_im;
                    re[i1] = u_re - v_re;
                    im[i1] = u_im - v_im;
                }
            }
        }
    }
}

/// CKKS encoder/decoder for a given parameter set.
#[derive(Debug, Clone)]
pub struct CkksEncoder {
    /// Polynomial degree N.
    n: usize,
    /// Number of SIMD slots = N/2.
    num_slots: usize,
    /// Pre-computed FFT tables for O(N log N) encode/decode.
    fft: FftTables,
    /// Evaluation index k of slot j, where ζ^{2k+1} = ζ^{5^j}.
    slot_index: Vec<usize>,
    /// Evaluation index of the conjugate of slot j, ζ^{-5^j}.
    conj_index: Vec<usize>,
}

impl CkksEncoder {
    /// Create a new encoder for the given parameter set.
    pub fn new(params: &CkksParams) -> Self {
        let n = params.poly_degree;
        let num_slots = params.num_slots;
        let two_n = 2 * n;

        let mut slot_index = Vec::with_capacity(num_slots);
        let mut conj_index = Vec::with_capacity(num_slots);
        let mut g = 1usize;
        for _ in 0..num_slots {
            slot_index.push((g - 1) / 2);
            conj_index.push((two_n - g - 1) / 2);
            g = (g * SLOT_GENERATOR) % two_n;
        }

        Self {
            n,
            num_slots,
            fft: FftTables::new(n),
            slot_index,
            conj_index,
        }
    }

    /// Number of slots one plaintext packs.
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Encode a real-valued vector into an RNS polynomial (coefficient domain).
    ///
    /// Inputs shorter than the slot count are repeated cyclically until every
    /// slot is filled, so a single value broadcasts to all slots. An empty input
    /// encodes zero. `moduli` are the data primes of the target level.
    pub fn encode(&self, z: &[f64], scale: f64, moduli: &[Modulus]) -> CkksResult<RnsPoly> {
        if z.len() > self.num_slots {
            return Err(CkksError::TooManyValues {
                len: z.len(),
                slots: self.num_slots,
            });
        }

        let modulus_bits: u32 = moduli.iter().map(|m| m.bits).sum();
        let level = moduli.len().saturating_sub(1);
        let out_of_bounds = |scale_bits: f64| CkksError::ScaleOutOfBounds {
            scale_bits,
            modulus_bits,
            level,
        };
        if !(scale.is_finite() && scale > 0.0) || scale.log2() >= modulus_bits as f64 {
            return Err(out_of_bounds(scale.log2()));
        }

        let z_full: Vec<f64> = if z.is_empty() {
            vec![0.0; self.num_slots]
        } else {
            (0..self.num_slots).map(|j| z[j % z.len()]).collect()
        };

        let coeffs_f64 = self.inverse_canonical_embedding(&z_full);

        let scaled: Vec<f64> = coeffs_f64.iter().map(|&c| (c * scale).round()).collect();
        let max_abs = scaled.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        // Coefficients must stay below Q/2 to be recoverable, and inside i128.
        let bound_bits = modulus_bits.min(i128::BITS - 1);
        if !max_abs.is_finite() || max_abs.log2() + 1.0 >= bound_bits as f64 {
            return Err(out_of_bounds(scale.log2()));
        }

        let rounded: Vec<i128> = scaled.iter().map(|&v| v as i128).collect();
        let limbs = moduli
            .iter()
            .map(|m| rounded.iter().map(|&v| reduce_i128(v, m.value)).collect())
            .collect();

        Ok(RnsPoly { limbs, n: self.n })
    }

    /// Decode an RNS polynomial (coefficient domain) back to a real vector.
    ///
    /// Coefficients are lifted from the first two limbs by CRT when available,
    /// centered, and divided by `scale`.
    pub fn decode(&self, poly: &RnsPoly, moduli: &[Modulus], scale: f64) -> Vec<f64> {
        let coeffs_f64: Vec<f64> = match (poly.limbs.as_slice(), moduli) {
            ([r0, r1, ..], [m0, m1, ..]) => {
                let (q0, q1) = (m0.value, m1.value);
                let q0_inv = mod_inv(q0 % q1, q1);
                let big_q = q0 as u128 * q1 as u128;
                r0.iter()
                    .zip(r1)
                    .map(|(&a0, &a1)| {
                        let k = mod_mul(mod_sub(a1 % q1, a0 % q1, q1), q0_inv, q1);
                        let x = a0 as u128 + q0 as u128 * k as u128;
                        let signed = if x > big_q / 2 {
                            -((big_q - x) as f64)
                        } else {
                            x as f64
                        };
                        signed / scale
                    })
                    .collect()
            }
            ([r0, ..], [m0, ..]) => {
                let q = m0.value;
                r0.iter()
                    .map(|&c| {
                        let signed = if c > q / 2 { -((q - c) as f64) } else { c as f64 };
                        signed / scale
                    })
                    .collect()
            }
            _ => vec![0.0; self.n],
        };

        self.canonical_embedding(&coeffs_f64)
    }

    /// Inverse canonical embedding: slot values → polynomial coefficients.
    ///
    /// E[k] = Σ_t a[t]·e^{2πikt/N} with a[t] = m[t]·ζ^t, so
    /// a[t] = (1/N)·FFT(E)[t] and m[t] = Re(a[t]·ζ^{-t}).
    fn inverse_canonical_embedding(&self, z: &[f64]) -> Vec<f64> {
        let n = self.n;
        debug_assert_eq!(z.len(), self.num_slots);

        // Real slots: value and conjugate coincide.
        let mut e_re = vec![0.0f64; n];
        let mut e_im = vec![0.0f64; n];
        for (j, &v) in z.iter().enumerate() {
            e_re[self.slot_index[j]] = v;
            e_re[self.conj_index[j]] = v;
        }

        self.fft.fft(&mut e_re, &mut e_im);

        // Re((a_re + i·a_im)(cos - i·sin)) = a_re·cos + a_im·sin
        let inv_n = 1.0 / n as f64;
        (0..n)
            .map(|t| {
                let a_re = e_re[t] * inv_n;
                let a_im = e_im[t] * inv_n;
                a_re * self.fft.twist_re[t] + a_im * self.fft.twist_im[t]
            })
            .collect()
    }

    /// Canonical embedding: polynomial coefficients → slot values.
    ///
    /// b[t] = m[t]·conj(ζ^t); m(ζ^{2k+1}) = conj(FFT(b)[k]), whose real part
    /// equals Re(FFT(b)[k]).
    fn canonical_embedding(&self, coeffs: &[f64]) -> Vec<f64> {
        let n = self.n;
        debug_assert_eq!(coeffs.len(), n);

        let mut b_re: Vec<f64> = (0..n).map(|t| coeffs[t] * self.fft.twist_re[t]).collect();
        let mut b_im: Vec<f64> = (0..n).map(|t| -coeffs[t] * self.fft.twist_im[t]).collect();

        self.fft.fft(&mut b_re, &mut b_im);

        self.slot_index.iter().map(|&k| b_re[k]).collect()
    }
}
