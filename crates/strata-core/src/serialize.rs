//! Byte serialization for keys and ciphertexts.
//!
//! Format: flat little-endian words. Each RnsPoly is L × N × 8 bytes, with L
//! and N implied by the parameter set and the header of the enclosing object.
//!
//! - Ciphertext: `[scale f64 | level u32 | size u32 | c0 | c1 | c2?]`
//! - PublicKey:  `[b | a]` over all data primes
//! - SecretKey:  `[N × i8]` signed ternary coefficients
//! - KeySwitchKey: `[(b_j | a_j) for j in data primes]` over data primes + P
//! - GaloisKeys: `[count u32 | (g u32 | KeySwitchKey)*]`
//!
//! Every deserializer validates lengths and checks each coefficient against
//! its modulus, so malformed input yields an error rather than a corrupt value.

use crate::ciphertext::{Ciphertext, CkksContext};
use crate::error::{CkksError, CkksResult};
use crate::keys::{GaloisKeys, KeySwitchKey, PublicKey, SecretKey};
use crate::params::{CkksParams, Modulus};
use crate::rns::RnsPoly;

/// Sequential reader over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> CkksResult<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|&e| e <= self.bytes.len()).ok_or_else(|| {
            CkksError::Deserialize(format!(
                "truncated input: need {len} bytes at offset {}, have {}",
                self.offset,
                self.bytes.len()
            ))
        })?;
        let chunk = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(chunk)
    }

    fn u32(&mut self) -> CkksResult<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(word))
    }

    fn f64(&mut self) -> CkksResult<f64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(word))
    }

    fn poly(&mut self, n: usize, moduli: &[Modulus]) -> CkksResult<RnsPoly> {
        let bytes = self.take(moduli.len() * n * 8)?;
        rns_poly_from_bytes_checked(bytes, n, moduli)
    }

    fn finish(&self) -> CkksResult<()> {
        if self.offset != self.bytes.len() {
            return Err(CkksError::Deserialize(format!(
                "{} trailing bytes",
                self.bytes.len() - self.offset
            )));
        }
        Ok(())
    }
}

/// Serialize an RnsPoly to bytes (L × N × 8 bytes, little-endian u64).
pub fn rns_poly_to_bytes(poly: &RnsPoly) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(poly.limbs.len() * poly.n * 8);
    for limb in &poly.limbs {
        for &c in limb {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }
    bytes
}

/// Deserialize an RnsPoly from bytes with coefficient range validation.
///
/// Each coefficient is checked against its modulus: `coeff < moduli[l].value`.
pub fn rns_poly_from_bytes_checked(
    bytes: &[u8],
    n: usize,
    moduli: &[Modulus],
) -> CkksResult<RnsPoly> {
    let num_limbs = moduli.len();
    if bytes.len() != num_limbs * n * 8 {
        return Err(CkksError::Deserialize(format!(
            "Expected {} bytes for RnsPoly(n={n}, L={num_limbs}), got {}",
            num_limbs * n * 8,
            bytes.len()
        )));
    }
    let mut poly = RnsPoly::zero(n, num_limbs);
    for (l, (limb, chunk)) in poly.limbs.iter_mut().zip(bytes.chunks_exact(n * 8)).enumerate() {
        let q = moduli[l].value;
        for (i, (dst, word)) in limb.iter_mut().zip(chunk.chunks_exact(8)).enumerate() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(word);
            let coeff = u64::from_le_bytes(buf);
            if coeff >= q {
                return Err(CkksError::Deserialize(format!(
                    "Coefficient out of range at limb {l}, index {i}: coeff={coeff} >= q={q}"
                )));
            }
            *dst = coeff;
        }
    }
    Ok(poly)
}

/// Serialize a Ciphertext.
pub fn ct_to_bytes(ct: &Ciphertext) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&ct.scale.to_le_bytes());
    bytes.extend_from_slice(&(ct.level() as u32).to_le_bytes());
    bytes.extend_from_slice(&(ct.size() as u32).to_le_bytes());
    bytes.extend(rns_poly_to_bytes(&ct.c0));
    bytes.extend(rns_poly_to_bytes(&ct.c1));
    if let Some(c2) = &ct.c2 {
        bytes.extend(rns_poly_to_bytes(c2));
    }
    bytes
}

/// Deserialize a Ciphertext, validating level, size and every coefficient.
pub fn ct_from_bytes_checked(bytes: &[u8], params: &CkksParams) -> CkksResult<Ciphertext> {
    let mut r = Reader::new(bytes);
    let scale = r.f64()?;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(CkksError::Deserialize(format!("invalid scale {scale}")));
    }
    let level = r.u32()? as usize;
    if level > params.max_level() {
        return Err(CkksError::Deserialize(format!("invalid level {level}")));
    }
    let size = r.u32()?;
    if !(2..=3).contains(&size) {
        return Err(CkksError::Deserialize(format!("invalid ciphertext size {size}")));
    }

    let moduli = params.moduli_at(level);
    let n = params.poly_degree;
    let c0 = r.poly(n, moduli)?;
    let c1 = r.poly(n, moduli)?;
    let c2 = if size == 3 { Some(r.poly(n, moduli)?) } else { None };
    r.finish()?;
    Ok(Ciphertext { c0, c1, c2, scale })
}

/// Serialize a PublicKey: `[b | a]`.
pub fn pk_to_bytes(pk: &PublicKey) -> Vec<u8> {
    let mut bytes = rns_poly_to_bytes(&pk.b);
    bytes.extend(rns_poly_to_bytes(&pk.a));
    bytes
}

/// Deserialize a PublicKey.
pub fn pk_from_bytes_checked(bytes: &[u8], params: &CkksParams) -> CkksResult<PublicKey> {
    let mut r = Reader::new(bytes);
    let b = r.poly(params.poly_degree, &params.moduli)?;
    let a = r.poly(params.poly_degree, &params.moduli)?;
    r.finish()?;
    Ok(PublicKey { b, a })
}

/// Serialize a SecretKey as one signed byte per coefficient.
pub fn sk_to_bytes(sk: &SecretKey) -> Vec<u8> {
    sk.coeffs.iter().map(|&c| (c as i8) as u8).collect()
}

/// Deserialize a SecretKey and rebuild its NTT form.
pub fn sk_from_bytes_checked(bytes: &[u8], ctx: &CkksContext) -> CkksResult<SecretKey> {
    if bytes.len() != ctx.params.poly_degree {
        return Err(CkksError::Deserialize(format!(
            "Expected {} bytes for SecretKey, got {}",
            ctx.params.poly_degree,
            bytes.len()
        )));
    }
    let coeffs = bytes.iter().map(|&b| (b as i8) as i64).collect();
    ctx.secret_key_from_coeffs(coeffs)
}

/// Serialize a KeySwitchKey.
pub fn ksk_to_bytes(ksk: &KeySwitchKey) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (b, a) in ksk.b.iter().zip(&ksk.a) {
        bytes.extend(rns_poly_to_bytes(b));
        bytes.extend(rns_poly_to_bytes(a));
    }
    bytes
}

fn read_ksk(r: &mut Reader<'_>, params: &CkksParams) -> CkksResult<KeySwitchKey> {
    let key_moduli = params.key_moduli();
    let mut b = Vec::with_capacity(params.num_limbs);
    let mut a = Vec::with_capacity(params.num_limbs);
    for _ in 0..params.num_limbs {
        b.push(r.poly(params.poly_degree, &key_moduli)?);
        a.push(r.poly(params.poly_degree, &key_moduli)?);
    }
    Ok(KeySwitchKey { b, a })
}

/// Deserialize a KeySwitchKey (also used for relinearization keys).
pub fn ksk_from_bytes_checked(bytes: &[u8], params: &CkksParams) -> CkksResult<KeySwitchKey> {
    let mut r = Reader::new(bytes);
    let ksk = read_ksk(&mut r, params)?;
    r.finish()?;
    Ok(ksk)
}

/// Serialize GaloisKeys.
pub fn galois_to_bytes(keys: &GaloisKeys) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(keys.len() as u32).to_le_bytes());
    for g in keys.elements() {
        bytes.extend_from_slice(&(g as u32).to_le_bytes());
        if let Some(ksk) = keys.get(g) {
            bytes.extend(ksk_to_bytes(ksk));
        }
    }
    bytes
}

/// Deserialize GaloisKeys.
pub fn galois_from_bytes_checked(bytes: &[u8], params: &CkksParams) -> CkksResult<GaloisKeys> {
    let mut r = Reader::new(bytes);
    let count = r.u32()?;
    let two_n = 2 * params.poly_degree;
    let mut keys = GaloisKeys::default();
    for _ in 0..count {
        let g = r.u32()? as usize;
        if g % 2 == 0 || g >= two_n {
            return Err(CkksError::InvalidGaloisElement(g));
        }
        keys.insert(g, read_ksk(&mut r, params)?);
    }
    r.finish()?;
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ciphertext::tests::{assert_close, make_ctx_and_keys};
    use crate::keys::galois_element_for_step;

    #[test]
    fn test_ct_serialize_roundtrip_checked() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();
        let z: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let ct = ctx.encrypt(&ctx.encode(&z, ctx.params.default_scale(), 1).unwrap(), &pk, &mut rng).unwrap();

        let bytes = ct_to_bytes(&ct);
        let ct2 = ct_from_bytes_checked(&bytes, &ctx.params)
            .expect("Valid ciphertext should pass checked deserialization");
        assert_eq!(ct, ct2);
        assert_close(&ctx.decode(&ctx.decrypt(&ct2, &sk)), &z, 1e-4);
    }

    #[test]
    fn test_checked_deserialization_rejects_out_of_range() {
        let (ctx, _sk, pk, mut rng) = make_ctx_and_keys();
        let ct = ctx.encrypt(&ctx.encode(&[1.0], ctx.params.default_scale(), 2).unwrap(), &pk, &mut rng).unwrap();
        let mut bytes = ct_to_bytes(&ct);

        // Header is 16 bytes; the first c0 coefficient follows.
        let bad_coeff = ctx.params.moduli[0].value + 1;
        bytes[16..24].copy_from_slice(&bad_coeff.to_le_bytes());

        let err = ct_from_bytes_checked(&bytes, &ctx.params).unwrap_err();
        assert!(err.to_string().contains("out of range"), "unexpected error: {err}");
    }

    #[test]
    fn test_checked_deserialization_rejects_truncation() {
        let (ctx, _sk, pk, mut rng) = make_ctx_and_keys();
        let ct = ctx.encrypt(&ctx.encode(&[1.0], ctx.params.default_scale(), 2).unwrap(), &pk, &mut rng).unwrap();
        let bytes = ct_to_bytes(&ct);
        assert!(ct_from_bytes_checked(&bytes[..bytes.len() - 1], &ctx.params).is_err());

        let mut extended = bytes.clone();
        extended.push(0);
        assert!(ct_from_bytes_checked(&extended, &ctx.params).is_err());
    }

    #[test]
    fn test_key_roundtrips() {
        let (ctx, sk, pk, mut rng) = make_ctx_and_keys();

        let pk2 = pk_from_bytes_checked(&pk_to_bytes(&pk), &ctx.params).unwrap();
        assert_eq!(pk, pk2);

        let sk2 = sk_from_bytes_checked(&sk_to_bytes(&sk), &ctx).unwrap();
        assert_eq!(sk, sk2);

        let rk = ctx.keygen_relin(&sk, &mut rng);
        let rk2 = ksk_from_bytes_checked(&ksk_to_bytes(&rk.0), &ctx.params).unwrap();
        assert_eq!(rk.0, rk2);

        let g = galois_element_for_step(1, ctx.params.poly_degree);
        let gk = ctx.keygen_galois(&sk, &[g], &mut rng).unwrap();
        let gk2 = galois_from_bytes_checked(&galois_to_bytes(&gk), &ctx.params).unwrap();
        assert_eq!(gk, gk2);
    }

    #[test]
    fn test_rns_poly_checked_rejects_bad_coeff() {
        let moduli = [Modulus::new(17, 5), Modulus::new(97, 7)];
        let poly = RnsPoly::from_signed(&[1, 2, 3, 4], &moduli);
        let mut bytes = rns_poly_to_bytes(&poly);
        assert_eq!(rns_poly_from_bytes_checked(&bytes, 4, &moduli).unwrap(), poly);

        bytes[0..8].copy_from_slice(&117u64.to_le_bytes());
        assert!(rns_poly_from_bytes_checked(&bytes, 4, &moduli).is_err());
    }
}
