//! Key store and primitive dispatch shared by both backend flavors.
//!
//! Both flavors run on the same native RNS-CKKS engine; they differ only in how
//! parameters are derived, when keys are generated and how rotations are keyed.
//! Key material is generated once and then read concurrently; readers clone an
//! `Arc` under a short read lock and never hold the lock across a primitive.
//! Randomness works the same way: each call draws a seed from the shared
//! stream under the mutex and samples from its own child generator.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use strata_core::keys::galois_element_for_step;
use strata_core::serialize::{
    galois_from_bytes_checked, galois_to_bytes, ksk_from_bytes_checked, ksk_to_bytes,
    pk_from_bytes_checked, pk_to_bytes, sk_from_bytes_checked, sk_to_bytes,
};
use strata_core::{
    Ciphertext, CkksContext, CkksError, CkksParams, GaloisKeys, Plaintext, PublicKey, RelinKey,
    SecretKey,
};
use tracing::{debug, info};

use crate::error::{HeError, HeResult, KeyKind};

/// Name of the group every context starts in.
pub const DEFAULT_GROUP: &str = "_default_";

#[derive(Default)]
struct KeyStore {
    secret: Option<Arc<SecretKey>>,
    public: Option<Arc<PublicKey>>,
    relin: Option<Arc<RelinKey>>,
    galois: Arc<GaloisKeys>,
    public_ready: bool,
    secret_ready: bool,
}

struct GroupState {
    name: String,
    generation: u64,
}

/// Native engine plus key store.
pub(crate) struct NativeEngine {
    ctx: CkksContext,
    rng: Mutex<ChaCha20Rng>,
    keys: RwLock<KeyStore>,
    group: Mutex<GroupState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl NativeEngine {
    pub(crate) fn new(params: CkksParams, seed: Option<u64>) -> HeResult<Self> {
        let ctx = CkksContext::new(params)?;
        let rng = match seed {
            Some(s) => ChaCha20Rng::seed_from_u64(s),
            None => ChaCha20Rng::from_entropy(),
        };
        Ok(Self {
            ctx,
            rng: Mutex::new(rng),
            keys: RwLock::new(KeyStore::default()),
            group: Mutex::new(GroupState {
                name: DEFAULT_GROUP.to_string(),
                generation: 0,
            }),
        })
    }

    pub(crate) fn ctx(&self) -> &CkksContext {
        &self.ctx
    }

    pub(crate) fn params(&self) -> &CkksParams {
        &self.ctx.params
    }

    /// Child generator seeded from the shared stream.
    fn fork_rng(&self) -> ChaCha20Rng {
        let seed: [u8; 32] = lock(&self.rng).gen();
        ChaCha20Rng::from_seed(seed)
    }

    fn read_keys(&self) -> RwLockReadGuard<'_, KeyStore> {
        self.keys.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, KeyStore> {
        self.keys.write().unwrap_or_else(|e| e.into_inner())
    }

    // Key generation

    /// Generate and store a fresh secret key, dropping all derived keys.
    pub(crate) fn generate_secret_key(&self) {
        let sk = self.ctx.keygen(&mut self.fork_rng());
        let mut keys = self.write_keys();
        *keys = KeyStore {
            secret: Some(Arc::new(sk)),
            ..KeyStore::default()
        };
    }

    fn stored_secret(&self) -> HeResult<Arc<SecretKey>> {
        self.read_keys()
            .secret
            .clone()
            .ok_or(HeError::MissingKey(KeyKind::Secret))
    }

    /// Public and relinearization keys from the stored secret key.
    pub(crate) fn generate_public_and_relin(&self) -> HeResult<()> {
        let sk = self.stored_secret()?;
        let mut rng = self.fork_rng();
        let pk = self.ctx.keygen_public(&sk, &mut rng);
        let rk = self.ctx.keygen_relin(&sk, &mut rng);
        let mut keys = self.write_keys();
        keys.public = Some(Arc::new(pk));
        keys.relin = Some(Arc::new(rk));
        Ok(())
    }

    /// Rotation keys for each step.
    pub(crate) fn generate_rotation_keys(&self, steps: &[i64]) -> HeResult<()> {
        let sk = self.stored_secret()?;
        let n = self.params().poly_degree;
        let mut elements: Vec<usize> = steps
            .iter()
            .map(|&s| galois_element_for_step(s, n))
            .filter(|&g| g != 1)
            .collect();
        elements.sort_unstable();
        elements.dedup();
        let galois = self.ctx.keygen_galois(&sk, &elements, &mut self.fork_rng())?;
        info!(keys = galois.len(), "generated rotation keys");
        self.write_keys().galois = Arc::new(galois);
        Ok(())
    }

    pub(crate) fn mark_public_ready(&self) {
        self.write_keys().public_ready = true;
    }

    pub(crate) fn mark_secret_ready(&self) {
        self.write_keys().secret_ready = true;
    }

    pub(crate) fn has_secret_material(&self) -> bool {
        self.read_keys().secret.is_some()
    }

    pub(crate) fn has_public_material(&self) -> bool {
        self.read_keys().public.is_some()
    }

    pub(crate) fn has_public_key(&self) -> bool {
        let keys = self.read_keys();
        keys.public_ready && keys.public.is_some()
    }

    pub(crate) fn has_secret_key(&self) -> bool {
        let keys = self.read_keys();
        keys.secret_ready && keys.secret.is_some()
    }

    pub(crate) fn has_relin_key(&self) -> bool {
        self.read_keys().relin.is_some()
    }

    fn public_key(&self) -> HeResult<Arc<PublicKey>> {
        let keys = self.read_keys();
        match (&keys.public, keys.public_ready) {
            (Some(pk), true) => Ok(Arc::clone(pk)),
            _ => Err(HeError::MissingKey(KeyKind::Public)),
        }
    }

    fn secret_key(&self) -> HeResult<Arc<SecretKey>> {
        let keys = self.read_keys();
        match (&keys.secret, keys.secret_ready) {
            (Some(sk), true) => Ok(Arc::clone(sk)),
            _ => Err(HeError::MissingKey(KeyKind::Secret)),
        }
    }

    fn relin_key(&self) -> HeResult<Arc<RelinKey>> {
        self.read_keys()
            .relin
            .clone()
            .ok_or(HeError::MissingKey(KeyKind::Relin))
    }

    pub(crate) fn galois_keys(&self) -> Arc<GaloisKeys> {
        Arc::clone(&self.read_keys().galois)
    }

    /// Whether a rotation by `step` has its own key.
    pub(crate) fn has_rotation_key(&self, step: i64) -> bool {
        let g = galois_element_for_step(step, self.params().poly_degree);
        g == 1 || self.read_keys().galois.contains(g)
    }

    // Persistence

    /// `[len | pk][len | relin][len | galois]`, lengths as little-endian u64.
    /// A missing relinearization key is written as an empty section.
    pub(crate) fn save_public_key(&self, path: &Path) -> HeResult<()> {
        let (pk, relin, galois) = {
            let keys = self.read_keys();
            let pk = keys.public.clone().ok_or(HeError::MissingKey(KeyKind::Public))?;
            (pk, keys.relin.clone(), Arc::clone(&keys.galois))
        };
        let mut bytes = Vec::new();
        push_section(&mut bytes, &pk_to_bytes(&pk));
        push_section(
            &mut bytes,
            &relin.map(|rk| ksk_to_bytes(&rk.0)).unwrap_or_default(),
        );
        push_section(&mut bytes, &galois_to_bytes(&galois));
        std::fs::write(path, bytes)?;
        info!(path = %path.display(), "saved public key bundle");
        Ok(())
    }

    pub(crate) fn save_private_key(&self, path: &Path) -> HeResult<()> {
        let sk = self.stored_secret()?;
        std::fs::write(path, sk_to_bytes(&sk))?;
        info!(path = %path.display(), "saved secret key");
        Ok(())
    }

    pub(crate) fn load_public_key(&self, path: &Path) -> HeResult<()> {
        let bytes = std::fs::read(path)?;
        let mut sections = Sections::new(&bytes);
        let pk = pk_from_bytes_checked(sections.next_section()?, self.params())?;
        let relin_bytes = sections.next_section()?;
        let relin = if relin_bytes.is_empty() {
            None
        } else {
            Some(RelinKey(ksk_from_bytes_checked(relin_bytes, self.params())?))
        };
        let galois = galois_from_bytes_checked(sections.next_section()?, self.params())?;
        sections.finish()?;

        let mut keys = self.write_keys();
        keys.public = Some(Arc::new(pk));
        keys.relin = relin.map(Arc::new);
        keys.galois = Arc::new(galois);
        keys.public_ready = true;
        info!(path = %path.display(), "loaded public key bundle");
        Ok(())
    }

    pub(crate) fn load_private_key(&self, path: &Path) -> HeResult<()> {
        let bytes = std::fs::read(path)?;
        let sk = sk_from_bytes_checked(&bytes, &self.ctx)?;
        let mut keys = self.write_keys();
        keys.secret = Some(Arc::new(sk));
        keys.secret_ready = true;
        info!(path = %path.display(), "loaded secret key");
        Ok(())
    }

    // Primitives

    pub(crate) fn encode(&self, values: &[f64], scale: f64, level: usize) -> HeResult<Plaintext> {
        Ok(self.ctx.encode(values, scale, level)?)
    }

    pub(crate) fn decode(&self, pt: &Plaintext) -> Vec<f64> {
        self.ctx.decode(pt)
    }

    pub(crate) fn encrypt(&self, pt: &Plaintext) -> HeResult<Ciphertext> {
        let pk = self.public_key()?;
        Ok(self.ctx.encrypt(pt, &pk, &mut self.fork_rng())?)
    }

    pub(crate) fn decrypt(&self, ct: &Ciphertext) -> HeResult<Plaintext> {
        let sk = self.secret_key()?;
        Ok(self.ctx.decrypt(ct, &sk))
    }

    pub(crate) fn add_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        Ok(self.ctx.add_inplace(a, b)?)
    }

    pub(crate) fn sub_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        Ok(self.ctx.sub_inplace(a, b)?)
    }

    pub(crate) fn add_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        Ok(self.ctx.add_plain_inplace(ct, pt)?)
    }

    pub(crate) fn sub_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        Ok(self.ctx.sub_plain_inplace(ct, pt)?)
    }

    pub(crate) fn multiply_inplace(&self, a: &mut Ciphertext, b: &Ciphertext) -> HeResult<()> {
        // Fail before the product exists rather than leave an unusable result.
        self.relin_key()?;
        Ok(self.ctx.multiply_inplace(a, b)?)
    }

    pub(crate) fn multiply_plain_inplace(&self, ct: &mut Ciphertext, pt: &Plaintext) -> HeResult<()> {
        Ok(self.ctx.multiply_plain_inplace(ct, pt)?)
    }

    pub(crate) fn relinearize_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        if ct.size() == 2 {
            return Ok(());
        }
        let rk = self.relin_key()?;
        self.ctx.relinearize_inplace(ct, &rk);
        Ok(())
    }

    pub(crate) fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> HeResult<()> {
        Ok(self.ctx.rescale_to_next_inplace(ct)?)
    }

    pub(crate) fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, level: usize) -> HeResult<()> {
        Ok(self.ctx.mod_switch_to_inplace(ct, level)?)
    }

    /// Rotate by one keyed step; `requested` is reported if the key is missing.
    pub(crate) fn rotate_step(&self, ct: &mut Ciphertext, step: i64, requested: i64) -> HeResult<()> {
        let g = galois_element_for_step(step, self.params().poly_degree);
        let galois = self.galois_keys();
        match self.ctx.rotate_inplace(ct, g, &galois) {
            Err(CkksError::MissingGaloisKey(_)) => Err(HeError::MissingKey(KeyKind::Rotation(requested))),
            other => Ok(other?),
        }
    }

    // Memory groups

    pub(crate) fn start_new_group(&self, name: &str) {
        let mut group = lock(&self.group);
        group.name = name.to_string();
        group.generation += 1;
        info!(group = name, generation = group.generation, "started new memory group");
    }

    pub(crate) fn current_group(&self) -> String {
        lock(&self.group).name.clone()
    }

    pub(crate) fn describe(&self, flavor: &str) -> String {
        let p = self.params();
        let bits: Vec<String> = p
            .moduli
            .iter()
            .chain(std::iter::once(&p.special))
            .map(|m| m.bits.to_string())
            .collect();
        debug!(flavor, "describing context");
        format!(
            "{flavor} CKKS: N={} slots={} coeff_modulus_bits=[{}] scale=2^{}",
            p.poly_degree,
            p.num_slots,
            bits.join(", "),
            p.scale_bits
        )
    }
}

fn push_section(out: &mut Vec<u8>, section: &[u8]) {
    out.extend_from_slice(&(section.len() as u64).to_le_bytes());
    out.extend_from_slice(section);
}

struct Sections<'a> {
    bytes: &'a [u8],
}

impl<'a> Sections<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn next_section(&mut self) -> HeResult<&'a [u8]> {
        if self.bytes.len() < 8 {
            return Err(CkksError::Deserialize("truncated key file header".into()).into());
        }
        let (head, rest) = self.bytes.split_at(8);
        let mut word = [0u8; 8];
        word.copy_from_slice(head);
        let len = usize::try_from(u64::from_le_bytes(word))
            .ok()
            .filter(|&len| len <= rest.len())
            .ok_or_else(|| CkksError::Deserialize("truncated key file section".into()))?;
        let (section, rest) = rest.split_at(len);
        self.bytes = rest;
        Ok(section)
    }

    fn finish(&self) -> HeResult<()> {
        if !self.bytes.is_empty() {
            return Err(CkksError::Deserialize(format!(
                "{} trailing bytes in key file",
                self.bytes.len()
            ))
            .into());
        }
        Ok(())
    }
}
