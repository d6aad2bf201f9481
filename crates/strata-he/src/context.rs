//! The handle every ciphertext and plaintext hangs off.
//!
//! An [`HeContext`] is a cheap `Arc` clone. It owns the backend with its key
//! material, a [`Monitor`], and a process-unique id used to reject operands
//! that come from different contexts. Object counts go to the process-wide
//! [`ResourceAccountant`].

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::accountant::{ObjectToken, ResourceAccountant};
use crate::backend::Backend;
use crate::ciphertext::{Ciphertext, ContentKind};
use crate::config::{BackendKind, ContextConfig, RuntimeConfig};
use crate::engine::HeEngine;
use crate::error::{HeError, HeResult};
use crate::monitor::Monitor;
use crate::plaintext::Plaintext;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
    id: u64,
    config: ContextConfig,
    backend: Backend,
    monitor: Monitor,
}

/// Shared handle to one backend, its keys and its instrumentation.
#[derive(Clone)]
pub struct HeContext {
    inner: Arc<ContextInner>,
}

impl HeContext {
    /// Build a context with runtime toggles read from the environment.
    pub fn new(config: ContextConfig) -> HeResult<Self> {
        Self::with_runtime(config, RuntimeConfig::from_env())
    }

    /// Build a context with explicit runtime toggles. The accounting toggles
    /// are process-wide, so they apply to every context from here on.
    pub fn with_runtime(config: ContextConfig, runtime: RuntimeConfig) -> HeResult<Self> {
        config.validate()?;
        let backend = Backend::from_config(&config)?;
        ResourceAccountant::global().configure(&runtime);
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        info!(id, backend = backend.name(), slots = backend.number_of_slots(), "created context");
        Ok(Self {
            inner: Arc::new(ContextInner {
                id,
                config,
                backend,
                monitor: Monitor::new(runtime.monitor),
            }),
        })
    }

    /// Build a context from a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> HeResult<Self> {
        Self::new(ContextConfig::from_file(path)?)
    }

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Configuration this context was built from.
    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Which backend flavor is in use.
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.backend.kind()
    }

    /// Short backend name, `"seal"` or `"openfhe"`.
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Backend version string.
    pub fn backend_version(&self) -> String {
        self.inner.backend.version()
    }

    /// Values packed into one ciphertext.
    pub fn number_of_slots(&self) -> usize {
        self.inner.backend.number_of_slots()
    }

    /// Chain index of a fresh ciphertext.
    pub fn max_level(&self) -> usize {
        self.inner.backend.max_level()
    }

    /// Scale fresh values are encoded at.
    pub fn default_scale(&self) -> f64 {
        self.inner.backend.default_scale()
    }

    pub(crate) fn engine(&self) -> &Backend {
        &self.inner.backend
    }

    // Keys

    /// Create the public key. See the backend modules for what each flavor
    /// generates here.
    pub fn create_public_key(&self) -> HeResult<()> {
        self.inner.backend.create_public_key()
    }

    /// Create the private key.
    pub fn create_private_key(&self) -> HeResult<()> {
        self.inner.backend.create_private_key()
    }

    /// Write the public key bundle to `path`.
    pub fn save_public_key(&self, path: impl AsRef<Path>) -> HeResult<()> {
        self.inner.backend.save_public_key(path.as_ref())
    }

    /// Write the secret key to `path`.
    pub fn save_private_key(&self, path: impl AsRef<Path>) -> HeResult<()> {
        self.inner.backend.save_private_key(path.as_ref())
    }

    /// Replace the public key bundle with the one at `path`.
    pub fn load_public_key(&self, path: impl AsRef<Path>) -> HeResult<()> {
        self.inner.backend.load_public_key(path.as_ref())
    }

    /// Replace the secret key with the one at `path`.
    pub fn load_private_key(&self, path: impl AsRef<Path>) -> HeResult<()> {
        self.inner.backend.load_private_key(path.as_ref())
    }

    /// Whether encryption is possible.
    pub fn has_public_key(&self) -> bool {
        self.inner.backend.has_public_key()
    }

    /// Whether decryption is possible.
    pub fn has_private_key(&self) -> bool {
        self.inner.backend.has_secret_key()
    }

    // Encoding

    /// Encode now, at the default scale and the top of the chain.
    pub fn encode_f64(&self, values: &[f64]) -> HeResult<Plaintext> {
        Plaintext::eager(self.clone(), self.broadcast(values), ContentKind::Real)
    }

    /// Integer form of [`HeContext::encode_f64`].
    pub fn encode_i64(&self, values: &[i64]) -> HeResult<Plaintext> {
        Plaintext::eager(self.clone(), self.broadcast(&to_f64(values)), ContentKind::Integer)
    }

    /// Hold raw values; encoding happens on first use. A single value is
    /// broadcast to every slot.
    pub fn create_ptxt_f64(&self, values: &[f64]) -> Plaintext {
        Plaintext::lazy(self.clone(), self.broadcast(values), ContentKind::Real)
    }

    /// Integer form of [`HeContext::create_ptxt_f64`].
    pub fn create_ptxt_i64(&self, values: &[i64]) -> Plaintext {
        Plaintext::lazy(self.clone(), self.broadcast(&to_f64(values)), ContentKind::Integer)
    }

    fn broadcast(&self, values: &[f64]) -> Vec<f64> {
        match values {
            [v] => vec![*v; self.number_of_slots()],
            _ => values.to_vec(),
        }
    }

    // Encryption

    /// Encrypt real values under the public key.
    pub fn encrypt_f64(&self, values: &[f64], label: impl Into<String>) -> HeResult<Ciphertext> {
        self.encrypt_values(values, label.into(), ContentKind::Real)
    }

    /// Encrypt integer values under the public key. Decryption rounds.
    pub fn encrypt_i64(&self, values: &[i64], label: impl Into<String>) -> HeResult<Ciphertext> {
        self.encrypt_values(&to_f64(values), label.into(), ContentKind::Integer)
    }

    fn encrypt_values(&self, values: &[f64], label: String, kind: ContentKind) -> HeResult<Ciphertext> {
        let engine = self.engine();
        let pt = engine.encode(values, engine.default_scale(), engine.max_level())?;
        let ct = engine.encrypt(&pt)?;
        debug!(label = %label, len = values.len(), "encrypted");
        Ok(Ciphertext::from_parts(self.clone(), ct, label, kind))
    }

    /// Encrypt a plaintext at its own scale and level.
    pub fn encrypt_plaintext(&self, pt: &Plaintext, label: impl Into<String>) -> HeResult<Ciphertext> {
        self.ensure_same(pt.context())?;
        let ct = self.engine().encrypt(pt.encoded()?)?;
        Ok(Ciphertext::from_parts(self.clone(), ct, label.into(), pt.kind()))
    }

    /// Decrypt to reals. Integer ciphertexts come back rounded.
    pub fn decrypt_f64(&self, ct: &Ciphertext) -> HeResult<Vec<f64>> {
        self.ensure_same(ct.context())?;
        let pt = self.engine().decrypt(ct.as_core())?;
        let mut values = self.engine().decode(&pt)?;
        if ct.kind() == ContentKind::Integer {
            values.iter_mut().for_each(|v| *v = v.round());
        }
        Ok(values)
    }

    /// Decrypt and round to integers.
    pub fn decrypt_i64(&self, ct: &Ciphertext) -> HeResult<Vec<i64>> {
        Ok(self
            .decrypt_f64(ct)?
            .into_iter()
            .map(|v| v.round() as i64)
            .collect())
    }

    /// Rebuild a ciphertext from [`Ciphertext::to_bytes`] output.
    pub fn ciphertext_from_bytes(
        &self,
        bytes: &[u8],
        label: impl Into<String>,
        kind: ContentKind,
    ) -> HeResult<Ciphertext> {
        let ct = self.engine().deserialize_ciphertext(bytes)?;
        Ok(Ciphertext::from_parts(self.clone(), ct, label.into(), kind))
    }

    // Memory groups

    /// Begin a new memory group.
    pub fn start_new_group(&self, name: &str) {
        self.inner.backend.start_new_group(name);
    }

    /// Name of the current memory group.
    pub fn current_group(&self) -> String {
        self.inner.backend.current_group()
    }

    // Instrumentation

    /// Operation counters.
    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    /// Turn the operation counters on or off.
    pub fn enable_monitor(&self, enabled: bool) -> &Monitor {
        self.inner.monitor.set_enabled(enabled);
        &self.inner.monitor
    }

    /// Process-wide object counters.
    pub fn accountant(&self) -> &'static ResourceAccountant {
        ResourceAccountant::global()
    }

    pub(crate) fn track_ciphertext(&self) -> ObjectToken {
        ResourceAccountant::global().track_ciphertext(|name| self.inner.backend.start_new_group(name))
    }

    pub(crate) fn track_plaintext(&self) -> ObjectToken {
        ResourceAccountant::global().track_plaintext()
    }

    /// Reject an operand that belongs to another context.
    pub(crate) fn ensure_same(&self, other: &HeContext) -> HeResult<()> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ok(());
        }
        Err(HeError::ContextMismatch {
            lhs: self.id(),
            rhs: other.id(),
        })
    }
}

fn to_f64(values: &[i64]) -> Vec<f64> {
    values.iter().map(|&v| v as f64).collect()
}

impl fmt::Display for HeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.backend.describe())
    }
}

impl fmt::Debug for HeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeContext")
            .field("id", &self.inner.id)
            .field("backend", &self.backend_name())
            .finish()
    }
}
