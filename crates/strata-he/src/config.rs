//! Context and runtime configuration.
//!
//! [`ContextConfig`] selects a backend and its parameters. It is plain serde data,
//! so it can be written by hand or loaded from JSON:
//!
//! ```json
//! { "backend": "seal", "poly_modulus_degree": 8192,
//!   "coeff_modulus_bits": [60, 40, 40, 60], "scale_bits": 40 }
//! ```
//!
//! [`RuntimeConfig`] holds the process toggles read from the environment:
//!
//! | Variable                | Effect                                             |
//! |-------------------------|----------------------------------------------------|
//! | `STRATA_COUNT_OBJECTS`  | `1`/`true` enables live-object accounting          |
//! | `STRATA_GROUP_THRESHOLD`| creations per automatic memory group (unset = off) |
//! | `STRATA_MONITOR`        | `1`/`true` starts with the operation monitor on    |

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HeError, HeResult};

/// Environment toggle for object accounting.
pub const COUNT_OBJECTS_ENV: &str = "STRATA_COUNT_OBJECTS";
/// Environment value for the automatic group threshold.
pub const GROUP_THRESHOLD_ENV: &str = "STRATA_GROUP_THRESHOLD";
/// Environment toggle for the operation monitor.
pub const MONITOR_ENV: &str = "STRATA_MONITOR";

/// The two backend flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SEAL-style parameterization and key lifecycle.
    Seal,
    /// OpenFHE-style parameterization and key lifecycle.
    OpenFhe,
}

impl BackendKind {
    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Seal => "seal",
            BackendKind::OpenFhe => "openfhe",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = HeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seal" => Ok(BackendKind::Seal),
            "openfhe" | "open_fhe" => Ok(BackendKind::OpenFhe),
            other => Err(HeError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// SEAL-flavor CKKS parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealParams {
    /// Ring degree N.
    pub poly_modulus_degree: usize,
    /// Bit widths of the coefficient modulus; the last entry is the special prime.
    pub coeff_modulus_bits: Vec<u32>,
    /// log2 of the default encoding scale.
    pub scale_bits: u32,
}

impl Default for SealParams {
    fn default() -> Self {
        Self {
            poly_modulus_degree: 8192,
            coeff_modulus_bits: vec![60, 40, 40, 60],
            scale_bits: 40,
        }
    }
}

impl SealParams {
    /// Check that the parameters describe a usable chain.
    pub fn validate(&self) -> HeResult<()> {
        if self.coeff_modulus_bits.len() < 2 {
            return Err(HeError::InvalidConfig(
                "coeff_modulus_bits needs at least one data prime and the special prime".into(),
            ));
        }
        let data_bits: u32 = self.coeff_modulus_bits[..self.coeff_modulus_bits.len() - 1]
            .iter()
            .sum();
        if self.scale_bits == 0 || self.scale_bits >= data_bits {
            return Err(HeError::InvalidConfig(format!(
                "scale_bits {} must be positive and below the {data_bits} data-modulus bits",
                self.scale_bits
            )));
        }
        Ok(())
    }
}

/// OpenFHE-flavor CKKS parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFheParams {
    /// Number of multiplications the chain supports.
    pub multiplicative_depth: usize,
    /// Bit width of each rescaling prime, also log2 of the scale.
    pub scaling_mod_size: u32,
    /// Bit width of the first prime and of the special prime.
    pub first_mod_size: u32,
    /// Ring degree N.
    pub ring_dim: usize,
    /// Packed slots per ciphertext; 0 means N/2.
    #[serde(default)]
    pub batch_size: usize,
    /// Rotation steps to generate keys for.
    #[serde(default)]
    pub rotation_indices: Vec<i64>,
}

impl Default for OpenFheParams {
    fn default() -> Self {
        Self {
            multiplicative_depth: 2,
            scaling_mod_size: 40,
            first_mod_size: 60,
            ring_dim: 8192,
            batch_size: 0,
            rotation_indices: Vec::new(),
        }
    }
}

impl OpenFheParams {
    /// Modulus chain bit widths: first prime, one per level, special prime.
    pub fn coeff_modulus_bits(&self) -> Vec<u32> {
        let mut bits = Vec::with_capacity(self.multiplicative_depth + 2);
        bits.push(self.first_mod_size);
        bits.extend(std::iter::repeat(self.scaling_mod_size).take(self.multiplicative_depth));
        bits.push(self.first_mod_size);
        bits
    }

    /// Check depth and batch size.
    pub fn validate(&self) -> HeResult<()> {
        if self.multiplicative_depth == 0 {
            return Err(HeError::InvalidConfig("multiplicative_depth must be at least 1".into()));
        }
        if self.scaling_mod_size >= self.first_mod_size {
            return Err(HeError::InvalidConfig(format!(
                "scaling_mod_size {} must be below first_mod_size {}",
                self.scaling_mod_size, self.first_mod_size
            )));
        }
        let max_slots = self.ring_dim / 2;
        if self.batch_size != 0 && (!self.batch_size.is_power_of_two() || self.batch_size > max_slots) {
            return Err(HeError::InvalidConfig(format!(
                "batch_size {} must be a power of two no larger than {max_slots}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// Backend selection plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    /// SEAL flavor.
    Seal(SealParams),
    /// OpenFHE flavor.
    OpenFhe(OpenFheParams),
}

impl BackendConfig {
    /// Which flavor this configures.
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Seal(_) => BackendKind::Seal,
            BackendConfig::OpenFhe(_) => BackendKind::OpenFhe,
        }
    }
}

/// Everything needed to construct an [`crate::HeContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Backend and parameters.
    #[serde(flatten)]
    pub backend: BackendConfig,
    /// Seed for the context CSPRNG. Unset draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ContextConfig {
    /// SEAL-flavor configuration.
    pub fn seal(params: SealParams) -> Self {
        Self {
            backend: BackendConfig::Seal(params),
            seed: None,
        }
    }

    /// OpenFHE-flavor configuration.
    pub fn openfhe(params: OpenFheParams) -> Self {
        Self {
            backend: BackendConfig::OpenFhe(params),
            seed: None,
        }
    }

    /// Default parameters for the named backend.
    pub fn for_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Seal => Self::seal(SealParams::default()),
            BackendKind::OpenFhe => Self::openfhe(OpenFheParams::default()),
        }
    }

    /// Fix the CSPRNG seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Which flavor this configures.
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Validate the backend parameters.
    pub fn validate(&self) -> HeResult<()> {
        match &self.backend {
            BackendConfig::Seal(p) => p.validate(),
            BackendConfig::OpenFhe(p) => p.validate(),
        }
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> HeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> HeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> HeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Process toggles for instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    /// Track live, created and destroyed objects.
    pub count_objects: bool,
    /// Ciphertext creations between automatic memory groups.
    pub group_threshold: Option<u64>,
    /// Start with the operation monitor enabled.
    pub monitor: bool,
}

impl RuntimeConfig {
    /// Read the toggles from the environment.
    pub fn from_env() -> Self {
        Self {
            count_objects: parse_bool_env(COUNT_OBJECTS_ENV),
            group_threshold: std::env::var(GROUP_THRESHOLD_ENV)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok()),
            monitor: parse_bool_env(MONITOR_ENV),
        }
    }
}

fn parse_bool_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_json_roundtrip() {
        let config = ContextConfig::seal(SealParams::default()).with_seed(7);
        let json = config.to_json().unwrap();
        assert!(json.contains("\"backend\": \"seal\""));
        assert_eq!(ContextConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_openfhe_json_defaults() {
        let json = r#"{
            "backend": "openfhe",
            "multiplicative_depth": 3,
            "scaling_mod_size": 40,
            "first_mod_size": 60,
            "ring_dim": 4096
        }"#;
        let config = ContextConfig::from_json(json).unwrap();
        let BackendConfig::OpenFhe(p) = &config.backend else {
            panic!("expected openfhe config");
        };
        assert_eq!(p.batch_size, 0);
        assert!(p.rotation_indices.is_empty());
        assert_eq!(p.coeff_modulus_bits(), vec![60, 40, 40, 40, 60]);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_rejects_bad_params() {
        let bad_batch = OpenFheParams {
            batch_size: 3,
            ..OpenFheParams::default()
        };
        assert!(matches!(bad_batch.validate(), Err(HeError::InvalidConfig(_))));

        let bad_scale = SealParams {
            scale_bits: 70,
            coeff_modulus_bits: vec![60, 60],
            ..SealParams::default()
        };
        assert!(bad_scale.validate().is_err());

        assert!(ContextConfig::from_json(r#"{"backend": "helib"}"#).is_err());
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("SEAL".parse::<BackendKind>().unwrap(), BackendKind::Seal);
        assert_eq!("openfhe".parse::<BackendKind>().unwrap(), BackendKind::OpenFhe);
        assert!(matches!(
            "tfhe".parse::<BackendKind>(),
            Err(HeError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        let config = ContextConfig::for_backend(BackendKind::OpenFhe);
        std::fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(ContextConfig::from_file(&path).unwrap(), config);
    }
}
