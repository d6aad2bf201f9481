//! Best-effort object accounting and automatic memory-group rotation.
//!
//! Counts are process-wide: every context reports into [`ResourceAccountant::global`],
//! and building a context applies its [`RuntimeConfig`] toggles to it. Two
//! independent features share this module:
//!
//! - **Counting** (`count_objects`): live, created, destroyed and peak counts of
//!   ciphertexts and plaintexts. Each store holds an [`ObjectToken`] whose drop
//!   records the destruction.
//! - **Group rotation** (`group_threshold`): after roughly `threshold`
//!   ciphertext creations anywhere in the process, the engine of the context
//!   creating the next ciphertext starts a memory group named [`INTERNAL_GROUP`].
//!
//! The rotation counter is deliberately racy: increments are a plain
//! load/store, so concurrent creations may be lost. Only the threshold check is
//! serialized, and it is re-checked under the lock so at most one rotation
//! fires per crossing.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, info};

use crate::config::RuntimeConfig;

/// Group name used for automatic rotations.
pub const INTERNAL_GROUP: &str = "_internal_";

static GLOBAL: OnceLock<ResourceAccountant> = OnceLock::new();

/// `group_threshold` of zero means rotation is off.
const NO_THRESHOLD: u64 = 0;

#[derive(Debug, Default)]
struct ObjectCounts {
    live: AtomicI64,
    max: AtomicI64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl ObjectCounts {
    fn on_create(&self) {
        let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;
        self.max.fetch_max(live, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    fn on_destroy(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ObjectStats {
        ObjectStats {
            live: self.live.load(Ordering::Relaxed),
            max: self.max.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counts for one object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectStats {
    /// Currently alive.
    pub live: i64,
    /// Highest `live` seen.
    pub max: i64,
    /// Total created.
    pub created: u64,
    /// Total dropped.
    pub destroyed: u64,
}

/// Records one object's lifetime. Dropping it records the destruction.
#[derive(Debug)]
pub struct ObjectToken {
    counts: Option<Arc<ObjectCounts>>,
}

impl Drop for ObjectToken {
    fn drop(&mut self) {
        if let Some(counts) = &self.counts {
            counts.on_destroy();
        }
    }
}

/// Object counters and group-rotation trigger.
#[derive(Debug)]
pub struct ResourceAccountant {
    count_objects: AtomicBool,
    group_threshold: AtomicU64,
    ciphertexts: Arc<ObjectCounts>,
    plaintexts: Arc<ObjectCounts>,
    since_rotation: AtomicU64,
    rotation_lock: Mutex<()>,
}

impl ResourceAccountant {
    /// A standalone accountant with the given toggles.
    pub fn new(config: &RuntimeConfig) -> Self {
        let acc = Self {
            count_objects: AtomicBool::new(false),
            group_threshold: AtomicU64::new(NO_THRESHOLD),
            ciphertexts: Arc::default(),
            plaintexts: Arc::default(),
            since_rotation: AtomicU64::new(0),
            rotation_lock: Mutex::new(()),
        };
        acc.configure(config);
        acc
    }

    /// The process-wide accountant, first configured from the environment.
    pub fn global() -> &'static ResourceAccountant {
        GLOBAL.get_or_init(|| ResourceAccountant::new(&RuntimeConfig::from_env()))
    }

    /// Apply counting and rotation toggles. Object counts are kept; the
    /// rotation window starts over.
    pub fn configure(&self, config: &RuntimeConfig) {
        debug!(
            count_objects = config.count_objects,
            group_threshold = ?config.group_threshold,
            "resource accounting configured"
        );
        self.count_objects.store(config.count_objects, Ordering::Relaxed);
        self.group_threshold.store(
            config.group_threshold.unwrap_or(NO_THRESHOLD),
            Ordering::Relaxed,
        );
        self.since_rotation.store(0, Ordering::Relaxed);
    }

    /// Whether object counting is on.
    pub fn is_counting(&self) -> bool {
        self.count_objects.load(Ordering::Relaxed)
    }

    fn threshold(&self) -> Option<u64> {
        Some(self.group_threshold.load(Ordering::Relaxed)).filter(|&t| t != NO_THRESHOLD)
    }

    /// Record a ciphertext creation. `start_group` runs when the rotation
    /// threshold is crossed.
    pub fn track_ciphertext(&self, start_group: impl FnOnce(&str)) -> ObjectToken {
        if let Some(threshold) = self.threshold() {
            let seen = self.since_rotation.load(Ordering::Relaxed);
            if seen > threshold {
                let _guard = self.rotation_lock.lock().unwrap_or_else(|e| e.into_inner());
                if self.since_rotation.load(Ordering::Relaxed) > threshold {
                    info!(threshold, "ciphertext threshold reached, rotating memory group");
                    start_group(INTERNAL_GROUP);
                    self.since_rotation.store(0, Ordering::Relaxed);
                }
            } else {
                self.since_rotation.store(seen + 1, Ordering::Relaxed);
            }
        }
        self.token(&self.ciphertexts)
    }

    /// Record a plaintext creation.
    pub fn track_plaintext(&self) -> ObjectToken {
        self.token(&self.plaintexts)
    }

    fn token(&self, counts: &Arc<ObjectCounts>) -> ObjectToken {
        if !self.is_counting() {
            return ObjectToken { counts: None };
        }
        counts.on_create();
        ObjectToken {
            counts: Some(Arc::clone(counts)),
        }
    }

    /// Ciphertext counts, or `None` when counting is off.
    pub fn ciphertext_stats(&self) -> Option<ObjectStats> {
        self.is_counting().then(|| self.ciphertexts.snapshot())
    }

    /// Plaintext counts, or `None` when counting is off.
    pub fn plaintext_stats(&self) -> Option<ObjectStats> {
        self.is_counting().then(|| self.plaintexts.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting() -> ResourceAccountant {
        ResourceAccountant::new(&RuntimeConfig {
            count_objects: true,
            ..RuntimeConfig::default()
        })
    }

    #[test]
    fn test_disabled_reports_none() {
        let acc = ResourceAccountant::new(&RuntimeConfig::default());
        let _t = acc.track_plaintext();
        assert_eq!(acc.plaintext_stats(), None);
        assert_eq!(acc.ciphertext_stats(), None);
    }

    #[test]
    fn test_counts_follow_token_lifetimes() {
        let acc = counting();
        let a = acc.track_ciphertext(|_| {});
        let b = acc.track_ciphertext(|_| {});
        drop(a);
        let _c = acc.track_ciphertext(|_| {});
        drop(b);

        let stats = acc.ciphertext_stats().unwrap();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.max, 2);
        assert_eq!(stats.created, 3);
        assert_eq!(stats.destroyed, 2);
        assert_eq!(acc.plaintext_stats().unwrap(), ObjectStats::default());
    }

    #[test]
    fn test_group_rotation_after_threshold() {
        let acc = ResourceAccountant::new(&RuntimeConfig {
            group_threshold: Some(3),
            ..RuntimeConfig::default()
        });
        let rotations = Cell::new(0);
        let mut tokens = Vec::new();
        for _ in 0..10 {
            tokens.push(acc.track_ciphertext(|name| {
                assert_eq!(name, INTERNAL_GROUP);
                rotations.set(rotations.get() + 1);
            }));
        }
        // Counter climbs to 4, rotates on the fifth creation, then repeats.
        assert_eq!(rotations.get(), 2);
    }

    #[test]
    fn test_configure_keeps_counts() {
        let acc = counting();
        let _a = acc.track_ciphertext(|_| {});
        acc.configure(&RuntimeConfig::default());
        assert!(!acc.is_counting());
        assert_eq!(acc.ciphertext_stats(), None);
        let _b = acc.track_ciphertext(|_| {});
        acc.configure(&RuntimeConfig {
            count_objects: true,
            ..RuntimeConfig::default()
        });
        assert_eq!(acc.ciphertext_stats().unwrap().created, 1);
    }

    #[test]
    fn test_rotation_is_serialized_under_contention() {
        let acc = ResourceAccountant::new(&RuntimeConfig {
            group_threshold: Some(50),
            ..RuntimeConfig::default()
        });
        let rotating = AtomicBool::new(false);
        let rotations = AtomicU64::new(0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let _t = acc.track_ciphertext(|name| {
                            assert_eq!(name, INTERNAL_GROUP);
                            assert!(!rotating.swap(true, Ordering::SeqCst), "overlapping rotations");
                            rotations.fetch_add(1, Ordering::Relaxed);
                            rotating.store(false, Ordering::SeqCst);
                        });
                    }
                });
            }
        });
        assert!(rotations.load(Ordering::Relaxed) >= 1);
        // Increments only happen at or below the threshold.
        assert!(acc.since_rotation.load(Ordering::Relaxed) <= 51);
    }
}
