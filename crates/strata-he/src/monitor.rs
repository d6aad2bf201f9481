//! Named operation counters.
//!
//! Counting is off unless enabled; a disabled monitor costs one relaxed load
//! per operation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// ct × ct multiplications.
pub const CTXT_CTXT_MULTIPLICATION: &str = "ctxt_ctxt_multiplication";
/// ct × pt (and ct × scalar) multiplications.
pub const CTXT_PTXT_MULTIPLICATION: &str = "ctxt_ptxt_multiplication";
/// ct ± ct.
pub const CTXT_CTXT_ADDITION: &str = "ctxt_ctxt_addition";
/// ct ± pt (and ct ± scalar).
pub const CTXT_PTXT_ADDITION: &str = "ctxt_ptxt_addition";
/// Rotations.
pub const CTXT_ROTATION: &str = "ctxt_rotation";

/// Every counter name, in iteration order.
pub const VALUES: [&str; 5] = [
    CTXT_CTXT_MULTIPLICATION,
    CTXT_PTXT_MULTIPLICATION,
    CTXT_CTXT_ADDITION,
    CTXT_PTXT_ADDITION,
    CTXT_ROTATION,
];

/// Counted operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// ct × ct.
    CtxtCtxtMultiplication = 0,
    /// ct × pt.
    CtxtPtxtMultiplication = 1,
    /// ct ± ct.
    CtxtCtxtAddition = 2,
    /// ct ± pt.
    CtxtPtxtAddition = 3,
    /// Rotation.
    Rotation = 4,
}

/// Operation counters for one context.
#[derive(Debug, Default)]
pub struct Monitor {
    enabled: AtomicBool,
    counters: [AtomicU64; 5],
    cursor: Mutex<usize>,
}

impl Monitor {
    /// A monitor that starts enabled or disabled.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            ..Self::default()
        }
    }

    /// Turn counting on or off. Counts are kept across toggles.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether counting is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn record(&self, op: Op) {
        if self.is_enabled() {
            self.counters[op as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Value of the named counter, or `None` for an unknown name.
    pub fn get(&self, name: &str) -> Option<u64> {
        VALUES
            .iter()
            .position(|&v| v == name)
            .map(|i| self.counters[i].load(Ordering::Relaxed))
    }

    /// Walk the counters. Returns `None` once after the last one, then starts over.
    pub fn get_next(&self) -> Option<(&'static str, u64)> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        if *cursor >= VALUES.len() {
            *cursor = 0;
            return None;
        }
        let i = *cursor;
        *cursor += 1;
        Some((VALUES[i], self.counters[i].load(Ordering::Relaxed)))
    }

    /// Names of all counters.
    pub fn values(&self) -> &'static [&'static str] {
        &VALUES
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for c in &self.counters {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_counts_nothing() {
        let m = Monitor::new(false);
        m.record(Op::Rotation);
        assert_eq!(m.get(CTXT_ROTATION), Some(0));
        m.set_enabled(true);
        m.record(Op::Rotation);
        m.record(Op::Rotation);
        assert_eq!(m.get(CTXT_ROTATION), Some(2));
        assert_eq!(m.get("bootstrap"), None);
    }

    #[test]
    fn test_get_next_cycles() {
        let m = Monitor::new(true);
        m.record(Op::CtxtPtxtAddition);
        let first: Vec<_> = std::iter::from_fn(|| m.get_next()).collect();
        assert_eq!(first.len(), VALUES.len());
        assert_eq!(first[3], (CTXT_PTXT_ADDITION, 1));
        let second: Vec<_> = std::iter::from_fn(|| m.get_next()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset() {
        let m = Monitor::new(true);
        m.record(Op::CtxtCtxtMultiplication);
        m.reset();
        assert_eq!(m.get(CTXT_CTXT_MULTIPLICATION), Some(0));
        assert_eq!(m.values().len(), 5);
    }
}
