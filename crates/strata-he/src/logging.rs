//! Tracing subscriber setup.
//!
//! Filter priority, highest first:
//!
//! 1. `STRATA_LOG` (per-target directives, e.g. `strata_he=debug,warn`)
//! 2. `RUST_LOG`
//! 3. the level passed to [`init_with_level`], or `warn` for [`init`]
//!
//! The library itself only emits events; installing a subscriber is left to the
//! embedding application or test.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Project-specific filter variable.
pub const LOG_ENV: &str = "STRATA_LOG";

/// Install a stderr subscriber with the default `warn` level.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    init_with_level(Level::WARN)
}

/// Install a stderr subscriber, falling back to `level` when neither
/// `STRATA_LOG` nor `RUST_LOG` is set.
pub fn init_with_level(level: Level) -> bool {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .compact();

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

fn build_env_filter(level: Level) -> EnvFilter {
    // Unparseable STRATA_LOG falls through to RUST_LOG.
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(level.as_str())
}
