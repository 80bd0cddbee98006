#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use fiberlocal::{Runtime, RuntimeConfig};
use proptest::prelude::ProptestConfig;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Default seed used by test runtimes.
pub const DEFAULT_TEST_SEED: u64 = 0xDEAD_BEEF;

/// Seeds used when a test sweeps interleavings.
pub const INTERLEAVING_SEEDS: [u64; 8] = [0, 1, 2, 7, 42, 0xDEAD_BEEF, 0x5EED_5EED, u64::MAX];

/// Initializes tracing output for tests (once per process).
///
/// Controlled by `RUST_LOG`; silent by default.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Creates a runtime with the default test seed.
#[must_use]
pub fn test_runtime() -> Runtime {
    Runtime::with_seed(DEFAULT_TEST_SEED)
}

/// Creates a runtime with the given seed and a tight step bound.
#[must_use]
pub fn seeded_runtime(seed: u64) -> Runtime {
    Runtime::new(RuntimeConfig::new(seed).max_steps(100_000))
}

/// Proptest configuration with the given case count.
#[must_use]
pub fn cases(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}
