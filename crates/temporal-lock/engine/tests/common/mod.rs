//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use temporal_lock_engine::{EngineConfig, ManualClock, TemporalLockEngine};
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine on a manual clock with the test configuration.
pub fn engine() -> (Arc<TemporalLockEngine>, ManualClock) {
    engine_with(EngineConfig::testing())
}

pub fn engine_with(config: EngineConfig) -> (Arc<TemporalLockEngine>, ManualClock) {
    init_tracing();
    let clock = ManualClock::starting_now();
    let engine = TemporalLockEngine::with_clock(config, Arc::new(clock.clone()))
        .expect("test config is valid");
    (Arc::new(engine), clock)
}
