//! Shared test utilities

#![allow(dead_code)]

pub mod mock_platform;

pub use mock_platform::*;

use merge_queue_probe::provision::RulesetIdentities;
use merge_queue_probe::scenario::ScenarioContext;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Integration ids used by every test ruleset
pub const fn identities() -> RulesetIdentities {
    RulesetIdentities {
        actions_integration_id: 15368,
        bypass_integration_id: 1_178_750,
    }
}

/// A scenario context over `mock`, with the mock's current branches as the
/// run's listing
pub async fn context(mock: &Arc<MockPlatform>) -> ScenarioContext {
    ScenarioContext::new(mock.clone(), identities())
        .await
        .expect("branch listing")
}
