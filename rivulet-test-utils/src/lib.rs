use std::sync::Once;

use rand::SeedableRng;
use rand::rngs::StdRng;

static INIT: Once = Once::new();

/// Initialize tracing for test binaries. Safe to call multiple times.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        use tracing_subscriber::filter::EnvFilter;
        use tracing_subscriber::fmt;
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // Another harness may have installed a subscriber already.
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic RNG for randomized property checks.
///
/// `RIVULET_TEST_SEED` overrides `default_seed` so a failing run can be
/// replayed.
pub fn seeded_rng(default_seed: u64) -> StdRng {
    let seed = std::env::var("RIVULET_TEST_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_seed);
    StdRng::seed_from_u64(seed)
}
