use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// `RUST_LOG` wins; otherwise `info` with the chattier dependencies held at `warn`.
fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,sqlparser=warn,sqlx=warn,hyper=warn,reqwest=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber. Later calls are no-ops.
pub fn init_tracing() {
    INIT_LOGGING.call_once(|| {
        // Another subscriber (e.g. a test harness) may already be installed.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(default_filter())
            .with_target(true)
            .try_init();
    });
}
