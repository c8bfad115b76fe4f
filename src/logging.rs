//! Log setup for the binary.
//!
//! Everything goes to stderr so stdout can carry JSON reports.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "tiatrack=debug"
    } else {
        "tiatrack=info"
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `verbose`.
/// Later calls are no-ops.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        // another subscriber may already be installed (tests, embedding)
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
