//! Log output setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,dirsync=debug";

/// Install the global subscriber.
///
/// `level` wins over `RUST_LOG`, which wins over the default filter.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
