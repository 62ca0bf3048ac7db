// Tracing setup shared by applications embedding the client.
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, or `default_directive` when it is unset or invalid.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a fmt subscriber once; later calls leave the first one in place.
pub fn init_tracing(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(false)
        .try_init();
}
