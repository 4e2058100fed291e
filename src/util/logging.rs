use tracing_subscriber::{EnvFilter, fmt};

/// Tracing bootstrap for the demo binary. `RUST_LOG` overrides the
/// default `info` level; library users install their own subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}
