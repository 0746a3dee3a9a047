use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Output goes to stderr so stdout stays
/// reserved for RPC responses.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
