use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so they stay out of the
/// console answers on stdout.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
