use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Diagnostics go to stderr; stdout is reserved for streamed command output.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}
