use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the process-wide subscriber. `RUST_LOG` overrides the default filter.
pub fn init(debug: bool) {
    let default_filter = if debug { "logrelay=debug" } else { "logrelay=info" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();
}
