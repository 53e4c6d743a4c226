use crate::config::parse::{load_config_dir, ConfigError};
use crate::config::types::LoadedConfig;
use crate::pipeline::dispatcher::{DispatchStats, Dispatcher};
use crate::reload::AutoReloader;
use crate::sink::registry::SinkRegistry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no sink could be initialized from the configuration")]
    NoSinks,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Load the configuration and run until Ctrl+C.
pub async fn run(config_dir: PathBuf) -> Result<DispatchStats, RunError> {
    info!(config_dir = %config_dir.display(), "Loading configuration");
    let config = load_config_dir(&config_dir)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    run_agent(config, &config_dir, cancel).await
}

/// Build sinks for every configured endpoint, then run the agent.
pub async fn run_agent(
    config: LoadedConfig,
    config_dir: &Path,
    cancel: CancellationToken,
) -> Result<DispatchStats, RunError> {
    let registry = build_registry(SinkRegistry::new(), &config)?;
    run_with_registry(registry, config, config_dir, cancel).await
}

/// Add a sink for each declared endpoint to `registry`.
///
/// Endpoints come from the config files themselves, so a file whose patterns
/// match nothing yet still contributes its backends. Instances already in
/// `registry` are reused. Fails only when the result is empty.
pub fn build_registry(
    mut registry: SinkRegistry,
    config: &LoadedConfig,
) -> Result<SinkRegistry, RunError> {
    registry.resolve(&config.endpoints);
    for desc in &config.sources {
        registry.resolve(&desc.sinks);
    }
    if registry.is_empty() {
        return Err(RunError::NoSinks);
    }
    info!(sinks = ?registry.names(), "Sinks ready");
    Ok(registry)
}

/// Start watchers, replay disk buffers, then run the dispatcher (and the
/// reloader when enabled) until `cancel` fires.
pub async fn run_with_registry(
    registry: SinkRegistry,
    config: LoadedConfig,
    config_dir: &Path,
    cancel: CancellationToken,
) -> Result<DispatchStats, RunError> {
    let settings = config.settings.clone();
    let mut dispatcher = Dispatcher::new(registry, settings.clone());

    for desc in &config.sources {
        dispatcher.activate(desc, &cancel);
    }
    info!(sources = dispatcher.source_count(), "Watchers started");

    dispatcher.startup_replay().await;

    let reloader_handle = if settings.auto_reload_interval > 0 {
        let reloader = AutoReloader::new(
            config_dir.to_path_buf(),
            Duration::from_secs(settings.auto_reload_interval),
            dispatcher.control_sender(),
            &config.sources,
        );
        Some(tokio::spawn(
            reloader.run(cancel.clone()).instrument(info_span!("reloader")),
        ))
    } else {
        None
    };

    let dispatcher_handle = tokio::spawn(
        dispatcher
            .run(cancel.clone())
            .instrument(info_span!("dispatcher")),
    );

    info!("Agent started, press Ctrl+C to shutdown");

    let stats = dispatcher_handle.await?;
    if let Some(handle) = reloader_handle {
        handle.await?;
    }

    info!("Agent shutdown complete");
    Ok(stats)
}
