use crate::config::parse::load_config_dir;
use crate::config::types::SourceDescriptor;
use crate::pipeline::dispatcher::{ControlSender, DispatcherCommand};
use crate::source::entry::SourceKey;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodically re-reads the config directory and hands newly derived
/// sources to the dispatcher.
///
/// Sources that disappear from the configuration keep running; only
/// additions are propagated.
pub struct AutoReloader {
    config_dir: PathBuf,
    period: Duration,
    control: ControlSender,
    known: HashSet<SourceKey>,
}

impl AutoReloader {
    pub fn new(
        config_dir: PathBuf,
        period: Duration,
        control: ControlSender,
        initial: &[SourceDescriptor],
    ) -> Self {
        Self {
            config_dir,
            period,
            control,
            known: initial.iter().map(SourceDescriptor::key).collect(),
        }
    }

    /// Descriptors whose key has not been seen before; marks them as seen.
    pub fn new_sources(&mut self, derived: Vec<SourceDescriptor>) -> Vec<SourceDescriptor> {
        derived
            .into_iter()
            .filter(|desc| self.known.insert(desc.key()))
            .collect()
    }

    /// One reload pass. Returns false once the dispatcher is gone.
    pub fn reload_once(&mut self) -> bool {
        let config = match load_config_dir(&self.config_dir) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Reload failed, keeping current sources");
                return true;
            }
        };

        let added = self.new_sources(config.sources);
        if added.is_empty() {
            debug!("Reload found no new sources");
            return true;
        }

        info!(count = added.len(), "Reload found new sources");
        self.control.send(DispatcherCommand::Register(added)).is_ok()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.period.as_secs(), "Auto-reload started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.reload_once() {
                        warn!("Dispatcher stopped, ending auto-reload");
                        break;
                    }
                }
            }
        }

        info!("Auto-reload stopped");
    }
}
