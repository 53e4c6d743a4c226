use crate::config::types::{AgentSettings, SourceDescriptor, SourceKind};
use crate::pipeline::backpressure::{BackpressureMonitor, OverflowPolicy};
use crate::pipeline::batch::BatchBuffer;
use crate::pipeline::channel::{drain_now, intake_queue, IntakeReceiver, IntakeSender};
use crate::pipeline::rate_limit::TokenBucket;
use crate::sink::registry::{deliver, SinkRegistry};
use crate::sink::traits::Sink;
use crate::source::entry::{LogEntry, SourceKey};
use crate::source::{spawn_watcher, WatcherSet};
use crate::storage::replay::{replay_wal, ReplayOutcome};
use crate::storage::wal::DiskWal;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often queue depth is sampled and periodic maintenance runs.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// How long one dequeue waits before the iteration counts as idle.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Requests from outside the dispatcher loop.
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Start tracking (and watching) any descriptor whose key is not active yet.
    Register(Vec<SourceDescriptor>),
}

pub type ControlSender = mpsc::UnboundedSender<DispatcherCommand>;

/// Running totals, returned when the dispatcher stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub saved_to_wal: u64,
    pub dropped: u64,
    pub rate_limited: u64,
    pub replayed: u64,
}

/// Per-source state, indexed by SourceKey.
struct SourceState {
    rate_limiter: Option<TokenBucket>,
    batch: Option<BatchBuffer>,
    /// Root of the shared WAL this source writes to.
    wal: Option<PathBuf>,
    sinks: Vec<Arc<dyn Sink>>,
}

/// A WAL plus the sinks its records are replayed to.
struct WalSlot {
    wal: DiskWal,
    sinks: Vec<Arc<dyn Sink>>,
}

/// The single control loop between the intake queue and the sinks.
///
/// All per-source state lives here and is only touched from this loop.
/// Sources added at runtime arrive as [`DispatcherCommand`]s.
pub struct Dispatcher {
    intake: IntakeReceiver,
    intake_tx: IntakeSender,
    control: mpsc::UnboundedReceiver<DispatcherCommand>,
    control_tx: ControlSender,
    registry: SinkRegistry,
    sources: HashMap<SourceKey, SourceState>,
    /// Journal entries carry per-unit keys; they route by source name.
    aliases: HashMap<String, SourceKey>,
    wals: HashMap<PathBuf, WalSlot>,
    active: HashSet<SourceKey>,
    watchers: WatcherSet,
    monitor: BackpressureMonitor,
    settings: AgentSettings,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(registry: SinkRegistry, settings: AgentSettings) -> Self {
        let (intake_tx, intake) = intake_queue();
        let (control_tx, control) = mpsc::unbounded_channel();

        Self {
            intake,
            intake_tx,
            control,
            control_tx,
            registry,
            sources: HashMap::new(),
            aliases: HashMap::new(),
            wals: HashMap::new(),
            active: HashSet::new(),
            watchers: WatcherSet::new(),
            monitor: BackpressureMonitor::new(settings.queue_size_limit),
            settings,
            stats: DispatchStats::default(),
        }
    }

    /// Producer handle for the intake queue.
    pub fn intake_sender(&self) -> IntakeSender {
        self.intake_tx.clone()
    }

    pub fn control_sender(&self) -> ControlSender {
        self.control_tx.clone()
    }

    pub fn intake_depth(&self) -> usize {
        self.intake.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn source_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, key: &SourceKey) -> bool {
        self.active.contains(key)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Pending WAL records for a source, if it has disk buffering.
    pub fn wal_pending(&self, key: &SourceKey) -> Option<usize> {
        let root = self.sources.get(key)?.wal.as_ref()?;
        self.wals.get(root)?.wal.pending_count().ok()
    }

    /// Create per-source state for a descriptor without starting its watcher.
    ///
    /// Returns false when the key is already active.
    pub fn register_source(&mut self, descriptor: &SourceDescriptor) -> bool {
        let key = descriptor.key();
        if self.active.contains(&key) {
            debug!(source = %key, "Source already active");
            return false;
        }

        let sinks = self.registry.resolve(&descriptor.sinks);
        if sinks.is_empty() {
            warn!(source = %key, "Source has no usable sink");
        }

        let wal = if descriptor.disk_buffer {
            self.open_wal(descriptor, &sinks)
        } else {
            None
        };

        let state = SourceState {
            rate_limiter: descriptor
                .rate_limit
                .filter(|rate| *rate > 0.0)
                .map(TokenBucket::new),
            batch: descriptor
                .batch_size
                .filter(|size| *size > 0)
                .map(BatchBuffer::new),
            wal,
            sinks,
        };

        if descriptor.kind == SourceKind::Journal {
            self.aliases.insert(descriptor.name.clone(), key.clone());
        }

        info!(
            source = %key,
            rate_limit = ?descriptor.rate_limit,
            batch_size = ?descriptor.batch_size,
            disk_buffer = state.wal.is_some(),
            sinks = state.sinks.len(),
            "Registered source"
        );

        self.sources.insert(key.clone(), state);
        self.active.insert(key);
        true
    }

    /// Register a descriptor and start its watcher under `cancel`.
    pub fn activate(&mut self, descriptor: &SourceDescriptor, cancel: &CancellationToken) -> bool {
        if !self.register_source(descriptor) {
            return false;
        }
        let handle = spawn_watcher(descriptor, self.intake_tx.clone(), cancel);
        self.watchers.push(handle);
        true
    }

    fn open_wal(&mut self, descriptor: &SourceDescriptor, sinks: &[Arc<dyn Sink>]) -> Option<PathBuf> {
        let root = DiskWal::root_for(&self.settings.buffer_dir, &descriptor.name, &descriptor.subname);

        if let Some(slot) = self.wals.get_mut(&root) {
            for sink in sinks {
                if !slot.sinks.iter().any(|s| Arc::ptr_eq(s, sink)) {
                    slot.sinks.push(sink.clone());
                }
            }
            return Some(root);
        }

        match DiskWal::open(&root) {
            Ok(wal) => {
                self.wals.insert(
                    root.clone(),
                    WalSlot {
                        wal,
                        sinks: sinks.to_vec(),
                    },
                );
                Some(root)
            }
            Err(e) => {
                error!(
                    source = %descriptor.key(),
                    error = %e,
                    "Failed to open WAL, disk buffering disabled for source"
                );
                None
            }
        }
    }

    fn route(&self, entry: &LogEntry) -> Option<SourceKey> {
        let key = entry.source_key();
        if self.sources.contains_key(&key) {
            return Some(key);
        }
        self.aliases.get(&entry.source_name).cloned()
    }

    /// Persist an entry to its source's WAL; false when there is none or the write failed.
    fn save_to_wal(&mut self, key: &SourceKey, entry: &LogEntry) -> bool {
        let Some(root) = self.sources.get(key).and_then(|s| s.wal.as_ref()) else {
            return false;
        };
        let Some(slot) = self.wals.get_mut(root) else {
            return false;
        };

        match slot.wal.write(entry) {
            Ok(_) => {
                self.stats.saved_to_wal += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Process one dequeued entry: rate limit, then batch or deliver.
    pub async fn handle_entry(&mut self, entry: LogEntry) {
        let Some(key) = self.route(&entry) else {
            // Not tied to any registered source: best effort to every sink
            let sinks = self.registry.all();
            if deliver(&sinks, &entry).await {
                self.stats.delivered += 1;
            } else {
                self.stats.dropped += 1;
                debug!(source = %entry.source_key(), "Dropped entry from unregistered source");
            }
            return;
        };

        let Some(state) = self.sources.get_mut(&key) else {
            return;
        };

        if let Some(limiter) = state.rate_limiter.as_mut() {
            if !limiter.try_acquire() {
                self.stats.rate_limited += 1;
                if !self.save_to_wal(&key, &entry) {
                    self.stats.dropped += 1;
                    debug!(source = %key, "Dropped rate-limited entry");
                }
                return;
            }
        }

        if let Some(batch) = state.batch.as_mut() {
            if batch.push(entry) {
                self.flush_batch(&key).await;
            }
            return;
        }

        let sinks = state.sinks.clone();
        if deliver(&sinks, &entry).await {
            self.stats.delivered += 1;
        } else if !self.save_to_wal(&key, &entry) {
            self.stats.dropped += 1;
            warn!(source = %key, "Delivery failed, entry dropped");
        }
    }

    /// Deliver every buffered entry for one source and clear its buffer.
    pub async fn flush_batch(&mut self, key: &SourceKey) {
        let (entries, sinks) = match self.sources.get_mut(key) {
            Some(SourceState {
                batch: Some(batch),
                sinks,
                ..
            }) if !batch.is_empty() => (batch.take(), sinks.clone()),
            _ => return,
        };

        let total = entries.len();
        let mut dropped = 0;
        for entry in &entries {
            if deliver(&sinks, entry).await {
                self.stats.delivered += 1;
            } else if !self.save_to_wal(key, entry) {
                dropped += 1;
            }
        }

        self.stats.dropped += dropped;
        if dropped > 0 {
            warn!(source = %key, count = dropped, total = total, "Dropped undeliverable batch entries");
        } else {
            debug!(source = %key, count = total, "Flushed batch");
        }
    }

    pub async fn flush_all(&mut self) {
        let keys: Vec<SourceKey> = self
            .sources
            .iter()
            .filter(|(_, s)| s.batch.as_ref().is_some_and(|b| !b.is_empty()))
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            self.flush_batch(&key).await;
        }
    }

    /// Sample queue depth and apply the overflow policy.
    pub fn check_backpressure(&mut self) {
        let depth = self.intake.len();
        let observation = self.monitor.observe(depth);

        let Some(policy) = observation.overflow else {
            return;
        };

        let drained = drain_now(&mut self.intake);
        let count = drained.len() as u64;

        match policy {
            OverflowPolicy::Discard => {
                self.stats.dropped += count;
                error!(
                    count = count,
                    limit = self.monitor.limit(),
                    "Intake queue overflow, discarded every queued entry"
                );
            }
            OverflowPolicy::DrainToWal => {
                let (saved, dropped) = self.drain_to_wal(drained);
                warn!(
                    saved = saved,
                    dropped = dropped,
                    limit = self.monitor.limit(),
                    "Intake queue overflow, drained queue"
                );
            }
        }

        self.monitor.observe(self.intake.len());
    }

    fn drain_to_wal(&mut self, entries: Vec<LogEntry>) -> (u64, u64) {
        let mut saved = 0;
        let mut dropped = 0;
        for entry in entries {
            let persisted = match self.route(&entry) {
                Some(key) => self.save_to_wal(&key, &entry),
                None => false,
            };
            if persisted {
                saved += 1;
            } else {
                dropped += 1;
            }
        }
        self.stats.dropped += dropped;
        (saved, dropped)
    }

    /// One replay pass over every WAL.
    pub async fn replay_all(&mut self) -> ReplayOutcome {
        let mut total = ReplayOutcome::default();
        for slot in self.wals.values() {
            match replay_wal(&slot.wal, &slot.sinks).await {
                Ok(outcome) => total.merge(outcome),
                Err(e) => error!(root = %slot.wal.root().display(), error = %e, "WAL replay failed"),
            }
        }
        self.stats.replayed += total.delivered as u64;
        total
    }

    pub fn cleanup_stale(&self) -> usize {
        let mut removed = 0;
        for slot in self.wals.values() {
            match slot.wal.cleanup_stale(self.settings.wal_retention) {
                Ok(count) => removed += count,
                Err(e) => error!(root = %slot.wal.root().display(), error = %e, "Stale WAL cleanup failed"),
            }
        }
        removed
    }

    /// Startup pass: drop expired records, then replay the rest.
    pub async fn startup_replay(&mut self) -> ReplayOutcome {
        self.cleanup_stale();
        let outcome = self.replay_all().await;
        if outcome.delivered > 0 || outcome.remaining > 0 {
            info!(
                delivered = outcome.delivered,
                remaining = outcome.remaining,
                malformed = outcome.malformed,
                "Startup WAL replay finished"
            );
        }
        outcome
    }

    fn handle_command(&mut self, command: DispatcherCommand, cancel: &CancellationToken) {
        match command {
            DispatcherCommand::Register(descriptors) => {
                let added = descriptors
                    .iter()
                    .filter(|d| self.activate(d, cancel))
                    .count();
                if added > 0 {
                    info!(count = added, "Started watchers for new sources");
                }
            }
        }
    }

    /// Run until `cancel` fires, then shut down and return the totals.
    pub async fn run(mut self, cancel: CancellationToken) -> DispatchStats {
        let mut check = interval(CHECK_INTERVAL);
        check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_replay = Instant::now();
        let mut last_cleanup = Instant::now();

        info!(sources = self.active.len(), wals = self.wals.len(), "Dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = check.tick() => {
                    self.check_backpressure();

                    let replay_interval = self.settings.replay_interval;
                    if !replay_interval.is_zero() && last_replay.elapsed() >= replay_interval {
                        self.replay_all().await;
                        last_replay = Instant::now();
                    }
                    if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
                        self.cleanup_stale();
                        last_cleanup = Instant::now();
                    }
                }

                Some(command) = self.control.recv() => {
                    self.handle_command(command, &cancel);
                }

                received = timeout(RECV_TIMEOUT, self.intake.recv()) => match received {
                    Ok(Some(entry)) => self.handle_entry(entry).await,
                    Ok(None) => break,
                    Err(_) => self.flush_all().await,
                },
            }
        }

        self.shutdown().await
    }

    async fn shutdown(mut self) -> DispatchStats {
        info!(watchers = self.watchers.len(), "Dispatcher stopping");

        std::mem::take(&mut self.watchers).stop_all().await;
        self.flush_all().await;

        let remaining = drain_now(&mut self.intake);
        if !remaining.is_empty() {
            let (saved, dropped) = self.drain_to_wal(remaining);
            info!(saved = saved, dropped = dropped, "Routed queued entries at shutdown");
        }

        let stats = self.stats;
        info!(
            delivered = stats.delivered,
            saved_to_wal = stats.saved_to_wal,
            dropped = stats.dropped,
            rate_limited = stats.rate_limited,
            replayed = stats.replayed,
            "Dispatcher stopped"
        );
        stats
    }
}
