use crate::source::entry::SourceKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BUFFER_DIR: &str = "/var/lib/logrelay/buffer";
pub const DEFAULT_DELIMITER: &str = "\n";
pub const JOURNAL_SOURCE_NAME: &str = "journald";

/// Everything derived from one pass over the config directory.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub sources: Vec<SourceDescriptor>,
    /// Every backend endpoint declared by a usable file, whether or not its
    /// patterns matched anything yet.
    pub endpoints: Vec<SinkEndpoint>,
    pub settings: AgentSettings,
}

/// A validated log source, one per concrete path.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub name: String,
    pub subname: String,
    pub path: String,
    pub delimiter: String,
    pub labels: BTreeMap<String, String>,
    /// Admitted entries per second
    pub rate_limit: Option<f64>,
    pub batch_size: Option<usize>,
    pub disk_buffer: bool,
    pub sinks: Vec<SinkEndpoint>,
}

impl SourceDescriptor {
    pub fn file(name: &str, subname: &str, path: &str) -> Self {
        Self {
            kind: SourceKind::File,
            name: name.to_string(),
            subname: subname.to_string(),
            path: path.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            labels: BTreeMap::new(),
            rate_limit: None,
            batch_size: None,
            disk_buffer: false,
            sinks: Vec::new(),
        }
    }

    pub fn journal(labels: BTreeMap<String, String>, sinks: Vec<SinkEndpoint>) -> Self {
        Self {
            kind: SourceKind::Journal,
            name: JOURNAL_SOURCE_NAME.to_string(),
            subname: "*".to_string(),
            path: JOURNAL_SOURCE_NAME.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            labels,
            rate_limit: None,
            batch_size: None,
            disk_buffer: false,
            sinks,
        }
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.name, &self.subname, &self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Journal,
}

/// One configured backend destination.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEndpoint {
    pub backend: String,
    pub url: String,
    pub options: SinkOptions,
}

impl SinkEndpoint {
    pub fn new(backend: &str, url: &str) -> Self {
        Self {
            backend: backend.to_lowercase(),
            url: url.to_string(),
            options: SinkOptions::default(),
        }
    }

    /// Registry key; two endpoints with the same key share one sink instance.
    pub fn instance_key(&self) -> String {
        format!("{}:{}", self.backend, self.url)
    }
}

/// Backend-specific knobs from a file's `SINK_OPTIONS` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkOptions {
    #[serde(default = "default_sink_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    pub index_prefix: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tag: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub hostname: Option<String>,
}

fn default_sink_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            timeout: default_sink_timeout(),
            index_prefix: None,
            username: None,
            password: None,
            tag: None,
            database: None,
            table: None,
            hostname: None,
        }
    }
}

/// Process-wide settings, read from `default.{json,yml,yaml}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Seconds between auto-reload passes; 0 disables.
    pub auto_reload_interval: u64,
    pub queue_size_limit: Option<usize>,
    pub buffer_dir: PathBuf,
    pub wal_retention: Duration,
    /// Zero disables periodic WAL replay (startup replay still runs).
    pub replay_interval: Duration,
    pub journal_enabled: bool,
    pub journal_labels: BTreeMap<String, String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            auto_reload_interval: 0,
            queue_size_limit: None,
            buffer_dir: PathBuf::from(DEFAULT_BUFFER_DIR),
            wal_retention: Duration::from_secs(24 * 3600),
            replay_interval: Duration::from_secs(30),
            journal_enabled: false,
            journal_labels: BTreeMap::new(),
        }
    }
}

/// Top-level keys that configure the agent rather than name a source.
pub const RESERVED_KEYS: &[&str] = &[
    "JOURNALCTL",
    "JOURNALCTL_LABELS",
    "AUTO_RELOAD_INTERVAL",
    "QUEUE_SIZE_LIMIT",
    "BUFFER_DIR",
    "WAL_RETENTION",
    "REPLAY_INTERVAL",
    "SINK_OPTIONS",
];
