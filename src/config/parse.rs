use super::discover::expand_pattern;
use super::types::*;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DEFAULT_BACKEND: &str = "loki";
const DEFAULT_BACKEND_URL: &str = "http://localhost:3100";
const SETTINGS_FILE_STEM: &str = "default";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no usable configuration found in '{}'", .0.display())]
    NoUsableConfiguration(PathBuf),

    #[error("invalid configuration in '{path}': {reason}")]
    Validation { path: PathBuf, reason: String },

    #[error("invalid path pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// What one config file contributes.
#[derive(Debug)]
struct FileConfig {
    sinks: Vec<SinkEndpoint>,
    /// Descriptors whose `path` is still the configured pattern.
    sources: Vec<SourceDescriptor>,
}

/// Load every config file in `dir` and derive the source list.
///
/// Broken files are logged and skipped; only a directory that yields no
/// source at all is an error.
pub fn load_config_dir(dir: &Path) -> Result<LoadedConfig> {
    if !dir.is_dir() {
        error!(dir = %dir.display(), "Configuration directory does not exist");
        return Err(ConfigError::NoUsableConfiguration(dir.to_path_buf()));
    }

    let files = config_files(dir)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "No configuration files found");
        return Err(ConfigError::NoUsableConfiguration(dir.to_path_buf()));
    }
    debug!(dir = %dir.display(), count = files.len(), "Found configuration files");

    let mut settings = AgentSettings::default();
    let mut settings_sinks = None;
    let mut file_configs = Vec::new();

    for path in &files {
        let document = match read_document(path) {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Skipping configuration file");
                continue;
            }
        };

        let Some(map) = document.as_object() else {
            error!(path = %path.display(), "Skipping configuration file: top level must be an object");
            continue;
        };

        let is_settings_file = path.file_stem().and_then(|s| s.to_str()) == Some(SETTINGS_FILE_STEM);
        if is_settings_file {
            settings = parse_settings(map, path);
        }

        match parse_file(map, path) {
            Ok(Some(config)) => file_configs.push(config),
            Ok(None) => {
                if is_settings_file {
                    settings_sinks = parse_sinks(map, path).ok();
                } else {
                    warn!(path = %path.display(), "No valid log entries, file skipped");
                }
            }
            Err(e) => error!(error = %e, "Skipping configuration file"),
        }
    }

    let mut sources: Vec<SourceDescriptor> = file_configs
        .iter()
        .flat_map(|config| config.sources.iter())
        .flat_map(expand_source)
        .collect();

    if settings.journal_enabled {
        let sinks = file_configs
            .first()
            .map(|config| config.sinks.clone())
            .or_else(|| settings_sinks.clone());
        match sinks {
            Some(sinks) => {
                info!(sinks = sinks.len(), "Journal monitoring enabled");
                sources.push(SourceDescriptor::journal(settings.journal_labels.clone(), sinks));
            }
            None => warn!("Journal monitoring enabled but no backend is configured"),
        }
    }

    if file_configs.is_empty() && sources.is_empty() {
        return Err(ConfigError::NoUsableConfiguration(dir.to_path_buf()));
    }

    let mut endpoints: Vec<SinkEndpoint> = Vec::new();
    let declared = file_configs
        .iter()
        .flat_map(|config| config.sinks.iter())
        .chain(settings_sinks.iter().flatten());
    for endpoint in declared {
        if !endpoints.iter().any(|e| e.instance_key() == endpoint.instance_key()) {
            endpoints.push(endpoint.clone());
        }
    }

    info!(
        files = file_configs.len(),
        sources = sources.len(),
        endpoints = endpoints.len(),
        "Loaded configuration"
    );
    Ok(LoadedConfig {
        sources,
        endpoints,
        settings,
    })
}

/// `*.json`, `*.yaml` and `*.yml` files in `dir`, in filename order.
pub fn config_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_config = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json" | "yaml" | "yml")
        );
        if is_config && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_document(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_settings(map: &Map<String, Value>, path: &Path) -> AgentSettings {
    let defaults = AgentSettings::default();

    let journal_enabled = match map.get("JOURNALCTL") {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "on" | "yes" | "true" | "1"),
        Some(other) => {
            warn!(value = %other, "Invalid JOURNALCTL value, journal monitoring disabled");
            false
        }
        None => false,
    };

    let journal_labels = match map.get("JOURNALCTL_LABELS") {
        Some(value) => string_map(value).unwrap_or_else(|| {
            warn!("JOURNALCTL_LABELS must be an object of strings, ignoring");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };

    let queue_size_limit = match setting::<usize>(map, "QUEUE_SIZE_LIMIT", path) {
        Some(0) => {
            warn!("QUEUE_SIZE_LIMIT must be positive, ignoring");
            None
        }
        limit => limit,
    };

    AgentSettings {
        auto_reload_interval: setting(map, "AUTO_RELOAD_INTERVAL", path)
            .unwrap_or(defaults.auto_reload_interval),
        queue_size_limit,
        buffer_dir: setting::<PathBuf>(map, "BUFFER_DIR", path)
            .map(|dir| super::expand_tilde(&dir))
            .unwrap_or(defaults.buffer_dir),
        wal_retention: duration_setting(map, "WAL_RETENTION", path).unwrap_or(defaults.wal_retention),
        replay_interval: duration_setting(map, "REPLAY_INTERVAL", path)
            .unwrap_or(defaults.replay_interval),
        journal_enabled,
        journal_labels,
    }
}

/// One settings key, or `None` (with a warning) when its value has the wrong shape.
fn setting<T: DeserializeOwned>(map: &Map<String, Value>, key: &str, path: &Path) -> Option<T> {
    let value = map.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(path = %path.display(), key, value = %value, error = %e, "Invalid setting, using default");
            None
        }
    }
}

fn duration_setting(map: &Map<String, Value>, key: &str, path: &Path) -> Option<Duration> {
    setting::<humantime_serde::Serde<Duration>>(map, key, path).map(humantime_serde::Serde::into_inner)
}

/// Backend endpoints from the first `*_IP` key, plus `SINK_OPTIONS`.
fn parse_sinks(map: &Map<String, Value>, path: &Path) -> Result<Vec<SinkEndpoint>> {
    let options = match map.get("SINK_OPTIONS") {
        Some(value) => serde_json::from_value::<SinkOptions>(value.clone()).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Invalid SINK_OPTIONS, using defaults");
            SinkOptions::default()
        }),
        None => SinkOptions::default(),
    };

    let Some((key, value)) = map.iter().find(|(key, _)| key.ends_with("_IP")) else {
        warn!(path = %path.display(), "No backend (*_IP) configured, defaulting to loki");
        let mut endpoint = SinkEndpoint::new(DEFAULT_BACKEND, DEFAULT_BACKEND_URL);
        endpoint.options = options;
        return Ok(vec![endpoint]);
    };

    let backend = key.trim_end_matches("_IP").to_lowercase();
    let urls: Vec<&str> = match value {
        Value::String(url) => vec![url.as_str()],
        Value::Array(urls) => urls.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let endpoints: Vec<SinkEndpoint> = urls
        .into_iter()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| {
            let url = if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("http://{}", url)
            };
            let mut endpoint = SinkEndpoint::new(&backend, &url);
            endpoint.options = options.clone();
            endpoint
        })
        .collect();

    if endpoints.is_empty() {
        return Err(ConfigError::Validation {
            path: path.to_path_buf(),
            reason: format!("{} is empty", key),
        });
    }
    Ok(endpoints)
}

fn parse_file(map: &Map<String, Value>, path: &Path) -> Result<Option<FileConfig>> {
    let sources = parse_entries(map, path);
    if sources.is_empty() {
        return Ok(None);
    }

    let sinks = parse_sinks(map, path)?;
    let sources = sources
        .into_iter()
        .map(|mut desc| {
            desc.sinks = sinks.clone();
            desc
        })
        .collect();

    Ok(Some(FileConfig { sinks, sources }))
}

fn parse_entries(map: &Map<String, Value>, path: &Path) -> Vec<SourceDescriptor> {
    let mut sources = Vec::new();

    for (name, subconfigs) in map {
        if name.ends_with("_IP") || RESERVED_KEYS.contains(&name.as_str()) {
            continue;
        }
        let Some(subconfigs) = subconfigs.as_object() else {
            warn!(path = %path.display(), entry = %name, "Entry ignored: must be an object");
            continue;
        };

        for (subname, settings) in subconfigs {
            let entry = format!("{}.{}", name, subname);
            let Some(settings) = settings.as_object() else {
                warn!(path = %path.display(), entry = %entry, "Entry ignored: must be an object");
                continue;
            };
            if let Some(desc) = parse_entry(name, subname, settings, path) {
                sources.push(desc);
            }
        }
    }

    sources
}

fn parse_entry(
    name: &str,
    subname: &str,
    settings: &Map<String, Value>,
    path: &Path,
) -> Option<SourceDescriptor> {
    let entry = format!("{}.{}", name, subname);

    let path_file = match settings.get("path_file").and_then(Value::as_str) {
        Some(p) if !p.trim().is_empty() => p.trim(),
        _ => {
            warn!(path = %path.display(), entry = %entry, "Entry ignored: path_file is missing or empty");
            return None;
        }
    };

    let mut desc = SourceDescriptor::file(name, subname, path_file);

    match settings.get("delimiter") {
        Some(Value::String(delimiter)) if !delimiter.is_empty() => desc.delimiter = delimiter.clone(),
        Some(_) => warn!(entry = %entry, "Invalid delimiter, using newline"),
        None => {}
    }

    if let Some(labels) = settings.get("labels") {
        match string_map(labels) {
            Some(labels) => desc.labels = labels,
            None => warn!(entry = %entry, "labels must be an object of strings, ignoring"),
        }
    }

    if let Some(rate) = settings.get("rate_limit") {
        match rate.as_f64() {
            Some(rate) if rate > 0.0 => desc.rate_limit = Some(rate),
            _ => warn!(entry = %entry, value = %rate, "Invalid rate_limit, ignoring"),
        }
    }

    if let Some(size) = settings.get("buffer_size") {
        match size.as_u64() {
            Some(size) if size > 0 => desc.batch_size = Some(size as usize),
            _ => warn!(entry = %entry, value = %size, "Invalid buffer_size, ignoring"),
        }
    }

    if let Some(disk_buffer) = settings.get("disk_buffer") {
        match disk_buffer.as_bool() {
            Some(enabled) => desc.disk_buffer = enabled,
            None => warn!(entry = %entry, value = %disk_buffer, "Invalid disk_buffer, ignoring"),
        }
    }

    Some(desc)
}

/// One descriptor per concrete path the entry's pattern resolves to.
fn expand_source(desc: &SourceDescriptor) -> Vec<SourceDescriptor> {
    match expand_pattern(&desc.path) {
        Ok(paths) => paths
            .into_iter()
            .map(|path| SourceDescriptor {
                path: path.display().to_string(),
                ..desc.clone()
            })
            .collect(),
        Err(e) => {
            error!(source = %desc.key(), error = %e, "Entry ignored");
            Vec::new()
        }
    }
}

// Scalars are stringified; nested values make the whole map invalid
fn string_map(value: &Value) -> Option<BTreeMap<String, String>> {
    let object = value.as_object()?;
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}
