use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single log line read from a source, normalized for delivery.
///
/// The serialized field names match the on-disk WAL format, so a record
/// written by one version of the agent replays in another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub line: String,
    #[serde(rename = "name")]
    pub source_name: String,
    #[serde(rename = "subname")]
    pub source_subname: String,
    #[serde(rename = "filepath")]
    pub source_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(
        line: impl Into<String>,
        source_name: impl Into<String>,
        source_subname: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            line: line.into(),
            source_name: source_name.into(),
            source_subname: source_subname.into(),
            source_path: source_path.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(&self.source_name, &self.source_subname, &self.source_path)
    }
}

/// Identity of a running source: `name:subname:path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(name: &str, subname: &str, path: &str) -> Self {
        Self(format!("{}:{}:{}", name, subname, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
