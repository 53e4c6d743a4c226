use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const LEVEL_PATTERN: &str = r"(?i)\b(TRACE|DEBUG|INFO|INFORMATION|WARN|WARNING|ERROR|ERR|FATAL|CRITICAL|CRIT|NOTICE|ALERT|EMERG)\b";

const TIMESTAMP_PATTERNS: &[&str] = &[
    // 2025-10-17T02:26:16+0200, 2025-10-17 02:26:16.123Z
    r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{3,9})?(?:Z|[+-]\d{2}:?\d{2})?",
    // [2025-10-17 02:26:16]
    r"^\[\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{3,9})?\]",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%z"];

/// Grafana Loki push API.
pub struct LokiSink {
    push_url: String,
    client: reqwest::Client,
    level_pattern: Regex,
    timestamp_patterns: Vec<Regex>,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(LokiSink::new(endpoint)?))
}

impl LokiSink {
    pub fn new(endpoint: &SinkEndpoint) -> Result<Self, SinkError> {
        let build_error = |e: regex::Error| SinkError::Build {
            backend: "loki".to_string(),
            reason: e.to_string(),
        };

        let timestamp_patterns = TIMESTAMP_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;

        Ok(Self {
            push_url: format!("{}/loki/api/v1/push", base_url(&endpoint.url)),
            client: build_client(&endpoint.options)?,
            level_pattern: Regex::new(LEVEL_PATTERN).map_err(build_error)?,
            timestamp_patterns,
        })
    }

    /// Split a raw line into (cleaned text, normalized level, timestamp in ns).
    ///
    /// The level keyword is removed from the text since it becomes a label.
    /// Lines without a parseable leading timestamp get the current time.
    pub fn parse_line(&self, line: &str) -> (String, Option<String>, i64) {
        let timestamp_ns = self
            .timestamp_patterns
            .iter()
            .find_map(|p| p.find(line))
            .and_then(|m| parse_timestamp(m.as_str().trim_matches(|c| c == '[' || c == ']')))
            .unwrap_or_else(Utc::now)
            .timestamp_nanos_opt()
            .unwrap_or_default();

        let mut text = line.to_string();
        let mut level = None;
        if let Some(captures) = self.level_pattern.captures(line) {
            level = Some(normalize_level(&captures[1]));
            text = self.level_pattern.replace(line, "").into_owned();
        }

        let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (cleaned, level, timestamp_ns)
    }

    pub fn payload(&self, entry: &LogEntry) -> Value {
        let (cleaned, level, timestamp_ns) = self.parse_line(&entry.line);

        let mut stream = Map::new();
        stream.insert("job".to_string(), json!("logrelay"));
        stream.insert("name".to_string(), json!(entry.source_name));
        stream.insert("subname".to_string(), json!(entry.source_subname));
        stream.insert("filepath".to_string(), json!(entry.source_path));
        if let Some(level) = level {
            stream.insert("level".to_string(), json!(level));
        }
        for (key, value) in &entry.labels {
            stream.insert(key.clone(), json!(value));
        }

        json!({
            "streams": [{
                "stream": stream,
                "values": [[timestamp_ns.to_string(), cleaned]],
            }]
        })
    }
}

#[async_trait]
impl Sink for LokiSink {
    fn name(&self) -> &str {
        "loki"
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let request = self.client.post(&self.push_url).json(&self.payload(entry));
        send_request("loki", request, &[204]).await
    }
}

fn normalize_level(raw: &str) -> String {
    match raw.to_uppercase().as_str() {
        "INFORMATION" => "INFO".to_string(),
        "WARNING" => "WARN".to_string(),
        "ERR" => "ERROR".to_string(),
        "FATAL" | "CRIT" => "CRITICAL".to_string(),
        other => other.to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.replace(',', ".");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
            return Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> LokiSink {
        LokiSink::new(&SinkEndpoint::new("loki", "http://localhost:3100/")).unwrap()
    }

    #[test]
    fn test_push_url() {
        assert_eq!(sink().push_url, "http://localhost:3100/loki/api/v1/push");
    }

    #[test]
    fn test_level_extracted_and_removed() {
        let (cleaned, level, _) = sink().parse_line("worker   ERROR   disk full");
        assert_eq!(level.as_deref(), Some("ERROR"));
        assert_eq!(cleaned, "worker disk full");

        let (_, level, _) = sink().parse_line("[warning] low memory");
        assert_eq!(level.as_deref(), Some("WARN"));

        let (_, level, _) = sink().parse_line("fatal: crashed");
        assert_eq!(level.as_deref(), Some("CRITICAL"));

        let (cleaned, level, _) = sink().parse_line("plain text");
        assert_eq!(level, None);
        assert_eq!(cleaned, "plain text");
    }

    #[test]
    fn test_leading_timestamp_is_used() {
        let (_, _, ts) = sink().parse_line("2025-10-17T02:26:16Z INFO started");
        let expected = DateTime::parse_from_rfc3339("2025-10-17T02:26:16Z").unwrap();
        assert_eq!(ts, expected.timestamp_nanos_opt().unwrap());

        let (_, _, ts) = sink().parse_line("2025-10-17T02:26:16+0200 started");
        let expected = DateTime::parse_from_rfc3339("2025-10-17T00:26:16Z").unwrap();
        assert_eq!(ts, expected.timestamp_nanos_opt().unwrap());
    }

    #[test]
    fn test_missing_timestamp_uses_now() {
        let before = Utc::now().timestamp_nanos_opt().unwrap();
        let (_, _, ts) = sink().parse_line("no time here");
        assert!(ts >= before);
    }

    #[test]
    fn test_payload_labels() {
        let mut entry = LogEntry::new("ERROR boom", "app", "MAIN", "/var/log/app.log");
        entry.labels.insert("env".to_string(), "prod".to_string());

        let payload = sink().payload(&entry);
        let stream = &payload["streams"][0]["stream"];
        assert_eq!(stream["job"], "logrelay");
        assert_eq!(stream["name"], "app");
        assert_eq!(stream["subname"], "MAIN");
        assert_eq!(stream["level"], "ERROR");
        assert_eq!(stream["env"], "prod");
        assert_eq!(payload["streams"][0]["values"][0][1], "boom");
    }
}
