use crate::config::types::JOURNAL_SOURCE_NAME;
use crate::pipeline::channel::IntakeSender;
use crate::source::entry::LogEntry;
use crate::source::WatcherError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Follows the systemd journal through `journalctl -f -o json`.
pub struct JournalWatcher {
    labels: BTreeMap<String, String>,
    program: String,
    args: Vec<String>,
}

impl JournalWatcher {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self {
            labels,
            program: "journalctl".to_string(),
            args: ["-f", "-o", "json", "--no-pager"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replace the reader command; anything printing one JSON record per line works.
    pub fn with_command(mut self, program: &str, args: &[&str]) -> Self {
        self.program = program.to_string();
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub async fn run(self, tx: IntakeSender, cancel: CancellationToken) -> Result<(), WatcherError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WatcherError::JournalUnavailable {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            WatcherError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "journal reader has no stdout",
            ))
        })?;

        info!(program = %self.program, "Started watching journal");

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let bytes_read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read?,
            };

            if bytes_read == 0 {
                warn!("Journal reader exited");
                break;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    debug!(error = %e, bytes = buf.len(), "Skipping journal record that is not UTF-8");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let Some(entry) = parse_journal_record(line, &self.labels) else {
                continue;
            };

            if tx.send(entry).is_err() {
                debug!("Intake queue closed, stopping journal watcher");
                break;
            }
        }

        if let Err(e) = child.kill().await {
            debug!(error = %e, "Journal reader already exited");
        }
        info!("Stopped watching journal");
        Ok(())
    }
}

/// Map one `journalctl -o json` record to a log entry.
///
/// Returns `None` for records that are not JSON or carry no message.
pub fn parse_journal_record(line: &str, labels: &BTreeMap<String, String>) -> Option<LogEntry> {
    let record: Value = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(e) => {
            let preview: String = line.chars().take(100).collect();
            debug!(error = %e, record = %preview, "Skipping malformed journal record");
            return None;
        }
    };

    let message = field_text(&record, "MESSAGE")?;
    if message.is_empty() {
        return None;
    }

    let service = match field_text(&record, "_SYSTEMD_UNIT") {
        Some(unit) if !unit.is_empty() => unit.trim_end_matches(".service").to_string(),
        _ => field_text(&record, "SYSLOG_IDENTIFIER").unwrap_or_else(|| "unknown".to_string()),
    };

    Some(
        LogEntry::new(
            message,
            JOURNAL_SOURCE_NAME,
            service.to_uppercase(),
            format!("{}:{}", JOURNAL_SOURCE_NAME, service),
        )
        .with_labels(labels.clone()),
    )
}

// journalctl emits non-UTF-8 field values as arrays of bytes
fn field_text(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(bytes) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().map(|b| b as u8))
                .collect();
            Some(String::from_utf8_lossy(&raw).into_owned())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::intake_queue;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_unit_name_maps_to_subname() {
        let line = r#"{"MESSAGE":"Started nginx","_SYSTEMD_UNIT":"nginx.service","SYSLOG_IDENTIFIER":"systemd"}"#;
        let entry = parse_journal_record(line, &BTreeMap::new()).unwrap();

        assert_eq!(entry.line, "Started nginx");
        assert_eq!(entry.source_name, "journald");
        assert_eq!(entry.source_subname, "NGINX");
        assert_eq!(entry.source_path, "journald:nginx");
    }

    #[test]
    fn test_identifier_fallback_and_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("host".to_string(), "web-1".to_string());

        let line = r#"{"MESSAGE":"session opened","SYSLOG_IDENTIFIER":"sshd"}"#;
        let entry = parse_journal_record(line, &labels).unwrap();
        assert_eq!(entry.source_subname, "SSHD");
        assert_eq!(entry.labels.get("host").map(String::as_str), Some("web-1"));

        let line = r#"{"MESSAGE":"no identity"}"#;
        let entry = parse_journal_record(line, &BTreeMap::new()).unwrap();
        assert_eq!(entry.source_subname, "UNKNOWN");
    }

    #[test]
    fn test_byte_array_message() {
        let line = r#"{"MESSAGE":[104,105],"SYSLOG_IDENTIFIER":"kernel"}"#;
        let entry = parse_journal_record(line, &BTreeMap::new()).unwrap();
        assert_eq!(entry.line, "hi");
    }

    #[test]
    fn test_malformed_and_empty_records_are_skipped() {
        assert!(parse_journal_record("not json", &BTreeMap::new()).is_none());
        assert!(parse_journal_record(r#"{"MESSAGE":""}"#, &BTreeMap::new()).is_none());
        assert!(parse_journal_record(r#"{"_SYSTEMD_UNIT":"a.service"}"#, &BTreeMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_missing_reader_is_reported() {
        let (tx, _rx) = intake_queue();
        let watcher = JournalWatcher::new(BTreeMap::new())
            .with_command("/nonexistent/journalctl-logrelay", &[]);

        let result = watcher.run(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(WatcherError::JournalUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_records_from_command() {
        let (tx, mut rx) = intake_queue();
        let script = r#"echo '{"MESSAGE":"one","SYSLOG_IDENTIFIER":"app"}'; echo 'garbage'; echo '{"MESSAGE":"two","_SYSTEMD_UNIT":"db.service"}'"#;
        let watcher = JournalWatcher::new(BTreeMap::new()).with_command("sh", &["-c", script]);

        timeout(Duration::from_secs(5), watcher.run(tx, CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.line, "one");
        assert_eq!(second.line, "two");
        assert_eq!(second.source_subname, "DB");
        assert!(rx.try_recv().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_record_does_not_stop_watcher() {
        let (tx, mut rx) = intake_queue();
        let script = r#"printf '{"MESSAGE":"one","SYSLOG_IDENTIFIER":"app"}\n\377\376\n{"MESSAGE":"two","SYSLOG_IDENTIFIER":"app"}\n'"#;
        let watcher = JournalWatcher::new(BTreeMap::new()).with_command("sh", &["-c", script]);

        let result = timeout(Duration::from_secs(5), watcher.run(tx, CancellationToken::new()))
            .await
            .unwrap();
        assert!(result.is_ok());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.line, "one");
        assert_eq!(second.line, "two");
        assert!(rx.try_recv().is_err());
    }
}
