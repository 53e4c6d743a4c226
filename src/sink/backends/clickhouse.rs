use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const DEFAULT_DATABASE: &str = "logs";
const DEFAULT_TABLE: &str = "logrelay_logs";
const DEFAULT_USER: &str = "default";

/// ClickHouse HTTP interface, one `INSERT ... VALUES` per entry.
pub struct ClickHouseSink {
    base: String,
    database: String,
    table: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(ClickHouseSink::new(endpoint)?))
}

impl ClickHouseSink {
    pub fn new(endpoint: &SinkEndpoint) -> Result<Self, SinkError> {
        let options = &endpoint.options;
        Ok(Self {
            base: base_url(&endpoint.url),
            database: options.database.clone().unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            table: options.table.clone().unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            user: options.username.clone().unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: options.password.clone().unwrap_or_default(),
            client: build_client(options)?,
        })
    }

    pub fn insert_query(&self, entry: &LogEntry) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        format!(
            "INSERT INTO {}.{} (timestamp, message, job, service, category, filepath) VALUES ('{}', '{}', 'logrelay', '{}', '{}', '{}')",
            self.database,
            self.table,
            timestamp,
            escape(&entry.line),
            escape(&entry.source_name),
            escape(&entry.source_subname),
            escape(&entry.source_path),
        )
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let query = self.insert_query(entry);
        let request = self.client.post(&self.base).query(&[
            ("query", query.as_str()),
            ("user", self.user.as_str()),
            ("password", self.password.as_str()),
        ]);
        send_request("clickhouse", request, &[200]).await
    }
}

// Backslashes first, otherwise the quote escape would be doubled
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("it's"), "it''s");
        assert_eq!(escape(r"C:\tmp"), r"C:\\tmp");
    }

    #[test]
    fn test_insert_query_defaults() {
        let sink = ClickHouseSink::new(&SinkEndpoint::new("clickhouse", "http://ch:8123")).unwrap();
        let query = sink.insert_query(&LogEntry::new("user's login", "auth", "MAIN", "/var/log/auth.log"));

        assert!(query.starts_with("INSERT INTO logs.logrelay_logs (timestamp, message, job, service, category, filepath) VALUES ("));
        assert!(query.contains("'user''s login'"));
        assert!(query.contains("'auth', 'MAIN', '/var/log/auth.log')"));
        assert_eq!(sink.user, "default");
    }
}
