use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// VictoriaLogs JSON-lines ingestion.
pub struct VictoriaLogsSink {
    insert_url: String,
    client: reqwest::Client,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(VictoriaLogsSink::new(endpoint)?))
}

impl VictoriaLogsSink {
    pub fn new(endpoint: &SinkEndpoint) -> Result<Self, SinkError> {
        Ok(Self {
            insert_url: format!("{}/insert/jsonline", base_url(&endpoint.url)),
            client: build_client(&endpoint.options)?,
        })
    }

    pub fn record(entry: &LogEntry) -> Value {
        json!({
            "_time": Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            "_msg": entry.line,
            "job": "logrelay",
            "service": entry.source_name,
            "category": entry.source_subname,
            "filepath": entry.source_path,
        })
    }
}

#[async_trait]
impl Sink for VictoriaLogsSink {
    fn name(&self) -> &str {
        "victorialogs"
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let mut body = Self::record(entry).to_string();
        body.push('\n');

        let request = self
            .client
            .post(&self.insert_url)
            .header(reqwest::header::CONTENT_TYPE, "application/stream+json")
            .body(body);
        send_request("victorialogs", request, &[200, 204]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_fields() {
        let sink = VictoriaLogsSink::new(&SinkEndpoint::new("victorialogs", "http://vl:9428/")).unwrap();
        assert_eq!(sink.insert_url, "http://vl:9428/insert/jsonline");

        let record = VictoriaLogsSink::record(&LogEntry::new("hi", "app", "MAIN", "/a.log"));
        assert_eq!(record["_msg"], "hi");
        assert_eq!(record["category"], "MAIN");
        assert!(record["_time"].as_i64().unwrap() > 0);
    }
}
