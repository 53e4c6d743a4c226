use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// GELF over HTTP.
pub struct GraylogSink {
    gelf_url: String,
    host: String,
    client: reqwest::Client,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(GraylogSink::new(endpoint)?))
}

impl GraylogSink {
    pub fn new(endpoint: &SinkEndpoint) -> Result<Self, SinkError> {
        let host = match &endpoint.options.hostname {
            Some(host) => host.clone(),
            None => hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "localhost".to_string()),
        };

        Ok(Self {
            gelf_url: format!("{}/gelf", base_url(&endpoint.url)),
            host,
            client: build_client(&endpoint.options)?,
        })
    }

    pub fn message(&self, entry: &LogEntry) -> Value {
        let now = Utc::now();
        json!({
            "version": "1.1",
            "host": self.host,
            "short_message": entry.line,
            "timestamp": now.timestamp_millis() as f64 / 1000.0,
            "level": 6,
            "_job": "logrelay",
            "_service": entry.source_name,
            "_category": entry.source_subname,
            "_filepath": entry.source_path,
        })
    }
}

#[async_trait]
impl Sink for GraylogSink {
    fn name(&self) -> &str {
        "graylog"
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let request = self.client.post(&self.gelf_url).json(&self.message(entry));
        send_request("graylog", request, &[202]).await
    }
}
