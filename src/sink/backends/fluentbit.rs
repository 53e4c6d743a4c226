use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_TAG: &str = "logrelay";

/// Fluent Bit HTTP input; the URL path selects the tag.
pub struct FluentBitSink {
    tag_url: String,
    client: reqwest::Client,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(FluentBitSink::new(endpoint)?))
}

impl FluentBitSink {
    pub fn new(endpoint: &SinkEndpoint) -> Result<Self, SinkError> {
        let tag = endpoint.options.tag.as_deref().unwrap_or(DEFAULT_TAG);
        Ok(Self {
            tag_url: format!("{}/{}", base_url(&endpoint.url), tag.trim_matches('/')),
            client: build_client(&endpoint.options)?,
        })
    }

    pub fn body(entry: &LogEntry) -> Value {
        let now = Utc::now();
        json!([{
            "date": now.timestamp_millis() as f64 / 1000.0,
            "log": entry.line,
            "job": "logrelay",
            "service": entry.source_name,
            "category": entry.source_subname,
            "filepath": entry.source_path,
        }])
    }
}

#[async_trait]
impl Sink for FluentBitSink {
    fn name(&self) -> &str {
        "fluentbit"
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let request = self.client.post(&self.tag_url).json(&Self::body(entry));
        send_request("fluentbit", request, &[200, 201, 204]).await
    }
}
