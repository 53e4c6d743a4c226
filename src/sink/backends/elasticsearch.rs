use crate::config::types::SinkEndpoint;
use crate::sink::http::{base_url, build_client, send_request};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_INDEX_PREFIX: &str = "logrelay";

/// Document indexing into daily indices; OpenSearch speaks the same API.
pub struct ElasticsearchSink {
    name: &'static str,
    base: String,
    index_prefix: String,
    credentials: Option<(String, Option<String>)>,
    client: reqwest::Client,
}

pub fn build(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(ElasticsearchSink::new(endpoint, "elasticsearch")?))
}

pub fn build_opensearch(endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
    Ok(Arc::new(ElasticsearchSink::new(endpoint, "opensearch")?))
}

impl ElasticsearchSink {
    pub fn new(endpoint: &SinkEndpoint, name: &'static str) -> Result<Self, SinkError> {
        let options = &endpoint.options;
        Ok(Self {
            name,
            base: base_url(&endpoint.url),
            index_prefix: options
                .index_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_INDEX_PREFIX.to_string()),
            credentials: options
                .username
                .clone()
                .map(|user| (user, options.password.clone())),
            client: build_client(options)?,
        })
    }

    /// `{base}/{prefix}-YYYY-MM-DD/_doc` for today's UTC date.
    pub fn document_url(&self) -> String {
        format!(
            "{}/{}-{}/_doc",
            self.base,
            self.index_prefix,
            Utc::now().format("%Y-%m-%d")
        )
    }

    pub fn document(entry: &LogEntry) -> Value {
        json!({
            "@timestamp": Utc::now().to_rfc3339(),
            "message": entry.line,
            "job": "logrelay",
            "service": entry.source_name,
            "category": entry.source_subname,
            "filepath": entry.source_path,
        })
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn send(&self, entry: &LogEntry) -> bool {
        let mut request = self
            .client
            .post(self.document_url())
            .json(&Self::document(entry));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        send_request(self.name, request, &[200, 201]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_url_uses_prefix_and_date() {
        let mut endpoint = SinkEndpoint::new("elasticsearch", "http://es:9200/");
        endpoint.options.index_prefix = Some("app-logs".to_string());
        let sink = ElasticsearchSink::new(&endpoint, "elasticsearch").unwrap();

        let url = sink.document_url();
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(url, format!("http://es:9200/app-logs-{}/_doc", today));
    }

    #[test]
    fn test_document_fields() {
        let entry = LogEntry::new("hello", "nginx", "ACCESS", "/var/log/access.log");
        let doc = ElasticsearchSink::document(&entry);
        assert_eq!(doc["message"], "hello");
        assert_eq!(doc["service"], "nginx");
        assert_eq!(doc["category"], "ACCESS");
        assert_eq!(doc["filepath"], "/var/log/access.log");
        assert!(doc["@timestamp"].is_string());
    }

    #[test]
    fn test_credentials_from_options() {
        let mut endpoint = SinkEndpoint::new("opensearch", "http://os:9200");
        endpoint.options.username = Some("admin".to_string());
        let sink = ElasticsearchSink::new(&endpoint, "opensearch").unwrap();
        assert_eq!(sink.name(), "opensearch");
        assert_eq!(sink.credentials, Some(("admin".to_string(), None)));
    }
}
