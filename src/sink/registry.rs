use crate::config::types::SinkEndpoint;
use crate::sink::backends::{clickhouse, elasticsearch, fluentbit, graylog, loki, victorialogs};
use crate::sink::traits::{Sink, SinkError};
use crate::source::entry::LogEntry;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

pub type SinkConstructor = fn(&SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError>;

/// Backend identifiers accepted in `{BACKEND}_IP` keys.
const BACKENDS: &[(&str, SinkConstructor)] = &[
    ("loki", loki::build),
    ("elasticsearch", elasticsearch::build),
    ("elastic", elasticsearch::build),
    ("opensearch", elasticsearch::build_opensearch),
    ("graylog", graylog::build),
    ("victorialogs", victorialogs::build),
    ("fluentbit", fluentbit::build),
    ("clickhouse", clickhouse::build),
];

/// Live sink instances, shared by every source that targets the same
/// `backend:url`.
#[derive(Default)]
pub struct SinkRegistry {
    instances: HashMap<String, Arc<dyn Sink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn available_backends() -> Vec<&'static str> {
        BACKENDS.iter().map(|(name, _)| *name).collect()
    }

    fn constructor(backend: &str) -> Result<SinkConstructor, SinkError> {
        BACKENDS
            .iter()
            .find(|(name, _)| *name == backend)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| SinkError::UnknownBackend {
                backend: backend.to_string(),
                available: Self::available_backends().join(", "),
            })
    }

    /// Insert a prebuilt sink under an explicit key.
    pub fn register(&mut self, key: impl Into<String>, sink: Arc<dyn Sink>) {
        self.instances.insert(key.into(), sink);
    }

    /// Get or build the sink for one endpoint.
    pub fn get_or_build(&mut self, endpoint: &SinkEndpoint) -> Result<Arc<dyn Sink>, SinkError> {
        let key = endpoint.instance_key();
        if let Some(sink) = self.instances.get(&key) {
            return Ok(sink.clone());
        }

        let build = Self::constructor(&endpoint.backend)?;
        let sink = build(endpoint)?;
        info!(backend = %endpoint.backend, url = %endpoint.url, "Initialized sink");
        self.instances.insert(key, sink.clone());
        Ok(sink)
    }

    /// Resolve a source's endpoints to sink instances.
    ///
    /// Endpoints that fail to build are logged and skipped, so a source may
    /// end up with fewer sinks than it named.
    pub fn resolve(&mut self, endpoints: &[SinkEndpoint]) -> Vec<Arc<dyn Sink>> {
        let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(endpoints.len());
        let mut seen = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let key = endpoint.instance_key();
            if seen.contains(&key) {
                continue;
            }
            match self.get_or_build(endpoint) {
                Ok(sink) => {
                    seen.push(key);
                    sinks.push(sink);
                }
                Err(e) => {
                    error!(backend = %endpoint.backend, url = %endpoint.url, error = %e, "Failed to initialize sink");
                }
            }
        }

        sinks
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Sink>> {
        self.instances.get(key).cloned()
    }

    /// Every live instance, ordered by key.
    pub fn all(&self) -> Vec<Arc<dyn Sink>> {
        self.names()
            .iter()
            .filter_map(|key| self.instances.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Send one entry to every sink concurrently.
///
/// Succeeds when at least one sink accepted it. An empty sink list is a
/// failure, so the caller can fall back to the WAL.
pub async fn deliver(sinks: &[Arc<dyn Sink>], entry: &LogEntry) -> bool {
    if sinks.is_empty() {
        return false;
    }
    join_all(sinks.iter().map(|sink| sink.send(entry)))
        .await
        .into_iter()
        .any(|accepted| accepted)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory sink whose acceptance can be toggled.
    pub struct MockSink {
        name: String,
        accept: AtomicBool,
        received: Mutex<Vec<LogEntry>>,
    }

    impl MockSink {
        pub fn new(name: &str, accept: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                accept: AtomicBool::new(accept),
                received: Mutex::new(Vec::new()),
            })
        }

        pub fn set_accept(&self, accept: bool) {
            self.accept.store(accept, Ordering::SeqCst);
        }

        pub fn received(&self) -> Vec<LogEntry> {
            self.received.lock().unwrap().clone()
        }

        pub fn lines(&self) -> Vec<String> {
            self.received().into_iter().map(|e| e.line).collect()
        }
    }

    #[async_trait]
    impl Sink for MockSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, entry: &LogEntry) -> bool {
            if self.accept.load(Ordering::SeqCst) {
                self.received.lock().unwrap().push(entry.clone());
                true
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockSink;
    use super::*;

    #[test]
    fn test_unknown_backend_is_reported() {
        let mut registry = SinkRegistry::new();
        let result = registry.get_or_build(&SinkEndpoint::new("kafka", "http://kafka:9092"));
        match result {
            Err(SinkError::UnknownBackend { backend, available }) => {
                assert_eq!(backend, "kafka");
                assert!(available.contains("loki"));
            }
            _ => panic!("expected UnknownBackend"),
        }
    }

    #[test]
    fn test_resolve_deduplicates_instances() {
        let mut registry = SinkRegistry::new();
        let endpoints = vec![
            SinkEndpoint::new("loki", "http://loki:3100"),
            SinkEndpoint::new("loki", "http://loki:3100"),
            SinkEndpoint::new("graylog", "http://graylog:12201"),
            SinkEndpoint::new("nope", "http://nope"),
        ];

        let sinks = registry.resolve(&endpoints);
        assert_eq!(sinks.len(), 2);
        assert_eq!(registry.len(), 2);

        // A second source naming the same endpoint shares the instance
        let again = registry.resolve(&endpoints[..1]);
        assert!(Arc::ptr_eq(&sinks[0], &again[0]));
        assert_eq!(registry.names(), vec!["graylog:http://graylog:12201", "loki:http://loki:3100"]);
    }

    #[test]
    fn test_aliases_share_constructor() {
        let mut registry = SinkRegistry::new();
        let sink = registry
            .get_or_build(&SinkEndpoint::new("elastic", "http://es:9200"))
            .unwrap();
        assert_eq!(sink.name(), "elasticsearch");

        let sink = registry
            .get_or_build(&SinkEndpoint::new("opensearch", "http://os:9200"))
            .unwrap();
        assert_eq!(sink.name(), "opensearch");
    }

    #[tokio::test]
    async fn test_deliver_any_success() {
        let ok = MockSink::new("ok", true);
        let bad = MockSink::new("bad", false);
        let entry = LogEntry::new("x", "app", "MAIN", "/a.log");

        let sinks: Vec<Arc<dyn Sink>> = vec![bad.clone(), ok.clone()];
        assert!(deliver(&sinks, &entry).await);
        assert_eq!(ok.lines(), vec!["x"]);

        let sinks: Vec<Arc<dyn Sink>> = vec![bad.clone()];
        assert!(!deliver(&sinks, &entry).await);
        assert!(!deliver(&[], &entry).await);
    }
}
