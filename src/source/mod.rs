pub mod entry;
pub mod file;
pub mod journal;

pub use entry::{LogEntry, SourceKey};
pub use file::FileWatcher;
pub use journal::JournalWatcher;

use crate::config::types::{SourceDescriptor, SourceKind};
use crate::pipeline::channel::IntakeSender;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, Instrument};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("journal reader '{program}' could not be started: {source}")]
    JournalUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of a watcher task: `Created → Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Stopped,
}

/// Handle to a spawned watcher task.
pub struct WatcherHandle {
    key: SourceKey,
    cancel: CancellationToken,
    state: watch::Receiver<WatcherState>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn key(&self) -> &SourceKey {
        &self.key
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Ask the watcher to stop; it exits at its next read boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(source = %self.key, error = %e, "Watcher task panicked");
        }
    }
}

/// Spawn the watcher variant matching the descriptor's kind.
///
/// The watcher's token is a child of `parent`, so cancelling the agent
/// stops every watcher.
pub fn spawn_watcher(
    descriptor: &SourceDescriptor,
    tx: IntakeSender,
    parent: &CancellationToken,
) -> WatcherHandle {
    let key = descriptor.key();
    let cancel = parent.child_token();
    let (state_tx, state_rx) = watch::channel(WatcherState::Created);

    let descriptor = descriptor.clone();
    let token = cancel.clone();
    let span = info_span!("watcher", source = %key);

    let task = tokio::spawn(
        async move {
            state_tx.send_replace(WatcherState::Running);

            let result = match descriptor.kind {
                SourceKind::File => FileWatcher::new(descriptor).run(tx, token).await,
                SourceKind::Journal => JournalWatcher::new(descriptor.labels).run(tx, token).await,
            };

            if let Err(e) = result {
                error!(error = %e, "Watcher terminated");
            }

            state_tx.send_replace(WatcherState::Stopped);
        }
        .instrument(span),
    );

    WatcherHandle {
        key,
        cancel,
        state: state_rx,
        task,
    }
}

/// Every watcher the agent has started.
#[derive(Default)]
pub struct WatcherSet {
    handles: Vec<WatcherHandle>,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: WatcherHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn running(&self) -> usize {
        self.handles
            .iter()
            .filter(|h| h.state() == WatcherState::Running)
            .count()
    }

    pub async fn stop_all(self) {
        for handle in &self.handles {
            handle.stop();
        }
        for handle in self.handles {
            handle.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::intake_queue;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::{sleep, timeout, Duration};

    #[tokio::test]
    async fn test_watcher_lifecycle() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let desc = SourceDescriptor::file("app", "MAIN", &temp_file.path().display().to_string());

        let (tx, mut rx) = intake_queue();
        let root = CancellationToken::new();
        let handle = spawn_watcher(&desc, tx, &root);
        assert_eq!(handle.key(), &desc.key());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.state(), WatcherState::Running);

        writeln!(temp_file, "hello").unwrap();
        temp_file.flush().unwrap();
        let entry = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(entry.line, "hello");

        let mut set = WatcherSet::new();
        set.push(handle);
        assert_eq!(set.running(), 1);

        root.cancel();
        timeout(Duration::from_secs(2), set.stop_all()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_source_stops_watcher() {
        let desc = SourceDescriptor::file("app", "MAIN", "/nonexistent/logrelay/app.log");
        let (tx, _rx) = intake_queue();
        let handle = spawn_watcher(&desc, tx, &CancellationToken::new());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.state(), WatcherState::Stopped);
        handle.join().await;
    }
}
