use crate::config::types::SourceDescriptor;
use crate::pipeline::channel::IntakeSender;
use crate::source::entry::LogEntry;
use crate::source::WatcherError;
use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Follows a file like `tail -f`, starting at its current end.
pub struct FileWatcher {
    descriptor: SourceDescriptor,
    path: PathBuf,
    poll_interval: Duration,
}

#[derive(Debug, PartialEq, Eq)]
enum FileChange {
    Unchanged,
    Replaced,
    Truncated,
}

impl FileWatcher {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        let path = PathBuf::from(&descriptor.path);
        Self {
            descriptor,
            path,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn open(&self) -> Result<(BufReader<File>, u64), WatcherError> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| WatcherError::SourceUnavailable {
                path: self.path.display().to_string(),
                source,
            })?;
        let inode = get_inode(&file.metadata().await?);
        Ok((BufReader::new(file), inode))
    }

    /// Read lines until cancelled, pushing each into the intake queue.
    ///
    /// Fails only when the file cannot be opened at startup; the caller logs
    /// the error and the watcher stays stopped.
    pub async fn run(self, tx: IntakeSender, cancel: CancellationToken) -> Result<(), WatcherError> {
        let (mut reader, mut inode) = self.open().await?;
        let mut offset = reader.seek(SeekFrom::End(0)).await?;

        info!(
            path = %self.path.display(),
            name = %self.descriptor.name,
            subname = %self.descriptor.subname,
            "Started watching file"
        );

        // Bytes of a line whose terminator has not been written yet
        let mut pending: Vec<u8> = Vec::new();

        while !cancel.is_cancelled() {
            let read = reader.read_until(b'\n', &mut pending).await?;

            if read == 0 {
                match self.check_change(inode, offset).await {
                    FileChange::Unchanged => {}
                    FileChange::Truncated => {
                        info!(path = %self.path.display(), "File truncated, reading from start");
                        offset = reader.seek(SeekFrom::Start(0)).await?;
                        pending.clear();
                        continue;
                    }
                    FileChange::Replaced => {
                        if let Ok((new_reader, new_inode)) = self.open().await {
                            info!(path = %self.path.display(), "File rotated, reopening");
                            reader = new_reader;
                            inode = new_inode;
                            offset = 0;
                            pending.clear();
                            continue;
                        }
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.poll_interval) => {}
                }
                continue;
            }

            offset += read as u64;
            if pending.last() != Some(&b'\n') {
                continue;
            }

            let raw = String::from_utf8_lossy(&pending);
            let line = strip_delimiter(&raw, &self.descriptor.delimiter).to_string();
            pending.clear();

            let entry = LogEntry::new(
                line,
                &self.descriptor.name,
                &self.descriptor.subname,
                &self.descriptor.path,
            )
            .with_labels(self.descriptor.labels.clone());

            if tx.send(entry).is_err() {
                debug!("Intake queue closed, stopping file watcher");
                break;
            }
        }

        info!(path = %self.path.display(), "Stopped watching file");
        Ok(())
    }

    async fn check_change(&self, inode: u64, offset: u64) -> FileChange {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => {
                if get_inode(&metadata) != inode {
                    FileChange::Replaced
                } else if metadata.len() < offset {
                    FileChange::Truncated
                } else {
                    FileChange::Unchanged
                }
            }
            // Moved away and not recreated yet
            Err(_) => FileChange::Unchanged,
        }
    }
}

/// Drop the line terminator and any trailing delimiter characters.
pub fn strip_delimiter<'a>(line: &'a str, delimiter: &str) -> &'a str {
    line.trim_end_matches('\n')
        .trim_end_matches(|c: char| delimiter.contains(c))
}

#[cfg(unix)]
fn get_inode(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn get_inode(metadata: &Metadata) -> u64 {
    // Creation time stands in for an inode; rotation swaps it
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    if let Ok(created) = metadata.created() {
        created.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::intake_queue;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::time::timeout;

    fn descriptor_for(path: &std::path::Path) -> SourceDescriptor {
        let mut desc = SourceDescriptor::file("app", "MAIN", &path.display().to_string());
        desc.labels.insert("env".to_string(), "test".to_string());
        desc
    }

    #[test]
    fn test_strip_delimiter() {
        assert_eq!(strip_delimiter("hello\n", "\n"), "hello");
        assert_eq!(strip_delimiter("hello;;\n", ";"), "hello");
        assert_eq!(strip_delimiter("hello\r\n", "\r\n"), "hello");
        assert_eq!(strip_delimiter("hello", "\n"), "hello");
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let (tx, _rx) = intake_queue();
        let watcher = FileWatcher::new(SourceDescriptor::file("a", "b", "/nonexistent/logrelay.log"));

        let result = watcher.run(tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(WatcherError::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_tails_only_new_lines() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "old line").unwrap();
        temp_file.flush().unwrap();

        let (tx, mut rx) = intake_queue();
        let cancel = CancellationToken::new();
        let watcher = FileWatcher::new(descriptor_for(temp_file.path()))
            .with_poll_interval(Duration::from_millis(10));
        let handle = tokio::spawn(watcher.run(tx, cancel.clone()));

        // Give the watcher time to open and seek to the end
        sleep(Duration::from_millis(100)).await;
        writeln!(temp_file, "new line 1").unwrap();
        writeln!(temp_file, "new line 2").unwrap();
        temp_file.flush().unwrap();

        let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.line, "new line 1");
        assert_eq!(second.line, "new line 2");
        assert_eq!(first.source_name, "app");
        assert_eq!(first.source_subname, "MAIN");
        assert_eq!(first.labels.get("env").map(String::as_str), Some("test"));

        cancel.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_terminator() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let (tx, mut rx) = intake_queue();
        let cancel = CancellationToken::new();
        let watcher = FileWatcher::new(descriptor_for(temp_file.path()))
            .with_poll_interval(Duration::from_millis(10));
        let handle = tokio::spawn(watcher.run(tx, cancel.clone()));

        sleep(Duration::from_millis(100)).await;
        write!(temp_file, "half ").unwrap();
        temp_file.flush().unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        writeln!(temp_file, "and the rest").unwrap();
        temp_file.flush().unwrap();

        let entry = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(entry.line, "half and the rest");

        cancel.cancel();
        timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
    }
}
