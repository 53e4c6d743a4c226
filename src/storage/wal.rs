use crate::source::entry::LogEntry;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const RECORD_EXTENSION: &str = "log";
const PENDING_DIR: &str = "pending";
const PROCESSING_DIR: &str = "processing";

#[derive(Debug, Error)]
pub enum WalError {
    #[error("WAL io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize entry: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("malformed WAL record {path}: {reason}")]
    MalformedRecord { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, WalError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WalError + '_ {
    move |source| WalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One durable entry; lives in exactly one of `pending/` or `processing/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub sequence: u64,
    pub path: PathBuf,
}

/// File-per-record write-ahead log for one source.
///
/// Layout: `<root>/pending/<seq>.log` and `<root>/processing/<seq>.log`,
/// where `<seq>` is zero-padded to ten digits and holds one JSON entry.
#[derive(Debug)]
pub struct DiskWal {
    root: PathBuf,
    pending_dir: PathBuf,
    processing_dir: PathBuf,
    sequence: u64,
}

impl DiskWal {
    /// Directory for a source's WAL under `buffer_root`.
    pub fn root_for(buffer_root: &Path, name: &str, subname: &str) -> PathBuf {
        buffer_root
            .join(sanitize_component(name))
            .join(sanitize_component(subname))
    }

    /// Open (creating if needed) the WAL rooted at `root`.
    ///
    /// Records left in `processing/` by an interrupted delivery are moved back
    /// to `pending/`, then the sequence counter resumes after the highest
    /// pending record.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let pending_dir = root.join(PENDING_DIR);
        let processing_dir = root.join(PROCESSING_DIR);
        fs::create_dir_all(&pending_dir).map_err(io_err(&pending_dir))?;
        fs::create_dir_all(&processing_dir).map_err(io_err(&processing_dir))?;

        let mut wal = Self {
            root,
            pending_dir,
            processing_dir,
            sequence: 0,
        };

        let recovered = wal.recover_in_flight()?;
        if recovered > 0 {
            warn!(
                root = %wal.root.display(),
                count = recovered,
                "Recovered interrupted WAL records, they will be delivered again"
            );
        }

        wal.sequence = wal
            .scan(&wal.pending_dir)?
            .last()
            .map(|r| r.sequence)
            .unwrap_or(0);

        debug!(root = %wal.root.display(), sequence = wal.sequence, "Opened WAL");
        Ok(wal)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last sequence number assigned.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Persist an entry; returns only after the data reached stable storage.
    pub fn write(&mut self, entry: &LogEntry) -> Result<WalRecord> {
        let payload = serde_json::to_vec(entry)?;
        let sequence = self.sequence + 1;
        let path = self.pending_dir.join(record_file_name(sequence));

        let result = (|| -> std::io::Result<()> {
            let mut file = File::create(&path)?;
            file.write_all(&payload)?;
            file.flush()?;
            file.sync_all()
        })();

        if let Err(source) = result {
            error!(path = %path.display(), error = %source, "Failed to write WAL record");
            let _ = fs::remove_file(&path);
            return Err(WalError::Io { path, source });
        }

        self.sequence = sequence;
        Ok(WalRecord { sequence, path })
    }

    /// Pending records in ascending sequence order.
    pub fn list_pending(&self) -> Result<Vec<WalRecord>> {
        self.scan(&self.pending_dir)
    }

    pub fn list_processing(&self) -> Result<Vec<WalRecord>> {
        self.scan(&self.processing_dir)
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.list_pending()?.len())
    }

    pub fn read(&self, record: &WalRecord) -> Result<LogEntry> {
        let bytes = fs::read(&record.path).map_err(io_err(&record.path))?;
        serde_json::from_slice(&bytes).map_err(|e| WalError::MalformedRecord {
            path: record.path.clone(),
            reason: e.to_string(),
        })
    }

    pub fn move_to_processing(&self, record: &WalRecord) -> Result<WalRecord> {
        self.move_record(record, &self.processing_dir)
    }

    pub fn move_back_to_pending(&self, record: &WalRecord) -> Result<WalRecord> {
        self.move_record(record, &self.pending_dir)
    }

    /// Remove a record after its delivery was confirmed.
    pub fn delete_processed(&self, record: &WalRecord) -> Result<()> {
        match fs::remove_file(&record.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WalError::Io {
                path: record.path.clone(),
                source,
            }),
        }
    }

    /// Delete records in either directory older than `max_age`.
    ///
    /// This is a data-loss safety valve for records that can never be
    /// delivered, not part of normal delivery.
    pub fn cleanup_stale(&self, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for dir in [&self.pending_dir, &self.processing_dir] {
            for record in self.scan(dir)? {
                let modified = match fs::metadata(&record.path).and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(e) => {
                        error!(path = %record.path.display(), error = %e, "Failed to stat WAL record");
                        continue;
                    }
                };

                if modified < cutoff {
                    warn!(path = %record.path.display(), "Removing stale WAL record");
                    match fs::remove_file(&record.path) {
                        Ok(()) => removed += 1,
                        Err(e) => {
                            error!(path = %record.path.display(), error = %e, "Failed to remove stale WAL record")
                        }
                    }
                }
            }
        }

        if removed > 0 {
            info!(root = %self.root.display(), count = removed, "Stale WAL cleanup finished");
        }
        Ok(removed)
    }

    fn move_record(&self, record: &WalRecord, dir: &Path) -> Result<WalRecord> {
        let target = dir.join(record_file_name(record.sequence));
        fs::rename(&record.path, &target).map_err(io_err(&record.path))?;
        Ok(WalRecord {
            sequence: record.sequence,
            path: target,
        })
    }

    fn recover_in_flight(&self) -> Result<usize> {
        let in_flight = self.scan(&self.processing_dir)?;
        for record in &in_flight {
            self.move_back_to_pending(record)?;
        }
        Ok(in_flight.len())
    }

    fn scan(&self, dir: &Path) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        for dir_entry in fs::read_dir(dir).map_err(io_err(dir))? {
            let path = dir_entry.map_err(io_err(dir))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(sequence) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            records.push(WalRecord { sequence, path });
        }
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }
}

fn record_file_name(sequence: u64) -> String {
    format!("{:010}.{}", sequence, RECORD_EXTENSION)
}

/// Strip characters that would let a source name escape the buffer root.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();
    let cleaned = cleaned.replace("..", "");
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}
