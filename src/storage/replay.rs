use crate::sink::registry::deliver;
use crate::sink::traits::Sink;
use crate::storage::wal::{DiskWal, WalError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counts from one replay pass over a single WAL.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub delivered: usize,
    /// Records still pending after the pass.
    pub remaining: usize,
    pub malformed: usize,
}

impl ReplayOutcome {
    pub fn merge(&mut self, other: ReplayOutcome) {
        self.delivered += other.delivered;
        self.remaining += other.remaining;
        self.malformed += other.malformed;
    }
}

/// Deliver pending records in sequence order.
///
/// Each record is moved to `processing/` for the attempt, deleted on
/// success and moved back on failure. The first failure ends the pass for
/// this WAL so later records never overtake a stuck one. Unreadable records
/// are deleted and skipped.
pub async fn replay_wal(wal: &DiskWal, sinks: &[Arc<dyn Sink>]) -> Result<ReplayOutcome, WalError> {
    let pending = wal.list_pending()?;
    let mut outcome = ReplayOutcome::default();
    if pending.is_empty() {
        return Ok(outcome);
    }

    debug!(root = %wal.root().display(), count = pending.len(), "Replaying WAL");

    for (index, record) in pending.iter().enumerate() {
        let in_flight = wal.move_to_processing(record)?;

        let entry = match wal.read(&in_flight) {
            Ok(entry) => entry,
            Err(e @ WalError::MalformedRecord { .. }) => {
                error!(error = %e, "Dropping unreadable WAL record");
                wal.delete_processed(&in_flight)?;
                outcome.malformed += 1;
                continue;
            }
            Err(e) => {
                wal.move_back_to_pending(&in_flight)?;
                return Err(e);
            }
        };

        if deliver(sinks, &entry).await {
            wal.delete_processed(&in_flight)?;
            outcome.delivered += 1;
        } else {
            wal.move_back_to_pending(&in_flight)?;
            outcome.remaining = pending.len() - index;
            warn!(
                root = %wal.root().display(),
                sequence = record.sequence,
                remaining = outcome.remaining,
                "WAL replay halted on undeliverable record"
            );
            break;
        }
    }

    if outcome.delivered > 0 {
        info!(
            root = %wal.root().display(),
            delivered = outcome.delivered,
            remaining = outcome.remaining,
            "WAL replay finished"
        );
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::registry::testing::MockSink;
    use crate::source::entry::LogEntry;
    use std::fs;
    use tempfile::TempDir;

    fn entry(line: &str) -> LogEntry {
        LogEntry::new(line, "app", "MAIN", "/var/log/app.log")
    }

    #[tokio::test]
    async fn test_replay_delivers_in_sequence_order() {
        let dir = TempDir::new().unwrap();
        let mut wal = DiskWal::open(dir.path()).unwrap();
        for line in ["one", "two", "three"] {
            wal.write(&entry(line)).unwrap();
        }

        let sink = MockSink::new("mock", true);
        let sinks: Vec<Arc<dyn Sink>> = vec![sink.clone()];
        let outcome = replay_wal(&wal, &sinks).await.unwrap();

        assert_eq!(outcome.delivered, 3);
        assert_eq!(outcome.remaining, 0);
        assert_eq!(sink.lines(), vec!["one", "two", "three"]);
        assert_eq!(wal.pending_count().unwrap(), 0);
        assert!(wal.list_processing().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_replay_keeps_record_pending_and_stops() {
        let dir = TempDir::new().unwrap();
        let mut wal = DiskWal::open(dir.path()).unwrap();
        for line in ["one", "two", "three"] {
            wal.write(&entry(line)).unwrap();
        }

        let sink = MockSink::new("mock", false);
        let sinks: Vec<Arc<dyn Sink>> = vec![sink.clone()];
        let outcome = replay_wal(&wal, &sinks).await.unwrap();

        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.remaining, 3);
        let sequences: Vec<u64> = wal.list_pending().unwrap().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(wal.list_processing().unwrap().is_empty());

        // Backend recovers: the next pass resumes from the stuck record
        sink.set_accept(true);
        let outcome = replay_wal(&wal, &sinks).await.unwrap();
        assert_eq!(outcome.delivered, 3);
        assert_eq!(sink.lines(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut wal = DiskWal::open(dir.path()).unwrap();
        wal.write(&entry("one")).unwrap();
        let bad = wal.write(&entry("two")).unwrap();
        wal.write(&entry("three")).unwrap();
        fs::write(&bad.path, b"{not json").unwrap();

        let sink = MockSink::new("mock", true);
        let sinks: Vec<Arc<dyn Sink>> = vec![sink.clone()];
        let outcome = replay_wal(&wal, &sinks).await.unwrap();

        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.malformed, 1);
        assert_eq!(sink.lines(), vec!["one", "three"]);
        assert_eq!(wal.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_sinks_leaves_records_pending() {
        let dir = TempDir::new().unwrap();
        let mut wal = DiskWal::open(dir.path()).unwrap();
        wal.write(&entry("one")).unwrap();

        let outcome = replay_wal(&wal, &[]).await.unwrap();
        assert_eq!(outcome.remaining, 1);
        assert_eq!(wal.pending_count().unwrap(), 1);
    }
}
