use crate::source::entry::LogEntry;
use tokio::sync::mpsc;

/// Producer half of the intake queue, cloned into every watcher.
pub type IntakeSender = mpsc::UnboundedSender<LogEntry>;
/// Consumer half of the intake queue, owned by the dispatcher.
pub type IntakeReceiver = mpsc::UnboundedReceiver<LogEntry>;

/// Create the intake queue shared by all watchers.
///
/// The queue is unbounded; its depth is bounded by the dispatcher's
/// backpressure policy instead of by blocking producers.
pub fn intake_queue() -> (IntakeSender, IntakeReceiver) {
    mpsc::unbounded_channel()
}

/// Remove every entry currently queued without waiting for more.
pub fn drain_now(rx: &mut IntakeReceiver) -> Vec<LogEntry> {
    let mut drained = Vec::with_capacity(rx.len());
    while let Ok(entry) = rx.try_recv() {
        drained.push(entry);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_now_empties_queue() {
        let (tx, mut rx) = intake_queue();
        for i in 0..10 {
            tx.send(LogEntry::new(format!("line {}", i), "a", "b", "/c")).unwrap();
        }
        assert_eq!(rx.len(), 10);

        let drained = drain_now(&mut rx);
        assert_eq!(drained.len(), 10);
        assert_eq!(drained[0].line, "line 0");
        assert_eq!(drained[9].line, "line 9");
        assert_eq!(rx.len(), 0);
    }
}
