use crate::source::entry::LogEntry;

/// Ordered accumulator for one source's entries.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    max_size: usize,
    pending: Vec<LogEntry>,
}

impl BatchBuffer {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            pending: Vec::with_capacity(max_size),
        }
    }

    /// Append an entry; returns true once the buffer has reached its size threshold.
    pub fn push(&mut self, entry: LogEntry) -> bool {
        self.pending.push(entry);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.max_size
    }

    /// Take every buffered entry, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.max_size))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
