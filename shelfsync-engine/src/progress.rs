use std::sync::atomic::{AtomicUsize, Ordering};

/// Immutable progress snapshot. `value` is the completion percentage in the
/// range 0 to 100.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub id: String,
    pub completed: usize,
    pub total: usize,
    pub value: f64,
}

/// Monotonic counter over a known total. Snapshots taken from one tracker
/// never report a decreasing fraction.
#[derive(Debug)]
pub struct ProgressTracker {
    id: String,
    total: usize,
    completed: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(total: usize, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            total,
            completed: AtomicUsize::new(0),
        }
    }

    /// Current snapshot without advancing the counter.
    pub fn peek(&self) -> Progress {
        self.snapshot(self.completed.load(Ordering::Acquire))
    }

    /// Advance the counter and return the new snapshot.
    pub fn incr(&self) -> Progress {
        let next = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        self.snapshot(next)
    }

    /// Force the snapshot to 100%, regardless of how many items actually
    /// completed. Guarantees a clean terminal event even when items were
    /// skipped.
    pub fn terminate(&self) -> Progress {
        self.completed.fetch_max(self.total, Ordering::AcqRel);
        self.snapshot(self.total)
    }

    fn snapshot(&self, completed: usize) -> Progress {
        let completed = completed.min(self.total);
        let value = if self.total == 0 {
            100.0
        } else {
            (completed as f64 / self.total as f64) * 100.0
        };
        Progress {
            id: self.id.clone(),
            completed,
            total: self.total,
            value,
        }
    }
}
