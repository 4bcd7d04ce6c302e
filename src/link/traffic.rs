//! In-memory record of lines sent to and received from the controller.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of entries kept
pub const DEFAULT_TRAFFIC_HISTORY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outgoing => f.write_str("TX"),
            Direction::Incoming => f.write_str("RX"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficEntry {
    pub at: DateTime<Utc>,
    pub direction: Direction,
    pub line: String,
}

impl fmt::Display for TrafficEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.at.format("%H:%M:%S%.3f"),
            self.direction,
            self.line
        )
    }
}

/// Bounded ring of traffic entries, shared between the command channel and
/// the reader task. Oldest entries fall off first. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct TrafficLog {
    entries: Arc<Mutex<VecDeque<TrafficEntry>>>,
    capacity: usize,
}

impl TrafficLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TrafficEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, direction: Direction, line: &str) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(TrafficEntry {
            at: Utc::now(),
            direction,
            line: line.to_string(),
        });
    }

    /// Copy of all entries, oldest first
    pub fn entries(&self) -> Vec<TrafficEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for TrafficLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRAFFIC_HISTORY)
    }
}
