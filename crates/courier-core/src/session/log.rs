//! Bounded per-session log.
//!
//! Entries are immutable once appended. When the sink is full the oldest
//! entries are dropped so that only the most recent `capacity` remain.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAPACITY: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl LogEntry {
    /// `[timestamp] text`, the line format used for downloads.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.text
        )
    }
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<LogEntry>,
    /// Entries ever appended, including the ones since dropped.
    appended: u64,
}

#[derive(Debug)]
pub struct LogSink {
    ring: Mutex<Ring>,
    capacity: usize,
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(256)),
                appended: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&self, text: impl Into<String>) {
        let text = text.into();

        let mut ring = self.lock();
        // Stamped under the lock so stored order and timestamp order agree.
        ring.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            text,
        });
        ring.appended += 1;
        while ring.entries.len() > self.capacity {
            ring.entries.pop_front();
        }
    }

    /// Copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Retained entries appended at or after `cursor`, plus the cursor to
    /// pass next time. Start from 0 to follow a log as it grows; entries
    /// that were dropped before being read are skipped.
    pub fn since(&self, cursor: u64) -> (Vec<LogEntry>, u64) {
        let ring = self.lock();
        let first = ring.appended - ring.entries.len() as u64;
        let skip = cursor.saturating_sub(first) as usize;
        let entries = ring.entries.iter().skip(skip).cloned().collect();
        (entries, ring.appended)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize retained entries as one `[timestamp] text` line each.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.snapshot() {
            let _ = writeln!(out, "{}", entry.to_line());
        }
        out
    }
}

impl LogSink {
    // A panic while holding the lock cannot leave the ring half-written, so a
    // poisoned guard is still safe to use.
    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.ring
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn keeps_most_recent_entries_on_overflow() {
        let sink = LogSink::new(5);
        for i in 0..8 {
            sink.append(format!("entry {i}"));
        }

        let texts: Vec<String> = sink.snapshot().into_iter().map(|e| e.text).collect();
        assert_eq!(
            texts,
            vec!["entry 3", "entry 4", "entry 5", "entry 6", "entry 7"]
        );
    }

    #[test]
    fn snapshot_is_ordered_by_time() {
        let sink = LogSink::new(100);
        for i in 0..50 {
            sink.append(format!("{i}"));
        }
        let snapshot = sink.snapshot();
        assert!(
            snapshot
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        );
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let sink = LogSink::new(10);
        sink.append("first");
        let snapshot = sink.snapshot();
        sink.append("second");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let sink = Arc::new(LogSink::new(10_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        sink.append(format!("t{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.len(), 1000);
        let from_t0: Vec<String> = sink
            .snapshot()
            .into_iter()
            .map(|e| e.text)
            .filter(|t| t.starts_with("t0-"))
            .collect();
        let expected: Vec<String> = (0..250).map(|i| format!("t0-{i}")).collect();
        assert_eq!(from_t0, expected);
    }

    #[test]
    fn since_follows_new_entries_and_skips_dropped_ones() {
        let sink = LogSink::new(3);
        sink.append("a");
        sink.append("b");

        let (first, cursor) = sink.since(0);
        assert_eq!(first.len(), 2);
        assert_eq!(cursor, 2);

        for text in ["c", "d", "e", "f"] {
            sink.append(text);
        }
        let (next, cursor) = sink.since(cursor);
        let texts: Vec<String> = next.into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["d", "e", "f"]);
        assert_eq!(cursor, 6);

        let (none, same) = sink.since(cursor);
        assert!(none.is_empty());
        assert_eq!(same, 6);
    }

    #[test]
    fn render_emits_one_line_per_entry() {
        let sink = LogSink::new(10);
        sink.append("hello");
        sink.append("world");

        let rendered = sink.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] hello"));
        assert!(lines[1].ends_with("] world"));
    }
}
