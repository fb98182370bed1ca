//! Counters and timers shared by the store, its sessions and the tree store.
//!
//! Everything is recorded into one [`Statistics`] sink owned by the store.
//! Readers take copies through [`Statistics::snapshot`]; the sink itself is
//! never exposed by reference to callers outside the crate.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonically increasing event count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    DocumentsLoaded,
    DocumentsStored,
    DocumentsDeleted,
    ReadSessionsOpened,
    ReadSessionsClosed,
    HistoricalReadSessionsOpened,
    HistoricalReadSessionsClosed,
    WriteSessionsOpened,
    WriteSessionsClosed,
    SnapshotReuse,
    SnapshotRebuild,
}

impl Counter {
    pub const ALL: [Counter; 11] = [
        Counter::DocumentsLoaded,
        Counter::DocumentsStored,
        Counter::DocumentsDeleted,
        Counter::ReadSessionsOpened,
        Counter::ReadSessionsClosed,
        Counter::HistoricalReadSessionsOpened,
        Counter::HistoricalReadSessionsClosed,
        Counter::WriteSessionsOpened,
        Counter::WriteSessionsClosed,
        Counter::SnapshotReuse,
        Counter::SnapshotRebuild,
    ];

    /// Human readable name used when rendering a snapshot.
    pub fn name(self) -> &'static str {
        match self {
            Counter::DocumentsLoaded => "Documents loaded",
            Counter::DocumentsStored => "Documents written",
            Counter::DocumentsDeleted => "Documents deleted",
            Counter::ReadSessionsOpened => "Read sessions created",
            Counter::ReadSessionsClosed => "Read sessions disposed",
            Counter::HistoricalReadSessionsOpened => "Historical read sessions created",
            Counter::HistoricalReadSessionsClosed => "Historical read sessions disposed",
            Counter::WriteSessionsOpened => "Write sessions created",
            Counter::WriteSessionsClosed => "Write sessions disposed",
            Counter::SnapshotReuse => "Read-only snapshot reuse",
            Counter::SnapshotRebuild => "Read-only snapshot rebuilds",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An accumulated wall-clock duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timing {
    Serialization,
    Deserialization,
    Attachments,
    Staging,
    Commit,
    Reset,
}

impl Timing {
    pub const ALL: [Timing; 6] = [
        Timing::Serialization,
        Timing::Deserialization,
        Timing::Attachments,
        Timing::Staging,
        Timing::Commit,
        Timing::Reset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Timing::Serialization => "Serialization",
            Timing::Deserialization => "Deserialization",
            Timing::Attachments => "Attachments",
            Timing::Staging => "Git Staging",
            Timing::Commit => "Git Commit",
            Timing::Reset => "Git Reset",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
struct StatisticsInner {
    counts: BTreeMap<Counter, u64>,
    timings: BTreeMap<Timing, Duration>,
}

/// Thread-safe statistics sink.
#[derive(Debug, Default)]
pub struct Statistics {
    inner: Mutex<StatisticsInner>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.increment_by(counter, 1);
    }

    pub fn increment_by(&self, counter: Counter, amount: u64) {
        *self.inner.lock().counts.entry(counter).or_insert(0) += amount;
    }

    /// Current value of a counter.
    pub fn count(&self, counter: Counter) -> u64 {
        self.inner.lock().counts.get(&counter).copied().unwrap_or(0)
    }

    pub fn record(&self, timing: Timing, elapsed: Duration) {
        *self.inner.lock().timings.entry(timing).or_default() += elapsed;
    }

    /// Start timing a section; the elapsed time is recorded when the guard drops.
    pub fn measure(&self, timing: Timing) -> TimingGuard<'_> {
        TimingGuard {
            statistics: self,
            timing,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let inner = self.inner.lock();
        StatisticsSnapshot {
            counts: inner.counts.clone(),
            timings: inner.timings.clone(),
        }
    }

    /// Copy the current values and zero the sink in one step.
    pub fn snapshot_and_reset(&self) -> StatisticsSnapshot {
        let mut inner = self.inner.lock();
        let taken = std::mem::take(&mut *inner);
        StatisticsSnapshot {
            counts: taken.counts,
            timings: taken.timings,
        }
    }
}

/// Records the time between its creation and drop.
#[must_use = "the section is timed until the guard is dropped"]
pub struct TimingGuard<'a> {
    statistics: &'a Statistics,
    timing: Timing,
    started: Instant,
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.statistics.record(self.timing, self.started.elapsed());
    }
}

/// Point-in-time copy of the statistics sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    counts: BTreeMap<Counter, u64>,
    timings: BTreeMap<Timing, Duration>,
}

impl StatisticsSnapshot {
    pub fn count(&self, counter: Counter) -> u64 {
        self.counts.get(&counter).copied().unwrap_or(0)
    }

    pub fn timing(&self, timing: Timing) -> Duration {
        self.timings.get(&timing).copied().unwrap_or_default()
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for counter in Counter::ALL {
            writeln!(f, "{:<36} {:>10}", counter.name(), self.count(counter))?;
        }
        for timing in Timing::ALL {
            let elapsed = self.timing(timing);
            writeln!(f, "{:<36} {:>8}ms", timing.name(), elapsed.as_millis())?;
        }
        Ok(())
    }
}
