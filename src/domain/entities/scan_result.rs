//! Scan progress, outcome and cancellation
//!
//! Types shared between a running parse pass and whoever drives it.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress information during a parse pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanProgress {
    /// Upper bound on record slots the pass will visit
    pub slots_total: u64,
    /// Slots visited so far
    pub slots_done: u64,
    /// Records emitted so far
    pub found: u64,
    /// Deleted records emitted so far
    pub deleted: u64,
}

impl ScanProgress {
    /// Creates a new scan progress
    pub fn new(slots_total: u64) -> Self {
        Self {
            slots_total,
            ..Default::default()
        }
    }

    /// Returns the progress percentage (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.slots_total == 0 {
            return 100.0;
        }
        (self.slots_done.min(self.slots_total) as f64 / self.slots_total as f64) * 100.0
    }
}

/// How a parse pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    /// Every reachable slot was visited
    Completed { processed: u64 },
    /// The pass stopped early on request
    Cancelled { processed: u64 },
}

impl ScanOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanOutcome::Cancelled { .. })
    }

    /// Slots visited before the pass ended
    pub fn processed(&self) -> u64 {
        match self {
            ScanOutcome::Completed { processed } | ScanOutcome::Cancelled { processed } => *processed,
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Completed { processed } => write!(f, "completed ({} slots)", processed),
            ScanOutcome::Cancelled { processed } => write!(f, "cancelled after {} slots", processed),
        }
    }
}

/// Shared stop flag polled between record slots
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the pass stop at the next slot boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
