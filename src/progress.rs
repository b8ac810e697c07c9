//! Progress and ETA estimation for a running batch.

use std::time::Duration;

/// One progress update for the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// Percent complete, rounded to one decimal place
    pub percent: f64,
    /// Estimated time until the last task completes
    pub eta: Duration,
}

impl ProgressSnapshot {
    /// Human-readable ETA, e.g. `"1h 2m 3s"`.
    pub fn eta_display(&self) -> String {
        format_eta(self.eta)
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Derives snapshots from completed/total counts and elapsed wall time.
///
/// The ETA is the simple average time per completed task multiplied by the
/// number of tasks left. With parallel workers, wall time per completion
/// already accounts for the overlap.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total: usize,
    completed: usize,
    last_percent: f64,
}

impl ProgressEstimator {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            last_percent: 0.0,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record one more completion and produce the snapshot for it.
    pub fn record_completion(&mut self, elapsed: Duration) -> ProgressSnapshot {
        let completed = (self.completed + 1).min(self.total.max(1));
        self.observe(completed, self.total, elapsed)
    }

    /// Produce a snapshot for an explicit count. Counts never move backwards
    /// unless the total shrinks below them, and the reported percent never
    /// moves backwards at all.
    pub fn observe(&mut self, completed: usize, total: usize, elapsed: Duration) -> ProgressSnapshot {
        self.total = total;
        self.completed = self.completed.max(completed).min(total);

        let percent = percent(self.completed, self.total).max(self.last_percent);
        self.last_percent = percent;

        let remaining = self.total.saturating_sub(self.completed);
        let eta = if self.completed == 0 || remaining == 0 {
            Duration::ZERO
        } else {
            elapsed.div_f64(self.completed as f64).mul_f64(remaining as f64)
        };

        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            percent,
            eta,
        }
    }
}

/// `round(completed / total * 1000) / 10`; an empty job is complete.
pub fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (completed as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Compact duration formatting used on the wire.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs_f64().round() as u64;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
