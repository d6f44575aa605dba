//! Simulation-wide statistics.
//!
//! Per-component counters live with their components; this module keeps
//! only the cross-cutting run metrics (events processed, wall-clock time)
//! and heads the output summary with them.

use std::time::Instant;

/// Cross-cutting run statistics.
#[derive(Debug, Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Events popped from the queue so far.
    pub events_processed: u64,
}

impl Default for SimStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SimStats {
    /// Creates zeroed statistics with the clock started now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            events_processed: 0,
        }
    }

    /// Returns wall-clock seconds since construction.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Writes the run-statistics header of the summary.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "Simulation:")?;
        writeln!(out, "  events processed: {}", self.events_processed)?;
        writeln!(out, "  host seconds: {:.3}", self.elapsed_seconds())
    }
}
