//! Per-core shared-memory clock and latency accumulator.
//!
//! Each core keeps two simulated cycle counters, one for the application
//! role and one for the simulation role, selected by the caller. The only
//! mutators are `set_cycle_count`, `incr_cycle_count`, and the raise-to
//! monotonic `update_cycle_count`; completed accesses are accounted
//! exclusively through `incr_total_memory_access_latency`.

use crate::common::Time;

/// Which logical thread's clock an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The application thread issuing memory accesses.
    App,
    /// The simulation thread draining events.
    Sim,
}

/// Per-core shared-memory performance model.
#[derive(Debug, Default)]
pub struct ShmemPerfModel {
    cycle_counts: [Time; 2],
    num_memory_accesses: u64,
    total_memory_access_latency: u64,
    enabled: bool,
}

impl ShmemPerfModel {
    /// Creates a model with both clocks at zero.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn slot(role: Role) -> usize {
        match role {
            Role::App => 0,
            Role::Sim => 1,
        }
    }

    /// Sets a role's cycle counter.
    pub fn set_cycle_count(&mut self, role: Role, count: Time) {
        self.cycle_counts[Self::slot(role)] = count;
    }

    /// Returns a role's cycle counter.
    pub fn cycle_count(&self, role: Role) -> Time {
        self.cycle_counts[Self::slot(role)]
    }

    /// Advances a role's cycle counter by `count`.
    pub fn incr_cycle_count(&mut self, role: Role, count: Time) {
        let slot = Self::slot(role);
        self.cycle_counts[slot] = self.cycle_counts[slot].saturating_add(count);
    }

    /// Raises a role's cycle counter to `count` if it is behind.
    pub fn update_cycle_count(&mut self, role: Role, count: Time) {
        let slot = Self::slot(role);
        if self.cycle_counts[slot] < count {
            self.cycle_counts[slot] = count;
        }
    }

    /// Accounts one completed memory access. No-op while disabled.
    pub fn incr_total_memory_access_latency(&mut self, latency: Time) {
        if self.enabled {
            self.num_memory_accesses += 1;
            self.total_memory_access_latency += latency;
        }
    }

    /// Enables latency accounting.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables latency accounting.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Clears the latency counters (clocks are untouched).
    pub fn reset(&mut self) {
        self.num_memory_accesses = 0;
        self.total_memory_access_latency = 0;
    }

    /// Returns (number of accesses, total latency in cycles).
    pub fn counters(&self) -> (u64, u64) {
        (self.num_memory_accesses, self.total_memory_access_latency)
    }

    /// Writes the shared-memory performance summary.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Shmem Perf Model:")?;
        writeln!(out, "    num memory accesses: {}", self.num_memory_accesses)?;
        let average = if self.num_memory_accesses == 0 {
            0.0
        } else {
            self.total_memory_access_latency as f64 / self.num_memory_accesses as f64
        };
        writeln!(out, "    average memory access latency: {average:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_have_independent_clocks() {
        let mut model = ShmemPerfModel::new();
        model.set_cycle_count(Role::App, 100);
        model.incr_cycle_count(Role::Sim, 7);
        assert_eq!(model.cycle_count(Role::App), 100);
        assert_eq!(model.cycle_count(Role::Sim), 7);
    }

    #[test]
    fn update_is_raise_to_monotonic() {
        let mut model = ShmemPerfModel::new();
        model.set_cycle_count(Role::Sim, 50);
        model.update_cycle_count(Role::Sim, 40);
        assert_eq!(model.cycle_count(Role::Sim), 50);
        model.update_cycle_count(Role::Sim, 60);
        assert_eq!(model.cycle_count(Role::Sim), 60);
    }

    #[test]
    fn latency_accounting_respects_enable() {
        let mut model = ShmemPerfModel::new();
        model.incr_total_memory_access_latency(10);
        assert_eq!(model.counters(), (0, 0));
        model.enable();
        model.incr_total_memory_access_latency(10);
        assert_eq!(model.counters(), (1, 10));
    }
}
