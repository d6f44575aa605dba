//! Router activity counters.
//!
//! The energy estimator itself is an external collaborator (an opaque
//! function from activity counts to Joules); the simulator's job ends at
//! counting the microarchitectural events that feed it: buffer writes and
//! reads, switch allocations, and crossbar traversals.

/// Per-router activity counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterPowerModel {
    buffer_writes: u64,
    buffer_reads: u64,
    switch_allocations: u64,
    crossbar_traversals: u64,
}

impl RouterPowerModel {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a flit written into an input buffer.
    pub fn record_buffer_write(&mut self, num_phits: u32) {
        self.buffer_writes += u64::from(num_phits);
    }

    /// Records a flit read out of an input buffer.
    pub fn record_buffer_read(&mut self, num_phits: u32) {
        self.buffer_reads += u64::from(num_phits);
    }

    /// Records one switch-allocator grant.
    pub fn record_switch_allocation(&mut self) {
        self.switch_allocations += 1;
    }

    /// Records a flit crossing the crossbar toward `num_endpoints` outputs.
    pub fn record_crossbar_traversal(&mut self, num_phits: u32, num_endpoints: u32) {
        self.crossbar_traversals += u64::from(num_phits) * u64::from(num_endpoints);
    }

    /// Returns (buffer writes, buffer reads, switch allocations, crossbar
    /// traversals).
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (
            self.buffer_writes,
            self.buffer_reads,
            self.switch_allocations,
            self.crossbar_traversals,
        )
    }
}
