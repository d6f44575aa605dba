//! Clock-skew minimization.
//!
//! Per-core simulated clocks drift apart unless actively synchronized.
//! Three configuration-selectable schemes bound the skew; each is invoked
//! at every `access_memory` boundary and fails quietly when disabled:
//! 1. **None:** No synchronization.
//! 2. **Barrier:** Simulated time is cut into quanta; a server releases
//!    cores only once every running core has reported reaching the next
//!    barrier.
//! 3. **Random pairs:** Each core periodically compares clocks with a
//!    random peer and the one that is ahead rate-limits itself with a
//!    wall-clock sleep.

/// Quantum-barrier server.
pub mod barrier;
/// Randomized peer-to-peer slack enforcement.
pub mod random_pairs;

use crate::config::{ClockSkewConfig, ClockSkewScheme};

pub use barrier::BarrierServer;
pub use random_pairs::{RandomPairsSyncClient, Sleeper, SyncMsg, SyncMsgType, WallClockSleeper};

/// The per-core clock-skew client, one variant per scheme.
#[derive(Debug)]
pub enum ClockSkewClient {
    /// No synchronization.
    None,
    /// Barrier scheme; the server lives with the simulator.
    Barrier,
    /// Random-pairs scheme with its per-core state.
    RandomPairs(Box<RandomPairsSyncClient>),
}

impl ClockSkewClient {
    /// Creates the configured client for one core.
    pub fn create(config: &ClockSkewConfig, core_id: crate::common::CoreId, num_cores: u32) -> Self {
        match config.scheme {
            ClockSkewScheme::None => Self::None,
            ClockSkewScheme::Barrier => Self::Barrier,
            ClockSkewScheme::RandomPairs => Self::RandomPairs(Box::new(
                RandomPairsSyncClient::new(&config.random_pairs, core_id, num_cores),
            )),
        }
    }

    /// Enables the client.
    pub fn enable(&mut self) {
        if let Self::RandomPairs(client) = self {
            client.enable();
        }
    }

    /// Disables the client.
    pub fn disable(&mut self) {
        if let Self::RandomPairs(client) = self {
            client.disable();
        }
    }

    /// Resets the client's state.
    pub fn reset(&mut self) {
        if let Self::RandomPairs(client) = self {
            client.reset();
        }
    }
}
