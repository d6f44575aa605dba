//! Common types shared across the simulator.
//!
//! This module provides the small value types used by every subsystem:
//! 1. **Identifiers:** Core and router ids with their sentinels.
//! 2. **Time:** Simulated cycle counts and frequency-domain conversion.
//! 3. **Errors:** The simulator-wide error taxonomy.

/// Simulator-wide error taxonomy (config, protocol, length, state).
pub mod error;
/// Core and router identifiers.
pub mod id;
/// Simulated time and frequency-domain conversion.
pub mod time;

pub use error::SimError;
pub use id::{BROADCAST_CORE_ID, CoreId, INVALID_CORE_ID, RouterId};
pub use time::{Time, convert_cycle_count};
