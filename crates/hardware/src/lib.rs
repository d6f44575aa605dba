//! Cycle-level chip-multiprocessor simulator library.
//!
//! This crate implements a discrete-event simulator for chip
//! multiprocessors with on-chip networks and cache-coherent shared memory:
//! 1. **Memory:** Private L1-I/L1-D caches, a write-through private L2, a
//!    directory-based MSI protocol with five directory representations, and
//!    DRAM controllers.
//! 2. **Network:** Five logical networks per core, each bound to a magic,
//!    hop-counter, or finite-buffer model (e-mesh, Clos, ATAC) with
//!    buffered flow control and credit/on-off buffer management.
//! 3. **Engine:** A per-core-ordered event queue, per-core simulated clocks,
//!    and clock-skew minimization (barrier or random-pairs).
//! 4. **Driver:** `Simulator` owns the cores and the event loop; workloads
//!    issue memory accesses and user packets against it.

/// Clock-skew minimization schemes.
pub mod clock_skew;
/// Common types (identifiers, time, errors).
pub mod common;
/// Simulator configuration.
pub mod config;
/// The per-core façade and performance counters.
pub mod core;
/// The discrete-event queue.
pub mod event;
/// The memory hierarchy and coherence engines.
pub mod memory;
/// The per-core network stack.
pub mod network;
/// Single-server queueing-delay model.
pub mod queue_model;
/// The simulation driver.
pub mod sim;
/// Simulation-wide statistics.
pub mod stats;

/// Root configuration type; build with `Config::default()` or deserialize
/// from JSON.
pub use crate::config::Config;
/// The per-core façade.
pub use crate::core::Core;
/// Simulator-wide error type.
pub use crate::common::SimError;
/// Top-level simulator; owns the cores and the event loop.
pub use crate::sim::Simulator;
