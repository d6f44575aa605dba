//! Unit test tree.

/// ATAC geometry and routing.
pub mod atac;
/// Clos topology, placement, and routing.
pub mod clos;
/// Random-pairs clock synchronization.
pub mod clock_skew;
/// Configuration parsing and validation.
pub mod config;
/// Directory entry representations.
pub mod directory_entry;
/// Finite-buffer e-mesh routing, ordering, and broadcast.
pub mod emesh;
/// Hop-counter model latencies.
pub mod hop_counter;
/// Coherence protocol end-to-end scenarios.
pub mod memory_system;
/// Magic network laws.
pub mod network_magic;
/// Wire-format properties.
pub mod wire_format;
