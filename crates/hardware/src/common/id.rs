//! Core and router identifiers.
//!
//! A [`CoreId`] names a simulated core; negative values are sentinels. A
//! [`RouterId`] names one network node on a core: several nodes may live on
//! the same core (the e-mesh router, the ATAC send/receive hubs, the packet
//! injector), distinguished by a per-model `index`.

use std::fmt;

/// Identifier of a simulated core.
///
/// Valid core ids are nonnegative and less than the configured total core
/// count. Negative values are reserved for the sentinels below.
pub type CoreId = i32;

/// Sentinel for "no core" (e.g., a directory entry with no owner).
pub const INVALID_CORE_ID: CoreId = -1;

/// Sentinel receiver meaning "all cores" in a
/// [`crate::network::packet::NetPacket`].
pub const BROADCAST_CORE_ID: CoreId = -2;

/// Identifier of a network node: the owning core plus a per-model node index.
///
/// Node indices are defined by each network model (see
/// [`crate::network::node_index`]); the core-interface pseudo-node uses a
/// negative index shared by all models.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterId {
    /// Core that owns this node.
    pub core_id: CoreId,
    /// Per-model node index on that core.
    pub index: i32,
}

impl RouterId {
    /// Creates a router id from a core id and node index.
    #[inline]
    pub fn new(core_id: CoreId, index: i32) -> Self {
        Self { core_id, index }
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Router({},{})", self.core_id, self.index)
    }
}
