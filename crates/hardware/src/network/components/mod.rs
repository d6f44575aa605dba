//! Building blocks of the finite-buffer network models.
//!
//! This module provides:
//! 1. **Channel endpoints** with the all-endpoints broadcast sentinel.
//! 2. **Flits and buffer-management messages**, the units the routers move.
//! 3. **Router timing** (buffers, switch allocation, credit/on-off state).
//! 4. **Link models** and **activity counters**.
//! 5. **The network node**, tying a router to its topology position.

/// Channel endpoints.
pub mod channel;
/// Flits and buffer-management messages.
pub mod flit;
/// Link performance and activity models.
pub mod link;
/// Router activity counters.
pub mod power;
/// Network node (router + links + mappings).
pub mod router;
/// Router timing model.
pub mod router_perf;

pub use channel::{ENDPOINT_ALL, Endpoint};
pub use flit::{BufferMsg, BufferMsgKind, Flit, FlitKind, ModelingMsg, NetworkMsgKind};
pub use link::{LinkClass, LinkPerformanceModel};
pub use power::RouterPowerModel;
pub use router::NetworkNode;
pub use router_perf::{ChannelSpec, RouterOutput, RouterPerformanceModel};
