//! Flits and buffer-management messages.
//!
//! The finite-buffer models split a packet into flits, the unit of flow
//! control. A HEAD flit carries route-computation state (the output
//! endpoints it reserves at each router); BODY and TAIL flits follow the
//! HEAD's reservation. Buffer-management messages travel upstream and
//! return credits (or on/off notifications) for freed buffer slots.

use crate::common::{CoreId, RouterId, Time};
use crate::network::components::channel::Endpoint;

/// Position of a flit within its packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlitKind {
    /// First flit; carries the route.
    Head,
    /// Middle flit.
    Body,
    /// Last flit; completes the packet.
    Tail,
    /// Single-flit packet (head and tail at once).
    HeadTail,
}

impl FlitKind {
    /// Returns whether this flit carries route state.
    pub fn is_head(self) -> bool {
        matches!(self, Self::Head | Self::HeadTail)
    }

    /// Returns whether this flit completes its packet.
    pub fn is_tail(self) -> bool {
        matches!(self, Self::Tail | Self::HeadTail)
    }
}

/// One flit of a modeled packet.
///
/// Carries enough of its parent packet's identity for receiver-side
/// reassembly: the packet id is `(sender << 32) | sender_sequence_num`.
#[derive(Debug, Clone)]
pub struct Flit {
    /// Position within the packet.
    pub kind: FlitKind,
    /// Length in phits (1 for wormhole flits, the whole packet for the
    /// packet-buffer schemes).
    pub num_phits: u32,
    /// Current time in network cycles.
    pub normalized_time: Time,
    /// Accumulated pipeline + link delay, excluding contention.
    pub zero_load_delay: u64,
    /// Parent packet id.
    pub packet_id: u64,
    /// Parent packet sender.
    pub sender: CoreId,
    /// Parent packet receiver (possibly broadcast).
    pub receiver: CoreId,
    /// Parent packet submission time in network cycles.
    pub packet_start_time: Time,
    /// Output endpoints reserved at the current router (HEAD only, set by
    /// the topology's route computation).
    pub output_endpoint_list: Option<Vec<Endpoint>>,
}

/// Downstream-buffer signaling message, traveling upstream.
#[derive(Debug, Clone)]
pub struct BufferMsg {
    /// Time in network cycles.
    pub normalized_time: Time,
    /// What the downstream buffer reports.
    pub kind: BufferMsgKind,
}

/// Buffer-management message payloads.
#[derive(Debug, Clone, Copy)]
pub enum BufferMsgKind {
    /// Slots freed in the downstream buffer.
    Credit {
        /// Number of freed flit slots.
        num_credits: u32,
    },
    /// The downstream buffer crossed its threshold.
    OnOff {
        /// `true` when the upstream may send again.
        on: bool,
    },
}

/// A modeling message in flight between network nodes.
#[derive(Debug, Clone)]
pub struct ModelingMsg {
    /// Node the message is addressed to.
    pub receiver_router: RouterId,
    /// Node (or core-interface pseudo-node) that produced it.
    pub sender_router: RouterId,
    /// Flit or buffer-management payload.
    pub kind: NetworkMsgKind,
}

/// The two modeling message classes.
#[derive(Debug, Clone)]
pub enum NetworkMsgKind {
    /// A flit moving downstream.
    Data(Flit),
    /// A buffer notification moving upstream.
    BufferManagement(BufferMsg),
}

impl ModelingMsg {
    /// Returns the message's time in network cycles.
    pub fn normalized_time(&self) -> Time {
        match &self.kind {
            NetworkMsgKind::Data(flit) => flit.normalized_time,
            NetworkMsgKind::BufferManagement(msg) => msg.normalized_time,
        }
    }
}
