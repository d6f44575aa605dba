//! Network packets, packet types, and receive matching.
//!
//! A [`NetPacket`] is the unit handed to `net_send`. Its on-wire header is
//! stable:
//!
//! ```text
//! { start_time:u64, time:u64, type:u16, sender:i32, receiver:i32,
//!   length:u32, is_raw:u8, sequence_num:u32 }
//! ```
//!
//! followed by `length` payload bytes, all fields little-endian.

use crate::common::{BROADCAST_CORE_ID, CoreId, SimError, Time};

/// The five logical networks every core instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticNetwork {
    /// First user network.
    User1,
    /// Second user network.
    User2,
    /// First memory network (coherence traffic).
    Memory1,
    /// Second memory network.
    Memory2,
    /// System network (clock skew, services).
    System,
}

impl StaticNetwork {
    /// Number of logical networks.
    pub const COUNT: usize = 5;

    /// Returns the array slot for this network.
    pub fn index(self) -> usize {
        match self {
            Self::User1 => 0,
            Self::User2 => 1,
            Self::Memory1 => 2,
            Self::Memory2 => 3,
            Self::System => 4,
        }
    }

    /// Returns the network for an array slot.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::User1,
            1 => Self::User2,
            2 => Self::Memory1,
            3 => Self::Memory2,
            _ => Self::System,
        }
    }

    /// Display name used in the output summary.
    pub fn name(self) -> &'static str {
        match self {
            Self::User1 => "USER_1",
            Self::User2 => "USER_2",
            Self::Memory1 => "MEMORY_1",
            Self::Memory2 => "MEMORY_2",
            Self::System => "SYSTEM",
        }
    }
}

/// Packet types; each maps to one logical network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// First user channel.
    User1,
    /// Second user channel.
    User2,
    /// Coherence messages.
    SharedMem1,
    /// Secondary coherence channel.
    SharedMem2,
    /// Clock-skew minimization messages.
    ClockSkew,
    /// System services.
    System,
}

impl PacketType {
    /// Returns the logical network that carries this packet type.
    pub fn static_network(self) -> StaticNetwork {
        match self {
            Self::User1 => StaticNetwork::User1,
            Self::User2 => StaticNetwork::User2,
            Self::SharedMem1 => StaticNetwork::Memory1,
            Self::SharedMem2 => StaticNetwork::Memory2,
            Self::ClockSkew | Self::System => StaticNetwork::System,
        }
    }

    /// Returns the wire encoding.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::User1 => 0,
            Self::User2 => 1,
            Self::SharedMem1 => 2,
            Self::SharedMem2 => 3,
            Self::ClockSkew => 4,
            Self::System => 5,
        }
    }

    /// Decodes from the wire encoding.
    pub fn from_u16(value: u16) -> Result<Self, SimError> {
        Ok(match value {
            0 => Self::User1,
            1 => Self::User2,
            2 => Self::SharedMem1,
            3 => Self::SharedMem2,
            4 => Self::ClockSkew,
            5 => Self::System,
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized packet type {other}"
                )));
            }
        })
    }
}

/// Size of the serialized packet header in bytes.
pub const PACKET_HEADER_BYTES: u32 = 8 + 8 + 2 + 4 + 4 + 4 + 1 + 4;

/// One network packet.
#[derive(Debug, Clone)]
pub struct NetPacket {
    /// Time the packet was first submitted.
    pub start_time: Time,
    /// Current time of the packet; at delivery, the arrival time.
    pub time: Time,
    /// Packet type.
    pub packet_type: PacketType,
    /// Sending core.
    pub sender: CoreId,
    /// Receiving core; [`BROADCAST_CORE_ID`] for a broadcast.
    pub receiver: CoreId,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Whether this is an application (raw) packet rather than a timing
    /// model artifact.
    pub is_raw: bool,
    /// Per-sender sequence number, assigned at send.
    pub sequence_num: u32,
}

impl NetPacket {
    /// Creates a raw packet ready for `net_send`.
    pub fn new(
        time: Time,
        packet_type: PacketType,
        sender: CoreId,
        receiver: CoreId,
        data: Vec<u8>,
    ) -> Self {
        Self {
            start_time: time,
            time,
            packet_type,
            sender,
            receiver,
            data,
            is_raw: true,
            sequence_num: 0,
        }
    }

    /// Returns whether this packet goes to every core.
    pub fn is_broadcast(&self) -> bool {
        self.receiver == BROADCAST_CORE_ID
    }

    /// Returns the payload length in bytes.
    pub fn length(&self) -> u32 {
        self.data.len() as u32
    }

    /// Serializes header + payload to the wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity((PACKET_HEADER_BYTES + self.length()) as usize);
        buf.extend_from_slice(&self.start_time.to_le_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.packet_type.to_u16().to_le_bytes());
        buf.extend_from_slice(&self.sender.to_le_bytes());
        buf.extend_from_slice(&self.receiver.to_le_bytes());
        buf.extend_from_slice(&self.length().to_le_bytes());
        buf.push(u8::from(self.is_raw));
        buf.extend_from_slice(&self.sequence_num.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Deserializes a packet from the wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SimError> {
        if buf.len() < PACKET_HEADER_BYTES as usize {
            return Err(SimError::Length {
                expected: PACKET_HEADER_BYTES,
                actual: buf.len() as u32,
            });
        }
        let start_time = u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let time = u64::from_le_bytes([
            buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
        ]);
        let packet_type = PacketType::from_u16(u16::from_le_bytes([buf[16], buf[17]]))?;
        let sender = i32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]);
        let receiver = i32::from_le_bytes([buf[22], buf[23], buf[24], buf[25]]);
        let length = u32::from_le_bytes([buf[26], buf[27], buf[28], buf[29]]) as usize;
        let is_raw = buf[30] != 0;
        let sequence_num = u32::from_le_bytes([buf[31], buf[32], buf[33], buf[34]]);
        if buf.len() != PACKET_HEADER_BYTES as usize + length {
            return Err(SimError::Length {
                expected: PACKET_HEADER_BYTES + length as u32,
                actual: buf.len() as u32,
            });
        }
        Ok(Self {
            start_time,
            time,
            packet_type,
            sender,
            receiver,
            data: buf[PACKET_HEADER_BYTES as usize..].to_vec(),
            is_raw,
            sequence_num,
        })
    }
}

/// Receive filter: a sender set crossed with a type set; empty means "any".
#[derive(Debug, Clone, Default)]
pub struct NetMatch {
    /// Accepted senders; empty accepts all.
    pub senders: Vec<CoreId>,
    /// Accepted packet types; empty accepts all.
    pub types: Vec<PacketType>,
}

impl NetMatch {
    /// Matches any packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches one sender and one type.
    pub fn from_sender_and_type(sender: CoreId, packet_type: PacketType) -> Self {
        Self {
            senders: vec![sender],
            types: vec![packet_type],
        }
    }

    /// Matches one type from any sender.
    pub fn from_type(packet_type: PacketType) -> Self {
        Self {
            senders: Vec::new(),
            types: vec![packet_type],
        }
    }

    /// Returns whether `packet` satisfies this filter.
    pub fn matches(&self, packet: &NetPacket) -> bool {
        (self.senders.is_empty() || self.senders.contains(&packet.sender))
            && (self.types.is_empty() || self.types.contains(&packet.packet_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut packet = NetPacket::new(77, PacketType::User1, 2, 9, vec![1, 2, 3]);
        packet.sequence_num = 41;
        let back = NetPacket::from_bytes(&packet.to_bytes()).unwrap();
        assert_eq!(back.start_time, 77);
        assert_eq!(back.sender, 2);
        assert_eq!(back.receiver, 9);
        assert_eq!(back.sequence_num, 41);
        assert_eq!(back.data, vec![1, 2, 3]);
    }

    #[test]
    fn match_filters_on_sender_and_type() {
        let packet = NetPacket::new(0, PacketType::User2, 3, 1, Vec::new());
        assert!(NetMatch::any().matches(&packet));
        assert!(NetMatch::from_type(PacketType::User2).matches(&packet));
        assert!(!NetMatch::from_type(PacketType::User1).matches(&packet));
        assert!(!NetMatch::from_sender_and_type(4, PacketType::User2).matches(&packet));
    }
}
