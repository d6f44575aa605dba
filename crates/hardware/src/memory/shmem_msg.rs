//! Coherence protocol messages and their wire format.
//!
//! A [`ShmemMsg`] travels between memory components (L1, L2, directory,
//! DRAM), possibly across cores over a memory network. The on-wire layout
//! is stable:
//!
//! ```text
//! { msg_type:u32, sender_mc:u8, receiver_mc:u8, requester:i32,
//!   address:u64, reply_expected:u8, data_len:u32, data[data_len] }
//! ```
//!
//! all fields little-endian.

use crate::common::{CoreId, SimError};
use crate::memory::MemComponent;

/// Coherence message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ShmemMsgType {
    ExReq = 1,
    ShReq,
    InvReq,
    FlushReq,
    WbReq,
    ExRep,
    ShRep,
    UpgradeRep,
    InvRep,
    FlushRep,
    WbRep,
    NullifyReq,
    GetDataReq,
    PutDataReq,
    GetDataRep,
}

impl ShmemMsgType {
    fn from_u32(value: u32) -> Result<Self, SimError> {
        Ok(match value {
            1 => Self::ExReq,
            2 => Self::ShReq,
            3 => Self::InvReq,
            4 => Self::FlushReq,
            5 => Self::WbReq,
            6 => Self::ExRep,
            7 => Self::ShRep,
            8 => Self::UpgradeRep,
            9 => Self::InvRep,
            10 => Self::FlushRep,
            11 => Self::WbRep,
            12 => Self::NullifyReq,
            13 => Self::GetDataReq,
            14 => Self::PutDataReq,
            15 => Self::GetDataRep,
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized shmem msg type {other}"
                )));
            }
        })
    }
}

/// One coherence protocol message.
#[derive(Debug, Clone)]
pub struct ShmemMsg {
    /// Message type.
    pub msg_type: ShmemMsgType,
    /// Component that produced the message.
    pub sender_mem_component: MemComponent,
    /// Component the message is addressed to.
    pub receiver_mem_component: MemComponent,
    /// Core on whose behalf the protocol transaction runs.
    pub requester: CoreId,
    /// Block-aligned address.
    pub address: u64,
    /// Whether the sender expects an acknowledgement.
    pub reply_expected: bool,
    /// Optional cache-block payload.
    pub data: Option<Vec<u8>>,
}

impl ShmemMsg {
    /// Creates a message without a data payload.
    pub fn new(
        msg_type: ShmemMsgType,
        sender_mem_component: MemComponent,
        receiver_mem_component: MemComponent,
        requester: CoreId,
        address: u64,
    ) -> Self {
        Self {
            msg_type,
            sender_mem_component,
            receiver_mem_component,
            requester,
            address,
            reply_expected: false,
            data: None,
        }
    }

    /// Creates a message carrying a cache-block payload.
    pub fn with_data(
        msg_type: ShmemMsgType,
        sender_mem_component: MemComponent,
        receiver_mem_component: MemComponent,
        requester: CoreId,
        address: u64,
        data: Vec<u8>,
    ) -> Self {
        Self {
            msg_type,
            sender_mem_component,
            receiver_mem_component,
            requester,
            address,
            reply_expected: false,
            data: Some(data),
        }
    }

    /// Returns the length of the serialized message in bytes.
    pub fn msg_len(&self) -> u32 {
        23 + self.data.as_ref().map_or(0, |d| d.len() as u32)
    }

    /// Returns the modeled length: the bytes the protocol actually moves
    /// (type + address + payload), which feeds serialization latency.
    pub fn modeled_length(&self) -> u32 {
        4 + 8 + self.data.as_ref().map_or(0, |d| d.len() as u32)
    }

    /// Serializes the message to its wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let data_len = self.data.as_ref().map_or(0, Vec::len);
        let mut buf = Vec::with_capacity(23 + data_len);
        buf.extend_from_slice(&(self.msg_type as u32).to_le_bytes());
        buf.push(self.sender_mem_component.to_u8());
        buf.push(self.receiver_mem_component.to_u8());
        buf.extend_from_slice(&self.requester.to_le_bytes());
        buf.extend_from_slice(&self.address.to_le_bytes());
        buf.push(u8::from(self.reply_expected));
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        if let Some(data) = &self.data {
            buf.extend_from_slice(data);
        }
        buf
    }

    /// Deserializes a message from its wire format.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, SimError> {
        let header_err = || SimError::Length {
            expected: 23,
            actual: buf.len() as u32,
        };
        if buf.len() < 23 {
            return Err(header_err());
        }
        let msg_type = ShmemMsgType::from_u32(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]));
        let sender_mem_component = MemComponent::from_u8(buf[4])?;
        let receiver_mem_component = MemComponent::from_u8(buf[5])?;
        let requester = i32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
        let address = u64::from_le_bytes([
            buf[10], buf[11], buf[12], buf[13], buf[14], buf[15], buf[16], buf[17],
        ]);
        let reply_expected = buf[18] != 0;
        let data_len = u32::from_le_bytes([buf[19], buf[20], buf[21], buf[22]]) as usize;
        if buf.len() != 23 + data_len {
            return Err(SimError::Length {
                expected: (23 + data_len) as u32,
                actual: buf.len() as u32,
            });
        }
        let data = if data_len == 0 {
            None
        } else {
            Some(buf[23..].to_vec())
        };
        Ok(Self {
            msg_type: msg_type?,
            sender_mem_component,
            receiver_mem_component,
            requester,
            address,
            reply_expected,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let msg = ShmemMsg::with_data(
            ShmemMsgType::FlushRep,
            MemComponent::L2Cache,
            MemComponent::DramDir,
            3,
            0xdead_beef_00,
            vec![0xab; 64],
        );
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len() as u32, msg.msg_len());

        let back = ShmemMsg::from_bytes(&bytes).unwrap();
        assert_eq!(back.msg_type, ShmemMsgType::FlushRep);
        assert_eq!(back.sender_mem_component, MemComponent::L2Cache);
        assert_eq!(back.receiver_mem_component, MemComponent::DramDir);
        assert_eq!(back.requester, 3);
        assert_eq!(back.address, 0xdead_beef_00);
        assert_eq!(back.data.as_deref(), Some(&[0xab; 64][..]));
    }

    #[test]
    fn truncated_buffer_is_a_length_error() {
        let msg = ShmemMsg::new(
            ShmemMsgType::ShReq,
            MemComponent::L2Cache,
            MemComponent::DramDir,
            0,
            64,
        );
        let mut bytes = msg.to_bytes();
        bytes.pop();
        assert!(matches!(
            ShmemMsg::from_bytes(&bytes),
            Err(SimError::Length { .. })
        ));
    }
}
