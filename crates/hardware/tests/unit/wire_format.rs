//! Wire-format properties.
//!
//! The on-wire representations are stable contracts; these properties
//! check that serialization round-trips for arbitrary field values and
//! that corrupted lengths never parse.

use proptest::prelude::*;

use nocsim_core::memory::MemComponent;
use nocsim_core::memory::shmem_msg::{ShmemMsg, ShmemMsgType};
use nocsim_core::network::packet::{NetPacket, PacketType};

proptest! {
    /// A coherence message survives serialization for any payload.
    #[test]
    fn shmem_msg_roundtrips(
        requester in 0i32..1024,
        address in any::<u64>(),
        payload in proptest::collection::vec(any::<u8>(), 0..128),
    ) {
        let msg = if payload.is_empty() {
            ShmemMsg::new(
                ShmemMsgType::ExReq,
                MemComponent::L2Cache,
                MemComponent::DramDir,
                requester,
                address,
            )
        } else {
            ShmemMsg::with_data(
                ShmemMsgType::ExRep,
                MemComponent::DramDir,
                MemComponent::L2Cache,
                requester,
                address,
                payload.clone(),
            )
        };
        let back = ShmemMsg::from_bytes(&msg.to_bytes()).unwrap();
        prop_assert_eq!(back.requester, requester);
        prop_assert_eq!(back.address, address);
        prop_assert_eq!(back.data.unwrap_or_default(), payload);
    }

    /// A packet header survives serialization for any field values.
    #[test]
    fn net_packet_roundtrips(
        start_time in any::<u64>(),
        sender in 0i32..4096,
        receiver in -2i32..4096,
        seq in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut packet = NetPacket::new(start_time, PacketType::SharedMem1, sender, receiver, payload.clone());
        packet.sequence_num = seq;
        let back = NetPacket::from_bytes(&packet.to_bytes()).unwrap();
        prop_assert_eq!(back.start_time, start_time);
        prop_assert_eq!(back.sender, sender);
        prop_assert_eq!(back.receiver, receiver);
        prop_assert_eq!(back.sequence_num, seq);
        prop_assert_eq!(back.data, payload);
    }

    /// A truncated buffer never parses as a packet.
    #[test]
    fn truncated_packet_never_parses(cut in 1usize..35) {
        let packet = NetPacket::new(0, PacketType::User1, 0, 1, vec![1, 2, 3, 4]);
        let bytes = packet.to_bytes();
        let truncated = &bytes[..bytes.len() - cut];
        prop_assert!(NetPacket::from_bytes(truncated).is_err());
    }
}
