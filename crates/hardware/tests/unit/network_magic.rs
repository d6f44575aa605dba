//! Magic network laws.
//!
//! The magic model is the functional baseline: these tests pin the
//! send/receive round-trip identity, per-pair ordering, and broadcast
//! fan-out that every model must preserve.

use pretty_assertions::assert_eq;

use nocsim_core::Simulator;
use nocsim_core::common::BROADCAST_CORE_ID;
use nocsim_core::network::packet::{NetMatch, NetPacket, PacketType};

use crate::common::{magic_config, recv_user_packet, send_user_packet};

/// `net_send` then `net_recv` with a matching filter is an identity on the
/// payload bytes.
#[test]
fn send_recv_roundtrip_identity() {
    let mut sim = Simulator::new(magic_config(4)).unwrap();
    let payload = vec![0xde, 0xad, 0xbe, 0xef];

    send_user_packet(&mut sim, 0, 3, payload.clone());
    let packet = recv_user_packet(&mut sim, 3).expect("packet should arrive");
    assert_eq!(packet.data, payload);
    assert_eq!(packet.sender, 0);
    assert_eq!(packet.receiver, 3);
}

/// For any (source, destination) pair, delivery order equals send order.
#[test]
fn per_pair_delivery_order_is_send_order() {
    let mut sim = Simulator::new(magic_config(2)).unwrap();
    for i in 0..10u8 {
        sim.net_send(0, PacketType::User1, 1, vec![i]).unwrap();
    }
    sim.run_until_idle().unwrap();

    for expected in 0..10u8 {
        let packet = recv_user_packet(&mut sim, 1).expect("all packets should arrive");
        assert_eq!(packet.data, vec![expected]);
    }
    assert!(recv_user_packet(&mut sim, 1).is_none());
}

/// A broadcast reaches every core, the sender included.
#[test]
fn broadcast_reaches_every_core() {
    let mut sim = Simulator::new(magic_config(4)).unwrap();
    sim.net_send(1, PacketType::User1, BROADCAST_CORE_ID, vec![42])
        .unwrap();
    sim.run_until_idle().unwrap();

    for core in 0..4 {
        let packet = recv_user_packet(&mut sim, core).expect("every core should deliver");
        assert_eq!(packet.data, vec![42]);
    }
}

/// A receive committed to the wrong length is fatal.
#[test]
fn recv_length_mismatch_is_fatal() {
    let mut sim = Simulator::new(magic_config(2)).unwrap();
    send_user_packet(&mut sim, 0, 1, vec![1, 2, 3]);

    let result = sim.net_recv(1, &NetMatch::from_type(PacketType::User1), Some(8));
    assert!(result.is_err(), "length mismatch must abort the receive");
}

/// Unit latency: a magic packet arrives exactly one cycle after it left.
#[test]
fn unit_latency() {
    let mut sim = Simulator::new(magic_config(2)).unwrap();
    let packet = NetPacket::new(100, PacketType::User1, 0, 1, vec![7]);
    sim.net_send_packet(packet).unwrap();
    sim.run_until_idle().unwrap();

    let delivered = recv_user_packet(&mut sim, 1).unwrap();
    assert_eq!(delivered.start_time, 100);
    assert_eq!(delivered.time, 101);
}
