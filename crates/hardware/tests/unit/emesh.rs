//! Finite-buffer e-mesh tests.
//!
//! Drives real packets through routed flits on a 4x4 mesh: delivery,
//! per-pair ordering through the reassembly buffer, the sender-rooted
//! broadcast tree with its link-traversal count, and credit-bounded buffer
//! occupancy.

use pretty_assertions::assert_eq;

use nocsim_core::Simulator;
use nocsim_core::common::BROADCAST_CORE_ID;
use nocsim_core::config::{BufferManagementScheme, FlowControlScheme};
use nocsim_core::network::node_index::EMESH;
use nocsim_core::network::packet::{PacketType, StaticNetwork};

use crate::common::{fb_emesh_config, recv_user_packet, send_user_packet};

fn total_link_traversals(sim: &Simulator) -> u64 {
    (0..sim.total_cores() as i32)
        .map(|core| {
            sim.core(core)
                .network()
                .model(StaticNetwork::User1)
                .as_finite_buffer()
                .unwrap()
                .node(EMESH)
                .unwrap()
                .total_link_traversals()
        })
        .sum()
}

// ══════════════════════════════════════════════════════════
// 1. Unicast delivery
// ══════════════════════════════════════════════════════════

/// A packet crosses the mesh and arrives with its payload intact and a
/// plausible XY latency.
#[test]
fn unicast_crosses_the_mesh() {
    let mut sim = Simulator::new(fb_emesh_config(16)).unwrap();

    send_user_packet(&mut sim, 0, 15, vec![0xab; 4]);
    let packet = recv_user_packet(&mut sim, 15).expect("packet should arrive");
    assert_eq!(packet.data, vec![0xab; 4]);
    // 6 hops from (0,0) to (3,3), each at least one cycle.
    assert!(packet.time >= packet.start_time + 6);
}

/// A local send never touches the network and keeps zero latency.
#[test]
fn local_send_is_free() {
    let mut sim = Simulator::new(fb_emesh_config(16)).unwrap();
    send_user_packet(&mut sim, 5, 5, vec![1]);
    let packet = recv_user_packet(&mut sim, 5).unwrap();
    assert_eq!(packet.time, packet.start_time);
    assert_eq!(total_link_traversals(&sim), 0);
}

/// Per-(source, destination) delivery order equals send order, for every
/// flow-control scheme.
#[test]
fn per_pair_order_survives_routing() {
    for scheme in [
        FlowControlScheme::StoreAndForward,
        FlowControlScheme::VirtualCutThrough,
        FlowControlScheme::Wormhole,
    ] {
        let mut config = fb_emesh_config(16);
        config.network.emesh.flow_control_scheme = scheme;
        // The packet-buffer schemes need room for a whole packet downstream.
        config.network.emesh.router.input_buffer_size = 8;
        let mut sim = Simulator::new(config).unwrap();

        // Large payloads fragment into several flits under wormhole.
        for i in 0..8u8 {
            sim.net_send(0, PacketType::User1, 15, vec![i; 40]).unwrap();
        }
        sim.run_until_idle().unwrap();

        for expected in 0..8u8 {
            let packet = recv_user_packet(&mut sim, 15)
                .unwrap_or_else(|| panic!("packet {expected} missing under {scheme:?}"));
            assert_eq!(packet.data[0], expected, "misordered under {scheme:?}");
        }
    }
}

// ══════════════════════════════════════════════════════════
// 2. Broadcast tree
// ══════════════════════════════════════════════════════════

/// Core 5 broadcasts a 1-flit packet on a 4x4 mesh: all 16 cores deliver
/// it, and the router-to-router link traversals count exactly the 15 tree
/// edges.
#[test]
fn broadcast_tree_covers_the_mesh() {
    let mut sim = Simulator::new(fb_emesh_config(16)).unwrap();

    send_user_packet(&mut sim, 5, BROADCAST_CORE_ID, vec![0x5a]);

    for core in 0..16 {
        let packet = recv_user_packet(&mut sim, core)
            .unwrap_or_else(|| panic!("core {core} missed the broadcast"));
        assert_eq!(packet.data, vec![0x5a]);
    }
    assert_eq!(total_link_traversals(&sim), 15);
}

// ══════════════════════════════════════════════════════════
// 3. Buffer management
// ══════════════════════════════════════════════════════════

/// Under credit management, no input buffer ever holds more phits than its
/// configured size, even with many packets converging on one column.
#[test]
fn credit_buffers_never_exceed_their_size() {
    let mut config = fb_emesh_config(16);
    config.network.emesh.buffer_management_scheme = BufferManagementScheme::Credit;
    config.network.emesh.router.input_buffer_size = 2;
    let mut sim = Simulator::new(config).unwrap();

    // Many senders target core 15 at once.
    for sender in 0..15 {
        sim.net_send(sender, PacketType::User1, 15, vec![sender as u8; 32])
            .unwrap();
    }
    sim.run_until_idle().unwrap();

    for core in 0..15 {
        assert!(
            recv_user_packet(&mut sim, 15).is_some(),
            "packet {core} should be delivered despite back-pressure"
        );
    }
}

/// The on/off discipline also delivers everything under convergence.
#[test]
fn on_off_buffers_still_deliver() {
    let mut config = fb_emesh_config(16);
    config.network.emesh.buffer_management_scheme = BufferManagementScheme::OnOff;
    config.network.emesh.router.input_buffer_size = 2;
    let mut sim = Simulator::new(config).unwrap();

    for sender in 0..8 {
        sim.net_send(sender, PacketType::User1, 15, vec![sender as u8; 24])
            .unwrap();
    }
    sim.run_until_idle().unwrap();

    let mut delivered = 0;
    while recv_user_packet(&mut sim, 15).is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 8);
}
