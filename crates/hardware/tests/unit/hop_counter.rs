//! Hop-counter model tests.
//!
//! The analytical mesh charges XY hop count times per-hop latency plus
//! serialization, with no contention.

use pretty_assertions::assert_eq;

use nocsim_core::Simulator;
use nocsim_core::config::NetworkModelKind;
use nocsim_core::network::packet::{NetPacket, PacketType};

use crate::common::{magic_config, recv_user_packet};

fn hop_counter_config(total_cores: u32) -> nocsim_core::Config {
    let mut config = magic_config(total_cores);
    config.network.user_model_1 = NetworkModelKind::EmeshHopCounter;
    config.network.emesh_hop_counter.router_delay = 2;
    config.network.emesh_hop_counter.link_delay = 1;
    config.network.emesh_hop_counter.flit_width = 64;
    config
}

/// Latency is hops x (router + link) + serialization: corner to corner on
/// a 4x4 mesh is 6 hops.
#[test]
fn corner_to_corner_latency() {
    let mut sim = Simulator::new(hop_counter_config(16)).unwrap();

    // 8 bytes at 64-bit flits: serialization latency 1.
    let packet = NetPacket::new(1000, PacketType::User1, 0, 15, vec![0u8; 8]);
    sim.net_send_packet(packet).unwrap();
    sim.run_until_idle().unwrap();

    let delivered = recv_user_packet(&mut sim, 15).unwrap();
    assert_eq!(delivered.time, 1000 + 6 * 3 + 1);
}

/// Neighbors pay a single hop; larger payloads add serialization flits.
#[test]
fn serialization_scales_with_payload() {
    let mut sim = Simulator::new(hop_counter_config(16)).unwrap();

    // 64 bytes = 8 flits; 1 hop from core 0 to core 1.
    let packet = NetPacket::new(0, PacketType::User1, 0, 1, vec![0u8; 64]);
    sim.net_send_packet(packet).unwrap();
    sim.run_until_idle().unwrap();

    let delivered = recv_user_packet(&mut sim, 1).unwrap();
    assert_eq!(delivered.time, 3 + 8);
}

/// A hop-counter broadcast reaches every core with its own distance-based
/// latency.
#[test]
fn broadcast_latency_is_per_receiver() {
    let mut sim = Simulator::new(hop_counter_config(16)).unwrap();

    let packet = NetPacket::new(
        0,
        PacketType::User1,
        5,
        nocsim_core::common::BROADCAST_CORE_ID,
        vec![0u8; 8],
    );
    sim.net_send_packet(packet).unwrap();
    sim.run_until_idle().unwrap();

    // Core 5 is at (1,1); core 15 at (3,3) is 4 hops away.
    let near = recv_user_packet(&mut sim, 5).unwrap();
    assert_eq!(near.time, 1, "zero hops, serialization only");
    let far = recv_user_packet(&mut sim, 15).unwrap();
    assert_eq!(far.time, 4 * 3 + 1);
}
