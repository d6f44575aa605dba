//! ATAC topology tests.
//!
//! A 16-core chip with 4-core clusters: cluster geometry, the
//! electrical/optical routing decision, optical unicasts and broadcasts,
//! and the star receive net.

use pretty_assertions::assert_eq;

use nocsim_core::Simulator;
use nocsim_core::common::BROADCAST_CORE_ID;
use nocsim_core::config::{AtacConfig, GlobalRoutingStrategy, ReceiveNetType};
use nocsim_core::network::model::finite_buffer::atac::AtacGeometry;
use nocsim_core::network::node_index::{RECEIVE_HUB, SEND_HUB};
use nocsim_core::network::packet::{PacketType, StaticNetwork};

use crate::common::{fb_atac_config, recv_user_packet, send_user_packet};

fn hub_flits(sim: &Simulator, core: i32, index: i32) -> u64 {
    sim.core(core)
        .network()
        .model(StaticNetwork::User1)
        .as_finite_buffer()
        .unwrap()
        .node(index)
        .map_or(0, |n| n.num_flits_forwarded())
}

// ══════════════════════════════════════════════════════════
// 1. Geometry
// ══════════════════════════════════════════════════════════

/// 16 cores at cluster size 4: a 4x4 mesh of four 2x2 clusters, hubs at
/// each cluster origin, one access point per cluster at its centroid.
#[test]
fn cluster_geometry_on_sixteen_cores() {
    let atac = AtacConfig {
        cluster_size: 4,
        ..AtacConfig::default()
    };
    let geometry = AtacGeometry::new(16, &atac).unwrap();

    assert_eq!(geometry.num_clusters(), 4);
    assert_eq!(geometry.cluster_of(0), 0);
    assert_eq!(geometry.cluster_of(3), 1);
    assert_eq!(geometry.cluster_of(8), 2);
    assert_eq!(geometry.cluster_of(10), 3);
    assert_eq!(geometry.cluster_of(15), 3);

    assert_eq!(geometry.hub_core(0), 0);
    assert_eq!(geometry.hub_core(1), 2);
    assert_eq!(geometry.hub_core(2), 8);
    assert_eq!(geometry.hub_core(3), 10);

    assert_eq!(geometry.cluster_members(1), vec![2, 3, 6, 7]);

    // One access point per cluster, at the sub-cluster centroid.
    assert_eq!(geometry.access_points(0), vec![5]);
    assert!(geometry.is_access_point(5));
    assert!(!geometry.is_access_point(0));
    assert_eq!(geometry.nearest_access_point(1), 5);
}

/// A non-power-of-two cluster size is rejected.
#[test]
fn bad_cluster_size_is_rejected() {
    let atac = AtacConfig {
        cluster_size: 6,
        ..AtacConfig::default()
    };
    assert!(AtacGeometry::new(16, &atac).is_err());
}

// ══════════════════════════════════════════════════════════
// 2. Global routing decision
// ══════════════════════════════════════════════════════════

/// Under the distance-based strategy a nearby cross-cluster unicast stays
/// electrical: the optical hubs never see it.
#[test]
fn nearby_unicast_stays_electrical() {
    let mut config = fb_atac_config(16, 4);
    config.network.atac.global_routing_strategy = GlobalRoutingStrategy::DistanceBased;
    config.network.atac.unicast_distance_threshold = 4;
    let mut sim = Simulator::new(config).unwrap();

    // Core 1 (cluster 0) to core 2 (cluster 1): distance 1 <= 4.
    send_user_packet(&mut sim, 1, 2, vec![0x01]);
    assert_eq!(recv_user_packet(&mut sim, 2).unwrap().data, vec![0x01]);
    for hub in [0, 2, 8, 10] {
        assert_eq!(hub_flits(&sim, hub, SEND_HUB), 0);
        assert_eq!(hub_flits(&sim, hub, RECEIVE_HUB), 0);
    }
}

/// A distant unicast goes optical: exactly one send hub and one receive
/// hub carry it.
#[test]
fn distant_unicast_goes_optical() {
    let mut config = fb_atac_config(16, 4);
    config.network.atac.unicast_distance_threshold = 2;
    let mut sim = Simulator::new(config).unwrap();

    // Core 0 (cluster 0) to core 15 (cluster 3): distance 6 > 2.
    send_user_packet(&mut sim, 0, 15, vec![0x0f]);
    assert_eq!(recv_user_packet(&mut sim, 15).unwrap().data, vec![0x0f]);

    assert_eq!(hub_flits(&sim, 0, SEND_HUB), 1, "sender cluster's send hub");
    assert_eq!(
        hub_flits(&sim, 10, RECEIVE_HUB),
        1,
        "receiver cluster's receive hub"
    );
    assert_eq!(hub_flits(&sim, 2, RECEIVE_HUB), 0);
    assert_eq!(hub_flits(&sim, 8, RECEIVE_HUB), 0);
}

/// Under the cluster-based strategy any cross-cluster unicast is optical,
/// distance notwithstanding.
#[test]
fn cluster_based_strategy_ignores_distance() {
    let mut config = fb_atac_config(16, 4);
    config.network.atac.global_routing_strategy = GlobalRoutingStrategy::ClusterBased;
    let mut sim = Simulator::new(config).unwrap();

    // Distance 1, but clusters differ.
    send_user_packet(&mut sim, 1, 2, vec![0x02]);
    assert_eq!(recv_user_packet(&mut sim, 2).unwrap().data, vec![0x02]);
    assert_eq!(hub_flits(&sim, 0, SEND_HUB), 1);
    assert_eq!(hub_flits(&sim, 2, RECEIVE_HUB), 1);
}

// ══════════════════════════════════════════════════════════
// 3. Broadcast and receive nets
// ══════════════════════════════════════════════════════════

/// A broadcast always takes the optical network and reaches every core;
/// the single optical send drives all four receive hubs.
#[test]
fn broadcast_goes_optical_to_every_core() {
    let mut sim = Simulator::new(fb_atac_config(16, 4)).unwrap();

    send_user_packet(&mut sim, 0, BROADCAST_CORE_ID, vec![0xbb]);
    for core in 0..16 {
        let packet = recv_user_packet(&mut sim, core)
            .unwrap_or_else(|| panic!("core {core} missed the broadcast"));
        assert_eq!(packet.data, vec![0xbb]);
    }
    assert_eq!(hub_flits(&sim, 0, SEND_HUB), 1);
    for hub in [0, 2, 8, 10] {
        assert_eq!(hub_flits(&sim, hub, RECEIVE_HUB), 1);
    }
}

/// The star receive net also distributes unicasts and broadcasts.
#[test]
fn star_receive_net_distributes() {
    let mut config = fb_atac_config(16, 4);
    config.network.atac.receive_net_type = ReceiveNetType::Star;
    let mut sim = Simulator::new(config).unwrap();

    send_user_packet(&mut sim, 0, 15, vec![0x33]);
    assert_eq!(recv_user_packet(&mut sim, 15).unwrap().data, vec![0x33]);

    send_user_packet(&mut sim, 5, BROADCAST_CORE_ID, vec![0x44]);
    for core in 0..16 {
        assert_eq!(
            recv_user_packet(&mut sim, core).unwrap().data,
            vec![0x44],
            "core {core} missed the star broadcast"
        );
    }
}

/// Senders spread across the receive nets of a cluster by sender cluster
/// id; packets from different clusters still all arrive.
#[test]
fn receive_net_spreading_delivers_from_all_clusters() {
    let mut config = fb_atac_config(16, 4);
    config.network.atac.num_receive_nets_per_cluster = 2;
    config.network.atac.global_routing_strategy = GlobalRoutingStrategy::ClusterBased;
    let mut sim = Simulator::new(config).unwrap();

    // Cluster ids 0..3 all send to core 15 (cluster 3).
    for sender in [0, 3, 8] {
        sim.net_send(sender, PacketType::User1, 15, vec![sender as u8])
            .unwrap();
    }
    sim.run_until_idle().unwrap();

    let mut received = Vec::new();
    while let Some(packet) = recv_user_packet(&mut sim, 15) {
        received.push(packet.data[0]);
    }
    received.sort_unstable();
    assert_eq!(received, vec![0, 3, 8]);
}
