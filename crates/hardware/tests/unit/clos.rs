//! Clos topology tests.
//!
//! A 4x4x2 Clos over 16 cores: the core-count constraint, memory
//! controller placement on middles before ingresses, the exact three-hop
//! path, and a uniform-random load run that must drain without deadlock.

use pretty_assertions::assert_eq;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nocsim_core::Simulator;
use nocsim_core::config::NetworkModelKind;
use nocsim_core::network::node_index::{CLOS_EGRESS, CLOS_INGRESS, CLOS_MIDDLE};
use nocsim_core::network::packet::{PacketType, StaticNetwork};

use crate::common::{fb_clos_config, recv_user_packet, send_user_packet};

fn node_flits(sim: &Simulator, core: i32, index: i32) -> u64 {
    sim.core(core)
        .network()
        .model(StaticNetwork::User1)
        .as_finite_buffer()
        .unwrap()
        .node(index)
        .map_or(0, |n| n.num_flits_forwarded())
}

// ══════════════════════════════════════════════════════════
// 1. Constraints and placement
// ══════════════════════════════════════════════════════════

/// total_cores must equal ports x ingress routers; anything else is a
/// configuration error.
#[test]
fn core_count_must_match_the_fabric() {
    let mut config = fb_clos_config(4, 4, 2);
    config.general.total_cores = 12;
    assert!(Simulator::new(config).is_err());
}

/// Memory controllers land on middle-router cores first, then ingress
/// cores; more than middles + ingresses is a configuration error.
#[test]
fn memory_controllers_prefer_middle_routers() {
    let mut config = fb_clos_config(4, 4, 2);
    // Use the Clos for the coherence network so it drives placement.
    config.network.memory_model_1 = NetworkModelKind::FiniteBufferClos;
    config.network.user_model_1 = NetworkModelKind::Magic;
    config.perf_model.dram.num_controllers = 3;
    let sim = Simulator::new(config).unwrap();

    // Middles are on cores k*(16/2)+1 = 1, 9; the third controller falls
    // back to ingress core 0.
    assert_eq!(sim.mem_controller_cores(), &[1, 9, 0]);

    let mut config = fb_clos_config(4, 4, 2);
    config.network.memory_model_1 = NetworkModelKind::FiniteBufferClos;
    config.perf_model.dram.num_controllers = 7;
    assert!(
        Simulator::new(config).is_err(),
        "7 controllers exceed 2 middles + 4 ingresses"
    );
}

// ══════════════════════════════════════════════════════════
// 2. Routing
// ══════════════════════════════════════════════════════════

/// Every packet takes exactly ingress -> middle -> egress: one flit
/// forwarded at one router of each stage, none anywhere else.
#[test]
fn exactly_three_router_hops() {
    let mut sim = Simulator::new(fb_clos_config(4, 4, 2)).unwrap();

    send_user_packet(&mut sim, 2, 13, vec![0x77]);
    assert_eq!(recv_user_packet(&mut sim, 13).unwrap().data, vec![0x77]);

    // Sender group 0: ingress on core 0. Receiver group 3: egress on 15.
    assert_eq!(node_flits(&sim, 0, CLOS_INGRESS), 1);
    let middle_flits = node_flits(&sim, 1, CLOS_MIDDLE) + node_flits(&sim, 9, CLOS_MIDDLE);
    assert_eq!(middle_flits, 1, "exactly one middle router carries the flit");
    assert_eq!(node_flits(&sim, 15, CLOS_EGRESS), 1);

    // No other ingress/egress touched it.
    for ingress in [4, 8, 12] {
        assert_eq!(node_flits(&sim, ingress, CLOS_INGRESS), 0);
    }
    for egress in [3, 7, 11] {
        assert_eq!(node_flits(&sim, egress, CLOS_EGRESS), 0);
    }
}

/// A uniform-random load drains with no deadlock and every packet
/// delivered.
#[test]
fn uniform_random_load_drains() {
    let mut sim = Simulator::new(fb_clos_config(4, 4, 2)).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let rounds = 50;

    for _ in 0..rounds {
        for sender in 0..16 {
            let receiver = loop {
                let candidate = rng.gen_range(0..16);
                if candidate != sender {
                    break candidate;
                }
            };
            sim.net_send(sender, PacketType::User1, receiver, vec![sender as u8; 8])
                .unwrap();
        }
        sim.run_until_idle().unwrap();
    }

    let mut delivered = 0u32;
    for core in 0..16 {
        while recv_user_packet(&mut sim, core).is_some() {
            delivered += 1;
        }
    }
    assert_eq!(delivered, rounds * 16);
}
