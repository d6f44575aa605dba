//! Random-pairs clock synchronization tests.
//!
//! Exercises the REQ/ACK/WAIT protocol directly on the client (with a
//! recording sleeper instead of wall-clock sleeps) and end-to-end over the
//! system network of a small simulated machine.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use nocsim_core::Simulator;
use nocsim_core::clock_skew::{ClockSkewClient, RandomPairsSyncClient, Sleeper, SyncMsg, SyncMsgType};
use nocsim_core::config::{ClockSkewScheme, RandomPairsConfig};
use nocsim_core::core::CoreState;

use crate::common::magic_config;

/// Records requested sleeps instead of performing them.
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<u64>>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, micros: u64) {
        self.sleeps.lock().unwrap().push(micros);
    }
}

fn client(slack: u64, quantum: u64) -> RandomPairsSyncClient {
    let config = RandomPairsConfig {
        slack,
        quantum,
        sleep_fraction: 1.0,
    };
    let mut client = RandomPairsSyncClient::new(&config, 0, 4);
    client.set_sleeper(Box::new(RecordingSleeper::default()));
    client.enable();
    client
}

// ══════════════════════════════════════════════════════════
// 1. The REQ/ACK/WAIT decisions
// ══════════════════════════════════════════════════════════

/// No REQ is generated until a full quantum of local time has elapsed.
#[test]
fn no_request_before_a_quantum() {
    let mut client = client(100, 1000);
    assert!(client.synchronize(500).is_none());
    let (receiver, msg) = client.synchronize(1200).expect("quantum elapsed");
    assert!(receiver >= 1 && receiver <= 2, "peer offset in [1,(N-1)/2]");
    assert_eq!(msg.msg_type, SyncMsgType::Req);
    assert_eq!(msg.time, 1200);
    assert!(client.awaiting_ack());
}

/// A peer far ahead replies ACK(0) and self-queues a WAIT; the wait shows
/// up as a sleep once its own ACK round completes.
#[test]
fn peer_ahead_acks_zero_and_rate_limits_itself() {
    let mut peer = client(100, 1000);
    let req = SyncMsg {
        sender: 2,
        msg_type: SyncMsgType::Req,
        time: 1000,
    };
    // Peer at 3000: 3000 - 1000 > slack(100).
    let reply = peer
        .process_sync_msg(req, 3000, CoreState::Running)
        .unwrap()
        .expect("a REQ always gets a reply");
    assert_eq!(reply.0, 2);
    assert_eq!(reply.1.msg_type, SyncMsgType::Ack);
    assert_eq!(reply.1.time, 0);

    // The self-queued WAIT is folded in when the peer's own ACK arrives.
    let (_, _req) = peer.synchronize(3500).expect("peer initiates its own round");
    let ack = SyncMsg {
        sender: 1,
        msg_type: SyncMsgType::Ack,
        time: 0,
    };
    peer.process_sync_msg(ack, 3500, CoreState::Running).unwrap();
    assert!(!peer.awaiting_ack());
    assert_eq!(peer.total_wait_cycles(), 2000, "the WAIT(3000-1000) applied");
}

/// Clocks within the slack: plain ACK(0), no waits anywhere.
#[test]
fn clocks_within_slack_ack_zero() {
    let mut peer = client(100, 1000);
    let req = SyncMsg {
        sender: 1,
        msg_type: SyncMsgType::Req,
        time: 1050,
    };
    let reply = peer
        .process_sync_msg(req, 1000, CoreState::Running)
        .unwrap()
        .unwrap();
    assert_eq!(reply.1.time, 0);
    assert_eq!(peer.total_wait_cycles(), 0);
}

/// A peer far behind tells the initiator to wait by the difference.
#[test]
fn peer_behind_instructs_the_initiator_to_wait() {
    let mut peer = client(100, 1000);
    let req = SyncMsg {
        sender: 1,
        msg_type: SyncMsgType::Req,
        time: 5000,
    };
    let reply = peer
        .process_sync_msg(req, 1000, CoreState::Running)
        .unwrap()
        .unwrap();
    assert_eq!(reply.1.msg_type, SyncMsgType::Ack);
    assert_eq!(reply.1.time, 4000);
}

/// The initiator applies the instructed wait when the ACK arrives.
#[test]
fn initiator_applies_the_instructed_wait() {
    let mut initiator = client(100, 1000);
    let _ = initiator.synchronize(2000).unwrap();
    let ack = SyncMsg {
        sender: 3,
        msg_type: SyncMsgType::Ack,
        time: 750,
    };
    initiator
        .process_sync_msg(ack, 2000, CoreState::Running)
        .unwrap();
    assert!(!initiator.awaiting_ack());
    assert_eq!(initiator.total_wait_cycles(), 750);
}

/// A non-running peer answers ACK(0) so the initiator never blocks on it.
#[test]
fn non_running_peer_still_answers() {
    let mut peer = client(100, 1000);
    let req = SyncMsg {
        sender: 1,
        msg_type: SyncMsgType::Req,
        time: 9000,
    };
    let reply = peer
        .process_sync_msg(req, 0, CoreState::Stalled)
        .unwrap()
        .unwrap();
    assert_eq!(reply.1.msg_type, SyncMsgType::Ack);
    assert_eq!(reply.1.time, 0);
}

// ══════════════════════════════════════════════════════════
// 2. End-to-end over the system network
// ══════════════════════════════════════════════════════════

/// A full round over the simulated system network: the initiator's REQ
/// reaches a peer, the ACK comes back, and the initiator stops waiting.
#[test]
fn request_ack_round_over_the_network() {
    let mut config = magic_config(4);
    config.clock_skew_minimization.scheme = ClockSkewScheme::RandomPairs;
    config.clock_skew_minimization.random_pairs.quantum = 100;
    let mut sim = Simulator::new(config).unwrap();

    // Install recording sleepers everywhere.
    for core in 0..4 {
        if let ClockSkewClient::RandomPairs(client) =
            sim.core_mut(core).clock_skew_client_mut()
        {
            client.set_sleeper(Box::new(RecordingSleeper::default()));
        }
    }

    // Drive the initiator past a quantum: this emits a REQ over the
    // system network.
    assert!(sim.event_queue().is_empty());
    sim.synchronize_core(0, 250).unwrap();
    assert!(matches!(
        sim.core_mut(0).clock_skew_client_mut(),
        ClockSkewClient::RandomPairs(client) if client.awaiting_ack()
    ));

    sim.run_until_idle().unwrap();
    assert!(matches!(
        sim.core_mut(0).clock_skew_client_mut(),
        ClockSkewClient::RandomPairs(client) if !client.awaiting_ack()
    ));
}
