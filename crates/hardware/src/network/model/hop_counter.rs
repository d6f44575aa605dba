//! Analytical e-mesh hop-counter model.
//!
//! Lays the cores out on the same mesh as the finite-buffer e-mesh but
//! charges a closed-form latency instead of routing flits: XY hop count
//! times per-hop router + link delay, plus serialization. No contention is
//! modeled.

use crate::common::{CoreId, SimError, Time};
use crate::config::{Config, NetworkModelKind};
use crate::event::{EventPayload, EventQueue};
use crate::network::components::ModelingMsg;
use crate::network::model::{NetworkModel, emesh_dimensions, serialization_latency};
use crate::network::packet::{NetPacket, StaticNetwork};

/// The e-mesh hop-counter model.
#[derive(Debug)]
pub struct NetworkModelEMeshHopCounter {
    network_id: StaticNetwork,
    core_id: CoreId,
    total_cores: u32,
    width: u32,
    router_delay: Time,
    link_delay: Time,
    flit_width: u32,
    enabled: bool,
    sender_sequence_num: u32,
    num_packets_sent: u64,
    num_broadcasts_sent: u64,
    num_packets_received: u64,
    num_bytes_received: u64,
    total_latency: u64,
}

impl NetworkModelEMeshHopCounter {
    /// Creates the model for one core.
    pub fn new(
        network_id: StaticNetwork,
        core_id: CoreId,
        total_cores: u32,
        config: &Config,
    ) -> Self {
        let (width, _) = emesh_dimensions(total_cores);
        let hop = &config.network.emesh_hop_counter;
        Self {
            network_id,
            core_id,
            total_cores,
            width,
            router_delay: hop.router_delay,
            link_delay: hop.link_delay,
            flit_width: hop.flit_width,
            enabled: false,
            sender_sequence_num: 0,
            num_packets_sent: 0,
            num_broadcasts_sent: 0,
            num_packets_received: 0,
            num_bytes_received: 0,
            total_latency: 0,
        }
    }

    fn position(&self, core_id: CoreId) -> (i32, i32) {
        (core_id % self.width as i32, core_id / self.width as i32)
    }

    fn latency_to(&self, receiver: CoreId, length_bytes: u32) -> Time {
        let (sx, sy) = self.position(self.core_id);
        let (dx, dy) = self.position(receiver);
        let hops = Time::from(sx.abs_diff(dx) + sy.abs_diff(dy));
        hops * (self.router_delay + self.link_delay)
            + serialization_latency(length_bytes, self.flit_width)
    }
}

impl NetworkModel for NetworkModelEMeshHopCounter {
    fn kind(&self) -> NetworkModelKind {
        NetworkModelKind::EmeshHopCounter
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn net_send(
        &mut self,
        mut packet: NetPacket,
        _core_frequency: f64,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        packet.sequence_num = self.sender_sequence_num;
        self.sender_sequence_num += 1;
        if self.enabled {
            self.num_packets_sent += 1;
            if packet.is_broadcast() {
                self.num_broadcasts_sent += 1;
            }
        }

        if packet.is_broadcast() {
            for receiver in 0..self.total_cores as CoreId {
                let mut copy = packet.clone();
                copy.time += self.latency_to(receiver, copy.length());
                queue.process_in_order(
                    copy.time,
                    receiver,
                    EventPayload::RawPacketArrival { packet: copy },
                );
            }
        } else {
            packet.time += self.latency_to(packet.receiver, packet.length());
            queue.process_in_order(
                packet.time,
                packet.receiver,
                EventPayload::RawPacketArrival { packet },
            );
        }
        Ok(())
    }

    fn receive_raw_packet(
        &mut self,
        packet: NetPacket,
        _core_frequency: f64,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError> {
        if self.enabled {
            self.num_packets_received += 1;
            self.num_bytes_received += u64::from(packet.length());
            self.total_latency += packet.time - packet.start_time;
        }
        ready.push(packet);
        Ok(())
    }

    fn receive_modeling_msg(
        &mut self,
        _msg: ModelingMsg,
        _core_frequency: f64,
        _queue: &mut EventQueue,
        _ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError> {
        Err(SimError::protocol(
            "hop-counter network model received a modeling message",
        ))
    }

    fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(
            out,
            "  Network ({}): emesh_hop_counter",
            self.network_id.name()
        )?;
        writeln!(out, "    packets sent: {}", self.num_packets_sent)?;
        writeln!(out, "    broadcasts sent: {}", self.num_broadcasts_sent)?;
        writeln!(out, "    packets received: {}", self.num_packets_received)?;
        writeln!(out, "    bytes received: {}", self.num_bytes_received)?;
        let average = if self.num_packets_received == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.num_packets_received as f64
        };
        writeln!(out, "    average latency: {average:.2}")
    }
}
