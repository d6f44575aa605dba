//! Idealized unit-latency network model.
//!
//! Every packet arrives one cycle after it is sent, regardless of distance
//! or load. Useful as a functional baseline and for the networks whose
//! timing does not matter to an experiment.

use crate::common::{CoreId, SimError};
use crate::config::NetworkModelKind;
use crate::event::{EventPayload, EventQueue};
use crate::network::components::ModelingMsg;
use crate::network::model::NetworkModel;
use crate::network::packet::{NetPacket, StaticNetwork};

/// The magic network model.
#[derive(Debug)]
pub struct NetworkModelMagic {
    network_id: StaticNetwork,
    core_id: CoreId,
    total_cores: u32,
    enabled: bool,
    sender_sequence_num: u32,
    num_packets_sent: u64,
    num_broadcasts_sent: u64,
    num_packets_received: u64,
    num_bytes_received: u64,
    total_latency: u64,
}

impl NetworkModelMagic {
    /// Creates the model for one core.
    pub fn new(network_id: StaticNetwork, core_id: CoreId, total_cores: u32) -> Self {
        Self {
            network_id,
            core_id,
            total_cores,
            enabled: false,
            sender_sequence_num: 0,
            num_packets_sent: 0,
            num_broadcasts_sent: 0,
            num_packets_received: 0,
            num_bytes_received: 0,
            total_latency: 0,
        }
    }
}

impl NetworkModel for NetworkModelMagic {
    fn kind(&self) -> NetworkModelKind {
        NetworkModelKind::Magic
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
        debug_assert_eq!(packet.sender, self.core_id);
        packet.sequence_num = self.sender_sequence_num;
        self.sender_sequence_num += 1;
        if self.enabled {
            self.num_packets_sent += 1;
            if packet.is_broadcast() {
                self.num_broadcasts_sent += 1;
            }
        }

        packet.time += 1;
        if packet.is_broadcast() {
            for receiver in 0..self.total_cores as CoreId {
                queue.process_in_order(
                    packet.time,
                    receiver,
                    EventPayload::RawPacketArrival {
                        packet: packet.clone(),
                    },
                );
            }
        } else {
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
            "magic network model received a modeling message",
        ))
    }

    fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Network ({}): magic", self.network_id.name())?;
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
