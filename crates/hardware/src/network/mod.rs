//! Per-core network stack.
//!
//! Each core owns a [`Network`] holding the five logical networks (two
//! user, two memory, one system), each bound to a configured model.
//! `net_send` chooses the network by packet type; delivered packets either
//! fire a registered asynchronous receive callback (dispatched by the core
//! to the owning component) or queue for `net_recv` matching.

/// Building blocks of the finite-buffer models.
pub mod components;
/// The network models.
pub mod model;
/// Packets, packet types, and receive matching.
pub mod packet;

/// Well-known network node indices.
///
/// A core's nodes are distinguished by index; the core interface is a
/// pseudo-node shared by every model.
pub mod node_index {
    /// The core interface pseudo-node: source of injected flits and sink of
    /// delivered ones.
    pub const CORE_INTERFACE: i32 = -1;
    /// The per-core packet injector.
    pub const NET_PACKET_INJECTOR: i32 = 0;
    /// The electrical-mesh router (e-mesh and ATAC models).
    pub const EMESH: i32 = 1;
    /// The ATAC optical send hub.
    pub const SEND_HUB: i32 = 2;
    /// The ATAC optical receive hub.
    pub const RECEIVE_HUB: i32 = 3;
    /// First ATAC star-net router; net `i` is `STAR_NET_ROUTER_BASE + i`.
    pub const STAR_NET_ROUTER_BASE: i32 = 4;
    /// The Clos ingress router.
    pub const CLOS_INGRESS: i32 = 1;
    /// The Clos middle router.
    pub const CLOS_MIDDLE: i32 = 2;
    /// The Clos egress router.
    pub const CLOS_EGRESS: i32 = 3;
}

use crate::common::{CoreId, SimError};
use crate::config::Config;
use crate::event::EventQueue;
use components::ModelingMsg;
use model::NetworkModel;
use packet::{NetMatch, NetPacket, PacketType, StaticNetwork};

/// The per-core network façade.
pub struct Network {
    core_id: CoreId,
    models: Vec<Box<dyn NetworkModel>>,
    async_recv_registered: [bool; 6],
    recv_queue: Vec<NetPacket>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("core_id", &self.core_id)
            .field("recv_queue_len", &self.recv_queue.len())
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Creates the five logical networks for one core.
    pub fn new(core_id: CoreId, total_cores: u32, config: &Config) -> Result<Self, SimError> {
        let kinds = [
            config.network.user_model_1,
            config.network.user_model_2,
            config.network.memory_model_1,
            config.network.memory_model_2,
            config.network.system_model,
        ];
        let mut models = Vec::with_capacity(StaticNetwork::COUNT);
        for (index, kind) in kinds.into_iter().enumerate() {
            models.push(model::create_network_model(
                kind,
                StaticNetwork::from_index(index),
                core_id,
                total_cores,
                config,
            )?);
        }
        Ok(Self {
            core_id,
            models,
            async_recv_registered: [false; 6],
            recv_queue: Vec::new(),
        })
    }

    /// Sends a packet on the network its type maps to.
    ///
    /// # Returns
    ///
    /// The number of payload bytes accepted.
    pub fn net_send(
        &mut self,
        packet: NetPacket,
        core_frequency: f64,
        queue: &mut EventQueue,
    ) -> Result<u32, SimError> {
        if packet.sender != self.core_id {
            return Err(SimError::protocol(format!(
                "core {} sending a packet claiming sender {}",
                self.core_id, packet.sender
            )));
        }
        let length = packet.length();
        let network = packet.packet_type.static_network();
        self.models[network.index()].net_send(packet, core_frequency, queue)?;
        Ok(length)
    }

    /// A raw packet arrived; returns the packets released in order.
    pub fn receive_raw_packet(
        &mut self,
        packet: NetPacket,
        core_frequency: f64,
    ) -> Result<Vec<NetPacket>, SimError> {
        let network = packet.packet_type.static_network();
        let mut ready = Vec::new();
        self.models[network.index()].receive_raw_packet(packet, core_frequency, &mut ready)?;
        Ok(ready)
    }

    /// A modeling message arrived for one of this core's nodes.
    pub fn receive_modeling_msg(
        &mut self,
        network: StaticNetwork,
        msg: ModelingMsg,
        core_frequency: f64,
        queue: &mut EventQueue,
    ) -> Result<Vec<NetPacket>, SimError> {
        let mut ready = Vec::new();
        self.models[network.index()].receive_modeling_msg(msg, core_frequency, queue, &mut ready)?;
        Ok(ready)
    }

    /// Registers an asynchronous receive callback for a packet type; the
    /// core dispatches matching deliveries to the owning component instead
    /// of queueing them.
    pub fn register_async_recv_callback(&mut self, packet_type: PacketType) {
        self.async_recv_registered[packet_type.to_u16() as usize] = true;
    }

    /// Unregisters the asynchronous receive callback for a packet type.
    pub fn unregister_async_recv_callback(&mut self, packet_type: PacketType) {
        self.async_recv_registered[packet_type.to_u16() as usize] = false;
    }

    /// Returns whether a packet type has an asynchronous callback.
    pub fn has_async_recv_callback(&self, packet_type: PacketType) -> bool {
        self.async_recv_registered[packet_type.to_u16() as usize]
    }

    /// Queues a delivered packet for `net_recv`.
    pub fn queue_packet(&mut self, packet: NetPacket) {
        self.recv_queue.push(packet);
    }

    /// Takes the earliest queued packet satisfying the filter.
    ///
    /// # Arguments
    ///
    /// * `net_match` - Sender set crossed with type set.
    /// * `expected_length` - The length the caller committed to; a match
    ///   with a different length is fatal.
    pub fn net_recv(
        &mut self,
        net_match: &NetMatch,
        expected_length: Option<u32>,
    ) -> Result<Option<NetPacket>, SimError> {
        let position = self.recv_queue.iter().position(|p| net_match.matches(p));
        let Some(position) = position else {
            return Ok(None);
        };
        let packet = self.recv_queue.remove(position);
        if let Some(expected) = expected_length {
            if packet.length() != expected {
                return Err(SimError::Length {
                    expected,
                    actual: packet.length(),
                });
            }
        }
        Ok(Some(packet))
    }

    /// Enables every model's statistics.
    pub fn enable_models(&mut self) {
        for model in &mut self.models {
            model.enable();
        }
    }

    /// Disables every model's statistics.
    pub fn disable_models(&mut self) {
        for model in &mut self.models {
            model.disable();
        }
    }

    /// Returns a model by network for inspection (test hook).
    pub fn model(&self, network: StaticNetwork) -> &dyn NetworkModel {
        self.models[network.index()].as_ref()
    }

    /// Writes all five models' summary blocks.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        for model in &self.models {
            model.output_summary(out)?;
        }
        Ok(())
    }
}
