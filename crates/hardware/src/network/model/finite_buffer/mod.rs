//! Finite-buffer network model family.
//!
//! One instance lives on each core and owns the network nodes placed
//! there. The life of a packet:
//! 1. **Send:** Assign the per-sender sequence number, charge the sender
//!    contention queue, forward the raw packet out-of-band to the
//!    receiver(s), and split the payload into flits injected through the
//!    per-core net-packet-injector node.
//! 2. **Route:** Each flit walks router pipelines; the topology computes a
//!    HEAD flit's output endpoints at every router it enters.
//! 3. **Reassemble:** At the receiving core interface, flits accumulate by
//!    packet id; the TAIL completes the packet, whose delivery time becomes
//!    the last flit's time plus serialization latency minus one.
//! 4. **Order:** Completed packets release in the order their raw copies
//!    arrived, per sender; packets released together share the latest time.

/// ATAC electrical/optical hybrid topology.
pub mod atac;
/// Three-stage Clos topology.
pub mod clos;
/// Electrical-mesh topology with the broadcast tree.
pub mod emesh;

use std::collections::HashMap;

use tracing::trace;

use crate::common::{CoreId, RouterId, SimError, Time, convert_cycle_count};
use crate::config::{Config, FiniteBufferNetConfig, FlowControlScheme, NetworkModelKind};
use crate::event::{EventPayload, EventQueue};
use crate::network::components::{
    Endpoint, Flit, FlitKind, ModelingMsg, NetworkMsgKind, NetworkNode,
};
use crate::network::model::{NetworkModel, serialization_latency};
use crate::network::node_index::{CORE_INTERFACE, NET_PACKET_INJECTOR};
use crate::network::packet::{NetPacket, StaticNetwork};
use crate::queue_model::QueueModelSimple;

/// Topology-specific behavior of a finite-buffer model.
pub trait FiniteBufferTopology: Send {
    /// Builds the network nodes living on this topology instance's core.
    fn build_nodes(&self) -> Result<Vec<NetworkNode>, SimError>;

    /// Returns the router the core's packet injector feeds.
    fn ingress_router_id(&self) -> RouterId;

    /// Computes the output endpoints a HEAD flit reserves at `node`.
    fn compute_output_endpoint_list(
        &mut self,
        flit: &Flit,
        node: &NetworkNode,
    ) -> Result<Vec<Endpoint>, SimError>;
}

/// A completed packet waiting for its in-order release.
#[derive(Debug)]
struct CompletePacket {
    packet: NetPacket,
    zero_load_delay: u64,
    recv_sequence_num: u32,
}

/// The finite-buffer network model for one core.
pub struct FiniteBufferNetworkModel {
    kind: NetworkModelKind,
    network_id: StaticNetwork,
    core_id: CoreId,
    total_cores: u32,
    frequency: f64,
    flit_width: u32,
    flow_control_scheme: FlowControlScheme,
    enabled: bool,
    topology: Box<dyn FiniteBufferTopology>,
    nodes: HashMap<i32, NetworkNode>,

    sender_sequence_num: u32,
    sender_contention_model: QueueModelSimple,

    // Receiver-side reassembly.
    recvd_modeling_times: HashMap<u64, Time>,
    recvd_raw_packets: HashMap<u64, NetPacket>,
    recv_seq_map: HashMap<u64, u32>,
    next_recv_seq_to_assign: Vec<u32>,
    next_recv_seq_to_process: Vec<u32>,
    complete_packet_lists: Vec<Vec<CompletePacket>>,

    num_packets_sent: u64,
    num_broadcasts_sent: u64,
    num_packets_received: u64,
    num_bytes_received: u64,
    total_packet_latency: u64,
    total_contention_delay: u64,
}

impl std::fmt::Debug for FiniteBufferNetworkModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiniteBufferNetworkModel")
            .field("kind", &self.kind)
            .field("network_id", &self.network_id)
            .field("core_id", &self.core_id)
            .finish_non_exhaustive()
    }
}

impl FiniteBufferNetworkModel {
    /// Creates the model and its nodes for one core.
    pub fn new(
        kind: NetworkModelKind,
        network_id: StaticNetwork,
        core_id: CoreId,
        total_cores: u32,
        config: &Config,
    ) -> Result<Self, SimError> {
        let net_cfg = net_config_for(kind, config);
        let topology: Box<dyn FiniteBufferTopology> = match kind {
            NetworkModelKind::FiniteBufferEmesh => Box::new(emesh::EMeshTopology::new(
                core_id,
                total_cores,
                net_cfg.clone(),
                config.network.emesh_broadcast_tree_enabled,
            )),
            NetworkModelKind::FiniteBufferClos => Box::new(clos::ClosTopology::new(
                core_id,
                config.network.clos.clone(),
                net_cfg.clone(),
            )?),
            NetworkModelKind::FiniteBufferAtac | NetworkModelKind::FiniteBufferFlipAtac => {
                Box::new(atac::AtacTopology::new(
                    core_id,
                    total_cores,
                    config.network.atac.clone(),
                    net_cfg.clone(),
                    config.general.tile_width,
                )?)
            }
            other => {
                return Err(SimError::config(format!(
                    "{other:?} is not a finite-buffer model"
                )));
            }
        };

        let mut nodes = HashMap::new();
        for node in topology.build_nodes()? {
            nodes.insert(node.router_id().index, node);
        }
        let injector = build_injector_node(core_id, topology.ingress_router_id(), &net_cfg);
        nodes.insert(NET_PACKET_INJECTOR, injector);

        Ok(Self {
            kind,
            network_id,
            core_id,
            total_cores,
            frequency: net_cfg.frequency,
            flit_width: net_cfg.flit_width,
            flow_control_scheme: net_cfg.flow_control_scheme,
            enabled: false,
            topology,
            nodes,
            sender_sequence_num: 0,
            sender_contention_model: QueueModelSimple::new(),
            recvd_modeling_times: HashMap::new(),
            recvd_raw_packets: HashMap::new(),
            recv_seq_map: HashMap::new(),
            next_recv_seq_to_assign: vec![0; total_cores as usize],
            next_recv_seq_to_process: vec![0; total_cores as usize],
            complete_packet_lists: (0..total_cores).map(|_| Vec::new()).collect(),
            num_packets_sent: 0,
            num_broadcasts_sent: 0,
            num_packets_received: 0,
            num_bytes_received: 0,
            total_packet_latency: 0,
            total_contention_delay: 0,
        })
    }

    /// Returns one of this core's nodes by index (test hook).
    pub fn node(&self, index: i32) -> Option<&NetworkNode> {
        self.nodes.get(&index)
    }

    fn compute_packet_id(sender: CoreId, sequence_num: u32) -> u64 {
        ((sender as u64) << 32) | u64::from(sequence_num)
    }

    fn divide_packet(&self, packet: &NetPacket, ser_latency: Time) -> Vec<Flit> {
        let packet_id = Self::compute_packet_id(packet.sender, packet.sequence_num);
        let base = Flit {
            kind: FlitKind::HeadTail,
            num_phits: ser_latency as u32,
            normalized_time: packet.time,
            zero_load_delay: 0,
            packet_id,
            sender: packet.sender,
            receiver: packet.receiver,
            packet_start_time: packet.start_time,
            output_endpoint_list: None,
        };
        match self.flow_control_scheme {
            // The packet-buffer schemes move the packet as one unit.
            FlowControlScheme::StoreAndForward | FlowControlScheme::VirtualCutThrough => {
                vec![base]
            }
            FlowControlScheme::Wormhole => {
                let count = ser_latency as u32;
                if count <= 1 {
                    return vec![base];
                }
                (0..count)
                    .map(|i| {
                        let kind = if i == 0 {
                            FlitKind::Head
                        } else if i == count - 1 {
                            FlitKind::Tail
                        } else {
                            FlitKind::Body
                        };
                        Flit {
                            kind,
                            num_phits: 1,
                            normalized_time: packet.time + u64::from(i),
                            ..base.clone()
                        }
                    })
                    .collect()
            }
        }
    }

    fn receive_modeling_flit(
        &mut self,
        flit: &Flit,
        core_frequency: f64,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError> {
        let packet_id = flit.packet_id;
        match self.recvd_modeling_times.get_mut(&packet_id) {
            None => {
                if !flit.kind.is_head() {
                    return Err(SimError::protocol("first flit of a packet was not a HEAD"));
                }
                self.recvd_modeling_times
                    .insert(packet_id, flit.normalized_time);
            }
            Some(last) => {
                *last = (*last).max(flit.normalized_time);
            }
        }

        if !flit.kind.is_tail() {
            return Ok(());
        }

        // Packet complete: marry it to its raw copy.
        self.recvd_modeling_times.remove(&packet_id);
        let mut raw_packet = self
            .recvd_raw_packets
            .remove(&packet_id)
            .ok_or_else(|| SimError::protocol("modeling packet completed before its raw copy"))?;

        let ser_latency = serialization_latency(raw_packet.length(), self.flit_width);
        raw_packet.time = flit.normalized_time + ser_latency - 1;
        let zero_load_delay = flit.zero_load_delay + (ser_latency - 1);

        self.insert_in_complete_packet_list(raw_packet, zero_load_delay)?;
        self.get_ready_packets(flit.sender, core_frequency, ready);
        Ok(())
    }

    fn insert_in_complete_packet_list(
        &mut self,
        packet: NetPacket,
        zero_load_delay: u64,
    ) -> Result<(), SimError> {
        let packet_id = Self::compute_packet_id(packet.sender, packet.sequence_num);
        let recv_sequence_num = self
            .recv_seq_map
            .remove(&packet_id)
            .ok_or_else(|| SimError::protocol("completed packet was never assigned a sequence"))?;

        let list = &mut self.complete_packet_lists[packet.sender as usize];
        let pos = list.partition_point(|cp| cp.recv_sequence_num < recv_sequence_num);
        list.insert(
            pos,
            CompletePacket {
                packet,
                zero_load_delay,
                recv_sequence_num,
            },
        );
        Ok(())
    }

    /// Releases the in-order prefix of completed packets from one sender.
    ///
    /// Packets released together are all stamped with the latest time among
    /// them.
    fn get_ready_packets(
        &mut self,
        sender: CoreId,
        core_frequency: f64,
        ready: &mut Vec<NetPacket>,
    ) {
        let next = &mut self.next_recv_seq_to_process[sender as usize];
        let list = &mut self.complete_packet_lists[sender as usize];
        let mut max_time: Time = 0;

        while list
            .first()
            .is_some_and(|cp| cp.recv_sequence_num == *next)
        {
            let complete = list.remove(0);
            let mut packet = complete.packet;
            max_time = max_time.max(packet.time);
            packet.time = max_time;
            *next += 1;

            let latency = packet.time.saturating_sub(packet.start_time);
            if self.enabled {
                self.num_packets_received += 1;
                self.num_bytes_received += u64::from(packet.length());
                self.total_packet_latency += latency;
                self.total_contention_delay +=
                    latency.saturating_sub(complete.zero_load_delay);
            }

            // Times were normalized to the network clock at send; purely
            // local packets never were.
            let local = packet.sender == self.core_id && packet.receiver == self.core_id;
            if !local {
                packet.time = convert_cycle_count(packet.time, self.frequency, core_frequency);
                packet.start_time =
                    convert_cycle_count(packet.start_time, self.frequency, core_frequency);
            }
            ready.push(packet);
        }
    }
}

impl NetworkModel for FiniteBufferNetworkModel {
    fn kind(&self) -> NetworkModelKind {
        self.kind
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
        core_frequency: f64,
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
        trace!(
            core = self.core_id,
            receiver = packet.receiver,
            seq = packet.sequence_num,
            "finite-buffer send"
        );

        // A core talking to itself never touches the network.
        if !packet.is_broadcast() && packet.receiver == self.core_id {
            let time = packet.time;
            queue.process_in_order(time, self.core_id, EventPayload::RawPacketArrival { packet });
            return Ok(());
        }

        // Enter the network clock domain.
        packet.start_time = convert_cycle_count(packet.start_time, core_frequency, self.frequency);
        packet.time = convert_cycle_count(packet.time, core_frequency, self.frequency);

        let ser_latency = serialization_latency(packet.length(), self.flit_width);
        let contention = self
            .sender_contention_model
            .compute_queue_delay(packet.time, ser_latency);
        packet.time += contention;

        // The raw copy travels out-of-band; reassembly waits for the flits.
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
                EventPayload::RawPacketArrival {
                    packet: packet.clone(),
                },
            );
        }

        // Inject the flits through the packet-injector node.
        for flit in self.divide_packet(&packet, ser_latency) {
            let time = flit.normalized_time;
            queue.process_in_order(
                time,
                self.core_id,
                EventPayload::ModelingMsgArrival {
                    network: self.network_id,
                    msg: ModelingMsg {
                        receiver_router: RouterId::new(self.core_id, NET_PACKET_INJECTOR),
                        sender_router: RouterId::new(self.core_id, CORE_INTERFACE),
                        kind: NetworkMsgKind::Data(flit),
                    },
                },
            );
        }
        Ok(())
    }

    fn receive_raw_packet(
        &mut self,
        packet: NetPacket,
        core_frequency: f64,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError> {
        let packet_id = Self::compute_packet_id(packet.sender, packet.sequence_num);
        let assign = &mut self.next_recv_seq_to_assign[packet.sender as usize];
        let recv_sequence_num = *assign;
        *assign += 1;
        self.recv_seq_map.insert(packet_id, recv_sequence_num);

        if packet.sender == self.core_id && packet.receiver == self.core_id {
            // Local delivery: complete immediately with zero network delay.
            let sender = packet.sender;
            self.insert_in_complete_packet_list(packet, 0)?;
            self.get_ready_packets(sender, core_frequency, ready);
            return Ok(());
        }

        if self.recvd_modeling_times.contains_key(&packet_id) {
            return Err(SimError::protocol("raw packet arrived after its flits"));
        }
        self.recvd_raw_packets.insert(packet_id, packet);
        Ok(())
    }

    fn receive_modeling_msg(
        &mut self,
        msg: ModelingMsg,
        core_frequency: f64,
        queue: &mut EventQueue,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError> {
        debug_assert_eq!(msg.receiver_router.core_id, self.core_id);
        let node_index = msg.receiver_router.index;

        if node_index == CORE_INTERFACE {
            let NetworkMsgKind::Data(flit) = msg.kind else {
                return Err(SimError::protocol(
                    "buffer-management message at the core interface",
                ));
            };
            return self.receive_modeling_flit(&flit, core_frequency, ready);
        }

        let node = self
            .nodes
            .get_mut(&node_index)
            .ok_or_else(|| SimError::protocol(format!("no node with index {node_index}")))?;

        let mut kind = msg.kind;
        if let NetworkMsgKind::Data(flit) = &mut kind {
            if flit.kind.is_head() {
                flit.output_endpoint_list = Some(if node_index == NET_PACKET_INJECTOR {
                    vec![Endpoint::new(0, 0)]
                } else {
                    self.topology.compute_output_endpoint_list(flit, node)?
                });
            }
        }

        let mut out_msgs = Vec::new();
        node.process_modeling_msg(kind, msg.sender_router, &mut out_msgs)?;
        for out in out_msgs {
            queue.process_in_order(
                out.normalized_time(),
                out.receiver_router.core_id,
                EventPayload::ModelingMsgArrival {
                    network: self.network_id,
                    msg: out,
                },
            );
        }
        Ok(())
    }

    fn as_finite_buffer(&self) -> Option<&FiniteBufferNetworkModel> {
        Some(self)
    }

    fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(
            out,
            "  Network ({}): {:?}",
            self.network_id.name(),
            self.kind
        )?;
        writeln!(out, "    packets sent: {}", self.num_packets_sent)?;
        writeln!(out, "    broadcasts sent: {}", self.num_broadcasts_sent)?;
        writeln!(out, "    packets received: {}", self.num_packets_received)?;
        writeln!(out, "    bytes received: {}", self.num_bytes_received)?;
        let (avg_latency, avg_contention) = if self.num_packets_received == 0 {
            (0.0, 0.0)
        } else {
            (
                self.total_packet_latency as f64 / self.num_packets_received as f64,
                self.total_contention_delay as f64 / self.num_packets_received as f64,
            )
        };
        writeln!(out, "    average latency: {avg_latency:.2}")?;
        writeln!(out, "    average contention delay: {avg_contention:.2}")?;
        let mut indices: Vec<i32> = self.nodes.keys().copied().collect();
        indices.sort_unstable();
        for index in indices {
            let node = &self.nodes[&index];
            writeln!(
                out,
                "    node {index}: flits forwarded: {}, link traversals: {}, avg contention: {:.2}",
                node.num_flits_forwarded(),
                node.total_link_traversals(),
                node.average_contention_delay()
            )?;
        }
        Ok(())
    }
}

/// Picks the parameter block for a finite-buffer model kind.
fn net_config_for(kind: NetworkModelKind, config: &Config) -> FiniteBufferNetConfig {
    match kind {
        NetworkModelKind::FiniteBufferClos => config.network.clos_net.clone(),
        NetworkModelKind::FiniteBufferAtac | NetworkModelKind::FiniteBufferFlipAtac => {
            config.network.atac_net.clone()
        }
        _ => config.network.emesh.clone(),
    }
}

/// Builds the per-core net-packet-injector node.
///
/// Its only job is to inject flits into the true ingress router under that
/// router's back-pressure; the core-side input never back-pressures.
fn build_injector_node(
    core_id: CoreId,
    ingress_router_id: RouterId,
    net_cfg: &FiniteBufferNetConfig,
) -> NetworkNode {
    use crate::config::BufferManagementScheme;
    use crate::network::components::{ChannelSpec, RouterPerformanceModel};

    let perf = RouterPerformanceModel::new(
        net_cfg.flow_control_scheme,
        0,
        0,
        &[ChannelSpec::new(BufferManagementScheme::Infinite, 0)],
        &[ChannelSpec::new(
            net_cfg.buffer_management_scheme,
            net_cfg.router.input_buffer_size,
        )],
    );
    NetworkNode::new(
        RouterId::new(core_id, NET_PACKET_INJECTOR),
        perf,
        None,
        vec![None],
        vec![vec![RouterId::new(core_id, CORE_INTERFACE)]],
        vec![vec![ingress_router_id]],
    )
}
