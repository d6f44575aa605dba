//! Network models.
//!
//! Each of the five logical networks binds to one model:
//! 1. **Magic:** Unit latency, no structure; the functional baseline.
//! 2. **E-mesh hop counter:** Analytical per-hop latency, no contention.
//! 3. **Finite-buffer family:** Routed flits over finite buffers, for the
//!    e-mesh, Clos, and ATAC topologies.
//!
//! This module also owns the two topology-wide decisions made before any
//! core exists: how a requested core count rounds up to an acceptable
//! value, and which cores carry memory controllers.

/// The finite-buffer model family.
pub mod finite_buffer;
/// Analytical e-mesh hop-counter model.
pub mod hop_counter;
/// Idealized unit-latency model.
pub mod magic;

use crate::common::{CoreId, SimError, Time};
use crate::config::{Config, NetworkModelKind};
use crate::event::EventQueue;
use crate::network::components::ModelingMsg;
use crate::network::packet::{NetPacket, StaticNetwork};

/// Behavior common to every network model.
///
/// A model lives on one core. Sending turns a raw packet into arrival and
/// modeling events; receiving consumes those events and hands completed raw
/// packets back to the core.
pub trait NetworkModel: Send {
    /// Returns which model this is.
    fn kind(&self) -> NetworkModelKind;

    /// Enables statistics accumulation.
    fn enable(&mut self);

    /// Disables statistics accumulation.
    fn disable(&mut self);

    /// Sends a raw packet: assigns its sequence number and schedules the
    /// arrival (and, for modeled networks, flit) events.
    fn net_send(
        &mut self,
        packet: NetPacket,
        core_frequency: f64,
        queue: &mut EventQueue,
    ) -> Result<(), SimError>;

    /// A raw packet arrived at this core; completed packets (in per-sender
    /// order) are appended to `ready`.
    fn receive_raw_packet(
        &mut self,
        packet: NetPacket,
        core_frequency: f64,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError>;

    /// A modeling message arrived at one of this core's network nodes.
    fn receive_modeling_msg(
        &mut self,
        msg: ModelingMsg,
        core_frequency: f64,
        queue: &mut EventQueue,
        ready: &mut Vec<NetPacket>,
    ) -> Result<(), SimError>;

    /// Writes the model's summary block.
    fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()>;

    /// Returns the finite-buffer view of this model, when it has one.
    fn as_finite_buffer(&self) -> Option<&finite_buffer::FiniteBufferNetworkModel> {
        None
    }
}

/// Creates the configured model for one logical network on one core.
pub fn create_network_model(
    kind: NetworkModelKind,
    network_id: StaticNetwork,
    core_id: CoreId,
    total_cores: u32,
    config: &Config,
) -> Result<Box<dyn NetworkModel>, SimError> {
    Ok(match kind {
        NetworkModelKind::Magic => Box::new(magic::NetworkModelMagic::new(
            network_id,
            core_id,
            total_cores,
        )),
        NetworkModelKind::EmeshHopCounter => Box::new(
            hop_counter::NetworkModelEMeshHopCounter::new(network_id, core_id, total_cores, config),
        ),
        NetworkModelKind::FiniteBufferEmesh
        | NetworkModelKind::FiniteBufferClos
        | NetworkModelKind::FiniteBufferAtac
        | NetworkModelKind::FiniteBufferFlipAtac => {
            Box::new(finite_buffer::FiniteBufferNetworkModel::new(
                kind,
                network_id,
                core_id,
                total_cores,
                config,
            )?)
        }
    })
}

/// Rounds a requested core count up to the topology's nearest acceptable
/// value, or rejects it where the topology admits exactly one count.
pub fn compute_core_count_constraints(
    kind: NetworkModelKind,
    core_count: u32,
    config: &Config,
) -> Result<u32, SimError> {
    match kind {
        NetworkModelKind::Magic | NetworkModelKind::EmeshHopCounter => Ok(core_count),
        NetworkModelKind::FiniteBufferEmesh => {
            let (width, height) = emesh_dimensions(core_count);
            Ok(width * height)
        }
        NetworkModelKind::FiniteBufferClos => {
            let clos = &config.network.clos;
            let expected = clos.num_router_ports * clos.num_in_routers;
            if core_count != expected {
                return Err(SimError::config(format!(
                    "clos requires total_cores = num_router_ports x num_in_routers = {expected}, got {core_count}"
                )));
            }
            Ok(core_count)
        }
        NetworkModelKind::FiniteBufferAtac | NetworkModelKind::FiniteBufferFlipAtac => {
            let cluster_size = config.network.atac.cluster_size;
            if !cluster_size.is_power_of_two() {
                return Err(SimError::config(format!(
                    "atac cluster_size ({cluster_size}) must be a power of two"
                )));
            }
            Ok(core_count.max(cluster_size).next_power_of_two())
        }
    }
}

/// Returns the (width, height) of the e-mesh for a core count.
pub fn emesh_dimensions(core_count: u32) -> (u32, u32) {
    let width = (f64::from(core_count)).sqrt().floor() as u32;
    let width = width.max(1);
    let height = core_count.div_ceil(width);
    (width, height)
}

/// Chooses the cores that carry memory controllers (directory slice + DRAM
/// controller) for the given topology.
pub fn compute_memory_controller_positions(
    kind: NetworkModelKind,
    num_memory_controllers: u32,
    total_cores: u32,
    config: &Config,
) -> Result<Vec<CoreId>, SimError> {
    match kind {
        NetworkModelKind::Magic | NetworkModelKind::EmeshHopCounter => {
            let spacing = (total_cores / num_memory_controllers).max(1);
            Ok((0..num_memory_controllers)
                .map(|i| ((i * spacing) % total_cores) as CoreId)
                .collect())
        }
        NetworkModelKind::FiniteBufferEmesh => {
            emesh_controller_positions(num_memory_controllers, total_cores)
        }
        NetworkModelKind::FiniteBufferClos => {
            clos_controller_positions(num_memory_controllers, config)
        }
        NetworkModelKind::FiniteBufferAtac | NetworkModelKind::FiniteBufferFlipAtac => {
            let geometry =
                finite_buffer::atac::AtacGeometry::new(total_cores, &config.network.atac)?;
            Ok((0..num_memory_controllers)
                .map(|i| geometry.hub_core(i % geometry.num_clusters()))
                .collect())
        }
    }
}

/// Spreads controllers along the mesh perimeter, clockwise from (0,0).
fn emesh_controller_positions(
    num_memory_controllers: u32,
    total_cores: u32,
) -> Result<Vec<CoreId>, SimError> {
    let (width, height) = emesh_dimensions(total_cores);
    let mut perimeter: Vec<CoreId> = Vec::new();
    for x in 0..width {
        perimeter.push(x as CoreId);
    }
    for y in 1..height.saturating_sub(1) {
        perimeter.push((y * width + width - 1) as CoreId);
    }
    if height > 1 {
        for x in (0..width).rev() {
            perimeter.push(((height - 1) * width + x) as CoreId);
        }
    }
    for y in (1..height.saturating_sub(1)).rev() {
        perimeter.push((y * width) as CoreId);
    }

    if (perimeter.len() as u32) < num_memory_controllers {
        return Err(SimError::config(format!(
            "{num_memory_controllers} memory controllers but only {} perimeter cores",
            perimeter.len()
        )));
    }
    let spacing = perimeter.len() / num_memory_controllers as usize;
    Ok((0..num_memory_controllers as usize)
        .map(|i| perimeter[(i * spacing + (width as usize) / 2) % perimeter.len()])
        .collect())
}

/// Memory controllers live preferentially on middle routers, falling back
/// to ingress routers; more controllers than that is a configuration error.
fn clos_controller_positions(
    num_memory_controllers: u32,
    config: &Config,
) -> Result<Vec<CoreId>, SimError> {
    let clos = &config.network.clos;
    let available = clos.num_mid_routers + clos.num_in_routers;
    if num_memory_controllers > available {
        return Err(SimError::config(format!(
            "{num_memory_controllers} memory controllers exceed the {available} clos middle+ingress routers"
        )));
    }
    let mut positions = Vec::new();
    for i in 0..num_memory_controllers {
        if i < clos.num_mid_routers {
            positions.push(finite_buffer::clos::middle_core_id(clos, i));
        } else {
            positions.push(finite_buffer::clos::ingress_core_id(
                clos,
                i - clos.num_mid_routers,
            ));
        }
    }
    Ok(positions)
}

/// Serialization latency of a payload: flits needed to carry its bits.
pub fn serialization_latency(length_bytes: u32, flit_width_bits: u32) -> Time {
    Time::from((length_bytes * 8).div_ceil(flit_width_bits).max(1))
}
