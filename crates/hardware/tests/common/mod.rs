//! Shared test harness.
//!
//! Builders for the configurations the tests exercise, plus helpers that
//! push a memory access or a packet through the event queue until it
//! completes.

use nocsim_core::common::CoreId;
use nocsim_core::config::{Config, NetworkModelKind};
use nocsim_core::core::AccessData;
use nocsim_core::memory::miss_status::CompletedAccess;
use nocsim_core::memory::{LockSignal, MemOp};
use nocsim_core::network::packet::{NetMatch, NetPacket, PacketType};
use nocsim_core::Simulator;

/// A config with `total_cores` cores and magic networks everywhere.
pub fn magic_config(total_cores: u32) -> Config {
    let mut config = Config::default();
    config.general.total_cores = total_cores;
    config
}

/// A config whose first user network is a finite-buffer e-mesh; the memory
/// networks stay magic so coherence timing does not interfere.
pub fn fb_emesh_config(total_cores: u32) -> Config {
    let mut config = magic_config(total_cores);
    config.network.user_model_1 = NetworkModelKind::FiniteBufferEmesh;
    config
}

/// Same, with the finite-buffer Clos on the first user network.
pub fn fb_clos_config(ports: u32, in_routers: u32, mid_routers: u32) -> Config {
    let mut config = magic_config(ports * in_routers);
    config.network.user_model_1 = NetworkModelKind::FiniteBufferClos;
    config.network.clos.num_router_ports = ports;
    config.network.clos.num_in_routers = in_routers;
    config.network.clos.num_mid_routers = mid_routers;
    config
}

/// Same, with the finite-buffer ATAC on the first user network.
pub fn fb_atac_config(total_cores: u32, cluster_size: u32) -> Config {
    let mut config = magic_config(total_cores);
    config.network.user_model_1 = NetworkModelKind::FiniteBufferAtac;
    config.network.atac.cluster_size = cluster_size;
    config
}

/// Returns the core homing `address`'s directory slice.
pub fn home_core(sim: &Simulator, address: u64) -> CoreId {
    let controllers = sim.mem_controller_cores();
    let param = sim.config().perf_model.dram_directory.home_lookup_param;
    controllers[((address >> param) % controllers.len() as u64) as usize]
}

/// Writes `bytes` at `address` from `core` and runs until completion.
pub fn write_mem(sim: &mut Simulator, core: CoreId, address: u64, bytes: &[u8]) -> CompletedAccess {
    let id = sim
        .access_memory(
            core,
            LockSignal::None,
            MemOp::Write,
            address,
            AccessData::Write(bytes.to_vec()),
            true,
        )
        .unwrap();
    sim.run_until_idle().unwrap();
    sim.take_completed_access(core, id)
        .expect("write should have completed")
}

/// Reads `len` bytes at `address` from `core` and runs until completion.
pub fn read_mem(sim: &mut Simulator, core: CoreId, address: u64, len: u32) -> CompletedAccess {
    let id = sim
        .access_memory(
            core,
            LockSignal::None,
            MemOp::Read,
            address,
            AccessData::Read(len),
            true,
        )
        .unwrap();
    sim.run_until_idle().unwrap();
    sim.take_completed_access(core, id)
        .expect("read should have completed")
}

/// Sends a user packet and runs until the network is quiet.
pub fn send_user_packet(
    sim: &mut Simulator,
    sender: CoreId,
    receiver: CoreId,
    payload: Vec<u8>,
) {
    sim.net_send(sender, PacketType::User1, receiver, payload)
        .unwrap();
    sim.run_until_idle().unwrap();
}

/// Receives one queued user packet at `core`, if any.
pub fn recv_user_packet(sim: &mut Simulator, core: CoreId) -> Option<NetPacket> {
    sim.net_recv(core, &NetMatch::from_type(PacketType::User1), None)
        .unwrap()
}
