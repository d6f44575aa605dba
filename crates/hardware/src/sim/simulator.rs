//! The simulator: construction and the event loop.
//!
//! Construction order is data-dependency order: validate the
//! configuration, round the core count to the coherence network's
//! topology, place the memory controllers, then build the cores. After
//! that the simulator is a loop over the event queue; each popped event is
//! dispatched to its core, which may enqueue more events.
//!
//! When shared memory is disabled, `access_memory` degrades to a direct
//! copy against a flat backing store under the global core lock, with no
//! events involved.

use std::collections::HashMap;
use std::io::Write;

use tracing::info;

use crate::clock_skew::BarrierServer;
use crate::clock_skew::barrier::BarrierOutcome;
use crate::common::{CoreId, SimError, Time};
use crate::config::{ClockSkewScheme, Config};
use crate::core::{AccessData, Core, CoreState};
use crate::event::EventQueue;
use crate::memory::miss_status::CompletedAccess;
use crate::memory::shmem_perf::Role;
use crate::memory::{LockSignal, MemOp};
use crate::network::model::{
    compute_core_count_constraints, compute_memory_controller_positions,
};
use crate::network::packet::{NetMatch, NetPacket, PacketType};
use crate::stats::SimStats;

/// Block granularity of the native (shared-memory-disabled) backing store.
const NATIVE_BLOCK_SIZE: u64 = 64;

/// The whole simulated machine.
pub struct Simulator {
    config: Config,
    total_cores: u32,
    cores: Vec<Core>,
    event_queue: EventQueue,
    barrier_server: Option<BarrierServer>,
    mem_controller_cores: Vec<CoreId>,
    native_memory: HashMap<u64, Vec<u8>>,
    stats: SimStats,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("total_cores", &self.total_cores)
            .field("pending_events", &self.event_queue.len())
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Builds the simulated machine from a configuration.
    pub fn new(config: Config) -> Result<Self, SimError> {
        config.validate()?;

        // Every network's topology constrains the core count; round up to
        // a fixpoint acceptable to all five. The coherence network alone
        // determines the memory-controller placement.
        let topology_kind = config.network.memory_model_1;
        let kinds = [
            config.network.user_model_1,
            config.network.user_model_2,
            config.network.memory_model_1,
            config.network.memory_model_2,
            config.network.system_model,
        ];
        let mut total_cores = config.general.total_cores;
        loop {
            let before = total_cores;
            for kind in kinds {
                total_cores = compute_core_count_constraints(kind, total_cores, &config)?;
            }
            if total_cores == before {
                break;
            }
        }
        if total_cores != config.general.total_cores {
            info!(
                requested = config.general.total_cores,
                rounded = total_cores,
                "total_cores rounded up for the topology"
            );
        }
        let core_models = config.core_models(total_cores)?;

        let mem_controller_cores = if config.general.enable_shared_mem {
            let num_controllers = config.num_memory_controllers(total_cores);
            compute_memory_controller_positions(
                topology_kind,
                num_controllers,
                total_cores,
                &config,
            )?
        } else {
            Vec::new()
        };

        let mut cores = Vec::with_capacity(total_cores as usize);
        for core_id in 0..total_cores as CoreId {
            let mut core = Core::new(
                core_id,
                &core_models[core_id as usize],
                &config,
                &mem_controller_cores,
                total_cores,
            )?;
            core.set_state(CoreState::Running);
            if config.general.enable_performance_modeling {
                core.enable_performance_models();
            }
            cores.push(core);
        }

        let barrier_server = (config.clock_skew_minimization.scheme == ClockSkewScheme::Barrier)
            .then(|| {
                BarrierServer::new(config.clock_skew_minimization.barrier.quantum, total_cores)
            });

        Ok(Self {
            config,
            total_cores,
            cores,
            event_queue: EventQueue::new(),
            barrier_server,
            mem_controller_cores,
            native_memory: HashMap::new(),
            stats: SimStats::new(),
        })
    }

    /// Returns the number of simulated cores (after rounding).
    pub fn total_cores(&self) -> u32 {
        self.total_cores
    }

    /// Returns the cores carrying memory controllers.
    pub fn mem_controller_cores(&self) -> &[CoreId] {
        &self.mem_controller_cores
    }

    /// Returns one core.
    pub fn core(&self, core_id: CoreId) -> &Core {
        &self.cores[core_id as usize]
    }

    /// Returns one core mutably.
    pub fn core_mut(&mut self, core_id: CoreId) -> &mut Core {
        &mut self.cores[core_id as usize]
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the event queue (test hook).
    pub fn event_queue(&self) -> &EventQueue {
        &self.event_queue
    }

    /// Starts a memory access on a core at its current application clock.
    pub fn access_memory(
        &mut self,
        core_id: CoreId,
        lock_signal: LockSignal,
        mem_op: MemOp,
        address: u64,
        data: AccessData,
        modeled: bool,
    ) -> Result<u32, SimError> {
        if !self.config.general.enable_shared_mem {
            return self.native_mem_op(core_id, mem_op, address, data);
        }
        let core = &mut self.cores[core_id as usize];
        let time = core
            .memory_manager()
            .map(|m| m.shmem_perf_model().cycle_count(Role::App))
            .unwrap_or(0);
        core.access_memory(
            time,
            lock_signal,
            mem_op,
            address,
            data,
            modeled,
            &mut self.event_queue,
        )
    }

    /// Direct copy against the flat store; completes immediately.
    fn native_mem_op(
        &mut self,
        core_id: CoreId,
        mem_op: MemOp,
        address: u64,
        data: AccessData,
    ) -> Result<u32, SimError> {
        let result = match (mem_op, data) {
            (MemOp::Write, AccessData::Write(bytes)) => {
                for (i, byte) in bytes.into_iter().enumerate() {
                    let a = address + i as u64;
                    let block = self
                        .native_memory
                        .entry(a / NATIVE_BLOCK_SIZE * NATIVE_BLOCK_SIZE)
                        .or_insert_with(|| vec![0; NATIVE_BLOCK_SIZE as usize]);
                    block[(a % NATIVE_BLOCK_SIZE) as usize] = byte;
                }
                Vec::new()
            }
            (_, AccessData::Read(size)) => {
                let mut out = Vec::with_capacity(size as usize);
                for i in 0..u64::from(size) {
                    let a = address + i;
                    let byte = self
                        .native_memory
                        .get(&(a / NATIVE_BLOCK_SIZE * NATIVE_BLOCK_SIZE))
                        .map_or(0, |block| block[(a % NATIVE_BLOCK_SIZE) as usize]);
                    out.push(byte);
                }
                out
            }
            _ => {
                return Err(SimError::protocol(
                    "mismatched memory operation and data direction",
                ));
            }
        };
        let access_id = u32::MAX - core_id as u32;
        self.cores[core_id as usize].insert_completed_access(
            access_id,
            CompletedAccess {
                data: result,
                completion_time: 0,
                latency: 0,
            },
        );
        Ok(access_id)
    }

    /// Collects a completed access from a core.
    pub fn take_completed_access(
        &mut self,
        core_id: CoreId,
        access_id: u32,
    ) -> Option<CompletedAccess> {
        self.cores[core_id as usize].take_completed_access(access_id)
    }

    /// Sends a user/system packet from a core at its current clock.
    pub fn net_send(
        &mut self,
        core_id: CoreId,
        packet_type: PacketType,
        receiver: CoreId,
        data: Vec<u8>,
    ) -> Result<u32, SimError> {
        let core = &mut self.cores[core_id as usize];
        let time = core
            .memory_manager()
            .map(|m| m.shmem_perf_model().cycle_count(Role::App))
            .unwrap_or(0);
        core.net_send(time, packet_type, receiver, data, &mut self.event_queue)
    }

    /// Polls a core's receive queue.
    pub fn net_recv(
        &mut self,
        core_id: CoreId,
        net_match: &NetMatch,
        expected_length: Option<u32>,
    ) -> Result<Option<NetPacket>, SimError> {
        self.cores[core_id as usize].net_recv(net_match, expected_length)
    }

    /// Sends a fully formed packet from a core (test hook).
    pub fn net_send_packet(&mut self, packet: NetPacket) -> Result<u32, SimError> {
        let core = &mut self.cores[packet.sender as usize];
        let frequency = core.frequency();
        core.network_mut()
            .net_send(packet, frequency, &mut self.event_queue)
    }

    /// Runs until no events remain.
    pub fn run_until_idle(&mut self) -> Result<(), SimError> {
        while let Some(event) = self.event_queue.pop() {
            self.stats.events_processed += 1;
            let core = &mut self.cores[event.core_id as usize];
            core.handle_event(event.time, event.payload, &mut self.event_queue)?;
        }
        Ok(())
    }

    /// Runs until no events remain or `max_events` were processed.
    ///
    /// # Returns
    ///
    /// The number of events processed.
    pub fn run_for(&mut self, max_events: u64) -> Result<u64, SimError> {
        let mut processed = 0;
        while processed < max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.stats.events_processed += 1;
            processed += 1;
            let core = &mut self.cores[event.core_id as usize];
            core.handle_event(event.time, event.payload, &mut self.event_queue)?;
        }
        Ok(processed)
    }

    /// Clock-skew synchronization hook for a core (random-pairs scheme):
    /// may emit a REQ over the system network.
    pub fn synchronize_core(&mut self, core_id: CoreId, time: Time) -> Result<(), SimError> {
        self.cores[core_id as usize].synchronize(time, &mut self.event_queue)
    }

    /// Clock-skew barrier report from a core.
    ///
    /// # Returns
    ///
    /// The cores released by this report (empty while waiting), or a
    /// [`SimError::State`] if the core is not running or initializing.
    pub fn barrier_synchronize(
        &mut self,
        core_id: CoreId,
        time: Time,
    ) -> Result<Vec<CoreId>, SimError> {
        let Some(server) = &mut self.barrier_server else {
            return Ok(vec![core_id]);
        };
        let states: Vec<CoreState> = self.cores.iter().map(Core::state).collect();
        match server.barrier_wait(core_id, time, &states)? {
            BarrierOutcome::Release(released) => Ok(released),
            BarrierOutcome::Wait => Ok(Vec::new()),
        }
    }

    /// Enables performance models on every core.
    pub fn enable_performance_models(&mut self) {
        for core in &mut self.cores {
            core.enable_performance_models();
        }
    }

    /// Disables performance models on every core.
    pub fn disable_performance_models(&mut self) {
        for core in &mut self.cores {
            core.disable_performance_models();
        }
    }

    /// Writes the full per-core summary.
    pub fn output_summary(&self, out: &mut dyn Write) -> std::io::Result<()> {
        self.stats.output_summary(out)?;
        for core in &self.cores {
            core.output_summary(out)?;
        }
        Ok(())
    }

    /// Writes the summary to the configured output file.
    pub fn write_summary_file(&self) -> std::io::Result<()> {
        let path = std::path::Path::new(&self.config.general.output_dir)
            .join(&self.config.general.output_file);
        let mut file = std::fs::File::create(path)?;
        self.output_summary(&mut file)
    }
}
