//! Memory hierarchy: private L1/L2 caches, directory coherence, and DRAM.
//!
//! Each core owns a [`MemoryManager`] holding:
//! 1. **L1-I / L1-D controllers** with miss-status registers and the
//!    LOCK/UNLOCK discipline.
//! 2. **A write-through, inclusive private L2 controller.**
//! 3. **Optionally a directory slice and DRAM controller**, on the cores
//!    chosen as memory-controller positions by the topology.
//!
//! Controllers never hold references to each other or to the network.
//! Every cross-component effect is a [`ShmemMsg`] or an event pushed into a
//! [`MsgOutbox`], which the owning core flushes through its network after
//! the handler returns.

/// Address-to-home mapping for directory slices.
pub mod address_home;
/// Set-associative cache with coherence states and block data.
pub mod cache;
/// Cache access-latency model.
pub mod cache_perf;
/// Directory cache and entry representations.
pub mod directory;
/// DRAM controller and latency model.
pub mod dram;
/// The directory-side coherence engine.
pub mod dram_directory_cntlr;
/// The L1 cache controllers.
pub mod l1_cache_cntlr;
/// The L2 cache controller.
pub mod l2_cache_cntlr;
/// In-flight access bookkeeping.
pub mod miss_status;
/// Coherence message definitions and wire format.
pub mod shmem_msg;
/// Per-core shared-memory clock and latency accumulator.
pub mod shmem_perf;

use tracing::trace;

use crate::common::{BROADCAST_CORE_ID, CoreId, SimError, Time};
use crate::config::{Config, CoreModel};
use crate::event::EventPayload;
use address_home::AddressHomeLookup;
use cache_perf::{CacheAccess, CachePerfModel};
use dram::DramCntlr;
use dram_directory_cntlr::DramDirectoryCntlr;
use l1_cache_cntlr::L1CacheCntlr;
use l2_cache_cntlr::L2CacheCntlr;
use shmem_msg::{ShmemMsg, ShmemMsgType};
use shmem_perf::{Role, ShmemPerfModel};

/// Memory components a coherence message can travel between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemComponent {
    /// Private L1 instruction cache.
    L1ICache,
    /// Private L1 data cache.
    L1DCache,
    /// Private L2 cache.
    L2Cache,
    /// Directory slice at the block's home core.
    DramDir,
    /// DRAM controller at the block's home core.
    Dram,
}

impl MemComponent {
    /// Returns the wire encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::L1ICache => 1,
            Self::L1DCache => 2,
            Self::L2Cache => 3,
            Self::DramDir => 4,
            Self::Dram => 5,
        }
    }

    /// Decodes from the wire encoding.
    pub fn from_u8(value: u8) -> Result<Self, SimError> {
        Ok(match value {
            1 => Self::L1ICache,
            2 => Self::L1DCache,
            3 => Self::L2Cache,
            4 => Self::DramDir,
            5 => Self::Dram,
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized mem component {other}"
                )));
            }
        })
    }
}

/// Memory operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    /// Read.
    Read,
    /// Read with intent to write (takes exclusive ownership).
    ReadEx,
    /// Write.
    Write,
}

/// Lock discipline carried alongside an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockSignal {
    /// No locking.
    None,
    /// Acquire the L1 lock after this access and hold it.
    Lock,
    /// Release the L1 lock after this access.
    Unlock,
}

/// An outgoing coherence message, waiting to be flushed to the network.
#[derive(Debug)]
pub struct OutgoingMsg {
    /// Send time in the sender core's cycles.
    pub time: Time,
    /// Destination core; [`BROADCAST_CORE_ID`] for a broadcast.
    pub receiver: CoreId,
    /// The message.
    pub msg: ShmemMsg,
}

/// An event produced by a controller, waiting to be scheduled.
#[derive(Debug)]
pub struct PendingEvent {
    /// Fire time.
    pub time: Time,
    /// Destination core.
    pub core_id: CoreId,
    /// Typed arguments.
    pub payload: EventPayload,
}

/// Messages and events produced while handling one event.
///
/// The owning core drains this after the handler returns: messages go
/// through the network, events into the queue.
#[derive(Debug, Default)]
pub struct MsgOutbox {
    /// Coherence messages to send.
    pub msgs: Vec<OutgoingMsg>,
    /// Events to schedule.
    pub events: Vec<PendingEvent>,
}

impl MsgOutbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-call context handed to the controllers.
///
/// Carries the mutable clock and outbox plus read-only parameters, so the
/// controllers stay free of back-references.
pub struct MemCtx<'a> {
    /// The core's shared-memory clock.
    pub shmem: &'a mut ShmemPerfModel,
    /// Destination for messages and events.
    pub outbox: &'a mut MsgOutbox,
    /// L1-I latency model.
    pub l1_icache_perf: &'a CachePerfModel,
    /// L1-D latency model.
    pub l1_dcache_perf: &'a CachePerfModel,
    /// L2 latency model.
    pub l2_cache_perf: &'a CachePerfModel,
    /// Directory home mapping.
    pub home_lookup: &'a AddressHomeLookup,
    /// Cache block size in bytes.
    pub block_size: u32,
    /// Core this memory manager belongs to.
    pub core_id: CoreId,
    /// Core clock frequency in GHz.
    pub core_frequency: f64,
}

impl MemCtx<'_> {
    /// Returns the current simulation-role clock.
    #[inline]
    pub fn now(&self) -> Time {
        self.shmem.cycle_count(Role::Sim)
    }

    /// Advances the simulation-role clock.
    #[inline]
    pub fn incr_sim_cycles(&mut self, cycles: Time) {
        self.shmem.incr_cycle_count(Role::Sim, cycles);
    }

    /// Charges the access latency of one cache level.
    pub fn charge_cache_access(&mut self, component: MemComponent, access: CacheAccess) {
        let latency = match component {
            MemComponent::L1ICache => self.l1_icache_perf.latency(access),
            MemComponent::L1DCache => self.l1_dcache_perf.latency(access),
            MemComponent::L2Cache => self.l2_cache_perf.latency(access),
            MemComponent::DramDir | MemComponent::Dram => 0,
        };
        self.shmem.incr_cycle_count(Role::Sim, latency);
    }

    /// Returns the home core of `address`.
    pub fn home(&self, address: u64) -> CoreId {
        self.home_lookup.home(address)
    }

    /// Sends a payload-free coherence message; costs one cycle.
    pub fn send_msg(
        &mut self,
        msg_type: ShmemMsgType,
        sender_mc: MemComponent,
        receiver_mc: MemComponent,
        requester: CoreId,
        receiver: CoreId,
        address: u64,
    ) {
        let msg = ShmemMsg::new(msg_type, sender_mc, receiver_mc, requester, address);
        self.push_msg(receiver, msg);
    }

    /// Sends a coherence message carrying a block payload; costs one cycle.
    pub fn send_msg_with_data(
        &mut self,
        msg_type: ShmemMsgType,
        sender_mc: MemComponent,
        receiver_mc: MemComponent,
        requester: CoreId,
        receiver: CoreId,
        address: u64,
        data: Vec<u8>,
    ) {
        let msg = ShmemMsg::with_data(msg_type, sender_mc, receiver_mc, requester, address, data);
        self.push_msg(receiver, msg);
    }

    /// Broadcasts a payload-free coherence message to every core.
    pub fn broadcast_msg(
        &mut self,
        msg_type: ShmemMsgType,
        sender_mc: MemComponent,
        receiver_mc: MemComponent,
        requester: CoreId,
        address: u64,
    ) {
        let msg = ShmemMsg::new(msg_type, sender_mc, receiver_mc, requester, address);
        self.push_msg(BROADCAST_CORE_ID, msg);
    }

    fn push_msg(&mut self, receiver: CoreId, msg: ShmemMsg) {
        let time = self.now();
        trace!(
            core = self.core_id,
            ?receiver,
            msg_type = ?msg.msg_type,
            address = msg.address,
            "send shmem msg"
        );
        self.outbox.msgs.push(OutgoingMsg {
            time,
            receiver,
            msg,
        });
        // One cycle of send occupancy per message.
        self.incr_sim_cycles(1);
    }

    /// Schedules an event on this core.
    pub fn push_event(&mut self, time: Time, payload: EventPayload) {
        self.outbox.events.push(PendingEvent {
            time,
            core_id: self.core_id,
            payload,
        });
    }
}

/// Builds a [`MemCtx`] over the fields of a [`MemoryManager`].
macro_rules! mem_ctx {
    ($self:expr, $outbox:expr) => {
        MemCtx {
            shmem: &mut $self.shmem_perf_model,
            outbox: $outbox,
            l1_icache_perf: &$self.l1_icache_perf,
            l1_dcache_perf: &$self.l1_dcache_perf,
            l2_cache_perf: &$self.l2_cache_perf,
            home_lookup: &$self.home_lookup,
            block_size: $self.cache_block_size,
            core_id: $self.core_id,
            core_frequency: $self.frequency,
        }
    };
}

/// Per-core memory subsystem: caches, coherence engines, and clocks.
#[derive(Debug)]
pub struct MemoryManager {
    core_id: CoreId,
    frequency: f64,
    cache_block_size: u32,
    l1_cache_cntlr: L1CacheCntlr,
    l2_cache_cntlr: L2CacheCntlr,
    dram_directory_cntlr: Option<DramDirectoryCntlr>,
    dram_cntlr: Option<DramCntlr>,
    home_lookup: AddressHomeLookup,
    l1_icache_perf: CachePerfModel,
    l1_dcache_perf: CachePerfModel,
    l2_cache_perf: CachePerfModel,
    shmem_perf_model: ShmemPerfModel,
}

impl MemoryManager {
    /// Creates the memory subsystem for one core.
    ///
    /// # Arguments
    ///
    /// * `core_id` - Owning core.
    /// * `model` - The core's model-list entry (frequency, cache types).
    /// * `config` - Full configuration.
    /// * `mem_controller_cores` - Cores carrying directory slices + DRAM
    ///   controllers; this core instantiates them iff it is in the list.
    /// * `total_cores` - Total core count (directory bitset width).
    pub fn new(
        core_id: CoreId,
        model: &CoreModel,
        config: &Config,
        mem_controller_cores: &[CoreId],
        total_cores: u32,
    ) -> Result<Self, SimError> {
        let missing = |section: &str, key: &str| {
            SimError::config(format!("unknown {section} type '{key}'"))
        };
        let l1i_cfg = config
            .perf_model
            .l1_icache
            .get(&model.l1_icache_type)
            .ok_or_else(|| missing("l1_icache", &model.l1_icache_type))?;
        let l1d_cfg = config
            .perf_model
            .l1_dcache
            .get(&model.l1_dcache_type)
            .ok_or_else(|| missing("l1_dcache", &model.l1_dcache_type))?;
        let l2_cfg = config
            .perf_model
            .l2_cache
            .get(&model.l2_cache_type)
            .ok_or_else(|| missing("l2_cache", &model.l2_cache_type))?;

        let cache_block_size = l1i_cfg.cache_block_size;
        let home_lookup = AddressHomeLookup::new(
            config.perf_model.dram_directory.home_lookup_param,
            mem_controller_cores.to_vec(),
            cache_block_size,
        )?;

        let has_controller = mem_controller_cores.contains(&core_id);
        let dram_directory_cntlr = has_controller.then(|| {
            DramDirectoryCntlr::new(
                &config.perf_model.dram_directory,
                cache_block_size,
                total_cores,
                mem_controller_cores.len() as u32,
            )
        });
        let dram_cntlr = has_controller.then(|| DramCntlr::new(&config.perf_model.dram));

        Ok(Self {
            core_id,
            frequency: model.frequency,
            cache_block_size,
            l1_cache_cntlr: L1CacheCntlr::new(l1i_cfg, l1d_cfg, cache_block_size),
            l2_cache_cntlr: L2CacheCntlr::new(l2_cfg, cache_block_size),
            dram_directory_cntlr,
            dram_cntlr,
            home_lookup,
            l1_icache_perf: CachePerfModel::new(l1i_cfg),
            l1_dcache_perf: CachePerfModel::new(l1d_cfg),
            l2_cache_perf: CachePerfModel::new(l2_cfg),
            shmem_perf_model: ShmemPerfModel::new(),
        })
    }

    /// Returns the cache block size in bytes.
    pub fn cache_block_size(&self) -> u32 {
        self.cache_block_size
    }

    /// Returns the shared-memory clock model.
    pub fn shmem_perf_model(&self) -> &ShmemPerfModel {
        &self.shmem_perf_model
    }

    /// Returns the shared-memory clock model mutably.
    pub fn shmem_perf_model_mut(&mut self) -> &mut ShmemPerfModel {
        &mut self.shmem_perf_model
    }

    /// Starts one block-aligned chunk of an access in an L1 cache.
    pub fn initiate_cache_access(
        &mut self,
        time: Time,
        mem_component: MemComponent,
        access_id: u32,
        lock_signal: LockSignal,
        mem_op: MemOp,
        address: u64,
        offset: u32,
        data_length: u32,
        write_data: Option<Vec<u8>>,
        modeled: bool,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        debug_assert!(matches!(
            mem_component,
            MemComponent::L1ICache | MemComponent::L1DCache
        ));
        let mut ctx = mem_ctx!(self, outbox);
        self.l1_cache_cntlr.initiate_cache_access(
            mem_component,
            access_id,
            lock_signal,
            mem_op,
            address,
            offset,
            data_length,
            write_data,
            modeled,
            &mut self.l2_cache_cntlr,
            &mut ctx,
        )
    }

    /// Replays the queued L1 request at the head of `address`'s queue.
    pub fn re_initiate_cache_access(
        &mut self,
        time: Time,
        mem_component: MemComponent,
        address: u64,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        let mut ctx = mem_ctx!(self, outbox);
        self.l1_cache_cntlr.re_initiate_cache_access(
            mem_component,
            address,
            &mut self.l2_cache_cntlr,
            &mut ctx,
        )
    }

    /// Routes a coherence message delivered by a memory network.
    pub fn handle_msg_from_network(
        &mut self,
        time: Time,
        sender: CoreId,
        msg: ShmemMsg,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        trace!(
            core = self.core_id,
            sender,
            msg_type = ?msg.msg_type,
            address = msg.address,
            "recv shmem msg"
        );
        let mut ctx = mem_ctx!(self, outbox);
        match msg.receiver_mem_component {
            MemComponent::L2Cache => {
                let l1_locked = self.l1_cache_cntlr.is_locked();
                self.l2_cache_cntlr
                    .handle_msg_from_dram_directory(sender, msg, l1_locked, &mut ctx)
            }
            MemComponent::DramDir => {
                let cntlr = self
                    .dram_directory_cntlr
                    .as_mut()
                    .ok_or_else(|| SimError::protocol("dram directory not present"))?;
                cntlr.handle_msg(sender, msg, &mut ctx)
            }
            MemComponent::Dram => {
                let cntlr = self
                    .dram_cntlr
                    .as_mut()
                    .ok_or_else(|| SimError::protocol("dram cntlr not present"))?;
                cntlr.handle_msg_from_dram_directory(sender, &msg, &mut ctx)
            }
            other => Err(SimError::protocol(format!(
                "unrecognized receiver component {other:?}"
            ))),
        }
    }

    /// The L2 access event fired after its contention delay.
    pub fn l2_cache_access(
        &mut self,
        time: Time,
        sender: CoreId,
        msg: ShmemMsg,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        let mut ctx = mem_ctx!(self, outbox);
        let data_ready = match msg.sender_mem_component {
            MemComponent::L1ICache | MemComponent::L1DCache => {
                self.l2_cache_cntlr.access_from_l1(&msg, &mut ctx)?;
                None
            }
            MemComponent::DramDir => self.l2_cache_cntlr.access_from_dram_directory(
                sender,
                &msg,
                &mut self.l1_cache_cntlr,
                &mut ctx,
            )?,
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized L2 access sender {other:?}"
                )));
            }
        };
        if let Some((mem_component, address)) = data_ready {
            self.l1_cache_cntlr.signal_data_ready(
                mem_component,
                address,
                &mut self.l2_cache_cntlr,
                &mut ctx,
            )?;
        }
        Ok(())
    }

    /// The directory access event fired after its contention delay.
    pub fn directory_access(
        &mut self,
        time: Time,
        sender: CoreId,
        msg: ShmemMsg,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        let mut ctx = mem_ctx!(self, outbox);
        let cntlr = self
            .dram_directory_cntlr
            .as_mut()
            .ok_or_else(|| SimError::protocol("dram directory not present"))?;
        cntlr.access(sender, &msg, &mut ctx)
    }

    /// The directory finished a request; charge contention for the next.
    pub fn directory_schedule_next(
        &mut self,
        time: Time,
        address: u64,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        let mut ctx = mem_ctx!(self, outbox);
        let cntlr = self
            .dram_directory_cntlr
            .as_mut()
            .ok_or_else(|| SimError::protocol("dram directory not present"))?;
        cntlr.schedule_next(address, &mut ctx)
    }

    /// The next queued directory request takes effect.
    pub fn directory_handle_next(
        &mut self,
        time: Time,
        address: u64,
        outbox: &mut MsgOutbox,
    ) -> Result<(), SimError> {
        self.shmem_perf_model.set_cycle_count(Role::Sim, time);
        let mut ctx = mem_ctx!(self, outbox);
        let cntlr = self
            .dram_directory_cntlr
            .as_mut()
            .ok_or_else(|| SimError::protocol("dram directory not present"))?;
        cntlr.handle_next(address, &mut ctx)
    }

    /// Enables every model in the subsystem.
    pub fn enable_models(&mut self) {
        self.shmem_perf_model.enable();
        self.l1_cache_cntlr.enable();
        self.l2_cache_cntlr.enable();
        self.l1_icache_perf.enable();
        self.l1_dcache_perf.enable();
        self.l2_cache_perf.enable();
        if let Some(dram) = &mut self.dram_cntlr {
            dram.perf_model_mut().enable();
        }
    }

    /// Disables every model in the subsystem.
    pub fn disable_models(&mut self) {
        self.shmem_perf_model.disable();
        self.l1_cache_cntlr.disable();
        self.l2_cache_cntlr.disable();
        self.l1_icache_perf.disable();
        self.l1_dcache_perf.disable();
        self.l2_cache_perf.disable();
        if let Some(dram) = &mut self.dram_cntlr {
            dram.perf_model_mut().disable();
        }
    }

    /// Resets every counter in the subsystem. Models must be disabled.
    pub fn reset_models(&mut self) {
        self.shmem_perf_model.reset();
        self.l1_cache_cntlr.reset_counters();
        self.l2_cache_cntlr.reset_counters();
        if let Some(dram) = &mut self.dram_cntlr {
            dram.perf_model_mut().reset();
        }
    }

    /// Returns the L1 controller (test hook).
    pub fn l1_cache_cntlr(&self) -> &L1CacheCntlr {
        &self.l1_cache_cntlr
    }

    /// Returns the L2 controller (test hook).
    pub fn l2_cache_cntlr(&self) -> &L2CacheCntlr {
        &self.l2_cache_cntlr
    }

    /// Returns the directory controller, when this core is a home.
    pub fn dram_directory_cntlr(&self) -> Option<&DramDirectoryCntlr> {
        self.dram_directory_cntlr.as_ref()
    }

    /// Writes the memory subsystem summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Cache Summary:")?;
        self.l1_cache_cntlr.output_summary(out)?;
        self.l2_cache_cntlr.output_summary(out)?;
        self.shmem_perf_model.output_summary(out)?;
        if let Some(dir) = &self.dram_directory_cntlr {
            dir.output_summary(out)?;
        }
        if let Some(dram) = &self.dram_cntlr {
            dram.output_summary(out)?;
        }
        Ok(())
    }
}
