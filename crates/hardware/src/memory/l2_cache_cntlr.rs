//! L2 cache controller.
//!
//! The private L2 is write-through from the L1s and inclusive over them;
//! each resident line remembers which L1 (if any) holds a copy. The
//! controller has two faces:
//! 1. **Toward the L1s:** A synchronous query that either satisfies the
//!    request locally or forwards it to the block's home directory.
//! 2. **Toward the directory:** Reply installation (EX_REP/SH_REP) and the
//!    remote-request handlers (INV_REQ/FLUSH_REQ/WB_REQ).
//!
//! While the L1 lock is held, incoming directory requests are queued in
//! FIFO order and drained one per cycle through the contention model once
//! the lock drops. Only one outstanding directory request per address is
//! allowed.

use std::collections::VecDeque;

use crate::common::{CoreId, SimError};
use crate::config::CacheTypeConfig;
use crate::event::EventPayload;
use crate::memory::cache::{Cache, CacheState};
use crate::memory::cache_perf::CacheAccess;
use crate::memory::l1_cache_cntlr::L1CacheCntlr;
use crate::memory::miss_status::{L2MissStatus, MissStatusMap};
use crate::memory::shmem_msg::{ShmemMsg, ShmemMsgType};
use crate::memory::{MemComponent, MemCtx};

/// The private L2 cache controller.
#[derive(Debug)]
pub struct L2CacheCntlr {
    l2_cache: Cache,
    miss_status_map: MissStatusMap<L2MissStatus>,
    contention_model: crate::queue_model::QueueModelSimple,
    pending_dram_directory_reqs: VecDeque<(CoreId, ShmemMsg)>,
}

impl L2CacheCntlr {
    /// Creates the L2 cache.
    pub fn new(l2_cfg: &CacheTypeConfig, block_size: u32) -> Self {
        Self {
            l2_cache: Cache::new("L2", l2_cfg, block_size),
            miss_status_map: MissStatusMap::new(),
            contention_model: crate::queue_model::QueueModelSimple::new(),
            pending_dram_directory_reqs: VecDeque::new(),
        }
    }

    /// Synchronous L1 query: serve locally if the block state suffices.
    ///
    /// # Returns
    ///
    /// `true` if the request ended in the L2 and the block was installed in
    /// the requesting L1.
    pub fn process_shmem_req_from_l1(
        &mut self,
        req_mem_component: MemComponent,
        msg_type: ShmemMsgType,
        address: u64,
        modeled: bool,
        l1: &mut L1CacheCntlr,
    ) -> Result<bool, SimError> {
        let cstate = self.l2_cache.state_of(address);
        let ends_here = match msg_type {
            ShmemMsgType::ExReq => cstate.writable(),
            ShmemMsgType::ShReq => cstate.readable(),
            other => {
                return Err(SimError::protocol(format!(
                    "unsupported L1 request type {other:?}"
                )));
            }
        };
        if modeled {
            self.l2_cache.update_counters(ends_here);
        }
        if ends_here {
            let mut data = vec![0u8; self.l2_cache.block_size()];
            if !self.l2_cache.read_bytes(address, 0, &mut data) {
                return Err(SimError::protocol("L2 read of a non-resident block"));
            }
            self.insert_cache_block_in_l1(req_mem_component, address, cstate, &data, l1)?;
        }
        Ok(ends_here)
    }

    /// A full L1 miss: charge the contention model and schedule the L2
    /// access that will forward the request to the directory.
    pub fn handle_msg_from_l1(
        &mut self,
        req_mem_component: MemComponent,
        msg_type: ShmemMsgType,
        address: u64,
        ctx: &mut MemCtx<'_>,
    ) {
        let msg = ShmemMsg::new(
            msg_type,
            req_mem_component,
            MemComponent::L2Cache,
            ctx.core_id,
            address,
        );
        self.schedule_request(ctx.core_id, msg, ctx);
    }

    /// A message from a directory arrived over the network.
    ///
    /// Deferred behind the pending list while the L1 lock is held or while
    /// earlier deferred requests exist; otherwise scheduled through the
    /// contention model.
    pub fn handle_msg_from_dram_directory(
        &mut self,
        sender: CoreId,
        msg: ShmemMsg,
        l1_locked: bool,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        if l1_locked || !self.pending_dram_directory_reqs.is_empty() {
            self.pending_dram_directory_reqs.push_back((sender, msg));
            return Ok(());
        }
        self.schedule_request(sender, msg, ctx);
        Ok(())
    }

    /// Drains one deferred directory request through the contention model.
    pub fn schedule_next_pending_request(&mut self, ctx: &mut MemCtx<'_>) {
        if let Some((sender, msg)) = self.pending_dram_directory_reqs.pop_front() {
            self.schedule_request(sender, msg, ctx);
        }
    }

    /// One request per cycle through the L2 port.
    fn schedule_request(&mut self, sender: CoreId, msg: ShmemMsg, ctx: &mut MemCtx<'_>) {
        let now = ctx.now();
        let queue_delay = self.contention_model.compute_queue_delay(now, 1);
        ctx.push_event(now + queue_delay, EventPayload::L2CacheAccess { sender, msg });
    }

    /// The scheduled L2 access for an L1-originated request.
    pub fn access_from_l1(&mut self, msg: &ShmemMsg, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        ctx.charge_cache_access(MemComponent::L2Cache, CacheAccess::DataAndTags);

        let address = msg.address;
        if self.miss_status_map.len(address) > 0 {
            return Err(SimError::protocol(format!(
                "second outstanding L2 request for {address:#x}"
            )));
        }
        self.miss_status_map.insert(
            address,
            L2MissStatus {
                address,
                mem_component: msg.sender_mem_component,
            },
        );

        match msg.msg_type {
            ShmemMsgType::ExReq => {
                let cstate = self.l2_cache.state_of(address);
                match cstate {
                    CacheState::Invalid => {}
                    CacheState::Shared => {
                        // Give up the shared copy before requesting
                        // ownership; the home sees a clean sharer leave.
                        self.l2_cache.invalidate_block(address);
                        ctx.send_msg(
                            ShmemMsgType::InvRep,
                            MemComponent::L2Cache,
                            MemComponent::DramDir,
                            ctx.core_id,
                            ctx.home(address),
                            address,
                        );
                    }
                    other => {
                        return Err(SimError::protocol(format!(
                            "EX_REQ with L2 state {other:?} for {address:#x}"
                        )));
                    }
                }
                ctx.send_msg(
                    ShmemMsgType::ExReq,
                    MemComponent::L2Cache,
                    MemComponent::DramDir,
                    ctx.core_id,
                    ctx.home(address),
                    address,
                );
            }
            ShmemMsgType::ShReq => {
                ctx.send_msg(
                    ShmemMsgType::ShReq,
                    MemComponent::L2Cache,
                    MemComponent::DramDir,
                    ctx.core_id,
                    ctx.home(address),
                    address,
                );
            }
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized L1 request type {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// The scheduled L2 access for a directory-originated message.
    ///
    /// # Returns
    ///
    /// `Some((l1_component, address))` when a reply installed a block and
    /// the stalled L1 request must be replayed.
    pub fn access_from_dram_directory(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        l1: &mut L1CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<Option<(MemComponent, u64)>, SimError> {
        // The port is free again; let the next deferred request in.
        self.schedule_next_pending_request(ctx);

        ctx.charge_cache_access(MemComponent::L2Cache, CacheAccess::DataAndTags);

        let address = msg.address;
        match msg.msg_type {
            ShmemMsgType::ExRep => {
                let data = msg
                    .data
                    .as_ref()
                    .ok_or_else(|| SimError::protocol("EX_REP without data"))?;
                self.install_reply(address, CacheState::Modified, data, l1, ctx)
            }
            ShmemMsgType::ShRep => {
                let data = msg
                    .data
                    .as_ref()
                    .ok_or_else(|| SimError::protocol("SH_REP without data"))?;
                self.install_reply(address, CacheState::Shared, data, l1, ctx)
            }
            ShmemMsgType::InvReq => {
                let cstate = self.l2_cache.state_of(address);
                if cstate != CacheState::Invalid {
                    if cstate != CacheState::Shared {
                        return Err(SimError::protocol(format!(
                            "INV_REQ with L2 state {cstate:?} for {address:#x}"
                        )));
                    }
                    if let Some(line) = self.l2_cache.peek_line(address) {
                        if let Some(loc) = line.cached_loc() {
                            l1.invalidate_block(loc, address);
                        }
                    }
                    self.l2_cache.invalidate_block(address);
                    ctx.send_msg(
                        ShmemMsgType::InvRep,
                        MemComponent::L2Cache,
                        MemComponent::DramDir,
                        msg.requester,
                        sender,
                        address,
                    );
                }
                // An INVALID block means the invalidation crossed our own
                // eviction; silently ignore.
                Ok(None)
            }
            ShmemMsgType::FlushReq => {
                let cstate = self.l2_cache.state_of(address);
                if cstate != CacheState::Invalid {
                    if cstate != CacheState::Modified {
                        return Err(SimError::protocol(format!(
                            "FLUSH_REQ with L2 state {cstate:?} for {address:#x}"
                        )));
                    }
                    if let Some(line) = self.l2_cache.peek_line(address) {
                        if let Some(loc) = line.cached_loc() {
                            l1.invalidate_block(loc, address);
                        }
                    }
                    let mut data = vec![0u8; self.l2_cache.block_size()];
                    if !self.l2_cache.read_bytes(address, 0, &mut data) {
                        return Err(SimError::protocol("flush of a non-resident block"));
                    }
                    self.l2_cache.invalidate_block(address);
                    ctx.send_msg_with_data(
                        ShmemMsgType::FlushRep,
                        MemComponent::L2Cache,
                        MemComponent::DramDir,
                        msg.requester,
                        sender,
                        address,
                        data,
                    );
                }
                Ok(None)
            }
            ShmemMsgType::WbReq => {
                let cstate = self.l2_cache.state_of(address);
                if cstate != CacheState::Invalid {
                    if cstate != CacheState::Modified {
                        return Err(SimError::protocol(format!(
                            "WB_REQ with L2 state {cstate:?} for {address:#x}"
                        )));
                    }
                    // Downgrade the L1 copy, then this level.
                    if let Some(line) = self.l2_cache.peek_line(address) {
                        if let Some(loc) = line.cached_loc() {
                            l1.set_cache_state(loc, address, CacheState::Shared)?;
                        }
                    }
                    let mut data = vec![0u8; self.l2_cache.block_size()];
                    if !self.l2_cache.read_bytes(address, 0, &mut data) {
                        return Err(SimError::protocol("writeback of a non-resident block"));
                    }
                    if let Some(line) = self.l2_cache.peek_line_mut(address) {
                        line.set_state(CacheState::Shared);
                    }
                    ctx.send_msg_with_data(
                        ShmemMsgType::WbRep,
                        MemComponent::L2Cache,
                        MemComponent::DramDir,
                        msg.requester,
                        sender,
                        address,
                        data,
                    );
                }
                Ok(None)
            }
            other => Err(SimError::protocol(format!(
                "unrecognized directory message {other:?}"
            ))),
        }
    }

    fn install_reply(
        &mut self,
        address: u64,
        cstate: CacheState,
        data: &[u8],
        l1: &mut L1CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<Option<(MemComponent, u64)>, SimError> {
        self.insert_cache_block(address, cstate, data, l1, ctx)?;

        let miss = self
            .miss_status_map
            .pop(address)
            .ok_or_else(|| SimError::protocol("directory reply with no L2 miss outstanding"))?;
        self.insert_cache_block_in_l1(miss.mem_component, address, cstate, data, l1)?;
        Ok(Some((miss.mem_component, address)))
    }

    /// Installs a block in the L2, handling the eviction of its victim.
    fn insert_cache_block(
        &mut self,
        address: u64,
        cstate: CacheState,
        data: &[u8],
        l1: &mut L1CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let eviction = self.l2_cache.insert_block(address, cstate, data);
        if let Some(evicted) = eviction {
            // Inclusion: the L1 copy goes first.
            if let Some(loc) = evicted.cached_loc {
                l1.invalidate_block(loc, evicted.address);
            }
            let home = ctx.home(evicted.address);
            match evicted.state {
                CacheState::Modified => {
                    ctx.send_msg_with_data(
                        ShmemMsgType::FlushRep,
                        MemComponent::L2Cache,
                        MemComponent::DramDir,
                        ctx.core_id,
                        home,
                        evicted.address,
                        evicted.data,
                    );
                }
                CacheState::Shared => {
                    ctx.send_msg(
                        ShmemMsgType::InvRep,
                        MemComponent::L2Cache,
                        MemComponent::DramDir,
                        ctx.core_id,
                        home,
                        evicted.address,
                    );
                }
                other => {
                    return Err(SimError::protocol(format!(
                        "evicted L2 block in state {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn insert_cache_block_in_l1(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        cstate: CacheState,
        data: &[u8],
        l1: &mut L1CacheCntlr,
    ) -> Result<(), SimError> {
        let evicted = l1.insert_cache_block(mem_component, address, cstate, data);
        if let Some(evict_address) = evicted {
            if let Some(line) = self.l2_cache.peek_line_mut(evict_address) {
                line.clear_cached_loc();
            }
        }
        let line = self
            .l2_cache
            .peek_line_mut(address)
            .ok_or_else(|| SimError::protocol("L1 fill for a block absent from L2"))?;
        line.set_cached_loc(mem_component);
        Ok(())
    }

    /// Write-through from an L1 store.
    pub fn write_cache_block(&mut self, address: u64, offset: u32, data: &[u8]) -> Result<(), SimError> {
        if !self.l2_cache.write_bytes(address, offset as usize, data) {
            return Err(SimError::protocol("write-through to a non-resident L2 block"));
        }
        Ok(())
    }

    /// Returns the cache state for `address` (test hook).
    pub fn cache_state(&self, address: u64) -> CacheState {
        self.l2_cache.state_of(address)
    }

    /// Returns (hits, misses) (test hook).
    pub fn counters(&self) -> (u64, u64) {
        self.l2_cache.counters()
    }

    /// Enables counter accumulation.
    pub fn enable(&mut self) {
        self.l2_cache.enable();
    }

    /// Disables counter accumulation.
    pub fn disable(&mut self) {
        self.l2_cache.disable();
    }

    /// Clears the counters.
    pub fn reset_counters(&mut self) {
        self.l2_cache.reset_counters();
    }

    /// Writes the L2 summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        self.l2_cache.output_summary(out)
    }
}
