//! L1 cache controllers (instruction and data).
//!
//! The L1 controller serves block-aligned chunks of memory accesses. A hit
//! completes immediately (with a write-through to the L2 on stores); a miss
//! first queries the L2 synchronously, and only if the L2 cannot satisfy it
//! does the chunk park in a miss-status register while a coherence request
//! travels to the directory. Chunks to a block with an outstanding miss
//! coalesce behind it and replay one per cycle once the fill arrives.
//!
//! Lock discipline: a LOCK access leaves the L1 locked until the matching
//! UNLOCK; while locked, the L2 defers incoming directory requests.

use crate::common::SimError;
use crate::event::EventPayload;
use crate::memory::cache::Cache;
use crate::memory::cache_perf::CacheAccess;
use crate::memory::l2_cache_cntlr::L2CacheCntlr;
use crate::memory::miss_status::{L1MissStatus, MissStatusMap};
use crate::memory::shmem_msg::ShmemMsgType;
use crate::memory::{LockSignal, MemComponent, MemCtx, MemOp};
use crate::config::CacheTypeConfig;

/// The private L1 instruction and data cache controllers.
#[derive(Debug)]
pub struct L1CacheCntlr {
    l1_icache: Cache,
    l1_dcache: Cache,
    icache_miss_map: MissStatusMap<L1MissStatus>,
    dcache_miss_map: MissStatusMap<L1MissStatus>,
    locked: bool,
}

impl L1CacheCntlr {
    /// Creates the two L1 caches.
    pub fn new(l1i_cfg: &CacheTypeConfig, l1d_cfg: &CacheTypeConfig, block_size: u32) -> Self {
        Self {
            l1_icache: Cache::new("L1-I", l1i_cfg, block_size),
            l1_dcache: Cache::new("L1-D", l1d_cfg, block_size),
            icache_miss_map: MissStatusMap::new(),
            dcache_miss_map: MissStatusMap::new(),
            locked: false,
        }
    }

    fn cache(&self, component: MemComponent) -> &Cache {
        match component {
            MemComponent::L1ICache => &self.l1_icache,
            _ => &self.l1_dcache,
        }
    }

    fn cache_mut(&mut self, component: MemComponent) -> &mut Cache {
        match component {
            MemComponent::L1ICache => &mut self.l1_icache,
            _ => &mut self.l1_dcache,
        }
    }

    fn miss_map(&self, component: MemComponent) -> &MissStatusMap<L1MissStatus> {
        match component {
            MemComponent::L1ICache => &self.icache_miss_map,
            _ => &self.dcache_miss_map,
        }
    }

    fn miss_map_mut(&mut self, component: MemComponent) -> &mut MissStatusMap<L1MissStatus> {
        match component {
            MemComponent::L1ICache => &mut self.icache_miss_map,
            _ => &mut self.dcache_miss_map,
        }
    }

    /// Starts one block-aligned chunk.
    ///
    /// If an earlier miss to the same block is outstanding, the chunk
    /// coalesces behind it; otherwise it is attempted immediately.
    pub fn initiate_cache_access(
        &mut self,
        mem_component: MemComponent,
        access_id: u32,
        lock_signal: LockSignal,
        mem_op: MemOp,
        address: u64,
        offset: u32,
        data_length: u32,
        write_data: Option<Vec<u8>>,
        modeled: bool,
        l2: &mut L2CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let status = L1MissStatus {
            address,
            access_id,
            lock_signal,
            mem_op,
            offset,
            data_length,
            write_data,
            modeled,
            access_num: 1,
        };
        if self.miss_map(mem_component).len(address) > 0 {
            self.miss_map_mut(mem_component).insert(address, status);
            return Ok(());
        }
        self.do_initiate_cache_access(mem_component, status, false, l2, ctx)
    }

    /// Replays the queued request at the head of `address`'s queue after a
    /// one-cycle skew.
    pub fn re_initiate_cache_access(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        l2: &mut L2CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let status = self
            .miss_map_mut(mem_component)
            .pop(address)
            .ok_or_else(|| SimError::protocol("re-initiate with no queued request"))?;
        self.do_initiate_cache_access(mem_component, status, false, l2, ctx)
    }

    /// The L2 installed the block this L1 was waiting on; replay the
    /// stalled chunk, which must now hit.
    pub fn signal_data_ready(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        l2: &mut L2CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let status = self
            .miss_map_mut(mem_component)
            .pop(address)
            .ok_or_else(|| SimError::protocol("data ready with no miss outstanding"))?;
        self.do_initiate_cache_access(mem_component, status, true, l2, ctx)
    }

    fn do_initiate_cache_access(
        &mut self,
        mem_component: MemComponent,
        mut status: L1MissStatus,
        replay: bool,
        l2: &mut L2CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let update_counters = status.access_num == 1;

        if self.operation_permissible(mem_component, status.address, status.mem_op, status.modeled, update_counters) {
            ctx.charge_cache_access(mem_component, CacheAccess::DataAndTags);
            if status.mem_op == MemOp::Write {
                ctx.charge_cache_access(MemComponent::L2Cache, CacheAccess::DataAndTags);
            }
            let read_data = self.access_cache(mem_component, &status, l2)?;
            self.complete_cache_request(mem_component, &status, read_data, l2, ctx);
            return Ok(());
        }

        if replay {
            return Err(SimError::protocol(format!(
                "replayed access to {:#x} missed after fill",
                status.address
            )));
        }
        if status.lock_signal == LockSignal::Unlock {
            return Err(SimError::protocol(format!(
                "UNLOCK access expected {:#x} resident in L1",
                status.address
            )));
        }

        // Miss: probe cost, then ask the L2.
        ctx.charge_cache_access(mem_component, CacheAccess::Tags);
        self.cache_mut(mem_component).invalidate_block(status.address);

        let msg_type = match status.mem_op {
            MemOp::Read => ShmemMsgType::ShReq,
            MemOp::ReadEx | MemOp::Write => ShmemMsgType::ExReq,
        };

        if l2.process_shmem_req_from_l1(mem_component, msg_type, status.address, status.modeled, self)? {
            // The L2 had the block in a sufficient state and installed it.
            ctx.charge_cache_access(MemComponent::L2Cache, CacheAccess::DataAndTags);
            ctx.charge_cache_access(mem_component, CacheAccess::DataAndTags);
            let read_data = self.access_cache(mem_component, &status, l2)?;
            self.complete_cache_request(mem_component, &status, read_data, l2, ctx);
            return Ok(());
        }

        // Full miss: park in the MSHR and send the request toward the
        // directory through the L2.
        status.access_num += 1;
        let address = status.address;
        self.miss_map_mut(mem_component).insert_front(address, status);
        l2.handle_msg_from_l1(mem_component, msg_type, address, ctx);
        Ok(())
    }

    fn complete_cache_request(
        &mut self,
        mem_component: MemComponent,
        status: &L1MissStatus,
        read_data: Option<Vec<u8>>,
        l2: &mut L2CacheCntlr,
        ctx: &mut MemCtx<'_>,
    ) {
        ctx.push_event(
            ctx.now(),
            EventPayload::CompleteCacheAccess {
                access_id: status.access_id,
                read_data,
            },
        );

        match status.lock_signal {
            LockSignal::Lock => self.locked = true,
            LockSignal::Unlock => {
                self.locked = false;
                l2.schedule_next_pending_request(ctx);
            }
            LockSignal::None => {}
        }

        // Wake the next coalesced request for this block, one cycle later.
        if self.miss_map(mem_component).len(status.address) > 0 {
            ctx.push_event(
                ctx.now() + 1,
                EventPayload::ReInitiateCacheAccess {
                    mem_component,
                    address: status.address,
                },
            );
        }
    }

    /// Moves the chunk's bytes between the access buffer and the caches.
    ///
    /// Reads return the bytes; writes go to the L1 and write through to the
    /// L2.
    fn access_cache(
        &mut self,
        mem_component: MemComponent,
        status: &L1MissStatus,
        l2: &mut L2CacheCntlr,
    ) -> Result<Option<Vec<u8>>, SimError> {
        let offset = status.offset as usize;
        match status.mem_op {
            MemOp::Read | MemOp::ReadEx => {
                let mut buf = vec![0u8; status.data_length as usize];
                if !self.cache_mut(mem_component).read_bytes(status.address, offset, &mut buf) {
                    return Err(SimError::protocol("L1 read of a non-resident block"));
                }
                Ok(Some(buf))
            }
            MemOp::Write => {
                let data = status
                    .write_data
                    .as_ref()
                    .ok_or_else(|| SimError::protocol("WRITE chunk without data"))?;
                if !self.cache_mut(mem_component).write_bytes(status.address, offset, data) {
                    return Err(SimError::protocol("L1 write of a non-resident block"));
                }
                l2.write_cache_block(status.address, status.offset, data)?;
                Ok(None)
            }
        }
    }

    fn operation_permissible(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        mem_op: MemOp,
        modeled: bool,
        update_counters: bool,
    ) -> bool {
        let state = self.cache(mem_component).state_of(address);
        let hit = match mem_op {
            MemOp::Read => state.readable(),
            MemOp::ReadEx | MemOp::Write => state.writable(),
        };
        if modeled && update_counters {
            self.cache_mut(mem_component).update_counters(hit);
        }
        hit
    }

    /// Returns whether the L1 lock is held.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the cache state for `address` in the given L1 (test hook).
    pub fn cache_state(&self, mem_component: MemComponent, address: u64) -> crate::memory::cache::CacheState {
        self.cache(mem_component).state_of(address)
    }

    /// Sets a block's state; used by the L2 to propagate downgrades.
    pub fn set_cache_state(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        state: crate::memory::cache::CacheState,
    ) -> Result<(), SimError> {
        let line = self
            .cache_mut(mem_component)
            .peek_line_mut(address)
            .ok_or_else(|| SimError::protocol("L1 state change for a non-resident block"))?;
        line.set_state(state);
        Ok(())
    }

    /// Invalidates a block; used by the L2 for inclusion.
    pub fn invalidate_block(&mut self, mem_component: MemComponent, address: u64) {
        self.cache_mut(mem_component).invalidate_block(address);
    }

    /// Installs a block delivered by the L2.
    ///
    /// # Returns
    ///
    /// The address of an evicted block, if insertion displaced one.
    pub fn insert_cache_block(
        &mut self,
        mem_component: MemComponent,
        address: u64,
        state: crate::memory::cache::CacheState,
        data: &[u8],
    ) -> Option<u64> {
        self.cache_mut(mem_component)
            .insert_block(address, state, data)
            .map(|evicted| evicted.address)
    }

    /// Returns (hits, misses) for an L1 (test hook).
    pub fn counters(&self, mem_component: MemComponent) -> (u64, u64) {
        self.cache(mem_component).counters()
    }

    /// Enables counter accumulation in both caches.
    pub fn enable(&mut self) {
        self.l1_icache.enable();
        self.l1_dcache.enable();
    }

    /// Disables counter accumulation in both caches.
    pub fn disable(&mut self) {
        self.l1_icache.disable();
        self.l1_dcache.disable();
    }

    /// Clears both caches' counters.
    pub fn reset_counters(&mut self) {
        self.l1_icache.reset_counters();
        self.l1_dcache.reset_counters();
    }

    /// Writes both caches' summary blocks.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        self.l1_icache.output_summary(out)?;
        self.l1_dcache.output_summary(out)
    }
}
