//! Directory-side coherence engine.
//!
//! One instance lives on every memory-controller core and owns that core's
//! directory slice. Requests to the same address are strictly serialized:
//! each address has a FIFO request queue whose head is the only active
//! transaction; arriving requests first pass a one-request-per-cycle
//! contention model. Entry allocation may displace a victim entry, which is
//! drained back to `Uncached` by a synthesized NULLIFY_REQ serviced before
//! the inducing request.

use std::collections::HashSet;

use crate::common::{CoreId, INVALID_CORE_ID, SimError, Time};
use crate::config::DramDirectoryConfig;
use crate::event::EventPayload;
use crate::memory::directory::{DirectoryCache, DirectoryState};
use crate::memory::shmem_msg::{ShmemMsg, ShmemMsgType};
use crate::memory::{MemComponent, MemCtx};
use crate::queue_model::QueueModelSimple;

/// A queued coherence request.
#[derive(Debug)]
struct ShmemReq {
    msg: ShmemMsg,
    time: Time,
}

/// The directory controller for one slice.
#[derive(Debug)]
pub struct DramDirectoryCntlr {
    directory_cache: DirectoryCache,
    req_queues: crate::memory::miss_status::MissStatusMap<ShmemReq>,
    contention_model: QueueModelSimple,
    /// Addresses whose next-request event is in flight; replies arriving in
    /// that window must not restart the front request.
    inactive_addresses: HashSet<u64>,
    dram_req_outstanding: HashSet<u64>,
}

impl DramDirectoryCntlr {
    /// Creates the controller and its directory slice.
    pub fn new(
        config: &DramDirectoryConfig,
        cache_block_size: u32,
        max_num_sharers: u32,
        num_dram_cntlrs: u32,
    ) -> Self {
        Self {
            directory_cache: DirectoryCache::new(
                config,
                cache_block_size,
                max_num_sharers,
                num_dram_cntlrs,
            ),
            req_queues: crate::memory::miss_status::MissStatusMap::new(),
            contention_model: QueueModelSimple::new(),
            inactive_addresses: HashSet::new(),
            dram_req_outstanding: HashSet::new(),
        }
    }

    /// Returns the directory slice (test hook).
    pub fn directory_cache(&self) -> &DirectoryCache {
        &self.directory_cache
    }

    /// A message arrived over the network; charge contention and schedule
    /// the access.
    pub fn handle_msg(
        &mut self,
        sender: CoreId,
        msg: ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let now = ctx.now();
        let queue_delay = self.contention_model.compute_queue_delay(now, 1);
        ctx.push_event(
            now + queue_delay,
            EventPayload::DirectoryAccess { sender, msg },
        );
        Ok(())
    }

    /// The scheduled directory access.
    pub fn access(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        match msg.sender_mem_component {
            MemComponent::L2Cache => self.access_from_l2(sender, msg, ctx),
            MemComponent::Dram => self.access_from_dram(msg, ctx),
            other => Err(SimError::protocol(format!(
                "unrecognized directory access sender {other:?}"
            ))),
        }
    }

    fn access_from_l2(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        ctx.incr_sim_cycles(self.directory_cache.access_delay());
        let address = msg.address;

        match msg.msg_type {
            ShmemMsgType::ExReq | ShmemMsgType::ShReq => {
                let first = self.req_queues.insert(
                    address,
                    ShmemReq {
                        msg: msg.clone(),
                        time: ctx.now(),
                    },
                );
                if first {
                    match msg.msg_type {
                        ShmemMsgType::ExReq => {
                            self.process_ex_req(address, msg.requester, None, ctx)
                        }
                        _ => self.process_sh_req(address, msg.requester, None, ctx),
                    }
                } else {
                    Ok(())
                }
            }
            ShmemMsgType::InvRep => self.process_inv_rep(sender, msg, ctx),
            ShmemMsgType::FlushRep => self.process_flush_rep(sender, msg, ctx),
            ShmemMsgType::WbRep => self.process_wb_rep(sender, msg, ctx),
            other => Err(SimError::protocol(format!(
                "unrecognized L2->directory message {other:?}"
            ))),
        }
    }

    /// Allocates (possibly via replacement) the entry for `address`.
    fn allocate_entry(
        &mut self,
        address: u64,
        requester: CoreId,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        if self.directory_cache.allocate(address) {
            return Ok(());
        }

        // Set full: pick the candidate with the strictly fewest sharers
        // among those with an empty request queue; earliest wins ties.
        let candidates = self.directory_cache.replacement_candidates(address);
        let mut replaced: Option<(u64, u32)> = None;
        for candidate in candidates {
            if self.req_queues.len(candidate.address) != 0 {
                continue;
            }
            let better = replaced.is_none_or(|(_, best)| candidate.num_sharers < best);
            if better {
                replaced = Some((candidate.address, candidate.num_sharers));
            }
        }
        let (replaced_address, _) = replaced.ok_or_else(|| {
            SimError::protocol("no directory entry with an empty request queue to replace")
        })?;

        self.directory_cache.replace_entry(replaced_address, address);

        let nullify_msg = ShmemMsg::new(
            ShmemMsgType::NullifyReq,
            MemComponent::DramDir,
            MemComponent::DramDir,
            requester,
            replaced_address,
        );
        let first = self.req_queues.insert(
            replaced_address,
            ShmemReq {
                msg: nullify_msg,
                time: ctx.now(),
            },
        );
        debug_assert!(first);
        self.process_nullify_req(replaced_address, requester, ctx)
    }

    fn process_nullify_req(
        &mut self,
        address: u64,
        requester: CoreId,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("nullify of a missing directory entry"))?;

        match entry.state() {
            DirectoryState::Modified => {
                let owner = entry.owner();
                ctx.send_msg(
                    ShmemMsgType::FlushReq,
                    MemComponent::DramDir,
                    MemComponent::L2Cache,
                    requester,
                    owner,
                    address,
                );
                Ok(())
            }
            DirectoryState::Shared => {
                let (broadcast, sharers) = entry.sharers_list();
                self.send_invalidations(broadcast, &sharers, requester, address, ctx);
                Ok(())
            }
            DirectoryState::Uncached => {
                self.directory_cache.invalidate_entry(address);
                self.schedule_next_req(address, ctx)
            }
        }
    }

    fn process_ex_req(
        &mut self,
        address: u64,
        requester: CoreId,
        cached_data: Option<&[u8]>,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        if self.directory_cache.entry(address).is_none() {
            self.allocate_entry(address, requester, ctx)?;
        }
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("EX_REQ entry vanished"))?;
        ctx.incr_sim_cycles(entry.access_latency());

        match entry.state() {
            DirectoryState::Modified => {
                debug_assert!(cached_data.is_none());
                let owner = entry.owner();
                ctx.send_msg(
                    ShmemMsgType::FlushReq,
                    MemComponent::DramDir,
                    MemComponent::L2Cache,
                    requester,
                    owner,
                    address,
                );
                Ok(())
            }
            DirectoryState::Shared => {
                debug_assert!(cached_data.is_none());
                let (broadcast, sharers) = entry.sharers_list();
                self.send_invalidations(broadcast, &sharers, requester, address, ctx);
                Ok(())
            }
            DirectoryState::Uncached => match cached_data {
                Some(data) => {
                    let added = entry.add_sharer(requester);
                    debug_assert!(added);
                    entry.set_owner(requester);
                    entry.set_state(DirectoryState::Modified);
                    ctx.send_msg_with_data(
                        ShmemMsgType::ExRep,
                        MemComponent::DramDir,
                        MemComponent::L2Cache,
                        requester,
                        requester,
                        address,
                        data.to_vec(),
                    );
                    self.schedule_next_req(address, ctx)
                }
                None => self.get_data_from_dram(address, requester, ctx),
            },
        }
    }

    fn process_sh_req(
        &mut self,
        address: u64,
        requester: CoreId,
        cached_data: Option<&[u8]>,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        if self.directory_cache.entry(address).is_none() {
            self.allocate_entry(address, requester, ctx)?;
        }
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("SH_REQ entry vanished"))?;
        ctx.incr_sim_cycles(entry.access_latency());

        match entry.state() {
            DirectoryState::Modified => {
                debug_assert!(cached_data.is_none());
                let owner = entry.owner();
                ctx.send_msg(
                    ShmemMsgType::WbReq,
                    MemComponent::DramDir,
                    MemComponent::L2Cache,
                    requester,
                    owner,
                    address,
                );
                Ok(())
            }
            DirectoryState::Shared => {
                if entry.add_sharer(requester) {
                    match cached_data {
                        Some(data) => {
                            ctx.send_msg_with_data(
                                ShmemMsgType::ShRep,
                                MemComponent::DramDir,
                                MemComponent::L2Cache,
                                requester,
                                requester,
                                address,
                                data.to_vec(),
                            );
                            self.schedule_next_req(address, ctx)
                        }
                        None => {
                            // Step back out until the data arrives.
                            entry.remove_sharer(requester);
                            debug_assert!(entry.num_sharers() > 0);
                            self.get_data_from_dram(address, requester, ctx)
                        }
                    }
                } else {
                    // The pointer list is full: evict one sharer and retry
                    // when its INV_REP arrives.
                    debug_assert!(cached_data.is_none());
                    let sharer = entry
                        .one_sharer()
                        .ok_or_else(|| SimError::protocol("full sharer list with no sharers"))?;
                    ctx.send_msg(
                        ShmemMsgType::InvReq,
                        MemComponent::DramDir,
                        MemComponent::L2Cache,
                        requester,
                        sharer,
                        address,
                    );
                    Ok(())
                }
            }
            DirectoryState::Uncached => match cached_data {
                Some(data) => {
                    let added = entry.add_sharer(requester);
                    debug_assert!(added);
                    entry.set_state(DirectoryState::Shared);
                    ctx.send_msg_with_data(
                        ShmemMsgType::ShRep,
                        MemComponent::DramDir,
                        MemComponent::L2Cache,
                        requester,
                        requester,
                        address,
                        data.to_vec(),
                    );
                    self.schedule_next_req(address, ctx)
                }
                None => self.get_data_from_dram(address, requester, ctx),
            },
        }
    }

    /// Broadcast or multicast invalidations to the sharer set.
    fn send_invalidations(
        &mut self,
        broadcast: bool,
        sharers: &[CoreId],
        requester: CoreId,
        address: u64,
        ctx: &mut MemCtx<'_>,
    ) {
        if broadcast {
            // Untracked sharers exist: one packet with every core as a
            // receiver, sharers or not.
            ctx.broadcast_msg(
                ShmemMsgType::InvReq,
                MemComponent::DramDir,
                MemComponent::L2Cache,
                requester,
                address,
            );
        } else {
            for &sharer in sharers {
                ctx.send_msg(
                    ShmemMsgType::InvReq,
                    MemComponent::DramDir,
                    MemComponent::L2Cache,
                    requester,
                    sharer,
                    address,
                );
            }
        }
    }

    fn process_inv_rep(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let address = msg.address;
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("INV_REP for a missing directory entry"))?;
        if entry.state() != DirectoryState::Shared {
            return Err(SimError::protocol(format!(
                "INV_REP with directory state {:?}",
                entry.state()
            )));
        }

        entry.remove_sharer(sender);
        if entry.num_sharers() == 0 {
            entry.set_state(DirectoryState::Uncached);
        }
        let state = entry.state();

        if self.req_queues.len(address) > 0 && self.is_active(address) {
            let (msg_type, requester) = self.front_req(address, ctx)?;
            match msg_type {
                ShmemMsgType::ExReq => {
                    if state == DirectoryState::Uncached {
                        return self.process_ex_req(address, requester, None, ctx);
                    }
                }
                ShmemMsgType::ShReq => {
                    if !self.dram_req_outstanding.contains(&address) {
                        return self.process_sh_req(address, requester, None, ctx);
                    }
                }
                ShmemMsgType::NullifyReq => {
                    if state == DirectoryState::Uncached {
                        return self.process_nullify_req(address, requester, ctx);
                    }
                }
                other => {
                    return Err(SimError::protocol(format!(
                        "INV_REP with queued request {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn process_flush_rep(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let address = msg.address;
        let data = msg
            .data
            .clone()
            .ok_or_else(|| SimError::protocol("FLUSH_REP without data"))?;
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("FLUSH_REP for a missing directory entry"))?;
        if entry.state() != DirectoryState::Modified {
            return Err(SimError::protocol(format!(
                "FLUSH_REP with directory state {:?}",
                entry.state()
            )));
        }

        entry.remove_sharer(sender);
        entry.set_owner(INVALID_CORE_ID);
        entry.set_state(DirectoryState::Uncached);

        if self.req_queues.len(address) > 0 && self.is_active(address) {
            let (msg_type, requester) = self.front_req(address, ctx)?;
            match msg_type {
                ShmemMsgType::ExReq => {
                    // Ownership migrates; the dirty data feeds the new
                    // owner directly without touching DRAM.
                    self.process_ex_req(address, requester, Some(&data), ctx)
                }
                ShmemMsgType::ShReq => {
                    self.put_data_to_dram(address, msg.requester, data.clone(), ctx);
                    self.process_sh_req(address, requester, Some(&data), ctx)
                }
                ShmemMsgType::NullifyReq => {
                    self.put_data_to_dram(address, msg.requester, data, ctx);
                    self.process_nullify_req(address, requester, ctx)
                }
                other => Err(SimError::protocol(format!(
                    "FLUSH_REP with queued request {other:?}"
                ))),
            }
        } else {
            // A voluntary eviction; the dirty block retires to DRAM.
            self.put_data_to_dram(address, msg.requester, data, ctx);
            Ok(())
        }
    }

    fn process_wb_rep(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let address = msg.address;
        let data = msg
            .data
            .clone()
            .ok_or_else(|| SimError::protocol("WB_REP without data"))?;
        let entry = self
            .directory_cache
            .entry_mut(address)
            .ok_or_else(|| SimError::protocol("WB_REP for a missing directory entry"))?;
        if entry.state() != DirectoryState::Modified {
            return Err(SimError::protocol(format!(
                "WB_REP with directory state {:?}",
                entry.state()
            )));
        }
        if !entry.has_sharer(sender) {
            return Err(SimError::protocol("WB_REP from a non-sharer"));
        }

        entry.set_owner(INVALID_CORE_ID);
        entry.set_state(DirectoryState::Shared);

        if self.req_queues.len(address) > 0 && self.is_active(address) {
            let (msg_type, requester) = self.front_req(address, ctx)?;
            if msg_type != ShmemMsgType::ShReq {
                return Err(SimError::protocol(format!(
                    "WB_REP with queued request {msg_type:?}"
                )));
            }
            self.put_data_to_dram(address, msg.requester, data.clone(), ctx);
            self.process_sh_req(address, requester, Some(&data), ctx)
        } else {
            Err(SimError::protocol("WB_REP with no request outstanding"))
        }
    }

    fn access_from_dram(&mut self, msg: &ShmemMsg, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        ctx.incr_sim_cycles(self.directory_cache.access_delay());

        let address = msg.address;
        if msg.msg_type != ShmemMsgType::GetDataRep {
            return Err(SimError::protocol(format!(
                "unexpected DRAM->directory message {:?}",
                msg.msg_type
            )));
        }
        if !self.dram_req_outstanding.remove(&address) {
            return Err(SimError::protocol("GET_DATA_REP with no DRAM request outstanding"));
        }
        let data = msg
            .data
            .clone()
            .ok_or_else(|| SimError::protocol("GET_DATA_REP without data"))?;

        let state = self
            .directory_cache
            .entry(address)
            .ok_or_else(|| SimError::protocol("GET_DATA_REP for a missing directory entry"))?
            .state();

        let (msg_type, requester) = self.front_req(address, ctx)?;
        match msg_type {
            ShmemMsgType::ExReq => {
                if state != DirectoryState::Uncached {
                    return Err(SimError::protocol(format!(
                        "EX_REQ resumed with directory state {state:?}"
                    )));
                }
                self.process_ex_req(address, requester, Some(&data), ctx)
            }
            ShmemMsgType::ShReq => {
                if state == DirectoryState::Modified {
                    return Err(SimError::protocol(
                        "SH_REQ resumed with directory state Modified",
                    ));
                }
                self.process_sh_req(address, requester, Some(&data), ctx)
            }
            other => Err(SimError::protocol(format!(
                "GET_DATA_REP with queued request {other:?}"
            ))),
        }
    }

    fn get_data_from_dram(
        &mut self,
        address: u64,
        requester: CoreId,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        if !self.dram_req_outstanding.insert(address) {
            return Err(SimError::protocol("second DRAM request for the same address"));
        }
        ctx.send_msg(
            ShmemMsgType::GetDataReq,
            MemComponent::DramDir,
            MemComponent::Dram,
            requester,
            ctx.core_id,
            address,
        );
        Ok(())
    }

    fn put_data_to_dram(
        &mut self,
        address: u64,
        requester: CoreId,
        data: Vec<u8>,
        ctx: &mut MemCtx<'_>,
    ) {
        ctx.send_msg_with_data(
            ShmemMsgType::PutDataReq,
            MemComponent::DramDir,
            MemComponent::Dram,
            requester,
            ctx.core_id,
            address,
            data,
        );
    }

    /// The front request just completed; dequeue it and, if more requests
    /// wait on this address, mark the address inactive until the follow-up
    /// event runs.
    fn schedule_next_req(&mut self, address: u64, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        self.req_queues
            .pop(address)
            .ok_or_else(|| SimError::protocol("completed a request on an empty queue"))?;

        if self.req_queues.len(address) > 0 {
            let newly_inactive = self.inactive_addresses.insert(address);
            debug_assert!(newly_inactive);
            ctx.push_event(ctx.now(), EventPayload::DirectoryScheduleNextReq { address });
        }
        Ok(())
    }

    /// Charge contention for the next queued request.
    pub fn schedule_next(&mut self, address: u64, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        debug_assert!(self.req_queues.len(address) > 0);
        let now = ctx.now();
        let queue_delay = self.contention_model.compute_queue_delay(now, 1);
        ctx.push_event(
            now + queue_delay,
            EventPayload::DirectoryHandleNextReq { address },
        );
        Ok(())
    }

    /// The next queued request takes effect.
    pub fn handle_next(&mut self, address: u64, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        if !self.inactive_addresses.remove(&address) {
            return Err(SimError::protocol("next-request event for an active address"));
        }
        ctx.incr_sim_cycles(self.directory_cache.access_delay());

        let (msg_type, requester) = self.front_req(address, ctx)?;
        match msg_type {
            ShmemMsgType::ExReq => self.process_ex_req(address, requester, None, ctx),
            ShmemMsgType::ShReq => self.process_sh_req(address, requester, None, ctx),
            other => Err(SimError::protocol(format!(
                "unrecognized queued request {other:?}"
            ))),
        }
    }

    /// Refreshes the front request's time and returns its type + requester.
    fn front_req(&mut self, address: u64, ctx: &MemCtx<'_>) -> Result<(ShmemMsgType, CoreId), SimError> {
        let now = ctx.now();
        let front = self
            .req_queues
            .front_mut(address)
            .ok_or_else(|| SimError::protocol("no queued request for this address"))?;
        front.time = now;
        Ok((front.msg.msg_type, front.msg.requester))
    }

    fn is_active(&self, address: u64) -> bool {
        !self.inactive_addresses.contains(&address)
    }

    /// Writes the directory summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        self.directory_cache.output_summary(out)
    }
}
