//! The per-core façade.
//!
//! A [`Core`] owns everything that belongs to one simulated core: its
//! network stack, its memory subsystem, the instruction/cycle performance
//! counters, the clock-skew client, and the bookkeeping for in-flight
//! memory accesses. The core is also the event dispatcher: every event
//! addressed to it lands in [`Core::handle_event`], which routes to the
//! owning component and flushes whatever messages and follow-up events the
//! handler produced.

use std::collections::HashMap;

use tracing::trace;

use crate::clock_skew::{ClockSkewClient, SyncMsg};
use crate::common::{BROADCAST_CORE_ID, CoreId, SimError, Time, convert_cycle_count};
use crate::config::{Config, CoreModel};
use crate::event::{EventPayload, EventQueue};
use crate::memory::miss_status::{CompletedAccess, MemoryAccessStatus};
use crate::memory::shmem_msg::ShmemMsg;
use crate::memory::shmem_perf::Role;
use crate::memory::{LockSignal, MemComponent, MemOp, MemoryManager, MsgOutbox};
use crate::network::Network;
use crate::network::packet::{NetMatch, NetPacket, PacketType};

/// Run state of a core's application thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    /// No thread assigned.
    Idle,
    /// Thread starting up.
    Initializing,
    /// Thread running.
    Running,
    /// Thread rate-limiting itself (clock-skew wait).
    Sleeping,
    /// Thread waking from a sleep.
    WakingUp,
    /// Thread blocked on a synchronization primitive.
    Stalled,
}

/// Per-core instruction and cycle counters.
#[derive(Debug)]
pub struct PerformanceModel {
    enabled: bool,
    instructions: u64,
    cycles: u64,
    frequency: f64,
}

impl PerformanceModel {
    /// Creates the counters for a core at `frequency` GHz.
    pub fn new(frequency: f64) -> Self {
        Self {
            enabled: false,
            instructions: 0,
            cycles: 0,
            frequency,
        }
    }

    /// Records retired instructions. No-op while disabled.
    pub fn retire_instructions(&mut self, count: u64) {
        if self.enabled {
            self.instructions += count;
        }
    }

    /// Advances the cycle counter. No-op while disabled.
    pub fn advance_cycles(&mut self, count: u64) {
        if self.enabled {
            self.cycles += count;
        }
    }

    /// Returns the retired instruction count.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Returns the cycle count.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns the core frequency in GHz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Enables counting.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables counting.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Clears the counters.
    pub fn reset(&mut self) {
        self.instructions = 0;
        self.cycles = 0;
    }

    /// Writes the performance summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Performance Model:")?;
        writeln!(out, "    instructions: {}", self.instructions)?;
        writeln!(out, "    cycles: {}", self.cycles)
    }
}

/// The data side of a memory access request.
#[derive(Debug)]
pub enum AccessData {
    /// Bytes to write.
    Write(Vec<u8>),
    /// Bytes to read.
    Read(u32),
}

/// One simulated core.
#[derive(Debug)]
pub struct Core {
    core_id: CoreId,
    state: CoreState,
    frequency: f64,
    network: Network,
    memory_manager: Option<MemoryManager>,
    performance_model: PerformanceModel,
    clock_skew_client: ClockSkewClient,
    access_status_map: HashMap<u32, MemoryAccessStatus>,
    completed_accesses: HashMap<u32, CompletedAccess>,
    last_memory_access_id: u32,
}

impl Core {
    /// Creates one core and its components.
    pub fn new(
        core_id: CoreId,
        model: &CoreModel,
        config: &Config,
        mem_controller_cores: &[CoreId],
        total_cores: u32,
    ) -> Result<Self, SimError> {
        let mut network = Network::new(core_id, total_cores, config)?;
        let memory_manager = if config.general.enable_shared_mem {
            // Coherence deliveries bypass the receive queue.
            network.register_async_recv_callback(PacketType::SharedMem1);
            network.register_async_recv_callback(PacketType::SharedMem2);
            Some(MemoryManager::new(
                core_id,
                model,
                config,
                mem_controller_cores,
                total_cores,
            )?)
        } else {
            None
        };

        let clock_skew_client =
            ClockSkewClient::create(&config.clock_skew_minimization, core_id, total_cores);
        if matches!(clock_skew_client, ClockSkewClient::RandomPairs(_)) {
            network.register_async_recv_callback(PacketType::ClockSkew);
        }

        Ok(Self {
            core_id,
            state: CoreState::Idle,
            frequency: model.frequency,
            network,
            memory_manager,
            performance_model: PerformanceModel::new(model.frequency),
            clock_skew_client,
            access_status_map: HashMap::new(),
            completed_accesses: HashMap::new(),
            last_memory_access_id: 0,
        })
    }

    /// Returns this core's id.
    pub fn id(&self) -> CoreId {
        self.core_id
    }

    /// Returns the core's run state.
    pub fn state(&self) -> CoreState {
        self.state
    }

    /// Sets the core's run state.
    pub fn set_state(&mut self, state: CoreState) {
        self.state = state;
    }

    /// Returns the core clock frequency in GHz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Returns the memory subsystem, when shared memory is enabled.
    pub fn memory_manager(&self) -> Option<&MemoryManager> {
        self.memory_manager.as_ref()
    }

    /// Returns the network stack.
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Returns the network stack mutably.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Returns the performance counters.
    pub fn performance_model(&self) -> &PerformanceModel {
        &self.performance_model
    }

    /// Returns the performance counters mutably.
    pub fn performance_model_mut(&mut self) -> &mut PerformanceModel {
        &mut self.performance_model
    }

    /// Returns the clock-skew client mutably.
    pub fn clock_skew_client_mut(&mut self) -> &mut ClockSkewClient {
        &mut self.clock_skew_client
    }

    /// Starts a memory access and returns its id.
    ///
    /// The access fragments into cache-block-aligned chunks driven by
    /// events; completion shows up in [`Core::take_completed_access`].
    pub fn access_memory(
        &mut self,
        time: Time,
        lock_signal: LockSignal,
        mem_op: MemOp,
        address: u64,
        data: AccessData,
        modeled: bool,
        queue: &mut EventQueue,
    ) -> Result<u32, SimError> {
        let manager = self
            .memory_manager
            .as_mut()
            .ok_or_else(|| SimError::protocol("access_memory with shared memory disabled"))?;
        manager.shmem_perf_model_mut().set_cycle_count(Role::App, time);

        let (mem_op_checked, buffer) = match (mem_op, data) {
            (MemOp::Write, AccessData::Write(bytes)) => (MemOp::Write, bytes),
            (op, AccessData::Read(size)) if op != MemOp::Write => (op, vec![0u8; size as usize]),
            _ => {
                return Err(SimError::protocol(
                    "mismatched memory operation and data direction",
                ));
            }
        };

        let access_id = self.last_memory_access_id;
        self.last_memory_access_id += 1;
        let bytes = buffer.len() as u32;
        let status = MemoryAccessStatus {
            access_id,
            start_time: time,
            curr_time: time,
            start_address: address,
            curr_address: address,
            bytes_remaining: bytes,
            curr_bytes: 0,
            mem_component: MemComponent::L1DCache,
            lock_signal,
            mem_op: mem_op_checked,
            buffer,
            cursor: 0,
            modeled,
        };
        self.access_status_map.insert(access_id, status);
        queue.process_in_order(time, self.core_id, EventPayload::InitiateCacheAccess {
            access_id,
        });
        Ok(access_id)
    }

    /// Collects a completed access, if finished.
    pub fn take_completed_access(&mut self, access_id: u32) -> Option<CompletedAccess> {
        self.completed_accesses.remove(&access_id)
    }

    /// Records an already-completed access (the native, unmodeled path).
    pub fn insert_completed_access(&mut self, access_id: u32, completed: CompletedAccess) {
        self.completed_accesses.insert(access_id, completed);
    }

    /// Returns whether any access is still in flight.
    pub fn has_outstanding_accesses(&self) -> bool {
        !self.access_status_map.is_empty()
    }

    /// Sends a user/system packet.
    pub fn net_send(
        &mut self,
        time: Time,
        packet_type: PacketType,
        receiver: CoreId,
        data: Vec<u8>,
        queue: &mut EventQueue,
    ) -> Result<u32, SimError> {
        let packet = NetPacket::new(time, packet_type, self.core_id, receiver, data);
        self.network.net_send(packet, self.frequency, queue)
    }

    /// Polls the receive queue for a matching packet.
    pub fn net_recv(
        &mut self,
        net_match: &NetMatch,
        expected_length: Option<u32>,
    ) -> Result<Option<NetPacket>, SimError> {
        self.network.net_recv(net_match, expected_length)
    }

    /// Clock-skew synchronization hook for the random-pairs scheme; emits
    /// the REQ packet when a quantum has elapsed.
    pub fn synchronize(&mut self, time: Time, queue: &mut EventQueue) -> Result<(), SimError> {
        let global_time = convert_cycle_count(time, self.frequency, 1.0);
        if let ClockSkewClient::RandomPairs(client) = &mut self.clock_skew_client {
            if let Some((receiver, msg)) = client.synchronize(global_time) {
                let packet = NetPacket::new(
                    time,
                    PacketType::ClockSkew,
                    self.core_id,
                    receiver,
                    msg.to_bytes(),
                );
                self.network.net_send(packet, self.frequency, queue)?;
            }
        }
        Ok(())
    }

    /// Handles one event addressed to this core.
    pub fn handle_event(
        &mut self,
        time: Time,
        payload: EventPayload,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        trace!(core = self.core_id, time, "handle event");
        match payload {
            EventPayload::InitiateCacheAccess { access_id } => {
                self.continue_memory_access(time, access_id, queue)
            }
            EventPayload::ReInitiateCacheAccess {
                mem_component,
                address,
            } => self.with_memory_manager(queue, |manager, outbox| {
                manager.re_initiate_cache_access(time, mem_component, address, outbox)
            }),
            EventPayload::CompleteCacheAccess {
                access_id,
                read_data,
            } => self.complete_cache_access(time, access_id, read_data, queue),
            EventPayload::CompleteMemoryAccess { access_id } => {
                // A completion marker; the access is already collectable.
                let _ = access_id;
                Ok(())
            }
            EventPayload::L2CacheAccess { sender, msg } => {
                self.with_memory_manager(queue, |manager, outbox| {
                    manager.l2_cache_access(time, sender, msg, outbox)
                })
            }
            EventPayload::DirectoryAccess { sender, msg } => {
                self.with_memory_manager(queue, |manager, outbox| {
                    manager.directory_access(time, sender, msg, outbox)
                })
            }
            EventPayload::DirectoryScheduleNextReq { address } => {
                self.with_memory_manager(queue, |manager, outbox| {
                    manager.directory_schedule_next(time, address, outbox)
                })
            }
            EventPayload::DirectoryHandleNextReq { address } => {
                self.with_memory_manager(queue, |manager, outbox| {
                    manager.directory_handle_next(time, address, outbox)
                })
            }
            EventPayload::RawPacketArrival { packet } => self.receive_packet(packet, queue),
            EventPayload::ModelingMsgArrival { network, msg } => {
                let ready =
                    self.network
                        .receive_modeling_msg(network, msg, self.frequency, queue)?;
                self.deliver_packets(ready, queue)
            }
            EventPayload::ClockSkewTick => self.synchronize(time, queue),
        }
    }

    /// Runs a memory-manager operation and flushes its outbox.
    fn with_memory_manager(
        &mut self,
        queue: &mut EventQueue,
        f: impl FnOnce(&mut MemoryManager, &mut MsgOutbox) -> Result<(), SimError>,
    ) -> Result<(), SimError> {
        let manager = self
            .memory_manager
            .as_mut()
            .ok_or_else(|| SimError::protocol("memory event with shared memory disabled"))?;
        let mut outbox = MsgOutbox::new();
        f(manager, &mut outbox)?;
        self.flush_outbox(outbox, queue)
    }

    /// Issues the next block-aligned chunk of an access, or completes it.
    fn continue_memory_access(
        &mut self,
        time: Time,
        access_id: u32,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let status = self
            .access_status_map
            .get_mut(&access_id)
            .ok_or_else(|| SimError::protocol("event for an unknown memory access"))?;

        if status.bytes_remaining == 0 {
            return self.complete_memory_access(access_id, queue);
        }

        let manager = self
            .memory_manager
            .as_mut()
            .ok_or_else(|| SimError::protocol("memory event with shared memory disabled"))?;
        let block_size = u64::from(manager.cache_block_size());
        let address_aligned = (status.curr_address / block_size) * block_size;
        let offset = (status.curr_address - address_aligned) as u32;
        let chunk = status
            .bytes_remaining
            .min(block_size as u32 - offset);
        status.curr_bytes = chunk;

        let write_data = (status.mem_op == MemOp::Write)
            .then(|| status.buffer[status.cursor..status.cursor + chunk as usize].to_vec());

        let mem_component = status.mem_component;
        let lock_signal = status.lock_signal;
        let mem_op = status.mem_op;
        let modeled = status.modeled;

        let mut outbox = MsgOutbox::new();
        manager.initiate_cache_access(
            time,
            mem_component,
            access_id,
            lock_signal,
            mem_op,
            address_aligned,
            offset,
            chunk,
            write_data,
            modeled,
            &mut outbox,
        )?;
        self.flush_outbox(outbox, queue)
    }

    /// A chunk finished; advance the cursor and continue or complete.
    fn complete_cache_access(
        &mut self,
        time: Time,
        access_id: u32,
        read_data: Option<Vec<u8>>,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let status = self
            .access_status_map
            .get_mut(&access_id)
            .ok_or_else(|| SimError::protocol("completion for an unknown memory access"))?;

        if let Some(bytes) = read_data {
            status.buffer[status.cursor..status.cursor + bytes.len()].copy_from_slice(&bytes);
        }
        status.curr_address += u64::from(status.curr_bytes);
        status.bytes_remaining -= status.curr_bytes;
        status.cursor += status.curr_bytes as usize;
        status.curr_time = time;

        if status.bytes_remaining == 0 {
            self.complete_memory_access(access_id, queue)
        } else {
            queue.process_in_order(time, self.core_id, EventPayload::InitiateCacheAccess {
                access_id,
            });
            Ok(())
        }
    }

    fn complete_memory_access(
        &mut self,
        access_id: u32,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let status = self
            .access_status_map
            .remove(&access_id)
            .ok_or_else(|| SimError::protocol("double completion of a memory access"))?;

        let latency = status.curr_time - status.start_time;
        if status.modeled {
            if let Some(manager) = &mut self.memory_manager {
                manager
                    .shmem_perf_model_mut()
                    .incr_total_memory_access_latency(latency);
            }
        }
        queue.process_in_order(
            status.curr_time,
            self.core_id,
            EventPayload::CompleteMemoryAccess { access_id },
        );

        let data = match status.mem_op {
            MemOp::Write => Vec::new(),
            _ => status.buffer,
        };
        self.completed_accesses.insert(
            access_id,
            CompletedAccess {
                data,
                completion_time: status.curr_time,
                latency,
            },
        );
        Ok(())
    }

    /// A raw packet arrived; reassemble/order it, then route deliveries.
    fn receive_packet(&mut self, packet: NetPacket, queue: &mut EventQueue) -> Result<(), SimError> {
        let ready = self.network.receive_raw_packet(packet, self.frequency)?;
        self.deliver_packets(ready, queue)
    }

    /// Routes released packets to asynchronous callbacks or the receive
    /// queue. Callback handlers run here, on the delivery path, and must
    /// not block.
    fn deliver_packets(
        &mut self,
        packets: Vec<NetPacket>,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        for packet in packets {
            if !self.network.has_async_recv_callback(packet.packet_type) {
                self.network.queue_packet(packet);
                continue;
            }
            match packet.packet_type {
                PacketType::SharedMem1 | PacketType::SharedMem2 => {
                    let msg = ShmemMsg::from_bytes(&packet.data)?;
                    let sender = packet.sender;
                    let time = packet.time;
                    self.with_memory_manager(queue, |manager, outbox| {
                        manager.handle_msg_from_network(time, sender, msg, outbox)
                    })?;
                }
                PacketType::ClockSkew => {
                    self.process_clock_skew_msg(packet, queue)?;
                }
                _ => self.network.queue_packet(packet),
            }
        }
        Ok(())
    }

    fn process_clock_skew_msg(
        &mut self,
        packet: NetPacket,
        queue: &mut EventQueue,
    ) -> Result<(), SimError> {
        let msg = SyncMsg::from_bytes(packet.sender, &packet.data)?;
        // Compare against this core's own clock, not the message's.
        let local_time = self
            .memory_manager
            .as_ref()
            .map_or(packet.time, |m| m.shmem_perf_model().cycle_count(Role::App));
        let global_time = convert_cycle_count(local_time, self.frequency, 1.0);
        let state = self.state;
        let reply = match &mut self.clock_skew_client {
            ClockSkewClient::RandomPairs(client) => {
                client.process_sync_msg(msg, global_time, state)?
            }
            _ => None,
        };
        if let Some((receiver, reply_msg)) = reply {
            let reply_packet = NetPacket::new(
                packet.time,
                PacketType::ClockSkew,
                self.core_id,
                receiver,
                reply_msg.to_bytes(),
            );
            self.network.net_send(reply_packet, self.frequency, queue)?;
        }
        Ok(())
    }

    /// Flushes a handler's outbox: messages through the network, events
    /// into the queue.
    fn flush_outbox(&mut self, outbox: MsgOutbox, queue: &mut EventQueue) -> Result<(), SimError> {
        for outgoing in outbox.msgs {
            let receiver = if outgoing.receiver == BROADCAST_CORE_ID {
                BROADCAST_CORE_ID
            } else {
                outgoing.receiver
            };
            let packet = NetPacket::new(
                outgoing.time,
                PacketType::SharedMem1,
                self.core_id,
                receiver,
                outgoing.msg.to_bytes(),
            );
            self.network.net_send(packet, self.frequency, queue)?;
        }
        for event in outbox.events {
            queue.process_in_order(event.time, event.core_id, event.payload);
        }
        Ok(())
    }

    /// Enables every performance model on this core.
    pub fn enable_performance_models(&mut self) {
        self.clock_skew_client.enable();
        if let Some(manager) = &mut self.memory_manager {
            manager.enable_models();
        }
        self.network.enable_models();
        self.performance_model.enable();
    }

    /// Disables every performance model on this core.
    pub fn disable_performance_models(&mut self) {
        self.clock_skew_client.disable();
        if let Some(manager) = &mut self.memory_manager {
            manager.disable_models();
        }
        self.network.disable_models();
        self.performance_model.disable();
    }

    /// Resets every counter on this core. Models must be disabled.
    pub fn reset_performance_models(&mut self) {
        self.clock_skew_client.reset();
        if let Some(manager) = &mut self.memory_manager {
            manager.reset_models();
        }
        self.performance_model.reset();
    }

    /// Writes this core's summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "Core {}:", self.core_id)?;
        self.performance_model.output_summary(out)?;
        self.network.output_summary(out)?;
        if let Some(manager) = &self.memory_manager {
            manager.output_summary(out)?;
        }
        Ok(())
    }
}
