//! DRAM controller and its latency model.
//!
//! The controller owns the simulated DRAM contents for the blocks homed at
//! this core: a lazily allocated block map, zero-filled on first read. The
//! latency model charges a fixed access cost plus a bandwidth-derived
//! processing time, optionally behind a single-server queueing model. All
//! DRAM timing runs in the 1 GHz global clock domain; conversion to and
//! from the core clock is explicit.

use std::collections::HashMap;

use crate::common::{CoreId, SimError, Time, convert_cycle_count};
use crate::config::DramConfig;
use crate::memory::shmem_msg::{ShmemMsg, ShmemMsgType};
use crate::memory::{MemComponent, MemCtx};
use crate::queue_model::QueueModelSimple;

/// DRAM access-latency model.
#[derive(Debug)]
pub struct DramPerfModel {
    access_cost: Time,
    bandwidth: f64,
    queue_model: Option<QueueModelSimple>,
    enabled: bool,
    num_accesses: u64,
    total_access_latency: u64,
    total_queueing_delay: u64,
}

impl DramPerfModel {
    /// Creates the model from the DRAM configuration.
    pub fn new(config: &DramConfig) -> Self {
        Self {
            access_cost: config.latency as Time,
            bandwidth: config.per_controller_bandwidth,
            queue_model: config.queue_model.enabled.then(QueueModelSimple::new),
            enabled: false,
            num_accesses: 0,
            total_access_latency: 0,
            total_queueing_delay: 0,
        }
    }

    /// Computes the latency of one access in global clock cycles.
    ///
    /// # Arguments
    ///
    /// * `pkt_time` - Arrival time in global clock cycles.
    /// * `pkt_size` - Transfer size in bytes.
    ///
    /// # Returns
    ///
    /// Queueing delay + processing time + fixed access cost; zero while
    /// disabled.
    pub fn access_latency(&mut self, pkt_time: Time, pkt_size: u64) -> Time {
        if !self.enabled {
            return 0;
        }

        let processing_time = (pkt_size as f64 / self.bandwidth) as Time + 1;
        let queue_delay = match &mut self.queue_model {
            Some(model) => model.compute_queue_delay(pkt_time, processing_time),
            None => 0,
        };
        let access_latency = queue_delay + processing_time + self.access_cost;

        self.num_accesses += 1;
        self.total_access_latency += access_latency;
        self.total_queueing_delay += queue_delay;
        access_latency
    }

    /// Enables latency modeling.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables latency modeling.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Clears the counters.
    pub fn reset(&mut self) {
        self.num_accesses = 0;
        self.total_access_latency = 0;
        self.total_queueing_delay = 0;
    }

    /// Writes the DRAM performance summary.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Dram Perf Model:")?;
        writeln!(out, "    num dram accesses: {}", self.num_accesses)?;
        let (avg_latency, avg_queueing) = if self.num_accesses == 0 {
            (0.0, 0.0)
        } else {
            (
                self.total_access_latency as f64 / self.num_accesses as f64,
                self.total_queueing_delay as f64 / self.num_accesses as f64,
            )
        };
        writeln!(out, "    average dram access latency: {avg_latency:.2}")?;
        writeln!(out, "    average dram queueing delay: {avg_queueing:.2}")
    }
}

/// DRAM controller for the blocks homed at this core.
#[derive(Debug)]
pub struct DramCntlr {
    data: HashMap<u64, Vec<u8>>,
    perf_model: DramPerfModel,
    read_counts: HashMap<u64, u64>,
    write_counts: HashMap<u64, u64>,
}

impl DramCntlr {
    /// Creates a controller with no blocks allocated.
    pub fn new(config: &DramConfig) -> Self {
        Self {
            data: HashMap::new(),
            perf_model: DramPerfModel::new(config),
            read_counts: HashMap::new(),
            write_counts: HashMap::new(),
        }
    }

    /// Handles a message from the directory controller on the same core.
    pub fn handle_msg_from_dram_directory(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        match msg.msg_type {
            ShmemMsgType::GetDataReq => self.get_data_from_dram(sender, msg, ctx),
            ShmemMsgType::PutDataReq => self.put_data_to_dram(msg, ctx),
            other => Err(SimError::protocol(format!(
                "dram cntlr cannot handle msg type {other:?}"
            ))),
        }
    }

    fn get_data_from_dram(
        &mut self,
        sender: CoreId,
        msg: &ShmemMsg,
        ctx: &mut MemCtx<'_>,
    ) -> Result<(), SimError> {
        let address = msg.address;
        let block_size = ctx.block_size as usize;
        let block = self
            .data
            .entry(address)
            .or_insert_with(|| vec![0; block_size])
            .clone();

        let latency = self.run_perf_model(ctx);
        ctx.incr_sim_cycles(latency);
        *self.read_counts.entry(address).or_default() += 1;

        ctx.send_msg_with_data(
            ShmemMsgType::GetDataRep,
            MemComponent::Dram,
            MemComponent::DramDir,
            msg.requester,
            sender,
            address,
            block,
        );
        Ok(())
    }

    fn put_data_to_dram(&mut self, msg: &ShmemMsg, ctx: &mut MemCtx<'_>) -> Result<(), SimError> {
        let address = msg.address;
        let data = msg
            .data
            .as_ref()
            .ok_or_else(|| SimError::protocol("PUT_DATA_REQ without data"))?;
        if data.len() != ctx.block_size as usize {
            return Err(SimError::Length {
                expected: ctx.block_size,
                actual: data.len() as u32,
            });
        }
        let block = self
            .data
            .get_mut(&address)
            .ok_or_else(|| SimError::protocol("PUT_DATA_REQ for an unallocated block"))?;
        block.copy_from_slice(data);

        self.run_perf_model(ctx);
        *self.write_counts.entry(address).or_default() += 1;
        Ok(())
    }

    fn run_perf_model(&mut self, ctx: &mut MemCtx<'_>) -> Time {
        // DRAM timing runs on the 1 GHz global clock.
        let pkt_time = convert_cycle_count(ctx.now(), ctx.core_frequency, 1.0);
        let latency = self
            .perf_model
            .access_latency(pkt_time, u64::from(ctx.block_size));
        convert_cycle_count(latency, 1.0, ctx.core_frequency)
    }

    /// Returns the latency model.
    pub fn perf_model_mut(&mut self) -> &mut DramPerfModel {
        &mut self.perf_model
    }

    /// Returns (total reads, total writes) over all addresses.
    pub fn access_counts(&self) -> (u64, u64) {
        (
            self.read_counts.values().sum(),
            self.write_counts.values().sum(),
        )
    }

    /// Writes the DRAM controller summary.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        self.perf_model.output_summary(out)?;
        let (reads, writes) = self.access_counts();
        writeln!(out, "    dram reads: {reads}")?;
        writeln!(out, "    dram writes: {writes}")
    }
}
