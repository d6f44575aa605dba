//! In-flight access bookkeeping.
//!
//! Three record kinds track work that is waiting on the memory hierarchy:
//! 1. **[`MemoryAccessStatus`]:** One per `access_memory` call; walks the
//!    access across cache-block boundaries.
//! 2. **[`L1MissStatus`]:** One per block-aligned chunk stalled in an L1;
//!    later chunks to the same block coalesce behind the first (MSHR).
//! 3. **[`L2MissStatus`]:** One per block with an outstanding directory
//!    request; remembers which L1 to wake on the reply.
//!
//! Pending write data is owned by the records (`Vec<u8>`), never borrowed
//! from the caller, so records can be parked across events.

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::common::Time;
use crate::memory::{LockSignal, MemComponent, MemOp};

/// One in-flight `access_memory` call.
#[derive(Debug)]
pub struct MemoryAccessStatus {
    /// Identifier returned to the driver.
    pub access_id: u32,
    /// Time the access began, in core cycles.
    pub start_time: Time,
    /// Time the most recent chunk completed.
    pub curr_time: Time,
    /// First byte of the access.
    pub start_address: u64,
    /// First byte of the current chunk.
    pub curr_address: u64,
    /// Bytes still to process, including the current chunk.
    pub bytes_remaining: u32,
    /// Size of the current chunk.
    pub curr_bytes: u32,
    /// L1 the access targets (always the D-cache for data accesses).
    pub mem_component: MemComponent,
    /// Lock discipline carried to the L1 controller.
    pub lock_signal: LockSignal,
    /// Operation type.
    pub mem_op: MemOp,
    /// Write payload, or collected read bytes.
    pub buffer: Vec<u8>,
    /// Cursor into `buffer` for the current chunk.
    pub cursor: usize,
    /// Whether latency counters account this access.
    pub modeled: bool,
}

/// A completed access handed back to the driver.
#[derive(Debug)]
pub struct CompletedAccess {
    /// Bytes read (empty for writes).
    pub data: Vec<u8>,
    /// Completion time in core cycles.
    pub completion_time: Time,
    /// `completion_time - start_time`.
    pub latency: Time,
}

/// One chunk parked in an L1 miss-status register.
#[derive(Debug)]
pub struct L1MissStatus {
    /// Block-aligned address.
    pub address: u64,
    /// Parent access.
    pub access_id: u32,
    /// Lock discipline of the parent access.
    pub lock_signal: LockSignal,
    /// Operation type.
    pub mem_op: MemOp,
    /// Byte offset within the block.
    pub offset: u32,
    /// Chunk length in bytes.
    pub data_length: u32,
    /// Owned write payload for WRITE chunks.
    pub write_data: Option<Vec<u8>>,
    /// Whether counters account this chunk.
    pub modeled: bool,
    /// How many times the chunk has been initiated (1 = first probe,
    /// 2 = replay after the fill).
    pub access_num: u32,
}

/// One block with an outstanding request to the directory.
#[derive(Debug)]
pub struct L2MissStatus {
    /// Block-aligned address.
    pub address: u64,
    /// L1 to signal when the reply installs the block.
    pub mem_component: MemComponent,
}

/// Per-address FIFO queues of parked records.
///
/// The head of each queue is the record being serviced; coalesced requests
/// queue behind it and replay one per cycle once the head completes.
#[derive(Debug, Default)]
pub struct MissStatusMap<T> {
    queues: HashMap<u64, VecDeque<T>>,
}

impl<T> MissStatusMap<T> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    /// Appends a record to its address queue; returns whether the queue was
    /// previously empty (i.e. this record is now being serviced).
    pub fn insert(&mut self, address: u64, status: T) -> bool {
        let queue = self.queues.entry(address).or_default();
        queue.push_back(status);
        queue.len() == 1
    }

    /// Puts a record at the head of its address queue; used when the record
    /// being serviced must be re-parked without losing its turn.
    pub fn insert_front(&mut self, address: u64, status: T) {
        self.queues.entry(address).or_default().push_front(status);
    }

    /// Returns the record being serviced for `address`.
    pub fn front(&self, address: u64) -> Option<&T> {
        self.queues.get(&address).and_then(VecDeque::front)
    }

    /// Returns the record being serviced for `address`, mutably.
    pub fn front_mut(&mut self, address: u64) -> Option<&mut T> {
        self.queues.get_mut(&address).and_then(VecDeque::front_mut)
    }

    /// Removes and returns the record being serviced for `address`.
    pub fn pop(&mut self, address: u64) -> Option<T> {
        let queue = self.queues.get_mut(&address)?;
        let front = queue.pop_front();
        if queue.is_empty() {
            self.queues.remove(&address);
        }
        front
    }

    /// Returns the queue length for `address`.
    pub fn len(&self, address: u64) -> usize {
        self.queues.get(&address).map_or(0, VecDeque::len)
    }

    /// Returns whether no record is parked anywhere.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesced_records_queue_fifo() {
        let mut map: MissStatusMap<u32> = MissStatusMap::new();
        assert!(map.insert(64, 1));
        assert!(!map.insert(64, 2));
        assert_eq!(map.len(64), 2);
        assert_eq!(map.pop(64), Some(1));
        assert_eq!(map.front(64), Some(&2));
        assert_eq!(map.pop(64), Some(2));
        assert!(map.is_empty());
    }
}
