//! Discrete-event queue driving the simulation.
//!
//! This module provides:
//! 1. **Typed payloads:** Every event carries an [`EventPayload`] variant
//!    with typed arguments; dispatch is an exhaustive match, so an unknown
//!    event cannot exist.
//! 2. **Ordering contract:** For each core, events execute in nondecreasing
//!    time and in FIFO order among ties. A handler may enqueue further
//!    events at times greater than or equal to its own.
//! 3. **Liveness:** Popping always returns the globally earliest pending
//!    event, so any core with pending events makes progress.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::common::{CoreId, Time};
use crate::memory::MemComponent;
use crate::memory::shmem_msg::ShmemMsg;
use crate::network::components::ModelingMsg;
use crate::network::packet::{NetPacket, StaticNetwork};

/// Typed event argument bundle.
///
/// Each variant names the handler that consumes it; all handlers run on the
/// event's destination core.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Start the next block-aligned chunk of an in-flight memory access.
    InitiateCacheAccess {
        /// In-flight access this chunk belongs to.
        access_id: u32,
    },
    /// Replay a queued L1 request after an earlier miss to the same block
    /// completed.
    ReInitiateCacheAccess {
        /// L1 cache the request targets.
        mem_component: MemComponent,
        /// Block-aligned address of the queued request.
        address: u64,
    },
    /// A chunk finished in the L1; advance the parent access.
    CompleteCacheAccess {
        /// In-flight access the chunk belongs to.
        access_id: u32,
        /// Bytes read out of the cache for READ/READ_EX chunks.
        read_data: Option<Vec<u8>>,
    },
    /// An entire memory access completed; the driver may collect it.
    CompleteMemoryAccess {
        /// The completed access.
        access_id: u32,
    },
    /// A coherence message reached the L2 controller after its contention
    /// delay.
    L2CacheAccess {
        /// Core the message came from.
        sender: CoreId,
        /// The message.
        msg: ShmemMsg,
    },
    /// A coherence message reached the directory controller after its
    /// contention delay.
    DirectoryAccess {
        /// Core the message came from.
        sender: CoreId,
        /// The message.
        msg: ShmemMsg,
    },
    /// The directory finished a request; charge contention for the next
    /// queued request on this address.
    DirectoryScheduleNextReq {
        /// Block-aligned address whose queue advances.
        address: u64,
    },
    /// The next queued directory request takes effect.
    DirectoryHandleNextReq {
        /// Block-aligned address whose queue advances.
        address: u64,
    },
    /// A raw packet arrived at its destination core.
    RawPacketArrival {
        /// The packet, still carrying sender-domain timestamps.
        packet: NetPacket,
    },
    /// A modeling message (flit or buffer-management) arrived at a network
    /// node or at the receiving core interface.
    ModelingMsgArrival {
        /// Logical network the message belongs to.
        network: StaticNetwork,
        /// The message.
        msg: ModelingMsg,
    },
    /// A clock-skew quantum boundary was crossed; used by tests and the
    /// synthetic driver to re-enter the synchronization client.
    ClockSkewTick,
}

/// One scheduled event.
#[derive(Debug)]
pub struct Event {
    /// Simulated time at which the event fires, in the destination core's
    /// frequency domain.
    pub time: Time,
    /// Core whose ordered stream this event joins.
    pub core_id: CoreId,
    /// Typed arguments.
    pub payload: EventPayload,
    seq: u64,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest time first; FIFO (insertion sequence) among ties.
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Ordered discrete-event queue.
///
/// A single min-heap keyed by `(time, insertion sequence)` serializes all
/// cores: per-core ORDERED semantics fall out of the global order, and
/// same-time events preserve insertion order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<std::cmp::Reverse<Event>>,
    next_seq: u64,
    processed: u64,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event for in-order execution on a core.
    ///
    /// # Arguments
    ///
    /// * `time` - Fire time in the destination core's frequency domain.
    /// * `core_id` - Destination core.
    /// * `payload` - Typed event arguments.
    pub fn process_in_order(&mut self, time: Time, core_id: CoreId, payload: EventPayload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(std::cmp::Reverse(Event {
            time,
            core_id,
            payload,
            seq,
        }));
    }

    /// Removes and returns the earliest pending event, if any.
    pub fn pop(&mut self) -> Option<Event> {
        let event = self.heap.pop().map(|r| r.0);
        if event.is_some() {
            self.processed += 1;
        }
        event
    }

    /// Returns the fire time of the earliest pending event.
    pub fn peek_time(&self) -> Option<Time> {
        self.heap.peek().map(|r| r.0.time)
    }

    /// Returns whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns the number of events executed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order_with_fifo_ties() {
        let mut queue = EventQueue::new();
        queue.process_in_order(20, 0, EventPayload::ClockSkewTick);
        queue.process_in_order(10, 0, EventPayload::CompleteMemoryAccess { access_id: 1 });
        queue.process_in_order(10, 0, EventPayload::CompleteMemoryAccess { access_id: 2 });

        let first = queue.pop().unwrap();
        assert_eq!(first.time, 10);
        assert!(matches!(
            first.payload,
            EventPayload::CompleteMemoryAccess { access_id: 1 }
        ));
        let second = queue.pop().unwrap();
        assert!(matches!(
            second.payload,
            EventPayload::CompleteMemoryAccess { access_id: 2 }
        ));
        assert_eq!(queue.pop().unwrap().time, 20);
        assert!(queue.pop().is_none());
    }
}
