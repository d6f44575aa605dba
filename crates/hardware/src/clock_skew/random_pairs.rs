//! Random-pairs clock synchronization client.
//!
//! Every quantum of its own clock, a core picks a uniform peer and sends a
//! `REQ` carrying its time over the system network. The peer compares:
//! - peer far ahead: replies `ACK(delta)`, telling the initiator to wait
//!   that many cycles;
//! - clocks within the slack: replies `ACK(0)`;
//! - peer far behind: replies `ACK(0)` and self-queues a `WAIT(delta)` to
//!   rate-limit itself.
//!
//! Waits convert to wall-clock sleeps proportional to the observed
//! wall-time-per-simulated-cycle, scaled by the configured sleep fraction
//! and capped at one second. Sleeping goes through an injectable
//! [`Sleeper`] so tests can record instead of sleeping.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::common::{CoreId, SimError, Time};
use crate::config::RandomPairsConfig;
use crate::core::CoreState;

/// Longest wall-clock sleep per wait, in microseconds.
const MAX_SLEEP_MICROS: u64 = 1_000_000;

/// Wall-clock sleeping, injectable for tests.
pub trait Sleeper: Send {
    /// Sleeps for the given number of microseconds.
    fn sleep(&mut self, micros: u64);
}

/// The production sleeper.
#[derive(Debug, Default)]
pub struct WallClockSleeper;

impl Sleeper for WallClockSleeper {
    fn sleep(&mut self, micros: u64) {
        std::thread::sleep(std::time::Duration::from_micros(micros));
    }
}

/// Synchronization message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyncMsgType {
    /// Clock comparison request, carrying the initiator's time.
    Req = 0,
    /// Acknowledgement, carrying the cycles the initiator must wait.
    Ack = 1,
    /// Self-queued rate-limiting marker.
    Wait = 2,
}

/// One synchronization message.
#[derive(Debug, Clone, Copy)]
pub struct SyncMsg {
    /// Originating core.
    pub sender: CoreId,
    /// Message type.
    pub msg_type: SyncMsgType,
    /// Time payload (initiator clock for REQ, wait cycles for ACK/WAIT).
    pub time: Time,
}

impl SyncMsg {
    /// Serializes to the `{msg_type:u32, time:u64}` wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&(self.msg_type as u32).to_le_bytes());
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf
    }

    /// Deserializes from the wire form.
    pub fn from_bytes(sender: CoreId, buf: &[u8]) -> Result<Self, SimError> {
        if buf.len() != 12 {
            return Err(SimError::Length {
                expected: 12,
                actual: buf.len() as u32,
            });
        }
        let msg_type = match u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) {
            0 => SyncMsgType::Req,
            1 => SyncMsgType::Ack,
            2 => SyncMsgType::Wait,
            other => {
                return Err(SimError::protocol(format!(
                    "unrecognized sync msg type {other}"
                )));
            }
        };
        let time = u64::from_le_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);
        Ok(Self {
            sender,
            msg_type,
            time,
        })
    }
}

/// The per-core random-pairs client.
pub struct RandomPairsSyncClient {
    core_id: CoreId,
    num_cores: u32,
    slack: Time,
    quantum: Time,
    sleep_fraction: f64,
    enabled: bool,
    last_sync_time: Time,
    awaiting_ack: bool,
    msg_queue: Vec<SyncMsg>,
    rng: StdRng,
    start_wall_clock: Instant,
    sleeper: Box<dyn Sleeper>,
    total_wait_cycles: u64,
}

impl std::fmt::Debug for RandomPairsSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomPairsSyncClient")
            .field("core_id", &self.core_id)
            .field("last_sync_time", &self.last_sync_time)
            .field("awaiting_ack", &self.awaiting_ack)
            .finish_non_exhaustive()
    }
}

impl RandomPairsSyncClient {
    /// Creates the client for one core.
    pub fn new(config: &RandomPairsConfig, core_id: CoreId, num_cores: u32) -> Self {
        Self {
            core_id,
            num_cores,
            slack: config.slack,
            quantum: config.quantum,
            sleep_fraction: config.sleep_fraction,
            enabled: false,
            last_sync_time: 0,
            awaiting_ack: false,
            msg_queue: Vec::new(),
            rng: StdRng::seed_from_u64(1),
            start_wall_clock: Instant::now(),
            sleeper: Box::new(WallClockSleeper),
            total_wait_cycles: 0,
        }
    }

    /// Replaces the sleeper (test hook).
    pub fn set_sleeper(&mut self, sleeper: Box<dyn Sleeper>) {
        self.sleeper = sleeper;
    }

    /// Enables the client.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.start_wall_clock = Instant::now();
    }

    /// Disables the client.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Resets the client's state.
    pub fn reset(&mut self) {
        self.last_sync_time = 0;
        self.awaiting_ack = false;
        self.msg_queue.clear();
        self.start_wall_clock = Instant::now();
    }

    /// Returns whether an ACK is outstanding; the initiating core must not
    /// make progress until it arrives.
    pub fn awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Returns the total cycles this core was told (or told itself) to
    /// wait.
    pub fn total_wait_cycles(&self) -> u64 {
        self.total_wait_cycles
    }

    /// Called at an access boundary with the core's current global-clock
    /// time.
    ///
    /// # Returns
    ///
    /// The peer and REQ message to send, when a quantum has elapsed.
    pub fn synchronize(&mut self, curr_time: Time) -> Option<(CoreId, SyncMsg)> {
        if !self.enabled || self.awaiting_ack {
            return None;
        }
        if curr_time.saturating_sub(self.last_sync_time) < self.quantum {
            return None;
        }
        self.last_sync_time = (curr_time / self.quantum) * self.quantum;

        // Uniform peer at offset 1..=(N-1)/2.
        let max_offset = ((self.num_cores - 1) / 2).max(1);
        let offset = self.rng.gen_range(1..=max_offset) as CoreId;
        let receiver = (self.core_id + offset) % self.num_cores as CoreId;

        debug!(core = self.core_id, receiver, curr_time, "sync req");
        self.awaiting_ack = true;
        Some((
            receiver,
            SyncMsg {
                sender: self.core_id,
                msg_type: SyncMsgType::Req,
                time: curr_time,
            },
        ))
    }

    /// Handles an incoming synchronization message.
    ///
    /// # Arguments
    ///
    /// * `msg` - The message.
    /// * `curr_time` - This core's current global-clock time.
    /// * `state` - This core's run state.
    ///
    /// # Returns
    ///
    /// A reply to send back, if any.
    pub fn process_sync_msg(
        &mut self,
        msg: SyncMsg,
        curr_time: Time,
        state: CoreState,
    ) -> Result<Option<(CoreId, SyncMsg)>, SimError> {
        match (state, msg.msg_type) {
            (CoreState::Running, SyncMsgType::Req) => {
                Ok(Some(self.process_sync_req(&msg, curr_time, false)))
            }
            (CoreState::Running, SyncMsgType::Ack) => {
                self.msg_queue.push(msg);
                if self.awaiting_ack {
                    self.finish_synchronization(curr_time)?;
                }
                Ok(None)
            }
            (CoreState::Sleeping, SyncMsgType::Req) => {
                // A sleeping peer still answers, but never re-queues a WAIT
                // against itself.
                Ok(Some(self.process_sync_req(&msg, curr_time, true)))
            }
            (_, SyncMsgType::Req) => {
                // Never synchronize against a non-running core.
                Ok(Some((
                    msg.sender,
                    SyncMsg {
                        sender: self.core_id,
                        msg_type: SyncMsgType::Ack,
                        time: 0,
                    },
                )))
            }
            (state, other) => Err(SimError::protocol(format!(
                "sync msg {other:?} from core {} in state {state:?}",
                msg.sender
            ))),
        }
    }

    fn process_sync_req(
        &mut self,
        msg: &SyncMsg,
        curr_time: Time,
        sleeping: bool,
    ) -> (CoreId, SyncMsg) {
        let wait = if curr_time > msg.time + self.slack {
            // We are ahead: let the peer continue and rate-limit ourselves.
            if !sleeping {
                self.msg_queue.push(SyncMsg {
                    sender: self.core_id,
                    msg_type: SyncMsgType::Wait,
                    time: curr_time - msg.time,
                });
            }
            0
        } else if curr_time + self.slack >= msg.time {
            0
        } else {
            msg.time - curr_time
        };
        (
            msg.sender,
            SyncMsg {
                sender: self.core_id,
                msg_type: SyncMsgType::Ack,
                time: wait,
            },
        )
    }

    /// The awaited ACK arrived: fold in any queued WAITs and sleep.
    fn finish_synchronization(&mut self, curr_time: Time) -> Result<(), SimError> {
        let mut ack_present = false;
        let mut max_wait_time = 0;
        for msg in &self.msg_queue {
            match msg.msg_type {
                SyncMsgType::Ack => ack_present = true,
                SyncMsgType::Wait => {}
                SyncMsgType::Req => {
                    return Err(SimError::protocol("REQ queued in the sync msg list"));
                }
            }
            max_wait_time = max_wait_time.max(msg.time);
        }
        if !ack_present {
            return Err(SimError::protocol("sync msg list finished without an ACK"));
        }
        self.msg_queue.clear();
        self.awaiting_ack = false;
        self.goto_sleep(max_wait_time, curr_time);
        Ok(())
    }

    fn goto_sleep(&mut self, sleep_cycles: Time, curr_time: Time) {
        if sleep_cycles == 0 {
            return;
        }
        self.total_wait_cycles += sleep_cycles;

        let elapsed_wall_micros = self.start_wall_clock.elapsed().as_micros() as u64;
        let elapsed_simulated = curr_time.max(1);
        let wall_per_cycle = elapsed_wall_micros as f64 / elapsed_simulated as f64;
        let sleep_micros =
            ((self.sleep_fraction * wall_per_cycle * sleep_cycles as f64) as u64)
                .min(MAX_SLEEP_MICROS);
        debug!(
            core = self.core_id,
            sleep_cycles, sleep_micros, "rate-limit sleep"
        );
        self.sleeper.sleep(sleep_micros);
    }
}
