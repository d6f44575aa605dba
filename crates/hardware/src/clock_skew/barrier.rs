//! Quantum-barrier clock synchronization server.
//!
//! Simulated time is divided into quanta of a configured size. The server
//! records each core's most recent reported time and whether it has reached
//! the current barrier. Once every running core has reported a time at or
//! past the next barrier, the barrier advances by one quantum and the cores
//! whose recorded time falls below the new barrier are released. If no core
//! would be released the barrier keeps advancing a quantum at a time until
//! forward progress exists. A core that is not currently running counts as
//! barrier-passed.

use crate::common::{CoreId, SimError, Time};
use crate::core::CoreState;

/// What a barrier report produced.
#[derive(Debug, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// The reporting core (and possibly others) may continue.
    Release(Vec<CoreId>),
    /// The reporting core must wait at the barrier.
    Wait,
}

/// The barrier server.
#[derive(Debug)]
pub struct BarrierServer {
    barrier_interval: Time,
    next_barrier_time: Time,
    num_cores: u32,
    local_clock_list: Vec<Time>,
    barrier_acquire_list: Vec<bool>,
}

impl BarrierServer {
    /// Creates the server.
    ///
    /// # Arguments
    ///
    /// * `quantum` - Simulated cycles between barriers.
    /// * `num_cores` - Number of participating cores.
    pub fn new(quantum: Time, num_cores: u32) -> Self {
        Self {
            barrier_interval: quantum,
            next_barrier_time: quantum,
            num_cores,
            local_clock_list: vec![0; num_cores as usize],
            barrier_acquire_list: vec![false; num_cores as usize],
        }
    }

    /// Returns the time of the next barrier.
    pub fn next_barrier_time(&self) -> Time {
        self.next_barrier_time
    }

    /// A core reports reaching simulated time `time`.
    ///
    /// # Arguments
    ///
    /// * `core_id` - The reporting core.
    /// * `time` - Its simulated clock.
    /// * `core_states` - Current run state of every core.
    ///
    /// # Returns
    ///
    /// The released cores (possibly just the reporter, if it has not yet
    /// reached the barrier), or `Wait`.
    pub fn barrier_wait(
        &mut self,
        core_id: CoreId,
        time: Time,
        core_states: &[CoreState],
    ) -> Result<BarrierOutcome, SimError> {
        let state = core_states[core_id as usize];
        if state != CoreState::Running && state != CoreState::Initializing {
            return Err(SimError::State(format!(
                "core {core_id} reported a barrier in state {state:?} at time {time}"
            )));
        }

        if time < self.next_barrier_time {
            // Not at the barrier yet; continue immediately.
            return Ok(BarrierOutcome::Release(vec![core_id]));
        }

        self.local_clock_list[core_id as usize] = time;
        self.barrier_acquire_list[core_id as usize] = true;

        if self.is_barrier_reached(core_states)? {
            Ok(BarrierOutcome::Release(self.barrier_release()))
        } else {
            Ok(BarrierOutcome::Wait)
        }
    }

    /// Returns whether every running core has reached the barrier (and at
    /// least one actually reported past it).
    fn is_barrier_reached(&self, core_states: &[CoreState]) -> Result<bool, SimError> {
        let mut single_core_reached = false;
        for core_id in 0..self.num_cores as usize {
            if self.local_clock_list[core_id] < self.next_barrier_time {
                if core_states[core_id] == CoreState::Running {
                    // A running core has not reached the barrier yet.
                    return Ok(false);
                }
            } else {
                let state = core_states[core_id];
                if state != CoreState::Running && state != CoreState::Initializing {
                    return Err(SimError::State(format!(
                        "core {core_id} passed the barrier in state {state:?}"
                    )));
                }
                single_core_reached = true;
            }
        }
        Ok(single_core_reached)
    }

    /// Advances the barrier until at least one waiting core is released and
    /// returns the released cores.
    fn barrier_release(&mut self) -> Vec<CoreId> {
        let mut released = Vec::new();
        while released.is_empty() {
            self.next_barrier_time += self.barrier_interval;
            for core_id in 0..self.num_cores as usize {
                if self.local_clock_list[core_id] < self.next_barrier_time
                    && self.barrier_acquire_list[core_id]
                {
                    self.barrier_acquire_list[core_id] = false;
                    released.push(core_id as CoreId);
                }
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(n: usize) -> Vec<CoreState> {
        vec![CoreState::Running; n]
    }

    #[test]
    fn early_reporter_is_released_immediately() {
        let mut server = BarrierServer::new(1000, 2);
        let outcome = server.barrier_wait(0, 500, &running(2)).unwrap();
        assert_eq!(outcome, BarrierOutcome::Release(vec![0]));
    }

    #[test]
    fn last_arriving_core_releases_the_barrier() {
        let mut server = BarrierServer::new(1000, 2);
        assert_eq!(
            server.barrier_wait(0, 1200, &running(2)).unwrap(),
            BarrierOutcome::Wait
        );
        let outcome = server.barrier_wait(1, 1100, &running(2)).unwrap();
        let BarrierOutcome::Release(mut released) = outcome else {
            panic!("expected release");
        };
        released.sort_unstable();
        assert_eq!(released, vec![0, 1]);
        assert_eq!(server.next_barrier_time(), 2000);
    }

    #[test]
    fn barrier_keeps_advancing_until_someone_is_released() {
        let mut server = BarrierServer::new(1000, 2);
        // Both cores are far past several barriers.
        assert_eq!(
            server.barrier_wait(0, 5500, &running(2)).unwrap(),
            BarrierOutcome::Wait
        );
        let outcome = server.barrier_wait(1, 4200, &running(2)).unwrap();
        let BarrierOutcome::Release(released) = outcome else {
            panic!("expected release");
        };
        // Quanta advance until 5000 < next barrier, releasing core 1 first.
        assert_eq!(released, vec![1]);
        assert_eq!(server.next_barrier_time(), 5000);
    }

    #[test]
    fn sleeping_reporter_is_a_state_error() {
        let mut server = BarrierServer::new(1000, 2);
        let states = vec![CoreState::Sleeping, CoreState::Running];
        assert!(matches!(
            server.barrier_wait(0, 1200, &states),
            Err(SimError::State(_))
        ));
    }

    #[test]
    fn stalled_core_counts_as_barrier_passed() {
        let mut server = BarrierServer::new(1000, 2);
        let states = vec![CoreState::Running, CoreState::Idle];
        let outcome = server.barrier_wait(0, 1500, &states).unwrap();
        assert_eq!(outcome, BarrierOutcome::Release(vec![0]));
    }
}
