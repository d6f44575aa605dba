//! Single-server queueing-delay model.
//!
//! Models contention at a shared resource (cache port, directory slice,
//! DRAM channel, network injection port) that serves one request at a time.
//! The model tracks only the time at which the server becomes free; a new
//! request arriving earlier waits for that time, and every request occupies
//! the server for its processing time.

use crate::common::Time;

/// Single-server contention model.
#[derive(Debug, Default, Clone)]
pub struct QueueModelSimple {
    queue_time: Time,
    total_requests: u64,
    total_queue_delay: u64,
}

impl QueueModelSimple {
    /// Creates a model with an idle server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the queueing delay for a request and occupies the server.
    ///
    /// # Arguments
    ///
    /// * `event_time` - Arrival time of the request.
    /// * `processing_time` - Cycles the request holds the server.
    ///
    /// # Returns
    ///
    /// Cycles the request waits before service begins.
    pub fn compute_queue_delay(&mut self, event_time: Time, processing_time: Time) -> Time {
        let delay = self.queue_time.saturating_sub(event_time);
        self.queue_time = self.queue_time.max(event_time) + processing_time;

        self.total_requests += 1;
        self.total_queue_delay += delay;
        delay
    }

    /// Returns the average queueing delay over all requests so far.
    pub fn average_queue_delay(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_queue_delay as f64 / self.total_requests as f64
        }
    }

    /// Returns the number of requests served.
    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_server_has_no_delay() {
        let mut model = QueueModelSimple::new();
        assert_eq!(model.compute_queue_delay(100, 5), 0);
    }

    #[test]
    fn back_to_back_requests_queue_up() {
        let mut model = QueueModelSimple::new();
        assert_eq!(model.compute_queue_delay(100, 5), 0);
        // Server busy until 105; arriving at 101 waits 4.
        assert_eq!(model.compute_queue_delay(101, 5), 4);
        // Server busy until 110; arriving at 102 waits 8.
        assert_eq!(model.compute_queue_delay(102, 5), 8);
    }

    #[test]
    fn late_arrival_resets_the_server() {
        let mut model = QueueModelSimple::new();
        model.compute_queue_delay(0, 10);
        assert_eq!(model.compute_queue_delay(1000, 10), 0);
    }
}
