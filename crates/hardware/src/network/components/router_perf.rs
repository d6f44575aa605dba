//! Router timing model: buffered flow control over finite input buffers.
//!
//! The model walks flits through the router's five logical stages: input
//! buffer write, route lookup (done by the topology before the flit enters),
//! switch allocation (one grant per output channel per cycle, with the
//! output held for a whole packet under wormhole), crossbar traversal (the
//! data pipeline delay), and link traversal (added by the owning node).
//!
//! Downstream buffer state is tracked per output endpoint:
//! - **Infinite** never blocks.
//! - **Credit** keeps the multiset of times at which downstream slots free
//!   up; a flit consumes as many credits as it has phits.
//! - **On/off** keeps the latest threshold notification.
//!
//! A flit that cannot proceed stays queued; arriving credits re-run the
//! drain loop, so progress resumes exactly when the blocking state clears.

use std::collections::VecDeque;

use crate::common::Time;
use crate::config::{BufferManagementScheme, FlowControlScheme};
use crate::network::components::channel::Endpoint;
use crate::network::components::flit::{BufferMsg, BufferMsgKind, Flit};

/// Shape of one channel: its buffer discipline and endpoint fan-out.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec {
    /// Buffer discipline of the (downstream) buffer behind this channel.
    pub scheme: BufferManagementScheme,
    /// Buffer size in flits; ignored for the infinite discipline.
    pub size: u32,
    /// Endpoint count of the channel.
    pub num_endpoints: u32,
}

impl ChannelSpec {
    /// A channel with `scheme`-managed buffers of `size` flits and one
    /// endpoint.
    pub fn new(scheme: BufferManagementScheme, size: u32) -> Self {
        Self {
            scheme,
            size,
            num_endpoints: 1,
        }
    }

    /// Same, with an explicit endpoint count.
    pub fn with_endpoints(scheme: BufferManagementScheme, size: u32, num_endpoints: u32) -> Self {
        Self {
            scheme,
            size,
            num_endpoints,
        }
    }
}

#[derive(Debug)]
struct InputBuffer {
    queue: VecDeque<Flit>,
    /// Output endpoints reserved by the in-flight packet's HEAD.
    route: Option<Vec<Endpoint>>,
    occupancy: u32,
    scheme: BufferManagementScheme,
    size: u32,
}

#[derive(Debug)]
enum BufferTracker {
    Infinite,
    Credit {
        /// Times at which downstream slots free up, ascending.
        free_times: Vec<Time>,
    },
    OnOff {
        on: bool,
        since: Time,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct OutputAllocator {
    free_time: Time,
    /// Input (channel, endpoint) holding this output mid-packet.
    owner: Option<(usize, usize)>,
}

/// Messages produced while the router processed one input message.
#[derive(Debug, Default)]
pub struct RouterOutput {
    /// Outgoing flits with the route endpoint each copy takes.
    pub data: Vec<(Flit, Endpoint)>,
    /// Upstream notifications: (input channel, input endpoint, message).
    pub upstream: Vec<(usize, usize, BufferMsg)>,
    /// Phit counts of the flits that left their input buffers, for
    /// activity accounting.
    pub forwarded_phits: Vec<u32>,
}

/// Timing model of one router.
#[derive(Debug)]
pub struct RouterPerformanceModel {
    flow_control_scheme: FlowControlScheme,
    data_pipeline_delay: Time,
    credit_pipeline_delay: Time,
    input_buffers: Vec<Vec<InputBuffer>>,
    downstream_trackers: Vec<Vec<BufferTracker>>,
    allocators: Vec<OutputAllocator>,
    total_contention_delay: u64,
    num_flits_forwarded: u64,
}

impl RouterPerformanceModel {
    /// Creates the model.
    ///
    /// # Arguments
    ///
    /// * `flow_control_scheme` - Buffered flow-control scheme.
    /// * `data_pipeline_delay` - Cycles added to each forwarded flit.
    /// * `credit_pipeline_delay` - Cycles added to each received credit.
    /// * `inputs` - One spec per input channel (its own buffers).
    /// * `outputs` - One spec per output channel (the downstream buffers).
    pub fn new(
        flow_control_scheme: FlowControlScheme,
        data_pipeline_delay: Time,
        credit_pipeline_delay: Time,
        inputs: &[ChannelSpec],
        outputs: &[ChannelSpec],
    ) -> Self {
        let input_buffers = inputs
            .iter()
            .map(|spec| {
                (0..spec.num_endpoints)
                    .map(|_| InputBuffer {
                        queue: VecDeque::new(),
                        route: None,
                        occupancy: 0,
                        scheme: spec.scheme,
                        size: spec.size,
                    })
                    .collect()
            })
            .collect();
        let downstream_trackers = outputs
            .iter()
            .map(|spec| {
                (0..spec.num_endpoints)
                    .map(|_| match spec.scheme {
                        BufferManagementScheme::Infinite => BufferTracker::Infinite,
                        BufferManagementScheme::Credit => BufferTracker::Credit {
                            free_times: vec![0; spec.size as usize],
                        },
                        BufferManagementScheme::OnOff => BufferTracker::OnOff {
                            on: true,
                            since: 0,
                        },
                    })
                    .collect()
            })
            .collect();
        Self {
            flow_control_scheme,
            data_pipeline_delay,
            credit_pipeline_delay,
            input_buffers,
            downstream_trackers,
            allocators: vec![OutputAllocator::default(); outputs.len()],
            total_contention_delay: 0,
            num_flits_forwarded: 0,
        }
    }

    /// Returns the credit pipeline delay.
    pub fn credit_pipeline_delay(&self) -> Time {
        self.credit_pipeline_delay
    }

    /// A flit arrived on `input`; buffer it and drain what can move.
    pub fn process_data_msg(&mut self, mut flit: Flit, input: Endpoint, out: &mut RouterOutput) {
        // Store-and-forward holds the packet until it has fully arrived.
        if self.flow_control_scheme == FlowControlScheme::StoreAndForward && flit.kind.is_head() {
            let fill = u64::from(flit.num_phits.saturating_sub(1));
            flit.normalized_time += fill;
            flit.zero_load_delay += fill;
        }

        let buffer = &mut self.input_buffers[input.channel_id as usize][input.index as usize];
        let arrival = flit.normalized_time;
        let was_below = buffer.occupancy < buffer.size;
        buffer.occupancy += flit.num_phits;
        // Credits bound the sender: a credit-managed buffer can never be
        // overfilled.
        debug_assert!(
            buffer.scheme != BufferManagementScheme::Credit || buffer.occupancy <= buffer.size,
            "credit-managed buffer overfilled: {} > {}",
            buffer.occupancy,
            buffer.size
        );
        buffer.queue.push_back(flit);

        if buffer.scheme == BufferManagementScheme::OnOff
            && was_below
            && buffer.occupancy >= buffer.size
        {
            out.upstream.push((
                input.channel_id as usize,
                input.index as usize,
                BufferMsg {
                    normalized_time: arrival,
                    kind: BufferMsgKind::OnOff { on: false },
                },
            ));
        }

        self.drain(out);
    }

    /// A buffer notification arrived for `output_endpoint`; apply and drain.
    pub fn process_buffer_msg(
        &mut self,
        output_endpoint: Endpoint,
        msg: &BufferMsg,
        out: &mut RouterOutput,
    ) {
        let tracker = &mut self.downstream_trackers[output_endpoint.channel_id as usize]
            [output_endpoint.index as usize];
        match (tracker, msg.kind) {
            (BufferTracker::Credit { free_times }, BufferMsgKind::Credit { num_credits }) => {
                for _ in 0..num_credits {
                    let pos = free_times.partition_point(|&t| t <= msg.normalized_time);
                    free_times.insert(pos, msg.normalized_time);
                }
            }
            (BufferTracker::OnOff { on, since }, BufferMsgKind::OnOff { on: new_on }) => {
                *on = new_on;
                *since = msg.normalized_time;
            }
            _ => {}
        }
        self.drain(out);
    }

    /// Forwards every flit that can currently move.
    fn drain(&mut self, out: &mut RouterOutput) {
        loop {
            let mut progress = false;
            for ch in 0..self.input_buffers.len() {
                for ep in 0..self.input_buffers[ch].len() {
                    while self.try_forward(ch, ep, out) {
                        progress = true;
                    }
                }
            }
            if !progress {
                break;
            }
        }
    }

    /// Attempts to forward the head flit of one input buffer.
    fn try_forward(&mut self, ch: usize, ep: usize, out: &mut RouterOutput) -> bool {
        let Some(front) = self.input_buffers[ch][ep].queue.front() else {
            return false;
        };
        let needed = front.num_phits;
        let arrival = front.normalized_time;
        let is_head = front.kind.is_head();
        let is_tail = front.kind.is_tail();

        let route: Vec<Endpoint> = if is_head {
            match &front.output_endpoint_list {
                Some(route) => route.clone(),
                None => return false,
            }
        } else {
            match &self.input_buffers[ch][ep].route {
                Some(route) => route.clone(),
                None => return false,
            }
        };

        // Switch allocation: every involved output channel must be free
        // (or already held by this packet).
        let mut start = arrival;
        let mut channels: Vec<usize> = route.iter().map(|e| e.channel_id as usize).collect();
        channels.sort_unstable();
        channels.dedup();
        for &c in &channels {
            let allocator = self.allocators[c];
            if let Some(owner) = allocator.owner {
                if owner != (ch, ep) {
                    return false;
                }
            }
            start = start.max(allocator.free_time);
        }

        // Downstream buffers: all target endpoints must have room.
        for endpoint in &route {
            let trackers = &self.downstream_trackers[endpoint.channel_id as usize];
            let indices: Vec<usize> = if endpoint.is_all() {
                (0..trackers.len()).collect()
            } else {
                vec![endpoint.index as usize]
            };
            for idx in indices {
                match &trackers[idx] {
                    BufferTracker::Infinite => {}
                    BufferTracker::Credit { free_times } => {
                        if free_times.len() < needed as usize {
                            return false;
                        }
                        start = start.max(free_times[needed as usize - 1]);
                    }
                    BufferTracker::OnOff { on, since } => {
                        if !on {
                            return false;
                        }
                        start = start.max(*since);
                    }
                }
            }
        }

        // Commit: consume credits, grant the switch, pop the flit.
        for endpoint in &route {
            let trackers = &mut self.downstream_trackers[endpoint.channel_id as usize];
            let indices: Vec<usize> = if endpoint.is_all() {
                (0..trackers.len()).collect()
            } else {
                vec![endpoint.index as usize]
            };
            for idx in indices {
                if let BufferTracker::Credit { free_times } = &mut trackers[idx] {
                    free_times.drain(..needed as usize);
                }
            }
        }
        let hold = self.flow_control_scheme == FlowControlScheme::Wormhole && is_head && !is_tail;
        for &c in &channels {
            let allocator = &mut self.allocators[c];
            allocator.free_time = start + u64::from(needed);
            allocator.owner = if hold {
                Some((ch, ep))
            } else if is_tail {
                None
            } else {
                allocator.owner
            };
        }

        self.total_contention_delay += start - arrival;
        self.num_flits_forwarded += 1;
        out.forwarded_phits.push(needed);

        let buffer = &mut self.input_buffers[ch][ep];
        let mut flit = match buffer.queue.pop_front() {
            Some(flit) => flit,
            None => return false,
        };
        let was_full = buffer.occupancy >= buffer.size;
        buffer.occupancy -= needed;

        match buffer.scheme {
            BufferManagementScheme::Credit => {
                out.upstream.push((
                    ch,
                    ep,
                    BufferMsg {
                        normalized_time: start,
                        kind: BufferMsgKind::Credit {
                            num_credits: needed,
                        },
                    },
                ));
            }
            BufferManagementScheme::OnOff => {
                if was_full && buffer.occupancy < buffer.size {
                    out.upstream.push((
                        ch,
                        ep,
                        BufferMsg {
                            normalized_time: start,
                            kind: BufferMsgKind::OnOff { on: true },
                        },
                    ));
                }
            }
            BufferManagementScheme::Infinite => {}
        }

        if is_head && !is_tail {
            buffer.route = Some(route.clone());
        }
        if is_tail {
            buffer.route = None;
        }

        flit.normalized_time = start + self.data_pipeline_delay;
        flit.zero_load_delay += self.data_pipeline_delay;
        flit.output_endpoint_list = None;
        for endpoint in route {
            out.data.push((flit.clone(), endpoint));
        }
        true
    }

    /// Returns the average switch-allocation contention delay per flit.
    pub fn average_contention_delay(&self) -> f64 {
        if self.num_flits_forwarded == 0 {
            0.0
        } else {
            self.total_contention_delay as f64 / self.num_flits_forwarded as f64
        }
    }

    /// Returns the number of flits forwarded through this router.
    pub fn num_flits_forwarded(&self) -> u64 {
        self.num_flits_forwarded
    }

    /// Returns the occupancy of one input buffer, in phits (test hook).
    pub fn input_buffer_occupancy(&self, channel_id: usize, index: usize) -> u32 {
        self.input_buffers[channel_id][index].occupancy
    }
}
