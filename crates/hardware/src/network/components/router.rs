//! Network node: one router plus its links and channel mappings.
//!
//! A [`NetworkNode`] binds a router timing model to its position in the
//! topology: two mappings from channel coordinates to neighbor router ids
//! (one for inputs, one for outputs) and their inverses, the per-output
//! link models, and the activity counters. The node translates between
//! neighbor identities and channel endpoints, and performs the router and
//! link traversal accounting on everything the timing model emits.

use std::collections::HashMap;

use crate::common::{RouterId, SimError};
use crate::network::components::channel::Endpoint;
use crate::network::components::flit::{ModelingMsg, NetworkMsgKind};
use crate::network::components::link::LinkPerformanceModel;
use crate::network::components::power::RouterPowerModel;
use crate::network::components::router_perf::{RouterOutput, RouterPerformanceModel};

/// One network node.
#[derive(Debug)]
pub struct NetworkNode {
    id: RouterId,
    perf: RouterPerformanceModel,
    power: Option<RouterPowerModel>,
    /// Per-output-channel link models; `None` for zero-cost local hookups.
    links: Vec<Option<LinkPerformanceModel>>,
    input_map: Vec<Vec<RouterId>>,
    output_map: Vec<Vec<RouterId>>,
    input_endpoint_of: HashMap<RouterId, Endpoint>,
    output_endpoint_of: HashMap<RouterId, Endpoint>,
}

impl NetworkNode {
    /// Creates a node.
    ///
    /// # Arguments
    ///
    /// * `id` - This node's identity.
    /// * `perf` - Router timing model (channel counts must agree with the
    ///   mappings).
    /// * `power` - Activity counters; `None` for bookkeeping-only nodes.
    /// * `links` - Per-output-channel link models.
    /// * `input_map` - For each input channel, the neighbor at each
    ///   endpoint.
    /// * `output_map` - For each output channel, the neighbor at each
    ///   endpoint.
    pub fn new(
        id: RouterId,
        perf: RouterPerformanceModel,
        power: Option<RouterPowerModel>,
        links: Vec<Option<LinkPerformanceModel>>,
        input_map: Vec<Vec<RouterId>>,
        output_map: Vec<Vec<RouterId>>,
    ) -> Self {
        let mut input_endpoint_of = HashMap::new();
        for (ch, routers) in input_map.iter().enumerate() {
            for (idx, router) in routers.iter().enumerate() {
                input_endpoint_of.insert(*router, Endpoint::new(ch as i32, idx as i32));
            }
        }
        let mut output_endpoint_of = HashMap::new();
        for (ch, routers) in output_map.iter().enumerate() {
            for (idx, router) in routers.iter().enumerate() {
                output_endpoint_of.insert(*router, Endpoint::new(ch as i32, idx as i32));
            }
        }
        Self {
            id,
            perf,
            power,
            links,
            input_map,
            output_map,
            input_endpoint_of,
            output_endpoint_of,
        }
    }

    /// Returns this node's identity.
    pub fn router_id(&self) -> RouterId {
        self.id
    }

    /// Returns the output endpoint leading to `router`.
    pub fn output_endpoint_of(&self, router: RouterId) -> Result<Endpoint, SimError> {
        self.output_endpoint_of.get(&router).copied().ok_or_else(|| {
            SimError::protocol(format!("{:?} has no output toward {router:?}", self.id))
        })
    }

    /// Processes one modeling message and emits everything it triggers.
    pub fn process_modeling_msg(
        &mut self,
        kind: NetworkMsgKind,
        sender_router: RouterId,
        out_msgs: &mut Vec<ModelingMsg>,
    ) -> Result<(), SimError> {
        let mut rout = RouterOutput::default();
        match kind {
            NetworkMsgKind::Data(flit) => {
                let input = self
                    .input_endpoint_of
                    .get(&sender_router)
                    .copied()
                    .ok_or_else(|| {
                        SimError::protocol(format!(
                            "{:?} has no input from {sender_router:?}",
                            self.id
                        ))
                    })?;
                if let Some(power) = &mut self.power {
                    power.record_buffer_write(flit.num_phits);
                }
                self.perf.process_data_msg(flit, input, &mut rout);
            }
            NetworkMsgKind::BufferManagement(mut msg) => {
                let output = self.output_endpoint_of(sender_router)?;
                msg.normalized_time += self.perf.credit_pipeline_delay();
                self.perf.process_buffer_msg(output, &msg, &mut rout);
            }
        }
        self.emit(rout, out_msgs);
        Ok(())
    }

    /// Converts the timing model's output into addressed messages, charging
    /// link delays and activity counters along the way.
    fn emit(&mut self, rout: RouterOutput, out_msgs: &mut Vec<ModelingMsg>) {
        if let Some(power) = &mut self.power {
            for phits in &rout.forwarded_phits {
                power.record_buffer_read(*phits);
                power.record_switch_allocation();
            }
        }

        for (mut flit, endpoint) in rout.data {
            let ch = endpoint.channel_id as usize;
            if let Some(link) = &mut self.links[ch] {
                flit.normalized_time += link.delay();
                flit.zero_load_delay += link.delay();
            }
            let receivers: Vec<RouterId> = if endpoint.is_all() {
                self.output_map[ch].clone()
            } else {
                vec![self.output_map[ch][endpoint.index as usize]]
            };
            if let Some(power) = &mut self.power {
                power.record_crossbar_traversal(flit.num_phits, receivers.len() as u32);
            }
            for receiver in receivers {
                if let Some(link) = &mut self.links[ch] {
                    link.record_traversal();
                }
                out_msgs.push(ModelingMsg {
                    receiver_router: receiver,
                    sender_router: self.id,
                    kind: NetworkMsgKind::Data(flit.clone()),
                });
            }
        }

        for (in_ch, in_ep, msg) in rout.upstream {
            let upstream = self.input_map[in_ch][in_ep];
            out_msgs.push(ModelingMsg {
                receiver_router: upstream,
                sender_router: self.id,
                kind: NetworkMsgKind::BufferManagement(msg),
            });
        }
    }

    /// Returns the average contention delay per forwarded flit.
    pub fn average_contention_delay(&self) -> f64 {
        self.perf.average_contention_delay()
    }

    /// Returns the number of flits forwarded.
    pub fn num_flits_forwarded(&self) -> u64 {
        self.perf.num_flits_forwarded()
    }

    /// Returns the total link traversal count over all output channels.
    pub fn total_link_traversals(&self) -> u64 {
        self.links
            .iter()
            .flatten()
            .map(LinkPerformanceModel::num_traversals)
            .sum()
    }

    /// Returns the activity counters, if this node keeps them.
    pub fn power_counters(&self) -> Option<(u64, u64, u64, u64)> {
        self.power.as_ref().map(RouterPowerModel::counters)
    }

    /// Returns the router timing model (test hook).
    pub fn perf_model(&self) -> &RouterPerformanceModel {
        &self.perf
    }
}
