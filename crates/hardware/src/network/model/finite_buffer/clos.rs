//! Finite-buffer three-stage Clos topology.
//!
//! An (m, n, r) Clos: r ingress routers with m core-facing ports each, n
//! middle routers, and r egress routers. Every packet makes exactly three
//! router hops: its group's ingress router, a uniformly random middle
//! router (load balancing), and the fixed egress router of the destination
//! group. Routers are mapped onto cores by convention: ingress router `i`
//! on core `i*m`, middle router `k` on core `k*(N/n) + 1`, egress router
//! `i` on core `i*m + m - 1`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{BROADCAST_CORE_ID, CoreId, RouterId, SimError};
use crate::config::{BufferManagementScheme, ClosConfig, FiniteBufferNetConfig};
use crate::network::components::{
    ChannelSpec, Endpoint, Flit, LinkPerformanceModel, NetworkNode, RouterPerformanceModel,
    RouterPowerModel,
};
use crate::network::model::finite_buffer::FiniteBufferTopology;
use crate::network::node_index::{
    CLOS_EGRESS, CLOS_INGRESS, CLOS_MIDDLE, CORE_INTERFACE, NET_PACKET_INJECTOR,
};

/// Core hosting ingress router `i`.
pub fn ingress_core_id(clos: &ClosConfig, i: u32) -> CoreId {
    (i * clos.num_router_ports) as CoreId
}

/// Core hosting middle router `k`.
pub fn middle_core_id(clos: &ClosConfig, k: u32) -> CoreId {
    let total = clos.num_router_ports * clos.num_in_routers;
    (k * (total / clos.num_mid_routers) + 1) as CoreId
}

/// Core hosting egress router `i`.
pub fn egress_core_id(clos: &ClosConfig, i: u32) -> CoreId {
    (i * clos.num_router_ports + clos.num_router_ports - 1) as CoreId
}

/// The Clos topology for one core.
#[derive(Debug)]
pub struct ClosTopology {
    core_id: CoreId,
    clos: ClosConfig,
    net_cfg: FiniteBufferNetConfig,
    rng: StdRng,
}

impl ClosTopology {
    /// Creates the topology helper for one core.
    pub fn new(
        core_id: CoreId,
        clos: ClosConfig,
        net_cfg: FiniteBufferNetConfig,
    ) -> Result<Self, SimError> {
        if clos.num_router_ports == 0 || clos.num_in_routers == 0 || clos.num_mid_routers == 0 {
            return Err(SimError::config("clos dimensions must be positive"));
        }
        let total = clos.num_router_ports * clos.num_in_routers;
        if total % clos.num_mid_routers != 0 {
            return Err(SimError::config(format!(
                "clos core count ({total}) not divisible by num_mid_routers ({})",
                clos.num_mid_routers
            )));
        }
        Ok(Self {
            core_id,
            clos,
            net_cfg,
            rng: StdRng::seed_from_u64(core_id as u64),
        })
    }

    fn spec(&self) -> ChannelSpec {
        ChannelSpec::new(
            self.net_cfg.buffer_management_scheme,
            self.net_cfg.router.input_buffer_size,
        )
    }

    fn link(&self) -> Option<LinkPerformanceModel> {
        Some(LinkPerformanceModel::electrical(
            &self.net_cfg.link,
            self.net_cfg.link.length,
        ))
    }

    fn build_node(
        &self,
        index: i32,
        inputs: Vec<(ChannelSpec, RouterId)>,
        outputs: Vec<(ChannelSpec, RouterId, Option<LinkPerformanceModel>)>,
    ) -> NetworkNode {
        let input_specs: Vec<ChannelSpec> = inputs.iter().map(|(s, _)| *s).collect();
        let output_specs: Vec<ChannelSpec> = outputs.iter().map(|(s, _, _)| *s).collect();
        let input_map: Vec<Vec<RouterId>> = inputs.into_iter().map(|(_, r)| vec![r]).collect();
        let mut output_map = Vec::new();
        let mut links = Vec::new();
        for (_, router, link) in outputs {
            output_map.push(vec![router]);
            links.push(link);
        }
        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &input_specs,
            &output_specs,
        );
        NetworkNode::new(
            RouterId::new(self.core_id, index),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )
    }
}

impl FiniteBufferTopology for ClosTopology {
    fn build_nodes(&self) -> Result<Vec<NetworkNode>, SimError> {
        let clos = &self.clos;
        let mut nodes = Vec::new();

        // Ingress router: one input per group member's injector, one output
        // per middle router.
        for i in 0..clos.num_in_routers {
            if ingress_core_id(clos, i) != self.core_id {
                continue;
            }
            let inputs = (0..clos.num_router_ports)
                .map(|j| {
                    let member = (i * clos.num_router_ports + j) as CoreId;
                    (self.spec(), RouterId::new(member, NET_PACKET_INJECTOR))
                })
                .collect();
            let outputs = (0..clos.num_mid_routers)
                .map(|k| {
                    (
                        self.spec(),
                        RouterId::new(middle_core_id(clos, k), CLOS_MIDDLE),
                        self.link(),
                    )
                })
                .collect();
            nodes.push(self.build_node(CLOS_INGRESS, inputs, outputs));
        }

        // Middle router: inputs from every ingress, outputs to every egress.
        for k in 0..clos.num_mid_routers {
            if middle_core_id(clos, k) != self.core_id {
                continue;
            }
            let inputs = (0..clos.num_in_routers)
                .map(|i| {
                    (
                        self.spec(),
                        RouterId::new(ingress_core_id(clos, i), CLOS_INGRESS),
                    )
                })
                .collect();
            let outputs = (0..clos.num_in_routers)
                .map(|i| {
                    (
                        self.spec(),
                        RouterId::new(egress_core_id(clos, i), CLOS_EGRESS),
                        self.link(),
                    )
                })
                .collect();
            nodes.push(self.build_node(CLOS_MIDDLE, inputs, outputs));
        }

        // Egress router: inputs from every middle, one output per group
        // member's core interface.
        for i in 0..clos.num_in_routers {
            if egress_core_id(clos, i) != self.core_id {
                continue;
            }
            let inputs = (0..clos.num_mid_routers)
                .map(|k| {
                    (
                        self.spec(),
                        RouterId::new(middle_core_id(clos, k), CLOS_MIDDLE),
                    )
                })
                .collect();
            let outputs = (0..clos.num_router_ports)
                .map(|j| {
                    let member = (i * clos.num_router_ports + j) as CoreId;
                    (
                        ChannelSpec::new(BufferManagementScheme::Infinite, 0),
                        RouterId::new(member, CORE_INTERFACE),
                        self.link(),
                    )
                })
                .collect();
            nodes.push(self.build_node(CLOS_EGRESS, inputs, outputs));
        }

        Ok(nodes)
    }

    fn ingress_router_id(&self) -> RouterId {
        let group = self.core_id as u32 / self.clos.num_router_ports;
        RouterId::new(ingress_core_id(&self.clos, group), CLOS_INGRESS)
    }

    fn compute_output_endpoint_list(
        &mut self,
        flit: &Flit,
        node: &NetworkNode,
    ) -> Result<Vec<Endpoint>, SimError> {
        if flit.receiver == BROADCAST_CORE_ID {
            return Err(SimError::protocol("the clos network does not broadcast"));
        }
        let clos = &self.clos;
        let next = match node.router_id().index {
            CLOS_INGRESS => {
                let k = self.rng.gen_range(0..clos.num_mid_routers);
                RouterId::new(middle_core_id(clos, k), CLOS_MIDDLE)
            }
            CLOS_MIDDLE => {
                let group = flit.receiver as u32 / clos.num_router_ports;
                RouterId::new(egress_core_id(clos, group), CLOS_EGRESS)
            }
            CLOS_EGRESS => RouterId::new(flit.receiver, CORE_INTERFACE),
            other => {
                return Err(SimError::protocol(format!(
                    "clos flit at unexpected node index {other}"
                )));
            }
        };
        Ok(vec![node.output_endpoint_of(next)?])
    }
}
