//! Finite-buffer electrical-mesh topology.
//!
//! Cores sit on a near-square grid; each owns one mesh router connected to
//! its (up to four) neighbors. Unicasts route deterministically in XY
//! order. Broadcasts, when the broadcast tree is enabled, flood along a
//! sender-rooted tree: every router forwards away from the sender's row,
//! and routers on the sender's row additionally forward away from the
//! sender's column and deliver locally at the sender's cell.

use crate::common::{BROADCAST_CORE_ID, CoreId, INVALID_CORE_ID, RouterId, SimError};
use crate::config::{BufferManagementScheme, FiniteBufferNetConfig};
use crate::network::components::{
    ChannelSpec, Endpoint, Flit, LinkPerformanceModel, NetworkNode, RouterPerformanceModel,
    RouterPowerModel,
};
use crate::network::model::emesh_dimensions;
use crate::network::model::finite_buffer::FiniteBufferTopology;
use crate::network::node_index::{CORE_INTERFACE, EMESH, NET_PACKET_INJECTOR};

/// The e-mesh topology for one core.
#[derive(Debug)]
pub struct EMeshTopology {
    core_id: CoreId,
    width: i32,
    height: i32,
    net_cfg: FiniteBufferNetConfig,
    broadcast_tree_enabled: bool,
}

impl EMeshTopology {
    /// Creates the topology helper for one core.
    pub fn new(
        core_id: CoreId,
        total_cores: u32,
        net_cfg: FiniteBufferNetConfig,
        broadcast_tree_enabled: bool,
    ) -> Self {
        let (width, height) = emesh_dimensions(total_cores);
        Self {
            core_id,
            width: width as i32,
            height: height as i32,
            net_cfg,
            broadcast_tree_enabled,
        }
    }

    fn position(&self, core_id: CoreId) -> (i32, i32) {
        (core_id % self.width, core_id / self.width)
    }

    fn core_id_at(&self, x: i32, y: i32) -> CoreId {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            INVALID_CORE_ID
        } else {
            y * self.width + x
        }
    }

    /// XY next hop toward `receiver` from `(cx, cy)`; the current core when
    /// already there.
    fn xy_next_hop(&self, cx: i32, cy: i32, receiver: CoreId) -> CoreId {
        let (dx, dy) = self.position(receiver);
        if cx > dx {
            self.core_id_at(cx - 1, cy)
        } else if cx < dx {
            self.core_id_at(cx + 1, cy)
        } else if cy > dy {
            self.core_id_at(cx, cy - 1)
        } else if cy < dy {
            self.core_id_at(cx, cy + 1)
        } else {
            self.core_id_at(cx, cy)
        }
    }
}

impl FiniteBufferTopology for EMeshTopology {
    fn build_nodes(&self) -> Result<Vec<NetworkNode>, SimError> {
        let scheme = self.net_cfg.buffer_management_scheme;
        let size = self.net_cfg.router.input_buffer_size;
        let (cx, cy) = self.position(self.core_id);

        // Channel 0 faces the core: flits enter from the injector and leave
        // toward the core interface.
        let mut inputs = vec![ChannelSpec::new(scheme, size)];
        let mut outputs = vec![ChannelSpec::new(BufferManagementScheme::Infinite, 0)];
        let mut input_map = vec![vec![RouterId::new(self.core_id, NET_PACKET_INJECTOR)]];
        let mut output_map = vec![vec![RouterId::new(self.core_id, CORE_INTERFACE)]];
        let mut links: Vec<Option<LinkPerformanceModel>> = vec![None];

        let deltas = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        for (dx, dy) in deltas {
            let neighbor = self.core_id_at(cx + dx, cy + dy);
            if neighbor == INVALID_CORE_ID {
                continue;
            }
            let neighbor_router = RouterId::new(neighbor, EMESH);
            inputs.push(ChannelSpec::new(scheme, size));
            outputs.push(ChannelSpec::new(scheme, size));
            input_map.push(vec![neighbor_router]);
            output_map.push(vec![neighbor_router]);
            links.push(Some(LinkPerformanceModel::electrical(
                &self.net_cfg.link,
                self.net_cfg.link.length,
            )));
        }

        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &inputs,
            &outputs,
        );
        Ok(vec![NetworkNode::new(
            RouterId::new(self.core_id, EMESH),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )])
    }

    fn ingress_router_id(&self) -> RouterId {
        RouterId::new(self.core_id, EMESH)
    }

    fn compute_output_endpoint_list(
        &mut self,
        flit: &Flit,
        node: &NetworkNode,
    ) -> Result<Vec<Endpoint>, SimError> {
        let (cx, cy) = self.position(node.router_id().core_id);

        if flit.receiver == BROADCAST_CORE_ID {
            if !self.broadcast_tree_enabled {
                return Err(SimError::protocol(
                    "broadcast on an e-mesh without the broadcast tree",
                ));
            }
            // Sender-rooted tree: continue away from the sender's row, and
            // along it away from the sender's column; every tree router
            // also ejects a copy to its own core.
            let (sx, sy) = self.position(flit.sender);
            let mut next_cores: Vec<CoreId> = Vec::new();
            if cy >= sy {
                next_cores.push(self.core_id_at(cx, cy + 1));
            }
            if cy <= sy {
                next_cores.push(self.core_id_at(cx, cy - 1));
            }
            if cy == sy {
                if cx >= sx {
                    next_cores.push(self.core_id_at(cx + 1, cy));
                }
                if cx <= sx {
                    next_cores.push(self.core_id_at(cx - 1, cy));
                }
            }
            next_cores.retain(|&c| c != INVALID_CORE_ID);

            let mut endpoints =
                vec![node.output_endpoint_of(RouterId::new(self.core_id, CORE_INTERFACE))?];
            for next in next_cores {
                endpoints.push(node.output_endpoint_of(RouterId::new(next, EMESH))?);
            }
            return Ok(endpoints);
        }

        let next = self.xy_next_hop(cx, cy, flit.receiver);
        let router = if next == self.core_id {
            RouterId::new(next, CORE_INTERFACE)
        } else {
            RouterId::new(next, EMESH)
        };
        Ok(vec![node.output_endpoint_of(router)?])
    }
}
