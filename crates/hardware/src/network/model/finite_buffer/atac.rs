//! Finite-buffer ATAC electrical/optical hybrid topology.
//!
//! Cores tile a power-of-two mesh and group into clusters. Each cluster
//! carries one optical hub (a send hub and a receive hub on the cluster's
//! first core) and one access point per sub-cluster: the mesh router at the
//! sub-cluster's centroid, which funnels traffic onto the optical network.
//!
//! Routing picks between two global routes:
//! - **ENET**: pure XY over the electrical mesh, chosen within a cluster or
//!   (under the distance-based strategy) when the Manhattan distance is at
//!   or below the unicast threshold.
//! - **ONET**: mesh to the nearest access point, access point to the send
//!   hub, one optical hop to the destination cluster's receive hub, then
//!   the receive-side distribution net (an H-tree addressed as one channel
//!   with all endpoints, or one of several star routers chosen by
//!   `sender_cluster mod num_receive_nets` for load spreading).
//!
//! Broadcasts always take the ONET: the send hub drives every receive hub
//! through the single optical channel's all-endpoints coordinate.

use crate::common::{BROADCAST_CORE_ID, CoreId, INVALID_CORE_ID, RouterId, SimError};
use crate::config::{
    AtacConfig, BufferManagementScheme, FiniteBufferNetConfig, GlobalRoutingStrategy,
    ReceiveNetType,
};
use crate::network::components::{
    ChannelSpec, Endpoint, Flit, LinkPerformanceModel, NetworkNode, RouterPerformanceModel,
    RouterPowerModel,
};
use crate::network::model::finite_buffer::FiniteBufferTopology;
use crate::network::node_index::{
    CORE_INTERFACE, EMESH, NET_PACKET_INJECTOR, RECEIVE_HUB, SEND_HUB, STAR_NET_ROUTER_BASE,
};

/// Splits a power-of-two count into a (width, height) grid with
/// `width >= height` and both powers of two.
fn power_of_two_grid(count: u32) -> (i32, i32) {
    let log = count.trailing_zeros();
    let width = 1i32 << log.div_ceil(2);
    (width, (count as i32) / width)
}

/// Cluster and sub-cluster geometry of an ATAC chip.
#[derive(Debug, Clone)]
pub struct AtacGeometry {
    enet_width: i32,
    enet_height: i32,
    cluster_size: u32,
    num_clusters: u32,
    cluster_width: i32,
    cluster_height: i32,
    numx_clusters: i32,
    num_sub_clusters: u32,
    sub_cluster_width: i32,
    sub_cluster_height: i32,
}

impl AtacGeometry {
    /// Derives the geometry for a (power-of-two) core count.
    pub fn new(total_cores: u32, atac: &AtacConfig) -> Result<Self, SimError> {
        if !total_cores.is_power_of_two() {
            return Err(SimError::config(format!(
                "atac requires a power-of-two core count, got {total_cores}"
            )));
        }
        let cluster_size = atac.cluster_size;
        if !cluster_size.is_power_of_two() || total_cores % cluster_size != 0 {
            return Err(SimError::config(format!(
                "atac cluster_size ({cluster_size}) must be a power of two dividing {total_cores}"
            )));
        }
        let num_sub_clusters = atac.num_optical_access_points_per_cluster;
        if !num_sub_clusters.is_power_of_two() || cluster_size % num_sub_clusters != 0 {
            return Err(SimError::config(format!(
                "atac access points per cluster ({num_sub_clusters}) must be a power of two dividing cluster_size"
            )));
        }

        let (enet_width, enet_height) = power_of_two_grid(total_cores);
        let (cluster_width, cluster_height) = power_of_two_grid(cluster_size);
        let sub_size = cluster_size / num_sub_clusters;
        let (sub_cluster_width, sub_cluster_height) = power_of_two_grid(sub_size);

        Ok(Self {
            enet_width,
            enet_height,
            cluster_size,
            num_clusters: total_cores / cluster_size,
            cluster_width,
            cluster_height,
            numx_clusters: enet_width / cluster_width,
            num_sub_clusters,
            sub_cluster_width,
            sub_cluster_height,
        })
    }

    /// Returns the cluster count.
    pub fn num_clusters(&self) -> u32 {
        self.num_clusters
    }

    /// Returns the mesh position of a core.
    pub fn position(&self, core_id: CoreId) -> (i32, i32) {
        (core_id % self.enet_width, core_id / self.enet_width)
    }

    /// Returns the core at a mesh position, if in range.
    pub fn core_id_at(&self, x: i32, y: i32) -> CoreId {
        if x < 0 || x >= self.enet_width || y < 0 || y >= self.enet_height {
            INVALID_CORE_ID
        } else {
            y * self.enet_width + x
        }
    }

    /// Returns the Manhattan distance between two cores.
    pub fn distance(&self, a: CoreId, b: CoreId) -> u32 {
        let (ax, ay) = self.position(a);
        let (bx, by) = self.position(b);
        ax.abs_diff(bx) + ay.abs_diff(by)
    }

    /// Returns the cluster a core belongs to.
    pub fn cluster_of(&self, core_id: CoreId) -> u32 {
        let (x, y) = self.position(core_id);
        let cx = x / self.cluster_width;
        let cy = y / self.cluster_height;
        (cy * self.numx_clusters + cx) as u32
    }

    fn cluster_origin(&self, cluster: u32) -> (i32, i32) {
        let cx = cluster as i32 % self.numx_clusters;
        let cy = cluster as i32 / self.numx_clusters;
        (cx * self.cluster_width, cy * self.cluster_height)
    }

    /// Returns the core carrying a cluster's optical hub.
    pub fn hub_core(&self, cluster: u32) -> CoreId {
        let (x, y) = self.cluster_origin(cluster);
        self.core_id_at(x, y)
    }

    /// Returns the cores of a cluster in row-major order.
    pub fn cluster_members(&self, cluster: u32) -> Vec<CoreId> {
        let (ox, oy) = self.cluster_origin(cluster);
        let mut members = Vec::with_capacity(self.cluster_size as usize);
        for y in 0..self.cluster_height {
            for x in 0..self.cluster_width {
                members.push(self.core_id_at(ox + x, oy + y));
            }
        }
        members
    }

    /// Returns a core's index within its cluster's member list.
    pub fn member_index(&self, core_id: CoreId) -> usize {
        let cluster = self.cluster_of(core_id);
        let (ox, oy) = self.cluster_origin(cluster);
        let (x, y) = self.position(core_id);
        ((y - oy) * self.cluster_width + (x - ox)) as usize
    }

    /// Returns the access points (mesh routers at sub-cluster centroids) of
    /// a cluster.
    pub fn access_points(&self, cluster: u32) -> Vec<CoreId> {
        let (ox, oy) = self.cluster_origin(cluster);
        let numx_sub = self.cluster_width / self.sub_cluster_width;
        let numy_sub = self.cluster_height / self.sub_cluster_height;
        let mut points = Vec::with_capacity(self.num_sub_clusters as usize);
        for sy in 0..numy_sub {
            for sx in 0..numx_sub {
                let x = ox + sx * self.sub_cluster_width + self.sub_cluster_width / 2;
                let y = oy + sy * self.sub_cluster_height + self.sub_cluster_height / 2;
                points.push(self.core_id_at(x, y));
            }
        }
        points
    }

    /// Returns the access point serving a core (its own sub-cluster's).
    pub fn nearest_access_point(&self, core_id: CoreId) -> CoreId {
        let cluster = self.cluster_of(core_id);
        let (ox, oy) = self.cluster_origin(cluster);
        let (x, y) = self.position(core_id);
        let sx = (x - ox) / self.sub_cluster_width;
        let sy = (y - oy) / self.sub_cluster_height;
        let numx_sub = self.cluster_width / self.sub_cluster_width;
        self.access_points(cluster)[(sy * numx_sub + sx) as usize]
    }

    /// Returns whether `core_id` hosts an access point of its cluster.
    pub fn is_access_point(&self, core_id: CoreId) -> bool {
        self.nearest_access_point(core_id) == core_id
    }
}

/// Which global network a packet takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobalRoute {
    Enet,
    Onet,
}

/// The ATAC topology for one core.
#[derive(Debug)]
pub struct AtacTopology {
    core_id: CoreId,
    geometry: AtacGeometry,
    atac: AtacConfig,
    net_cfg: FiniteBufferNetConfig,
    tile_width: f64,
}

impl AtacTopology {
    /// Creates the topology helper for one core.
    pub fn new(
        core_id: CoreId,
        total_cores: u32,
        atac: AtacConfig,
        net_cfg: FiniteBufferNetConfig,
        tile_width: f64,
    ) -> Result<Self, SimError> {
        if atac.num_receive_nets_per_cluster == 0 {
            return Err(SimError::config(
                "atac num_receive_nets_per_cluster must be positive",
            ));
        }
        Ok(Self {
            core_id,
            geometry: AtacGeometry::new(total_cores, &atac)?,
            atac,
            net_cfg,
            tile_width,
        })
    }

    fn spec(&self) -> ChannelSpec {
        ChannelSpec::new(
            self.net_cfg.buffer_management_scheme,
            self.net_cfg.router.input_buffer_size,
        )
    }

    fn electrical_link(&self, length_tiles: f64) -> Option<LinkPerformanceModel> {
        Some(LinkPerformanceModel::electrical(
            &self.net_cfg.link,
            self.tile_width * length_tiles,
        ))
    }

    fn receive_net_id(&self, sender: CoreId) -> i32 {
        (self.geometry.cluster_of(sender) % self.atac.num_receive_nets_per_cluster) as i32
    }

    fn global_route(&self, sender: CoreId, receiver: CoreId) -> GlobalRoute {
        if receiver == BROADCAST_CORE_ID {
            return GlobalRoute::Onet;
        }
        let same_cluster = self.geometry.cluster_of(sender) == self.geometry.cluster_of(receiver);
        match self.atac.global_routing_strategy {
            GlobalRoutingStrategy::DistanceBased => {
                if same_cluster
                    || self.geometry.distance(sender, receiver)
                        <= self.atac.unicast_distance_threshold
                {
                    GlobalRoute::Enet
                } else {
                    GlobalRoute::Onet
                }
            }
            GlobalRoutingStrategy::ClusterBased => {
                if same_cluster {
                    GlobalRoute::Enet
                } else {
                    GlobalRoute::Onet
                }
            }
        }
    }

    fn build_emesh_node(&self) -> NetworkNode {
        let geometry = &self.geometry;
        let (cx, cy) = geometry.position(self.core_id);

        let mut inputs = vec![self.spec()];
        let mut outputs = vec![ChannelSpec::new(BufferManagementScheme::Infinite, 0)];
        let mut input_map = vec![vec![RouterId::new(self.core_id, NET_PACKET_INJECTOR)]];
        let mut output_map = vec![vec![RouterId::new(self.core_id, CORE_INTERFACE)]];
        let mut links: Vec<Option<LinkPerformanceModel>> = vec![None];

        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let neighbor = geometry.core_id_at(cx + dx, cy + dy);
            if neighbor == INVALID_CORE_ID {
                continue;
            }
            inputs.push(self.spec());
            outputs.push(self.spec());
            input_map.push(vec![RouterId::new(neighbor, EMESH)]);
            output_map.push(vec![RouterId::new(neighbor, EMESH)]);
            links.push(self.electrical_link(1.0));
        }

        if geometry.is_access_point(self.core_id) {
            let hub = geometry.hub_core(geometry.cluster_of(self.core_id));
            outputs.push(self.spec());
            output_map.push(vec![RouterId::new(hub, SEND_HUB)]);
            links.push(self.electrical_link(f64::from(
                self.geometry.distance(self.core_id, hub).max(1),
            )));
        }

        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &inputs,
            &outputs,
        );
        NetworkNode::new(
            RouterId::new(self.core_id, EMESH),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )
    }

    fn build_send_hub(&self, cluster: u32) -> NetworkNode {
        let geometry = &self.geometry;
        let access_points = geometry.access_points(cluster);

        let inputs: Vec<ChannelSpec> = access_points.iter().map(|_| self.spec()).collect();
        let input_map: Vec<Vec<RouterId>> = access_points
            .iter()
            .map(|&ap| vec![RouterId::new(ap, EMESH)])
            .collect();

        // One optical channel reaching every cluster's receive hub.
        let outputs = vec![ChannelSpec::with_endpoints(
            self.net_cfg.buffer_management_scheme,
            self.net_cfg.router.input_buffer_size,
            geometry.num_clusters(),
        )];
        let output_map = vec![
            (0..geometry.num_clusters())
                .map(|c| RouterId::new(geometry.hub_core(c), RECEIVE_HUB))
                .collect(),
        ];
        let links = vec![Some(LinkPerformanceModel::optical(self.net_cfg.link.delay))];

        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &inputs,
            &outputs,
        );
        NetworkNode::new(
            RouterId::new(self.core_id, SEND_HUB),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )
    }

    fn build_receive_hub(&self, cluster: u32) -> NetworkNode {
        let geometry = &self.geometry;
        let members = geometry.cluster_members(cluster);
        let num_nets = self.atac.num_receive_nets_per_cluster;

        // One input channel fed by every cluster's send hub.
        let inputs = vec![ChannelSpec::with_endpoints(
            self.net_cfg.buffer_management_scheme,
            self.net_cfg.router.input_buffer_size,
            geometry.num_clusters(),
        )];
        let input_map = vec![
            (0..geometry.num_clusters())
                .map(|c| RouterId::new(geometry.hub_core(c), SEND_HUB))
                .collect(),
        ];

        let mut outputs = Vec::new();
        let mut output_map = Vec::new();
        let mut links = Vec::new();
        match self.atac.receive_net_type {
            ReceiveNetType::Htree => {
                // One logical link per receive net, fanning out to every
                // core of the cluster.
                for _ in 0..num_nets {
                    outputs.push(ChannelSpec::with_endpoints(
                        BufferManagementScheme::Infinite,
                        0,
                        geometry.cluster_size,
                    ));
                    output_map.push(
                        members
                            .iter()
                            .map(|&m| RouterId::new(m, CORE_INTERFACE))
                            .collect(),
                    );
                    links.push(self.electrical_link(f64::from(geometry.cluster_size)));
                }
            }
            ReceiveNetType::Star => {
                for i in 0..num_nets {
                    outputs.push(self.spec());
                    output_map.push(vec![RouterId::new(
                        self.core_id,
                        STAR_NET_ROUTER_BASE + i as i32,
                    )]);
                    links.push(None);
                }
            }
        }

        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &inputs,
            &outputs,
        );
        NetworkNode::new(
            RouterId::new(self.core_id, RECEIVE_HUB),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )
    }

    fn build_star_router(&self, cluster: u32, net: u32) -> NetworkNode {
        let geometry = &self.geometry;
        let members = geometry.cluster_members(cluster);

        let inputs = vec![self.spec()];
        let input_map = vec![vec![RouterId::new(self.core_id, RECEIVE_HUB)]];

        let mut outputs = Vec::new();
        let mut output_map = Vec::new();
        let mut links = Vec::new();
        for &member in &members {
            outputs.push(ChannelSpec::new(BufferManagementScheme::Infinite, 0));
            output_map.push(vec![RouterId::new(member, CORE_INTERFACE)]);
            links.push(self.electrical_link(f64::from(
                geometry.distance(self.core_id, member).max(1),
            )));
        }

        let perf = RouterPerformanceModel::new(
            self.net_cfg.flow_control_scheme,
            self.net_cfg.router.data_pipeline_delay,
            self.net_cfg.router.credit_pipeline_delay,
            &inputs,
            &outputs,
        );
        NetworkNode::new(
            RouterId::new(self.core_id, STAR_NET_ROUTER_BASE + net as i32),
            perf,
            Some(RouterPowerModel::new()),
            links,
            input_map,
            output_map,
        )
    }

    fn enet_endpoint(
        &self,
        node: &NetworkNode,
        toward: CoreId,
    ) -> Result<Endpoint, SimError> {
        let current = node.router_id().core_id;
        let (cx, cy) = self.geometry.position(current);
        let (dx, dy) = self.geometry.position(toward);
        let next = if cx > dx {
            self.geometry.core_id_at(cx - 1, cy)
        } else if cx < dx {
            self.geometry.core_id_at(cx + 1, cy)
        } else if cy > dy {
            self.geometry.core_id_at(cx, cy - 1)
        } else if cy < dy {
            self.geometry.core_id_at(cx, cy + 1)
        } else {
            current
        };
        let router = if next == current {
            RouterId::new(current, CORE_INTERFACE)
        } else {
            RouterId::new(next, EMESH)
        };
        node.output_endpoint_of(router)
    }
}

impl FiniteBufferTopology for AtacTopology {
    fn build_nodes(&self) -> Result<Vec<NetworkNode>, SimError> {
        let mut nodes = vec![self.build_emesh_node()];
        let cluster = self.geometry.cluster_of(self.core_id);
        if self.geometry.hub_core(cluster) == self.core_id {
            nodes.push(self.build_send_hub(cluster));
            nodes.push(self.build_receive_hub(cluster));
            if self.atac.receive_net_type == ReceiveNetType::Star {
                for net in 0..self.atac.num_receive_nets_per_cluster {
                    nodes.push(self.build_star_router(cluster, net));
                }
            }
        }
        Ok(nodes)
    }

    fn ingress_router_id(&self) -> RouterId {
        RouterId::new(self.core_id, EMESH)
    }

    fn compute_output_endpoint_list(
        &mut self,
        flit: &Flit,
        node: &NetworkNode,
    ) -> Result<Vec<Endpoint>, SimError> {
        let geometry = &self.geometry;
        let node_index = node.router_id().index;
        let route = self.global_route(flit.sender, flit.receiver);

        if node_index == EMESH {
            if route == GlobalRoute::Enet {
                return Ok(vec![self.enet_endpoint(node, flit.receiver)?]);
            }
            // Toward the optics: funnel through this cluster's access point.
            let current = node.router_id().core_id;
            if geometry.is_access_point(current) {
                let hub = geometry.hub_core(geometry.cluster_of(current));
                return Ok(vec![node.output_endpoint_of(RouterId::new(hub, SEND_HUB))?]);
            }
            let access_point = geometry.nearest_access_point(current);
            return Ok(vec![self.enet_endpoint(node, access_point)?]);
        }

        if node_index == SEND_HUB {
            if flit.receiver == BROADCAST_CORE_ID {
                // One optical channel, every receive hub at once.
                return Ok(vec![Endpoint::all(0)]);
            }
            let receiver_cluster = geometry.cluster_of(flit.receiver);
            let hub = geometry.hub_core(receiver_cluster);
            return Ok(vec![
                node.output_endpoint_of(RouterId::new(hub, RECEIVE_HUB))?,
            ]);
        }

        if node_index == RECEIVE_HUB {
            let net = self.receive_net_id(flit.sender);
            return Ok(match self.atac.receive_net_type {
                ReceiveNetType::Htree => {
                    if flit.receiver == BROADCAST_CORE_ID {
                        vec![Endpoint::all(net)]
                    } else {
                        vec![Endpoint::new(
                            net,
                            geometry.member_index(flit.receiver) as i32,
                        )]
                    }
                }
                ReceiveNetType::Star => vec![Endpoint::new(net, 0)],
            });
        }

        if node_index >= STAR_NET_ROUTER_BASE {
            return Ok(if flit.receiver == BROADCAST_CORE_ID {
                (0..geometry.cluster_size)
                    .map(|i| Endpoint::new(i as i32, 0))
                    .collect()
            } else {
                vec![node.output_endpoint_of(RouterId::new(flit.receiver, CORE_INTERFACE))?]
            });
        }

        Err(SimError::protocol(format!(
            "atac flit at unexpected node index {node_index}"
        )))
    }
}
