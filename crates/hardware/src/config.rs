//! Configuration system for the simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a simulation. It provides:
//! 1. **Defaults:** Baseline hardware constants (caches, directory, DRAM,
//!    networks, clock-skew minimization).
//! 2. **Structures:** Hierarchical config for general, performance-model,
//!    network, and clock-skew sections.
//! 3. **Enums:** Network model, flow control, buffer management, directory,
//!    replacement-policy, and clock-skew scheme selectors.
//! 4. **Core model list:** The `<num,freq,core_type,l1i,l1d,l2>` tuple
//!    syntax with the `default` keyword.
//!
//! Configuration is supplied via JSON from the CLI or built in code with
//! `Config::default()`; `validate()` applies the arithmetic checks that are
//! fatal at startup.

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::SimError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden in a configuration file.
pub mod defaults {
    /// Default number of simulated cores.
    pub const TOTAL_CORES: u32 = 16;

    /// Default core clock frequency in GHz.
    pub const CORE_FREQUENCY: f64 = 1.0;

    /// Default cache block size in bytes; shared by every cache level and
    /// the coherence protocol's block-aligned addressing.
    pub const CACHE_BLOCK_SIZE: u32 = 64;

    /// Default L1 cache size in bytes (32 KiB).
    pub const L1_CACHE_SIZE: u32 = 32 * 1024;

    /// Default L2 cache size in bytes (512 KiB).
    pub const L2_CACHE_SIZE: u32 = 512 * 1024;

    /// Default L1 associativity.
    pub const L1_ASSOCIATIVITY: u32 = 4;

    /// Default L2 associativity.
    pub const L2_ASSOCIATIVITY: u32 = 8;

    /// Default L1 data/tags access time in cycles.
    pub const L1_ACCESS_TIME: u64 = 1;

    /// Default L2 data access time in cycles.
    pub const L2_DATA_ACCESS_TIME: u64 = 8;

    /// Default L2 tags access time in cycles.
    pub const L2_TAGS_ACCESS_TIME: u64 = 3;

    /// Default number of directory entries per slice.
    pub const DIRECTORY_TOTAL_ENTRIES: u32 = 16384;

    /// Default directory cache associativity.
    pub const DIRECTORY_ASSOCIATIVITY: u32 = 16;

    /// Default bound on hardware-tracked sharers for limited directories.
    pub const DIRECTORY_MAX_HW_SHARERS: u32 = 64;

    /// Default home-lookup parameter (log2 of the interleaving granularity);
    /// must be at least log2 of the cache block size.
    pub const DIRECTORY_HOME_LOOKUP_PARAM: u32 = 6;

    /// Default directory cache access time in cycles.
    pub const DIRECTORY_CACHE_ACCESS_TIME: u64 = 10;

    /// Default DRAM access cost in cycles of the 1 GHz global clock.
    pub const DRAM_LATENCY: f64 = 100.0;

    /// Default per-controller DRAM bandwidth in bytes per global clock cycle.
    pub const DRAM_PER_CONTROLLER_BANDWIDTH: f64 = 4.0;

    /// Default network clock frequency in GHz.
    pub const NETWORK_FREQUENCY: f64 = 1.0;

    /// Default flit width in bits.
    pub const FLIT_WIDTH: u32 = 64;

    /// Default router input buffer size in flits.
    pub const ROUTER_INPUT_BUFFER_SIZE: u32 = 4;

    /// Default router data-pipeline depth in cycles.
    pub const ROUTER_DATA_PIPELINE_DELAY: u64 = 1;

    /// Default router credit-pipeline depth in cycles.
    pub const ROUTER_CREDIT_PIPELINE_DELAY: u64 = 1;

    /// Default link traversal delay in cycles.
    pub const LINK_DELAY: u64 = 1;

    /// Default link length in millimeters (one tile).
    pub const LINK_LENGTH: f64 = 1.0;

    /// Default tile width in millimeters.
    pub const TILE_WIDTH: f64 = 1.0;

    /// Default barrier quantum in cycles.
    pub const BARRIER_QUANTUM: u64 = 1000;

    /// Default random-pairs slack in cycles.
    pub const RANDOM_PAIRS_SLACK: u64 = 100;

    /// Default random-pairs quantum in cycles.
    pub const RANDOM_PAIRS_QUANTUM: u64 = 1000;

    /// Default random-pairs wall-clock sleep fraction.
    pub const RANDOM_PAIRS_SLEEP_FRACTION: f64 = 1.0;

    /// Default ATAC cluster size in cores (must be a power of two).
    pub const ATAC_CLUSTER_SIZE: u32 = 16;

    /// Default number of optical access points per ATAC cluster.
    pub const ATAC_ACCESS_POINTS_PER_CLUSTER: u32 = 1;

    /// Default number of receive nets per ATAC cluster.
    pub const ATAC_RECEIVE_NETS_PER_CLUSTER: u32 = 2;

    /// Default ATAC unicast distance threshold in hops.
    pub const ATAC_UNICAST_DISTANCE_THRESHOLD: u32 = 4;

    /// Default Clos router port count (m).
    pub const CLOS_NUM_ROUTER_PORTS: u32 = 4;

    /// Default Clos ingress/egress router count (r).
    pub const CLOS_NUM_IN_ROUTERS: u32 = 4;

    /// Default Clos middle router count (n).
    pub const CLOS_NUM_MID_ROUTERS: u32 = 2;
}

/// Simulation accuracy mode; only cycle-level is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMode {
    /// Cycle-level modeling of caches, coherence, and the interconnect.
    #[default]
    CycleLevel,
}

/// Execution mode of the outer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Full simulation of every memory access.
    #[default]
    Full,
    /// Reduced modeling for fast forwarding.
    Lite,
    /// Native execution; the memory subsystem is bypassed.
    Native,
}

/// Cache replacement policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Least-recently-used replacement.
    #[default]
    Lru,
    /// First-in-first-out replacement.
    Fifo,
    /// Uniform-random replacement.
    Random,
}

/// Cache performance model types.
///
/// Determines how the tags and data access latencies combine when a single
/// operation touches both arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePerfModelType {
    /// Tags and data accessed in parallel; combined latency is the maximum.
    #[default]
    Parallel,
    /// Tags accessed before data; combined latency is the sum.
    Sequential,
}

/// Directory representation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryType {
    /// One bit per core; never overflows.
    #[default]
    FullMap,
    /// Bounded pointer list; a full list forces sharer eviction.
    LimitedNoBroadcast,
    /// Bounded pointer list; overflow stops tracking and broadcasts.
    LimitedBroadcast,
    /// Bounded pointer list; overflow counts untracked sharers and
    /// broadcasts invalidations.
    Ackwise,
    /// Bounded pointer list; overflow traps to a software handler that
    /// tracks the remainder, at extra latency.
    Limitless,
}

/// Network model selector for one logical network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkModelKind {
    /// Idealized unit-latency network.
    #[default]
    Magic,
    /// Analytical electrical-mesh model: per-hop latency, no contention.
    EmeshHopCounter,
    /// Finite-buffer electrical mesh with routed flits.
    FiniteBufferEmesh,
    /// Finite-buffer ATAC electrical/optical hybrid.
    FiniteBufferAtac,
    /// Finite-buffer three-stage Clos.
    FiniteBufferClos,
    /// Flipped ATAC variant; routed identically to [`Self::FiniteBufferAtac`].
    FiniteBufferFlipAtac,
}

impl NetworkModelKind {
    /// Returns whether the model belongs to the finite-buffer family.
    pub fn is_finite_buffer(self) -> bool {
        matches!(
            self,
            Self::FiniteBufferEmesh
                | Self::FiniteBufferAtac
                | Self::FiniteBufferClos
                | Self::FiniteBufferFlipAtac
        )
    }
}

/// Buffered flow-control schemes for the finite-buffer models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControlScheme {
    /// A packet is forwarded only after it has fully arrived.
    StoreAndForward,
    /// A packet may cut through, but the downstream buffer must fit all of it.
    VirtualCutThrough,
    /// Flits advance independently; one flit of buffer suffices.
    #[default]
    Wormhole,
}

/// Downstream-buffer signaling disciplines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferManagementScheme {
    /// Never back-pressures; used at the core/cpu interface.
    Infinite,
    /// Per-slot credit counting.
    #[default]
    Credit,
    /// Single on/off threshold signal per downstream buffer.
    OnOff,
}

/// ATAC receive-side distribution network types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveNetType {
    /// One logical link fanning out to every core in the cluster.
    #[default]
    Htree,
    /// Dedicated star routers, one hop to each core.
    Star,
}

/// ATAC global routing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRoutingStrategy {
    /// Electrical for short distances, optical beyond the threshold.
    #[default]
    DistanceBased,
    /// Electrical within a cluster, optical between clusters.
    ClusterBased,
}

/// Caching protocols; only the private-L1/private-L2 MSI directory
/// protocol is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingProtocol {
    /// Private L1s and L2 with a DRAM directory running MSI.
    #[default]
    PrL1PrL2DramDirectoryMsi,
}

/// Clock-skew minimization schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSkewScheme {
    /// No synchronization.
    #[default]
    None,
    /// Quantum-based global barrier.
    Barrier,
    /// Randomized peer-to-peer slack enforcement.
    RandomPairs,
}

/// Link types for electrical links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Repeated electrical link; delay scales with length.
    #[default]
    ElectricalRepeated,
    /// Equalized electrical link; flat delay plus setup.
    ElectricalEqualized,
}

/// General simulation options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Requested core count; rounded up to the topology's nearest
    /// acceptable value at startup.
    pub total_cores: u32,
    /// Number of simulation threads; must not exceed `total_cores`.
    pub num_sim_threads: u32,
    /// When false, the memory subsystem is disabled and accesses become
    /// direct copies under a global lock.
    pub enable_shared_mem: bool,
    /// When false, latency counters are not accumulated.
    pub enable_performance_modeling: bool,
    /// Accuracy mode; must be cycle-level.
    pub accuracy_mode: AccuracyMode,
    /// Execution mode of the outer driver.
    pub execution_mode: ExecutionMode,
    /// Directory for the output summary.
    pub output_dir: String,
    /// File name of the output summary.
    pub output_file: String,
    /// Physical tile width in millimeters; scales link lengths.
    pub tile_width: f64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            total_cores: defaults::TOTAL_CORES,
            num_sim_threads: 1,
            enable_shared_mem: true,
            enable_performance_modeling: true,
            accuracy_mode: AccuracyMode::CycleLevel,
            execution_mode: ExecutionMode::Full,
            output_dir: ".".to_owned(),
            output_file: "sim.out".to_owned(),
            tile_width: defaults::TILE_WIDTH,
        }
    }
}

/// Parameters of one named cache type.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTypeConfig {
    /// Total capacity in bytes.
    pub cache_size: u32,
    /// Set associativity.
    pub associativity: u32,
    /// Block size in bytes. Read from the L1-I type only; every other
    /// level inherits it.
    pub cache_block_size: u32,
    /// Replacement policy.
    pub replacement_policy: ReplacementPolicy,
    /// Data array access time in cycles.
    pub data_access_time: u64,
    /// Tag array access time in cycles.
    pub tags_access_time: u64,
    /// How tags and data latencies combine.
    pub perf_model_type: CachePerfModelType,
}

impl Default for CacheTypeConfig {
    fn default() -> Self {
        Self {
            cache_size: defaults::L1_CACHE_SIZE,
            associativity: defaults::L1_ASSOCIATIVITY,
            cache_block_size: defaults::CACHE_BLOCK_SIZE,
            replacement_policy: ReplacementPolicy::Lru,
            data_access_time: defaults::L1_ACCESS_TIME,
            tags_access_time: defaults::L1_ACCESS_TIME,
            perf_model_type: CachePerfModelType::Parallel,
        }
    }
}

impl CacheTypeConfig {
    /// Returns the default configuration for an L2 slice.
    pub fn default_l2() -> Self {
        Self {
            cache_size: defaults::L2_CACHE_SIZE,
            associativity: defaults::L2_ASSOCIATIVITY,
            data_access_time: defaults::L2_DATA_ACCESS_TIME,
            tags_access_time: defaults::L2_TAGS_ACCESS_TIME,
            ..Self::default()
        }
    }
}

/// Directory slice parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DramDirectoryConfig {
    /// Entries per directory slice.
    pub total_entries: u32,
    /// Directory cache associativity.
    pub associativity: u32,
    /// Bound on hardware-tracked sharers for limited variants.
    pub max_hw_sharers: u32,
    /// Directory representation.
    pub directory_type: DirectoryType,
    /// Log2 of the home-interleaving granularity in bytes.
    pub home_lookup_param: u32,
    /// Directory cache access time in cycles.
    pub directory_cache_access_time: u64,
}

impl Default for DramDirectoryConfig {
    fn default() -> Self {
        Self {
            total_entries: defaults::DIRECTORY_TOTAL_ENTRIES,
            associativity: defaults::DIRECTORY_ASSOCIATIVITY,
            max_hw_sharers: defaults::DIRECTORY_MAX_HW_SHARERS,
            directory_type: DirectoryType::FullMap,
            home_lookup_param: defaults::DIRECTORY_HOME_LOOKUP_PARAM,
            directory_cache_access_time: defaults::DIRECTORY_CACHE_ACCESS_TIME,
        }
    }
}

/// DRAM queue model options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DramQueueModelConfig {
    /// Whether accesses contend on a single-server queue.
    pub enabled: bool,
}

/// DRAM controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DramConfig {
    /// Fixed access cost in global clock cycles.
    pub latency: f64,
    /// Per-controller bandwidth in bytes per global clock cycle.
    pub per_controller_bandwidth: f64,
    /// Number of cores carrying a DRAM controller + directory slice.
    /// Zero means one per core.
    pub num_controllers: u32,
    /// Queueing-delay model options.
    pub queue_model: DramQueueModelConfig,
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            latency: defaults::DRAM_LATENCY,
            per_controller_bandwidth: defaults::DRAM_PER_CONTROLLER_BANDWIDTH,
            num_controllers: 0,
            queue_model: DramQueueModelConfig::default(),
        }
    }
}

/// One parsed entry of the core model list.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreModel {
    /// Core clock frequency in GHz.
    pub frequency: f64,
    /// Opaque core type tag.
    pub core_type: String,
    /// Named L1-I cache type.
    pub l1_icache_type: String,
    /// Named L1-D cache type.
    pub l1_dcache_type: String,
    /// Named L2 cache type.
    pub l2_cache_type: String,
}

impl Default for CoreModel {
    fn default() -> Self {
        Self {
            frequency: defaults::CORE_FREQUENCY,
            core_type: "simple".to_owned(),
            l1_icache_type: "T1".to_owned(),
            l1_dcache_type: "T1".to_owned(),
            l2_cache_type: "T1".to_owned(),
        }
    }
}

/// Core performance-model options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Core model list in `<num,freq,core_type,l1i,l1d,l2>,<...>` syntax;
    /// the `default` keyword leaves a slot at its default.
    pub model_list: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            model_list: String::new(),
        }
    }
}

/// Performance-model section: cores, caches, directory, DRAM.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerfModelConfig {
    /// Core model list.
    pub core: CoreConfig,
    /// Named L1 instruction cache types.
    pub l1_icache: HashMap<String, CacheTypeConfig>,
    /// Named L1 data cache types.
    pub l1_dcache: HashMap<String, CacheTypeConfig>,
    /// Named L2 cache types.
    pub l2_cache: HashMap<String, CacheTypeConfig>,
    /// Directory slice parameters.
    pub dram_directory: DramDirectoryConfig,
    /// DRAM controller parameters.
    pub dram: DramConfig,
}

impl Default for PerfModelConfig {
    fn default() -> Self {
        let mut l1 = HashMap::new();
        l1.insert("T1".to_owned(), CacheTypeConfig::default());
        let mut l2 = HashMap::new();
        l2.insert("T1".to_owned(), CacheTypeConfig::default_l2());
        Self {
            core: CoreConfig::default(),
            l1_icache: l1.clone(),
            l1_dcache: l1,
            l2_cache: l2,
            dram_directory: DramDirectoryConfig::default(),
            dram: DramConfig::default(),
        }
    }
}

/// Router parameters of a finite-buffer network.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Data pipeline depth in cycles.
    pub data_pipeline_delay: u64,
    /// Credit pipeline depth in cycles.
    pub credit_pipeline_delay: u64,
    /// Input buffer size in flits.
    pub input_buffer_size: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            data_pipeline_delay: defaults::ROUTER_DATA_PIPELINE_DELAY,
            credit_pipeline_delay: defaults::ROUTER_CREDIT_PIPELINE_DELAY,
            input_buffer_size: defaults::ROUTER_INPUT_BUFFER_SIZE,
        }
    }
}

/// Link parameters of a finite-buffer network.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Electrical link type.
    pub link_type: LinkType,
    /// Link traversal delay in cycles.
    pub delay: u64,
    /// Link length in millimeters.
    pub length: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            link_type: LinkType::ElectricalRepeated,
            delay: defaults::LINK_DELAY,
            length: defaults::LINK_LENGTH,
        }
    }
}

/// Parameters shared by every finite-buffer network model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiniteBufferNetConfig {
    /// Network clock frequency in GHz.
    pub frequency: f64,
    /// Flit width in bits (one flit is one phit).
    pub flit_width: u32,
    /// Buffered flow-control scheme.
    pub flow_control_scheme: FlowControlScheme,
    /// Downstream-buffer signaling discipline.
    pub buffer_management_scheme: BufferManagementScheme,
    /// Router parameters.
    pub router: RouterConfig,
    /// Link parameters.
    pub link: LinkConfig,
}

impl Default for FiniteBufferNetConfig {
    fn default() -> Self {
        Self {
            frequency: defaults::NETWORK_FREQUENCY,
            flit_width: defaults::FLIT_WIDTH,
            flow_control_scheme: FlowControlScheme::Wormhole,
            buffer_management_scheme: BufferManagementScheme::Credit,
            router: RouterConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

/// ATAC-specific topology parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AtacConfig {
    /// Cores per cluster; must be a power of two dividing the core count.
    pub cluster_size: u32,
    /// Optical access points per cluster (= sub-clusters per cluster).
    pub num_optical_access_points_per_cluster: u32,
    /// Receive-side distribution network type.
    pub receive_net_type: ReceiveNetType,
    /// Receive nets per cluster; senders spread across them.
    pub num_receive_nets_per_cluster: u32,
    /// Global routing strategy.
    pub global_routing_strategy: GlobalRoutingStrategy,
    /// Unicast hop-distance threshold for the distance-based strategy.
    pub unicast_distance_threshold: u32,
}

impl Default for AtacConfig {
    fn default() -> Self {
        Self {
            cluster_size: defaults::ATAC_CLUSTER_SIZE,
            num_optical_access_points_per_cluster: defaults::ATAC_ACCESS_POINTS_PER_CLUSTER,
            receive_net_type: ReceiveNetType::Htree,
            num_receive_nets_per_cluster: defaults::ATAC_RECEIVE_NETS_PER_CLUSTER,
            global_routing_strategy: GlobalRoutingStrategy::DistanceBased,
            unicast_distance_threshold: defaults::ATAC_UNICAST_DISTANCE_THRESHOLD,
        }
    }
}

/// Clos-specific topology parameters (m ports x n middles x r ingresses).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClosConfig {
    /// Ports per ingress/egress router (m); also cores per ingress.
    pub num_router_ports: u32,
    /// Ingress (and egress) router count (r).
    pub num_in_routers: u32,
    /// Middle router count (n).
    pub num_mid_routers: u32,
}

impl Default for ClosConfig {
    fn default() -> Self {
        Self {
            num_router_ports: defaults::CLOS_NUM_ROUTER_PORTS,
            num_in_routers: defaults::CLOS_NUM_IN_ROUTERS,
            num_mid_routers: defaults::CLOS_NUM_MID_ROUTERS,
        }
    }
}

/// Hop-counter model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HopCounterConfig {
    /// Per-hop router delay in cycles.
    pub router_delay: u64,
    /// Per-hop link delay in cycles.
    pub link_delay: u64,
    /// Flit width in bits, for serialization latency.
    pub flit_width: u32,
}

impl Default for HopCounterConfig {
    fn default() -> Self {
        Self {
            router_delay: defaults::ROUTER_DATA_PIPELINE_DELAY,
            link_delay: defaults::LINK_DELAY,
            flit_width: defaults::FLIT_WIDTH,
        }
    }
}

/// Network section: the five logical network bindings plus per-model
/// parameter blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Model for the first user network.
    pub user_model_1: NetworkModelKind,
    /// Model for the second user network.
    pub user_model_2: NetworkModelKind,
    /// Model for the first memory network (coherence traffic).
    pub memory_model_1: NetworkModelKind,
    /// Model for the second memory network.
    pub memory_model_2: NetworkModelKind,
    /// Model for the system network (clock-skew and services).
    pub system_model: NetworkModelKind,
    /// Finite-buffer e-mesh parameters.
    pub emesh: FiniteBufferNetConfig,
    /// Whether the e-mesh carries the broadcast tree.
    pub emesh_broadcast_tree_enabled: bool,
    /// Finite-buffer ATAC shared parameters.
    pub atac_net: FiniteBufferNetConfig,
    /// ATAC topology parameters.
    pub atac: AtacConfig,
    /// Finite-buffer Clos shared parameters.
    pub clos_net: FiniteBufferNetConfig,
    /// Clos topology parameters.
    pub clos: ClosConfig,
    /// Hop-counter model parameters.
    pub emesh_hop_counter: HopCounterConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_model_1: NetworkModelKind::Magic,
            user_model_2: NetworkModelKind::Magic,
            memory_model_1: NetworkModelKind::Magic,
            memory_model_2: NetworkModelKind::Magic,
            system_model: NetworkModelKind::Magic,
            emesh: FiniteBufferNetConfig::default(),
            emesh_broadcast_tree_enabled: true,
            atac_net: FiniteBufferNetConfig::default(),
            atac: AtacConfig::default(),
            clos_net: FiniteBufferNetConfig::default(),
            clos: ClosConfig::default(),
            emesh_hop_counter: HopCounterConfig::default(),
        }
    }
}

/// Barrier scheme options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BarrierConfig {
    /// Quantum between barriers in cycles.
    pub quantum: u64,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            quantum: defaults::BARRIER_QUANTUM,
        }
    }
}

/// Random-pairs scheme options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RandomPairsConfig {
    /// Permitted clock difference before a peer is told to wait.
    pub slack: u64,
    /// Cycles between synchronization attempts.
    pub quantum: u64,
    /// Fraction of the computed wall-clock sleep actually slept.
    pub sleep_fraction: f64,
}

impl Default for RandomPairsConfig {
    fn default() -> Self {
        Self {
            slack: defaults::RANDOM_PAIRS_SLACK,
            quantum: defaults::RANDOM_PAIRS_QUANTUM,
            sleep_fraction: defaults::RANDOM_PAIRS_SLEEP_FRACTION,
        }
    }
}

/// Clock-skew minimization section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClockSkewConfig {
    /// Selected scheme.
    pub scheme: ClockSkewScheme,
    /// Barrier options.
    pub barrier: BarrierConfig,
    /// Random-pairs options.
    pub random_pairs: RandomPairsConfig,
}

/// Root configuration record consumed by the simulator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General options.
    pub general: GeneralConfig,
    /// Performance-model options.
    pub perf_model: PerfModelConfig,
    /// Network options.
    pub network: NetworkConfig,
    /// Clock-skew minimization options.
    pub clock_skew_minimization: ClockSkewConfig,
    /// Caching protocol selector.
    pub caching_protocol: CachingProtocol,
}

impl Config {
    /// Validates cross-option arithmetic and returns the per-core models.
    ///
    /// # Arguments
    ///
    /// * `total_cores` - The (already rounded) core count to expand the
    ///   model list against.
    ///
    /// # Returns
    ///
    /// One [`CoreModel`] per core, or a [`SimError::Config`] naming the
    /// offending option.
    pub fn core_models(&self, total_cores: u32) -> Result<Vec<CoreModel>, SimError> {
        let models = parse_model_list(&self.perf_model.core.model_list, total_cores)?;
        for (i, model) in models.iter().enumerate() {
            for (section, key) in [
                (&self.perf_model.l1_icache, &model.l1_icache_type),
                (&self.perf_model.l1_dcache, &model.l1_dcache_type),
                (&self.perf_model.l2_cache, &model.l2_cache_type),
            ] {
                if !section.contains_key(key) {
                    return Err(SimError::config(format!(
                        "core {i}: unknown cache type '{key}'"
                    )));
                }
            }
        }
        Ok(models)
    }

    /// Validates option arithmetic that does not depend on the topology.
    pub fn validate(&self) -> Result<(), SimError> {
        let general = &self.general;
        if general.total_cores == 0 {
            return Err(SimError::config("general/total_cores must be positive"));
        }
        if general.num_sim_threads > general.total_cores {
            return Err(SimError::config(format!(
                "general/num_sim_threads ({}) exceeds total_cores ({})",
                general.num_sim_threads, general.total_cores
            )));
        }

        let dir = &self.perf_model.dram_directory;
        if dir.total_entries == 0 || dir.associativity == 0 {
            return Err(SimError::config(
                "perf_model/dram_directory entries and associativity must be positive",
            ));
        }
        if dir.total_entries % dir.associativity != 0 {
            return Err(SimError::config(format!(
                "perf_model/dram_directory/total_entries ({}) not a multiple of associativity ({})",
                dir.total_entries, dir.associativity
            )));
        }

        let block_size = self.cache_block_size()?;
        if !block_size.is_power_of_two() {
            return Err(SimError::config(format!(
                "cache_block_size ({block_size}) must be a power of two"
            )));
        }
        if (1u64 << dir.home_lookup_param) < u64::from(block_size) {
            return Err(SimError::config(format!(
                "perf_model/dram_directory/home_lookup_param ({}) smaller than log2(block size)",
                dir.home_lookup_param
            )));
        }

        if self.perf_model.dram.per_controller_bandwidth <= 0.0 {
            return Err(SimError::config(
                "perf_model/dram/per_controller_bandwidth must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the cache block size, read from the first core's L1-I type.
    pub fn cache_block_size(&self) -> Result<u32, SimError> {
        let first = first_core_model(&self.perf_model.core.model_list)?;
        self.perf_model
            .l1_icache
            .get(&first.l1_icache_type)
            .map(|c| c.cache_block_size)
            .ok_or_else(|| {
                SimError::config(format!(
                    "unknown l1_icache type '{}'",
                    first.l1_icache_type
                ))
            })
    }

    /// Returns the number of cores carrying DRAM controllers.
    pub fn num_memory_controllers(&self, total_cores: u32) -> u32 {
        match self.perf_model.dram.num_controllers {
            0 => total_cores,
            n => n.min(total_cores),
        }
    }
}

/// Parses the core model list syntax.
///
/// The list is `<num,freq,core_type,l1i,l1d,l2>` tuples separated by commas,
/// e.g. `"<4,2.0,simple,T1,T1,T1>,<12,default,default,default,default,default>"`.
/// The `default` keyword (or an empty list) leaves a slot at its default;
/// a trailing shortfall is filled with defaults and an overshoot is an error.
///
/// # Arguments
///
/// * `list` - The model-list string.
/// * `total_cores` - Number of core slots to fill.
///
/// # Returns
///
/// One [`CoreModel`] per core.
pub fn parse_model_list(list: &str, total_cores: u32) -> Result<Vec<CoreModel>, SimError> {
    let mut models: Vec<CoreModel> = Vec::with_capacity(total_cores as usize);
    let trimmed = list.trim();
    if !trimmed.is_empty() {
        for tuple in split_tuples(trimmed)? {
            let (count, model) = parse_tuple(tuple)?;
            for _ in 0..count {
                models.push(model.clone());
            }
        }
    }
    if models.len() > total_cores as usize {
        return Err(SimError::config(format!(
            "model_list describes {} cores but only {} exist",
            models.len(),
            total_cores
        )));
    }
    models.resize(total_cores as usize, CoreModel::default());
    Ok(models)
}

/// Parses one `num,freq,core_type,l1i,l1d,l2` tuple body.
fn parse_tuple(tuple: &str) -> Result<(u32, CoreModel), SimError> {
    let fields: Vec<&str> = tuple.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(SimError::config(format!(
            "model_list tuple '<{tuple}>' must have 6 fields"
        )));
    }
    let count: u32 = fields[0]
        .parse()
        .map_err(|_| SimError::config(format!("bad core count '{}'", fields[0])))?;
    let base = CoreModel::default();
    let frequency = match fields[1] {
        "default" => base.frequency,
        s => s
            .parse()
            .map_err(|_| SimError::config(format!("bad frequency '{s}'")))?,
    };
    let pick = |s: &str, default: &str| -> String {
        if s == "default" {
            default.to_owned()
        } else {
            s.to_owned()
        }
    };
    Ok((
        count,
        CoreModel {
            frequency,
            core_type: pick(fields[2], &base.core_type),
            l1_icache_type: pick(fields[3], &base.l1_icache_type),
            l1_dcache_type: pick(fields[4], &base.l1_dcache_type),
            l2_cache_type: pick(fields[5], &base.l2_cache_type),
        },
    ))
}

/// Returns the first core's model without needing the core count.
fn first_core_model(list: &str) -> Result<CoreModel, SimError> {
    let trimmed = list.trim();
    if trimmed.is_empty() {
        return Ok(CoreModel::default());
    }
    let tuples = split_tuples(trimmed)?;
    match tuples.first() {
        Some(tuple) => parse_tuple(tuple).map(|(_, model)| model),
        None => Ok(CoreModel::default()),
    }
}

/// Splits `"<a,b>,<c,d>"` into `["a,b", "c,d"]`.
fn split_tuples(list: &str) -> Result<Vec<&str>, SimError> {
    let mut tuples = Vec::new();
    let mut rest = list;
    loop {
        rest = rest.trim_start_matches([',', ' ']);
        if rest.is_empty() {
            break;
        }
        let start = rest
            .find('<')
            .ok_or_else(|| SimError::config(format!("expected '<' in model_list near '{rest}'")))?;
        let end = rest
            .find('>')
            .ok_or_else(|| SimError::config(format!("unterminated tuple in model_list '{rest}'")))?;
        tuples.push(&rest[start + 1..end]);
        rest = &rest[end + 1..];
    }
    Ok(tuples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_model_list_fills_defaults() {
        let models = parse_model_list("", 4).unwrap();
        assert_eq!(models.len(), 4);
        assert_eq!(models[0], CoreModel::default());
    }

    #[test]
    fn tuple_expansion_and_default_keyword() {
        let models =
            parse_model_list("<2,2.0,big,T2,T2,T2>,<1,default,default,default,default,default>", 4)
                .unwrap();
        assert_eq!(models.len(), 4);
        assert!((models[0].frequency - 2.0).abs() < f64::EPSILON);
        assert_eq!(models[1].l2_cache_type, "T2");
        assert_eq!(models[2], CoreModel::default());
        assert_eq!(models[3], CoreModel::default());
    }

    #[test]
    fn overfull_model_list_is_rejected() {
        assert!(parse_model_list("<5,1.0,a,T1,T1,T1>", 4).is_err());
    }

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }
}
