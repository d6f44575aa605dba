//! Configuration parsing and validation tests.

use pretty_assertions::assert_eq;

use nocsim_core::config::{Config, NetworkModelKind, parse_model_list};
use nocsim_core::Simulator;

use crate::common::magic_config;

/// The model-list tuple syntax expands counts and honors `default`.
#[test]
fn model_list_tuples_expand() {
    let models =
        parse_model_list("<2,1.5,fast,T1,T1,T1>,<1,default,default,default,default,default>", 4)
            .unwrap();
    assert_eq!(models.len(), 4);
    assert!((models[0].frequency - 1.5).abs() < f64::EPSILON);
    assert_eq!(models[0].core_type, "fast");
    assert!((models[2].frequency - 1.0).abs() < f64::EPSILON);
}

/// A model list naming an unknown cache type is a configuration error.
#[test]
fn unknown_cache_type_is_rejected() {
    let mut config = magic_config(2);
    config.perf_model.core.model_list = "<2,1.0,simple,NOPE,T1,T1>".to_owned();
    assert!(Simulator::new(config).is_err());
}

/// num_sim_threads above total_cores is a configuration error.
#[test]
fn too_many_sim_threads_is_rejected() {
    let mut config = magic_config(2);
    config.general.num_sim_threads = 4;
    assert!(config.validate().is_err());
}

/// A home-lookup granularity below the block size is a configuration
/// error.
#[test]
fn home_lookup_below_block_size_is_rejected() {
    let mut config = magic_config(2);
    config.perf_model.dram_directory.home_lookup_param = 3;
    assert!(config.validate().is_err());
}

/// The finite-buffer e-mesh rounds a requested core count up to the next
/// full mesh.
#[test]
fn emesh_rounds_core_count_up() {
    let mut config = Config::default();
    config.general.total_cores = 14;
    config.network.memory_model_1 = NetworkModelKind::FiniteBufferEmesh;
    let sim = Simulator::new(config).unwrap();
    // floor(sqrt(14)) = 3 wide, ceil(14/3) = 5 tall.
    assert_eq!(sim.total_cores(), 15);
}

/// The ATAC rounds up to the next power of two at least one cluster big.
#[test]
fn atac_rounds_to_a_power_of_two() {
    let mut config = Config::default();
    config.general.total_cores = 20;
    config.network.memory_model_1 = NetworkModelKind::FiniteBufferAtac;
    config.network.atac.cluster_size = 8;
    let sim = Simulator::new(config).unwrap();
    assert_eq!(sim.total_cores(), 32);
}

/// The default configuration builds a working machine.
#[test]
fn default_config_builds() {
    let sim = Simulator::new(Config::default()).unwrap();
    assert_eq!(sim.total_cores(), 16);
}
