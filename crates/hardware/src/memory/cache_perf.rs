//! Cache access-latency model.
//!
//! Each cache level owns one of these; the memory manager charges the
//! simulated clock through it. The model distinguishes tag-only accesses
//! (a miss probe) from combined data+tags accesses (a hit or a fill), and
//! combines the two array latencies according to the configured type.

use crate::common::Time;
use crate::config::{CachePerfModelType, CacheTypeConfig};

/// Which cache arrays an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAccess {
    /// Tag array only (miss probe).
    Tags,
    /// Data array only.
    Data,
    /// Both arrays (hit or fill).
    DataAndTags,
}

/// Latency model for one cache.
#[derive(Debug, Clone)]
pub struct CachePerfModel {
    model_type: CachePerfModelType,
    data_access_time: Time,
    tags_access_time: Time,
    enabled: bool,
}

impl CachePerfModel {
    /// Creates the model from a cache type configuration.
    pub fn new(config: &CacheTypeConfig) -> Self {
        Self {
            model_type: config.perf_model_type,
            data_access_time: config.data_access_time,
            tags_access_time: config.tags_access_time,
            enabled: false,
        }
    }

    /// Returns the latency of an access in cycles; zero while disabled.
    pub fn latency(&self, access: CacheAccess) -> Time {
        if !self.enabled {
            return 0;
        }
        match access {
            CacheAccess::Tags => self.tags_access_time,
            CacheAccess::Data => self.data_access_time,
            CacheAccess::DataAndTags => match self.model_type {
                CachePerfModelType::Parallel => self.data_access_time.max(self.tags_access_time),
                CachePerfModelType::Sequential => self.data_access_time + self.tags_access_time,
            },
        }
    }

    /// Enables latency accounting.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables latency accounting.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model_type: CachePerfModelType) -> CacheTypeConfig {
        CacheTypeConfig {
            data_access_time: 8,
            tags_access_time: 3,
            perf_model_type: model_type,
            ..CacheTypeConfig::default()
        }
    }

    #[test]
    fn disabled_model_charges_nothing() {
        let model = CachePerfModel::new(&config(CachePerfModelType::Parallel));
        assert_eq!(model.latency(CacheAccess::DataAndTags), 0);
    }

    #[test]
    fn parallel_takes_max_sequential_takes_sum() {
        let mut parallel = CachePerfModel::new(&config(CachePerfModelType::Parallel));
        parallel.enable();
        assert_eq!(parallel.latency(CacheAccess::DataAndTags), 8);
        assert_eq!(parallel.latency(CacheAccess::Tags), 3);

        let mut sequential = CachePerfModel::new(&config(CachePerfModelType::Sequential));
        sequential.enable();
        assert_eq!(sequential.latency(CacheAccess::DataAndTags), 11);
    }
}
