//! Address-to-home mapping for directory slices.
//!
//! The directory is sliced across the cores that carry memory controllers.
//! An address's home is found by interleaving at a configured power-of-two
//! granularity over the controller core list.

use crate::common::{CoreId, SimError};

/// Maps block addresses to the core owning their directory slice.
#[derive(Debug, Clone)]
pub struct AddressHomeLookup {
    log_granularity: u32,
    home_cores: Vec<CoreId>,
}

impl AddressHomeLookup {
    /// Creates a lookup.
    ///
    /// # Arguments
    ///
    /// * `log_granularity` - Log2 of the interleaving granularity in bytes;
    ///   must cover at least one cache block.
    /// * `home_cores` - Cores carrying directory slices, in slice order.
    /// * `cache_block_size` - Block size in bytes.
    pub fn new(
        log_granularity: u32,
        home_cores: Vec<CoreId>,
        cache_block_size: u32,
    ) -> Result<Self, SimError> {
        if home_cores.is_empty() {
            return Err(SimError::config("no cores carry a memory controller"));
        }
        if (1u64 << log_granularity) < u64::from(cache_block_size) {
            return Err(SimError::config(format!(
                "home_lookup_param ({log_granularity}) below log2(cache block size)"
            )));
        }
        Ok(Self {
            log_granularity,
            home_cores,
        })
    }

    /// Returns the home core for `address`.
    pub fn home(&self, address: u64) -> CoreId {
        let slice = (address >> self.log_granularity) % self.home_cores.len() as u64;
        self.home_cores[slice as usize]
    }

    /// Returns the controller core list.
    pub fn home_cores(&self) -> &[CoreId] {
        &self.home_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_across_home_cores() {
        let lookup = AddressHomeLookup::new(6, vec![0, 4, 8], 64).unwrap();
        assert_eq!(lookup.home(0), 0);
        assert_eq!(lookup.home(64), 4);
        assert_eq!(lookup.home(128), 8);
        assert_eq!(lookup.home(192), 0);
        // Same block maps to the same home regardless of offset.
        assert_eq!(lookup.home(65), 4);
    }

    #[test]
    fn granularity_below_block_size_is_rejected() {
        assert!(AddressHomeLookup::new(4, vec![0], 64).is_err());
    }
}
