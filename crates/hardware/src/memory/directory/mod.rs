//! Directory cache: the set-associative store of directory entries.
//!
//! Each memory-controller core owns one slice of the global directory,
//! organized as a set-associative cache of [`DirectoryEntry`] records. An
//! entry displaced by a conflicting allocation is parked on a side list
//! while a nullify transaction drains it back to `Uncached`; it stays
//! addressable until the nullify completes.

/// Directory entries and their sharer-tracking variants.
pub mod entry;

pub use entry::{DirectoryEntry, DirectoryEntryKind, DirectoryState};

use crate::common::Time;
use crate::config::{DirectoryType, DramDirectoryConfig};

/// A candidate for entry replacement.
#[derive(Debug, Clone, Copy)]
pub struct ReplacementCandidate {
    /// Address the candidate currently tracks.
    pub address: u64,
    /// Its sharer count; replacement prefers the fewest.
    pub num_sharers: u32,
}

/// One core's slice of the directory, as a set-associative entry cache.
#[derive(Debug)]
pub struct DirectoryCache {
    directory_type: DirectoryType,
    num_sets: usize,
    associativity: usize,
    max_hw_sharers: u32,
    max_num_sharers: u32,
    access_delay: Time,
    log_block_size: u32,
    log_num_dram_cntlrs: u32,
    sets: Vec<Vec<Option<DirectoryEntry>>>,
    replaced_entries: Vec<DirectoryEntry>,
    num_replacements: u64,
}

impl DirectoryCache {
    /// Creates a directory slice.
    ///
    /// # Arguments
    ///
    /// * `config` - Directory parameters (entries, associativity, type).
    /// * `cache_block_size` - Block size in bytes.
    /// * `max_num_sharers` - Total core count.
    /// * `num_dram_cntlrs` - Number of directory slices; set indexing skips
    ///   the bits consumed by slice interleaving.
    pub fn new(
        config: &DramDirectoryConfig,
        cache_block_size: u32,
        max_num_sharers: u32,
        num_dram_cntlrs: u32,
    ) -> Self {
        let associativity = config.associativity as usize;
        let num_sets = (config.total_entries / config.associativity) as usize;
        Self {
            directory_type: config.directory_type,
            num_sets,
            associativity,
            max_hw_sharers: config.max_hw_sharers,
            max_num_sharers,
            access_delay: config.directory_cache_access_time,
            log_block_size: cache_block_size.trailing_zeros(),
            log_num_dram_cntlrs: num_dram_cntlrs.next_power_of_two().trailing_zeros(),
            sets: vec![vec![None; associativity]; num_sets],
            replaced_entries: Vec::new(),
            num_replacements: 0,
        }
    }

    fn set_index(&self, address: u64) -> usize {
        let block_num = address >> self.log_block_size;
        ((block_num >> self.log_num_dram_cntlrs) % self.num_sets as u64) as usize
    }

    /// Returns the entry tracking `address`, if present (including an entry
    /// parked for nullification).
    pub fn entry_mut(&mut self, address: u64) -> Option<&mut DirectoryEntry> {
        let set = self.set_index(address);
        let in_set = self.sets[set]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.address() == address));
        if let Some(way) = in_set {
            return self.sets[set][way].as_mut();
        }
        self.replaced_entries
            .iter_mut()
            .find(|e| e.address() == address)
    }

    /// Returns the entry tracking `address` immutably.
    pub fn entry(&self, address: u64) -> Option<&DirectoryEntry> {
        let set = self.set_index(address);
        self.sets[set]
            .iter()
            .filter_map(Option::as_ref)
            .find(|e| e.address() == address)
            .or_else(|| self.replaced_entries.iter().find(|e| e.address() == address))
    }

    /// Allocates an entry for `address` in a free way of its set.
    ///
    /// # Returns
    ///
    /// `true` if a free way existed and the entry was created; `false`
    /// means the set is full and the caller must replace an entry.
    pub fn allocate(&mut self, address: u64) -> bool {
        let set = self.set_index(address);
        let free = self.sets[set].iter().position(Option::is_none);
        match free {
            Some(way) => {
                self.sets[set][way] = Some(DirectoryEntry::new(
                    self.directory_type,
                    address,
                    self.max_hw_sharers,
                    self.max_num_sharers,
                ));
                true
            }
            None => false,
        }
    }

    /// Lists the entries in `address`'s set as replacement candidates.
    pub fn replacement_candidates(&self, address: u64) -> Vec<ReplacementCandidate> {
        let set = self.set_index(address);
        self.sets[set]
            .iter()
            .filter_map(Option::as_ref)
            .map(|e| ReplacementCandidate {
                address: e.address(),
                num_sharers: e.num_sharers(),
            })
            .collect()
    }

    /// Replaces the entry tracking `replaced_address` with a fresh entry
    /// for `address`.
    ///
    /// The displaced entry moves to the side list, where it remains
    /// addressable until a nullify transaction invalidates it.
    pub fn replace_entry(&mut self, replaced_address: u64, address: u64) {
        let set = self.set_index(address);
        debug_assert_eq!(set, self.set_index(replaced_address));
        for slot in &mut self.sets[set] {
            if slot.as_ref().is_some_and(|e| e.address() == replaced_address) {
                let displaced = slot.take();
                if let Some(displaced) = displaced {
                    self.replaced_entries.push(displaced);
                }
                *slot = Some(DirectoryEntry::new(
                    self.directory_type,
                    address,
                    self.max_hw_sharers,
                    self.max_num_sharers,
                ));
                self.num_replacements += 1;
                return;
            }
        }
    }

    /// Deletes the entry tracking `address` (set or side list).
    pub fn invalidate_entry(&mut self, address: u64) {
        let set = self.set_index(address);
        for slot in &mut self.sets[set] {
            if slot.as_ref().is_some_and(|e| e.address() == address) {
                *slot = None;
                return;
            }
        }
        self.replaced_entries.retain(|e| e.address() != address);
    }

    /// Returns the directory cache access delay in cycles.
    pub fn access_delay(&self) -> Time {
        self.access_delay
    }

    /// Returns the current sharer-count histogram: index `i` counts entries
    /// with exactly `i` sharers.
    pub fn sharer_histogram(&self) -> Vec<u64> {
        let mut histogram = vec![0u64; self.max_num_sharers as usize + 1];
        for entry in self.sets.iter().flatten().filter_map(Option::as_ref) {
            let count = (entry.num_sharers() as usize).min(self.max_num_sharers as usize);
            histogram[count] += 1;
        }
        histogram
    }

    /// Writes the directory summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  Dram Directory Cache:")?;
        writeln!(out, "    replacements: {}", self.num_replacements)?;
        write!(out, "    sharer count histogram:")?;
        for (count, entries) in self
            .sharer_histogram()
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
        {
            write!(out, " {count}:{entries}")?;
        }
        writeln!(out)
    }
}
