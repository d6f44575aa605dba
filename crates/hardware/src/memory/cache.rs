//! Set-associative cache with coherence states and block data.
//!
//! This module implements the cache array used for the private L1-I, L1-D,
//! and L2 caches. It provides:
//! 1. **State + data storage:** Each block carries a coherence state, the
//!    block payload, and (for the L2) which L1 currently holds a copy.
//! 2. **Replacement policies:** LRU, FIFO, and random, behind a trait.
//! 3. **Counters:** Hit/miss counts for the output summary.
//!
//! Timing is not modeled here; the controllers charge access latencies
//! through their cache performance models.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{CacheTypeConfig, ReplacementPolicy as PolicyKind};
use crate::memory::MemComponent;

/// Coherence state of one cache block.
///
/// `Exclusive` and `Owned` exist for the state lattice but are never entered
/// by the MSI protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheState {
    /// Block not present.
    Invalid,
    /// Clean copy; other caches may share it.
    Shared,
    /// Dirty copy; responsible for supplying data, others may share.
    Owned,
    /// Clean exclusive copy.
    Exclusive,
    /// Dirty exclusive copy.
    Modified,
}

impl CacheState {
    /// Returns whether a read may be served from this state.
    #[inline]
    pub fn readable(self) -> bool {
        self >= Self::Shared
    }

    /// Returns whether a write may be served from this state.
    #[inline]
    pub fn writable(self) -> bool {
        self == Self::Modified
    }
}

/// Replacement policy for one cache; chooses victims within a set.
pub trait ReplacementPolicy {
    /// Returns the victim way for the given set.
    fn get_victim(&mut self, set_index: usize) -> usize;
    /// Records a use of `way` in `set_index`.
    fn update(&mut self, set_index: usize, way: usize);
}

/// Least-recently-used replacement.
struct LruPolicy {
    // One logical timestamp per line, row-major by set.
    stamps: Vec<u64>,
    ways: usize,
    clock: u64,
}

impl LruPolicy {
    fn new(num_sets: usize, ways: usize) -> Self {
        Self {
            stamps: vec![0; num_sets * ways],
            ways,
            clock: 0,
        }
    }
}

impl ReplacementPolicy for LruPolicy {
    fn get_victim(&mut self, set_index: usize) -> usize {
        let base = set_index * self.ways;
        let mut victim = 0;
        for way in 1..self.ways {
            if self.stamps[base + way] < self.stamps[base + victim] {
                victim = way;
            }
        }
        victim
    }

    fn update(&mut self, set_index: usize, way: usize) {
        self.clock += 1;
        self.stamps[set_index * self.ways + way] = self.clock;
    }
}

/// First-in-first-out replacement.
struct FifoPolicy {
    next: Vec<usize>,
    ways: usize,
}

impl FifoPolicy {
    fn new(num_sets: usize, ways: usize) -> Self {
        Self {
            next: vec![0; num_sets],
            ways,
        }
    }
}

impl ReplacementPolicy for FifoPolicy {
    fn get_victim(&mut self, set_index: usize) -> usize {
        let victim = self.next[set_index];
        self.next[set_index] = (victim + 1) % self.ways;
        victim
    }

    fn update(&mut self, _set_index: usize, _way: usize) {}
}

/// Uniform-random replacement.
struct RandomPolicy {
    rng: StdRng,
    ways: usize,
}

impl RandomPolicy {
    fn new(ways: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ways,
        }
    }
}

impl ReplacementPolicy for RandomPolicy {
    fn get_victim(&mut self, set_index: usize) -> usize {
        let _ = set_index;
        self.rng.gen_range(0..self.ways)
    }

    fn update(&mut self, _set_index: usize, _way: usize) {}
}

/// One cache line: tag, coherence state, L1 residence, and data.
#[derive(Debug, Clone)]
pub struct CacheLine {
    tag: u64,
    state: CacheState,
    /// Which L1 holds this block (L2 only); `None` if no L1 copy exists.
    cached_loc: Option<MemComponent>,
    data: Vec<u8>,
}

impl CacheLine {
    fn empty(block_size: usize) -> Self {
        Self {
            tag: 0,
            state: CacheState::Invalid,
            cached_loc: None,
            data: vec![0; block_size],
        }
    }

    /// Returns the coherence state.
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Sets the coherence state.
    pub fn set_state(&mut self, state: CacheState) {
        self.state = state;
    }

    /// Returns which L1 holds this block, if any.
    pub fn cached_loc(&self) -> Option<MemComponent> {
        self.cached_loc
    }

    /// Records that `component` now holds this block.
    pub fn set_cached_loc(&mut self, component: MemComponent) {
        self.cached_loc = Some(component);
    }

    /// Clears the L1 residence marker.
    pub fn clear_cached_loc(&mut self) {
        self.cached_loc = None;
    }
}

/// A block evicted to make room for an insertion.
#[derive(Debug)]
pub struct Eviction {
    /// Block-aligned address of the evicted block.
    pub address: u64,
    /// State the block was in.
    pub state: CacheState,
    /// Which L1 held the block (L2 only).
    pub cached_loc: Option<MemComponent>,
    /// The block payload.
    pub data: Vec<u8>,
}

/// Set-associative cache array.
pub struct Cache {
    name: String,
    num_sets: usize,
    associativity: usize,
    block_size: usize,
    lines: Vec<CacheLine>,
    policy: Box<dyn ReplacementPolicy + Send>,
    enabled: bool,
    hits: u64,
    misses: u64,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("num_sets", &self.num_sets)
            .field("associativity", &self.associativity)
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Creates a cache from one named type configuration.
    ///
    /// # Arguments
    ///
    /// * `name` - Display name for the summary (e.g. `"L1-D"`).
    /// * `config` - Size, associativity, and replacement policy.
    /// * `block_size` - Block size in bytes, shared across the hierarchy.
    pub fn new(name: &str, config: &CacheTypeConfig, block_size: u32) -> Self {
        let block_size = block_size as usize;
        let associativity = (config.associativity as usize).max(1);
        let num_lines = (config.cache_size as usize / block_size).max(associativity);
        let num_sets = num_lines / associativity;

        let policy: Box<dyn ReplacementPolicy + Send> = match config.replacement_policy {
            PolicyKind::Lru => Box::new(LruPolicy::new(num_sets, associativity)),
            PolicyKind::Fifo => Box::new(FifoPolicy::new(num_sets, associativity)),
            PolicyKind::Random => {
                Box::new(RandomPolicy::new(associativity, num_sets as u64))
            }
        };

        Self {
            name: name.to_owned(),
            num_sets,
            associativity,
            block_size,
            lines: vec![CacheLine::empty(block_size); num_sets * associativity],
            policy,
            enabled: false,
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn split(&self, address: u64) -> (usize, u64) {
        let block_num = address / self.block_size as u64;
        ((block_num % self.num_sets as u64) as usize, block_num / self.num_sets as u64)
    }

    fn find(&self, address: u64) -> Option<usize> {
        let (set, tag) = self.split(address);
        let base = set * self.associativity;
        (0..self.associativity)
            .map(|w| base + w)
            .find(|&i| self.lines[i].state != CacheState::Invalid && self.lines[i].tag == tag)
    }

    /// Returns the line holding `address` without touching the policy.
    pub fn peek_line(&self, address: u64) -> Option<&CacheLine> {
        self.find(address).map(|i| &self.lines[i])
    }

    /// Returns the line holding `address` mutably, without touching the
    /// policy.
    pub fn peek_line_mut(&mut self, address: u64) -> Option<&mut CacheLine> {
        self.find(address).map(move |i| &mut self.lines[i])
    }

    /// Returns the coherence state for `address` (`Invalid` if absent).
    pub fn state_of(&self, address: u64) -> CacheState {
        self.peek_line(address).map_or(CacheState::Invalid, CacheLine::state)
    }

    /// Copies bytes out of a resident block.
    ///
    /// # Arguments
    ///
    /// * `address` - Block-aligned address.
    /// * `offset` - Byte offset within the block.
    /// * `out` - Destination; `offset + out.len()` must fit in the block.
    ///
    /// # Returns
    ///
    /// `true` if the block was resident and the copy happened.
    pub fn read_bytes(&mut self, address: u64, offset: usize, out: &mut [u8]) -> bool {
        let (set, _) = self.split(address);
        if let Some(i) = self.find(address) {
            out.copy_from_slice(&self.lines[i].data[offset..offset + out.len()]);
            self.policy.update(set, i - set * self.associativity);
            true
        } else {
            false
        }
    }

    /// Copies bytes into a resident block.
    ///
    /// # Returns
    ///
    /// `true` if the block was resident and the copy happened.
    pub fn write_bytes(&mut self, address: u64, offset: usize, data: &[u8]) -> bool {
        let (set, _) = self.split(address);
        if let Some(i) = self.find(address) {
            self.lines[i].data[offset..offset + data.len()].copy_from_slice(data);
            self.policy.update(set, i - set * self.associativity);
            true
        } else {
            false
        }
    }

    /// Inserts a block, possibly evicting a valid line from its set.
    ///
    /// # Arguments
    ///
    /// * `address` - Block-aligned address.
    /// * `state` - Initial coherence state.
    /// * `data` - Block payload (`block_size` bytes).
    ///
    /// # Returns
    ///
    /// The eviction, if a valid line had to make room.
    pub fn insert_block(&mut self, address: u64, state: CacheState, data: &[u8]) -> Option<Eviction> {
        debug_assert_eq!(data.len(), self.block_size);
        let (set, tag) = self.split(address);
        let base = set * self.associativity;

        // Prefer an invalid way; otherwise ask the policy for a victim.
        let way = (0..self.associativity)
            .find(|&w| self.lines[base + w].state == CacheState::Invalid)
            .unwrap_or_else(|| self.policy.get_victim(set));
        let idx = base + way;

        let eviction = if self.lines[idx].state == CacheState::Invalid {
            None
        } else {
            let old = &self.lines[idx];
            Some(Eviction {
                address: (old.tag * self.num_sets as u64 + set as u64) * self.block_size as u64,
                state: old.state,
                cached_loc: old.cached_loc,
                data: old.data.clone(),
            })
        };

        let line = &mut self.lines[idx];
        line.tag = tag;
        line.state = state;
        line.cached_loc = None;
        line.data.copy_from_slice(data);
        self.policy.update(set, way);

        eviction
    }

    /// Invalidates the block holding `address`, if resident.
    pub fn invalidate_block(&mut self, address: u64) {
        if let Some(i) = self.find(address) {
            self.lines[i].state = CacheState::Invalid;
            self.lines[i].cached_loc = None;
        }
    }

    /// Records a hit or miss in the counters when modeling is enabled.
    pub fn update_counters(&mut self, hit: bool) {
        if !self.enabled {
            return;
        }
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    /// Returns the block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Enables counter accumulation.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disables counter accumulation.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Clears the counters.
    pub fn reset_counters(&mut self) {
        self.hits = 0;
        self.misses = 0;
    }

    /// Returns (hits, misses).
    pub fn counters(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Writes the per-cache summary block.
    pub fn output_summary(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(out, "  {} Cache:", self.name)?;
        writeln!(out, "    hits: {}", self.hits)?;
        writeln!(out, "    misses: {}", self.misses)
    }
}
