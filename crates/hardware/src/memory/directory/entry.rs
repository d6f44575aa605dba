//! Directory entries and their sharer-tracking variants.
//!
//! One [`DirectoryEntry`] tracks one cached block: its directory state, its
//! owner while modified, and the sharer set. Five representations are
//! selectable by configuration; they differ in how a full pointer list is
//! handled:
//! 1. **FullMap:** One bit per core; never overflows.
//! 2. **LimitedNoBroadcast:** Hard bound; the controller must evict a
//!    sharer to admit a new one.
//! 3. **LimitedBroadcast:** Overflow stops tracking individuals and forces
//!    broadcast invalidation.
//! 4. **Ackwise:** Overflow counts untracked sharers; invalidation
//!    broadcasts but acknowledgements are counted exactly.
//! 5. **Limitless:** Overflow traps to a software handler that tracks the
//!    remainder at extra latency.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{CoreId, INVALID_CORE_ID, Time};
use crate::config::DirectoryType;

/// State of a block in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    /// No cache holds the block.
    Uncached,
    /// One or more caches hold clean copies.
    Shared,
    /// Exactly one cache holds a dirty copy.
    Modified,
}

/// Sharer-tracking representation, selected by `directory_type`.
#[derive(Debug, Clone)]
pub enum DirectoryEntryKind {
    /// Bitset over all cores.
    FullMap {
        /// One bit per core.
        sharers: Vec<u64>,
    },
    /// Bounded pointer list; overflow is the caller's problem.
    LimitedNoBroadcast {
        /// Tracked sharers.
        sharers: Vec<CoreId>,
    },
    /// Bounded pointer list; overflow stops tracking and broadcasts.
    LimitedBroadcast {
        /// Tracked sharers.
        sharers: Vec<CoreId>,
        /// Whether tracking overflowed.
        global_enabled: bool,
        /// Total sharers, tracked or not.
        num_sharers: u32,
    },
    /// Bounded pointer list with an exact count of untracked sharers.
    Ackwise {
        /// Tracked sharers.
        sharers: Vec<CoreId>,
        /// Whether tracking overflowed.
        global_enabled: bool,
        /// Sharers beyond the tracked list.
        num_untracked_sharers: u32,
    },
    /// Bounded hardware list with a software-handled overflow list.
    Limitless {
        /// Hardware-tracked sharers.
        hw_sharers: Vec<CoreId>,
        /// Software-tracked overflow sharers.
        sw_sharers: Vec<CoreId>,
    },
}

/// Latency of a Limitless software trap, in cycles.
const LIMITLESS_SOFTWARE_TRAP_PENALTY: Time = 100;

/// One directory entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    address: u64,
    state: DirectoryState,
    owner: CoreId,
    max_hw_sharers: u32,
    kind: DirectoryEntryKind,
    rng: StdRng,
}

impl DirectoryEntry {
    /// Creates an entry for `address` in the `Uncached` state.
    ///
    /// # Arguments
    ///
    /// * `directory_type` - Representation variant.
    /// * `address` - Block-aligned address.
    /// * `max_hw_sharers` - Pointer-list bound for limited variants.
    /// * `max_num_sharers` - Total core count (bitset width for FullMap).
    pub fn new(
        directory_type: DirectoryType,
        address: u64,
        max_hw_sharers: u32,
        max_num_sharers: u32,
    ) -> Self {
        let kind = match directory_type {
            DirectoryType::FullMap => DirectoryEntryKind::FullMap {
                sharers: vec![0; (max_num_sharers as usize).div_ceil(64)],
            },
            DirectoryType::LimitedNoBroadcast => DirectoryEntryKind::LimitedNoBroadcast {
                sharers: Vec::new(),
            },
            DirectoryType::LimitedBroadcast => DirectoryEntryKind::LimitedBroadcast {
                sharers: Vec::new(),
                global_enabled: false,
                num_sharers: 0,
            },
            DirectoryType::Ackwise => DirectoryEntryKind::Ackwise {
                sharers: Vec::new(),
                global_enabled: false,
                num_untracked_sharers: 0,
            },
            DirectoryType::Limitless => DirectoryEntryKind::Limitless {
                hw_sharers: Vec::new(),
                sw_sharers: Vec::new(),
            },
        };
        Self {
            address,
            state: DirectoryState::Uncached,
            owner: INVALID_CORE_ID,
            max_hw_sharers,
            kind,
            rng: StdRng::seed_from_u64(address),
        }
    }

    /// Returns the block address this entry tracks.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Retargets the entry to a new address (used on replacement).
    pub fn set_address(&mut self, address: u64) {
        self.address = address;
    }

    /// Returns the directory state.
    pub fn state(&self) -> DirectoryState {
        self.state
    }

    /// Sets the directory state.
    pub fn set_state(&mut self, state: DirectoryState) {
        self.state = state;
    }

    /// Returns the owner; valid exactly when the state is `Modified`.
    pub fn owner(&self) -> CoreId {
        self.owner
    }

    /// Sets the owner.
    pub fn set_owner(&mut self, owner: CoreId) {
        self.owner = owner;
    }

    /// Returns whether `core_id` is a tracked sharer.
    pub fn has_sharer(&self, core_id: CoreId) -> bool {
        match &self.kind {
            DirectoryEntryKind::FullMap { sharers } => {
                let idx = core_id as usize;
                sharers[idx / 64] & (1 << (idx % 64)) != 0
            }
            DirectoryEntryKind::LimitedNoBroadcast { sharers }
            | DirectoryEntryKind::LimitedBroadcast { sharers, .. }
            | DirectoryEntryKind::Ackwise { sharers, .. } => sharers.contains(&core_id),
            DirectoryEntryKind::Limitless {
                hw_sharers,
                sw_sharers,
            } => hw_sharers.contains(&core_id) || sw_sharers.contains(&core_id),
        }
    }

    /// Attempts to add a sharer.
    ///
    /// # Returns
    ///
    /// `false` only for the LimitedNoBroadcast variant with a full pointer
    /// list: the caller must evict an existing sharer first. Every other
    /// variant absorbs the overflow and returns `true`.
    pub fn add_sharer(&mut self, core_id: CoreId) -> bool {
        let max = self.max_hw_sharers as usize;
        match &mut self.kind {
            DirectoryEntryKind::FullMap { sharers } => {
                let idx = core_id as usize;
                debug_assert_eq!(sharers[idx / 64] & (1 << (idx % 64)), 0);
                sharers[idx / 64] |= 1 << (idx % 64);
                true
            }
            DirectoryEntryKind::LimitedNoBroadcast { sharers } => {
                if sharers.len() >= max {
                    return false;
                }
                sharers.push(core_id);
                true
            }
            DirectoryEntryKind::LimitedBroadcast {
                sharers,
                global_enabled,
                num_sharers,
            } => {
                if sharers.len() < max {
                    sharers.push(core_id);
                } else {
                    *global_enabled = true;
                }
                *num_sharers += 1;
                true
            }
            DirectoryEntryKind::Ackwise {
                sharers,
                global_enabled,
                num_untracked_sharers,
            } => {
                if sharers.len() < max {
                    sharers.push(core_id);
                } else {
                    *global_enabled = true;
                    *num_untracked_sharers += 1;
                }
                true
            }
            DirectoryEntryKind::Limitless {
                hw_sharers,
                sw_sharers,
            } => {
                if hw_sharers.len() < max {
                    hw_sharers.push(core_id);
                } else {
                    sw_sharers.push(core_id);
                }
                true
            }
        }
    }

    /// Removes a sharer (tracked or untracked).
    pub fn remove_sharer(&mut self, core_id: CoreId) {
        match &mut self.kind {
            DirectoryEntryKind::FullMap { sharers } => {
                let idx = core_id as usize;
                sharers[idx / 64] &= !(1 << (idx % 64));
            }
            DirectoryEntryKind::LimitedNoBroadcast { sharers } => {
                sharers.retain(|&c| c != core_id);
            }
            DirectoryEntryKind::LimitedBroadcast {
                sharers,
                global_enabled,
                num_sharers,
            } => {
                sharers.retain(|&c| c != core_id);
                *num_sharers = num_sharers.saturating_sub(1);
                if *num_sharers == 0 {
                    *global_enabled = false;
                }
            }
            DirectoryEntryKind::Ackwise {
                sharers,
                global_enabled,
                num_untracked_sharers,
            } => {
                let before = sharers.len();
                sharers.retain(|&c| c != core_id);
                if sharers.len() == before {
                    *num_untracked_sharers = num_untracked_sharers.saturating_sub(1);
                }
                if *num_untracked_sharers == 0 && sharers.is_empty() {
                    *global_enabled = false;
                }
            }
            DirectoryEntryKind::Limitless {
                hw_sharers,
                sw_sharers,
            } => {
                let before = hw_sharers.len();
                hw_sharers.retain(|&c| c != core_id);
                if hw_sharers.len() == before {
                    sw_sharers.retain(|&c| c != core_id);
                }
            }
        }
    }

    /// Returns the sharer set for invalidation.
    ///
    /// # Returns
    ///
    /// `(broadcast_needed, tracked_sharers)`: when `broadcast_needed` is
    /// true, untracked sharers exist and the caller must broadcast rather
    /// than multicast to the explicit list.
    pub fn sharers_list(&self) -> (bool, Vec<CoreId>) {
        match &self.kind {
            DirectoryEntryKind::FullMap { sharers } => {
                let mut list = Vec::new();
                for (word_idx, &word) in sharers.iter().enumerate() {
                    let mut bits = word;
                    while bits != 0 {
                        let bit = bits.trailing_zeros();
                        list.push((word_idx * 64) as CoreId + bit as CoreId);
                        bits &= bits - 1;
                    }
                }
                (false, list)
            }
            DirectoryEntryKind::LimitedNoBroadcast { sharers } => (false, sharers.clone()),
            DirectoryEntryKind::LimitedBroadcast {
                sharers,
                global_enabled,
                ..
            }
            | DirectoryEntryKind::Ackwise {
                sharers,
                global_enabled,
                ..
            } => (*global_enabled, sharers.clone()),
            DirectoryEntryKind::Limitless {
                hw_sharers,
                sw_sharers,
            } => {
                let mut list = hw_sharers.clone();
                list.extend_from_slice(sw_sharers);
                (false, list)
            }
        }
    }

    /// Returns one tracked sharer, for sharer eviction.
    pub fn one_sharer(&mut self) -> Option<CoreId> {
        let (_, list) = self.sharers_list();
        if list.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..list.len());
        Some(list[idx])
    }

    /// Returns the number of sharers, tracked or not.
    pub fn num_sharers(&self) -> u32 {
        match &self.kind {
            DirectoryEntryKind::FullMap { sharers } => {
                sharers.iter().map(|w| w.count_ones()).sum()
            }
            DirectoryEntryKind::LimitedNoBroadcast { sharers } => sharers.len() as u32,
            DirectoryEntryKind::LimitedBroadcast { num_sharers, .. } => *num_sharers,
            DirectoryEntryKind::Ackwise {
                sharers,
                num_untracked_sharers,
                ..
            } => sharers.len() as u32 + num_untracked_sharers,
            DirectoryEntryKind::Limitless {
                hw_sharers,
                sw_sharers,
            } => (hw_sharers.len() + sw_sharers.len()) as u32,
        }
    }

    /// Returns the representation-dependent access latency in cycles.
    ///
    /// Only Limitless charges anything: the software trap once the
    /// hardware list has overflowed.
    pub fn access_latency(&self) -> Time {
        match &self.kind {
            DirectoryEntryKind::Limitless { sw_sharers, .. } if !sw_sharers.is_empty() => {
                LIMITLESS_SOFTWARE_TRAP_PENALTY
            }
            _ => 0,
        }
    }
}
