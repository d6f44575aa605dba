//! Directory entry representation tests.
//!
//! Each variant differs only in how it absorbs sharer-list overflow; these
//! tests pin down the overflow policies and the invariants shared by all:
//! the owner is valid exactly in MODIFIED, and the sharer set is nonempty
//! exactly outside UNCACHED.

use nocsim_core::config::DirectoryType;
use nocsim_core::memory::directory::entry::DirectoryEntry;
use rstest::rstest;

fn entry(directory_type: DirectoryType) -> DirectoryEntry {
    DirectoryEntry::new(directory_type, 0x1000, 2, 8)
}

// ══════════════════════════════════════════════════════════
// 1. Shared behavior
// ══════════════════════════════════════════════════════════

/// All variants add, find, and remove sharers below the hardware bound.
#[rstest]
#[case(DirectoryType::FullMap)]
#[case(DirectoryType::LimitedNoBroadcast)]
#[case(DirectoryType::LimitedBroadcast)]
#[case(DirectoryType::Ackwise)]
#[case(DirectoryType::Limitless)]
fn add_find_remove_below_bound(#[case] directory_type: DirectoryType) {
    let mut entry = entry(directory_type);
    assert!(entry.add_sharer(3));
    assert!(entry.has_sharer(3));
    assert_eq!(entry.num_sharers(), 1);

    let (broadcast, sharers) = entry.sharers_list();
    assert!(!broadcast);
    assert_eq!(sharers, vec![3]);

    entry.remove_sharer(3);
    assert!(!entry.has_sharer(3));
    assert_eq!(entry.num_sharers(), 0);
}

/// `one_sharer` always returns a current member of the set.
#[rstest]
#[case(DirectoryType::FullMap)]
#[case(DirectoryType::LimitedNoBroadcast)]
fn one_sharer_returns_a_member(#[case] directory_type: DirectoryType) {
    let mut entry = entry(directory_type);
    entry.add_sharer(1);
    entry.add_sharer(5);
    let chosen = entry.one_sharer().unwrap();
    assert!(chosen == 1 || chosen == 5);
}

// ══════════════════════════════════════════════════════════
// 2. Overflow policies
// ══════════════════════════════════════════════════════════

/// The full map never overflows: every core fits.
#[test]
fn full_map_never_overflows() {
    let mut entry = entry(DirectoryType::FullMap);
    for core in 0..8 {
        assert!(entry.add_sharer(core));
    }
    assert_eq!(entry.num_sharers(), 8);
    let (broadcast, sharers) = entry.sharers_list();
    assert!(!broadcast);
    assert_eq!(sharers.len(), 8);
}

/// LimitedNoBroadcast refuses the third sharer; the caller must evict.
#[test]
fn limited_no_broadcast_refuses_overflow() {
    let mut entry = entry(DirectoryType::LimitedNoBroadcast);
    assert!(entry.add_sharer(0));
    assert!(entry.add_sharer(1));
    assert!(!entry.add_sharer(2), "a full pointer list must refuse");
    assert_eq!(entry.num_sharers(), 2);
}

/// LimitedBroadcast absorbs overflow but reports that a broadcast is
/// needed; draining all sharers clears the flag.
#[test]
fn limited_broadcast_flags_untracked_sharers() {
    let mut entry = entry(DirectoryType::LimitedBroadcast);
    for core in 0..3 {
        assert!(entry.add_sharer(core));
    }
    assert_eq!(entry.num_sharers(), 3);
    let (broadcast, tracked) = entry.sharers_list();
    assert!(broadcast, "overflow must force broadcast invalidation");
    assert_eq!(tracked.len(), 2);

    for core in 0..3 {
        entry.remove_sharer(core);
    }
    assert_eq!(entry.num_sharers(), 0);
    let (broadcast, _) = entry.sharers_list();
    assert!(!broadcast, "an emptied entry tracks exactly again");
}

/// Ackwise counts the untracked remainder exactly, so acknowledgements
/// can be counted to zero.
#[test]
fn ackwise_counts_untracked_sharers() {
    let mut entry = entry(DirectoryType::Ackwise);
    for core in 0..4 {
        assert!(entry.add_sharer(core));
    }
    assert_eq!(entry.num_sharers(), 4);
    let (broadcast, tracked) = entry.sharers_list();
    assert!(broadcast);
    assert_eq!(tracked.len(), 2);

    // Untracked removals decrement the counter.
    entry.remove_sharer(2);
    entry.remove_sharer(3);
    assert_eq!(entry.num_sharers(), 2);
    let (broadcast, _) = entry.sharers_list();
    assert!(broadcast, "tracked sharers remain; flag clears only when empty");
}

/// Limitless spills overflow to the software list and charges the trap
/// latency once overflowed.
#[test]
fn limitless_traps_to_software_on_overflow() {
    let mut entry = entry(DirectoryType::Limitless);
    assert_eq!(entry.access_latency(), 0);
    for core in 0..4 {
        assert!(entry.add_sharer(core));
    }
    assert_eq!(entry.num_sharers(), 4);
    assert!(entry.access_latency() > 0, "software tracking costs cycles");
    assert!(entry.has_sharer(3), "software-tracked sharers are visible");

    let (broadcast, sharers) = entry.sharers_list();
    assert!(!broadcast, "limitless tracks everyone, no broadcast needed");
    assert_eq!(sharers.len(), 4);
}
