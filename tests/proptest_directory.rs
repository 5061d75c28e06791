//! Property tests for the index directory and redistribution planning

use pcontainers::container::IndexedPart;
use pcontainers::container::protocol::Slice;
use pcontainers::container::redistribute::{merge_slices, plan_parts, slice_part, validate_target};
use pcontainers::container::TargetMap;
use pcontainers::distribution::{IndexDirectory, RangeEntry};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Consecutive ranges of the given lengths, owners assigned round-robin.
fn tiled(lens: &[usize], owners: usize) -> Vec<RangeEntry> {
    let mut lo = 0;
    let mut next_part = vec![0; owners];
    lens.iter()
        .enumerate()
        .map(|(i, &len)| {
            let owner = i % owners;
            let part = next_part[owner];
            next_part[owner] += 1;
            let entry = RangeEntry::new(owner, part, lo..lo + len);
            lo += len;
            entry
        })
        .collect()
}

fn directory(entries: &[RangeEntry], threshold: usize) -> IndexDirectory {
    let mut dir = IndexDirectory::new(threshold);
    // Replicas receive rows in arbitrary order.
    dir.append(entries.iter().rev().copied());
    dir.sort();
    dir
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Linear scan and bisection agree on every index
    #[test]
    fn linear_and_binary_lookup_agree(
        lens in prop::collection::vec(0usize..6, 1..24),
        owners in 1usize..5,
    ) {
        let entries = tiled(&lens, owners);
        let total: usize = lens.iter().sum();
        let linear = directory(&entries, usize::MAX);
        let binary = directory(&entries, 0);

        for index in 0..total + 3 {
            prop_assert_eq!(linear.lookup(index), binary.lookup(index));
            let hit = binary.find(index);
            prop_assert_eq!(hit.is_some(), index < total);
            if let Some(entry) = hit {
                prop_assert!(entry.contains(index));
            }
        }
    }

    /// A tiling passes the partition check; dropping a non-empty range fails it
    #[test]
    fn partition_check_detects_gaps(
        lens in prop::collection::vec(0usize..6, 1..24),
        victim in any::<prop::sample::Index>(),
    ) {
        let entries = tiled(&lens, 3);
        let total: usize = lens.iter().sum();
        prop_assert!(directory(&entries, 5).check_partition(Some(total)).is_ok());

        let non_empty: Vec<usize> = (0..entries.len()).filter(|&i| !entries[i].is_empty()).collect();
        prop_assume!(!non_empty.is_empty());
        let drop_at = non_empty[victim.index(non_empty.len())];
        let mut damaged = entries.clone();
        damaged.remove(drop_at);
        prop_assert!(directory(&damaged, 5).check_partition(Some(total)).is_err());
    }

    /// Slicing every part along a valid target and merging per destination
    /// moves each element exactly once, to the planned owner
    #[test]
    fn redistribution_preserves_content(
        source_lens in prop::collection::vec(0usize..8, 1..8),
        cuts in prop::collection::vec((1usize..10, 0usize..4), 1..8),
    ) {
        let size: usize = source_lens.iter().sum();
        let mut target = TargetMap::new();
        let mut lo = 0;
        for (i, &(len, dest)) in cuts.iter().enumerate() {
            let hi = if i + 1 == cuts.len() { size } else { (lo + len).min(size) };
            target.entry(dest).or_insert_with(Vec::new).push(lo..hi);
            lo = hi;
        }

        let segments = validate_target(&target, size, 4).unwrap();
        let plan = plan_parts(&segments);

        let mut inbox: BTreeMap<usize, Vec<Slice<usize>>> = BTreeMap::new();
        let mut offset = 0;
        for (id, &len) in source_lens.iter().enumerate() {
            let part = IndexedPart::new(id, offset, (offset..offset + len).collect());
            offset += len;
            for (dest, slice) in slice_part(part, &segments) {
                inbox.entry(dest).or_default().push(slice);
            }
        }

        let mut seen = Vec::new();
        for (dest, slices) in inbox {
            for run in merge_slices(slices) {
                let planned = plan
                    .iter()
                    .any(|e| e.owner == dest && e.lo == run.offset && e.hi == run.end());
                prop_assert!(planned, "run [{}, {}) not planned for {}", run.offset, run.end(), dest);
                seen.extend(run.data);
            }
        }
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..size).collect::<Vec<usize>>());
    }
}
