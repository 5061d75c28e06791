//! Redistribution planning.
//!
//! `PVector::distribute` drives the protocol (build, ship, fence, merge,
//! update); the pure steps live here so they can be checked in isolation.

use super::part::IndexedPart;
use super::protocol::Slice;
use crate::distribution::types::{LocationId, RangeEntry};
use crate::distribution::IndexDirectory;
use crate::error::ContainerError;

use std::collections::BTreeMap;
use std::ops::Range;

/// Destination location → index ranges it should own afterwards.
pub type TargetMap = BTreeMap<LocationId, Vec<Range<usize>>>;

/// One non-empty range of a validated target map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub dest: LocationId,
    pub lo: usize,
    pub hi: usize,
}

/// Checks that the non-empty ranges of `target` tile `[0, size)` exactly and
/// name existing locations. Returns them sorted by start.
pub fn validate_target(
    target: &TargetMap,
    size: usize,
    locations: usize,
) -> Result<Vec<Segment>, ContainerError> {
    let mut segments = Vec::new();
    for (&dest, ranges) in target {
        if dest >= locations {
            return Err(ContainerError::InvalidRedistribution(format!(
                "destination {} is outside a cluster of {} locations",
                dest, locations
            )));
        }
        for range in ranges {
            if range.start > range.end {
                return Err(ContainerError::InvalidRedistribution(format!(
                    "reversed range {:?} for location {}",
                    range, dest
                )));
            }
            if range.start < range.end {
                segments.push(Segment {
                    dest,
                    lo: range.start,
                    hi: range.end,
                });
            }
        }
    }
    segments.sort_by_key(|s| (s.lo, s.hi));

    let mut cursor = 0;
    for segment in &segments {
        if segment.lo != cursor {
            let kind = if segment.lo > cursor { "gap" } else { "overlap" };
            return Err(ContainerError::InvalidRedistribution(format!(
                "{} at index {} (next range starts at {})",
                kind, cursor, segment.lo
            )));
        }
        cursor = segment.hi;
    }
    if cursor != size {
        return Err(ContainerError::InvalidRedistribution(format!(
            "ranges cover [0, {}) but the container holds {} elements",
            cursor, size
        )));
    }

    Ok(segments)
}

/// The global part layout after redistribution: adjacent segments with the
/// same destination become one part, and part ids restart at 0 per location.
/// Every location derives the same layout from the same target map.
pub fn plan_parts(segments: &[Segment]) -> Vec<RangeEntry> {
    let mut plan: Vec<RangeEntry> = Vec::new();
    let mut next_id: BTreeMap<LocationId, usize> = BTreeMap::new();

    for segment in segments {
        if let Some(last) = plan.last_mut()
            && last.owner == segment.dest
            && last.hi == segment.lo
        {
            last.hi = segment.hi;
            continue;
        }
        let id = next_id.entry(segment.dest).or_insert(0);
        plan.push(RangeEntry::new(segment.dest, *id, segment.lo..segment.hi));
        *id += 1;
    }

    if plan.is_empty() {
        // An empty container still needs one part to append to.
        plan.push(RangeEntry::new(0, 0, 0..0));
    }
    plan
}

/// Cuts `part` along the segments it intersects. Segments must be sorted.
pub fn slice_part<T>(part: IndexedPart<T>, segments: &[Segment]) -> Vec<(LocationId, Slice<T>)> {
    let range = part.range();
    let first = segments.partition_point(|s| s.hi <= range.start);
    let mut elements = part.into_data().into_iter();
    let mut slices = Vec::new();

    for segment in &segments[first..] {
        if segment.lo >= range.end {
            break;
        }
        let lo = segment.lo.max(range.start);
        let hi = segment.hi.min(range.end);
        let data: Vec<T> = elements.by_ref().take(hi - lo).collect();
        if !data.is_empty() {
            slices.push((segment.dest, Slice { offset: lo, data }));
        }
    }
    slices
}

/// Sorts received slices by offset and coalesces contiguous runs.
pub fn merge_slices<T>(mut slices: Vec<Slice<T>>) -> Vec<Slice<T>> {
    slices.sort_by_key(|s| s.offset);
    let mut merged: Vec<Slice<T>> = Vec::with_capacity(slices.len());

    for slice in slices {
        if slice.data.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.end() == slice.offset => last.data.extend(slice.data),
            _ => merged.push(slice),
        }
    }
    merged
}

/// Builds this location's parts from its merged runs, checking them against
/// the plan, and wires boundary links from the plan's global order.
pub fn assemble_parts<T>(
    me: LocationId,
    plan: &[RangeEntry],
    merged: Vec<Slice<T>>,
) -> Result<Vec<IndexedPart<T>>, ContainerError> {
    let mut layout = IndexDirectory::new(0);
    layout.append(plan.iter().copied());
    layout.sort();
    let links: BTreeMap<_, _> = layout.boundaries_for(me).into_iter().collect();

    let mut runs = merged.into_iter();
    let mut parts = Vec::new();

    for entry in layout.entries().iter().filter(|e| e.owner == me) {
        let data = if entry.is_empty() {
            Vec::new()
        } else {
            match runs.next() {
                Some(run) if run.offset == entry.lo && run.end() == entry.hi => run.data,
                Some(run) => {
                    return Err(ContainerError::PartitionInvariant(format!(
                        "location {} received [{}, {}) where [{}, {}) was planned",
                        me,
                        run.offset,
                        run.end(),
                        entry.lo,
                        entry.hi
                    )));
                }
                None => {
                    return Err(ContainerError::PartitionInvariant(format!(
                        "location {} is missing [{}, {})",
                        me, entry.lo, entry.hi
                    )));
                }
            }
        };

        let mut part = IndexedPart::new(entry.part, entry.lo, data);
        if let Some(boundary) = links.get(&entry.part) {
            part.set_boundary(*boundary);
        }
        parts.push(part);
    }

    if let Some(extra) = runs.next() {
        return Err(ContainerError::PartitionInvariant(format!(
            "location {} received unplanned range starting at {}",
            me, extra.offset
        )));
    }

    Ok(parts)
}
