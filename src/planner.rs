/*
    chronos-core
    https://github.com/dbalsom/chronos-backup

    Copyright 2026 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/planner.rs

    Computes the ordered list of byte ranges to copy for a backup or a
    smart restore (C9): partition-table headers, per-partition allocated
    ranges, backup-GPT tail. `None` from a partition-level plan always
    means "fall back to a full linear copy of that partition".
*/

use crate::allocation::{self, AllocatedRange};
use crate::enumerate::{DiskIdentity, Partition};
use crate::snapshot::SnapshotSet;

/// The GPT header and partition entry array occupy the first and last 34
/// logical sectors of a GPT disk (protective MBR + primary header/entries,
/// and the backup header/entries at the tail).
const GPT_RESERVED_SECTORS: u64 = 34;

/// A contiguous byte range, in absolute disk bytes of the source device or
/// destination container, to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRange {
    pub offset: u64,
    pub length: u64,
}

fn targets_destination(volume_path: &str, destination_drive: Option<&str>) -> bool {
    match destination_drive {
        Some(drive) => !drive.is_empty() && volume_path.starts_with(drive),
        None => false,
    }
}

pub(crate) fn resolve_read_path<'a>(volume_path: &'a str, snapshot_set: Option<&'a SnapshotSet>) -> &'a str {
    snapshot_set.and_then(|set| set.snapshot_path(volume_path)).unwrap_or(volume_path)
}

/// Single-partition planning (spec.md §4.9, single-partition source
/// algorithm). Returns `None` when the caller should do a full linear copy
/// of the partition instead.
pub fn plan_partition_copy(partition: &Partition, destination_drive: Option<&str>, snapshot_set: Option<&SnapshotSet>) -> Option<Vec<CopyRange>> {
    let volume_path = partition.volume_path.as_deref()?;
    if targets_destination(volume_path, destination_drive) {
        return None;
    }
    let read_path = resolve_read_path(volume_path, snapshot_set);
    let ranges = allocation::allocated_ranges(read_path, partition.size)?;
    if ranges.is_empty() {
        return None;
    }
    if !allocation::is_usable(&ranges, partition.size) {
        return None;
    }
    Some(ranges.into_iter().map(|r| CopyRange { offset: r.offset, length: r.length }).collect())
}

/// Whole-disk planning (spec.md §4.9, whole-disk source algorithm).
/// Never returns `None`: a disk-level backup always has at least the
/// protective-MBR/primary-GPT range to copy.
pub fn plan_disk_copy(disk: &DiskIdentity, partitions: &[Partition], destination_drive: Option<&str>, snapshot_set: Option<&SnapshotSet>) -> Vec<CopyRange> {
    let sector_size = disk.sector_size as u64;
    let reserved_bytes = GPT_RESERVED_SECTORS * sector_size;

    let mut ranges = vec![CopyRange { offset: 0, length: reserved_bytes.min(disk.size) }];

    let mut sorted_partitions: Vec<&Partition> = partitions.iter().collect();
    sorted_partitions.sort_by_key(|p| p.offset);

    for partition in sorted_partitions {
        match &partition.volume_path {
            None => ranges.push(CopyRange { offset: partition.offset, length: partition.size }),
            Some(volume_path) if targets_destination(volume_path, destination_drive) => {
                ranges.push(CopyRange { offset: partition.offset, length: partition.size })
            }
            Some(volume_path) => {
                let read_path = resolve_read_path(volume_path, snapshot_set);
                match allocation::allocated_ranges(read_path, partition.size) {
                    None => ranges.push(CopyRange { offset: partition.offset, length: partition.size }),
                    Some(queried) if !allocation::is_usable(&queried, partition.size) => {
                        ranges.push(CopyRange { offset: partition.offset, length: partition.size })
                    }
                    Some(queried) => ranges.extend(shift_ranges(&queried, partition.offset)),
                }
            }
        }
    }

    if disk.size > reserved_bytes {
        ranges.push(CopyRange { offset: disk.size - reserved_bytes, length: reserved_bytes });
    }

    sort_and_merge(&mut ranges);
    ranges
}

fn shift_ranges(ranges: &[AllocatedRange], base_offset: u64) -> Vec<CopyRange> {
    ranges.iter().map(|r| CopyRange { offset: base_offset + r.offset, length: r.length }).collect()
}

fn sort_and_merge(ranges: &mut Vec<CopyRange>) {
    ranges.sort_by_key(|r| r.offset);
    let mut merged: Vec<CopyRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        if let Some(last) = merged.last_mut() {
            if range.offset <= last.offset + last.length {
                let new_end = (last.offset + last.length).max(range.offset + range.length);
                last.length = new_end - last.offset;
                continue;
            }
        }
        merged.push(range);
    }
    *ranges = merged;
}

/// Clamps a range plan to `[0, target_size)` for smart restore: ranges
/// that start past the target are dropped, ranges that straddle the
/// boundary are truncated (spec.md §4.9 step 5).
pub fn clamp_to_target(ranges: Vec<CopyRange>, target_size: u64) -> Vec<CopyRange> {
    ranges
        .into_iter()
        .filter_map(|r| {
            if r.offset >= target_size {
                None
            } else {
                let max_length = target_size - r.offset;
                Some(CopyRange { offset: r.offset, length: r.length.min(max_length) })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::DiskRoleFlags;

    fn disk(size: u64, sector_size: u32) -> DiskIdentity {
        DiskIdentity { index: 0, model: "Test".into(), serial: "S1".into(), size, sector_size, flags: DiskRoleFlags::empty() }
    }

    fn partition(offset: u64, size: u64, volume_path: Option<&str>) -> Partition {
        Partition { disk_index: 0, number: 1, offset, size, partition_type: "NTFS".into(), volume_path: volume_path.map(String::from) }
    }

    #[test]
    fn partition_without_volume_path_has_no_plan() {
        let p = partition(1024 * 1024, 10 * 1024 * 1024, None);
        assert_eq!(plan_partition_copy(&p, None, None), None);
    }

    #[test]
    fn partition_matching_destination_drive_is_excluded() {
        let p = partition(1024 * 1024, 10 * 1024 * 1024, Some(r"\\.\C:"));
        assert_eq!(plan_partition_copy(&p, Some(r"\\.\C:"), None), None);
    }

    #[test]
    fn whole_disk_plan_always_includes_reserved_header_and_is_sorted_disjoint() {
        let d = disk(64 * 1024 * 1024, 512);
        let parts = vec![partition(1024 * 1024, 32 * 1024 * 1024, None)];
        let ranges = plan_disk_copy(&d, &parts, None, None);

        assert!(!ranges.is_empty());
        assert!(ranges.windows(2).all(|w| w[0].offset + w[0].length <= w[1].offset));
        assert_eq!(ranges[0].offset, 0);

        let backup_gpt_start = d.size - 34 * 512;
        assert!(ranges.iter().any(|r| r.offset <= backup_gpt_start && backup_gpt_start < r.offset + r.length));
    }

    #[test]
    fn whole_disk_plan_without_volume_paths_copies_partitions_whole() {
        let d = disk(64 * 1024 * 1024, 512);
        let parts = vec![partition(1024 * 1024, 32 * 1024 * 1024, None)];
        let ranges = plan_disk_copy(&d, &parts, None, None);
        let covers_partition = ranges.iter().any(|r| r.offset <= 1024 * 1024 && r.offset + r.length >= 1024 * 1024 + 32 * 1024 * 1024);
        assert!(covers_partition);
    }

    #[test]
    fn clamp_drops_ranges_entirely_past_target_and_truncates_straddlers() {
        let ranges = vec![CopyRange { offset: 0, length: 100 }, CopyRange { offset: 150, length: 100 }, CopyRange { offset: 500, length: 50 }];
        let clamped = clamp_to_target(ranges, 200);
        assert_eq!(clamped, vec![CopyRange { offset: 0, length: 100 }, CopyRange { offset: 150, length: 50 }]);
    }

    #[test]
    fn sort_and_merge_joins_adjacent_and_overlapping_ranges() {
        let mut ranges = vec![CopyRange { offset: 100, length: 50 }, CopyRange { offset: 0, length: 100 }, CopyRange { offset: 140, length: 20 }];
        sort_and_merge(&mut ranges);
        assert_eq!(ranges, vec![CopyRange { offset: 0, length: 160 }]);
    }
}
