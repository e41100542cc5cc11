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

    tests/invariants.rs

    spec.md §8 universal invariants exercised end-to-end through the public
    API: sidecar round-trip fidelity and range-planner ordering/disjointness
    across both the whole-disk and single-partition planning algorithms.
*/

mod common;

use chronos_core::enumerate::{DiskRoleFlags, Partition};
use chronos_core::planner;
use chronos_core::sidecar::ImageSidecar;

#[test]
fn sidecar_round_trip_preserves_every_field_through_the_public_api() {
    common::init();
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("image.vhdx");
    std::fs::write(&image_path, vec![0u8; 4096]).unwrap();

    let disk = common::disk(7, 64 * 1024 * 1024, 4096, DiskRoleFlags::IS_SYSTEM);
    let partitions =
        vec![Partition { disk_index: 7, number: 1, offset: 1024 * 1024, size: 32 * 1024 * 1024, partition_type: "NTFS".into(), volume_path: Some(r"\\.\C:".into()) }];

    let mut sidecar = ImageSidecar::from_disk(&disk, &partitions, 4096);
    sidecar.set_expected_allocated_bytes(12 * 1024 * 1024);
    sidecar.save(&image_path).unwrap();

    let loaded = ImageSidecar::load(&image_path).expect("sidecar must load back what was saved");
    assert_eq!(loaded.expected_allocated_bytes(), sidecar.expected_allocated_bytes());
    assert_eq!(loaded.source_sector_size(), sidecar.source_sector_size());

    let (loaded_disk, loaded_partitions) = loaded.to_disk_and_partitions();
    assert_eq!(loaded_disk.size, disk.size);
    assert_eq!(loaded_disk.sector_size, disk.sector_size);
    assert_eq!(loaded_partitions.len(), 1);
    assert_eq!(loaded_partitions[0].offset, partitions[0].offset);
    assert_eq!(loaded_partitions[0].size, partitions[0].size);
}

#[test]
fn whole_disk_plan_is_sorted_disjoint_and_bounded() {
    common::init();
    let disk = common::disk(0, 32 * 1024 * 1024, 512, DiskRoleFlags::empty());
    let partitions = vec![
        Partition { disk_index: 0, number: 1, offset: 1024 * 1024, size: 8 * 1024 * 1024, partition_type: "NTFS".into(), volume_path: None },
        Partition { disk_index: 0, number: 2, offset: 10 * 1024 * 1024, size: 4 * 1024 * 1024, partition_type: "FAT32".into(), volume_path: None },
    ];

    let ranges = planner::plan_disk_copy(&disk, &partitions, None, None);
    assert!(ranges.windows(2).all(|w| w[0].offset + w[0].length <= w[1].offset));
    assert!(ranges.iter().all(|r| r.offset + r.length <= disk.size));
}

#[test]
fn partition_plan_without_allocation_data_falls_back_to_a_full_copy() {
    common::init();
    let partition = common::partition(1, 1024 * 1024, 16 * 1024 * 1024, None);
    assert_eq!(planner::plan_partition_copy(&partition, None, None), None);
}
