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

    tests/smart_restore.rs

    spec.md §8 scenario 6: smart restore to a smaller target. A sidecar
    describing a 256 MiB disk with 40 MiB allocated in its first partition
    is restored onto a 200 MiB target: the planner must clamp every range
    to `[0, 200 MiB)`, dropping the image-internal backup-GPT tail that
    would otherwise land past the target's end.
*/

mod common;

use chronos_core::enumerate::{DiskRoleFlags, Partition};
use chronos_core::planner;

const SOURCE_DISK_SIZE: u64 = 256 * 1024 * 1024;
const TARGET_SIZE: u64 = 200 * 1024 * 1024;

#[test]
fn clamped_plan_never_extends_past_the_smaller_target() {
    common::init();
    let source_disk = common::disk(0, SOURCE_DISK_SIZE, 512, DiskRoleFlags::empty());
    let partitions = vec![Partition {
        disk_index: 0,
        number: 1,
        offset: 1024 * 1024,
        size: 40 * 1024 * 1024,
        partition_type: "NTFS".into(),
        volume_path: None,
    }];

    let plan = planner::plan_disk_copy(&source_disk, &partitions, None, None);
    // Sanity: the unclamped plan does cover the backup-GPT tail near the
    // end of the 256 MiB source disk.
    let backup_gpt_near_end = SOURCE_DISK_SIZE - 17 * 1024;
    assert!(plan.iter().any(|r| r.offset + r.length > TARGET_SIZE), "fixture should include a range past the smaller target before clamping");
    assert!(plan.iter().any(|r| r.offset <= backup_gpt_near_end));

    let clamped = planner::clamp_to_target(plan, TARGET_SIZE);
    assert!(clamped.iter().all(|r| r.offset + r.length <= TARGET_SIZE));
    assert!(!clamped.iter().any(|r| r.offset >= TARGET_SIZE));
    assert!(clamped.iter().any(|r| r.offset <= 1024 * 1024 && r.offset + r.length >= 1024 * 1024), "the 40 MiB partition range must survive clamping");
}
