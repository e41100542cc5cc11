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

    src/clone.rs

    Direct device-to-device sector copy with a source != destination guard
    (C12). No compression, no snapshotting, no sidecar.
*/

use crate::descriptor::{self, DeviceDescriptor};
use crate::disk_io::{DiskReadHandle, DiskWriteHandle};
use crate::progress::{CancelHandle, ProgressReporter, ProgressThrottle};
use crate::{ChronosError, ChronosResult};

const COPY_BUFFER: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CloneJob {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOutcome {
    pub bytes_copied: u64,
}

fn open_for_read(desc: DeviceDescriptor) -> ChronosResult<DiskReadHandle> {
    match desc.partition_number {
        Some(p) => DiskReadHandle::open_partition(desc.disk_index, p),
        None => DiskReadHandle::open_disk(desc.disk_index),
    }
}

fn open_for_write(desc: DeviceDescriptor) -> ChronosResult<DiskWriteHandle> {
    match desc.partition_number {
        Some(p) => DiskWriteHandle::open_partition_for_write(desc.disk_index, p),
        None => DiskWriteHandle::open_disk_for_write(&format!(r"\\.\PhysicalDrive{}", desc.disk_index)),
    }
}

/// Copies `job.source` to `job.destination` sector-for-sector, refusing
/// when both resolve to the same `(disk, partition?)` tuple.
pub fn execute(job: &CloneJob, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<CloneOutcome> {
    let source_desc = descriptor::parse_device(&job.source)?;
    let destination_desc = descriptor::parse_device(&job.destination)?;
    if source_desc == destination_desc {
        return Err(ChronosError::SourceEqualsDestination);
    }

    let mut source = open_for_read(source_desc)?;
    let source_size = source.get_size();
    if source_size == 0 {
        return Err(ChronosError::InvalidParameter("clone source has zero size".into()));
    }
    let mut destination = open_for_write(destination_desc)?;

    let bytes_copied = copy_whole(&mut source, &mut destination, source_size, progress, cancel)?;
    Ok(CloneOutcome { bytes_copied })
}

/// The clone copy loop: spec.md §4.10's clone dispatch is identical to the
/// backup copy loop with a single range covering the whole source and no
/// zero-skip optimization.
fn copy_whole(source: &mut DiskReadHandle, destination: &mut DiskWriteHandle, source_size: u64, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<u64> {
    let sector_size = source.sector_size() as u64;
    let mut throttle = ProgressThrottle::new(source_size);
    let mut bytes_copied = 0u64;

    while bytes_copied < source_size {
        cancel.check()?;
        let remaining = source_size - bytes_copied;
        let want_bytes = (COPY_BUFFER as u64).min(remaining);
        let want_sectors = (want_bytes / sector_size).max(1);
        let want_bytes = want_sectors * sector_size;
        let mut buf = vec![0u8; want_bytes as usize];

        let sector_offset = bytes_copied / sector_size;
        let n = source.read_sectors(&mut buf, sector_offset, want_sectors as u32)?;
        if n == 0 {
            log::warn!("clone: read returned 0 bytes at offset {bytes_copied}, stopping");
            break;
        }
        let whole_sectors = n as u64 / sector_size;
        if whole_sectors == 0 {
            break;
        }
        let write_len = (whole_sectors * sector_size) as usize;
        destination.write_sectors(&buf[..write_len], sector_offset, whole_sectors as u32)?;
        bytes_copied += write_len as u64;
        throttle.maybe_report(bytes_copied, "cloning", false, progress);
        if write_len as u64 != want_bytes {
            break;
        }
    }
    throttle.maybe_report(bytes_copied, "done", true, progress);
    Ok(bytes_copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_device_descriptors_are_rejected_before_opening_anything() {
        let job = CloneJob { source: "3".into(), destination: "3".into() };
        let err = execute(&job, &crate::progress::NullProgressReporter, &CancelHandle::new()).unwrap_err();
        assert!(matches!(err, ChronosError::SourceEqualsDestination));
    }

    #[test]
    fn identical_disk_partition_pairs_are_rejected() {
        let job = CloneJob { source: "3:1".into(), destination: r"\\.\PhysicalDrive3".into() };
        // `3:1` names a partition of disk 3, `\\.\PhysicalDrive3` names the
        // whole disk — these are distinct descriptors, not a guard failure.
        let source_desc = descriptor::parse_device(&job.source).unwrap();
        let destination_desc = descriptor::parse_device(&job.destination).unwrap();
        assert_ne!(source_desc, destination_desc);
    }

    #[test]
    fn distinct_disks_pass_the_guard_and_attempt_to_open() {
        let job = CloneJob { source: "3".into(), destination: "4".into() };
        // No real device backs either index in the sandbox; the guard
        // passes and the failure comes from the open, not the equality check.
        let err = execute(&job, &crate::progress::NullProgressReporter, &CancelHandle::new()).unwrap_err();
        assert!(!matches!(err, ChronosError::SourceEqualsDestination));
    }
}
