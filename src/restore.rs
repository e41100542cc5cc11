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

    src/restore.rs

    Orchestrates container attach, range planning from the sidecar, target
    preparation and copy (C11); refuses before any destructive write on a
    cross-sector-size target, an under-sized plain-image target, or an
    unforced system/boot disk.
*/

use std::path::Path;

use crate::container::{self, VolumePreparation};
use crate::descriptor::{self, DeviceDescriptor, ImageDestination};
use crate::disk_io::{DiskReadHandle, DiskWriteHandle};
use crate::enumerate::DiskIdentity;
use crate::planner::{self, CopyRange};
use crate::progress::{CancelHandle, ProgressReporter, ProgressThrottle};
use crate::sidecar::ImageSidecar;
use crate::{ChronosError, ChronosResult};

const COPY_BUFFER: usize = 2 * 1024 * 1024;
const MIN_SHORTFALL_BYTES: u64 = 10 * 1024 * 1024;
const MIN_SHORTFALL_RATIO: f64 = 0.005;

#[derive(Debug, Clone)]
pub struct RestoreJob {
    /// Path to the backup image (container or plain file).
    pub source: String,
    /// Bare disk index or `disk:partition`.
    pub target: String,
    pub verify_during_restore: bool,
    pub force_overwrite: bool,
}

/// The outcome of [`validate`]: resolved sizes and the loaded sidecar, if
/// any, ready to drive [`execute`] without re-deriving them.
#[derive(Debug)]
pub struct ValidatedRestore {
    target_desc: DeviceDescriptor,
    target_size: u64,
    target_sector_size: u32,
    source_size: u64,
    sidecar: Option<ImageSidecar>,
}

/// Validates `job` against a target disk already resolved by the caller
/// (normally via enumeration; tests supply a fixture directly).
pub fn validate(job: &RestoreJob, target_disk: &DiskIdentity, target_partition_size: Option<u64>) -> ChronosResult<ValidatedRestore> {
    let source_path = Path::new(&job.source);
    if !source_path.exists() {
        return Err(ChronosError::PathNotFound(job.source.clone()));
    }
    let target_desc = descriptor::parse_device(&job.target)?;

    if (target_disk.is_system() || target_disk.is_boot()) && !job.force_overwrite {
        return Err(ChronosError::SystemDiskProtected);
    }

    let destination = descriptor::classify_destination(&job.source);
    let source_size = match &destination {
        ImageDestination::Container(path) => {
            let attached = container::attach_read_only(Path::new(path))?;
            let probe = DiskReadHandle::open_path_for_read(attached.physical_path(), None)?;
            probe.get_size()
        }
        ImageDestination::PlainFile(_) => std::fs::metadata(source_path)?.len(),
    };

    let target_size = target_partition_size.unwrap_or(target_disk.size);

    let is_container = matches!(destination, ImageDestination::Container(_));
    if !is_container && source_size > target_size {
        let shortfall = source_size - target_size;
        let threshold = (target_size as f64 * MIN_SHORTFALL_RATIO).max(MIN_SHORTFALL_BYTES as f64) as u64;
        if shortfall > threshold {
            return Err(ChronosError::TargetTooSmall { target: target_size, required: source_size });
        }
    }

    let sidecar = ImageSidecar::load(source_path);
    if let Some(sidecar) = &sidecar {
        if sidecar.source_sector_size() != target_disk.sector_size {
            return Err(ChronosError::SectorSizeMismatch { sidecar: sidecar.source_sector_size(), target: target_disk.sector_size });
        }
    }

    Ok(ValidatedRestore {
        target_desc,
        target_size,
        target_sector_size: target_disk.sector_size,
        source_size,
        sidecar,
    })
}

/// Runs the copy phase of a restore already validated by [`validate`].
pub fn execute(job: &RestoreJob, validated: &ValidatedRestore, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<u64> {
    cancel.check()?;
    if job.verify_during_restore {
        log::warn!("restore: post-restore verification was requested but is not supported during restore; proceeding without it");
    }
    let _preparation = VolumePreparation::prepare(validated.target_desc.disk_index)?;

    let mut target = match validated.target_desc.partition_number {
        Some(p) => DiskWriteHandle::open_partition_for_write(validated.target_desc.disk_index, p)?,
        None => DiskWriteHandle::open_disk_for_write(&format!(r"\\.\PhysicalDrive{}", validated.target_desc.disk_index))?,
    };

    match descriptor::classify_destination(&job.source) {
        ImageDestination::Container(path) => restore_from_container(&path, validated, &mut target, progress, cancel),
        ImageDestination::PlainFile(path) => restore_from_plain_file(&path, validated, &mut target, progress, cancel),
    }
}

fn restore_from_container(path: &str, validated: &ValidatedRestore, target: &mut DiskWriteHandle, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<u64> {
    let attached = container::attach_read_only(Path::new(path))?;
    let mut source = DiskReadHandle::open_path_for_read(attached.physical_path(), Some(validated.source_size))?;

    let ranges = match &validated.sidecar {
        Some(sidecar) => {
            let (disk, partitions) = sidecar.to_disk_and_partitions();
            let plan = planner::plan_disk_copy(&disk, &partitions, None, None);
            planner::clamp_to_target(plan, validated.target_size)
        }
        None => vec![CopyRange { offset: 0, length: validated.source_size.min(validated.target_size) }],
    };

    copy_ranges(&mut source, target, &ranges, progress, cancel)
}

fn restore_from_plain_file(path: &str, validated: &ValidatedRestore, target: &mut DiskWriteHandle, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<u64> {
    let mut source = DiskReadHandle::open_path_for_read(path, Some(validated.source_size))?;
    let sector_size = validated.target_sector_size.max(1) as u64;
    let mut throttle = ProgressThrottle::new(validated.source_size);
    let mut bytes_copied = 0u64;

    loop {
        cancel.check()?;
        let remaining = validated.source_size - bytes_copied;
        if remaining == 0 {
            break;
        }
        let want_bytes = (COPY_BUFFER as u64).min(remaining);
        let want_sectors = (want_bytes / sector_size).max(1);
        let want_bytes = want_sectors * sector_size;
        let mut buf = vec![0u8; want_bytes as usize];
        let sector_offset = bytes_copied / sector_size;
        let n = source.read_sectors(&mut buf, sector_offset, want_sectors as u32)?;
        if n == 0 {
            break;
        }
        let whole_sectors = n as u64 / sector_size;
        if whole_sectors == 0 {
            break;
        }
        let write_len = (whole_sectors * sector_size) as usize;
        target.write_sectors(&buf[..write_len], sector_offset, whole_sectors as u32)?;
        bytes_copied += write_len as u64;
        throttle.maybe_report(bytes_copied, "restoring", false, progress);
    }
    throttle.maybe_report(bytes_copied, "done", true, progress);
    Ok(bytes_copied)
}

fn copy_ranges(source: &mut DiskReadHandle, target: &mut DiskWriteHandle, ranges: &[CopyRange], progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<u64> {
    let total: u64 = ranges.iter().map(|r| r.length).sum();
    let mut throttle = ProgressThrottle::new(total);
    let sector_size = source.sector_size().max(1) as u64;
    let mut bytes_copied = 0u64;

    for range in ranges {
        cancel.check()?;
        let mut consumed = 0u64;
        while consumed < range.length {
            cancel.check()?;
            let remaining = range.length - consumed;
            let want_bytes = (COPY_BUFFER as u64).min(remaining);
            let want_sectors = (want_bytes / sector_size).max(1);
            let want_bytes = want_sectors * sector_size;
            let mut buf = vec![0u8; want_bytes as usize];
            let byte_offset = range.offset + consumed;
            let sector_offset = byte_offset / sector_size;
            let n = source.read_sectors(&mut buf, sector_offset, want_sectors as u32)?;
            if n == 0 {
                break;
            }
            let whole_sectors = n as u64 / sector_size;
            if whole_sectors == 0 {
                break;
            }
            let write_len = (whole_sectors * sector_size) as usize;
            target.write_sectors(&buf[..write_len], sector_offset, whole_sectors as u32)?;
            bytes_copied += write_len as u64;
            consumed += write_len as u64;
            throttle.maybe_report(bytes_copied, "restoring", false, progress);
            if write_len as u64 != want_bytes {
                break;
            }
        }
    }
    throttle.maybe_report(bytes_copied, "done", true, progress);
    Ok(bytes_copied)
}
