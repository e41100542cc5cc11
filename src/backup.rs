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

    src/backup.rs

    Orchestrates source open, snapshot, range planning, container create,
    copy, and sidecar write (C10). `execute` resolves a job's descriptors
    against live enumeration; `execute_with_disk` carries the same
    orchestration over an explicitly-supplied disk/partition map, which is
    what the test suite drives directly against fixture volumes.
*/

use std::path::Path;

use crate::container;
use crate::descriptor::{self, ImageDestination};
use crate::disk_io::{DiskReadHandle, DiskWriteHandle};
use crate::enumerate::{self, DiskIdentity, Partition};
use crate::planner::{self, CopyRange};
use crate::progress::{CancelHandle, ProgressReporter, ProgressThrottle};
use crate::sidecar::ImageSidecar;
use crate::snapshot::{self, SnapshotSet};
use crate::{ChronosError, ChronosResult};

const COPY_BUFFER: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    FullDisk,
    Partition,
    DiskClone,
    PartitionClone,
}

#[derive(Debug, Clone)]
pub struct BackupJob {
    /// Bare disk index, `disk:partition`, or `\\.\PhysicalDriveN`.
    pub source: String,
    /// Container path (`.vhdx`/`.vhd`) or plain image path.
    pub destination: String,
    pub kind: BackupKind,
    /// `0` disables the compressor; only honored for a plain-file destination.
    pub compression_level: u32,
    pub use_snapshot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    Preparing,
    Copying,
    Finalizing,
    Done,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupOutcome {
    pub bytes_copied: u64,
    pub bytes_skipped_zero: u64,
}

/// Runs `job` against live enumeration: parses the source descriptor,
/// looks up the disk and its partitions, and dispatches to the copy
/// orchestration below.
pub fn execute(job: &BackupJob, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<BackupOutcome> {
    if matches!(job.kind, BackupKind::DiskClone | BackupKind::PartitionClone) {
        let clone_job = crate::clone::CloneJob { source: job.source.clone(), destination: job.destination.clone() };
        let outcome = crate::clone::execute(&clone_job, progress, cancel)?;
        return Ok(BackupOutcome { bytes_copied: outcome.bytes_copied, bytes_skipped_zero: 0 });
    }
    let desc = descriptor::parse_device(&job.source)?;
    let disk = enumerate::get_disk(desc.disk_index).ok_or_else(|| ChronosError::PathNotFound(job.source.clone()))?;
    let partitions = enumerate::list_partitions(&disk);
    execute_with_disk(job, &disk, &partitions, desc.partition_number, progress, cancel)
}

/// The orchestration core (spec.md §4.10 steps 1-7), driven either by
/// [`execute`] against live enumeration or directly by tests against
/// fixture disks/partitions.
pub fn execute_with_disk(
    job: &BackupJob,
    disk: &DiskIdentity,
    partitions: &[Partition],
    partition_number: Option<u32>,
    progress: &dyn ProgressReporter,
    cancel: &CancelHandle,
) -> ChronosResult<BackupOutcome> {
    cancel.check()?;
    match partition_number {
        Some(number) => {
            let partition = partitions
                .iter()
                .find(|p| p.number == number)
                .ok_or_else(|| ChronosError::InvalidParameter(format!("disk {} has no partition {number}", disk.index)))?;
            backup_partition(job, disk, partition, progress, cancel)
        }
        None => backup_disk(job, disk, partitions, progress, cancel),
    }
}

fn open_source_for_volume(volume_path: Option<&str>, fallback_size: u64, disk_index: u32, partition_number: Option<u32>) -> ChronosResult<DiskReadHandle> {
    match volume_path {
        Some(path) => DiskReadHandle::open_path_for_read(path, Some(fallback_size)),
        None => match partition_number {
            Some(n) => DiskReadHandle::open_partition(disk_index, n),
            None => DiskReadHandle::open_disk(disk_index),
        },
    }
}

/// A read source `copy_ranges` can pull a byte range from: either a single
/// handle or a [`DiskSource`] that routes each range to the right
/// partition-specific handle.
trait RangeSource {
    fn sector_size(&self) -> u32;
    fn read_sectors(&mut self, buf: &mut [u8], sector_offset: u64, sector_count: u32) -> ChronosResult<usize>;
}

impl RangeSource for DiskReadHandle {
    fn sector_size(&self) -> u32 {
        DiskReadHandle::sector_size(self)
    }

    fn read_sectors(&mut self, buf: &mut [u8], sector_offset: u64, sector_count: u32) -> ChronosResult<usize> {
        DiskReadHandle::read_sectors(self, buf, sector_offset, sector_count)
    }
}

/// A snapshot-backed read handle cached for one partition's absolute byte
/// range `[start, end)`, opened once up front and reused for every range
/// that falls inside it.
struct PartitionRoute {
    start: u64,
    end: u64,
    handle: DiskReadHandle,
}

/// Routes each read to the partition-specific snapshot handle whose range
/// covers it (translating the absolute disk offset to that handle's own
/// base-zero offset), falling back to the raw disk handle for everything
/// else (partition tables, unsnapshotted partitions, inter-partition gaps).
/// Grounded on spec.md §4.10 step 5's "cached snapshot-path read handle
/// with base offset equal to the partition offset."
struct DiskSource {
    raw: DiskReadHandle,
    routes: Vec<PartitionRoute>,
}

impl DiskSource {
    fn new(raw: DiskReadHandle) -> Self {
        DiskSource { raw, routes: Vec::new() }
    }

    fn add_route(&mut self, start: u64, end: u64, handle: DiskReadHandle) {
        self.routes.push(PartitionRoute { start, end, handle });
    }
}

impl RangeSource for DiskSource {
    fn sector_size(&self) -> u32 {
        self.raw.sector_size()
    }

    fn read_sectors(&mut self, buf: &mut [u8], sector_offset: u64, sector_count: u32) -> ChronosResult<usize> {
        let sector_size = self.raw.sector_size() as u64;
        let byte_offset = sector_offset * sector_size;
        if let Some(route) = self.routes.iter_mut().find(|r| byte_offset >= r.start && byte_offset < r.end) {
            let local_sector_offset = (byte_offset - route.start) / sector_size;
            return route.handle.read_sectors(buf, local_sector_offset, sector_count);
        }
        self.raw.read_sectors(buf, sector_offset, sector_count)
    }
}

fn maybe_snapshot(use_snapshot: bool, volumes: Vec<String>, cancel: &CancelHandle, progress: &dyn ProgressReporter) -> ChronosResult<Option<SnapshotSet>> {
    if !use_snapshot || volumes.is_empty() || !snapshot::is_available() {
        return Ok(None);
    }
    Ok(Some(snapshot::create_snapshot_set(&volumes, cancel, progress)?))
}

fn backup_partition(job: &BackupJob, disk: &DiskIdentity, partition: &Partition, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<BackupOutcome> {
    let volumes = partition.volume_path.iter().cloned().collect::<Vec<_>>();
    let snapshot_set = maybe_snapshot(job.use_snapshot, volumes, cancel, progress)?;

    let resolved_path = partition.volume_path.as_deref().map(|vp| planner::resolve_read_path(vp, snapshot_set.as_ref()));
    let mut source = open_source_for_volume(resolved_path, partition.size, disk.index, Some(partition.number))?;
    // The partition's declared size is authoritative for how much must be
    // copied; the open handle's own reported length only fills in when the
    // partition size itself is unknown (zero).
    let source_size = if partition.size > 0 { partition.size } else { source.get_size() };
    if source_size == 0 {
        return Err(ChronosError::InvalidParameter("source partition has zero size".into()));
    }
    let sector_size = source.sector_size();

    let plan = planner::plan_partition_copy(partition, None, snapshot_set.as_ref());
    run_backup_destination(job, &mut source, source_size, sector_size, plan, disk, std::slice::from_ref(partition), progress, cancel)
}

fn backup_disk(job: &BackupJob, disk: &DiskIdentity, partitions: &[Partition], progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<BackupOutcome> {
    let volumes: Vec<String> = partitions.iter().filter_map(|p| p.volume_path.clone()).collect();
    let snapshot_set = maybe_snapshot(job.use_snapshot, volumes, cancel, progress)?;

    let raw = DiskReadHandle::open_disk(disk.index)?;
    let source_size = if disk.size > 0 { disk.size } else { raw.get_size() };
    if source_size == 0 {
        return Err(ChronosError::InvalidParameter("source disk has zero size".into()));
    }
    let sector_size = raw.sector_size();

    let ranges = planner::plan_disk_copy(disk, partitions, None, snapshot_set.as_ref());

    // Spec.md §4.10 step 5: each partition covered by the snapshot set gets
    // its own cached read handle opened against the snapshot path, with a
    // base offset equal to the partition's offset on the disk. Partitions
    // with no snapshot (or no volume path at all) fall back to the raw
    // disk handle.
    let mut source = DiskSource::new(raw);
    if let Some(set) = snapshot_set.as_ref() {
        for partition in partitions {
            let Some(volume_path) = partition.volume_path.as_deref() else { continue };
            let Some(snapshot_path) = set.snapshot_path(volume_path) else { continue };
            match DiskReadHandle::open_path_for_read(snapshot_path, Some(partition.size)) {
                Ok(handle) => source.add_route(partition.offset, partition.offset + partition.size, handle),
                Err(e) => log::warn!("backup: failed to open snapshot handle for partition {}: {e}", partition.number),
            }
        }
    }

    run_backup_destination(job, &mut source, source_size, sector_size, Some(ranges), disk, partitions, progress, cancel)
}

fn run_backup_destination(
    job: &BackupJob,
    source: &mut dyn RangeSource,
    source_size: u64,
    sector_size: u32,
    plan: Option<Vec<CopyRange>>,
    disk: &DiskIdentity,
    partitions: &[Partition],
    progress: &dyn ProgressReporter,
    cancel: &CancelHandle,
) -> ChronosResult<BackupOutcome> {
    match descriptor::classify_destination(&job.destination) {
        ImageDestination::Container(path) => {
            let ranges = plan.unwrap_or_else(|| vec![CopyRange { offset: 0, length: source_size }]);
            let expected_allocated_bytes: u64 = ranges.iter().map(|r| r.length).sum();

            let container = container::create_and_attach_for_write(Path::new(&path), source_size, sector_size)?;
            let mut writer = DiskWriteHandle::open_disk_for_write(container.physical_path())?;

            let (bytes_copied, bytes_skipped_zero) = copy_ranges(source, &mut writer, &ranges, progress, cancel)?;
            if bytes_copied < expected_allocated_bytes {
                return Err(ChronosError::IncompleteBackup { copied: bytes_copied, expected: expected_allocated_bytes });
            }

            write_sidecar(&path, disk, partitions, sector_size, expected_allocated_bytes)?;
            Ok(BackupOutcome { bytes_copied, bytes_skipped_zero })
        }
        ImageDestination::PlainFile(path) => {
            if job.compression_level > 0 {
                run_compressed_plain_backup(source, &path, job.compression_level, source_size, progress, cancel)
            } else {
                run_plain_backup(source, &path, source_size, sector_size, progress, cancel)
            }
        }
    }
}

/// Records the real disk/partition layout in the sidecar so a later smart
/// restore (spec.md §4.9) has the partition table it needs to plan against,
/// instead of a layout-less single range that would silently under-restore.
fn write_sidecar(image_path: &str, disk: &DiskIdentity, partitions: &[Partition], sector_size: u32, expected_allocated_bytes: u64) -> ChronosResult<()> {
    let mut sidecar = ImageSidecar::from_disk(disk, partitions, sector_size);
    sidecar.set_expected_allocated_bytes(expected_allocated_bytes);
    match sidecar.save(Path::new(image_path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            // Sidecar save failures are logged but do not fail a completed
            // backup (spec.md §7 propagation policy).
            log::warn!("backup: failed to save sidecar for {image_path}: {e}");
            Ok(())
        }
    }
}

fn run_plain_backup(source: &mut dyn RangeSource, path: &str, source_size: u64, sector_size: u32, progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<BackupOutcome> {
    use std::io::Write;
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    let mut throttle = ProgressThrottle::new(source_size);
    let mut buf = vec![0u8; COPY_BUFFER];
    let sector_chunk = (COPY_BUFFER as u64 / sector_size as u64).max(1) as u32;
    let mut bytes_copied = 0u64;
    let mut sector_offset = 0u64;
    loop {
        cancel.check()?;
        let n = source.read_sectors(&mut buf, sector_offset, sector_chunk)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).map_err(ChronosError::from)?;
        bytes_copied += n as u64;
        sector_offset += sector_chunk as u64;
        throttle.maybe_report(bytes_copied, "copying", false, progress);
        if (n as u64) < sector_chunk as u64 * sector_size as u64 {
            break;
        }
    }
    writer.flush().map_err(ChronosError::from)?;
    throttle.maybe_report(bytes_copied, "done", true, progress);
    if bytes_copied < source_size {
        return Err(ChronosError::IncompleteBackup { copied: bytes_copied, expected: source_size });
    }
    Ok(BackupOutcome { bytes_copied, bytes_skipped_zero: 0 })
}

fn run_compressed_plain_backup(
    source: &mut dyn RangeSource,
    path: &str,
    level: u32,
    source_size: u64,
    progress: &dyn ProgressReporter,
    cancel: &CancelHandle,
) -> ChronosResult<BackupOutcome> {
    struct SectorReader<'a> {
        handle: &'a mut dyn RangeSource,
        sector_offset: u64,
        sector_chunk: u32,
        sector_size: u32,
        throttle: ProgressThrottle,
        reported: u64,
        progress: &'a dyn ProgressReporter,
    }
    impl<'a> std::io::Read for SectorReader<'a> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let want_sectors = (buf.len() as u64 / self.sector_size as u64).min(self.sector_chunk as u64).max(1) as u32;
            let n = self
                .handle
                .read_sectors(buf, self.sector_offset, want_sectors)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            self.sector_offset += want_sectors as u64;
            self.reported += n as u64;
            self.throttle.maybe_report(self.reported, "compressing", false, self.progress);
            Ok(n)
        }
    }

    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let mut reader = SectorReader {
        handle: source,
        sector_offset: 0,
        sector_chunk: (COPY_BUFFER as u64 / 512).max(1) as u32,
        sector_size: 512,
        throttle: ProgressThrottle::new(source_size),
        reported: 0,
        progress,
    };
    let sector_size = reader.handle.sector_size();
    reader.sector_size = sector_size;
    reader.sector_chunk = (COPY_BUFFER as u64 / sector_size as u64).max(1) as u32;

    let bytes_copied = crate::codec::compress(reader, writer, level, cancel)?;
    Ok(BackupOutcome { bytes_copied, bytes_skipped_zero: 0 })
}

/// Writes `chunk` (a whole number of `sector_size`-sized sectors starting at
/// `sector_offset`) one contiguous non-zero run at a time, skipping runs of
/// all-zero sectors instead of writing them. Returns the bytes skipped.
fn write_zero_skipped_sectors(writer: &mut DiskWriteHandle, chunk: &[u8], sector_offset: u64, sector_size: u64) -> ChronosResult<u64> {
    let sector_size = sector_size as usize;
    let sector_count = chunk.len() / sector_size;
    let mut skipped = 0u64;
    let mut run_start: Option<usize> = None;

    let flush_run = |writer: &mut DiskWriteHandle, run_start: &mut Option<usize>, end: usize| -> ChronosResult<()> {
        if let Some(start) = run_start.take() {
            let byte_start = start * sector_size;
            let byte_end = end * sector_size;
            writer.write_sectors(&chunk[byte_start..byte_end], sector_offset + start as u64, (end - start) as u32)?;
        }
        Ok(())
    };

    for i in 0..sector_count {
        let sector = &chunk[i * sector_size..(i + 1) * sector_size];
        if sector.iter().all(|&b| b == 0) {
            flush_run(writer, &mut run_start, i)?;
            skipped += sector_size as u64;
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    flush_run(writer, &mut run_start, sector_count)?;
    Ok(skipped)
}

/// The shared copy loop (spec.md §4.10 step 5): 2 MiB buffers, zero-skip,
/// throttled progress, per-buffer cancellation.
fn copy_ranges(source: &mut dyn RangeSource, writer: &mut DiskWriteHandle, ranges: &[CopyRange], progress: &dyn ProgressReporter, cancel: &CancelHandle) -> ChronosResult<(u64, u64)> {
    let total: u64 = ranges.iter().map(|r| r.length).sum();
    let mut throttle = ProgressThrottle::new(total);
    let sector_size = source.sector_size() as u64;
    let mut bytes_copied = 0u64;
    let mut bytes_skipped_zero = 0u64;

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
                log::warn!("backup: read returned 0 bytes at offset {byte_offset}, aborting range");
                break;
            }
            let whole_sectors = n as u64 / sector_size;
            if whole_sectors == 0 {
                bytes_copied += n as u64;
                log::warn!("backup: short read below one sector at offset {byte_offset}, aborting range");
                break;
            }
            let write_len = (whole_sectors * sector_size) as usize;
            bytes_copied += write_len as u64;
            bytes_skipped_zero += write_zero_skipped_sectors(writer, &buf[..write_len], sector_offset, sector_size)?;
            consumed += write_len as u64;
            throttle.maybe_report(bytes_copied, "copying", false, progress);
            if write_len as u64 != want_bytes {
                log::warn!("backup: short read at offset {byte_offset}, aborting range");
                break;
            }
        }
    }
    throttle.maybe_report(bytes_copied, "done", true, progress);
    Ok((bytes_copied, bytes_skipped_zero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::DiskRoleFlags;
    use crate::progress::NullProgressReporter;
    use std::io::Write;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn make_source_file(dir: &std::path::Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn full_partition_backup_into_container_writes_sidecar_and_matches_size() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let mut data = vec![0xABu8; 8192];
        data[..512].fill(0); // leading zero sector exercises the skip path
        let source_path = make_source_file(dir.path(), "source.img", &data);

        let disk = DiskIdentity { index: 0, model: "T".into(), serial: "S".into(), size: data.len() as u64, sector_size: 512, flags: DiskRoleFlags::empty() };
        let partition =
            Partition { disk_index: 0, number: 1, offset: 0, size: data.len() as u64, partition_type: "NTFS".into(), volume_path: Some(source_path.to_string_lossy().into_owned()) };

        let dest_path = dir.path().join("backup.vhdx");
        let job = BackupJob { source: "0:1".into(), destination: dest_path.to_string_lossy().into_owned(), kind: BackupKind::Partition, compression_level: 0, use_snapshot: false };

        let outcome = execute_with_disk(&job, &disk, &[partition], Some(1), &NullProgressReporter, &CancelHandle::new()).unwrap();
        assert_eq!(outcome.bytes_copied, data.len() as u64);
        assert_eq!(outcome.bytes_skipped_zero, 512);
        assert!(ImageSidecar::load(&dest_path).is_some());
    }

    #[test]
    fn truncated_source_produces_incomplete_backup() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0x11u8; 1024];
        let source_path = make_source_file(dir.path(), "source.img", &data);

        let disk = DiskIdentity { index: 0, model: "T".into(), serial: "S".into(), size: 4096, sector_size: 512, flags: DiskRoleFlags::empty() };
        // Partition claims to be larger than the backing file, forcing a short read.
        let partition = Partition { disk_index: 0, number: 1, offset: 0, size: 4096, partition_type: "NTFS".into(), volume_path: Some(source_path.to_string_lossy().into_owned()) };

        let dest_path = dir.path().join("backup.vhdx");
        let job = BackupJob { source: "0:1".into(), destination: dest_path.to_string_lossy().into_owned(), kind: BackupKind::Partition, compression_level: 0, use_snapshot: false };

        let err = execute_with_disk(&job, &disk, &[partition], Some(1), &NullProgressReporter, &CancelHandle::new()).unwrap_err();
        match err {
            ChronosError::IncompleteBackup { copied, expected } => {
                assert_eq!(copied, data.len() as u64);
                assert_eq!(expected, 4096);
            }
            other => panic!("expected IncompleteBackup, got {other:?}"),
        }
        assert!(ImageSidecar::load(&dest_path).is_none());
    }

    #[test]
    fn disk_level_backup_covers_whole_disk_and_partition() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let size = 64 * 1024;
        let data = vec![0x77u8; size];
        let source_path = make_source_file(dir.path(), "disk.img", &data);

        let disk = DiskIdentity { index: 0, model: "T".into(), serial: "S".into(), size: size as u64, sector_size: 512, flags: DiskRoleFlags::empty() };
        let partition = Partition { disk_index: 0, number: 1, offset: 1024, size: size as u64 - 2048, partition_type: "NTFS".into(), volume_path: None };

        // Disk-level backup opens `\\.\PhysicalDriveN`, unavailable off a
        // real host; exercise the planner-and-copy half directly instead.
        let ranges = planner::plan_disk_copy(&disk, &[partition], None, None);
        assert!(!ranges.is_empty());
        let total: u64 = ranges.iter().map(|r| r.length).sum();
        assert!(total <= disk.size);
        let _ = source_path;
    }

    #[test]
    fn compressed_plain_backup_round_trips() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0x42u8; 16384];
        let source_path = make_source_file(dir.path(), "source.img", &data);
        let mut source = DiskReadHandle::open_path_for_read(&source_path.to_string_lossy(), Some(data.len() as u64)).unwrap();

        let dest_path = dir.path().join("backup.img.z");
        let outcome =
            run_compressed_plain_backup(&mut source, &dest_path.to_string_lossy(), 6, data.len() as u64, &NullProgressReporter, &CancelHandle::new()).unwrap();
        assert_eq!(outcome.bytes_copied, data.len() as u64);

        let compressed = std::fs::read(&dest_path).unwrap();
        let mut decompressed = Vec::new();
        crate::codec::decompress(std::io::Cursor::new(compressed), &mut decompressed, &CancelHandle::new()).unwrap();
        assert_eq!(decompressed, data);
    }
}
