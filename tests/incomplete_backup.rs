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

    tests/incomplete_backup.rs

    spec.md §8 scenario 2: incomplete-backup fault injection. The source
    file is truncated to roughly 60% of the partition's declared size, so
    the copy loop hits a short read partway through; the engine must return
    `IncompleteBackup{copied, expected}` and must not leave a sidecar behind
    claiming success.
*/

mod common;

use chronos_core::backup::{execute_with_disk, BackupJob, BackupKind};
use chronos_core::enumerate::DiskRoleFlags;
use chronos_core::progress::{CancelHandle, NullProgressReporter};
use chronos_core::sidecar::ImageSidecar;
use chronos_core::ChronosError;

#[test]
fn truncated_source_yields_incomplete_backup_with_no_sidecar() {
    common::init();
    let dir = tempfile::tempdir().unwrap();

    let declared_size: u64 = 10 * 1024 * 1024;
    let actual_size = (declared_size as f64 * 0.6) as usize;
    let source_path = common::make_sparse_file(dir.path(), "volume.img", actual_size, &[(0, actual_size, 0x5A)]);

    let disk = common::disk(0, 64 * 1024 * 1024, 512, DiskRoleFlags::empty());
    let partition = common::partition(1, 1024 * 1024, declared_size, Some(source_path.to_str().unwrap()));

    let dest_path = dir.path().join("backup.vhdx");
    let job = BackupJob {
        source: "0:1".into(),
        destination: dest_path.to_string_lossy().into_owned(),
        kind: BackupKind::Partition,
        compression_level: 0,
        use_snapshot: false,
    };

    let err = execute_with_disk(&job, &disk, &[partition], Some(1), &NullProgressReporter, &CancelHandle::new()).unwrap_err();
    match err {
        ChronosError::IncompleteBackup { copied, expected } => {
            assert_eq!(copied, actual_size as u64);
            assert_eq!(expected, declared_size);
            assert!((copied as f64 / expected as f64 - 0.6).abs() < 0.01);
        }
        other => panic!("expected IncompleteBackup, got {other:?}"),
    }
    assert!(ImageSidecar::load(&dest_path).is_none(), "no sidecar should be written on a failed backup");
}
