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

    tests/restore_sector_size_guard.rs

    spec.md §8 scenario 3: cross-sector-size refusal. A sidecar recorded
    against a 4096-byte-sector source must refuse to validate against a
    512-byte-sector target with `SectorSizeMismatch`, before the engine
    ever reaches the point of opening the target for write.
*/

mod common;

use chronos_core::enumerate::DiskRoleFlags;
use chronos_core::restore::{validate, RestoreJob};
use chronos_core::sidecar::ImageSidecar;
use chronos_core::ChronosError;

#[test]
fn sidecar_sector_size_mismatch_is_refused_before_opening_target() {
    common::init();
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("image.vhdx");
    std::fs::write(&image_path, vec![0u8; 4096]).unwrap();

    let source_disk = common::disk(0, 4096, 4096, DiskRoleFlags::empty());
    let mut sidecar = ImageSidecar::from_disk(&source_disk, &[], 4096);
    sidecar.set_expected_allocated_bytes(4096);
    sidecar.save(&image_path).unwrap();

    let target_disk = common::disk(0, 1024 * 1024, 512, DiskRoleFlags::empty());
    let job = RestoreJob { source: image_path.to_string_lossy().into_owned(), target: "0".into(), verify_during_restore: false, force_overwrite: false };

    let err = validate(&job, &target_disk, None).unwrap_err();
    match err {
        ChronosError::SectorSizeMismatch { sidecar, target } => {
            assert_eq!(sidecar, 4096);
            assert_eq!(target, 512);
        }
        other => panic!("expected SectorSizeMismatch, got {other:?}"),
    }
}
