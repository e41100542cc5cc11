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

    tests/common/mod.rs

    Fixture builders shared by the engine integration tests: a tempfile
    standing in for a physical device, disk/partition identities, and a
    progress reporter that records every event for cadence assertions.
*/

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chronos_core::enumerate::{DiskIdentity, DiskRoleFlags, Partition};
use chronos_core::progress::{OperationProgress, ProgressReporter};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes `size` bytes to `dir/name`, all zero except for the given
/// `(offset, byte)` fill ranges, standing in for a partition with sparse
/// allocated content.
#[allow(dead_code)]
pub fn make_sparse_file(dir: &Path, name: &str, size: usize, filled: &[(usize, usize, u8)]) -> PathBuf {
    let path = dir.join(name);
    let mut data = vec![0u8; size];
    for &(start, len, byte) in filled {
        data[start..start + len].fill(byte);
    }
    std::fs::write(&path, &data).unwrap();
    path
}

#[allow(dead_code)]
pub fn disk(index: u32, size: u64, sector_size: u32, flags: DiskRoleFlags) -> DiskIdentity {
    DiskIdentity { index, model: "Test Disk".into(), serial: "TEST-SERIAL".into(), size, sector_size, flags }
}

#[allow(dead_code)]
pub fn partition(number: u32, offset: u64, size: u64, volume_path: Option<&str>) -> Partition {
    Partition { disk_index: 0, number, offset, size, partition_type: "NTFS".into(), volume_path: volume_path.map(String::from) }
}

/// Collects every reported event for cadence/ordering assertions instead of
/// discarding them like [`chronos_core::progress::NullProgressReporter`].
#[allow(dead_code)]
pub struct RecordingProgressReporter {
    events: Mutex<Vec<OperationProgress>>,
}

#[allow(dead_code)]
impl RecordingProgressReporter {
    pub fn new() -> Self {
        RecordingProgressReporter { events: Mutex::new(Vec::new()) }
    }

    pub fn events(&self) -> Vec<OperationProgress> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgressReporter {
    fn report(&self, progress: OperationProgress) {
        self.events.lock().unwrap().push(progress);
    }
}
