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

    tests/clone_guard.rs

    spec.md §8 scenario 5: clone source==destination rejection. A clone job
    whose source and destination resolve to the same `(disk, partition?)`
    tuple must fail with `SourceEqualsDestination` before any handle is
    opened; a distinct destination disk passes the guard (and then fails
    trying to open a nonexistent physical device, which is the expected
    next failure off a real host).
*/

mod common;

use chronos_core::clone::{execute, CloneJob};
use chronos_core::progress::{CancelHandle, NullProgressReporter};
use chronos_core::ChronosError;

#[test]
fn identical_disk_source_and_destination_are_rejected_before_opening_anything() {
    common::init();
    let job = CloneJob { source: "3".into(), destination: "3".into() };
    let err = execute(&job, &NullProgressReporter, &CancelHandle::new()).unwrap_err();
    assert!(matches!(err, ChronosError::SourceEqualsDestination));
}

#[test]
fn identical_disk_partition_pairs_are_rejected() {
    common::init();
    let job = CloneJob { source: "2:1".into(), destination: "2:1".into() };
    let err = execute(&job, &NullProgressReporter, &CancelHandle::new()).unwrap_err();
    assert!(matches!(err, ChronosError::SourceEqualsDestination));
}

#[test]
fn distinct_disks_pass_the_guard_and_attempt_to_open_a_real_device() {
    common::init();
    let job = CloneJob { source: "2".into(), destination: "3".into() };
    let err = execute(&job, &NullProgressReporter, &CancelHandle::new()).unwrap_err();
    assert!(!matches!(err, ChronosError::SourceEqualsDestination));
}
