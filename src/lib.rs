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
*/

//! # chronos-core
//!
//! `chronos-core` is the imaging data plane for a block-level disk backup,
//! restore, clone and verification tool. It captures, restores, clones,
//! verifies and browses disk and partition images on raw storage devices.
//!
//! The crate does not implement a graphical shell, settings persistence,
//! environment probing, update checks, or operation history — those are
//! external collaborators. It only emits [`progress::OperationProgress`]
//! events and [`log`] records for a host application to consume and persist.
//!
//! The primary entry points are the four engines: [`backup::BackupEngine`],
//! [`restore::RestoreEngine`], [`clone::CloneEngine`] and
//! [`verify::verify_image`] / [`verify::compute_hash`].

pub mod allocation;
pub mod backup;
pub mod clone;
pub mod codec;
pub mod container;
pub mod descriptor;
pub mod disk_io;
pub mod enumerate;
pub mod planner;
pub mod progress;
pub mod restore;
pub mod sidecar;
pub mod snapshot;
pub mod verify;

use std::io;

use thiserror::Error;

/// The error taxonomy surfaced by the core, as specified in spec.md §6/§7.
///
/// `Cancelled` is a distinct variant and is never wrapped inside
/// [`ChronosError::DeviceIoError`] or any other I/O-shaped variant — the
/// design notes call this out explicitly (exceptions-for-control-flow must
/// not survive the re-architecture).
#[derive(Debug, Error)]
pub enum ChronosError {
    #[error("device at offset {offset:?} is not connected: {message}")]
    DeviceNotConnected { offset: Option<u64>, message: String },

    #[error("device I/O error at offset {offset:?}: {message}")]
    DeviceIoError { offset: Option<u64>, message: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("backup incomplete: copied {copied} of {expected} expected bytes")]
    IncompleteBackup { copied: u64, expected: u64 },

    #[error("image undersized: {actual} bytes, expected at least {expected} bytes")]
    ImageUndersized { actual: u64, expected: u64 },

    #[error("sector size mismatch: sidecar reports {sidecar}, target reports {target}")]
    SectorSizeMismatch { sidecar: u32, target: u32 },

    #[error("target too small: {target} bytes available, {required} bytes required")]
    TargetTooSmall { target: u64, required: u64 },

    #[error("target disk is flagged as a system or boot disk; force-overwrite was not requested")]
    SystemDiskProtected,

    #[error("source and destination resolve to the same device")]
    SourceEqualsDestination,

    #[error("operation was cancelled")]
    Cancelled,
}

// Manually implement `From<io::Error>` for `ChronosError`, mirroring the
// teacher's own `From<io::Error> for DiskImageError` in lib.rs.
impl From<io::Error> for ChronosError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => ChronosError::PathNotFound(err.to_string()),
            PermissionDenied => ChronosError::AccessDenied(err.to_string()),
            _ => ChronosError::DeviceIoError { offset: None, message: err.to_string() },
        }
    }
}

pub type ChronosResult<T> = Result<T, ChronosError>;
