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

    src/descriptor.rs

    Parses the CLI/driver-facing source and destination strings (spec.md
    §6): a bare disk index, a `disk:partition` pair, a `\\.\PhysicalDriveN`
    path, or an image file path. Grounded on `src/util.rs`'s use of `regex`
    for loosely-structured string parsing.
*/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ChronosError, ChronosResult};

static PHYSICAL_DRIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\\\\\.\\PhysicalDrive(\d+)$").expect("invalid regex"));
static DISK_PARTITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+)$").expect("invalid regex"));
static BARE_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("invalid regex"));

/// A parsed disk or disk:partition source/target reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub disk_index: u32,
    pub partition_number: Option<u32>,
}

/// What a destination string names: an attached virtual-disk container, or
/// a plain byte-stream image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDestination {
    Container(String),
    PlainFile(String),
}

/// Parses a disk or partition source/target string: `N`, `N:P`, or
/// `\\.\PhysicalDriveN`.
pub fn parse_device(input: &str) -> ChronosResult<DeviceDescriptor> {
    let trimmed = input.trim();
    if let Some(caps) = PHYSICAL_DRIVE.captures(trimmed) {
        let disk_index = caps[1].parse().map_err(|_| invalid(trimmed))?;
        return Ok(DeviceDescriptor { disk_index, partition_number: None });
    }
    if let Some(caps) = DISK_PARTITION.captures(trimmed) {
        let disk_index = caps[1].parse().map_err(|_| invalid(trimmed))?;
        let partition_number = caps[2].parse().map_err(|_| invalid(trimmed))?;
        return Ok(DeviceDescriptor { disk_index, partition_number: Some(partition_number) });
    }
    if BARE_INDEX.is_match(trimmed) {
        let disk_index = trimmed.parse().map_err(|_| invalid(trimmed))?;
        return Ok(DeviceDescriptor { disk_index, partition_number: None });
    }
    Err(invalid(trimmed))
}

/// Classifies a destination path by extension: `.vhdx`/`.vhd` select
/// container mode, anything else is a plain image.
pub fn classify_destination(path: &str) -> ImageDestination {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".vhdx") || lower.ends_with(".vhd") {
        ImageDestination::Container(path.to_string())
    } else {
        ImageDestination::PlainFile(path.to_string())
    }
}

fn invalid(input: &str) -> ChronosError {
    ChronosError::InvalidParameter(format!("'{input}' is not a valid disk, partition, or device descriptor"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_disk_index() {
        assert_eq!(parse_device("2").unwrap(), DeviceDescriptor { disk_index: 2, partition_number: None });
    }

    #[test]
    fn parses_disk_partition_pair() {
        assert_eq!(parse_device("1:3").unwrap(), DeviceDescriptor { disk_index: 1, partition_number: Some(3) });
    }

    #[test]
    fn parses_physical_drive_path_case_insensitively() {
        assert_eq!(parse_device(r"\\.\PhysicalDrive0").unwrap(), DeviceDescriptor { disk_index: 0, partition_number: None });
        assert_eq!(parse_device(r"\\.\physicaldrive7").unwrap(), DeviceDescriptor { disk_index: 7, partition_number: None });
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(parse_device("not-a-disk").is_err());
        assert!(parse_device("1:2:3").is_err());
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify_destination("backup.vhdx"), ImageDestination::Container("backup.vhdx".into()));
        assert_eq!(classify_destination("backup.VHD"), ImageDestination::Container("backup.VHD".into()));
        assert_eq!(classify_destination("backup.img"), ImageDestination::PlainFile("backup.img".into()));
    }
}
