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

    src/sidecar.rs

    The typed record describing a backed-up disk's geometry, partition
    layout, sector size, and expected allocated bytes (C7); a durable JSON
    form saved alongside each image. A reader can reconstruct the full
    partition map from the sidecar alone, without consulting the image.
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enumerate::{DiskIdentity, DiskRoleFlags, Partition};
use crate::{ChronosError, ChronosResult};

pub const SIDECAR_SUFFIX: &str = ".chronos.json";
const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Full,
    Incremental,
    Differential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct DiskRecord {
    index: u32,
    model: String,
    serial: String,
    size: u64,
    is_system: bool,
    is_boot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PartitionRecord {
    number: u32,
    offset: u64,
    size: u64,
    #[serde(rename = "type")]
    partition_type: String,
    volume_path: Option<String>,
}

/// The sidecar metadata record. Immutable once loaded; built via
/// [`ImageSidecar::from_disk`] at the end of a successful backup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSidecar {
    version: u32,
    source_sector_size: u32,
    expected_allocated_bytes: u64,
    disk: DiskRecord,
    partitions: Vec<PartitionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ChainKind>,
    /// Unknown fields are preserved verbatim on round-trip (spec.md §6).
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl ImageSidecar {
    /// Builds a sidecar from a disk identity, its partitions, and the
    /// source sector size. `expected_allocated_bytes` defaults to 0 until
    /// [`ImageSidecar::set_expected_allocated_bytes`] is called.
    pub fn from_disk(disk: &DiskIdentity, partitions: &[Partition], sector_size: u32) -> Self {
        ImageSidecar {
            version: CURRENT_VERSION,
            source_sector_size: sector_size,
            expected_allocated_bytes: 0,
            disk: DiskRecord {
                index: disk.index,
                model: disk.model.clone(),
                serial: disk.serial.clone(),
                size: disk.size,
                is_system: disk.is_system(),
                is_boot: disk.is_boot(),
            },
            partitions: partitions
                .iter()
                .map(|p| PartitionRecord {
                    number: p.number,
                    offset: p.offset,
                    size: p.size,
                    partition_type: p.partition_type.clone(),
                    volume_path: p.volume_path.clone(),
                })
                .collect(),
            chain_id: None,
            sequence: None,
            parent_path: None,
            kind: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn set_expected_allocated_bytes(&mut self, n: u64) {
        self.expected_allocated_bytes = n;
    }

    pub fn expected_allocated_bytes(&self) -> u64 {
        self.expected_allocated_bytes
    }

    pub fn source_sector_size(&self) -> u32 {
        self.source_sector_size
    }

    pub fn set_chain(&mut self, chain_id: String, sequence: u32, parent_path: Option<String>, kind: ChainKind) {
        self.chain_id = Some(chain_id);
        self.sequence = Some(sequence);
        self.parent_path = parent_path;
        self.kind = Some(kind);
    }

    pub fn parent_path(&self) -> Option<&str> {
        self.parent_path.as_deref()
    }

    /// Reconstructs the full disk identity and partition map without
    /// consulting the image.
    pub fn to_disk_and_partitions(&self) -> (DiskIdentity, Vec<Partition>) {
        let mut flags = DiskRoleFlags::empty();
        if self.disk.is_system {
            flags |= DiskRoleFlags::IS_SYSTEM;
        }
        if self.disk.is_boot {
            flags |= DiskRoleFlags::IS_BOOT;
        }
        let disk = DiskIdentity {
            index: self.disk.index,
            model: self.disk.model.clone(),
            serial: self.disk.serial.clone(),
            size: self.disk.size,
            sector_size: self.source_sector_size,
            flags,
        };
        let partitions = self
            .partitions
            .iter()
            .map(|p| Partition {
                disk_index: self.disk.index,
                number: p.number,
                offset: p.offset,
                size: p.size,
                partition_type: p.partition_type.clone(),
                volume_path: p.volume_path.clone(),
            })
            .collect();
        (disk, partitions)
    }

    fn sidecar_path(image_path: &Path) -> PathBuf {
        let mut s = image_path.as_os_str().to_os_string();
        s.push(SIDECAR_SUFFIX);
        PathBuf::from(s)
    }

    /// Writes the sidecar to `image_path + ".chronos.json"` atomically
    /// (write-temp, rename).
    pub fn save(&self, image_path: &Path) -> ChronosResult<()> {
        let final_path = Self::sidecar_path(image_path);
        let tmp_path = final_path.with_extension("chronos.json.tmp");
        let json = serde_json::to_vec_pretty(self).map_err(|e| ChronosError::InvalidParameter(e.to_string()))?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &final_path)?;
        log::debug!("sidecar: saved {}", final_path.display());
        Ok(())
    }

    /// Loads the sidecar for `image_path`, if present.
    pub fn load(image_path: &Path) -> Option<Self> {
        let path = Self::sidecar_path(image_path);
        let bytes = std::fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
