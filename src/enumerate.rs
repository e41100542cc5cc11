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

    src/enumerate.rs

    Lists physical disks and their partitions via direct device ioctls,
    with no dependency on a filesystem-inventory service (C5). Grounded on
    `ticpu-bcachefs-tools/src/device_scan.rs`'s enumerate-then-refresh
    shape.
*/

use std::sync::RwLock;

use bitflags::bitflags;
use once_cell::sync::Lazy;

bitflags! {
    /// Role flags carried on a [`DiskIdentity`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiskRoleFlags: u8 {
        const IS_SYSTEM = 0b001;
        const IS_BOOT = 0b010;
        const IS_REFRESH_SENTINEL = 0b100;
    }
}

/// A physical disk observed by enumeration. Immutable for the lifetime of a
/// snapshot of the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskIdentity {
    pub index: u32,
    pub model: String,
    pub serial: String,
    pub size: u64,
    pub sector_size: u32,
    pub flags: DiskRoleFlags,
}

impl DiskIdentity {
    pub fn is_system(&self) -> bool {
        self.flags.contains(DiskRoleFlags::IS_SYSTEM)
    }

    pub fn is_boot(&self) -> bool {
        self.flags.contains(DiskRoleFlags::IS_BOOT)
    }
}

/// A partition on a disk.
///
/// Invariants (enforced by [`Partition::validate`]): `offset` and `size`
/// are multiples of `sector_size`; `offset + size <= disk_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub disk_index: u32,
    pub number: u32,
    pub offset: u64,
    pub size: u64,
    pub partition_type: String,
    pub volume_path: Option<String>,
}

impl Partition {
    pub fn validate(&self, sector_size: u32, disk_size: u64) -> bool {
        let sector_size = sector_size as u64;
        self.offset.is_multiple_of(sector_size) && self.size.is_multiple_of(sector_size) && self.offset + self.size <= disk_size
    }
}

type DiskListing = Vec<(DiskIdentity, Vec<Partition>)>;

static CACHE: Lazy<RwLock<Option<DiskListing>>> = Lazy::new(|| RwLock::new(None));

fn ensure_populated() {
    let needs_fill = CACHE.read().unwrap().is_none();
    if needs_fill {
        let fresh = backend::enumerate();
        *CACHE.write().unwrap() = Some(fresh);
    }
}

/// Lists physical disks.
pub fn list_disks() -> Vec<DiskIdentity> {
    ensure_populated();
    CACHE.read().unwrap().as_ref().unwrap().iter().map(|(d, _)| d.clone()).collect()
}

/// Lists the partitions of `disk`.
pub fn list_partitions(disk: &DiskIdentity) -> Vec<Partition> {
    ensure_populated();
    CACHE
        .read()
        .unwrap()
        .as_ref()
        .unwrap()
        .iter()
        .find(|(d, _)| d.index == disk.index)
        .map(|(_, parts)| parts.clone())
        .unwrap_or_default()
}

pub fn get_disk(index: u32) -> Option<DiskIdentity> {
    list_disks().into_iter().find(|d| d.index == index)
}

/// Forces re-enumeration. Must be called after a container attach to pick
/// up the newly attached disk.
pub fn refresh() {
    log::debug!("enumerate: refreshing disk list");
    *CACHE.write().unwrap() = Some(backend::enumerate());
}

#[cfg(windows)]
mod backend {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;

    use windows_sys::Win32::Foundation::{CloseHandle, BOOLEAN, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{
        CreateFileW, FILE_GENERIC_READ, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    };
    use windows_sys::Win32::System::Ioctl::{
        DISK_GEOMETRY_EX, DRIVE_LAYOUT_INFORMATION_EX, IOCTL_DISK_GET_DRIVE_GEOMETRY_EX, IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
        IOCTL_STORAGE_GET_DEVICE_NUMBER, IOCTL_STORAGE_QUERY_PROPERTY, PARTITION_INFORMATION_EX, PARTITION_STYLE_GPT,
        PropertyStandardQuery, StorageDeviceProperty, STORAGE_DEVICE_DESCRIPTOR, STORAGE_DEVICE_NUMBER, STORAGE_PROPERTY_QUERY,
    };
    use windows_sys::Win32::System::IO::DeviceIoControl;

    use super::{DiskIdentity, DiskRoleFlags, Partition};

    const MAX_PARTITIONS: usize = 128;

    fn to_wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }

    struct OwnedHandle(HANDLE);
    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    fn open_for_ioctl(path: &str) -> Option<OwnedHandle> {
        let wide = to_wide(path);
        let handle = unsafe {
            CreateFileW(wide.as_ptr(), FILE_GENERIC_READ, FILE_SHARE_READ | FILE_SHARE_WRITE, ptr::null(), OPEN_EXISTING, 0, 0)
        };
        if handle == INVALID_HANDLE_VALUE {
            None
        } else {
            Some(OwnedHandle(handle))
        }
    }

    fn query_geometry(handle: HANDLE) -> Option<(u32, u64)> {
        let mut geometry: DISK_GEOMETRY_EX = unsafe { std::mem::zeroed() };
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_DISK_GET_DRIVE_GEOMETRY_EX,
                ptr::null(),
                0,
                &mut geometry as *mut _ as *mut _,
                std::mem::size_of::<DISK_GEOMETRY_EX>() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return None;
        }
        Some((unsafe { geometry.Geometry.BytesPerSector }, geometry.DiskSize as u64))
    }

    fn device_number(handle: HANDLE) -> Option<u32> {
        let mut number: STORAGE_DEVICE_NUMBER = unsafe { std::mem::zeroed() };
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_STORAGE_GET_DEVICE_NUMBER,
                ptr::null(),
                0,
                &mut number as *mut _ as *mut _,
                std::mem::size_of::<STORAGE_DEVICE_NUMBER>() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            None
        } else {
            Some(number.DeviceNumber)
        }
    }

    /// Reads the vendor/model and serial strings via
    /// `IOCTL_STORAGE_QUERY_PROPERTY` with a `StorageDeviceProperty` query.
    fn device_identity_strings(handle: HANDLE) -> (String, String) {
        let query = STORAGE_PROPERTY_QUERY { PropertyId: StorageDeviceProperty, QueryType: PropertyStandardQuery, AdditionalParameters: [0] };
        let mut buf = vec![0u8; 1024];
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_STORAGE_QUERY_PROPERTY,
                &query as *const _ as *const _,
                std::mem::size_of::<STORAGE_PROPERTY_QUERY>() as u32,
                buf.as_mut_ptr() as *mut _,
                buf.len() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 || (returned as usize) < std::mem::size_of::<STORAGE_DEVICE_DESCRIPTOR>() {
            return (String::new(), String::new());
        }
        let descriptor = unsafe { ptr::read_unaligned(buf.as_ptr() as *const STORAGE_DEVICE_DESCRIPTOR) };
        let read_cstr = |offset: u32| -> String {
            if offset == 0 {
                return String::new();
            }
            let start = offset as usize;
            if start >= buf.len() {
                return String::new();
            }
            let end = buf[start..].iter().position(|&b| b == 0).map(|p| start + p).unwrap_or(buf.len());
            String::from_utf8_lossy(&buf[start..end]).trim().to_string()
        };
        let vendor = read_cstr(descriptor.VendorIdOffset);
        let product = read_cstr(descriptor.ProductIdOffset);
        let model = if vendor.is_empty() { product.clone() } else { format!("{vendor} {product}").trim().to_string() };
        let serial = read_cstr(descriptor.SerialNumberOffset);
        (model, serial)
    }

    fn format_guid(guid: &windows_sys::core::GUID) -> String {
        format!(
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            guid.data1,
            guid.data2,
            guid.data3,
            guid.data4[0],
            guid.data4[1],
            guid.data4[2],
            guid.data4[3],
            guid.data4[4],
            guid.data4[5],
            guid.data4[6],
            guid.data4[7]
        )
    }

    #[repr(C)]
    struct LayoutBuffer {
        header: DRIVE_LAYOUT_INFORMATION_EX,
        extra: [PARTITION_INFORMATION_EX; MAX_PARTITIONS],
    }

    fn query_partitions(handle: HANDLE, disk_index: u32) -> Vec<Partition> {
        let mut layout: LayoutBuffer = unsafe { std::mem::zeroed() };
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle,
                IOCTL_DISK_GET_DRIVE_LAYOUT_EX,
                ptr::null(),
                0,
                &mut layout as *mut _ as *mut _,
                std::mem::size_of::<LayoutBuffer>() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Vec::new();
        }
        let count = (layout.header.PartitionCount as usize).min(1 + MAX_PARTITIONS);
        let entries = unsafe { std::slice::from_raw_parts(layout.header.PartitionEntry.as_ptr(), count) };
        entries
            .iter()
            .filter(|e| e.PartitionLength > 0)
            .map(|e| {
                let partition_type = if layout.header.PartitionStyle as i32 == PARTITION_STYLE_GPT {
                    format_guid(&unsafe { e.Anonymous.Gpt }.PartitionType)
                } else {
                    format!("MBR:{:#04x}", unsafe { e.Anonymous.Mbr }.PartitionType)
                };
                Partition {
                    disk_index,
                    number: e.PartitionNumber,
                    offset: e.StartingOffset as u64,
                    size: e.PartitionLength as u64,
                    partition_type,
                    volume_path: None,
                }
            })
            .collect()
    }

    fn boot_disk_number() -> Option<u32> {
        let handle = open_for_ioctl(r"\\.\C:")?;
        device_number(handle.0)
    }

    /// Walks `\\.\PhysicalDrive0..N` via `IOCTL_DISK_GET_DRIVE_GEOMETRY_EX` and
    /// `IOCTL_DISK_GET_DRIVE_LAYOUT_EX` to build each disk's partition table,
    /// with `is_system`/`is_boot` flags derived by comparing each disk's
    /// `IOCTL_STORAGE_GET_DEVICE_NUMBER` result against the boot volume's
    /// (`\\.\C:`).
    pub fn enumerate() -> Vec<(DiskIdentity, Vec<Partition>)> {
        let boot_disk = boot_disk_number();
        let mut disks = Vec::new();
        for index in 0..64u32 {
            let path = format!(r"\\.\PhysicalDrive{index}");
            let Some(handle) = open_for_ioctl(&path) else {
                // ERROR_FILE_NOT_FOUND for an index beyond the last disk; a
                // sparse gap (ERROR_ACCESS_DENIED, etc.) is skipped instead of
                // treated as the end of the list.
                if unsafe { windows_sys::Win32::Foundation::GetLastError() } == windows_sys::Win32::Foundation::ERROR_FILE_NOT_FOUND {
                    break;
                }
                continue;
            };
            let Some((sector_size, size)) = query_geometry(handle.0) else { continue };
            let partitions = query_partitions(handle.0, index);
            let (model, serial) = device_identity_strings(handle.0);
            let is_boot = boot_disk == Some(index);
            let mut flags = DiskRoleFlags::empty();
            if is_boot {
                flags |= DiskRoleFlags::IS_SYSTEM | DiskRoleFlags::IS_BOOT;
            }
            disks.push((DiskIdentity { index, model, serial, size, sector_size, flags }, partitions));
        }
        disks
    }

    /// Locks, dismounts, and unmounts every volume backed by `disk_index`'s
    /// partitions via `FSCTL_LOCK_VOLUME`/`FSCTL_DISMOUNT_VOLUME`, then sets
    /// the disk offline via `IOCTL_DISK_SET_DISK_ATTRIBUTES`. Held locks are
    /// process-scoped: releasing closes the per-volume handle used to take
    /// them.
    fn prepare_disk_volumes_for_write_inner(disk_index: u32) -> Result<Vec<OwnedHandle>, std::io::Error> {
        use windows_sys::Win32::Storage::FileSystem::FILE_GENERIC_WRITE;
        use windows_sys::Win32::System::Ioctl::{FSCTL_DISMOUNT_VOLUME, FSCTL_LOCK_VOLUME};

        let Some(disk_handle) = open_for_ioctl(&format!(r"\\.\PhysicalDrive{disk_index}")) else {
            return Err(std::io::Error::last_os_error());
        };
        let partitions = query_partitions(disk_handle.0, disk_index);

        let mut locks = Vec::new();
        for partition in &partitions {
            let volume_path = format!(r"\\.\Harddisk{disk_index}Partition{}", partition.number);
            let wide = to_wide(&volume_path);
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    FILE_GENERIC_READ | FILE_GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    ptr::null(),
                    OPEN_EXISTING,
                    0,
                    0,
                )
            };
            if handle == INVALID_HANDLE_VALUE {
                continue;
            }
            let mut returned = 0u32;
            unsafe {
                DeviceIoControl(handle, FSCTL_LOCK_VOLUME, ptr::null(), 0, ptr::null_mut(), 0, &mut returned, ptr::null_mut());
                DeviceIoControl(handle, FSCTL_DISMOUNT_VOLUME, ptr::null(), 0, ptr::null_mut(), 0, &mut returned, ptr::null_mut());
            }
            locks.push(OwnedHandle(handle));
        }

        set_disk_offline(disk_handle.0, true);
        locks.push(disk_handle);
        Ok(locks)
    }

    fn set_disk_offline(handle: HANDLE, offline: bool) {
        use windows_sys::Win32::System::Ioctl::{IOCTL_DISK_SET_DISK_ATTRIBUTES, SET_DISK_ATTRIBUTES, DISK_ATTRIBUTE_OFFLINE};
        let attrs = SET_DISK_ATTRIBUTES {
            Version: std::mem::size_of::<SET_DISK_ATTRIBUTES>() as u32,
            Persist: 0 as BOOLEAN,
            Reserved1: [0; 3],
            Attributes: if offline { DISK_ATTRIBUTE_OFFLINE } else { 0 },
            AttributesMask: DISK_ATTRIBUTE_OFFLINE,
            Reserved2: [0; 4],
        };
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                handle,
                IOCTL_DISK_SET_DISK_ATTRIBUTES,
                &attrs as *const _ as *const _,
                std::mem::size_of::<SET_DISK_ATTRIBUTES>() as u32,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
            );
        }
    }

    /// Releases the lock/dismount/offline state taken by
    /// `prepare_disk_volumes_for_write_inner`: brings the disk back online,
    /// then drops (and so closes) every volume/disk handle that was held.
    fn release_disk_volumes_write_preparation_inner(disk_index: u32, locks: Vec<OwnedHandle>) {
        if let Some(disk_handle) = open_for_ioctl(&format!(r"\\.\PhysicalDrive{disk_index}")) {
            set_disk_offline(disk_handle.0, false);
        }
        drop(locks);
    }

    static LOCKS: once_cell::sync::Lazy<std::sync::Mutex<std::collections::HashMap<u32, Vec<OwnedHandle>>>> =
        once_cell::sync::Lazy::new(|| std::sync::Mutex::new(std::collections::HashMap::new()));

    /// Public entry point used by `container::VolumePreparation`: prepares
    /// `disk_index` for write and stashes the held locks in a process-wide
    /// table keyed by disk index, so a later, separate call to
    /// `release_disk_volumes_write_preparation` can find and release them.
    pub fn prepare_disk_volumes_for_write(disk_index: u32) -> std::io::Result<()> {
        let locks = prepare_disk_volumes_for_write_inner(disk_index)?;
        LOCKS.lock().unwrap().insert(disk_index, locks);
        Ok(())
    }

    pub fn release_disk_volumes_write_preparation(disk_index: u32) {
        if let Some(locks) = LOCKS.lock().unwrap().remove(&disk_index) {
            release_disk_volumes_write_preparation_inner(disk_index, locks);
        }
    }
}

/// Portable fallback: no physical disks are visible off-Windows; callers in
/// tests populate the planner/engines directly instead of going through
/// enumeration.
#[cfg(not(windows))]
mod backend {
    use super::{DiskIdentity, Partition};

    pub fn enumerate() -> Vec<(DiskIdentity, Vec<Partition>)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_validate_rejects_misaligned_offset() {
        let p = Partition { disk_index: 0, number: 1, offset: 511, size: 1024, partition_type: "NTFS".into(), volume_path: None };
        assert!(!p.validate(512, 1_000_000));
    }

    #[test]
    fn partition_validate_rejects_overflowing_disk() {
        let p = Partition { disk_index: 0, number: 1, offset: 512, size: 2048, partition_type: "NTFS".into(), volume_path: None };
        assert!(!p.validate(512, 2000));
        assert!(p.validate(512, 2560));
    }

    #[test]
    fn refresh_repopulates_cache() {
        refresh();
        assert_eq!(list_disks().len(), 0);
    }
}
