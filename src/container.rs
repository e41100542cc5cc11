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

    src/container.rs

    Virtual disk container lifecycle (C2): create, attach, detach, and an
    attachment table the process is the sole mutator of. Dropping an
    `AttachedContainer` releases its attachment exactly once, even on
    unwind.
*/

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::ChronosResult;

/// Process-wide table of live attachments. Never held across I/O — only
/// mutated to register or remove an entry.
static ATTACHMENTS: Lazy<Mutex<HashMap<PathBuf, String>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A virtual-disk container file that the host has exposed as a raw device
/// path. Owns the attachment's lifetime; `physical_path()` is valid until
/// the handle is dropped, at which point `dismount` runs exactly once.
pub struct AttachedContainer {
    container_path: PathBuf,
    physical_path: String,
    released: bool,
}

impl AttachedContainer {
    pub fn physical_path(&self) -> &str {
        &self.physical_path
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        log::debug!("container: releasing attachment for {}", self.container_path.display());
        backend::detach(&self.physical_path);
        ATTACHMENTS.lock().unwrap().remove(&self.container_path);
    }
}

impl Drop for AttachedContainer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Atomically creates a new fixed-size container of exactly `size` bytes
/// with the requested logical sector size and attaches it. Any pre-existing
/// file at `path` is deleted first; on any failure after creation the file
/// is removed again.
pub fn create_and_attach_for_write(path: &Path, size: u64, sector_size: u32) -> ChronosResult<AttachedContainer> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    log::info!("container: creating {} ({size} bytes, {sector_size}-byte sectors)", path.display());
    match backend::create_and_attach(path, size, sector_size) {
        Ok(physical_path) => {
            ATTACHMENTS.lock().unwrap().insert(path.to_path_buf(), physical_path.clone());
            Ok(AttachedContainer { container_path: path.to_path_buf(), physical_path, released: false })
        }
        Err(e) => {
            let _ = std::fs::remove_file(path);
            Err(e)
        }
    }
}

/// Attaches an existing container read-only, resolving any parent-chain
/// references (differencing disks) automatically via the host container
/// service. Parent-chain traversal is not re-implemented here — see
/// DESIGN.md.
pub fn attach_read_only(path: &Path) -> ChronosResult<AttachedContainer> {
    log::info!("container: attaching {} read-only", path.display());
    let physical_path = backend::attach_read_only(path)?;
    ATTACHMENTS.lock().unwrap().insert(path.to_path_buf(), physical_path.clone());
    Ok(AttachedContainer { container_path: path.to_path_buf(), physical_path, released: false })
}

/// Attaches `path` and assigns an available single-letter mount point,
/// searching `Z..D` descending. Returns the assigned drive letter.
pub fn mount_to_drive_letter(path: &Path, read_only: bool) -> ChronosResult<char> {
    backend::mount_to_drive_letter(path, read_only)
}

/// Releases the attachment associated with `path`, if any.
pub fn dismount(path: &Path) {
    if let Some(physical_path) = ATTACHMENTS.lock().unwrap().remove(path) {
        backend::detach(&physical_path);
    }
}

/// Releases every attachment owned by the process. Invoked on shutdown.
pub fn dismount_all() {
    let mut table = ATTACHMENTS.lock().unwrap();
    for (container_path, physical_path) in table.drain() {
        log::debug!("container: dismount_all releasing {}", container_path.display());
        backend::detach(&physical_path);
    }
}

/// Owns the preparation (lock, dismount, offline) performed on a target
/// disk's volumes before it can be opened for write. Release runs on every
/// exit path, including failure, via `Drop`.
pub struct VolumePreparation {
    disk_index: u32,
    released: bool,
}

impl VolumePreparation {
    pub fn prepare(disk_index: u32) -> ChronosResult<Self> {
        log::debug!("container: preparing disk {disk_index} for write (lock/dismount/offline)");
        backend::prepare_disk_for_write(disk_index)?;
        Ok(VolumePreparation { disk_index, released: false })
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        log::debug!("container: releasing write preparation for disk {}", self.disk_index);
        backend::release_disk_write_preparation(self.disk_index);
    }
}

impl Drop for VolumePreparation {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(windows)]
mod backend {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr;

    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{GetLogicalDrives, SetVolumeMountPointW};
    use windows_sys::Win32::Storage::Vhd::{
        AttachVirtualDisk, CreateVirtualDisk, DetachVirtualDisk, GetVirtualDiskPhysicalPath, OpenVirtualDisk,
        ATTACH_VIRTUAL_DISK_FLAG_NONE, ATTACH_VIRTUAL_DISK_PARAMETERS, ATTACH_VIRTUAL_DISK_PARAMETERS_0,
        ATTACH_VIRTUAL_DISK_PARAMETERS_0_0, ATTACH_VIRTUAL_DISK_VERSION_1, CREATE_VIRTUAL_DISK_FLAG_FULL_PHYSICAL_ALLOCATION,
        CREATE_VIRTUAL_DISK_PARAMETERS, CREATE_VIRTUAL_DISK_PARAMETERS_0, CREATE_VIRTUAL_DISK_PARAMETERS_0_1,
        CREATE_VIRTUAL_DISK_VERSION_2, DETACH_VIRTUAL_DISK_FLAG_NONE, OPEN_VIRTUAL_DISK_FLAG_NONE, OPEN_VIRTUAL_DISK_PARAMETERS,
        OPEN_VIRTUAL_DISK_PARAMETERS_0, OPEN_VIRTUAL_DISK_PARAMETERS_0_1, OPEN_VIRTUAL_DISK_VERSION_2, VIRTUAL_DISK_ACCESS_ALL,
        VIRTUAL_DISK_ACCESS_ATTACH_RO, VIRTUAL_DISK_ACCESS_ATTACH_RW, VIRTUAL_DISK_ACCESS_CREATE, VIRTUAL_STORAGE_TYPE,
        VIRTUAL_STORAGE_TYPE_DEVICE_VHDX, VIRTUAL_STORAGE_TYPE_VENDOR_MICROSOFT,
    };

    use crate::{ChronosError, ChronosResult};

    fn to_wide(path: &Path) -> Vec<u16> {
        OsStr::new(path).encode_wide().chain(std::iter::once(0)).collect()
    }

    fn last_error_result(message: &str) -> ChronosError {
        let code = unsafe { GetLastError() };
        ChronosError::DeviceIoError { offset: None, message: format!("{message}: OS error {code}") }
    }

    fn vhdx_storage_type() -> VIRTUAL_STORAGE_TYPE {
        VIRTUAL_STORAGE_TYPE { DeviceId: VIRTUAL_STORAGE_TYPE_DEVICE_VHDX, VendorId: VIRTUAL_STORAGE_TYPE_VENDOR_MICROSOFT }
    }

    /// Resolves the `\\.\PhysicalDriveN` path backing an open virtual-disk
    /// handle via `GetVirtualDiskPhysicalPath`.
    fn physical_path_of(handle: HANDLE) -> ChronosResult<String> {
        let mut size: u32 = 0;
        let mut buf = vec![0u16; 0];
        // First call with a zero-length buffer reports the required size.
        unsafe { GetVirtualDiskPhysicalPath(handle, &mut size, ptr::null_mut()) };
        if size == 0 {
            return Err(last_error_result("GetVirtualDiskPhysicalPath failed to report a buffer size"));
        }
        buf.resize(size as usize / 2, 0);
        let rc = unsafe { GetVirtualDiskPhysicalPath(handle, &mut size, buf.as_mut_ptr()) };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            return Err(last_error_result("GetVirtualDiskPhysicalPath"));
        }
        let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        Ok(String::from_utf16_lossy(&buf[..end]))
    }

    /// Creates a fixed-size VHDX of exactly `size` bytes with `sector_size`
    /// logical sectors via `CreateVirtualDisk`, then attaches it read-write
    /// via `AttachVirtualDisk` and resolves its physical device path.
    /// Type shapes follow `windows_sys::Win32::Storage::Vhd`, grounded on
    /// `other_examples/…rafawo-virtdisk-rs…virtdiskdefs.rs`.
    pub fn create_and_attach(path: &Path, size: u64, sector_size: u32) -> ChronosResult<String> {
        let wide_path = to_wide(path);
        let storage_type = vhdx_storage_type();
        let params = CREATE_VIRTUAL_DISK_PARAMETERS {
            Version: CREATE_VIRTUAL_DISK_VERSION_2,
            Anonymous: CREATE_VIRTUAL_DISK_PARAMETERS_0 {
                Version2: CREATE_VIRTUAL_DISK_PARAMETERS_0_1 {
                    UniqueId: windows_sys::core::GUID::from_u128(0),
                    MaximumSize: size,
                    BlockSizeInBytes: 0,
                    SectorSizeInBytes: sector_size,
                    PhysicalSectorSizeInBytes: sector_size,
                    ParentPath: ptr::null(),
                    SourcePath: ptr::null(),
                    OpenFlags: OPEN_VIRTUAL_DISK_FLAG_NONE,
                    ParentVirtualStorageType: VIRTUAL_STORAGE_TYPE { DeviceId: 0, VendorId: windows_sys::core::GUID::from_u128(0) },
                    SourceVirtualStorageType: VIRTUAL_STORAGE_TYPE { DeviceId: 0, VendorId: windows_sys::core::GUID::from_u128(0) },
                    ResiliencyGuid: windows_sys::core::GUID::from_u128(0),
                },
            },
        };
        let mut handle: HANDLE = INVALID_HANDLE_VALUE;
        let rc = unsafe {
            CreateVirtualDisk(
                &storage_type,
                wide_path.as_ptr(),
                VIRTUAL_DISK_ACCESS_ALL | VIRTUAL_DISK_ACCESS_CREATE,
                ptr::null_mut(),
                CREATE_VIRTUAL_DISK_FLAG_FULL_PHYSICAL_ALLOCATION,
                0,
                &params,
                ptr::null(),
                &mut handle,
            )
        };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            return Err(last_error_result("CreateVirtualDisk"));
        }

        let attach_params = ATTACH_VIRTUAL_DISK_PARAMETERS {
            Version: ATTACH_VIRTUAL_DISK_VERSION_1,
            Anonymous: ATTACH_VIRTUAL_DISK_PARAMETERS_0 { Version1: ATTACH_VIRTUAL_DISK_PARAMETERS_0_0 { Reserved: 0 } },
        };
        let rc = unsafe {
            AttachVirtualDisk(handle, ptr::null_mut(), ATTACH_VIRTUAL_DISK_FLAG_NONE, 0, &attach_params, ptr::null())
        };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            let err = last_error_result("AttachVirtualDisk");
            unsafe { CloseHandle(handle) };
            return Err(err);
        }

        let physical_path = physical_path_of(handle);
        unsafe { CloseHandle(handle) };
        physical_path
    }

    /// Attaches an existing VHDX read-only via `OpenVirtualDisk` +
    /// `AttachVirtualDisk`; parent-chain resolution is handled by the host
    /// container service as part of `OpenVirtualDisk` itself.
    pub fn attach_read_only(path: &Path) -> ChronosResult<String> {
        let wide_path = to_wide(path);
        let storage_type = vhdx_storage_type();
        let open_params = OPEN_VIRTUAL_DISK_PARAMETERS {
            Version: OPEN_VIRTUAL_DISK_VERSION_2,
            Anonymous: OPEN_VIRTUAL_DISK_PARAMETERS_0 {
                Version2: OPEN_VIRTUAL_DISK_PARAMETERS_0_1 { GetInfoOnly: 0, ReadOnly: 1, ResiliencyGuid: windows_sys::core::GUID::from_u128(0) },
            },
        };
        let mut handle: HANDLE = INVALID_HANDLE_VALUE;
        let rc = unsafe {
            OpenVirtualDisk(
                &storage_type,
                wide_path.as_ptr(),
                VIRTUAL_DISK_ACCESS_ATTACH_RO,
                OPEN_VIRTUAL_DISK_FLAG_NONE,
                &open_params,
                &mut handle,
            )
        };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            return Err(last_error_result("OpenVirtualDisk"));
        }

        let attach_params = ATTACH_VIRTUAL_DISK_PARAMETERS {
            Version: ATTACH_VIRTUAL_DISK_VERSION_1,
            Anonymous: ATTACH_VIRTUAL_DISK_PARAMETERS_0 { Version1: ATTACH_VIRTUAL_DISK_PARAMETERS_0_0 { Reserved: 0 } },
        };
        let rc = unsafe {
            AttachVirtualDisk(
                handle,
                ptr::null_mut(),
                windows_sys::Win32::Storage::Vhd::ATTACH_VIRTUAL_DISK_FLAG_READ_ONLY,
                0,
                &attach_params,
                ptr::null(),
            )
        };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            let err = last_error_result("AttachVirtualDisk");
            unsafe { CloseHandle(handle) };
            return Err(err);
        }

        let physical_path = physical_path_of(handle);
        unsafe { CloseHandle(handle) };
        physical_path
    }

    /// Attaches `path` and assigns the first free drive letter searching
    /// `Z..D` via `GetLogicalDrives` + `SetVolumeMountPointW`.
    pub fn mount_to_drive_letter(path: &Path, read_only: bool) -> ChronosResult<char> {
        let _physical_path = if read_only { attach_read_only(path)? } else { create_and_attach(path, 0, 0)? };
        let in_use = unsafe { GetLogicalDrives() };
        for letter in (b'D'..=b'Z').rev() {
            let bit = letter - b'A';
            if in_use & (1u32 << bit) != 0 {
                continue;
            }
            let mount_point = format!("{}:\\", letter as char);
            let wide_mount = to_wide(Path::new(&mount_point));
            let wide_volume = to_wide(Path::new(&_physical_path));
            let ok = unsafe { SetVolumeMountPointW(wide_mount.as_ptr(), wide_volume.as_ptr()) };
            if ok != 0 {
                return Ok(letter as char);
            }
        }
        Err(ChronosError::DeviceIoError { offset: None, message: "no drive letters available".into() })
    }

    pub fn detach(physical_path: &str) {
        let wide_path = to_wide(Path::new(physical_path));
        let storage_type = vhdx_storage_type();
        let mut handle: HANDLE = INVALID_HANDLE_VALUE;
        let rc = unsafe {
            OpenVirtualDisk(&storage_type, wide_path.as_ptr(), VIRTUAL_DISK_ACCESS_ATTACH_RW, OPEN_VIRTUAL_DISK_FLAG_NONE, ptr::null(), &mut handle)
        };
        if rc != windows_sys::Win32::Foundation::ERROR_SUCCESS {
            return;
        }
        unsafe {
            DetachVirtualDisk(handle, DETACH_VIRTUAL_DISK_FLAG_NONE, 0);
            CloseHandle(handle);
        }
    }

    pub fn prepare_disk_for_write(disk_index: u32) -> ChronosResult<()> {
        crate::enumerate::prepare_disk_volumes_for_write(disk_index).map_err(|e| {
            ChronosError::DeviceIoError { offset: None, message: format!("failed to lock/dismount/offline disk {disk_index}: {e}") }
        })
    }

    pub fn release_disk_write_preparation(disk_index: u32) {
        crate::enumerate::release_disk_volumes_write_preparation(disk_index);
    }
}

/// Portable fallback: a plain-file copy stands in for VHDX attach, and
/// "write preparation" is a no-op since there is no live OS volume to lock.
/// Used off-Windows so the workspace builds and its tests run anywhere.
#[cfg(not(windows))]
mod backend {
    use std::path::Path;

    use crate::{ChronosError, ChronosResult};

    pub fn create_and_attach(path: &Path, size: u64, _sector_size: u32) -> ChronosResult<String> {
        let file = std::fs::File::create(path)?;
        file.set_len(size)?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn attach_read_only(path: &Path) -> ChronosResult<String> {
        if !path.exists() {
            return Err(ChronosError::PathNotFound(path.to_string_lossy().into_owned()));
        }
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn mount_to_drive_letter(path: &Path, read_only: bool) -> ChronosResult<char> {
        let _ = attach_read_only(path)?;
        let _ = read_only;
        Ok('Z')
    }

    pub fn detach(_physical_path: &str) {}

    pub fn prepare_disk_for_write(_disk_index: u32) -> ChronosResult<()> {
        Ok(())
    }

    pub fn release_disk_write_preparation(_disk_index: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_drop_releases_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.vhdx");
        {
            let attached = create_and_attach_for_write(&path, 4096, 512).unwrap();
            assert_eq!(attached.physical_path(), path.to_string_lossy());
            assert!(ATTACHMENTS.lock().unwrap().contains_key(&path));
        }
        assert!(!ATTACHMENTS.lock().unwrap().contains_key(&path));
    }

    #[test]
    fn create_and_attach_removes_file_on_failure() {
        // On the portable backend, create_and_attach cannot fail once the
        // path is writable, so this test exercises the cleanup-on-error
        // contract with an unwritable destination instead.
        let path = Path::new("/definitely/not/writable/image.vhdx");
        let result = create_and_attach_for_write(path, 4096, 512);
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
