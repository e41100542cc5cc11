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

    src/allocation.rs

    For a volume path and logical size, yields the sorted list of non-empty
    allocated byte ranges the filesystem currently reports (C4). Grounded
    on `ticpu-bcachefs-tools`'s use of a `fiemap`-style allocation query as
    the nearest pack analogue; the Windows backend uses
    FSCTL_QUERY_ALLOCATED_RANGES.
*/

/// A non-empty, non-overlapping byte range within a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedRange {
    pub offset: u64,
    pub length: u64,
}

/// Queries the allocated ranges of `volume_path`, a volume of logical size
/// `volume_size` bytes.
///
/// - `Some(list)`: ranges are sorted by offset, disjoint, and fully
///   contained in `[0, volume_size)`.
/// - `Some(empty)`: the volume is fully unallocated.
/// - `None`: the filesystem does not support the query, or the query
///   failed; callers should treat this as "copy the whole partition".
pub fn allocated_ranges(volume_path: &str, volume_size: u64) -> Option<Vec<AllocatedRange>> {
    let ranges = backend::query(volume_path, volume_size)?;
    debug_assert!(is_sorted_and_disjoint(&ranges));
    Some(ranges)
}

/// The sanity rule consumed by the planner (spec.md §4.4): a provider
/// result whose total exceeds `volume_size` must be treated as unusable.
pub fn is_usable(ranges: &[AllocatedRange], volume_size: u64) -> bool {
    ranges.iter().map(|r| r.length).sum::<u64>() <= volume_size
}

fn is_sorted_and_disjoint(ranges: &[AllocatedRange]) -> bool {
    ranges.windows(2).all(|w| w[0].offset + w[0].length <= w[1].offset)
}

#[cfg(windows)]
mod backend {
    use super::AllocatedRange;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;

    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_MORE_DATA, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::Storage::FileSystem::{CreateFileW, FILE_GENERIC_READ, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING};
    use windows_sys::Win32::System::IO::DeviceIoControl;

    // CTL_CODE(FILE_DEVICE_FILE_SYSTEM=0x9, 0, METHOD_NEITHER=3, FILE_ANY_ACCESS=0)
    const FSCTL_QUERY_ALLOCATED_RANGES: u32 = 0x000940CF;

    #[repr(C)]
    #[derive(Copy, Clone)]
    struct FileAllocatedRangeBuffer {
        file_offset: i64,
        length: i64,
    }

    /// Issues `FSCTL_QUERY_ALLOCATED_RANGES` over `[0, volume_size)`, growing
    /// the output buffer and re-querying while the ioctl reports
    /// `ERROR_MORE_DATA`, and maps each returned range into an
    /// [`AllocatedRange`].
    pub fn query(volume_path: &str, volume_size: u64) -> Option<Vec<AllocatedRange>> {
        let wide: Vec<u16> = OsStr::new(volume_path).encode_wide().chain(std::iter::once(0)).collect();
        let handle: HANDLE = unsafe {
            CreateFileW(wide.as_ptr(), FILE_GENERIC_READ, FILE_SHARE_READ | FILE_SHARE_WRITE, ptr::null(), OPEN_EXISTING, 0, 0)
        };
        if handle == INVALID_HANDLE_VALUE {
            return None;
        }
        let input = FileAllocatedRangeBuffer { file_offset: 0, length: volume_size as i64 };
        let mut capacity: usize = 64;
        let result = loop {
            let mut output: Vec<FileAllocatedRangeBuffer> = vec![FileAllocatedRangeBuffer { file_offset: 0, length: 0 }; capacity];
            let mut bytes_returned: u32 = 0;
            let ok = unsafe {
                DeviceIoControl(
                    handle,
                    FSCTL_QUERY_ALLOCATED_RANGES,
                    &input as *const _ as *const _,
                    std::mem::size_of::<FileAllocatedRangeBuffer>() as u32,
                    output.as_mut_ptr() as *mut _,
                    (capacity * std::mem::size_of::<FileAllocatedRangeBuffer>()) as u32,
                    &mut bytes_returned,
                    ptr::null_mut(),
                )
            };
            if ok != 0 {
                let count = bytes_returned as usize / std::mem::size_of::<FileAllocatedRangeBuffer>();
                break Some(
                    output[..count]
                        .iter()
                        .map(|r| AllocatedRange { offset: r.file_offset as u64, length: r.length as u64 })
                        .collect(),
                );
            }
            let err = unsafe { windows_sys::Win32::Foundation::GetLastError() };
            if err == ERROR_MORE_DATA && capacity < 1 << 20 {
                capacity *= 2;
                continue;
            }
            break None;
        };
        unsafe {
            CloseHandle(handle);
        }
        result
    }
}

/// Portable fallback: reports the query as unsupported (`None`), which
/// callers already treat as "copy the whole partition" per spec.md §4.4.
#[cfg(not(windows))]
mod backend {
    use super::AllocatedRange;

    pub fn query(_volume_path: &str, _volume_size: u64) -> Option<Vec<AllocatedRange>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_usable_rejects_overlong_total() {
        let ranges = vec![AllocatedRange { offset: 0, length: 600 }, AllocatedRange { offset: 600, length: 600 }];
        assert!(!is_usable(&ranges, 1000));
        assert!(is_usable(&ranges, 1200));
    }

    #[test]
    fn sorted_disjoint_check_catches_overlap() {
        let ranges = vec![AllocatedRange { offset: 0, length: 10 }, AllocatedRange { offset: 5, length: 10 }];
        assert!(!is_sorted_and_disjoint(&ranges));
    }

    #[test]
    fn unsupported_platform_reports_none() {
        assert_eq!(allocated_ranges(r"\\.\C:", 1024), None);
    }
}
