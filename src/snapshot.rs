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

    src/snapshot.rs

    Point-in-time, read-only snapshots of a set of live volumes (C3). If
    unavailable, the backup engine proceeds without one and may observe torn
    reads — a documented degradation, not an error (spec.md §4.3).
*/

use std::collections::HashMap;

use crate::progress::{CancelHandle, ProgressReporter};
use crate::ChronosResult;

/// A group of point-in-time, read-only snapshots created atomically.
/// Releasing drops every member together.
pub struct SnapshotSet {
    map: HashMap<String, String>,
    state: backend::SnapshotState,
    released: bool,
}

impl SnapshotSet {
    /// Returns the snapshot-prefixed path to use in place of `live_volume_path`.
    pub fn snapshot_path(&self, live_volume_path: &str) -> Option<&str> {
        self.map.get(live_volume_path).map(String::as_str)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        log::debug!("snapshot: releasing {} snapshot(s)", self.map.len());
        backend::release_all(&mut self.state);
    }
}

impl Drop for SnapshotSet {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reports whether the volume shadow copy service is available in this
/// environment.
pub fn is_available() -> bool {
    backend::is_available()
}

/// Creates a consistent, read-only, point-in-time snapshot of each volume in
/// `volumes`, as a single set: if any member fails, none are exposed.
pub fn create_snapshot_set(
    volumes: &[String],
    cancel: &CancelHandle,
    progress: &dyn ProgressReporter,
) -> ChronosResult<SnapshotSet> {
    log::info!("snapshot: creating snapshot set over {} volume(s)", volumes.len());
    cancel.check()?;
    let (map, state) = backend::create_set(volumes, progress)?;
    Ok(SnapshotSet { map, state, released: false })
}

/// Minimal hand-rolled bindings onto the Volume Shadow Copy Service COM API
/// (`vsbackup.h`/`vss.h`). `windows-sys` does not generate VSS, since its
/// interfaces aren't part of the win32metadata project, so the vtable
/// layout here is reproduced directly from the public, ABI-stable Microsoft
/// headers (unchanged since Windows Server 2003). Only the handful of
/// `IVssBackupComponents`/`IVssAsync` slots this module actually calls carry
/// a real function-pointer type; every other slot is load-bearing only for
/// layout (it must occupy the right pointer-sized offset) and is typed as an
/// opaque `*const ()`.
#[cfg(windows)]
mod backend {
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;
    use std::sync::Once;

    use windows_sys::core::{GUID, HRESULT};
    use windows_sys::Win32::Foundation::{FreeLibrary, HMODULE};
    use windows_sys::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};
    use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

    use crate::progress::ProgressReporter;
    use crate::{ChronosError, ChronosResult};

    const VSS_CTX_BACKUP: u32 = 0;
    const VSS_BT_FULL: u32 = 1;

    type Unused = *const ();

    #[repr(C)]
    struct IVssAsyncVtbl {
        query_interface: Unused,
        add_ref: Unused,
        release: unsafe extern "system" fn(this: *mut *mut IVssAsyncVtbl) -> u32,
        cancel: Unused,
        wait: unsafe extern "system" fn(this: *mut *mut IVssAsyncVtbl, timeout_ms: u32) -> HRESULT,
        query_status: unsafe extern "system" fn(this: *mut *mut IVssAsyncVtbl, status: *mut HRESULT, reserved: *mut i32) -> HRESULT,
    }

    #[repr(C)]
    struct VssSnapshotProp {
        snapshot_id: GUID,
        snapshot_set_id: GUID,
        snapshots_count: i32,
        snapshot_device_object: *mut u16,
        original_volume_name: *mut u16,
        originating_machine: *mut u16,
        service_machine: *mut u16,
        exposed_name: *mut u16,
        exposed_path: *mut u16,
        provider_id: GUID,
        snapshot_attributes: i32,
        created_at: i64,
        status: i32,
    }

    // Vtable slots up to, and including, the ones this module calls, in the
    // order `vsbackup.h` declares them on `IVssBackupComponents`. Slots after
    // `GetSnapshotProperties` (Query, IsVolumeSupported, ...) are never
    // invoked and so are omitted from the tail of the struct; the real COM
    // object's vtable is longer, but nothing here reads past this point.
    #[repr(C)]
    struct IVssBackupComponentsVtbl {
        query_interface: Unused,
        add_ref: Unused,
        release: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl) -> u32,
        get_writer_components_count: Unused,
        get_writer_components: Unused,
        initialize_for_backup: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, bstr_xml: *const u16) -> HRESULT,
        set_backup_state: Unused,
        initialize_for_restore: Unused,
        set_restore_state: Unused,
        gather_writer_metadata: Unused,
        get_writer_metadata_count: Unused,
        get_writer_metadata: Unused,
        free_writer_metadata: Unused,
        add_component: Unused,
        prepare_for_backup: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, async_out: *mut *mut *mut IVssAsyncVtbl) -> HRESULT,
        abort_backup: Unused,
        gather_writer_status: Unused,
        get_writer_status_count: Unused,
        free_writer_status: Unused,
        get_writer_status: Unused,
        set_backup_succeeded: Unused,
        set_backup_options: Unused,
        set_selected_for_restore: Unused,
        set_restore_options: Unused,
        set_additional_restores: Unused,
        set_previous_backup_stamp: Unused,
        save_as_xml: Unused,
        backup_complete: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, async_out: *mut *mut *mut IVssAsyncVtbl) -> HRESULT,
        add_alternative_location_mapping: Unused,
        add_restore_subcomponent: Unused,
        set_file_restore_status: Unused,
        add_new_target: Unused,
        set_ranges_file_path: Unused,
        pre_restore: Unused,
        post_restore: Unused,
        set_context: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, context: u32) -> HRESULT,
        start_snapshot_set: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, snapshot_set_id: *mut GUID) -> HRESULT,
        add_to_snapshot_set: unsafe extern "system" fn(
            this: *mut *mut IVssBackupComponentsVtbl,
            volume_name: *const u16,
            provider_id: GUID,
            snapshot_id: *mut GUID,
        ) -> HRESULT,
        do_snapshot_set: unsafe extern "system" fn(this: *mut *mut IVssBackupComponentsVtbl, async_out: *mut *mut *mut IVssAsyncVtbl) -> HRESULT,
        delete_snapshots: unsafe extern "system" fn(
            this: *mut *mut IVssBackupComponentsVtbl,
            snapshot_id: GUID,
            source_object_type: u32,
            force_delete: i32,
            deleted_count: *mut i32,
            non_deleted_id: *mut GUID,
        ) -> HRESULT,
        import_snapshots: Unused,
        break_snapshot_set: Unused,
        get_snapshot_properties: unsafe extern "system" fn(
            this: *mut *mut IVssBackupComponentsVtbl,
            snapshot_id: GUID,
            props: *mut VssSnapshotProp,
        ) -> HRESULT,
    }

    type CreateVssBackupComponentsFn = unsafe extern "system" fn(*mut *mut *mut IVssBackupComponentsVtbl) -> HRESULT;

    fn to_wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }

    fn from_wide_ptr(ptr: *const u16) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let mut len = 0usize;
        unsafe {
            while *ptr.add(len) != 0 {
                len += 1;
            }
            Some(String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len)))
        }
    }

    fn co_initialize() {
        static ONCE: Once = Once::new();
        ONCE.call_once(|| {
            unsafe { CoInitializeEx(ptr::null(), COINIT_MULTITHREADED) };
        });
    }

    struct VssModule(HMODULE);
    impl Drop for VssModule {
        fn drop(&mut self) {
            unsafe {
                FreeLibrary(self.0);
            }
        }
    }

    fn load_create_fn() -> ChronosResult<(VssModule, CreateVssBackupComponentsFn)> {
        let wide = to_wide("vssapi.dll");
        let module = unsafe { LoadLibraryW(wide.as_ptr()) };
        if module.is_null() {
            return Err(ChronosError::DeviceIoError { offset: None, message: "failed to load vssapi.dll".into() });
        }
        let name = std::ffi::CString::new("CreateVssBackupComponents").unwrap();
        let proc = unsafe { GetProcAddress(module, name.as_ptr() as *const u8) };
        let Some(proc) = proc else {
            unsafe { FreeLibrary(module) };
            return Err(ChronosError::DeviceIoError { offset: None, message: "vssapi.dll has no CreateVssBackupComponents export".into() });
        };
        let create_fn: CreateVssBackupComponentsFn = unsafe { std::mem::transmute(proc) };
        Ok((VssModule(module), create_fn))
    }

    fn wait_for_async(async_ptr: *mut *mut IVssAsyncVtbl) -> ChronosResult<()> {
        if async_ptr.is_null() {
            return Err(ChronosError::DeviceIoError { offset: None, message: "VSS returned a null IVssAsync".into() });
        }
        let vtbl = unsafe { &**async_ptr };
        let rc = unsafe { (vtbl.wait)(async_ptr, u32::MAX) };
        if rc < 0 {
            unsafe { (vtbl.release)(async_ptr) };
            return Err(ChronosError::DeviceIoError { offset: None, message: format!("IVssAsync::Wait failed: {rc:#010x}") });
        }
        let mut status: HRESULT = 0;
        unsafe { (vtbl.query_status)(async_ptr, &mut status, ptr::null_mut()) };
        unsafe { (vtbl.release)(async_ptr) };
        if status < 0 {
            return Err(ChronosError::DeviceIoError { offset: None, message: format!("VSS operation failed: {status:#010x}") });
        }
        Ok(())
    }

    /// The live `IVssBackupComponents` instance and resolved snapshot ids a
    /// [`super::SnapshotSet`] must carry through to release: `BackupComplete`
    /// and `DeleteSnapshots` both need the same object the set was created
    /// through.
    pub struct SnapshotState {
        components: Option<(VssModule, *mut *mut IVssBackupComponentsVtbl)>,
        snapshot_ids: Vec<GUID>,
    }

    // SAFETY: the COM object is only ever touched from the thread that
    // created it within a single backup run; SnapshotState is not shared
    // across threads concurrently.
    unsafe impl Send for SnapshotState {}

    impl Default for SnapshotState {
        fn default() -> Self {
            SnapshotState { components: None, snapshot_ids: Vec::new() }
        }
    }

    pub fn is_available() -> bool {
        load_create_fn().is_ok()
    }

    pub fn create_set(volumes: &[String], progress: &dyn ProgressReporter) -> ChronosResult<(HashMap<String, String>, SnapshotState)> {
        co_initialize();
        let (module, create_fn) = load_create_fn()?;

        let mut components: *mut *mut IVssBackupComponentsVtbl = ptr::null_mut();
        let rc = unsafe { create_fn(&mut components) };
        if rc < 0 || components.is_null() {
            return Err(ChronosError::DeviceIoError { offset: None, message: format!("CreateVssBackupComponents failed: {rc:#010x}") });
        }
        let vtbl = unsafe { &**components };

        let rc = unsafe { (vtbl.initialize_for_backup)(components, ptr::null()) };
        if rc < 0 {
            return Err(vss_error("InitializeForBackup", rc));
        }
        let rc = unsafe { (vtbl.set_context)(components, VSS_CTX_BACKUP) };
        if rc < 0 {
            return Err(vss_error("SetContext", rc));
        }

        let mut snapshot_set_id: GUID = GUID::from_u128(0);
        let rc = unsafe { (vtbl.start_snapshot_set)(components, &mut snapshot_set_id) };
        if rc < 0 {
            return Err(vss_error("StartSnapshotSet", rc));
        }

        let mut snapshot_ids = Vec::with_capacity(volumes.len());
        let mut volume_order = Vec::with_capacity(volumes.len());
        for (i, volume) in volumes.iter().enumerate() {
            progress.report(crate::progress::OperationProgress::indeterminate(&format!(
                "adding volume {} of {} to snapshot set",
                i + 1,
                volumes.len()
            )));
            let wide_volume = to_wide(volume);
            let mut snapshot_id: GUID = GUID::from_u128(0);
            let rc = unsafe { (vtbl.add_to_snapshot_set)(components, wide_volume.as_ptr(), GUID::from_u128(0), &mut snapshot_id) };
            if rc < 0 {
                return Err(vss_error(&format!("AddToSnapshotSet({volume})"), rc));
            }
            snapshot_ids.push(snapshot_id);
            volume_order.push(volume.clone());
        }

        progress.report(crate::progress::OperationProgress::indeterminate("preparing snapshot set"));
        let mut async_ptr: *mut *mut IVssAsyncVtbl = ptr::null_mut();
        let rc = unsafe { (vtbl.prepare_for_backup)(components, &mut async_ptr) };
        if rc < 0 {
            return Err(vss_error("PrepareForBackup", rc));
        }
        wait_for_async(async_ptr)?;

        progress.report(crate::progress::OperationProgress::indeterminate("creating snapshot set"));
        let mut async_ptr: *mut *mut IVssAsyncVtbl = ptr::null_mut();
        let rc = unsafe { (vtbl.do_snapshot_set)(components, &mut async_ptr) };
        if rc < 0 {
            return Err(vss_error("DoSnapshotSet", rc));
        }
        wait_for_async(async_ptr)?;

        let mut map = HashMap::new();
        for (volume, snapshot_id) in volume_order.into_iter().zip(snapshot_ids.iter().copied()) {
            let mut props: VssSnapshotProp = unsafe { std::mem::zeroed() };
            let rc = unsafe { (vtbl.get_snapshot_properties)(components, snapshot_id, &mut props) };
            if rc < 0 {
                return Err(vss_error(&format!("GetSnapshotProperties({volume})"), rc));
            }
            if let Some(device) = from_wide_ptr(props.snapshot_device_object) {
                map.insert(volume, device);
            }
        }

        let _ = VSS_BT_FULL;
        Ok((map, SnapshotState { components: Some((module, components)), snapshot_ids }))
    }

    fn vss_error(step: &str, rc: HRESULT) -> ChronosError {
        ChronosError::DeviceIoError { offset: None, message: format!("VSS {step} failed: {rc:#010x}") }
    }

    pub fn release_all(state: &mut SnapshotState) {
        let Some((_module, components)) = state.components.take() else { return };
        let vtbl = unsafe { &**components };
        let mut async_ptr: *mut *mut IVssAsyncVtbl = ptr::null_mut();
        let rc = unsafe { (vtbl.backup_complete)(components, &mut async_ptr) };
        if rc >= 0 {
            let _ = wait_for_async(async_ptr);
        }
        for &snapshot_id in &state.snapshot_ids {
            let mut deleted = 0i32;
            let mut non_deleted: GUID = GUID::from_u128(0);
            unsafe { (vtbl.delete_snapshots)(components, snapshot_id, 1, 1, &mut deleted, &mut non_deleted) };
        }
        unsafe { (vtbl.release)(components) };
    }
}

/// Portable fallback: snapshotting is reported unavailable, matching
/// spec.md §4.3's "proceed without a snapshot set" degradation path.
#[cfg(not(windows))]
mod backend {
    use std::collections::HashMap;

    use crate::progress::ProgressReporter;
    use crate::{ChronosError, ChronosResult};

    #[derive(Default)]
    pub struct SnapshotState;

    pub fn is_available() -> bool {
        false
    }

    pub fn create_set(_volumes: &[String], _progress: &dyn ProgressReporter) -> ChronosResult<(HashMap<String, String>, SnapshotState)> {
        Err(ChronosError::InvalidParameter("snapshot coordinator unavailable on this platform".into()))
    }

    pub fn release_all(_state: &mut SnapshotState) {}
}
