//! Read-only mapping of one named shared memory page

use crate::{Result, StintError};
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::{debug, trace};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile,
};
use windows::core::PCWSTR;

/// Physics page name
pub const PHYSICS_PAGE_NAME: &str = "Local\\acpmf_physics";
/// Graphics page name
pub const GRAPHICS_PAGE_NAME: &str = "Local\\acpmf_graphics";
/// Static page name
pub const STATIC_PAGE_NAME: &str = "Local\\acpmf_static";

/// A mapped view of one simulator page, interpreted as `P`
pub struct PageMapping<P: Copy> {
    name: &'static str,
    mapping: HANDLE,
    base: NonNull<P>,
    _page: PhantomData<P>,
}

impl<P: Copy> PageMapping<P> {
    /// Open and map the named page
    pub fn open(name: &'static str) -> Result<Self> {
        trace!(page = name, "Opening shared memory page");

        let mapping = unsafe {
            let wide_name = wide_string(name);
            OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(wide_name.as_ptr()))
                .map_err(|e| StintError::windows_api_error("OpenFileMappingW", e))?
        };

        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, size_of::<P>()) };
        let Some(base) = NonNull::new(view.Value as *mut P) else {
            let win_err = windows::core::Error::from_thread();
            unsafe {
                let _ = CloseHandle(mapping);
            }
            return Err(StintError::windows_api_error("MapViewOfFile", win_err));
        };

        debug!(page = name, bytes = size_of::<P>(), "Mapped shared memory page");
        Ok(Self { name, mapping, base, _page: PhantomData })
    }

    /// Page name this mapping was opened with
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Copy the page out of shared memory
    ///
    /// The simulator writes the page in place, so the copy is volatile and the
    /// caller gets an owned value it can convert at leisure.
    pub fn read(&self) -> P {
        unsafe { std::ptr::read_volatile(self.base.as_ptr()) }
    }
}

impl<P: Copy> Drop for PageMapping<P> {
    fn drop(&mut self) {
        unsafe {
            let addr = MEMORY_MAPPED_VIEW_ADDRESS { Value: self.base.as_ptr() as *mut _ };
            let _ = UnmapViewOfFile(addr);
            let _ = CloseHandle(self.mapping);
        }
        trace!(page = self.name, "Unmapped shared memory page");
    }
}

// SAFETY: the mapping is read-only and owned exclusively by this value; the
// handle and view pointer stay valid until Drop.
unsafe impl<P: Copy> Send for PageMapping<P> {}
unsafe impl<P: Copy> Sync for PageMapping<P> {}

/// Convert string to null-terminated wide string for Windows APIs
fn wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;
    use crate::windows::PhysicsPage;

    #[test]
    fn page_names_match_simulator() {
        assert_eq!(PHYSICS_PAGE_NAME, "Local\\acpmf_physics");
        assert_eq!(GRAPHICS_PAGE_NAME, "Local\\acpmf_graphics");
        assert_eq!(STATIC_PAGE_NAME, "Local\\acpmf_static");
    }

    #[test]
    fn wide_string_is_nul_terminated() {
        let wide = wide_string("ab");
        assert_eq!(wide, vec![b'a' as u16, b'b' as u16, 0]);
    }

    #[test]
    #[ignore = "simulator_required"]
    fn maps_live_physics_page() {
        let page = PageMapping::<PhysicsPage>::open(PHYSICS_PAGE_NAME).expect("simulator running");
        let physics = page.read();
        assert!(physics.packet_id >= 0);
    }
}
