//! Virtual Region Allocator: reserves and commits the image's address
//! range, preferring its linked base and falling back to whatever the OS
//! will give us.

use crate::error::{Error, Result};

#[cfg(windows)]
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
};

/// Reserves and commits `size` bytes at `preferred_base`, falling back to
/// an OS-chosen address if the preferred range is unavailable. Initial
/// protection is always read/write; callers narrow it later, section by
/// section, once contents are in place.
#[cfg(windows)]
pub fn reserve_and_commit(preferred_base: usize, size: usize) -> Result<*mut u8> {
    let flags = MEM_RESERVE | MEM_COMMIT;
    let mut base = unsafe { VirtualAlloc(preferred_base as *const _, size, flags, PAGE_READWRITE) };
    if base.is_null() {
        base = unsafe { VirtualAlloc(std::ptr::null(), size, flags, PAGE_READWRITE) };
    }
    if base.is_null() {
        return Err(Error::OutOfMemory("image region reservation"));
    }
    Ok(base as *mut u8)
}

#[cfg(not(windows))]
pub fn reserve_and_commit(_preferred_base: usize, _size: usize) -> Result<*mut u8> {
    Err(Error::OutOfMemory("virtual memory is only mapped on Windows"))
}

/// Commits `size` bytes at `base + offset`, used for per-section
/// allocations that happen after the initial image-wide reservation. On
/// Windows this is also just `VirtualAlloc` (the range is already
/// reserved, so this call only commits).
#[cfg(windows)]
pub unsafe fn commit(addr: *mut u8, size: usize) -> Result<*mut u8> {
    let committed = unsafe { VirtualAlloc(addr as *const _, size, MEM_COMMIT, PAGE_READWRITE) };
    if committed.is_null() {
        Err(Error::OutOfMemory("section commit"))
    } else {
        Ok(committed as *mut u8)
    }
}

#[cfg(windows)]
pub unsafe fn protect(addr: *mut u8, size: usize, protection: u32) -> Result<u32> {
    let mut old = 0u32;
    let ok = unsafe {
        VirtualProtect(
            addr as *const _,
            size,
            protection as PAGE_PROTECTION_FLAGS,
            &mut old,
        )
    };
    if ok == 0 {
        Err(Error::OutOfMemory("section protect"))
    } else {
        Ok(old)
    }
}

#[cfg(windows)]
pub unsafe fn decommit(addr: *mut u8, size: usize) {
    unsafe {
        VirtualFree(addr as *mut _, size, MEM_DECOMMIT);
    }
}

#[cfg(windows)]
pub unsafe fn free(base: *mut u8, _size: usize) {
    unsafe {
        VirtualFree(base as *mut _, 0, MEM_RELEASE);
    }
}

#[cfg(not(windows))]
pub unsafe fn free(_base: *mut u8, _size: usize) {}
