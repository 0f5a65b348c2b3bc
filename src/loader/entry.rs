//! Entry Invoker: calls the image's entry point with the caller-supplied
//! context word, the same non-standard single-argument convention the
//! upstream in-memory loader uses in place of the usual `DllMain` triple.
//!
//! The entry point is `__cdecl`, not the `WINAPI`/`stdcall` convention a
//! real `DllMain` would use, so it's invoked through an `extern "C"`
//! function pointer. On x86_64 this is a no-op distinction, but on x86
//! `stdcall` and `cdecl` clean the stack differently, and calling a
//! `cdecl` entry point as if it were `stdcall` corrupts the stack on
//! return.

use crate::error::{Error, Result};

#[cfg(windows)]
type EntryPoint = unsafe extern "C" fn(usize) -> i32;

/// Invokes the entry point at `code_base + entry_point_rva` with
/// `entry_context`, treating a zero return as failure. `entry_point_rva ==
/// 0` (a DLL with no entry point, e.g. a pure resource DLL) is not an error
/// and is treated as success without a call.
#[cfg(windows)]
pub fn invoke(code_base: *mut u8, entry_point_rva: u32, entry_context: usize) -> Result<()> {
    if entry_point_rva == 0 {
        return Ok(());
    }
    let entry: EntryPoint = unsafe { std::mem::transmute(code_base.add(entry_point_rva as usize)) };
    let ok = unsafe { entry(entry_context) };
    if ok == 0 {
        Err(Error::DllInitFailed)
    } else {
        Ok(())
    }
}

#[cfg(not(windows))]
pub fn invoke(_code_base: *mut u8, _entry_point_rva: u32, _entry_context: usize) -> Result<()> {
    Err(Error::OutOfMemory("entry invocation is only meaningful on Windows"))
}
