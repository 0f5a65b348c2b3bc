//! TLS Runner: invokes the image's thread-local-storage initialization
//! callbacks with `DLL_PROCESS_ATTACH`, mirroring what the OS loader itself
//! would do for a conventionally-loaded DLL.
//!
//! Gated behind the `tls-callbacks` feature — running arbitrary TLS callback
//! code pulled out of section data is a meaningfully different trust
//! decision than relocating and binding imports, so it isn't on by default.

#![cfg(feature = "tls-callbacks")]

use crate::error::Result;
use crate::pe::tls::ImageTlsDirectory;

#[cfg(windows)]
const DLL_PROCESS_ATTACH: u32 = 1;

/// Runs every callback in the TLS directory found at `rva` against
/// `code_base`. The callback pointer array is itself part of the mapped
/// image and is null-terminated.
#[cfg(windows)]
pub fn run(image: &[u8], rva: u32, is_64: bool, code_base: *mut u8) -> Result<()> {
    let dir = ImageTlsDirectory::parse(image, rva as usize, is_64)?;
    if dir.address_of_callbacks == 0 {
        return Ok(());
    }

    type TlsCallback = unsafe extern "system" fn(*mut std::ffi::c_void, u32, *mut std::ffi::c_void);

    let mut ptr = dir.address_of_callbacks as *const usize;
    loop {
        let callback = unsafe { ptr.read() };
        if callback == 0 {
            break;
        }
        log::trace!("invoking TLS callback {callback:#x}");
        let callback: TlsCallback = unsafe { std::mem::transmute(callback) };
        unsafe { callback(code_base as *mut std::ffi::c_void, DLL_PROCESS_ATTACH, std::ptr::null_mut()) };
        ptr = unsafe { ptr.add(1) };
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn run(_image: &[u8], _rva: u32, _is_64: bool, _code_base: *mut u8) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_callback_list_is_a_noop() {
        let mut image = vec![0u8; 64];
        // start/end/index VAs, then a zero callbacks pointer, then zero-fill/characteristics.
        image[12..16].copy_from_slice(&0u32.to_le_bytes());
        assert!(run(&image, 0, false, std::ptr::null_mut()).is_ok());
    }
}
