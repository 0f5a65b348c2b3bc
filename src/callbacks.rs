//! The host's side of dependency resolution.
//!
//! The loader never resolves a dependent library or a symbol itself — it
//! always asks its host through this trait. The upstream C source expresses
//! the same idea as three raw function pointers plus a `void*` userdata
//! threaded through all of them (there being no closures in C); a trait
//! object is the natural re-expression of that capability trio in Rust, and
//! it owns whatever context it needs directly rather than through a side
//! channel.

use crate::error::SymbolKey;

/// Resolves imported libraries and symbols on the loader's behalf.
///
/// A [`Module`](crate::Module) owns exactly one boxed `Callbacks` for its
/// whole lifetime: every dependency handle it hands back from `load` is
/// released through `free` during that same module's teardown, and never
/// reused across modules.
pub trait Callbacks {
    /// Resolve a dependent library by name (as it appears in the image's
    /// import directory, e.g. `"KERNEL32.dll"`). Returning `None` aborts the
    /// load with [`crate::Error::ModuleNotFound`].
    fn load(&mut self, name: &str) -> Option<usize>;

    /// Resolve a symbol within a library previously returned by `load`.
    /// Returning `None` aborts the load with
    /// [`crate::Error::SymbolNotFound`].
    fn get_symbol(&mut self, handle: usize, key: &SymbolKey) -> Option<usize>;

    /// Release a handle previously returned by `load`. Called exactly once
    /// per handle, in teardown.
    fn free(&mut self, handle: usize);
}

/// The default callback set: delegates to the operating system's own
/// loader, exactly as `MemoryLoadLibrary` (as opposed to
/// `MemoryLoadLibraryEx`) does upstream.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct SystemCallbacks;

#[cfg(windows)]
impl Callbacks for SystemCallbacks {
    fn load(&mut self, name: &str) -> Option<usize> {
        use std::ffi::CString;
        use windows_sys::Win32::System::LibraryLoader::LoadLibraryA;

        let cname = CString::new(name).ok()?;
        let handle = unsafe { LoadLibraryA(cname.as_ptr() as *const u8) };
        if handle.is_null() {
            None
        } else {
            Some(handle as usize)
        }
    }

    fn get_symbol(&mut self, handle: usize, key: &SymbolKey) -> Option<usize> {
        use windows_sys::Win32::Foundation::HMODULE;
        use windows_sys::Win32::System::LibraryLoader::GetProcAddress;

        let module = handle as HMODULE;
        let addr = match key {
            SymbolKey::Name(name) => {
                let cname = std::ffi::CString::new(name.as_str()).ok()?;
                unsafe { GetProcAddress(module, cname.as_ptr() as *const u8) }
            }
            SymbolKey::Ordinal(ordinal) => unsafe { GetProcAddress(module, *ordinal as *const u8) },
        };
        addr.map(|f| f as usize)
    }

    fn free(&mut self, handle: usize) {
        use windows_sys::Win32::Foundation::HMODULE;
        use windows_sys::Win32::System::LibraryLoader::FreeLibrary;

        unsafe {
            FreeLibrary(handle as HMODULE);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// An in-process stand-in for the OS loader, used by loader pipeline
    /// tests that don't want to touch real libraries.
    #[derive(Default)]
    pub(crate) struct MockCallbacks {
        pub(crate) next_handle: usize,
        pub(crate) symbols: HashMap<(usize, String), usize>,
        pub(crate) loaded: Vec<String>,
        pub(crate) freed: Vec<usize>,
        pub(crate) deny: Vec<String>,
    }

    impl Callbacks for MockCallbacks {
        fn load(&mut self, name: &str) -> Option<usize> {
            if self.deny.iter().any(|d| d == name) {
                return None;
            }
            self.next_handle += 1;
            self.loaded.push(name.to_string());
            Some(self.next_handle)
        }

        fn get_symbol(&mut self, handle: usize, key: &SymbolKey) -> Option<usize> {
            let name = match key {
                SymbolKey::Name(n) => n.clone(),
                SymbolKey::Ordinal(o) => format!("#{o}"),
            };
            self.symbols.get(&(handle, name)).copied()
        }

        fn free(&mut self, handle: usize) {
            self.freed.push(handle);
        }
    }
}
