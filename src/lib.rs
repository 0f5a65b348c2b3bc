//! An in-memory PE/DLL loader.
//!
//! Loads a Windows module from a `&[u8]` already sitting in memory —
//! decrypted, downloaded, decompressed, whatever got it there — without
//! ever touching the filesystem or the OS's own module loader for the image
//! itself. Dependency and symbol resolution are still delegated to a
//! [`Callbacks`] implementation, which defaults to the real OS loader via
//! [`SystemCallbacks`].
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn run() -> memdll::Result<()> {
//! let bytes = std::fs::read("payload.dll").unwrap();
//! let module = memdll::memory_load_library(&bytes)?;
//! assert!(module.initialized());
//! module.free();
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod error;
#[cfg(windows)]
pub mod loader;
pub mod module;
pub mod pe;

pub use callbacks::Callbacks;
#[cfg(windows)]
pub use callbacks::SystemCallbacks;
pub use error::{Error, Result, SymbolKey};
pub use module::{LoadState, Module};

/// Loads `bytes` using the host operating system's own loader to resolve
/// dependencies, exactly as a conventionally `LoadLibrary`'d DLL would. The
/// entry point is invoked with an `entry_context` of `0`.
#[cfg(windows)]
pub fn memory_load_library(bytes: &[u8]) -> Result<Module> {
    memory_load_library_ex(bytes, Box::new(SystemCallbacks), 0)
}

/// Loads `bytes`, delegating dependency and symbol resolution to
/// `callbacks` instead of the OS loader, and passing `entry_context` through
/// to the image's entry point untouched.
#[cfg(windows)]
pub fn memory_load_library_ex(bytes: &[u8], callbacks: Box<dyn Callbacks>, entry_context: usize) -> Result<Module> {
    loader::load_library_ex(bytes, callbacks, entry_context)
}

/// Releases a previously loaded module. Accepts `None` as a no-op, matching
/// `MemoryFreeLibrary(NULL)`.
pub fn memory_free_library(module: Option<Module>) {
    if let Some(module) = module {
        module.free();
    }
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;
    use crate::callbacks::tests::MockCallbacks;
    use crate::pe::tests::build_minimal_pe;

    #[test]
    fn loads_and_runs_a_minimal_dll_with_no_directories() {
        let _ = env_logger::builder().is_test(true).try_init();
        let bytes = build_minimal_pe(cfg!(target_pointer_width = "64"));
        let callbacks = Box::new(MockCallbacks::default());
        let module = memory_load_library_ex(&bytes, callbacks, 0).unwrap();
        assert_eq!(module.state(), LoadState::EntryInvoked);
        memory_free_library(Some(module));
    }

    #[test]
    fn free_library_accepts_none() {
        memory_free_library(None);
    }
}
