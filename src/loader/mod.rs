//! The live-memory half of the crate: reserving a region, copying sections
//! into it, and bringing the mapped image up before handing control to its
//! entry point. Everything here operates on `Windows` directly through
//! `windows-sys`; the format-parsing half (`crate::pe`) stays portable so it
//! can be exercised on any host.

pub mod alloc;
pub mod entry;
pub mod imports;
pub mod relocate;
pub mod sections;
#[cfg(feature = "tls-callbacks")]
pub mod tls;

use crate::callbacks::Callbacks;
use crate::error::{Error, Result};
use crate::module::{LoadState, Module};
use crate::pe::Image;
use log::{debug, info};

/// Runs the full pipeline over `bytes`, handing dependency and symbol
/// resolution to `callbacks`. On any failure the partially-built module is
/// torn down before the error is returned — callers never observe a
/// half-loaded [`Module`].
#[cfg(windows)]
pub fn load_library_ex(bytes: &[u8], callbacks: Box<dyn Callbacks>, entry_context: usize) -> Result<Module> {
    let image = Image::parse(bytes)?;
    let optional_header = image.optional_header()?;
    let is_64 = optional_header.is_64();

    if is_64 != (std::mem::size_of::<usize>() == 8) {
        return Err(Error::BadFormat(
            "image bitness does not match the host process".into(),
        ));
    }

    let preferred_base = optional_header.image_base as usize;
    let size_of_image = optional_header.size_of_image as usize;
    let code_base = alloc::reserve_and_commit(preferred_base, size_of_image)?;
    info!("reserved {size_of_image:#x} bytes at {code_base:p} (preferred {preferred_base:#x})");

    let mut module = Module::new(code_base, size_of_image, callbacks);

    match run_pipeline(&mut module, bytes, &image, code_base, is_64, entry_context) {
        Ok(()) => Ok(module),
        Err(err) => {
            module.free();
            Err(err)
        }
    }
}

fn run_pipeline(
    module: &mut Module,
    bytes: &[u8],
    image: &Image<'_>,
    code_base: *mut u8,
    is_64: bool,
    entry_context: usize,
) -> Result<()> {
    let optional_header = image.optional_header()?;

    let addresses = sections::copy(code_base, bytes, &image.header, optional_header, &image.sections)?;
    module.state = LoadState::SectionsCopied;
    debug!("copied {} sections", addresses.len());

    let live = unsafe { std::slice::from_raw_parts_mut(code_base, optional_header.size_of_image as usize) };

    // A relocation-stripped image that lands away from its preferred base
    // simply runs with its absolute addresses unpatched, same as upstream —
    // there is no relocation directory to walk, so there is nothing to do.
    let delta = code_base as i64 - optional_header.image_base as i64;
    if let Some(reloc_dir) = optional_header.data_directories.get_base_relocation_table() {
        relocate::apply(live, reloc_dir.virtual_address, reloc_dir.size, delta, is_64)?;
    }
    module.state = LoadState::Relocated;

    if let Some(import_dir) = optional_header.data_directories.get_import_table() {
        imports::bind(live, import_dir.virtual_address, is_64, module.callbacks.as_mut(), &mut module.dependencies)?;
    }
    module.state = LoadState::ImportsBound;

    sections::finalize(&image.sections, &addresses, optional_header)?;
    module.state = LoadState::Finalized;

    run_tls(live, optional_header, code_base)?;

    entry::invoke(code_base, optional_header.address_of_entry_point, entry_context)?;
    module.state = LoadState::EntryInvoked;
    module.initialized = true;
    Ok(())
}

#[cfg(feature = "tls-callbacks")]
fn run_tls(live: &[u8], optional_header: &crate::pe::optional_header::OptionalHeader, code_base: *mut u8) -> Result<()> {
    if let Some(tls_dir) = optional_header.data_directories.get_tls_table() {
        tls::run(live, tls_dir.virtual_address, optional_header.is_64(), code_base)?;
    }
    Ok(())
}

#[cfg(not(feature = "tls-callbacks"))]
fn run_tls(_live: &[u8], _optional_header: &crate::pe::optional_header::OptionalHeader, _code_base: *mut u8) -> Result<()> {
    Ok(())
}

#[cfg(not(windows))]
pub fn load_library_ex(_bytes: &[u8], _callbacks: Box<dyn Callbacks>, _entry_context: usize) -> Result<Module> {
    Err(Error::OutOfMemory("in-memory PE loading is only supported on Windows"))
}
