//! Import Binder: walks the import descriptor array and fills in the
//! Import Address Table by asking the host's [`Callbacks`] for each
//! dependency and symbol in turn.

use crate::callbacks::Callbacks;
use crate::error::{Error, Result, SymbolKey};
use scroll::{Pread, Pwrite};

const ORDINAL_FLAG_32: u32 = 0x8000_0000;
const ORDINAL_FLAG_64: u64 = 0x8000_0000_0000_0000;
const DESCRIPTOR_SIZE: usize = 20;

/// Binds every import descriptor found at `rva`, writing resolved
/// addresses into each descriptor's address table (`FirstThunk`) in the
/// live `image`. Every dependency handle obtained from `callbacks.load` is
/// appended to `dependencies` immediately, so a caller that aborts the load
/// on error still tears down everything acquired so far.
pub fn bind(
    image: &mut [u8],
    rva: u32,
    is_64: bool,
    callbacks: &mut dyn Callbacks,
    dependencies: &mut Vec<usize>,
) -> Result<()> {
    let mut descriptor_offset = rva as usize;
    loop {
        let name_rva: u32 = image.pread_with(descriptor_offset + 12, scroll::LE)?;
        let original_first_thunk: u32 = image.pread_with(descriptor_offset, scroll::LE)?;
        let first_thunk: u32 = image.pread_with(descriptor_offset + 16, scroll::LE)?;
        let time_date_stamp: u32 = image.pread_with(descriptor_offset + 4, scroll::LE)?;
        let forwarder_chain: u32 = image.pread_with(descriptor_offset + 8, scroll::LE)?;
        if name_rva == 0
            && original_first_thunk == 0
            && first_thunk == 0
            && time_date_stamp == 0
            && forwarder_chain == 0
        {
            break;
        }

        let name = read_cstr(image, name_rva as usize)?;
        let handle = callbacks.load(&name).ok_or_else(|| Error::ModuleNotFound(name.clone()))?;
        dependencies.push(handle);

        let name_table_rva = if original_first_thunk != 0 { original_first_thunk } else { first_thunk };
        if let Err(err) = bind_thunks(image, name_table_rva, first_thunk, is_64, handle, callbacks) {
            // The dependency that just failed is released immediately;
            // earlier ones stay in `dependencies` for the caller's teardown.
            callbacks.free(handle);
            dependencies.pop();
            return Err(err);
        }

        descriptor_offset += DESCRIPTOR_SIZE;
    }
    Ok(())
}

fn bind_thunks(
    image: &mut [u8],
    name_table_rva: u32,
    address_table_rva: u32,
    is_64: bool,
    handle: usize,
    callbacks: &mut dyn Callbacks,
) -> Result<()> {
    let entry_size: usize = if is_64 { 8 } else { 4 };
    let mut i = 0usize;
    loop {
        let name_slot = name_table_rva as usize + i * entry_size;
        let addr_slot = address_table_rva as usize + i * entry_size;

        let (raw, is_ordinal, rva_mask) = if is_64 {
            let raw: u64 = image.pread_with(name_slot, scroll::LE)?;
            (raw, raw & ORDINAL_FLAG_64 != 0, raw & 0x7fff_ffff_ffff_ffff)
        } else {
            let raw: u32 = image.pread_with(name_slot, scroll::LE)?;
            (raw as u64, raw & ORDINAL_FLAG_32 != 0, (raw & 0x7fff_ffff) as u64)
        };
        if raw == 0 {
            break;
        }

        let key = if is_ordinal {
            SymbolKey::Ordinal((raw & 0xffff) as u16)
        } else {
            // rva_mask points at an IMAGE_IMPORT_BY_NAME: a 2-byte hint
            // followed by the NUL-terminated symbol name.
            SymbolKey::Name(read_cstr(image, rva_mask as usize + 2)?)
        };

        let address = callbacks.get_symbol(handle, &key).ok_or_else(|| Error::SymbolNotFound {
            dll: format!("handle {handle}"),
            symbol: key.clone(),
        })?;

        if is_64 {
            image.pwrite_with::<u64>(address as u64, addr_slot, scroll::LE)?;
        } else {
            image.pwrite_with::<u32>(address as u32, addr_slot, scroll::LE)?;
        }
        i += 1;
    }
    Ok(())
}

fn read_cstr(image: &[u8], offset: usize) -> Result<String> {
    let rest = image
        .get(offset..)
        .ok_or_else(|| Error::Malformed(format!("string rva {offset:#x} is outside the image")))?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Malformed(format!("unterminated string at {offset:#x}")))?;
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}
