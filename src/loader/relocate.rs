//! Base Relocator: walks the already-parsed relocation blocks and patches
//! the live image in place.

use crate::error::Result;
use crate::pe::relocation::{self, IMAGE_REL_BASED_ABSOLUTE, IMAGE_REL_BASED_DIR64, IMAGE_REL_BASED_HIGHLOW};
use scroll::{Pread, Pwrite};

/// Applies every relocation in the directory at `rva`/`size` to `image`,
/// adding `delta` (signed, machine-width) to each patched field. A no-op
/// when `delta` is zero — the image landed at its preferred base.
pub fn apply(image: &mut [u8], rva: u32, size: u32, delta: i64, is_64: bool) -> Result<()> {
    if delta == 0 {
        return Ok(());
    }
    let blocks = relocation::parse_directory(image, rva, size)?;
    for block in blocks {
        for entry in &block.entries {
            let addr = block.page_rva as usize + entry.page_offset as usize;
            match entry.kind {
                IMAGE_REL_BASED_ABSOLUTE => {}
                IMAGE_REL_BASED_HIGHLOW => {
                    let value: u32 = image.pread_with(addr, scroll::LE)?;
                    let patched = value.wrapping_add(delta as i32 as u32);
                    image.pwrite_with(patched, addr, scroll::LE)?;
                }
                IMAGE_REL_BASED_DIR64 if is_64 => {
                    let value: u64 = image.pread_with(addr, scroll::LE)?;
                    let patched = value.wrapping_add(delta as u64);
                    image.pwrite_with(patched, addr, scroll::LE)?;
                }
                other => {
                    log::trace!("ignoring unsupported relocation type {other} at rva {addr:#x}");
                }
            }
        }
    }
    Ok(())
}
