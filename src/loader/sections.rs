//! Section Copier and Section Finalizer.
//!
//! The copier commits each section's pages and copies (or zero-fills) its
//! contents. Where the upstream loader reuses the section header's own
//! `Misc.PhysicalAddress` field as scratch storage for the committed
//! address — lossy on 64-bit hosts, and it mutates data that's supposed to
// be a read-only description of the file — this keeps a parallel
//! `Vec<usize>`, one slot per section, instead. The finalizer reads that
//! table rather than reconstructing anything from the header.

use crate::error::{Error, Result};
use crate::pe::header::Header;
use crate::pe::optional_header::OptionalHeader;
use crate::pe::section_table::{SectionCharacteristics, SectionTable};

#[cfg(windows)]
use windows_sys::Win32::System::Memory::{
    PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_NOACCESS,
    PAGE_NOCACHE, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY,
};

/// Copies the header region and every section into the already-reserved
/// `code_base` region, and patches the copied header's `ImageBase` field to
/// the real runtime address (data model invariant 5). Returns the
/// committed address of each section, in section-table order.
#[cfg(windows)]
pub fn copy(
    code_base: *mut u8,
    bytes: &[u8],
    header: &Header,
    optional_header: &OptionalHeader,
    sections: &[SectionTable],
) -> Result<Vec<usize>> {
    use scroll::Pwrite;

    let headers_size = optional_header.size_of_headers as usize;
    unsafe {
        super::alloc::commit(code_base, headers_size)?;
        let dst = std::slice::from_raw_parts_mut(code_base, headers_size);
        let n = headers_size.min(bytes.len());
        dst[..n].copy_from_slice(&bytes[..n]);

        let image_base_offset = header.dos_header.pe_pointer as usize
            + crate::pe::header::PE_MAGIC_AND_COFF_HEADER_SIZE
            + optional_header.image_base_field_offset();
        if optional_header.is_64() {
            dst.pwrite_with::<u64>(code_base as u64, image_base_offset, scroll::LE)
                .map_err(|_| Error::Malformed("image base field out of bounds".into()))?;
        } else {
            dst.pwrite_with::<u32>(code_base as usize as u32, image_base_offset, scroll::LE)
                .map_err(|_| Error::Malformed("image base field out of bounds".into()))?;
        }
    }

    let alignment = optional_header.section_alignment.max(1) as usize;
    let mut addresses = Vec::with_capacity(sections.len());
    for section in sections {
        let addr = unsafe { code_base.add(section.virtual_address as usize) };
        if section.size_of_raw_data == 0 {
            let size = round_up(section.virtual_size.max(1) as usize, alignment);
            unsafe {
                super::alloc::commit(addr, size)?;
                std::ptr::write_bytes(addr, 0, size);
            }
        } else {
            let size = section.size_of_raw_data as usize;
            let file_start = section.pointer_to_raw_data as usize;
            let file_end = file_start
                .checked_add(size)
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| Error::Malformed(format!("section {} raw data runs past end of image", section.name())))?;
            unsafe {
                super::alloc::commit(addr, size)?;
                std::ptr::copy_nonoverlapping(bytes[file_start..file_end].as_ptr(), addr, size);
            }
        }
        addresses.push(addr as usize);
    }
    Ok(addresses)
}

fn round_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

/// Derives the final page protection for a section from the 8-entry cube
/// indexed by (executable, readable, writable).
pub fn section_protection(characteristics: SectionCharacteristics) -> u32 {
    #[cfg(windows)]
    {
        let executable = characteristics.contains(SectionCharacteristics::MEM_EXECUTE);
        let readable = characteristics.contains(SectionCharacteristics::MEM_READ);
        let writable = characteristics.contains(SectionCharacteristics::MEM_WRITE);
        let mut protect = match (executable, readable, writable) {
            (false, false, false) => PAGE_NOACCESS,
            (false, true, false) => PAGE_READONLY,
            (false, false, true) => PAGE_WRITECOPY,
            (false, true, true) => PAGE_READWRITE,
            (true, false, false) => PAGE_EXECUTE,
            (true, true, false) => PAGE_EXECUTE_READ,
            (true, false, true) => PAGE_EXECUTE_WRITECOPY,
            (true, true, true) => PAGE_EXECUTE_READWRITE,
        };
        if characteristics.contains(SectionCharacteristics::MEM_NOT_CACHED) {
            protect |= PAGE_NOCACHE;
        }
        protect
    }
    #[cfg(not(windows))]
    {
        let _ = characteristics;
        0
    }
}

/// Finalizes page protections for every section, decommitting discardable
/// ones. A single section's `VirtualProtect` failure is logged and
/// tolerated (the section stays read/write) rather than failing the whole
/// load, matching the non-fatal classification of protection errors.
///
/// Protection size is `SizeOfRawData`, falling back to the whole image's
/// `SizeOfInitializedData` or `SizeOfUninitializedData` when zero — the
/// same fallback chain the original loader uses, not the section's own
/// `VirtualSize`.
#[cfg(windows)]
pub fn finalize(sections: &[SectionTable], addresses: &[usize], optional_header: &OptionalHeader) -> Result<()> {
    for (section, &addr) in sections.iter().zip(addresses) {
        let characteristics = section.characteristics();
        let size = protection_size(section, optional_header).max(1) as usize;
        if characteristics.contains(SectionCharacteristics::MEM_DISCARDABLE) {
            unsafe { super::alloc::decommit(addr as *mut u8, size) };
            continue;
        }
        let protection = section_protection(characteristics);
        if let Err(err) = unsafe { super::alloc::protect(addr as *mut u8, size, protection) } {
            log::warn!("failed to protect section {}: {err}", section.name());
        }
    }
    Ok(())
}

fn protection_size(section: &SectionTable, optional_header: &OptionalHeader) -> u32 {
    if section.size_of_raw_data != 0 {
        section.size_of_raw_data
    } else if optional_header.size_of_initialized_data != 0 {
        optional_header.size_of_initialized_data
    } else {
        optional_header.size_of_uninitialized_data
    }
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;

    #[test]
    fn protection_cube_matches_spec_table() {
        use SectionCharacteristics as C;
        assert_eq!(section_protection(C::empty()), PAGE_NOACCESS);
        assert_eq!(section_protection(C::MEM_READ), PAGE_READONLY);
        assert_eq!(section_protection(C::MEM_WRITE), PAGE_WRITECOPY);
        assert_eq!(section_protection(C::MEM_READ | C::MEM_WRITE), PAGE_READWRITE);
        assert_eq!(section_protection(C::MEM_EXECUTE), PAGE_EXECUTE);
        assert_eq!(section_protection(C::MEM_EXECUTE | C::MEM_READ), PAGE_EXECUTE_READ);
        assert_eq!(
            section_protection(C::MEM_EXECUTE | C::MEM_WRITE),
            PAGE_EXECUTE_WRITECOPY
        );
        assert_eq!(
            section_protection(C::MEM_EXECUTE | C::MEM_READ | C::MEM_WRITE),
            PAGE_EXECUTE_READWRITE
        );
    }

    #[test]
    fn not_cached_ors_into_every_entry() {
        use SectionCharacteristics as C;
        let base = section_protection(C::MEM_READ);
        let not_cached = section_protection(C::MEM_READ | C::MEM_NOT_CACHED);
        assert_eq!(not_cached, base | PAGE_NOCACHE);
    }

    #[test]
    fn round_up_aligns() {
        assert_eq!(round_up(1, 0x1000), 0x1000);
        assert_eq!(round_up(0x1000, 0x1000), 0x1000);
        assert_eq!(round_up(0x1001, 0x1000), 0x2000);
    }
}
