//! The optional header (`IMAGE_OPTIONAL_HEADER32`/`64`), unified across
//! bitness. Its `Magic` field is the single source of truth for whether the
//! rest of the image is PE32 or PE32+; everything downstream of parsing
//! (the loader, the relocator, the import binder) reads the unified struct
//! and only consults [`OptionalHeader::is_64`] where the wire width of a
//! field genuinely differs.

use crate::error;
use crate::pe::data_directories::DataDirectories;
use scroll::{Pread, Pwrite, SizeWith};

/// Standard fields magic number for a 32-bit (PE32) image.
pub const MAGIC_32: u16 = 0x10b;
/// Standard fields magic number for a 64-bit (PE32+) image.
pub const MAGIC_64: u16 = 0x20b;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct OptionalHeader32 {
    magic: u16,
    major_linker_version: u8,
    minor_linker_version: u8,
    size_of_code: u32,
    size_of_initialized_data: u32,
    size_of_uninitialized_data: u32,
    address_of_entry_point: u32,
    base_of_code: u32,
    base_of_data: u32,
    image_base: u32,
    section_alignment: u32,
    file_alignment: u32,
    major_operating_system_version: u16,
    minor_operating_system_version: u16,
    major_image_version: u16,
    minor_image_version: u16,
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    win32_version_value: u32,
    size_of_image: u32,
    size_of_headers: u32,
    check_sum: u32,
    subsystem: u16,
    dll_characteristics: u16,
    size_of_stack_reserve: u32,
    size_of_stack_commit: u32,
    size_of_heap_reserve: u32,
    size_of_heap_commit: u32,
    loader_flags: u32,
    number_of_rva_and_sizes: u32,
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct OptionalHeader64 {
    magic: u16,
    major_linker_version: u8,
    minor_linker_version: u8,
    size_of_code: u32,
    size_of_initialized_data: u32,
    size_of_uninitialized_data: u32,
    address_of_entry_point: u32,
    base_of_code: u32,
    image_base: u64,
    section_alignment: u32,
    file_alignment: u32,
    major_operating_system_version: u16,
    minor_operating_system_version: u16,
    major_image_version: u16,
    minor_image_version: u16,
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    win32_version_value: u32,
    size_of_image: u32,
    size_of_headers: u32,
    check_sum: u32,
    subsystem: u16,
    dll_characteristics: u16,
    size_of_stack_reserve: u64,
    size_of_stack_commit: u64,
    size_of_heap_reserve: u64,
    size_of_heap_commit: u64,
    loader_flags: u32,
    number_of_rva_and_sizes: u32,
}

/// Byte offset of `image_base` within a PE32 optional header. Needed by the
/// section copier to rewrite the field in place once the image's actual
/// runtime base is known (invariant: the copied header's `ImageBase` always
/// matches `code_base`).
pub const IMAGE_BASE_FIELD_OFFSET_32: usize = 28;
/// Byte offset of `image_base` within a PE32+ optional header.
pub const IMAGE_BASE_FIELD_OFFSET_64: usize = 24;

/// The optional header fields the loader needs, unified across bitness.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub data_directories: DataDirectories,
}

impl OptionalHeader {
    pub fn is_64(&self) -> bool {
        self.magic == MAGIC_64
    }

    /// Offset of the `ImageBase` field from the start of this header, for
    /// the purpose of patching the copied header in live memory.
    pub fn image_base_field_offset(&self) -> usize {
        if self.is_64() {
            IMAGE_BASE_FIELD_OFFSET_64
        } else {
            IMAGE_BASE_FIELD_OFFSET_32
        }
    }

    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        let magic = bytes
            .pread_with::<u16>(*offset, scroll::LE)
            .map_err(|_| error::Error::Malformed("buffer too short for optional header magic".into()))?;
        match magic {
            MAGIC_32 => {
                let raw = bytes.gread_with::<OptionalHeader32>(offset, scroll::LE)?;
                let data_directories =
                    DataDirectories::parse(bytes, raw.number_of_rva_and_sizes as usize, offset)?;
                Ok(OptionalHeader {
                    magic,
                    address_of_entry_point: raw.address_of_entry_point,
                    image_base: raw.image_base as u64,
                    section_alignment: raw.section_alignment,
                    file_alignment: raw.file_alignment,
                    size_of_initialized_data: raw.size_of_initialized_data,
                    size_of_uninitialized_data: raw.size_of_uninitialized_data,
                    size_of_image: raw.size_of_image,
                    size_of_headers: raw.size_of_headers,
                    data_directories,
                })
            }
            MAGIC_64 => {
                let raw = bytes.gread_with::<OptionalHeader64>(offset, scroll::LE)?;
                let data_directories =
                    DataDirectories::parse(bytes, raw.number_of_rva_and_sizes as usize, offset)?;
                Ok(OptionalHeader {
                    magic,
                    address_of_entry_point: raw.address_of_entry_point,
                    image_base: raw.image_base,
                    section_alignment: raw.section_alignment,
                    file_alignment: raw.file_alignment,
                    size_of_initialized_data: raw.size_of_initialized_data,
                    size_of_uninitialized_data: raw.size_of_uninitialized_data,
                    size_of_image: raw.size_of_image,
                    size_of_headers: raw.size_of_headers,
                    data_directories,
                })
            }
            _ => Err(error::Error::BadFormat(format!(
                "unrecognized optional header magic: {magic:#06x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizeof_headers() {
        assert_eq!(std::mem::size_of::<OptionalHeader32>(), 96);
        assert_eq!(std::mem::size_of::<OptionalHeader64>(), 112);
    }

    #[test]
    fn field_offsets_match_struct_layout() {
        // magic(2) + linker(2) + size_of_code..base_of_data (4*6=24) = 28 before image_base in PE32
        assert_eq!(IMAGE_BASE_FIELD_OFFSET_32, 28);
        // same run, minus base_of_data (4 bytes), for PE32+
        assert_eq!(IMAGE_BASE_FIELD_OFFSET_64, 24);
    }
}
