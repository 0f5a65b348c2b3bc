//! Static parsing of a PE image: headers, section table, data directories.
//!
//! This half of the crate never touches live memory — it only reads a
//! `&[u8]` that the caller hands in from disk, a mapped file, or wherever.
//! The loader (`crate::loader`) consumes [`Image`] to plan the mapping,
//! then switches to walking the *copied*, already-relocated image directly
//! via raw pointers for everything downstream of section copying.

pub mod data_directories;
pub mod header;
pub mod optional_header;
pub mod relocation;
pub mod section_table;
pub mod tls;

use crate::error;
use log::debug;

/// A parsed-but-not-yet-loaded PE image: header, sections, and a borrow of
/// the original bytes for subsequent raw-data copies.
#[derive(Debug)]
pub struct Image<'a> {
    pub header: header::Header,
    pub sections: Vec<section_table::SectionTable>,
    pub bytes: &'a [u8],
}

impl<'a> Image<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        let header = header::Header::parse(bytes)?;
        debug!("{:#?}", header);

        let optional_header = header.optional_header.ok_or_else(|| {
            error::Error::BadFormat("image has no optional header".into())
        })?;

        let section_table_offset = header.dos_header.pe_pointer as usize
            + header::PE_MAGIC_AND_COFF_HEADER_SIZE
            + header.coff_header.size_of_optional_header as usize;
        let mut offset = section_table_offset;
        let nsections = header.coff_header.number_of_sections as usize;
        if nsections as u64 * section_table::SIZEOF_SECTION_TABLE as u64 > bytes.len() as u64 {
            return Err(error::Error::Malformed(format!(
                "section count ({nsections}) implies a table larger than the image"
            )));
        }
        let mut sections = Vec::with_capacity(nsections);
        for i in 0..nsections {
            let section = section_table::SectionTable::parse(bytes, &mut offset)?;
            debug!("section[{}] = {} @ rva {:#x}", i, section.name(), section.virtual_address);
            sections.push(section);
        }

        if (optional_header.size_of_image as usize) < optional_header.size_of_headers as usize {
            return Err(error::Error::Malformed(
                "size_of_image is smaller than size_of_headers".into(),
            ));
        }

        let _ = &optional_header;
        Ok(Image { header, sections, bytes })
    }

    pub fn optional_header(&self) -> error::Result<&optional_header::OptionalHeader> {
        self.header
            .optional_header
            .as_ref()
            .ok_or_else(|| error::Error::BadFormat("image has no optional header".into()))
    }

    pub fn is_64(&self) -> error::Result<bool> {
        Ok(self.optional_header()?.is_64())
    }
}

/// Byte-array PE fixtures shared by every parsing and loader test in this
/// crate. Built by hand rather than pulled from `include_bytes!`, since a
/// reflectively-loaded DLL doesn't need a real compiler-produced binary to
/// exercise the format logic.
#[cfg(test)]
pub(crate) mod tests {
    use crate::pe::data_directories::DataDirectory;
    use crate::pe::header::{CoffHeader, CHARACTERISTIC_DLL, COFF_MACHINE_X86, COFF_MACHINE_X86_64, DOS_MAGIC, PE_MAGIC};
    use crate::pe::optional_header::{MAGIC_32, MAGIC_64};
    use crate::pe::section_table::{SectionCharacteristics, SectionTable};
    use scroll::{Pwrite, LE};

    /// Builds a minimal, syntactically valid one-section DLL image: DOS
    /// stub, COFF header, optional header with 16 (mostly empty) data
    /// directories, one `.text` section header, and that section's raw
    /// bytes. `is_64` selects PE32 vs PE32+.
    pub(crate) fn build_minimal_pe(is_64: bool) -> Vec<u8> {
        const PE_POINTER: u32 = 0x80;
        const SECTION_ALIGNMENT: u32 = 0x1000;
        const FILE_ALIGNMENT: u32 = 0x200;
        const HEADERS_SIZE: u32 = 0x200;
        const SECTION_RAW_SIZE: u32 = 0x200;
        const SECTION_VIRTUAL_SIZE: u32 = 0x10;

        let mut bytes = vec![0u8; (HEADERS_SIZE + SECTION_RAW_SIZE) as usize];

        bytes.pwrite_with::<u16>(DOS_MAGIC, 0, LE).unwrap();
        bytes.pwrite_with::<u32>(PE_POINTER, 0x3c, LE).unwrap();

        let mut offset = PE_POINTER as usize;
        bytes.pwrite_with::<u32>(PE_MAGIC, offset, LE).unwrap();
        offset += 4;

        let optional_header_size: u16 = if is_64 { 112 } else { 96 };
        let data_directories_size: u16 = 16 * 8;
        let coff = CoffHeader {
            machine: if is_64 { COFF_MACHINE_X86_64 } else { COFF_MACHINE_X86 },
            number_of_sections: 1,
            time_date_stamp: 0,
            pointer_to_symbol_table: 0,
            number_of_symbol_table: 0,
            size_of_optional_header: optional_header_size + data_directories_size,
            characteristics: CHARACTERISTIC_DLL,
        };
        bytes.pwrite_with(coff, offset, LE).unwrap();
        offset += std::mem::size_of::<CoffHeader>();

        let optional_header_start = offset;
        bytes
            .pwrite_with::<u16>(if is_64 { MAGIC_64 } else { MAGIC_32 }, offset, LE)
            .unwrap();
        offset += 2;
        offset += 2; // linker versions
        offset += 4 * 3; // size_of_code / initialized / uninitialized
        bytes.pwrite_with::<u32>(0, offset, LE).unwrap(); // address_of_entry_point: none, so entry invocation is a no-op in tests
        offset += 4;
        offset += 4; // base_of_code
        if !is_64 {
            offset += 4; // base_of_data (PE32 only)
        }
        let image_base: u64 = if is_64 { 0x1_8000_0000 } else { 0x1000_0000 };
        if is_64 {
            bytes.pwrite_with::<u64>(image_base, offset, LE).unwrap();
            offset += 8;
        } else {
            bytes.pwrite_with::<u32>(image_base as u32, offset, LE).unwrap();
            offset += 4;
        }
        bytes.pwrite_with::<u32>(SECTION_ALIGNMENT, offset, LE).unwrap();
        offset += 4;
        bytes.pwrite_with::<u32>(FILE_ALIGNMENT, offset, LE).unwrap();
        offset += 4;
        offset += 2 * 6; // os/image/subsystem versions
        offset += 4; // win32_version_value
        let size_of_image = SECTION_ALIGNMENT + SECTION_ALIGNMENT; // headers page + one section page
        bytes.pwrite_with::<u32>(size_of_image, offset, LE).unwrap();
        offset += 4;
        bytes.pwrite_with::<u32>(HEADERS_SIZE, offset, LE).unwrap();
        offset += 4;
        offset += 4; // checksum
        offset += 2 + 2; // subsystem, dll_characteristics
        let stack_heap_width = if is_64 { 8 } else { 4 };
        offset += stack_heap_width * 4; // stack/heap reserve+commit
        offset += 4; // loader_flags
        bytes.pwrite_with::<u32>(16u32, offset, LE).unwrap(); // number_of_rva_and_sizes
        offset += 4;

        debug_assert_eq!(offset - optional_header_start, optional_header_size as usize);

        // 16 data directories, all empty.
        for _ in 0..16 {
            bytes
                .pwrite_with(DataDirectory { virtual_address: 0, size: 0 }, offset, LE)
                .unwrap();
            offset += 8;
        }

        let mut name = [0u8; 8];
        name[..5].copy_from_slice(b".text");
        let section = SectionTable {
            name,
            virtual_size: SECTION_VIRTUAL_SIZE,
            virtual_address: SECTION_ALIGNMENT,
            size_of_raw_data: SECTION_RAW_SIZE,
            pointer_to_raw_data: HEADERS_SIZE,
            pointer_to_relocations: 0,
            pointer_to_linenumbers: 0,
            number_of_relocations: 0,
            number_of_linenumbers: 0,
            characteristics: (SectionCharacteristics::CNT_CODE
                | SectionCharacteristics::MEM_EXECUTE
                | SectionCharacteristics::MEM_READ)
                .bits(),
        };
        bytes.pwrite_with(section, offset, LE).unwrap();

        bytes
    }
}
