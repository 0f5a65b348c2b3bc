//! DOS and COFF headers: the part of the image that is read at fixed file
//! offsets, before any section or directory lookup is possible.

use crate::error;
use scroll::{Pread, Pwrite, SizeWith};

#[doc(alias("IMAGE_DOS_SIGNATURE"))]
pub const DOS_MAGIC: u16 = 0x5a4d;
/// `PE\0\0`, little endian.
pub const PE_MAGIC: u32 = 0x0000_4550;
/// Offset of `e_lfanew` within the DOS header, fixed by the format.
pub const PE_POINTER_OFFSET: usize = 0x3c;

/// Index of the import directory within [`crate::pe::data_directories::DataDirectories`].
pub const IMPORT_DIRECTORY_INDEX: usize = 1;
/// Index of the base relocation directory.
pub const BASE_RELOCATION_DIRECTORY_INDEX: usize = 5;
/// Index of the TLS directory.
pub const TLS_DIRECTORY_INDEX: usize = 9;

/// Bytes between `e_lfanew` and the start of the optional header: the
/// 4-byte `PE\0\0` signature plus the 20-byte COFF header.
pub const PE_MAGIC_AND_COFF_HEADER_SIZE: usize = 4 + 20;

/// The handful of DOS-header fields the loader actually needs: the legacy
/// MZ signature used only to sanity-check the file, and the pointer to the
/// real NT header. Every other DOS-era field (stack pointer, checksum,
/// overlay number, ...) is read and discarded during parsing.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct DosHeader {
    #[doc(alias("e_magic"))]
    pub signature: u16,
    #[doc(alias("e_lfanew"))]
    pub pe_pointer: u32,
}

impl DosHeader {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        let signature = bytes
            .pread_with::<u16>(0, scroll::LE)
            .map_err(|_| error::Error::BadFormat("buffer too short for a DOS header".into()))?;
        if signature != DOS_MAGIC {
            return Err(error::Error::BadFormat(format!(
                "DOS signature mismatch: {signature:#06x}"
            )));
        }
        let pe_pointer = bytes
            .pread_with::<u32>(PE_POINTER_OFFSET, scroll::LE)
            .map_err(|_| error::Error::BadFormat("buffer too short for e_lfanew".into()))?;
        Ok(DosHeader {
            signature,
            pe_pointer,
        })
    }
}

/// The COFF file header (`IMAGE_FILE_HEADER`), immediately following the
/// `PE\0\0` signature.
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbol_table: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// `IMAGE_FILE_DLL`
pub const CHARACTERISTIC_DLL: u16 = 0x2000;

impl CoffHeader {
    pub fn is_dll(&self) -> bool {
        self.characteristics & CHARACTERISTIC_DLL != 0
    }
}

pub const COFF_MACHINE_X86: u16 = 0x14c;
pub const COFF_MACHINE_X86_64: u16 = 0x8664;
pub const COFF_MACHINE_ARM64: u16 = 0xaa64;

pub fn machine_to_str(machine: u16) -> &'static str {
    match machine {
        COFF_MACHINE_X86 => "X86",
        COFF_MACHINE_X86_64 => "X86_64",
        COFF_MACHINE_ARM64 => "ARM64",
        _ => "UNKNOWN",
    }
}

/// DOS header, NT signature, COFF header, and the (optional, but always
/// present on a real image) optional header.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct Header {
    pub dos_header: DosHeader,
    pub signature: u32,
    pub coff_header: CoffHeader,
    pub optional_header: Option<super::optional_header::OptionalHeader>,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        let dos_header = DosHeader::parse(bytes)?;
        let mut offset = dos_header.pe_pointer as usize;
        let signature = bytes.gread_with::<u32>(&mut offset, scroll::LE).map_err(|_| {
            error::Error::BadFormat(format!("buffer too short for NT signature at {offset:#x}"))
        })?;
        if signature != PE_MAGIC {
            return Err(error::Error::BadFormat(format!(
                "NT signature mismatch: {signature:#010x}"
            )));
        }
        let coff_header = bytes.gread_with::<CoffHeader>(&mut offset, scroll::LE).map_err(|_| {
            error::Error::Malformed("buffer too short for the COFF header".into())
        })?;
        let optional_header = if coff_header.size_of_optional_header > 0 {
            Some(super::optional_header::OptionalHeader::parse(bytes, &mut offset)?)
        } else {
            None
        };
        Ok(Header {
            dos_header,
            signature,
            coff_header,
            optional_header,
        })
    }
}
