//! The section table (`IMAGE_SECTION_HEADER` array) that immediately
//! follows the optional header.

use crate::error;
use bitflags::bitflags;
use scroll::{Pread, Pwrite};

bitflags! {
    /// `Characteristics` field of a section header. Only the flags this
    /// loader actually branches on are named; the rest pass through
    /// untouched in [`SectionTable::characteristics`].
    #[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
    pub struct SectionCharacteristics: u32 {
        const CNT_CODE               = 0x0000_0020;
        const CNT_INITIALIZED_DATA   = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const MEM_DISCARDABLE        = 0x0200_0000;
        const MEM_NOT_CACHED         = 0x0400_0000;
        const MEM_EXECUTE            = 0x2000_0000;
        const MEM_READ               = 0x4000_0000;
        const MEM_WRITE              = 0x8000_0000;
    }
}

/// `IMAGE_SECTION_HEADER`. The COFF relocation/line-number fields are kept
/// only to preserve the on-disk layout for [`SectionTable::parse`]'s
/// fixed-width read; an already-linked image never has them populated and
/// the loader never consults them.
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite)]
pub struct SectionTable {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

pub const SIZEOF_SECTION_TABLE: usize = 40;

impl SectionTable {
    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        bytes
            .gread_with(offset, scroll::LE)
            .map_err(|_| error::Error::Malformed(format!("section table truncated at {offset:#x}")))
    }

    /// The section name, stripped of its NUL padding. Not necessarily valid
    /// UTF-8 on disk, but always ASCII in images this loader expects to see.
    pub fn name(&self) -> std::borrow::Cow<'_, str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end])
    }

    pub fn characteristics(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_truncate(self.characteristics)
    }

    pub fn is_discardable(&self) -> bool {
        self.characteristics().contains(SectionCharacteristics::MEM_DISCARDABLE)
    }

    /// Size to use when committing/protecting this section: raw data size,
    /// falling back to the virtual size when the section has no file
    /// backing (e.g. `.bss`).
    pub fn mapped_size(&self) -> u32 {
        if self.size_of_raw_data != 0 {
            self.size_of_raw_data
        } else {
            self.virtual_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_strips_nul_padding() {
        let mut table = SectionTable::default();
        table.name = *b".text\0\0\0";
        assert_eq!(table.name(), ".text");
    }

    #[test]
    fn name_handles_full_eight_bytes() {
        let mut table = SectionTable::default();
        table.name = *b".abcdefg";
        assert_eq!(table.name(), ".abcdefg");
    }

    #[test]
    fn characteristics_roundtrip() {
        let mut table = SectionTable::default();
        table.characteristics =
            (SectionCharacteristics::MEM_EXECUTE | SectionCharacteristics::MEM_READ).bits();
        assert!(table.characteristics().contains(SectionCharacteristics::MEM_EXECUTE));
        assert!(!table.characteristics().contains(SectionCharacteristics::MEM_WRITE));
        assert!(!table.is_discardable());
    }

    #[test]
    fn mapped_size_falls_back_to_virtual_size() {
        let mut table = SectionTable::default();
        table.virtual_size = 0x1000;
        table.size_of_raw_data = 0;
        assert_eq!(table.mapped_size(), 0x1000);
    }
}
