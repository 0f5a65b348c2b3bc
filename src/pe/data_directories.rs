//! The 16-entry data directory array at the tail of the optional header.
//! Only three of the fifteen named slots matter to the loading pipeline
//! (import, base relocation, TLS); the rest are kept and exposed for
//! completeness since they cost nothing to parse.

use crate::error;
use scroll::{Pread, Pwrite, SizeWith};

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

pub const SIZEOF_DATA_DIRECTORY: usize = 8;
const NUM_DATA_DIRECTORIES: usize = 16;

impl DataDirectory {
    pub fn parse(bytes: &[u8], offset: &mut usize) -> error::Result<Self> {
        Ok(bytes.gread_with(offset, scroll::LE)?)
    }

    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 || self.size != 0
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct DataDirectories {
    entries: [Option<DataDirectory>; NUM_DATA_DIRECTORIES],
}

macro_rules! directory_getters {
    ($($name:ident => $idx:literal;)*) => {
        $(
            #[inline]
            pub fn $name(&self) -> Option<DataDirectory> {
                self.entries[$idx]
            }
        )*
    };
}

impl DataDirectories {
    pub fn parse(bytes: &[u8], count: usize, offset: &mut usize) -> error::Result<Self> {
        if count > NUM_DATA_DIRECTORIES {
            return Err(error::Error::Malformed(format!(
                "data directory count ({count}) exceeds the maximum of {NUM_DATA_DIRECTORIES}"
            )));
        }
        let mut entries = [None; NUM_DATA_DIRECTORIES];
        for slot in entries.iter_mut().take(count) {
            let dd = DataDirectory::parse(bytes, offset)?;
            *slot = dd.is_present().then_some(dd);
        }
        Ok(DataDirectories { entries })
    }

    directory_getters! {
        get_export_table            => 0;
        get_import_table            => 1;
        get_resource_table          => 2;
        get_exception_table         => 3;
        get_certificate_table       => 4;
        get_base_relocation_table   => 5;
        get_debug_table             => 6;
        get_architecture            => 7;
        get_global_ptr              => 8;
        get_tls_table               => 9;
        get_load_config_table       => 10;
        get_bound_import_table      => 11;
        get_import_address_table    => 12;
        get_delay_import_descriptor => 13;
        get_clr_runtime_header      => 14;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_many_directories() {
        let bytes = [0u8; 8];
        let mut offset = 0;
        assert!(DataDirectories::parse(&bytes, 17, &mut offset).is_err());
    }

    #[test]
    fn zeroed_entries_parse_as_absent() {
        let bytes = [0u8; 16];
        let mut offset = 0;
        let dirs = DataDirectories::parse(&bytes, 2, &mut offset).unwrap();
        assert_eq!(dirs.get_export_table(), None);
        assert_eq!(dirs.get_import_table(), None);
        assert_eq!(offset, 16);
    }

    #[test]
    fn nonzero_entry_is_present() {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&0x1000u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&0x40u32.to_le_bytes());
        let mut offset = 0;
        let dirs = DataDirectories::parse(&bytes, 1, &mut offset).unwrap();
        assert_eq!(
            dirs.get_export_table(),
            Some(DataDirectory { virtual_address: 0x1000, size: 0x40 })
        );
    }
}
