//! The thread-local-storage directory (`IMAGE_TLS_DIRECTORY`).
//!
//! Every field here is a virtual address, not an RVA — on disk these are
//! expressed relative to the preferred image base, and the base relocator
//! (which treats a TLS directory living inside a data section the same as
//! any other embedded pointer) rewrites them in place to be valid runtime
//! addresses by the time `loader::tls` reads them. That's why the runner
//! never needs an image-base subtraction of its own.

use crate::error;

/// `IMAGE_TLS_DIRECTORY`, widened to 64 bits uniformly; on a 32-bit image
/// the upper 32 bits of every field are simply zero.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct ImageTlsDirectory {
    pub start_address_of_raw_data: u64,
    pub end_address_of_raw_data: u64,
    pub address_of_index: u64,
    pub address_of_callbacks: u64,
    pub size_of_zero_fill: u32,
    pub characteristics: u32,
}

impl ImageTlsDirectory {
    pub fn parse(bytes: &[u8], offset: usize, is_64: bool) -> error::Result<Self> {
        use scroll::Pread;
        let mut offset = offset;
        let read_width = |bytes: &[u8], offset: &mut usize| -> error::Result<u64> {
            if is_64 {
                Ok(bytes.gread_with::<u64>(offset, scroll::LE)?)
            } else {
                Ok(bytes.gread_with::<u32>(offset, scroll::LE)? as u64)
            }
        };
        let start_address_of_raw_data = read_width(bytes, &mut offset)?;
        let end_address_of_raw_data = read_width(bytes, &mut offset)?;
        let address_of_index = read_width(bytes, &mut offset)?;
        let address_of_callbacks = read_width(bytes, &mut offset)?;
        let size_of_zero_fill = bytes.gread_with::<u32>(&mut offset, scroll::LE)?;
        let characteristics = bytes.gread_with::<u32>(&mut offset, scroll::LE)?;
        Ok(ImageTlsDirectory {
            start_address_of_raw_data,
            end_address_of_raw_data,
            address_of_index,
            address_of_callbacks,
            size_of_zero_fill,
            characteristics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_32_bit_directory() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1000u32.to_le_bytes());
        bytes.extend_from_slice(&0x1010u32.to_le_bytes());
        bytes.extend_from_slice(&0x2000u32.to_le_bytes());
        bytes.extend_from_slice(&0x3000u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let dir = ImageTlsDirectory::parse(&bytes, 0, false).unwrap();
        assert_eq!(dir.start_address_of_raw_data, 0x1000);
        assert_eq!(dir.address_of_callbacks, 0x3000);
    }

    #[test]
    fn parses_64_bit_directory() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1_4000_1000u64.to_le_bytes());
        bytes.extend_from_slice(&0x1_4000_1010u64.to_le_bytes());
        bytes.extend_from_slice(&0x1_4000_2000u64.to_le_bytes());
        bytes.extend_from_slice(&0x1_4000_3000u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let dir = ImageTlsDirectory::parse(&bytes, 0, true).unwrap();
        assert_eq!(dir.address_of_callbacks, 0x1_4000_3000);
    }
}
