// SPDX-License-Identifier: GPL-3.0-only

use log::debug;

use crate::codec::{self, take, Field};
use crate::error::{Error, Result};
use crate::guid::{guid_from_wire_bytes, GUID_SIZE};
use crate::NVRAM_GUID;

pub const FVH_SIGNATURE: &[u8; 4] = b"_FVH";

/// Firmware volumes are aligned to this many bytes within the flash image.
pub const FV_SCAN_STRIDE: usize = 128;

// EFI_FIRMWARE_VOLUME_HEADER, without the block map
const FVH_FORMAT: [Field; 10] = [
    Field::Bytes(16),        // ZeroVector
    Field::Bytes(GUID_SIZE), // FileSystemGuid
    Field::U64,              // FvLength
    Field::Bytes(4),         // Signature
    Field::U32,              // Attributes
    Field::U16,              // HeaderLength
    Field::U16,              // Checksum
    Field::U16,              // ExtHeaderOffset
    Field::U8,               // Reserved
    Field::U8,               // Revision
];

pub const FVH_SIZE: usize = codec::format_size(&FVH_FORMAT);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FirmwareVolumeHeader {
    pub zero_vector: [u8; 16],
    pub guid: [u8; GUID_SIZE],
    pub volume_length: u64,
    pub signature: [u8; 4],
    pub attributes: u32,
    pub header_length: u16,
    pub checksum: u16,
    pub ext_header_offset: u16,
    pub reserved: u8,
    pub revision: u8,
}

impl FirmwareVolumeHeader {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut values = codec::decode(&FVH_FORMAT, data)?.into_iter();
        Ok(Self {
            zero_vector: take(&mut values)?,
            guid: take(&mut values)?,
            volume_length: take(&mut values)?,
            signature: take(&mut values)?,
            attributes: take(&mut values)?,
            header_length: take(&mut values)?,
            checksum: take(&mut values)?,
            ext_header_offset: take(&mut values)?,
            reserved: take(&mut values)?,
            revision: take(&mut values)?,
        })
    }

    pub fn is_nvram(&self) -> bool {
        self.signature == *FVH_SIGNATURE && guid_from_wire_bytes(&self.guid) == NVRAM_GUID
    }
}

/// The NVRAM firmware volume, borrowed from the flash image.
#[derive(Clone, Debug)]
pub struct FirmwareVolume<'a> {
    pub header: FirmwareVolumeHeader,
    /// Offset of the volume within the flash image.
    pub offset: usize,
    /// The volume's bytes, `header.volume_length` long.
    pub data: &'a [u8],
}

/// Find the NVRAM firmware volume in a flash image.
pub fn locate(image: &[u8]) -> Result<FirmwareVolume<'_>> {
    let mut offset = 0;
    while offset < image.len() {
        let header = FirmwareVolumeHeader::decode(&image[offset..])?;
        if header.is_nvram() {
            debug!(
                "NVRAM volume at {:#x}, length {:#x}, header length {:#x}",
                offset, header.volume_length, header.header_length
            );

            let data = usize::try_from(header.volume_length)
                .ok()
                .and_then(|len| offset.checked_add(len))
                .and_then(|end| image.get(offset..end))
                .ok_or(Error::VolumeOutOfBounds {
                    offset,
                    length: header.volume_length,
                    image_len: image.len(),
                })?;

            return Ok(FirmwareVolume {
                header,
                offset,
                data,
            });
        }
        offset += FV_SCAN_STRIDE;
    }

    Err(Error::NotFound)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a volume header with the NVRAM GUID and the given lengths.
    pub(crate) fn nvram_header(volume_length: u64, header_length: u16) -> Vec<u8> {
        let mut raw = vec![0; 16];
        raw.extend_from_slice(&crate::guid::guid_to_wire_bytes(NVRAM_GUID).unwrap());
        raw.extend_from_slice(&volume_length.to_le_bytes());
        raw.extend_from_slice(FVH_SIGNATURE);
        raw.extend_from_slice(&0x0004_FEFFu32.to_le_bytes());
        raw.extend_from_slice(&header_length.to_le_bytes());
        // Checksum, ExtHeaderOffset, Reserved, Revision
        raw.extend_from_slice(&[0, 0, 0, 0, 0, 2]);
        raw
    }

    #[test]
    fn test_decode_header() {
        let header = FirmwareVolumeHeader::decode(&nvram_header(0x2000, 0x48)).unwrap();
        assert_eq!(header.volume_length, 0x2000);
        assert_eq!(header.header_length, 0x48);
        assert_eq!(header.attributes, 0x0004_FEFF);
        assert_eq!(header.revision, 2);
        assert!(header.is_nvram());
    }

    #[test]
    fn test_locate_strided() {
        let mut image = vec![0xFF; 0x1000];
        let raw = nvram_header(0x400, 0x48);
        image[0x300..0x300 + raw.len()].copy_from_slice(&raw);

        let fv = locate(&image).unwrap();
        assert_eq!(fv.offset, 0x300);
        assert_eq!(fv.data.len(), 0x400);
        assert_eq!(fv.header.header_length, 0x48);
    }

    #[test]
    fn test_locate_skips_unaligned() {
        let mut image = vec![0; 0x1000];
        let raw = nvram_header(0x400, 0x48);
        image[0x310..0x310 + raw.len()].copy_from_slice(&raw);

        assert!(matches!(locate(&image), Err(Error::NotFound)));
    }

    #[test]
    fn test_locate_wrong_guid() {
        let mut image = vec![0; 0x1000];
        let mut raw = nvram_header(0x400, 0x48);
        raw[16] ^= 1;
        image[..raw.len()].copy_from_slice(&raw);

        assert!(matches!(locate(&image), Err(Error::NotFound)));
    }

    #[test]
    fn test_locate_no_signature() {
        let image = vec![0xFF; 0x4000];
        assert!(matches!(locate(&image), Err(Error::NotFound)));
    }

    #[test]
    fn test_locate_short_tail() {
        // The last stride has fewer bytes than a volume header
        let image = vec![0; 0x100 + 8];
        assert!(matches!(locate(&image), Err(Error::Length { .. })));
    }

    #[test]
    fn test_locate_volume_past_end() {
        let mut image = vec![0; 0x1000];
        let raw = nvram_header(0x2000, 0x48);
        image[..raw.len()].copy_from_slice(&raw);

        assert!(matches!(
            locate(&image),
            Err(Error::VolumeOutOfBounds { offset: 0, length: 0x2000, .. })
        ));
    }
}
