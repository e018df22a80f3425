// SPDX-License-Identifier: GPL-3.0-only

//! Enroll time-based authenticated variables into the NVRAM variable store
//! of an OVMF flash image.
//!
//! The image is never modified in place: [`enroll`] returns a new image of the
//! same length in which only the store's record region differs.

use log::info;

pub mod codec;
pub mod error;
pub mod guid;
pub mod store;
pub mod time;
pub mod variable;
pub mod volume;

pub use error::{Error, Result};
pub use store::VariableStore;
pub use variable::TimeBasedAuthVariable;
pub use volume::FirmwareVolume;

/// EFI_SYSTEM_NV_DATA_FV_GUID
pub const NVRAM_GUID: &str = "fff12b8d-7696-4c8b-a985-2747075b4f50";

pub const EFI_VARIABLE_GUID: &str = "ddcf3616-3275-4164-98b6-fe85707ffe7d";
pub const EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID: &str = "aaf32c78-947b-439a-a180-2e144ec37792";
pub const EFI_AUTHENTICATED_VARIABLE_GUID: &str = "515fa686-b06e-4550-9112-382bf1067bfb";

/// Variable store signatures this tool understands.
pub const STORE_SIGNATURE_GUIDS: [&str; 3] = [
    EFI_VARIABLE_GUID,
    EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID,
    EFI_AUTHENTICATED_VARIABLE_GUID,
];

/// A variable to add to the store.
#[derive(Clone, Debug)]
pub struct Enrollment {
    pub name: String,
    /// Vendor GUID, or signature owner for the secure boot databases.
    pub vendor_guid: String,
    pub attributes: u32,
    pub data: Vec<u8>,
}

/// Locate and parse the variable store of `image`.
pub fn read_store(image: &[u8]) -> Result<VariableStore<'_>> {
    let volume = volume::locate(image)?;
    VariableStore::parse(&volume)
}

/// Return a copy of `image` with `enrollment` appended to its variable store.
pub fn enroll(image: &[u8], enrollment: &Enrollment) -> Result<Vec<u8>> {
    let mut store = read_store(image)?;
    store.add_variable(
        &enrollment.name,
        &enrollment.vendor_guid,
        enrollment.attributes,
        enrollment.data.clone(),
    )?;

    let new_image = store.rewrite(image)?;
    info!(
        "enrolled {} into store at {:#x}, {} bytes free",
        enrollment.name,
        store.offset,
        store.free_space()
    );
    Ok(new_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FILL_BYTE, VARIABLE_STORE_HEADER_SIZE};
    use crate::store::tests::store_bytes;
    use crate::volume::tests::nvram_header;

    const FV_OFFSET: usize = 0x1000;
    const FV_HEADER_LENGTH: u16 = 64;
    const STORE_SIZE: u32 = 2048;

    /// An image with code around an NVRAM volume holding `store`.
    fn image_with_store(store: &[u8]) -> Vec<u8> {
        let volume_length = FV_HEADER_LENGTH as usize + store.len();
        let mut image: Vec<u8> = (0..0x4000).map(|i| (i * 7) as u8).collect();
        let mut volume = nvram_header(volume_length as u64, FV_HEADER_LENGTH);
        // Block map
        volume.resize(FV_HEADER_LENGTH as usize, 0);
        volume.extend_from_slice(store);
        image[FV_OFFSET..FV_OFFSET + volume.len()].copy_from_slice(&volume);
        image
    }

    fn empty_store() -> Vec<u8> {
        let mut store = store_bytes(STORE_SIZE, &[]);
        store[..16].copy_from_slice(&guid::guid_to_wire_bytes(EFI_VARIABLE_GUID).unwrap());
        store
    }

    fn test_var() -> Enrollment {
        Enrollment {
            name: "TestVar".into(),
            vendor_guid: EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID.into(),
            attributes: 0x7,
            data: vec![0xDE, 0xAD, 0xBE, 0xEF],
        }
    }

    #[test]
    fn test_enroll_into_empty_store() {
        let image = image_with_store(&empty_store());
        let new_image = enroll(&image, &test_var()).unwrap();
        assert_eq!(new_image.len(), image.len());

        let header_start = FV_OFFSET + FV_HEADER_LENGTH as usize;
        let record = header_start + VARIABLE_STORE_HEADER_SIZE;
        let store_end = header_start + STORE_SIZE as usize;

        // Outside the record region nothing changes
        assert_eq!(new_image[..record], image[..record]);
        assert_eq!(new_image[store_end..], image[store_end..]);

        let var = TimeBasedAuthVariable::decode(&new_image, record).unwrap();
        assert_eq!(var.name(), "TestVar");
        assert_eq!(var.vendor_guid, EFI_AUTHENTICATED_VARIABLE_BASED_TIME_GUID);
        assert_eq!(var.header.attributes, 0x7);
        assert_eq!(var.header.data_size, 4);
        assert_eq!(&*var.data, &[0xDE, 0xAD, 0xBE, 0xEF]);

        // 60 + 16 + 4 = 80, already aligned
        assert_eq!(var.full_size(), 80);
        assert!(new_image[record + 80..store_end].iter().all(|&b| b == FILL_BYTE));
    }

    #[test]
    fn test_enroll_keeps_existing() {
        let image = image_with_store(&empty_store());
        let first = enroll(&image, &test_var()).unwrap();

        let second_var = Enrollment {
            name: "db".into(),
            vendor_guid: "77fa9abd-0359-4d32-bd60-28f4e78f784b".into(),
            attributes: variable::SECURE_BOOT_ATTRIBUTES,
            data: vec![0x30, 0x82, 0x01],
        };
        let second = enroll(&first, &second_var).unwrap();
        assert_eq!(second.len(), image.len());

        let store = read_store(&second).unwrap();
        assert_eq!(store.variables.len(), 2);
        assert_eq!(store.variables[0], read_store(&first).unwrap().variables[0]);
        assert_eq!(store.variables[1].name(), "db");
        assert_eq!(&*store.variables[1].data, &[0x30, 0x82, 0x01]);
        // 80 + (60 + 6 + 3 -> 72)
        assert_eq!(store.used_size(), 152);
        assert_eq!(store.free_space(), STORE_SIZE as usize - 28 - 152);
    }

    #[test]
    fn test_enroll_store_full() {
        let image = image_with_store(&empty_store());
        let mut big = test_var();
        big.data = vec![0; STORE_SIZE as usize];

        assert!(matches!(enroll(&image, &big), Err(Error::CapacityExceeded { .. })));
    }

    #[test]
    fn test_enroll_bad_guid() {
        let image = image_with_store(&empty_store());
        let mut var = test_var();
        var.vendor_guid = "aaf32c78-947b".into();

        assert!(matches!(enroll(&image, &var), Err(Error::GuidParse { .. })));
    }

    #[test]
    fn test_enroll_no_volume() {
        let image = vec![0xFF; 0x4000];
        assert!(matches!(enroll(&image, &test_var()), Err(Error::NotFound)));
    }

    #[test]
    fn test_store_larger_than_volume() {
        let mut store = empty_store();
        store[16..20].copy_from_slice(&(STORE_SIZE * 2).to_le_bytes());
        let image = image_with_store(&store);

        assert!(matches!(
            read_store(&image),
            Err(Error::StoreOutOfBounds { size: 4096, available: 2048, .. })
        ));
    }
}
