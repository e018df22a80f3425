// SPDX-License-Identifier: GPL-3.0-only

use std::borrow::Cow;

use crate::codec::{self, take, Field, Value};
use crate::error::{Error, Result};
use crate::guid::{guid_from_wire_bytes, guid_to_wire_bytes, GUID_SIZE};
use crate::time::{EfiTime, EFI_TIME_SIZE};

pub const VARIABLE_START_ID: u16 = 0x55AA;

/// Header and data fully written.
pub const VAR_ADDED: u8 = 0x3F;

pub const EFI_VARIABLE_NON_VOLATILE: u32 = 0x0000_0001;
pub const EFI_VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x0000_0002;
pub const EFI_VARIABLE_RUNTIME_ACCESS: u32 = 0x0000_0004;
pub const EFI_VARIABLE_TIME_BASED_AUTHENTICATED_WRITE_ACCESS: u32 = 0x0000_0020;

/// Attributes the secure boot key databases are always stored with.
pub const SECURE_BOOT_ATTRIBUTES: u32 = EFI_VARIABLE_NON_VOLATILE
    | EFI_VARIABLE_BOOTSERVICE_ACCESS
    | EFI_VARIABLE_RUNTIME_ACCESS
    | EFI_VARIABLE_TIME_BASED_AUTHENTICATED_WRITE_ACCESS;

/// Fixed attributes for PK, KEK, db and dbx. Other names take caller attributes.
pub fn secure_boot_attributes(name: &str) -> Option<u32> {
    match name {
        "PK" | "KEK" | "db" | "dbx" => Some(SECURE_BOOT_ATTRIBUTES),
        _ => None,
    }
}

// AUTHENTICATED_VARIABLE_HEADER
const AUTH_VAR_HEADER_FORMAT: [Field; 10] = [
    Field::U16,                  // StartId
    Field::U8,                   // State
    Field::U8,                   // Reserved
    Field::U32,                  // Attributes
    Field::U64,                  // MonotonicCount
    Field::Bytes(EFI_TIME_SIZE), // TimeStamp
    Field::U32,                  // PubKeyIndex
    Field::U32,                  // NameSize
    Field::U32,                  // DataSize
    Field::Bytes(GUID_SIZE),     // VendorGuid
];

pub const AUTH_VAR_HEADER_SIZE: usize = codec::format_size(&AUTH_VAR_HEADER_FORMAT);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthenticatedVariableHeader {
    pub start_id: u16,
    pub state: u8,
    pub reserved: u8,
    pub attributes: u32,
    pub monotonic_count: u64,
    pub timestamp: [u8; EFI_TIME_SIZE],
    pub pubkey_index: u32,
    pub name_size: u32,
    pub data_size: u32,
    pub vendor_guid: [u8; GUID_SIZE],
}

impl AuthenticatedVariableHeader {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut values = codec::decode(&AUTH_VAR_HEADER_FORMAT, data)?.into_iter();
        Ok(Self {
            start_id: take(&mut values)?,
            state: take(&mut values)?,
            reserved: take(&mut values)?,
            attributes: take(&mut values)?,
            monotonic_count: take(&mut values)?,
            timestamp: take(&mut values)?,
            pubkey_index: take(&mut values)?,
            name_size: take(&mut values)?,
            data_size: take(&mut values)?,
            vendor_guid: take(&mut values)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(
            &AUTH_VAR_HEADER_FORMAT,
            &[
                Value::U16(self.start_id),
                Value::U8(self.state),
                Value::U8(self.reserved),
                Value::U32(self.attributes),
                Value::U64(self.monotonic_count),
                Value::Bytes(&self.timestamp),
                Value::U32(self.pubkey_index),
                Value::U32(self.name_size),
                Value::U32(self.data_size),
                Value::Bytes(&self.vendor_guid),
            ],
        )
    }

    /// Header, name and data, without alignment padding.
    pub fn full_size(&self) -> usize {
        AUTH_VAR_HEADER_SIZE + self.name_size as usize + self.data_size as usize
    }
}

/// A time-based authenticated variable record.
///
/// Records read from an image borrow their name and data from it; records
/// built in memory own them. Use [`TimeBasedAuthVariable::into_owned`] to keep a
/// decoded record past the life of the image buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeBasedAuthVariable<'a> {
    pub header: AuthenticatedVariableHeader,
    /// Canonical form of `header.vendor_guid`.
    pub vendor_guid: String,
    /// UTF-16LE name including its null terminator.
    pub name_blob: Cow<'a, [u8]>,
    pub data: Cow<'a, [u8]>,
}

impl<'a> TimeBasedAuthVariable<'a> {
    /// Decode the record starting at `offset` in `store`.
    ///
    /// The header, name and data must all fit within `store`.
    pub fn decode(store: &'a [u8], offset: usize) -> Result<Self> {
        let record = store.get(offset..).unwrap_or_default();
        let malformed = |needed| Error::MalformedRecord {
            offset,
            needed,
            available: record.len(),
        };

        if record.len() < AUTH_VAR_HEADER_SIZE {
            return Err(malformed(AUTH_VAR_HEADER_SIZE));
        }
        let header = AuthenticatedVariableHeader::decode(record)?;

        let full_size = header.full_size();
        if full_size > record.len() {
            return Err(malformed(full_size));
        }

        let name_end = AUTH_VAR_HEADER_SIZE + header.name_size as usize;
        Ok(Self {
            vendor_guid: guid_from_wire_bytes(&header.vendor_guid),
            name_blob: Cow::Borrowed(&record[AUTH_VAR_HEADER_SIZE..name_end]),
            data: Cow::Borrowed(&record[name_end..full_size]),
            header,
        })
    }

    /// Decoded variable name, stopping at the first null.
    pub fn name(&self) -> String {
        let units: Vec<u16> = self
            .name_blob
            .chunks_exact(2)
            .map(|w| u16::from_le_bytes([w[0], w[1]]))
            .take_while(|&w| w != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }

    pub fn is_added(&self) -> bool {
        self.header.state == VAR_ADDED
    }

    pub fn full_size(&self) -> usize {
        self.header.full_size()
    }

    /// Encoded header, name and data, without alignment padding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut raw = self.header.encode()?;
        raw.extend_from_slice(&self.name_blob);
        raw.extend_from_slice(&self.data);
        Ok(raw)
    }

    pub fn into_owned(self) -> TimeBasedAuthVariable<'static> {
        TimeBasedAuthVariable {
            header: self.header,
            vendor_guid: self.vendor_guid,
            name_blob: Cow::Owned(self.name_blob.into_owned()),
            data: Cow::Owned(self.data.into_owned()),
        }
    }
}

impl TimeBasedAuthVariable<'static> {
    /// Build a new record stamped with the current time.
    pub fn new(name: &str, vendor_guid: &str, attributes: u32, data: Vec<u8>) -> Result<Self> {
        Self::with_timestamp(name, vendor_guid, attributes, data, EfiTime::now())
    }

    pub fn with_timestamp(
        name: &str,
        vendor_guid: &str,
        attributes: u32,
        data: Vec<u8>,
        timestamp: EfiTime,
    ) -> Result<Self> {
        let name_blob = encode_name(name);
        let guid = guid_to_wire_bytes(vendor_guid)?;

        let header = AuthenticatedVariableHeader {
            start_id: VARIABLE_START_ID,
            state: VAR_ADDED,
            reserved: 0,
            attributes,
            monotonic_count: 0,
            timestamp: timestamp.to_bytes()?,
            pubkey_index: 0,
            name_size: name_blob.len() as u32,
            data_size: data.len() as u32,
            vendor_guid: guid,
        };

        Ok(Self {
            header,
            vendor_guid: guid_from_wire_bytes(&guid),
            name_blob: Cow::Owned(name_blob),
            data: Cow::Owned(data),
        })
    }
}

/// UTF-16LE code units followed by a null terminator.
fn encode_name(name: &str) -> Vec<u8> {
    name.encode_utf16()
        .chain(Some(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
