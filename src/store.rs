// SPDX-License-Identifier: GPL-3.0-only

use log::{debug, info, warn};

use crate::codec::{self, take, Field};
use crate::error::{Error, Result};
use crate::guid::{guid_from_wire_bytes, GUID_SIZE};
use crate::variable::{TimeBasedAuthVariable, VARIABLE_START_ID};
use crate::volume::FirmwareVolume;
use crate::STORE_SIGNATURE_GUIDS;

/// Erased flash.
pub const FILL_BYTE: u8 = 0xFF;

/// Variable records start on this boundary.
pub const HEADER_ALIGNMENT: usize = 4;

// VARIABLE_STORE_HEADER
const VARIABLE_STORE_HEADER_FORMAT: [Field; 6] = [
    Field::Bytes(GUID_SIZE), // Signature
    Field::U32,              // Size
    Field::U8,               // Format
    Field::U8,               // State
    Field::U16,              // Reserved
    Field::U32,              // Reserved1
];

pub const VARIABLE_STORE_HEADER_SIZE: usize = codec::format_size(&VARIABLE_STORE_HEADER_FORMAT);

fn align_up(offset: usize) -> usize {
    (offset + HEADER_ALIGNMENT - 1) & !(HEADER_ALIGNMENT - 1)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VariableStoreHeader {
    pub signature: [u8; GUID_SIZE],
    /// Store size including this header, excluding the volume header.
    pub size: u32,
    pub format: u8,
    pub state: u8,
    pub reserved: u16,
    pub reserved1: u32,
}

impl VariableStoreHeader {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut values = codec::decode(&VARIABLE_STORE_HEADER_FORMAT, data)?.into_iter();
        Ok(Self {
            signature: take(&mut values)?,
            size: take(&mut values)?,
            format: take(&mut values)?,
            state: take(&mut values)?,
            reserved: take(&mut values)?,
            reserved1: take(&mut values)?,
        })
    }

    pub fn is_recognized(&self) -> bool {
        STORE_SIGNATURE_GUIDS.contains(&guid_from_wire_bytes(&self.signature).as_str())
    }
}

/// Walk the records following the store header, up to `store_size` bytes
/// into `store`.
///
/// Returns the records and the number of bytes they occupy including
/// alignment padding. Walking stops at the first offset without a start id.
pub fn walk_records(store: &[u8], store_size: usize) -> Result<(Vec<TimeBasedAuthVariable<'_>>, usize)> {
    let region = &store[..store_size.min(store.len())];

    let mut variables = Vec::new();
    let mut offset = VARIABLE_STORE_HEADER_SIZE;
    while offset < region.len() {
        // No more entries
        match region.get(offset..offset + 2) {
            Some(&[lo, hi]) if u16::from_le_bytes([lo, hi]) == VARIABLE_START_ID => (),
            _ => break,
        }

        let variable = TimeBasedAuthVariable::decode(region, offset)?;
        debug!(
            "record at {:#x}: {} ({} bytes, state {:#x})",
            offset,
            variable.name(),
            variable.full_size(),
            variable.header.state
        );

        offset = align_up(offset + variable.full_size());
        variables.push(variable);
    }

    Ok((variables, offset - VARIABLE_STORE_HEADER_SIZE))
}

/// Replace the record list of the store at `store_offset` in `image`.
///
/// Everything outside the store's record region is copied unchanged and
/// unused space in the region is filled with [`FILL_BYTE`].
pub fn rewrite(
    image: &[u8],
    store_offset: usize,
    store_size: usize,
    variables: &[TimeBasedAuthVariable],
) -> Result<Vec<u8>> {
    let start = store_offset + VARIABLE_STORE_HEADER_SIZE;
    let end = store_offset + store_size;
    if store_size < VARIABLE_STORE_HEADER_SIZE || end > image.len() {
        return Err(Error::StoreOutOfBounds {
            offset: store_offset,
            size: store_size,
            available: image.len().saturating_sub(store_offset),
        });
    }

    let capacity = end - start;
    let mut records = Vec::with_capacity(capacity);
    for variable in variables {
        records.extend_from_slice(&variable.to_bytes()?);
        // Align to 32 bits
        records.resize(align_up(records.len()), FILL_BYTE);
    }

    if records.len() > capacity {
        return Err(Error::CapacityExceeded {
            required: records.len(),
            capacity,
        });
    }

    let mut new_image = Vec::with_capacity(image.len());
    new_image.extend_from_slice(&image[..start]);
    new_image.extend_from_slice(&records);
    new_image.resize(end, FILL_BYTE);
    new_image.extend_from_slice(&image[end..]);
    Ok(new_image)
}

/// The variable store of an NVRAM firmware volume.
#[derive(Clone, Debug)]
pub struct VariableStore<'a> {
    pub header: VariableStoreHeader,
    /// Offset of the store header within the flash image.
    pub offset: usize,
    pub variables: Vec<TimeBasedAuthVariable<'a>>,
    used_size: usize,
}

impl<'a> VariableStore<'a> {
    pub fn parse(volume: &FirmwareVolume<'a>) -> Result<Self> {
        let header_length = volume.header.header_length as usize;
        let store = volume.data.get(header_length..).unwrap_or_default();
        let header = VariableStoreHeader::decode(store)?;

        let size = header.size as usize;
        if size < VARIABLE_STORE_HEADER_SIZE || size > store.len() {
            return Err(Error::StoreOutOfBounds {
                offset: volume.offset + header_length,
                size,
                available: store.len(),
            });
        }

        if !header.is_recognized() {
            warn!(
                "unrecognized variable store signature {}",
                guid_from_wire_bytes(&header.signature)
            );
        }

        let (variables, used_size) = walk_records(store, size)?;
        debug!(
            "variable store at {:#x}: {} variables, {:#x} of {:#x} bytes used",
            volume.offset + header_length,
            variables.len(),
            used_size,
            size - VARIABLE_STORE_HEADER_SIZE
        );

        Ok(Self {
            header,
            offset: volume.offset + header_length,
            variables,
            used_size,
        })
    }

    /// Bytes available for records.
    pub fn capacity(&self) -> usize {
        self.header.size as usize - VARIABLE_STORE_HEADER_SIZE
    }

    /// Bytes used by the records found in the image.
    pub fn used_size(&self) -> usize {
        self.used_size
    }

    /// Bytes left after the current record list, including added records.
    pub fn free_space(&self) -> usize {
        let used: usize = self
            .variables
            .iter()
            .map(|v| align_up(v.full_size()))
            .sum();
        self.capacity().saturating_sub(used)
    }

    /// Append a new variable record, leaving existing records alone.
    pub fn add_variable(&mut self, name: &str, vendor_guid: &str, attributes: u32, data: Vec<u8>) -> Result<()> {
        let variable = TimeBasedAuthVariable::new(name, vendor_guid, attributes, data)?;
        debug!("adding {} ({} bytes)", name, variable.full_size());
        self.variables.push(variable);
        Ok(())
    }

    /// Produce a copy of `image` with this store's record list written back.
    pub fn rewrite(&self, image: &[u8]) -> Result<Vec<u8>> {
        rewrite(image, self.offset, self.header.size as usize, &self.variables)
    }

    /// Log every variable in the store.
    pub fn dump(&self) {
        for variable in &self.variables {
            info!("   name             :{}", variable.name());
            info!("   vendor_guid      :{}", variable.vendor_guid);
            info!("   full_size        :{}", variable.full_size());
            info!("   attributes       :{:#x}", variable.header.attributes);
            info!("   state            :{:#x}", variable.header.state);
            info!("   MonotonicCount   :{}", variable.header.monotonic_count);
            info!("   PubKeyIndex      :{}", variable.header.pubkey_index);
            info!("   DataSize         :{}", variable.header.data_size);
            if !variable.is_added() {
                warn!("{} is not in the added state", variable.name());
            }
        }
        info!(
            "variable store used space: {} / {} bytes",
            self.capacity() - self.free_space(),
            self.capacity()
        );
    }
}
