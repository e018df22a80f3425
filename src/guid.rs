// SPDX-License-Identifier: GPL-3.0-only

//! EFI_GUID stores its first three fields little-endian, the canonical string
//! form is big-endian throughout.

use uuid::Uuid;

use crate::error::{Error, Result};

pub const GUID_SIZE: usize = 16;

pub fn guid_from_wire_bytes(bytes: &[u8; GUID_SIZE]) -> String {
    Uuid::from_bytes_le(*bytes).to_string()
}

pub fn guid_to_wire_bytes(s: &str) -> Result<[u8; GUID_SIZE]> {
    let uuid = Uuid::parse_str(s).map_err(|source| Error::GuidParse {
        input: s.into(),
        source,
    })?;
    Ok(uuid.to_bytes_le())
}
