// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::codec::Field;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("buffer too short: format needs {needed} bytes, got {available}")]
    Length { needed: usize, available: usize },

    #[error("unrecognized field specifier {0:?}")]
    Format(String),

    #[error("value {index} does not match field {expected:?}")]
    TypeMismatch { index: usize, expected: Field },

    #[error("format has {fields} fields but {values} values were supplied")]
    Arity { fields: usize, values: usize },

    #[error("invalid GUID {input:?}")]
    GuidParse {
        input: String,
        #[source]
        source: uuid::Error,
    },

    #[error("NVRAM firmware volume not found")]
    NotFound,

    #[error("firmware volume at {offset:#x} declares {length:#x} bytes, image is {image_len:#x} bytes")]
    VolumeOutOfBounds {
        offset: usize,
        length: u64,
        image_len: usize,
    },

    #[error("variable store at {offset:#x} declares {size:#x} bytes, {available:#x} available")]
    StoreOutOfBounds {
        offset: usize,
        size: usize,
        available: usize,
    },

    #[error("variable record at {offset:#x} needs {needed} bytes, {available} left in store")]
    MalformedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("variable list needs {required} bytes, store holds {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },
}
