// SPDX-License-Identifier: GPL-3.0-only

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use crate::codec::{self, Field, Value};
use crate::error::Result;

pub const EFI_TIME_SIZE: usize = 16;

const EFI_TIME_FORMAT: [Field; 11] = [
    Field::U16, // Year
    Field::U8,  // Month
    Field::U8,  // Day
    Field::U8,  // Hour
    Field::U8,  // Minute
    Field::U8,  // Second
    Field::U8,  // Pad1
    Field::U32, // Nanosecond
    Field::U16, // TimeZone
    Field::U8,  // Daylight
    Field::U8,  // Pad2
];

// EFI_TIME
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EfiTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
    pub timezone: u16,
    pub daylight: u8,
}

impl EfiTime {
    /// Current local wall-clock time, to the second.
    pub fn now() -> Self {
        Self::from_datetime(&Local::now().naive_local())
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            year: dt.year() as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            ..Self::default()
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; EFI_TIME_SIZE]> {
        let raw = codec::encode(
            &EFI_TIME_FORMAT,
            &[
                Value::U16(self.year),
                Value::U8(self.month),
                Value::U8(self.day),
                Value::U8(self.hour),
                Value::U8(self.minute),
                Value::U8(self.second),
                Value::U8(0),
                Value::U32(self.nanosecond),
                Value::U16(self.timezone),
                Value::U8(self.daylight),
                Value::U8(0),
            ],
        )?;

        let mut b = [0; EFI_TIME_SIZE];
        b.copy_from_slice(&raw);
        Ok(b)
    }
}
