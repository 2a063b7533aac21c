//! DOS date/time packing used by ZIP headers
//!
//! Date: bits 15-9 year since 1980, bits 8-5 month, bits 4-0 day.
//! Time: bits 15-11 hour, bits 10-5 minute, bits 4-0 seconds / 2.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

const DOS_EPOCH_YEAR: i32 = 1980;
const DOS_MAX_YEAR: i32 = DOS_EPOCH_YEAR + 127;

/// Packed DOS timestamp as stored in local headers and central directory records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// Zero date/time, which readers interpret as "no timestamp"
    pub const NONE: DosDateTime = DosDateTime { date: 0, time: 0 };

    /// Pack a calendar timestamp. Seconds round down to an even value.
    /// Timestamps outside 1980..=2107 have no DOS form and yield [`DosDateTime::NONE`].
    pub fn from_datetime(timestamp: &NaiveDateTime) -> Self {
        let year = timestamp.year();
        if !(DOS_EPOCH_YEAR..=DOS_MAX_YEAR).contains(&year) {
            return Self::NONE;
        }
        let date = (((year - DOS_EPOCH_YEAR) as u16) << 9)
            | ((timestamp.month() as u16) << 5)
            | timestamp.day() as u16;
        // leap seconds report 60 and still fit the 5-bit field after halving
        let time = ((timestamp.hour() as u16) << 11)
            | ((timestamp.minute() as u16) << 5)
            | (timestamp.second().min(59) as u16 / 2);
        DosDateTime { date, time }
    }

    /// Unpack to a calendar timestamp; `None` for the zero value or any
    /// out-of-range field
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        if self.date == 0 {
            return None;
        }
        let year = DOS_EPOCH_YEAR + (self.date >> 9) as i32;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;
        let hour = (self.time >> 11) as u32;
        let minute = ((self.time >> 5) & 0x3F) as u32;
        let second = ((self.time & 0x1F) * 2) as u32;
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
    }

    pub fn is_none(&self) -> bool {
        self.date == 0
    }
}
