//! Primitive wire codec.
//!
//! Pure functions over byte buffers and absolute offsets:
//! - little-endian fixed-width integers (`read_*` / `write_*`)
//! - NUL-padded fixed-size strings
//! - the 32-bit packed date used by every bet record
//! - the base64 envelope wrapped around raw buffers on the HTTP wire
//!
//! Every read and write checks `offset + width <= len` and reports
//! [`CodecError::ShortBuffer`] instead of slicing out of bounds.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer too short: need {width} bytes at offset {offset}, have {len}")]
    ShortBuffer { offset: usize, width: usize, len: usize },
    #[error("packed date out of range: {0}")]
    InvalidDate(String),
    #[error("invalid base64 envelope: {0}")]
    Base64(String),
}

fn span(len: usize, offset: usize, width: usize) -> Result<Range<usize>, CodecError> {
    match offset.checked_add(width) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(CodecError::ShortBuffer { offset, width, len }),
    }
}

fn array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], CodecError> {
    let r = span(buf.len(), offset, N)?;
    let mut tmp = [0u8; N];
    tmp.copy_from_slice(&buf[r]);
    Ok(tmp)
}

/// Borrow `width` bytes starting at `offset`.
pub fn read_bytes(buf: &[u8], offset: usize, width: usize) -> Result<&[u8], CodecError> {
    let r = span(buf.len(), offset, width)?;
    Ok(&buf[r])
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8, CodecError> {
    Ok(array::<1>(buf, offset)?[0])
}

/// Signed byte; vote slots use `-1` for "not voted yet".
pub fn read_i8(buf: &[u8], offset: usize) -> Result<i8, CodecError> {
    Ok(i8::from_le_bytes(array::<1>(buf, offset)?))
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16, CodecError> {
    Ok(u16::from_le_bytes(array(buf, offset)?))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, CodecError> {
    Ok(u32::from_le_bytes(array(buf, offset)?))
}

pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64, CodecError> {
    Ok(u64::from_le_bytes(array(buf, offset)?))
}

pub fn write_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), CodecError> {
    let r = span(buf.len(), offset, bytes.len())?;
    buf[r].copy_from_slice(bytes);
    Ok(())
}

pub fn write_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<(), CodecError> {
    write_bytes(buf, offset, &[value])
}

pub fn write_i8(buf: &mut [u8], offset: usize, value: i8) -> Result<(), CodecError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Result<(), CodecError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<(), CodecError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<(), CodecError> {
    write_bytes(buf, offset, &value.to_le_bytes())
}

/// Read a `size`-byte text field: trailing NULs are stripped, then whitespace
/// is trimmed. Invalid UTF-8 is replaced rather than rejected.
pub fn read_fixed_string(buf: &[u8], offset: usize, size: usize) -> Result<String, CodecError> {
    let raw = read_bytes(buf, offset, size)?;
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    Ok(String::from_utf8_lossy(&raw[..end]).trim().to_string())
}

/// Write `s` into a `size`-byte field and zero-fill the rest.
///
/// Over-length text is truncated (lossy) at the last UTF-8 character
/// boundary that fits, so the stored bytes always decode to a prefix of `s`.
/// Returns the number of text bytes written.
pub fn write_fixed_string(buf: &mut [u8], offset: usize, s: &str, size: usize) -> Result<usize, CodecError> {
    let r = span(buf.len(), offset, size)?;
    let cut = truncate_at_boundary(s, size);
    let field = &mut buf[r];
    field.fill(0);
    field[..cut.len()].copy_from_slice(cut.as_bytes());
    Ok(cut.len())
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary.
pub fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Ledger date/time, stored as a 32-bit bit-field.
///
/// Layout from MSB to LSB: `year - 24` (6) | month (4) | day (5) | hour (5) |
/// minute (6) | second (6). `year` is the two-digit year of the 2000s, so the
/// representable range is 2024..=2087. Field order makes the derived `Ord`
/// chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackedDate {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Two-digit year stored as zero.
pub const YEAR_EPOCH: u8 = 24;

const YEAR_SHIFT: u32 = 26;
const MONTH_SHIFT: u32 = 22;
const DAY_SHIFT: u32 = 17;
const HOUR_SHIFT: u32 = 12;
const MINUTE_SHIFT: u32 = 6;

impl PackedDate {
    pub fn new(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self { year, month, day, hour, minute, second }
    }

    /// Check every field against its range, including the calendar day.
    pub fn validate(&self) -> Result<(), CodecError> {
        if !(YEAR_EPOCH..=YEAR_EPOCH + 63).contains(&self.year) {
            return Err(CodecError::InvalidDate(format!("year {} outside 24..=87", self.year)));
        }
        if self.hour > 23 || self.minute > 59 || self.second > 59 {
            return Err(CodecError::InvalidDate(format!(
                "time {:02}:{:02}:{:02}",
                self.hour, self.minute, self.second
            )));
        }
        self.calendar_date().map(|_| ())
    }

    fn calendar_date(&self) -> Result<Date, CodecError> {
        let month = Month::try_from(self.month)
            .map_err(|_| CodecError::InvalidDate(format!("month {}", self.month)))?;
        Date::from_calendar_date(2000 + i32::from(self.year), month, self.day)
            .map_err(|e| CodecError::InvalidDate(e.to_string()))
    }

    /// Pack into the wire integer. Fails on any out-of-range field.
    pub fn pack(&self) -> Result<u32, CodecError> {
        self.validate()?;
        Ok((u32::from(self.year - YEAR_EPOCH) << YEAR_SHIFT)
            | (u32::from(self.month) << MONTH_SHIFT)
            | (u32::from(self.day) << DAY_SHIFT)
            | (u32::from(self.hour) << HOUR_SHIFT)
            | (u32::from(self.minute) << MINUTE_SHIFT)
            | u32::from(self.second))
    }

    /// Split the wire integer into its bit fields. No range check; see
    /// [`PackedDate::validate`].
    pub fn unpack(raw: u32) -> Self {
        Self {
            year: ((raw >> YEAR_SHIFT) & 0x3f) as u8 + YEAR_EPOCH,
            month: ((raw >> MONTH_SHIFT) & 0x0f) as u8,
            day: ((raw >> DAY_SHIFT) & 0x1f) as u8,
            hour: ((raw >> HOUR_SHIFT) & 0x1f) as u8,
            minute: ((raw >> MINUTE_SHIFT) & 0x3f) as u8,
            second: (raw & 0x3f) as u8,
        }
    }

    pub fn to_datetime(&self) -> Result<PrimitiveDateTime, CodecError> {
        self.validate()?;
        let date = self.calendar_date()?;
        let time = Time::from_hms(self.hour, self.minute, self.second)
            .map_err(|e| CodecError::InvalidDate(e.to_string()))?;
        Ok(PrimitiveDateTime::new(date, time))
    }

    pub fn from_datetime(dt: PrimitiveDateTime) -> Result<Self, CodecError> {
        let year = dt.year() - 2000;
        let year = u8::try_from(year)
            .map_err(|_| CodecError::InvalidDate(format!("year {}", dt.year())))?;
        let d = Self::new(year, dt.month() as u8, dt.day(), dt.hour(), dt.minute(), dt.second());
        d.validate()?;
        Ok(d)
    }

    /// Current UTC wall clock, truncated to the second.
    pub fn now_utc() -> Result<Self, CodecError> {
        let now = OffsetDateTime::now_utc();
        Self::from_datetime(PrimitiveDateTime::new(now.date(), now.time()))
    }

    /// `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        format!("20{:02}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// `HH:MM:SS`.
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    /// Parse the `YYYY-MM-DD` / `HH:MM:SS` pair produced by
    /// [`PackedDate::date_string`] and [`PackedDate::time_string`].
    pub fn parse(date: &str, time: &str) -> Result<Self, CodecError> {
        let d = Date::parse(date, time::macros::format_description!("[year]-[month]-[day]"))
            .map_err(|e| CodecError::InvalidDate(format!("{date:?}: {e}")))?;
        let t = Time::parse(time, time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|e| CodecError::InvalidDate(format!("{time:?}: {e}")))?;
        Self::from_datetime(PrimitiveDateTime::new(d, t))
    }
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(s: &str) -> Result<Vec<u8>, CodecError> {
    BASE64_STANDARD
        .decode(s.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))
}
