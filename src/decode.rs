//! Fixed-width little-endian primitives shared by every header and packet parser.

use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::NsError;

pub(crate) fn read_u8<R: Read>(r: &mut R) -> Result<u8, NsError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| NsError::BadFile("short read decoding u8".to_string()))?;
    Ok(buf[0])
}

pub(crate) fn read_i16<R: Read>(r: &mut R) -> Result<i16, NsError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)
        .map_err(|_| NsError::BadFile("short read decoding i16".to_string()))?;
    Ok(i16::from_le_bytes(buf))
}

pub(crate) fn read_u16<R: Read>(r: &mut R) -> Result<u16, NsError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)
        .map_err(|_| NsError::BadFile("short read decoding u16".to_string()))?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32, NsError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| NsError::BadFile("short read decoding u32".to_string()))?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads `count` bytes and trims at the first NUL byte, mapping each retained byte to its `char`
/// value. Every fixed-length text field in these formats (labels, comments, application names) is
/// plain ASCII, so this is equivalent to and cheaper than a UTF-8 decode.
pub(crate) fn read_fixed_string<R: Read>(r: &mut R, count: usize) -> Result<String, NsError> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)
        .map_err(|_| NsError::BadFile(format!("short read decoding {}-byte string", count)))?;
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    Ok(buf[..end].iter().map(|b| *b as char).collect())
}

/// Reads `count` signed 16-bit samples in little-endian order.
pub(crate) fn read_i16_samples<R: Read>(r: &mut R, count: usize) -> Result<Vec<i16>, NsError> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        samples.push(read_i16(r)?);
    }
    Ok(samples)
}

/// Decodes the 8-field system timestamp record used by both basic header formats: (year, month,
/// day-of-week (ignored), day, hour, minute, second, millisecond). Millisecond is scaled to
/// microseconds for the returned value.
pub(crate) fn read_system_timestamp<R: Read>(r: &mut R) -> Result<NaiveDateTime, NsError> {
    let year = read_u16(r)?;
    let month = read_u16(r)?;
    let _day_of_week = read_u16(r)?;
    let day = read_u16(r)?;
    let hour = read_u16(r)?;
    let minute = read_u16(r)?;
    let second = read_u16(r)?;
    let millisecond = read_u16(r)?;

    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| NsError::BadFile("invalid origin date in system timestamp".to_string()))?;
    let time = NaiveTime::from_hms_micro_opt(
        hour as u32,
        minute as u32,
        second as u32,
        millisecond as u32 * 1000,
    )
    .ok_or_else(|| NsError::BadFile("invalid origin time in system timestamp".to_string()))?;

    Ok(NaiveDateTime::new(date, time))
}
