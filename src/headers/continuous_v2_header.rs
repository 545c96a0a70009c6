//! Basic header and `CC` extended header layouts for `NEURALCD` (continuous-sampling v2) files.

use std::io::{Read, Seek, SeekFrom};

use chrono::NaiveDateTime;

use crate::decode::{read_fixed_string, read_i16, read_system_timestamp, read_u16, read_u32, read_u8};
use crate::error::NsError;

pub(crate) const MAGIC: &[u8; 8] = b"NEURALCD";
/// Fixed prefix before the per-channel `CC` extended headers begin. The header's own
/// `bytes_headers` field (not this constant) is authoritative for the start of the data region.
pub(crate) const FIXED_PREFIX_BYTES: usize = 314;
pub(crate) const CC_HEADER_BYTES: usize = 66;

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousV2Header {
    pub file_spec_major: u8,
    pub file_spec_minor: u8,
    pub bytes_headers: u32,
    pub label: String,
    pub comment: String,
    pub period: u32,
    pub timestamp_resolution: u32,
    pub origin: NaiveDateTime,
    pub channel_count: u32,
}

impl ContinuousV2Header {
    pub(crate) fn deserialize<R: Read + Seek>(r: &mut R) -> Result<Self, NsError> {
        r.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| NsError::BadFile("short read decoding NEURALCD magic".to_string()))?;
        if &magic != MAGIC {
            return Err(NsError::BadFile(
                "expected NEURALCD magic in basic header".to_string(),
            ));
        }

        let mut major_minor = [0u8; 2];
        r.read_exact(&mut major_minor).map_err(|_| {
            NsError::BadFile("short read decoding NEURALCD revision".to_string())
        })?;

        let bytes_headers = read_u32(r)?;
        let label = read_fixed_string(r, 16)?;
        let comment = read_fixed_string(r, 256)?;
        let period = read_u32(r)?;
        let timestamp_resolution = read_u32(r)?;
        let origin = read_system_timestamp(r)?;
        let channel_count = read_u32(r)?;

        Ok(Self {
            file_spec_major: major_minor[0],
            file_spec_minor: major_minor[1],
            bytes_headers,
            label,
            comment,
            period,
            timestamp_resolution,
            origin,
            channel_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CcHeader {
    pub electrode_id: u16,
    pub label: String,
    pub connector_id: u8,
    pub connector_pin: u8,
    pub min_digital: i16,
    pub max_digital: i16,
    pub min_analog: i16,
    pub max_analog: i16,
    pub units: String,
    pub high_freq_corner: u32,
    pub high_freq_order: u32,
    pub high_filter_type: u16,
    pub low_freq_corner: u32,
    pub low_freq_order: u32,
    pub low_filter_type: u16,
}

impl CcHeader {
    /// Scale factor converting a raw digital count to physical analog units.
    pub fn scale(&self) -> f64 {
        let digital_range = (self.max_digital as i64 - self.min_digital as i64) as f64;
        let analog_range = (self.max_analog as i64 - self.min_analog as i64) as f64;
        analog_range / digital_range
    }

    pub(crate) fn deserialize<R: Read>(r: &mut R) -> Result<Self, NsError> {
        let mut magic = [0u8; 2];
        r.read_exact(&mut magic)
            .map_err(|_| NsError::BadFile("short read decoding CC magic".to_string()))?;
        if &magic != b"CC" {
            return Err(NsError::BadFile(format!(
                "unknown extended header tag {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }

        let electrode_id = read_u16(r)?;
        let label = read_fixed_string(r, 16)?;
        let connector_id = read_u8(r)?;
        let connector_pin = read_u8(r)?;
        let min_digital = read_i16(r)?;
        let max_digital = read_i16(r)?;
        let min_analog = read_i16(r)?;
        let max_analog = read_i16(r)?;
        let units = read_fixed_string(r, 16)?;
        let high_freq_corner = read_u32(r)?;
        let high_freq_order = read_u32(r)?;
        let high_filter_type = read_u16(r)?;
        let low_freq_corner = read_u32(r)?;
        let low_freq_order = read_u32(r)?;
        let low_filter_type = read_u16(r)?;

        Ok(Self {
            electrode_id,
            label,
            connector_id,
            connector_pin,
            min_digital,
            max_digital,
            min_analog,
            max_analog,
            units,
            high_freq_corner,
            high_freq_order,
            high_filter_type,
            low_freq_corner,
            low_freq_order,
            low_filter_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packed_cc_header() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"CC");
        b.extend_from_slice(&5u16.to_le_bytes()); // electrode_id
        let mut label = b"chan5\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        label.resize(16, 0);
        b.extend_from_slice(&label);
        b.push(1); // connector_id
        b.push(2); // connector_pin
        b.extend_from_slice(&(-32768i16).to_le_bytes());
        b.extend_from_slice(&32767i16.to_le_bytes());
        b.extend_from_slice(&(-8192i16).to_le_bytes());
        b.extend_from_slice(&8191i16.to_le_bytes());
        let mut units = b"uV\0\0\0\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        units.resize(16, 0);
        b.extend_from_slice(&units);
        b.extend_from_slice(&500u32.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&7500u32.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        assert_eq!(b.len(), CC_HEADER_BYTES);
        b
    }

    #[test]
    fn deserialize_cc_header_and_scale() {
        let mut c = Cursor::new(packed_cc_header());
        let header = CcHeader::deserialize(&mut c).unwrap();
        assert_eq!(header.electrode_id, 5);
        assert_eq!(header.label, "chan5");
        assert_eq!(header.units, "uV");
        let scale = header.scale();
        assert!((scale - 0.25).abs() < 1e-9);
    }

    #[test]
    fn scale_from_spec_example_matches_4096_uv() {
        let header = CcHeader {
            electrode_id: 0,
            label: String::new(),
            connector_id: 0,
            connector_pin: 0,
            min_digital: -32768,
            max_digital: 32767,
            min_analog: -8192,
            max_analog: 8191,
            units: "uV".to_string(),
            high_freq_corner: 0,
            high_freq_order: 0,
            high_filter_type: 0,
            low_freq_corner: 0,
            low_freq_order: 0,
            low_filter_type: 0,
        };
        let raw_sample = 16384i16;
        let scaled = raw_sample as f64 * header.scale();
        assert!((scaled - 4096.0).abs() <= 0.25);
    }

    #[test]
    fn rejects_wrong_cc_magic() {
        let mut b = packed_cc_header();
        b[0] = b'X';
        let mut c = Cursor::new(b);
        assert!(matches!(
            CcHeader::deserialize(&mut c),
            Err(NsError::BadFile(_))
        ));
    }
}
