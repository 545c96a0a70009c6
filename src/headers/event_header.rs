//! Basic header and extended header layouts for `NEURALEV` event/spike files.

use std::io::{Read, Seek, SeekFrom};

use chrono::NaiveDateTime;

use crate::decode::{read_fixed_string, read_system_timestamp, read_u16, read_u32, read_u8};
use crate::error::NsError;

pub(crate) const MAGIC: &[u8; 8] = b"NEURALEV";
pub(crate) const BASIC_HEADER_BYTES: usize = 336;
pub(crate) const EXTENDED_HEADER_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct EventBasicHeader {
    pub file_spec_major: u8,
    pub file_spec_minor: u8,
    pub additional_flags: u16,
    pub bytes_headers: u32,
    pub bytes_data_packet: u32,
    pub timestamp_resolution: u32,
    pub sample_resolution: u32,
    pub origin: NaiveDateTime,
    pub application: String,
    pub comment: String,
    pub extended_header_count: u32,
}

impl EventBasicHeader {
    pub(crate) fn deserialize<R: Read + Seek>(r: &mut R) -> Result<Self, NsError> {
        r.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| NsError::BadFile("short read decoding NEURALEV magic".to_string()))?;
        if &magic != MAGIC {
            return Err(NsError::BadFile(
                "expected NEURALEV magic in basic header".to_string(),
            ));
        }

        let file_spec_major = read_u8(r)?;
        let file_spec_minor = read_u8(r)?;
        let additional_flags = read_u16(r)?;
        let bytes_headers = read_u32(r)?;
        let bytes_data_packet = read_u32(r)?;
        let timestamp_resolution = read_u32(r)?;
        let sample_resolution = read_u32(r)?;
        let origin = read_system_timestamp(r)?;
        let application = read_fixed_string(r, 32)?;
        let comment = read_fixed_string(r, 256)?;
        let extended_header_count = read_u32(r)?;

        Ok(Self {
            file_spec_major,
            file_spec_minor,
            additional_flags,
            bytes_headers,
            bytes_data_packet,
            timestamp_resolution,
            sample_resolution,
            origin,
            application,
            comment,
            extended_header_count,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedHeader {
    NeuevWav {
        packet_id: u16,
        physical_connector: u8,
        connector_pin: u8,
        digitization_factor: u16,
        energy_threshold: u16,
        high_threshold: i16,
        low_threshold: i16,
        sorted_unit_count: u8,
        bytes_per_waveform: u8,
    },
    NeuevLbl {
        packet_id: u16,
        label: String,
    },
    NeuevFlt {
        packet_id: u16,
        high_freq_corner: u32,
        high_freq_order: u32,
        high_filter_type: u16,
        low_freq_corner: u32,
        low_freq_order: u32,
        low_filter_type: u16,
    },
    DigLabel {
        label: String,
        mode: u8,
    },
}

impl ExtendedHeader {
    pub(crate) fn deserialize<R: Read>(r: &mut R) -> Result<Self, NsError> {
        let mut tag = [0u8; 8];
        r.read_exact(&mut tag).map_err(|_| {
            NsError::BadFile("short read decoding extended header tag".to_string())
        })?;

        match &tag {
            b"NEUEVWAV" => {
                let packet_id = read_u16(r)?;
                let physical_connector = read_u8(r)?;
                let connector_pin = read_u8(r)?;
                let digitization_factor = read_u16(r)?;
                let energy_threshold = read_u16(r)?;
                let high_threshold = read_u16(r)? as i16;
                let low_threshold = read_u16(r)? as i16;
                let sorted_unit_count = read_u8(r)?;
                let bytes_per_waveform = read_u8(r)?;
                // remaining bytes in this 32-byte record are reserved padding.
                let mut reserved = [0u8; 10];
                r.read_exact(&mut reserved).map_err(|_| {
                    NsError::BadFile("short read decoding NEUEVWAV padding".to_string())
                })?;
                Ok(Self::NeuevWav {
                    packet_id,
                    physical_connector,
                    connector_pin,
                    digitization_factor,
                    energy_threshold,
                    high_threshold,
                    low_threshold,
                    sorted_unit_count,
                    bytes_per_waveform,
                })
            }
            b"NEUEVLBL" => {
                let packet_id = read_u16(r)?;
                let label = read_fixed_string(r, 16)?;
                let mut reserved = [0u8; 6];
                r.read_exact(&mut reserved).map_err(|_| {
                    NsError::BadFile("short read decoding NEUEVLBL padding".to_string())
                })?;
                Ok(Self::NeuevLbl { packet_id, label })
            }
            b"NEUEVFLT" => {
                let packet_id = read_u16(r)?;
                let high_freq_corner = read_u32(r)?;
                let high_freq_order = read_u32(r)?;
                let high_filter_type = read_u16(r)?;
                let low_freq_corner = read_u32(r)?;
                let low_freq_order = read_u32(r)?;
                let low_filter_type = read_u16(r)?;
                let mut reserved = [0u8; 2];
                r.read_exact(&mut reserved).map_err(|_| {
                    NsError::BadFile("short read decoding NEUEVFLT padding".to_string())
                })?;
                Ok(Self::NeuevFlt {
                    packet_id,
                    high_freq_corner,
                    high_freq_order,
                    high_filter_type,
                    low_freq_corner,
                    low_freq_order,
                    low_filter_type,
                })
            }
            b"DIGLABEL" => {
                let label = read_fixed_string(r, 16)?;
                let mode = read_u8(r)?;
                let mut reserved = [0u8; 7];
                r.read_exact(&mut reserved).map_err(|_| {
                    NsError::BadFile("short read decoding DIGLABEL padding".to_string())
                })?;
                Ok(Self::DigLabel { label, mode })
            }
            other => Err(NsError::BadFile(format!(
                "unknown extended header tag {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packed_basic_header() -> Vec<u8> {
        let mut b = Vec::with_capacity(BASIC_HEADER_BYTES);
        b.extend_from_slice(b"NEURALEV");
        b.push(2); // major
        b.push(3); // minor
        b.extend_from_slice(&0u16.to_le_bytes()); // flags
        b.extend_from_slice(&(336u32 + 2 * 32).to_le_bytes()); // bytes_headers
        b.extend_from_slice(&104u32.to_le_bytes()); // bytes_data_packet
        b.extend_from_slice(&30000u32.to_le_bytes()); // timestamp_resolution
        b.extend_from_slice(&30000u32.to_le_bytes()); // sample_resolution
        for f in [2019u16, 3, 4, 14, 13, 45, 30, 0] {
            b.extend_from_slice(&f.to_le_bytes());
        }
        b.extend_from_slice(&[0u8; 32]); // application
        b.extend_from_slice(&[0u8; 256]); // comment
        b.extend_from_slice(&2u32.to_le_bytes()); // extended_header_count
        assert_eq!(b.len(), BASIC_HEADER_BYTES);
        b
    }

    #[test]
    fn deserialize_basic_header() {
        let mut c = Cursor::new(packed_basic_header());
        let header = EventBasicHeader::deserialize(&mut c).unwrap();
        assert_eq!(header.file_spec_major, 2);
        assert_eq!(header.file_spec_minor, 3);
        assert_eq!(header.bytes_data_packet, 104);
        assert_eq!(header.timestamp_resolution, 30000);
        assert_eq!(header.extended_header_count, 2);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut data = packed_basic_header();
        data[0] = b'X';
        let mut c = Cursor::new(data);
        assert!(matches!(
            EventBasicHeader::deserialize(&mut c),
            Err(NsError::BadFile(_))
        ));
    }

    #[test]
    fn deserialize_neuevwav() {
        let mut b = Vec::new();
        b.extend_from_slice(b"NEUEVWAV");
        b.extend_from_slice(&1u16.to_le_bytes()); // packet_id
        b.push(1); // physical connector
        b.push(2); // pin
        b.extend_from_slice(&152u16.to_le_bytes()); // digitization_factor
        b.extend_from_slice(&0u16.to_le_bytes()); // energy threshold
        b.extend_from_slice(&100i16.to_le_bytes()); // high threshold
        b.extend_from_slice(&(-100i16).to_le_bytes()); // low threshold
        b.push(3); // sorted unit count
        b.push(96); // bytes per waveform
        b.extend_from_slice(&[0u8; 10]);
        assert_eq!(b.len(), EXTENDED_HEADER_BYTES);

        let mut c = Cursor::new(b);
        match ExtendedHeader::deserialize(&mut c).unwrap() {
            ExtendedHeader::NeuevWav {
                packet_id,
                sorted_unit_count,
                high_threshold,
                low_threshold,
                ..
            } => {
                assert_eq!(packet_id, 1);
                assert_eq!(sorted_unit_count, 3);
                assert_eq!(high_threshold, 100);
                assert_eq!(low_threshold, -100);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_tag_is_bad_file() {
        let mut b = vec![0u8; EXTENDED_HEADER_BYTES];
        b[..8].copy_from_slice(b"BOGUSTAG");
        let mut c = Cursor::new(b);
        assert!(matches!(
            ExtendedHeader::deserialize(&mut c),
            Err(NsError::BadFile(_))
        ));
    }
}
