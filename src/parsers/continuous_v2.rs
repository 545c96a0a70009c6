//! Random-access reader for `NEURALCD` (continuous-sampling v2) files.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::decode::read_u32;
use crate::error::NsError;
use crate::headers::continuous_v2_header::{CcHeader, ContinuousV2Header, FIXED_PREFIX_BYTES};

pub(crate) const MAGIC: &[u8; 8] = crate::headers::continuous_v2_header::MAGIC;

/// Bytes consumed by a single data packet's own header: one tag byte plus two `u32` fields
/// (timestamp, sample count).
const PACKET_HEADER_BYTES: u64 = 9;

/// One contiguous run of interleaved samples within the data region, as found by the
/// packet-framing scan in `ContinuousV2Parser::open`. A recording pause emits a fresh packet (and
/// therefore a fresh segment) with its own timestamp; segments are contiguous in sample-index
/// space (`sample_offset`) even though they are not contiguous in byte space (each is preceded by
/// its own 9-byte packet header).
#[derive(Debug, Clone, Copy)]
struct PacketSegment {
    /// Byte offset of the first interleaved sample in this segment (i.e. just past its 9-byte
    /// packet header).
    data_offset: u64,
    /// Cumulative per-channel sample index at which this segment begins.
    sample_offset: usize,
    /// Per-channel sample count actually backed by bytes in the file (may be less than the
    /// packet's declared sample count if the file is truncated mid-packet).
    sample_count: usize,
}

pub struct ContinuousV2Parser {
    reader: BufReader<File>,
    pub header: ContinuousV2Header,
    pub cc_headers: Vec<CcHeader>,
    pub file_size: u64,
    pub samples_per_channel: usize,
    segments: Vec<PacketSegment>,
}

impl ContinuousV2Parser {
    /// Parses the basic header and per-channel `CC` headers, then scans the full data region for
    /// packet framing: a file may contain more than one data packet back-to-back (a recording
    /// pause emits a new packet with a fresh timestamp), each prefixed by its own 9-byte header.
    /// The scan builds an ordered list of packet segments so that `samples_per_channel` and
    /// random-access reads are correct across pause boundaries rather than assuming a single
    /// packet spans the whole data region. A packet whose declared sample count runs past the end
    /// of the file is truncated to the samples actually present, mirroring the event-file parser's
    /// tolerance of a short final row; the scan then stops.
    pub fn open(path: &Path) -> Result<Self, NsError> {
        let file = File::open(path)
            .map_err(|e| NsError::BadFile(format!("failed to open {}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);
        let header = ContinuousV2Header::deserialize(&mut reader)?;

        reader.seek(SeekFrom::Start(FIXED_PREFIX_BYTES as u64))?;
        let mut cc_headers = Vec::with_capacity(header.channel_count as usize);
        for _ in 0..header.channel_count {
            cc_headers.push(CcHeader::deserialize(&mut reader)?);
        }

        let file_size = reader.seek(SeekFrom::End(0))?;
        let channel_count = header.channel_count as usize;

        let mut segments = Vec::new();
        let mut cumulative = 0usize;
        if channel_count > 0 {
            let mut offset = header.bytes_headers as u64;
            loop {
                if offset >= file_size {
                    break;
                }
                reader.seek(SeekFrom::Start(offset))?;
                let mut tag = [0u8; 1];
                if reader.read_exact(&mut tag).is_err() {
                    break;
                }
                let _packet_timestamp = match read_u32(&mut reader) {
                    Ok(v) => v,
                    Err(_) => break,
                };
                let declared_count = match read_u32(&mut reader) {
                    Ok(v) => v as usize,
                    Err(_) => break,
                };

                let data_offset = offset + PACKET_HEADER_BYTES;
                let bytes_needed = (declared_count * channel_count * 2) as u64;
                let bytes_available = file_size.saturating_sub(data_offset);
                let actual_count = if bytes_available < bytes_needed {
                    (bytes_available as usize) / channel_count / 2
                } else {
                    declared_count
                };

                if actual_count > 0 {
                    segments.push(PacketSegment {
                        data_offset,
                        sample_offset: cumulative,
                        sample_count: actual_count,
                    });
                    cumulative += actual_count;
                }

                if actual_count < declared_count {
                    // Ran out of file mid-packet; no further packet header could follow.
                    break;
                }
                offset = data_offset + bytes_needed;
            }
        }
        let samples_per_channel = cumulative;

        Ok(Self {
            reader,
            header,
            cc_headers,
            file_size,
            samples_per_channel,
            segments,
        })
    }

    pub fn time_span_seconds(&self) -> f64 {
        self.samples_per_channel as f64 * self.header.period as f64
            / self.header.timestamp_resolution as f64
    }

    pub fn sample_frequency(&self) -> f64 {
        self.header.timestamp_resolution as f64 / self.header.period as f64
    }

    /// Reads up to `count` raw (unscaled) samples of `channel` starting at `start`. Scaling to
    /// physical units is the caller's responsibility (see the analog entity). Walks the packet
    /// segment list built at `open` time, so a requested range may be satisfied by more than one
    /// data packet, concatenating across pause boundaries transparently. A read that runs past the
    /// end of the last segment returns a truncated buffer rather than failing.
    pub fn read_channel_samples(
        &mut self,
        channel: usize,
        start: usize,
        count: usize,
    ) -> Result<Vec<f64>, NsError> {
        let channel_count = self.header.channel_count as usize;
        if channel >= channel_count {
            return Err(NsError::BadIndex(format!(
                "channel {} out of range (count {})",
                channel, channel_count
            )));
        }

        let target = start + count;
        let mut cursor = start;
        let mut out = Vec::with_capacity(count);

        for seg in &self.segments {
            if cursor >= target {
                break;
            }
            let seg_end = seg.sample_offset + seg.sample_count;
            if cursor >= seg_end {
                continue;
            }

            let local_start = cursor - seg.sample_offset;
            let take = (seg.sample_count - local_start).min(target - cursor);

            let offset = seg.data_offset + (local_start * channel_count + channel) as u64 * 2;
            self.reader.seek(SeekFrom::Start(offset))?;
            let skip = ((channel_count - 1) * 2) as i64;

            for i in 0..take {
                let mut buf = [0u8; 2];
                match self.reader.read_exact(&mut buf) {
                    Ok(()) => out.push(i16::from_le_bytes(buf) as f64),
                    Err(_) => return Ok(out),
                }
                if i + 1 < take {
                    self.reader.seek(SeekFrom::Current(skip))?;
                }
            }
            cursor += take;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_cc(electrode_id: u16, min_dig: i16, max_dig: i16, min_an: i16, max_an: i16) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"CC");
        b.extend_from_slice(&electrode_id.to_le_bytes());
        let mut label = b"chan".to_vec();
        label.resize(16, 0);
        b.extend_from_slice(&label);
        b.push(1);
        b.push(2);
        b.extend_from_slice(&min_dig.to_le_bytes());
        b.extend_from_slice(&max_dig.to_le_bytes());
        b.extend_from_slice(&min_an.to_le_bytes());
        b.extend_from_slice(&max_an.to_le_bytes());
        let mut units = b"uV".to_vec();
        units.resize(16, 0);
        b.extend_from_slice(&units);
        b.extend_from_slice(&500u32.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&7500u32.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b
    }

    fn packed_file(channel_count: u32, period: u32, resolution: u32, samples: &[Vec<i16>]) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"NEURALCD");
        b.push(2);
        b.push(3);
        let bytes_headers = FIXED_PREFIX_BYTES as u32 + channel_count * 66;
        b.extend_from_slice(&bytes_headers.to_le_bytes());
        let mut label = b"array".to_vec();
        label.resize(16, 0);
        b.extend_from_slice(&label);
        b.extend_from_slice(&[0u8; 256]);
        b.extend_from_slice(&period.to_le_bytes());
        b.extend_from_slice(&resolution.to_le_bytes());
        for f in [2019u16, 3, 4, 14, 13, 45, 30, 0] {
            b.extend_from_slice(&f.to_le_bytes());
        }
        b.extend_from_slice(&channel_count.to_le_bytes());
        assert_eq!(b.len(), FIXED_PREFIX_BYTES);

        for c in 0..channel_count {
            b.extend_from_slice(&packed_cc(c as u16, -32768, 32767, -8192, 8191));
        }

        // single data packet: tag + timestamp + sample count, then interleaved samples
        b.push(1);
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        for row in samples {
            for v in row {
                b.extend_from_slice(&v.to_le_bytes());
            }
        }
        b
    }

    fn write_temp(name: &str, data: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ns-rs-ns2-test-{}-{}", std::process::id(), name));
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn reads_interleaved_channel_samples_and_scales() {
        let samples = vec![vec![16384, -100], vec![8192, -200], vec![0, -300]];
        let data = packed_file(2, 30, 30000, &samples);
        let path = write_temp("interleave", &data);
        let mut parser = ContinuousV2Parser::open(&path).unwrap();
        // The packet-framing scan strips the 9-byte intra-stream packet header out of the count,
        // so the 3 real samples per channel present in this single data packet are counted exactly.
        assert_eq!(parser.samples_per_channel, 3);
        assert_eq!(parser.cc_headers.len(), 2);

        let ch0 = parser.read_channel_samples(0, 0, 3).unwrap();
        assert_eq!(ch0, vec![16384.0, 8192.0, 0.0]);

        let scale = parser.cc_headers[0].scale();
        let scaled = ch0[0] * scale;
        assert!((scaled - 4096.0).abs() <= 0.25);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn truncated_read_returns_short_buffer() {
        let samples = vec![vec![1, 2], vec![3, 4]];
        let data = packed_file(2, 30, 30000, &samples);
        let path = write_temp("truncated", &data);
        let mut parser = ContinuousV2Parser::open(&path).unwrap();
        let result = parser.read_channel_samples(0, 0, 10).unwrap();
        assert_eq!(result, vec![1.0, 3.0]);
        let _ = std::fs::remove_file(&path);
    }

    /// Writes a header followed by two back-to-back data packets (simulating a recording pause),
    /// each with its own 9-byte packet header.
    fn packed_file_with_pause(
        channel_count: u32,
        first: &[Vec<i16>],
        second: &[Vec<i16>],
    ) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"NEURALCD");
        b.push(2);
        b.push(3);
        let bytes_headers = FIXED_PREFIX_BYTES as u32 + channel_count * 66;
        b.extend_from_slice(&bytes_headers.to_le_bytes());
        let mut label = b"array".to_vec();
        label.resize(16, 0);
        b.extend_from_slice(&label);
        b.extend_from_slice(&[0u8; 256]);
        b.extend_from_slice(&30u32.to_le_bytes());
        b.extend_from_slice(&30000u32.to_le_bytes());
        for f in [2019u16, 3, 4, 14, 13, 45, 30, 0] {
            b.extend_from_slice(&f.to_le_bytes());
        }
        b.extend_from_slice(&channel_count.to_le_bytes());
        assert_eq!(b.len(), FIXED_PREFIX_BYTES);

        for c in 0..channel_count {
            b.extend_from_slice(&packed_cc(c as u16, -32768, 32767, -8192, 8191));
        }

        for (packet_timestamp, rows) in [(0u32, first), (1000u32, second)] {
            b.push(1);
            b.extend_from_slice(&packet_timestamp.to_le_bytes());
            b.extend_from_slice(&(rows.len() as u32).to_le_bytes());
            for row in rows {
                for v in row {
                    b.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        b
    }

    #[test]
    fn multi_packet_scan_spans_pause_boundary() {
        let first = vec![vec![1, -1], vec![2, -2]];
        let second = vec![vec![3, -3], vec![4, -4], vec![5, -5]];
        let data = packed_file_with_pause(2, &first, &second);
        let path = write_temp("pause", &data);
        let mut parser = ContinuousV2Parser::open(&path).unwrap();

        assert_eq!(parser.samples_per_channel, 5);

        let ch0 = parser.read_channel_samples(0, 0, 5).unwrap();
        assert_eq!(ch0, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        // A range crossing the pause boundary (samples 1..=3) concatenates across segments.
        let mid = parser.read_channel_samples(0, 1, 3).unwrap();
        assert_eq!(mid, vec![2.0, 3.0, 4.0]);

        let ch1 = parser.read_channel_samples(1, 0, 5).unwrap();
        assert_eq!(ch1, vec![-1.0, -2.0, -3.0, -4.0, -5.0]);
        let _ = std::fs::remove_file(&path);
    }
}
