//! Random-access reader for `NEURALSG` (continuous-sampling v1) files.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::NsError;
use crate::headers::continuous_v1_header::ContinuousV1Header;

pub(crate) const MAGIC: &[u8; 8] = crate::headers::continuous_v1_header::MAGIC;

/// Fixed by format definition; `NEURALSG` files never store this value.
pub const TIMESTAMP_RESOLUTION: u32 = 30000;

pub struct ContinuousV1Parser {
    reader: BufReader<File>,
    pub header: ContinuousV1Header,
    pub file_size: u64,
    pub samples_per_channel: usize,
}

impl ContinuousV1Parser {
    pub fn open(path: &Path) -> Result<Self, NsError> {
        let file = File::open(path)
            .map_err(|e| NsError::BadFile(format!("failed to open {}: {}", path.display(), e)))?;
        let mut reader = BufReader::new(file);
        let header = ContinuousV1Header::deserialize(&mut reader)?;

        let file_size = reader.seek(SeekFrom::End(0))?;
        let samples_per_channel = if header.channel_count == 0 {
            0
        } else {
            ((file_size.saturating_sub(header.header_bytes as u64)) / 2
                / header.channel_count as u64) as usize
        };

        Ok(Self {
            reader,
            header,
            file_size,
            samples_per_channel,
        })
    }

    pub fn time_span_seconds(&self) -> f64 {
        self.samples_per_channel as f64 * self.header.period as f64 / TIMESTAMP_RESOLUTION as f64
    }

    pub fn sample_frequency(&self) -> f64 {
        TIMESTAMP_RESOLUTION as f64 / self.header.period as f64
    }

    /// Reads up to `count` contiguous samples of `channel` starting at `start`. Samples are
    /// interleaved, so each read is followed by a seek of `(channel_count - 1) * 2` bytes to the
    /// next occurrence of this channel. A read that hits end-of-file mid-range returns a
    /// truncated buffer rather than failing.
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

        let offset =
            self.header.header_bytes as u64 + (start * channel_count + channel) as u64 * 2;
        self.reader.seek(SeekFrom::Start(offset))?;

        let skip = ((channel_count - 1) * 2) as i64;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buf = [0u8; 2];
            match self.reader.read_exact(&mut buf) {
                Ok(()) => samples.push(i16::from_le_bytes(buf) as f64),
                Err(_) => break,
            }
            if samples.len() < count {
                self.reader.seek(SeekFrom::Current(skip))?;
            }
        }
        Ok(samples)
    }
}
