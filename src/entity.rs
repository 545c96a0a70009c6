//! The heterogeneous entity model: segment, event, neural, and analog entities, each addressable
//! by a stable index within the owning session's entity list.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::NsError;
use crate::parsers::continuous_v1::ContinuousV1Parser;
use crate::parsers::continuous_v2::ContinuousV2Parser;
use crate::parsers::event::{DataPacket, EventParser};

/// Selects which side of a timestamp query to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSearchMode {
    /// Greatest index with time <= the query.
    Before,
    /// Index whose time equals the query exactly; fails otherwise.
    At,
    /// Least index with time >= the query.
    After,
}

/// `(timestamp_ticks, packet_ordinal)` pairs accumulated during ingest. Append-only; timestamps
/// are non-decreasing so that bisection search is exact, enforced by [`IndexTable::try_push`]
/// at ingest time rather than merely assumed.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct IndexTable {
    timestamps: Vec<u32>,
    packet_ordinals: Vec<u32>,
}

impl IndexTable {
    pub(crate) fn push(&mut self, timestamp: u32, packet_ordinal: u32) {
        self.timestamps.push(timestamp);
        self.packet_ordinals.push(packet_ordinal);
    }

    /// Like [`IndexTable::push`], but fails with `BadFile` if `timestamp` would break the
    /// non-decreasing invariant bisection search relies on.
    pub(crate) fn try_push(&mut self, timestamp: u32, packet_ordinal: u32) -> Result<(), NsError> {
        if let Some(&last) = self.timestamps.last() {
            if timestamp < last {
                return Err(NsError::BadFile(format!(
                    "non-monotonic timestamp {} follows {} in index table",
                    timestamp, last
                )));
            }
        }
        self.push(timestamp, packet_ordinal);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub(crate) fn ordinal_at(&self, i: usize) -> Option<u32> {
        self.packet_ordinals.get(i).copied()
    }

    pub(crate) fn timestamp_at(&self, i: usize) -> Option<u32> {
        self.timestamps.get(i).copied()
    }

    /// Lower-bound bisection against the non-decreasing `timestamps` column.
    pub(crate) fn find(&self, target_ticks: u32, mode: TimeSearchMode) -> Result<usize, NsError> {
        if self.timestamps.is_empty() {
            return Err(NsError::BadIndex(
                "time-by-index lookup against an empty index table".to_string(),
            ));
        }

        let lower = self.timestamps.partition_point(|&t| t < target_ticks);
        match mode {
            TimeSearchMode::At => {
                if lower < self.timestamps.len() && self.timestamps[lower] == target_ticks {
                    Ok(lower)
                } else {
                    Err(NsError::BadIndex(format!(
                        "no exact timestamp match for tick {}",
                        target_ticks
                    )))
                }
            }
            TimeSearchMode::After => {
                if lower < self.timestamps.len() {
                    Ok(lower)
                } else {
                    Err(NsError::BadIndex(
                        "no timestamp at or after the requested time".to_string(),
                    ))
                }
            }
            TimeSearchMode::Before => {
                if lower < self.timestamps.len() && self.timestamps[lower] == target_ticks {
                    Ok(lower)
                } else if lower == 0 {
                    Err(NsError::BadIndex(
                        "no timestamp at or before the requested time".to_string(),
                    ))
                } else {
                    Ok(lower - 1)
                }
            }
        }
    }
}

pub(crate) fn ticks_from_seconds(t: f64, resolution: u32) -> u32 {
    (t * resolution as f64).round().clamp(0.0, u32::MAX as f64) as u32
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub timestamp_seconds: f64,
    pub digital_input: u16,
    pub inputs: [i16; 5],
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentData {
    pub timestamp_seconds: f64,
    pub unit_class: u8,
    pub waveform: Vec<i16>,
}

pub struct SegmentEntity {
    pub electrode_id: u16,
    pub label: Option<String>,
    pub(crate) parser: Rc<RefCell<EventParser>>,
    pub(crate) index: IndexTable,
    pub(crate) resolution: u32,
}

pub struct EventEntity {
    pub reason: u8,
    pub(crate) parser: Rc<RefCell<EventParser>>,
    pub(crate) index: IndexTable,
    pub(crate) resolution: u32,
}

/// Shares its parent segment entity's underlying parser; the filtered index (this electrode's
/// packets restricted to `unit_class`) is pre-materialized at ingest rather than filtered on
/// every query.
pub struct NeuralEntity {
    pub electrode_id: u16,
    pub unit_class: u8,
    pub(crate) parser: Rc<RefCell<EventParser>>,
    pub(crate) index: IndexTable,
    pub(crate) resolution: u32,
}

pub(crate) enum AnalogParser {
    V1(Rc<RefCell<ContinuousV1Parser>>),
    V2(Rc<RefCell<ContinuousV2Parser>>),
}

pub struct AnalogEntity {
    pub electrode_id: u32,
    pub units: String,
    pub label: Option<String>,
    pub channel_index: usize,
    /// Converts a raw digital sample to physical units: `min/max_analog / min/max_digital` for
    /// continuous-v2 channels, `1.0` (no conversion) for continuous-v1 channels.
    pub scale: f64,
    pub(crate) parser: AnalogParser,
    pub(crate) sample_count: usize,
    pub(crate) sample_freq: f64,
}

impl AnalogEntity {
    pub fn sample_frequency(&self) -> f64 {
        self.sample_freq
    }
}

pub enum Entity {
    Segment(SegmentEntity),
    Event(EventEntity),
    Neural(NeuralEntity),
    Analog(AnalogEntity),
}

impl Entity {
    pub fn item_count(&self) -> usize {
        match self {
            Self::Segment(e) => e.index.len(),
            Self::Event(e) => e.index.len(),
            Self::Neural(e) => e.index.len(),
            Self::Analog(e) => e.sample_count,
        }
    }

    pub fn get_time_by_index(&self, i: usize) -> Result<f64, NsError> {
        match self {
            Self::Segment(e) => index_time(&e.index, e.resolution, i),
            Self::Event(e) => index_time(&e.index, e.resolution, i),
            Self::Neural(e) => index_time(&e.index, e.resolution, i),
            Self::Analog(e) => {
                if i >= e.sample_count {
                    return Err(NsError::BadIndex(format!(
                        "analog sample index {} out of range (count {})",
                        i, e.sample_count
                    )));
                }
                Ok(i as f64 / e.sample_freq)
            }
        }
    }

    pub fn get_index_by_time(&self, t: f64, mode: TimeSearchMode) -> Result<usize, NsError> {
        match self {
            Self::Segment(e) => e.index.find(ticks_from_seconds(t, e.resolution), mode),
            Self::Event(e) => e.index.find(ticks_from_seconds(t, e.resolution), mode),
            Self::Neural(e) => e.index.find(ticks_from_seconds(t, e.resolution), mode),
            Self::Analog(e) => analog_index_by_time(e, t, mode),
        }
    }

    pub fn get_event_data(&self, i: usize) -> Result<EventData, NsError> {
        let Self::Event(e) = self else {
            return Err(NsError::BadEntity(
                "get_event_data called on a non-event entity".to_string(),
            ));
        };
        let ordinal = e.index.ordinal_at(i).ok_or_else(|| {
            NsError::BadIndex(format!("event index {} out of range", i))
        })?;
        let packet = e.parser.borrow_mut().read_packet(ordinal as usize)?;
        match packet {
            DataPacket::Event {
                timestamp,
                digital_input,
                inputs,
                ..
            } => Ok(EventData {
                timestamp_seconds: timestamp as f64 / e.resolution as f64,
                digital_input,
                inputs,
            }),
            DataPacket::Segment { .. } => Err(NsError::LibError(
                "event entity's index pointed at a spike packet".to_string(),
            )),
        }
    }

    pub fn get_segment_data(&self, i: usize) -> Result<SegmentData, NsError> {
        let Self::Segment(e) = self else {
            return Err(NsError::BadEntity(
                "get_segment_data called on a non-segment entity".to_string(),
            ));
        };
        let ordinal = e.index.ordinal_at(i).ok_or_else(|| {
            NsError::BadIndex(format!("segment index {} out of range", i))
        })?;
        let packet = e.parser.borrow_mut().read_packet(ordinal as usize)?;
        match packet {
            DataPacket::Segment {
                timestamp,
                unit_class,
                waveform,
                ..
            } => Ok(SegmentData {
                timestamp_seconds: timestamp as f64 / e.resolution as f64,
                unit_class,
                waveform,
            }),
            DataPacket::Event { .. } => Err(NsError::LibError(
                "segment entity's index pointed at an event packet".to_string(),
            )),
        }
    }

    /// `count = None` reads to the end of the channel's data.
    pub fn get_analog_data(&self, start: usize, count: Option<usize>) -> Result<Vec<f64>, NsError> {
        let Self::Analog(e) = self else {
            return Err(NsError::BadEntity(
                "get_analog_data called on a non-analog entity".to_string(),
            ));
        };
        let n = count.unwrap_or_else(|| e.sample_count.saturating_sub(start));
        let raw = match &e.parser {
            AnalogParser::V1(p) => p.borrow_mut().read_channel_samples(e.channel_index, start, n)?,
            AnalogParser::V2(p) => p.borrow_mut().read_channel_samples(e.channel_index, start, n)?,
        };
        Ok(raw.into_iter().map(|v| v * e.scale).collect())
    }
}

fn index_time(index: &IndexTable, resolution: u32, i: usize) -> Result<f64, NsError> {
    let ticks = index
        .timestamp_at(i)
        .ok_or_else(|| NsError::BadIndex(format!("index {} out of range", i)))?;
    Ok(ticks as f64 / resolution as f64)
}

fn analog_index_by_time(e: &AnalogEntity, t: f64, mode: TimeSearchMode) -> Result<usize, NsError> {
    let raw = t * e.sample_freq;
    let idx = match mode {
        TimeSearchMode::Before => raw.floor(),
        TimeSearchMode::After => raw.ceil(),
        TimeSearchMode::At => {
            let rounded = raw.round();
            if (raw - rounded).abs() > 1e-6 {
                return Err(NsError::BadIndex(format!(
                    "no analog sample exactly at time {}",
                    t
                )));
            }
            rounded
        }
    };
    if idx < 0.0 || idx as usize >= e.sample_count {
        return Err(NsError::BadIndex(format!(
            "time {} resolves to an out-of-range analog sample",
            t
        )));
    }
    Ok(idx as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_table_bisection_modes() {
        let mut idx = IndexTable::default();
        idx.push(10, 0);
        idx.push(10, 1);
        idx.push(20, 2);
        idx.push(40, 3);

        assert_eq!(idx.find(20, TimeSearchMode::At).unwrap(), 2);
        assert!(idx.find(30, TimeSearchMode::At).is_err());
        assert_eq!(idx.find(30, TimeSearchMode::Before).unwrap(), 2);
        assert_eq!(idx.find(30, TimeSearchMode::After).unwrap(), 3);
        assert!(idx.find(5, TimeSearchMode::Before).is_err());
        assert!(idx.find(50, TimeSearchMode::After).is_err());
    }

    #[test]
    fn index_table_before_prefers_exact_match_not_predecessor() {
        let mut idx = IndexTable::default();
        idx.push(5, 0);
        idx.push(10, 1);
        assert_eq!(idx.find(10, TimeSearchMode::Before).unwrap(), 1);
    }

    #[test]
    fn ticks_from_seconds_round_trips() {
        let resolution = 30000u32;
        let ticks = 123456u32;
        let seconds = ticks as f64 / resolution as f64;
        assert_eq!(ticks_from_seconds(seconds, resolution), ticks);
    }
}
