//! Recording session: sibling discovery, single-pass ingest, and the ordered entity list.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::NaiveDateTime;

use crate::entity::{
    AnalogEntity, AnalogParser, Entity, EventEntity, IndexTable, NeuralEntity, SegmentEntity,
};
use crate::error::NsError;
use crate::headers::event_header::ExtendedHeader;
use crate::parsers::continuous_v1::ContinuousV1Parser;
use crate::parsers::continuous_v2::ContinuousV2Parser;
use crate::parsers::event::{DataPacket, EventParser};
use crate::parsers::{detect_format, FileFormat};

/// Associates an opened file with its format-specific parser and the observed time span of its
/// contents. The 8-byte magic determines the tag exactly; there is no heuristic upgrade.
enum FileHandle {
    Event(Rc<RefCell<EventParser>>),
    ContinuousV1(Rc<RefCell<ContinuousV1Parser>>),
    ContinuousV2(Rc<RefCell<ContinuousV2Parser>>),
}

impl FileHandle {
    fn format_tag(&self) -> &'static str {
        match self {
            Self::Event(_) => "NEURALEV",
            Self::ContinuousV1(_) => "NEURALSG",
            Self::ContinuousV2(_) => "NEURALCD",
        }
    }
}

pub struct RecordingSession {
    files: Vec<FileHandle>,
    entities: Vec<Entity>,
    pub origin: Option<NaiveDateTime>,
    pub timestamp_resolution: f64,
    pub time_span: f64,
    pub file_type: String,
    pub application: String,
    pub comment: String,
}

/// Session-level summary record returned by [`RecordingSession::file_info`], supplementing the
/// bare fields on `RecordingSession` itself with the `application`/`comment` strings sourced from
/// the event file's basic header (empty when no event file is present).
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub entity_count: usize,
    pub file_type: String,
    pub timestamp_resolution: f64,
    pub time_span: f64,
    pub origin: Option<NaiveDateTime>,
    pub application: String,
    pub comment: String,
}

impl RecordingSession {
    /// Discovers `basename.nev` and `basename.ns[1-9]` next to `path`, parses every sibling, and
    /// builds the ordered entity list.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NsError> {
        Self::open_impl(path.as_ref(), false)
    }

    /// Opens only the exact file at `path`, without discovering siblings.
    pub fn open_single(path: impl AsRef<Path>) -> Result<Self, NsError> {
        Self::open_impl(path.as_ref(), true)
    }

    fn open_impl(path: &Path, proc_single: bool) -> Result<Self, NsError> {
        let sibling_paths = discover_siblings(path, proc_single)?;

        let mut files = Vec::new();
        let mut entities = Vec::new();
        let mut origin = None;
        let mut timestamp_resolution = 0.0;
        let mut time_span = 0.0f64;
        let mut has_event = false;
        let mut has_continuous = false;
        let mut continuous_fallback_set = false;
        let mut application = String::new();
        let mut comment = String::new();

        for sibling in &sibling_paths {
            match detect_format(sibling)? {
                FileFormat::EventFile => {
                    has_event = true;
                    let parser = EventParser::open(sibling)?;
                    origin = Some(parser.header.origin);
                    timestamp_resolution = parser.header.timestamp_resolution as f64;
                    application = parser.header.application.clone();
                    comment = parser.header.comment.clone();
                    let parser_rc = Rc::new(RefCell::new(parser));
                    let (mut file_entities, file_time_span) = ingest_event_file(&parser_rc)?;
                    time_span = time_span.max(file_time_span);
                    entities.append(&mut file_entities);
                    files.push(FileHandle::Event(parser_rc));
                }
                FileFormat::ContinuousV1 => {
                    has_continuous = true;
                    let parser = ContinuousV1Parser::open(sibling)?;
                    if !has_event && !continuous_fallback_set {
                        timestamp_resolution =
                            crate::parsers::continuous_v1::TIMESTAMP_RESOLUTION as f64;
                        continuous_fallback_set = true;
                    }
                    let parser_rc = Rc::new(RefCell::new(parser));
                    let (mut file_entities, file_time_span) = ingest_continuous_v1(&parser_rc);
                    time_span = time_span.max(file_time_span);
                    entities.append(&mut file_entities);
                    files.push(FileHandle::ContinuousV1(parser_rc));
                }
                FileFormat::ContinuousV2 => {
                    has_continuous = true;
                    let parser = ContinuousV2Parser::open(sibling)?;
                    if !has_event && !continuous_fallback_set {
                        origin = Some(parser.header.origin);
                        timestamp_resolution = parser.header.timestamp_resolution as f64;
                        continuous_fallback_set = true;
                    }
                    let parser_rc = Rc::new(RefCell::new(parser));
                    let (mut file_entities, file_time_span) = ingest_continuous_v2(&parser_rc);
                    time_span = time_span.max(file_time_span);
                    entities.append(&mut file_entities);
                    files.push(FileHandle::ContinuousV2(parser_rc));
                }
            }
        }

        let file_type = match (has_event, has_continuous) {
            (true, true) => "NEURALEV+ NEURAL".to_string(),
            (true, false) => "NEURALEV".to_string(),
            (false, true) => "NEURAL".to_string(),
            (false, false) => String::new(),
        };

        Ok(Self {
            files,
            entities: reorder_entities(entities),
            origin,
            timestamp_resolution,
            time_span,
            file_type,
            application,
            comment,
        })
    }

    /// Returns a plain owned summary of the session's aggregate metadata.
    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            entity_count: self.entity_count(),
            file_type: self.file_type.clone(),
            timestamp_resolution: self.timestamp_resolution,
            time_span: self.time_span,
            origin: self.origin,
            application: self.application.clone(),
            comment: self.comment.clone(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, index: usize) -> Result<&Entity, NsError> {
        self.entities
            .get(index)
            .ok_or_else(|| NsError::BadEntity(format!("entity index {} out of range", index)))
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn has_file_type(&self, magic: &str) -> bool {
        self.files.iter().any(|f| f.format_tag() == magic)
    }
}

fn discover_siblings(path: &Path, proc_single: bool) -> Result<Vec<PathBuf>, NsError> {
    if proc_single {
        return if path.exists() {
            Ok(vec![path.to_path_buf()])
        } else {
            Err(NsError::BadFile(format!(
                "input file does not exist: {}",
                path.display()
            )))
        };
    }

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir: &Path = dir.unwrap_or_else(|| Path::new("."));
    let stem = path
        .file_stem()
        .ok_or_else(|| NsError::BadFile(format!("path has no file stem: {}", path.display())))?
        .to_string_lossy()
        .into_owned();

    let mut found = Vec::new();
    let nev = dir.join(format!("{}.nev", stem));
    if nev.exists() {
        found.push(nev);
    }
    for n in 1..=9 {
        let candidate = dir.join(format!("{}.ns{}", stem, n));
        if candidate.exists() {
            found.push(candidate);
        }
    }

    if found.is_empty() {
        return Err(NsError::BadFile(format!(
            "could not find any .nev or .ns[1-9] files matching {}",
            path.display()
        )));
    }
    Ok(found)
}

/// Single-pass ingest of an event file's extended headers then data packets, producing segment,
/// event, and neural entities plus the file's observed time span.
fn ingest_event_file(parser_rc: &Rc<RefCell<EventParser>>) -> Result<(Vec<Entity>, f64), NsError> {
    let resolution = parser_rc.borrow().header.timestamp_resolution;

    let mut segment_order: Vec<u16> = Vec::new();
    let mut segment_label: HashMap<u16, Option<String>> = HashMap::new();
    let mut pending_labels: HashMap<u16, String> = HashMap::new();

    {
        let mut parser = parser_rc.borrow_mut();
        let headers: Vec<ExtendedHeader> = parser.extended_headers()?.collect::<Result<_, _>>()?;
        for header in headers {
            match header {
                ExtendedHeader::NeuevWav { packet_id, .. } => {
                    segment_order.push(packet_id);
                    segment_label.entry(packet_id).or_insert(None);
                }
                ExtendedHeader::NeuevLbl { packet_id, label } => {
                    if let Some(slot) = segment_label.get_mut(&packet_id) {
                        *slot = Some(label);
                    } else {
                        pending_labels.insert(packet_id, label);
                    }
                }
                ExtendedHeader::NeuevFlt { .. } | ExtendedHeader::DigLabel { .. } => {}
            }
        }
    }
    for (id, label) in pending_labels {
        if let Some(slot) = segment_label.get_mut(&id) {
            *slot = Some(label);
        }
    }

    let mut segment_index_of: HashMap<u16, usize> = HashMap::new();
    for (i, id) in segment_order.iter().enumerate() {
        segment_index_of.insert(*id, i);
    }
    let mut segment_indexes: Vec<IndexTable> = vec![IndexTable::default(); segment_order.len()];

    let mut event_order: Vec<u8> = Vec::new();
    let mut event_index_of: HashMap<u8, usize> = HashMap::new();
    let mut event_indexes: Vec<IndexTable> = Vec::new();

    let mut neural_indexes: BTreeMap<(u16, u8), IndexTable> = BTreeMap::new();

    let mut last_timestamp_ticks: u32 = 0;
    {
        let mut parser = parser_rc.borrow_mut();
        let packet_count = parser.packet_count;
        for ordinal in 0..packet_count {
            let packet = parser.read_packet(ordinal)?;
            match packet {
                DataPacket::Event {
                    timestamp, reason, ..
                } => {
                    let idx = *event_index_of.entry(reason).or_insert_with(|| {
                        event_order.push(reason);
                        event_indexes.push(IndexTable::default());
                        event_indexes.len() - 1
                    });
                    event_indexes[idx].try_push(timestamp, ordinal as u32)?;
                    last_timestamp_ticks = last_timestamp_ticks.max(timestamp);
                }
                DataPacket::Segment {
                    timestamp,
                    packet_id,
                    unit_class,
                    ..
                } => {
                    if let Some(&sidx) = segment_index_of.get(&packet_id) {
                        segment_indexes[sidx].try_push(timestamp, ordinal as u32)?;
                    }
                    neural_indexes
                        .entry((packet_id, unit_class))
                        .or_default()
                        .try_push(timestamp, ordinal as u32)?;
                    last_timestamp_ticks = last_timestamp_ticks.max(timestamp);
                }
            }
        }
    }

    let time_span = last_timestamp_ticks as f64 / resolution as f64;

    let mut entities = Vec::new();
    for (i, id) in segment_order.into_iter().enumerate() {
        entities.push(Entity::Segment(SegmentEntity {
            electrode_id: id,
            label: segment_label.get(&id).cloned().flatten(),
            parser: Rc::clone(parser_rc),
            index: std::mem::take(&mut segment_indexes[i]),
            resolution,
        }));
    }
    for (i, reason) in event_order.into_iter().enumerate() {
        entities.push(Entity::Event(EventEntity {
            reason,
            parser: Rc::clone(parser_rc),
            index: std::mem::take(&mut event_indexes[i]),
            resolution,
        }));
    }
    for ((electrode_id, unit_class), index) in neural_indexes {
        entities.push(Entity::Neural(NeuralEntity {
            electrode_id,
            unit_class,
            parser: Rc::clone(parser_rc),
            index,
            resolution,
        }));
    }

    Ok((entities, time_span))
}

fn ingest_continuous_v1(parser_rc: &Rc<RefCell<ContinuousV1Parser>>) -> (Vec<Entity>, f64) {
    let (channel_ids, sample_count, freq, time_span) = {
        let parser = parser_rc.borrow();
        (
            parser.header.channel_ids.clone(),
            parser.samples_per_channel,
            parser.sample_frequency(),
            parser.time_span_seconds(),
        )
    };

    let entities = channel_ids
        .into_iter()
        .enumerate()
        .map(|(channel_index, electrode_id)| {
            Entity::Analog(AnalogEntity {
                electrode_id,
                units: "V".to_string(),
                label: None,
                channel_index,
                scale: 1.0,
                parser: AnalogParser::V1(Rc::clone(parser_rc)),
                sample_count,
                sample_freq: freq,
            })
        })
        .collect();

    (entities, time_span)
}

fn ingest_continuous_v2(parser_rc: &Rc<RefCell<ContinuousV2Parser>>) -> (Vec<Entity>, f64) {
    let (cc_headers, sample_count, freq, time_span) = {
        let parser = parser_rc.borrow();
        (
            parser.cc_headers.clone(),
            parser.samples_per_channel,
            parser.sample_frequency(),
            parser.time_span_seconds(),
        )
    };

    let entities = cc_headers
        .into_iter()
        .enumerate()
        .map(|(channel_index, cc)| {
            Entity::Analog(AnalogEntity {
                electrode_id: cc.electrode_id as u32,
                units: cc.units.clone(),
                label: if cc.label.is_empty() { None } else { Some(cc.label.clone()) },
                channel_index,
                scale: cc.scale(),
                parser: AnalogParser::V2(Rc::clone(parser_rc)),
                sample_count,
                sample_freq: freq,
            })
        })
        .collect();

    (entities, time_span)
}

/// Reorders the flat, per-file-appended entity list to satisfy the session-wide ordering
/// invariant: segment/event entities in discovery order, then analog entities grouped by
/// ascending sample frequency, then neural entities sorted by `(electrode_id, unit_class)`.
fn reorder_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut segments_and_events = Vec::new();
    let mut analog = Vec::new();
    let mut neural = Vec::new();

    for entity in entities {
        match entity {
            Entity::Segment(_) | Entity::Event(_) => segments_and_events.push(entity),
            Entity::Analog(_) => analog.push(entity),
            Entity::Neural(_) => neural.push(entity),
        }
    }

    analog.sort_by(|a, b| {
        let fa = if let Entity::Analog(e) = a { e.sample_frequency() } else { 0.0 };
        let fb = if let Entity::Analog(e) = b { e.sample_frequency() } else { 0.0 };
        fa.partial_cmp(&fb).unwrap_or(std::cmp::Ordering::Equal)
    });

    neural.sort_by_key(|e| match e {
        Entity::Neural(n) => (n.electrode_id, n.unit_class),
        _ => (0, 0),
    });

    let mut result = segments_and_events;
    result.extend(analog);
    result.extend(neural);
    result
}
