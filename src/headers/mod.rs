//! Header layouts for each of the three binary container formats.

pub mod continuous_v1_header;
pub mod continuous_v2_header;
pub mod event_header;
