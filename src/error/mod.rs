use std::error::Error;
use std::fmt;

/// The single error type surfaced by every fallible operation in this crate.
#[derive(Debug)]
pub enum NsError {
    /// File not found, failed to open, magic mismatch, short read, unknown extended-header tag,
    /// empty sibling discovery set, or a non-monotonic timestamp observed during ingest.
    BadFile(String),
    /// Out-of-range packet ordinal, extended-header index, or a time-by-index lookup with no match.
    BadIndex(String),
    /// Entity lookup by index exceeds the session's entity count, or a variant-specific accessor was
    /// called on an entity of the wrong kind.
    BadEntity(String),
    /// Reserved for internal invariant violations. Should not be reachable in correct use.
    LibError(String),
}

impl Error for NsError {}

impl fmt::Display for NsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadFile(msg) => write!(f, "bad file: {}", msg),
            Self::BadIndex(msg) => write!(f, "bad index: {}", msg),
            Self::BadEntity(msg) => write!(f, "bad entity: {}", msg),
            Self::LibError(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for NsError {
    fn from(err: std::io::Error) -> Self {
        Self::BadFile(err.to_string())
    }
}
