//! Format-specific parsers and the magic-byte dispatch that selects between them.

pub mod continuous_v1;
pub mod continuous_v2;
pub mod event;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::NsError;

/// The three formats this crate understands, identified by the file's 8-byte magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    EventFile,
    ContinuousV1,
    ContinuousV2,
}

impl FileFormat {
    pub fn magic_str(self) -> &'static str {
        match self {
            Self::EventFile => "NEURALEV",
            Self::ContinuousV1 => "NEURALSG",
            Self::ContinuousV2 => "NEURALCD",
        }
    }
}

/// Reads the first 8 bytes of `path` and matches them against the three known magics. No
/// heuristic upgrade is performed: a byte-for-byte mismatch is always `BadFile`.
pub(crate) fn detect_format(path: &Path) -> Result<FileFormat, NsError> {
    let mut file = File::open(path)
        .map_err(|e| NsError::BadFile(format!("failed to open {}: {}", path.display(), e)))?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|e| NsError::BadFile(format!("short read of magic in {}: {}", path.display(), e)))?;

    match &magic {
        event::MAGIC => Ok(FileFormat::EventFile),
        continuous_v1::MAGIC => Ok(FileFormat::ContinuousV1),
        continuous_v2::MAGIC => Ok(FileFormat::ContinuousV2),
        other => Err(NsError::BadFile(format!(
            "unrecognized magic {:?} in {}",
            String::from_utf8_lossy(other),
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ns-rs-dispatch-test-{}-{}", std::process::id(), name));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn detects_each_known_magic() {
        let path = scratch_file("nev", b"NEURALEV");
        assert_eq!(detect_format(&path).unwrap(), FileFormat::EventFile);
        let _ = std::fs::remove_file(&path);

        let path = scratch_file("ns1", b"NEURALSG");
        assert_eq!(detect_format(&path).unwrap(), FileFormat::ContinuousV1);
        let _ = std::fs::remove_file(&path);

        let path = scratch_file("ns2", b"NEURALCD");
        assert_eq!(detect_format(&path).unwrap(), FileFormat::ContinuousV2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_magic_is_bad_file() {
        let path = scratch_file("bogus", b"GARBAGE!");
        assert!(matches!(detect_format(&path), Err(NsError::BadFile(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_bad_file() {
        let path = std::env::temp_dir().join("ns-rs-dispatch-test-does-not-exist.nev");
        assert!(matches!(detect_format(&path), Err(NsError::BadFile(_))));
    }
}
