use std::fs;
use std::path::{Path, PathBuf};

const SEGMENT_PREFIX: &str = "wal.";

/// One discovered on-disk segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub id: u32,
    pub path: PathBuf,
}

pub fn segment_file_name(id: u32) -> String {
    format!("{SEGMENT_PREFIX}{id}")
}

pub fn segment_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(segment_file_name(id))
}

/// Lists journal segments in `dir`, ascending by id.
///
/// Only regular files named `wal.<N>` with `<N>` a positive decimal integer
/// and no leading zero count; everything else is ignored. A directory that
/// cannot be read yields an empty list, matching first-run semantics.
pub fn list_segments(dir: &Path) -> Vec<SegmentRef> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut segments = Vec::new();
    for entry in entries.flatten() {
        let is_file = entry
            .file_type()
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = parse_segment_id(name) {
            segments.push(SegmentRef {
                id,
                path: entry.path(),
            });
        }
    }
    segments.sort_by_key(|segment| segment.id);
    segments
}

fn parse_segment_id(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(SEGMENT_PREFIX)?;
    if digits.starts_with('0') || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn lists_segments_in_numeric_order() {
        let dir = tempdir().unwrap();
        for name in ["wal.10", "wal.2", "wal.1"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let segments = list_segments(dir.path());
        let ids: Vec<u32> = segments.iter().map(|segment| segment.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        assert_eq!(segments[2].path, dir.path().join("wal.10"));
    }

    #[test]
    fn ignores_names_outside_the_pattern() {
        let dir = tempdir().unwrap();
        for name in [
            "wal.0",
            "wal.01",
            "wal.",
            "wal.x",
            "wal.2x",
            "wal.-3",
            "checkpoint.json",
            "wal1",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(dir.path().join("wal.7"), b"").unwrap();
        let segments = list_segments(dir.path());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, 7);
    }

    #[test]
    fn skips_directories_even_with_matching_names() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("wal.3")).unwrap();
        fs::write(dir.path().join("wal.4"), b"").unwrap();
        let segments = list_segments(dir.path());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].id, 4);
    }

    #[test]
    fn missing_directory_reads_as_fresh_journal() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("nonexistent");
        assert!(list_segments(&gone).is_empty());
    }
}
