use std::path::Path;
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

const MAX_SCAN_DEPTH: usize = 4;

/// Maximum last-modified time, in whole seconds since the epoch, over a
/// directory tree. Missing directories stamp as zero. Filesystem timestamp
/// granularity varies by platform; whole seconds avoid spurious "newer"
/// results from sub-second noise.
pub fn directory_stamp(root: &Path) -> i64 {
    if !root.exists() {
        return 0;
    }
    let mut stamp = modified_secs(root).unwrap_or(0);
    for entry in WalkDir::new(root).max_depth(MAX_SCAN_DEPTH) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(io) = err.io_error() {
                    log::debug!("skipping entry while stamping {}: {}", root.display(), io);
                }
                continue;
            }
        };
        if let Some(secs) = modified_secs(entry.path()) {
            stamp = stamp.max(secs);
        }
    }
    stamp
}

pub(crate) fn modified_secs(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_directory_stamps_as_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(directory_stamp(&dir.path().join("absent")), 0);
    }

    #[test]
    fn stamp_is_non_decreasing_as_content_is_added() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("site");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("first"), "a").unwrap();
        let before = directory_stamp(&root);
        assert!(before > 0);
        fs::write(root.join("second"), "b").unwrap();
        let after = directory_stamp(&root);
        assert!(after >= before);
    }
}
