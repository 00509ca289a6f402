// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for recorded video files

use crate::constants::FILE_EXTENSION;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default video directory (`~/Videos/recorder`)
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recorder")
}

/// Ensure the output directory exists, creating it if necessary
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    debug!(path = %dir.display(), "Video directory ready");
    Ok(())
}

/// Path of a take: `dir/base.mp4`
pub fn video_path(dir: &Path, base_name: &str) -> PathBuf {
    dir.join(format!("{}.{}", base_name, FILE_EXTENSION))
}

/// Path of the `part`-th extra segment of a take: `dir/base_partN.mp4`
pub fn segment_path(dir: &Path, base_name: &str, part: usize) -> PathBuf {
    dir.join(format!("{}_part{}.{}", base_name, part, FILE_EXTENSION))
}

/// Delete a file, treating "not found" as success
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Deleted video file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Size of a finished file, 0 when it does not exist
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let dir = Path::new("/tmp/videos");
        assert_eq!(video_path(dir, "sample"), PathBuf::from("/tmp/videos/sample.mp4"));
        assert_eq!(
            segment_path(dir, "sample", 2),
            PathBuf::from("/tmp/videos/sample_part2.mp4")
        );
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nothing.mp4");
        assert!(remove_file_if_exists(&path).is_ok());

        std::fs::write(&path, b"data").unwrap();
        assert_eq!(file_size(&path), 4);
        remove_file_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
