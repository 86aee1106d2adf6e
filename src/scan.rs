use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input folder not found: {0}")]
    PathNotFound(PathBuf),
    #[error("input path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// A candidate video found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    pub base_name: String,
}

impl RawFile {
    pub fn new(path: PathBuf) -> Self {
        let base_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, base_name }
    }
}

/// Walks `root` recursively and returns every file whose name ends with
/// `extension`, in file-name order within each directory.
pub fn scan_videos(root: &Path, extension: &str) -> Result<Vec<RawFile>, ScanError> {
    if !root.exists() {
        return Err(ScanError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("skipping unreadable entry: {error}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(extension) {
            files.push(RawFile::new(entry.into_path()));
        }
    }

    debug!(root = %root.display(), count = files.len(), "scan complete");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_matching_files_recursively() {
        let dir = tempdir().expect("tempdir should create");
        let nested = dir.path().join("day1").join("cage2");
        fs::create_dir_all(&nested).expect("dirs should create");
        fs::write(dir.path().join("Mouse1_Run1.avi"), b"").expect("file should write");
        fs::write(nested.join("Mouse2_Run1.avi"), b"").expect("file should write");
        fs::write(nested.join("Mouse2_Run1.mp4"), b"").expect("file should write");
        fs::write(nested.join("notes.txt"), b"").expect("file should write");

        let files = scan_videos(dir.path(), ".avi").expect("scan should succeed");
        let names = files
            .iter()
            .map(|file| file.base_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Mouse1_Run1.avi", "Mouse2_Run1.avi"]);
        assert!(files[1].path.starts_with(&nested));
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        let dir = tempdir().expect("tempdir should create");
        fs::write(dir.path().join("Mouse1_Run1.AVI"), b"").expect("file should write");

        let files = scan_videos(dir.path(), ".avi").expect("scan should succeed");
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().expect("tempdir should create");
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_videos(&missing, ".avi"),
            Err(ScanError::PathNotFound(_))
        ));

        let file = dir.path().join("file.avi");
        fs::write(&file, b"").expect("file should write");
        assert!(matches!(
            scan_videos(&file, ".avi"),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
