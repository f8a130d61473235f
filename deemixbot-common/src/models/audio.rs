use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Local, decodable audio produced by the fetch pipeline for exactly one track.
///
/// When the value owns a staging directory, dropping it deletes the directory and
/// everything downloaded into it.
#[derive(Debug)]
pub struct StagedAudio {
    path: PathBuf,
    staging: Option<TempDir>,
}

impl StagedAudio {
    pub fn new(path: PathBuf, staging: TempDir) -> Self {
        Self {
            path,
            staging: Some(staging),
        }
    }

    /// Audio that lives outside any staging directory (nothing is deleted on drop).
    pub fn unstaged(path: PathBuf) -> Self {
        Self { path, staging: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(|d| d.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_staged_audio_removes_staging_dir() {
        let dir = tempfile::Builder::new().prefix("deemix").tempdir().unwrap();
        let file = dir.path().join("song.mp3");
        std::fs::write(&file, b"id3").unwrap();
        let staged = StagedAudio::new(file.clone(), dir);
        let staging = staged.staging_dir().unwrap().to_path_buf();
        assert!(staging.exists());

        drop(staged);
        assert!(!staging.exists());
    }
}
