// src/platforms/deezer/deemix.rs

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use deemixbot_common::error::Error;
use deemixbot_common::models::StagedAudio;
use deemixbot_common::traits::AudioFetcher;

pub const DEFAULT_DEEMIX_PATH: &str = "deemix";
pub const DEFAULT_BITRATE: &str = "128";

/// Downloads tracks by shelling out to `deemix` into a throwaway directory.
pub struct DeemixFetcher {
    program: PathBuf,
    bitrate: String,
}

impl Default for DeemixFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEEMIX_PATH, DEFAULT_BITRATE)
    }
}

impl DeemixFetcher {
    pub fn new(program: impl Into<PathBuf>, bitrate: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            bitrate: bitrate.into(),
        }
    }
}

#[async_trait]
impl AudioFetcher for DeemixFetcher {
    async fn fetch(&self, source: &str, cancel: CancellationToken) -> Result<StagedAudio, Error> {
        let staging = tempfile::Builder::new().prefix("deemix").tempdir()?;
        debug!("deemix: fetching {source} into {}", staging.path().display());

        let child = Command::new(&self.program)
            .arg("-p")
            .arg(staging.path())
            .arg("-b")
            .arg(&self.bitrate)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Fetch(format!("cannot execute {}: {e}", self.program.display())))?;

        // Dropping the pending wait drops the child, and kill_on_drop ends deemix.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                debug!("deemix: fetch of {source} cancelled");
                return Err(Error::Cancelled);
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("deemix failed for {source}: {}", stderr.trim());
            return Err(Error::Fetch(format!("deemix exited with {}", output.status)));
        }

        let musics = find_music_files(staging.path())?;
        match musics.into_iter().next() {
            Some(path) => Ok(StagedAudio::new(path, staging)),
            None => Err(Error::Fetch("music not found".into())),
        }
    }
}

/// Every `.mp3` under `dir`, sorted for a stable pick.
pub fn find_music_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("mp3"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nested_mp3_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Daft Punk - Discovery");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("01 - One More Time.mp3"), b"ID3").unwrap();
        std::fs::write(nested.join("cover.jpg"), b"jpg").unwrap();
        std::fs::write(dir.path().join("B.MP3"), b"ID3").unwrap();

        let files = find_music_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some()));
        assert!(!files.iter().any(|f| f.ends_with("cover.jpg")));
    }

    #[test]
    fn empty_dir_has_no_music() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_music_files(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_a_fetch_error() {
        let fetcher = DeemixFetcher::new("/nonexistent/deemix-binary", DEFAULT_BITRATE);
        let err = tokio_test::assert_err!(
            fetcher
                .fetch("https://www.deezer.com/track/1", CancellationToken::new())
                .await
        );
        assert!(matches!(err, Error::Fetch(_)));
    }
}
