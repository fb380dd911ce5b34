//! Temp artifact naming and unconditional cleanup.
//!
//! Output paths are decided before navigation starts: a timestamp for
//! inline HTML, timestamp plus a digest of the URL for URL sources so
//! concurrent jobs against different pages never collide and a stray file
//! can be traced back to its request. A leaked temp file is a defect, so
//! deletion is tied to ownership: dropping a [`TempArtifact`] removes the
//! file whether the job succeeded, failed mid-render, or panicked.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::request::{OutputKind, Source};

/// How many hex chars of the URL digest end up in the filename.
const DIGEST_LEN: usize = 32;

#[derive(Debug)]
pub struct TempArtifactManager {
    dir: PathBuf,
}

impl TempArtifactManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Allocate the output path for one job. The file itself is created by
    /// the capture step; until then the artifact tracks only the name.
    pub fn output_for(&self, source: &Source, output: OutputKind) -> TempArtifact {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let name = match source {
            Source::InlineHtml(_) => format!("snap-{millis}.{}", output.extension()),
            Source::Url(url) => {
                let digest = format!("{:x}", Sha256::digest(url.as_str().as_bytes()));
                format!(
                    "snap-{millis}-{}.{}",
                    &digest[..DIGEST_LEN],
                    output.extension()
                )
            }
        };
        TempArtifact {
            path: self.dir.join(name),
        }
    }
}

/// A temp file owned by one render job. Removed on drop; `remove()` is the
/// explicit variant for callers that want the I/O error.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the produced file, if it exists yet.
    pub async fn size(&self) -> Option<u64> {
        tokio::fs::metadata(&self.path).await.ok().map(|m| m.len())
    }

    /// Delete the file now. Missing files are fine: the job may have failed
    /// before capture ever wrote anything.
    pub async fn remove(self) -> std::io::Result<()> {
        // take the path out so Drop does not double-remove
        let mut this = std::mem::ManuallyDrop::new(self);
        let path = std::mem::take(&mut this.path);
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn url_source(s: &str) -> Source {
        Source::Url(Url::parse(s).unwrap())
    }

    #[test]
    fn inline_names_carry_timestamp_and_extension() {
        let manager = TempArtifactManager::new("/tmp");
        let artifact = manager.output_for(&Source::InlineHtml("<p>hi</p>".into()), OutputKind::Pdf);
        let name = artifact.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("snap-"));
        assert!(name.ends_with(".pdf"));
        // no file was created, dropping must not panic
    }

    #[test]
    fn url_names_embed_a_stable_digest() {
        let manager = TempArtifactManager::new("/tmp");
        let a = manager.output_for(&url_source("https://example.com/a"), OutputKind::Png);
        let b = manager.output_for(&url_source("https://example.com/b"), OutputKind::Png);
        let digest = |artifact: &TempArtifact| {
            let name = artifact.path().file_stem().unwrap().to_str().unwrap().to_string();
            name.rsplit('-').next().unwrap().to_string()
        };
        assert_eq!(digest(&a).len(), DIGEST_LEN);
        assert_ne!(digest(&a), digest(&b));

        let a2 = manager.output_for(&url_source("https://example.com/a"), OutputKind::Png);
        assert_eq!(digest(&a), digest(&a2));
    }

    #[tokio::test]
    async fn drop_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempArtifactManager::new(dir.path());
        let artifact = manager.output_for(&Source::InlineHtml(String::new()), OutputKind::Png);
        tokio::fs::write(artifact.path(), b"png bytes").await.unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn explicit_remove_deletes_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempArtifactManager::new(dir.path());

        let artifact = manager.output_for(&Source::InlineHtml(String::new()), OutputKind::Pdf);
        tokio::fs::write(artifact.path(), b"%PDF-1.4").await.unwrap();
        let path = artifact.path().to_path_buf();
        artifact.remove().await.unwrap();
        assert!(!path.exists());

        // never-written artifact: remove is still Ok
        let artifact = manager.output_for(&Source::InlineHtml(String::new()), OutputKind::Pdf);
        artifact.remove().await.unwrap();
    }

    #[tokio::test]
    async fn size_reports_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TempArtifactManager::new(dir.path());
        let artifact = manager.output_for(&Source::InlineHtml(String::new()), OutputKind::Png);
        assert!(artifact.size().await.is_none());
        tokio::fs::write(artifact.path(), vec![0u8; 128]).await.unwrap();
        assert_eq!(artifact.size().await, Some(128));
    }
}
