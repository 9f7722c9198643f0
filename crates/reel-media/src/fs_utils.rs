//! Write-then-rename helpers for output and cache files.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Sibling path that a file is written to before being renamed into place.
///
/// The extension is kept so tools that sniff it (FFmpeg's muxer selection)
/// still see the right format: `out/video.mp4` → `out/.video.partial.mp4`.
pub fn partial_path(dst: &Path) -> PathBuf {
    let stem = dst
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = match dst.extension() {
        Some(ext) => format!(".{stem}.partial.{}", ext.to_string_lossy()),
        None => format!(".{stem}.partial"),
    };
    dst.with_file_name(name)
}

/// Move `src` to `dst`, creating the destination directory if needed.
///
/// Falls back to copy and delete when the two paths are on different
/// filesystems; the copy still lands under a partial name first.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device move, copying instead"
            );
            let staging = partial_path(dst);
            if let Err(e) = fs::copy(src, &staging).await {
                remove_if_exists(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&staging, dst).await {
                remove_if_exists(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                warn!(path = %src.display(), error = %e, "Failed to remove moved source file");
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// A file being written under its partial name.
///
/// Dropping it without [`StagingFile::commit`] removes whatever was written,
/// so a cancelled task does not leave partial output behind.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    /// Staging file for `dst`, at [`partial_path`].
    pub fn for_output(dst: &Path) -> Self {
        Self {
            path: partial_path(dst),
            committed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the staged file onto `dst`.
    pub async fn commit(mut self, dst: &Path) -> MediaResult<()> {
        move_file(&self.path, dst).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed uncommitted staging file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staging file"),
        }
    }
}

/// Best-effort removal of a leftover file.
pub async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed leftover file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("out/my_video.mp4")),
            PathBuf::from("out/.my_video.partial.mp4")
        );
        assert_eq!(
            partial_path(Path::new("cache/abc")),
            PathBuf::from("cache/.abc.partial")
        );
    }

    #[tokio::test]
    async fn test_move_file_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join(".clip.partial.mp4");
        let dst = dir.path().join("nested").join("clip.mp4");

        fs::write(&src, b"new").await.unwrap();
        move_file(&src, &dst).await.unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");

        fs::write(&src, b"newer").await.unwrap();
        move_file(&src, &dst).await.unwrap();
        assert_eq!(fs::read(&dst).await.unwrap(), b"newer");
    }

    #[tokio::test]
    async fn test_staging_file_removed_unless_committed() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("video.mp4");

        let staging = StagingFile::for_output(&dst);
        let staged = staging.path().to_path_buf();
        fs::write(&staged, b"half").await.unwrap();
        drop(staging);
        assert!(!staged.exists());
        assert!(!dst.exists());

        let staging = StagingFile::for_output(&dst);
        fs::write(staging.path(), b"done").await.unwrap();
        staging.commit(&dst).await.unwrap();
        assert!(!staged.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"done");
    }

    #[tokio::test]
    async fn test_remove_if_exists_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.mp4");
        remove_if_exists(&path).await;

        fs::write(&path, b"x").await.unwrap();
        remove_if_exists(&path).await;
        assert!(!path.exists());
    }
}
