//! Local staging of uploaded video files.
//!
//! A submitted file is copied into its own temporary directory before anything talks to YouTube.
//! The resulting [`StagedFile`] has exactly one owner, the submission that is uploading it right
//! away or the queued upload waiting for its time, and is released by that owner on every path
//! out.

use crate::error::UploadError;
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Largest video YouTube accepts: 128 GiB.
pub const MAX_UPLOAD_BYTES: u64 = 128 * 1024 * 1024 * 1024;

/// A file as it arrives from the caller, not yet written anywhere.
pub struct IncomingFile {
    filename: String,
    declared_size: u64,
    body: Pin<Box<dyn AsyncRead + Send>>,
}

impl IncomingFile {
    /// `declared_size` is what the caller claims the body holds; it is checked against the upload
    /// limit before a single byte is read.
    pub fn new(
        filename: impl Into<String>,
        declared_size: u64,
        body: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_size,
            body: Box::pin(body),
        }
    }

    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(filename, data.len() as u64, std::io::Cursor::new(data))
    }

    /// Opens a file on local disk as the body of a submission.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(filename, size, file))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }
}

impl fmt::Debug for IncomingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingFile")
            .field("filename", &self.filename)
            .field("declared_size", &self.declared_size)
            .finish_non_exhaustive()
    }
}

/// Longest file name most filesystems will create.
const MAX_FILENAME_BYTES: usize = 255;

/// Reduces a client-supplied file name to something safe to create inside our own directory.
///
/// Only the final path component is kept, whichever separator the client's platform uses.
pub(crate) fn sanitize_filename(raw: &str) -> Result<&str, UploadError> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => Err(UploadError::validation("No file selected")),
        name if name.contains('\0') => Err(UploadError::validation("Invalid file name")),
        name if name.len() > MAX_FILENAME_BYTES => {
            Err(UploadError::validation("File name is too long"))
        }
        name => Ok(name),
    }
}

/// A video file copied to a private temporary directory.
///
/// [`StagedFile::release`] deletes it and logs, rather than returns, any failure to do so. If a
/// staged file is dropped without being released, the directory is still removed, silently.
#[derive(Debug)]
pub struct StagedFile {
    dir: TempDir,
    path: PathBuf,
}

impl StagedFile {
    /// Copies `file` into a fresh temporary directory, refusing bodies larger than `limit` or
    /// with no content at all.
    pub(crate) async fn stage(file: IncomingFile, limit: u64) -> Result<Self, UploadError> {
        Self::stage_in(file, limit, &std::env::temp_dir()).await
    }

    /// Like [`StagedFile::stage`], with the temporary directory created under `root`.
    pub(crate) async fn stage_in(
        file: IncomingFile,
        limit: u64,
        root: &Path,
    ) -> Result<Self, UploadError> {
        let IncomingFile { filename, body, .. } = file;
        let name = sanitize_filename(&filename)?;

        let dir = tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(root)
            .map_err(|e| UploadError::filesystem("create temporary directory", e))?;
        let staged = Self {
            path: dir.path().join(name),
            dir,
        };

        let written = staged.write_body(body, limit).await;
        let copied = match written {
            Ok(copied) => copied,
            Err(e) => {
                staged.release().await;
                return Err(UploadError::filesystem("save uploaded file", e));
            }
        };

        if copied > limit {
            staged.release().await;
            return Err(too_large());
        }
        if copied == 0 {
            staged.release().await;
            return Err(UploadError::validation("Uploaded file is empty"));
        }

        tracing::debug!(path = %staged.path.display(), bytes = copied, "staged uploaded file");
        Ok(staged)
    }

    /// Copies at most one byte past `limit`, which is enough to tell that the body is too big.
    async fn write_body(
        &self,
        body: Pin<Box<dyn AsyncRead + Send>>,
        limit: u64,
    ) -> std::io::Result<u64> {
        let mut out = tokio::fs::File::create(&self.path).await?;
        let mut body = body.take(limit.saturating_add(1));
        let copied = tokio::io::copy(&mut body, &mut out).await?;
        out.flush().await?;
        Ok(copied)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file and its directory, off the async worker threads.
    pub async fn release(self) {
        let Self { dir, path } = self;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => tracing::trace!(path = %path.display(), "removed staged file"),
            Ok(Err(e)) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to remove staged file"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "staged file removal task failed"
            ),
        }
    }
}

pub(crate) fn too_large() -> UploadError {
    UploadError::validation("File is too large; the maximum upload size is 128 GiB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn limit_is_128_gib() {
        assert_eq!(MAX_UPLOAD_BYTES, 137_438_953_472);
    }

    #[test]
    fn filenames_lose_their_directories() {
        assert_eq!(sanitize_filename("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename(r"C:\Users\me\clip.mp4").unwrap(), "clip.mp4");
        for bad in ["", "  ", "dir/", "..", "a/.."] {
            assert!(
                matches!(sanitize_filename(bad), Err(UploadError::Validation(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn filenames_the_disk_would_refuse_are_validation_errors() {
        let long = format!("{}.mp4", "a".repeat(252));
        assert_eq!(long.len(), 256);
        for (bad, message) in [
            ("clip\0.mp4", "Invalid file name"),
            (long.as_str(), "File name is too long"),
        ] {
            let err = sanitize_filename(bad).unwrap_err();
            assert!(err.is_client_error(), "{err}");
            assert_eq!(err.to_string(), message);
        }
        let longest = format!("{}.mp4", "a".repeat(251));
        assert_eq!(sanitize_filename(&longest).unwrap(), longest);
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn stage_then_release() {
        let staged = StagedFile::stage(IncomingFile::from_bytes("clip.mp4", "video"), 1024)
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        let dir = path.parent().unwrap().to_path_buf();
        assert_eq!(path.file_name().unwrap(), "clip.mp4");
        assert_eq!(std::fs::read(&path).unwrap(), b"video");

        staged.release().await;
        assert!(!path.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn dropped_staged_file_is_removed() {
        let staged = StagedFile::stage(IncomingFile::from_bytes("clip.mp4", "video"), 1024)
            .await
            .unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn body_larger_than_declared_limit_is_refused() {
        // the caller understated the size; the copy itself notices
        let root = tempfile::tempdir().unwrap();
        let file = IncomingFile::new("clip.mp4", 4, std::io::Cursor::new(vec![0u8; 64]));
        let err = StagedFile::stage_in(file, 16, root.path())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)), "{err}");
        assert!(is_empty_dir(root.path()), "partial upload left behind");
    }

    #[tokio::test]
    async fn empty_body_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let err = StagedFile::stage_in(IncomingFile::from_bytes("clip.mp4", ""), 16, root.path())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)), "{err}");
        assert!(is_empty_dir(root.path()), "empty upload left behind");
    }

    #[tokio::test]
    async fn staging_stays_under_its_root() {
        let root = tempfile::tempdir().unwrap();
        let staged =
            StagedFile::stage_in(IncomingFile::from_bytes("clip.mp4", "video"), 1024, root.path())
                .await
                .unwrap();
        assert!(staged.path().starts_with(root.path()));
        assert!(!is_empty_dir(root.path()));

        staged.release().await;
        assert!(is_empty_dir(root.path()));
    }
}
