//! Temporary on-disk copy of an upload.

use crate::error::DenoiserError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// An upload written to the upload directory for the duration of one request
///
/// The file is deleted when this value is dropped, whichever way the
/// request ends: success, error return or panic unwind.
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    /// Write `bytes` to a fresh file in `dir`, keeping the upload's extension
    pub fn create(dir: &Path, extension: &str, bytes: &[u8]) -> Result<Self, DenoiserError> {
        let io_error = |e| DenoiserError::Io {
            path: dir.to_path_buf(),
            source: e,
        };

        std::fs::create_dir_all(dir).map_err(io_error)?;

        let suffix = format!(".{}", extension);
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(dir)
            .map_err(io_error)?;

        file.write_all(bytes).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        Ok(Self { file })
    }

    /// Path of the staged file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn staged_file_exists_until_dropped() {
        let dir = TempDir::new().unwrap();
        let staged = StagedUpload::create(dir.path(), "png", b"bytes").unwrap();
        let path = staged.path().to_path_buf();

        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        assert!(path.to_string_lossy().ends_with(".png"));

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn staged_file_is_removed_on_unwind() {
        let dir = TempDir::new().unwrap();
        let upload_dir = dir.path().to_path_buf();

        let result = std::panic::catch_unwind(|| {
            let _staged = StagedUpload::create(&upload_dir, "jpg", b"bytes").unwrap();
            panic!("pipeline blew up");
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_missing_upload_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("uploads");
        let staged = StagedUpload::create(&nested, "gif", b"x").unwrap();
        assert!(staged.path().starts_with(&nested));
    }
}
