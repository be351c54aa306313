//! Memory-mapped file I/O for reading uploads from disk.
//!
//! Uses OS-level memory mapping to avoid a kernel copy when reading
//! large image files.

use crate::error::DenoiserError;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Minimum file size to use memory-mapped I/O (1MB)
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Read file bytes, memory-mapping files of 1MB and above.
pub fn read_file_bytes(path: &Path) -> Result<FileBytes, DenoiserError> {
    let io_error = |e| DenoiserError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;

    if metadata.len() >= MMAP_THRESHOLD {
        let file = File::open(path).map_err(io_error)?;
        // SAFETY: read-only mapping of a file nothing else in the process
        // writes to while the bytes are alive.
        let mmap = unsafe { Mmap::map(&file) }.map_err(io_error)?;
        Ok(FileBytes::Mmap(mmap))
    } else {
        Ok(FileBytes::Vec(std::fs::read(path).map_err(io_error)?))
    }
}

/// File bytes that may be either owned or memory-mapped.
#[derive(Debug)]
pub enum FileBytes {
    /// Standard heap-allocated bytes
    Vec(Vec<u8>),
    /// Memory-mapped bytes (zero-copy from disk)
    Mmap(Mmap),
}

impl FileBytes {
    /// Copy into an owned buffer
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            FileBytes::Vec(v) => v,
            FileBytes::Mmap(m) => m.to_vec(),
        }
    }
}

impl AsRef<[u8]> for FileBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileBytes::Vec(v) => v,
            FileBytes::Mmap(m) => m,
        }
    }
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn small_files_are_read_into_memory() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"small").unwrap();

        let bytes = read_file_bytes(file.path()).unwrap();
        assert!(matches!(bytes, FileBytes::Vec(_)));
        assert_eq!(&*bytes, b"small");
    }

    #[test]
    fn large_files_are_mapped() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![7u8; MMAP_THRESHOLD as usize]).unwrap();
        file.flush().unwrap();

        let bytes = read_file_bytes(file.path()).unwrap();
        assert!(matches!(bytes, FileBytes::Mmap(_)));
        assert_eq!(bytes.len(), MMAP_THRESHOLD as usize);
        assert_eq!(bytes.into_vec()[0], 7);
    }

    #[test]
    fn missing_file_reports_path() {
        let error = read_file_bytes(Path::new("/nonexistent/input.png")).unwrap_err();
        assert!(error.to_string().contains("/nonexistent/input.png"));
    }
}
