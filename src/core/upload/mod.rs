//! # Upload Module
//!
//! Everything that happens to an upload before it reaches the pipeline.
//!
//! ## Steps
//! 1. **Validate** - file name, extension and byte size (`UploadPolicy`)
//! 2. **Probe** - read dimensions from the header and enforce the pixel limit
//! 3. **Decode** - into an 8-bit RGB buffer (`fast_decode`)
//! 4. **Stage** - write a temporary copy that is removed on every exit path
//!
//! Uploads can also be read from disk (`read_file_bytes`), using memory
//! mapping for large files.

pub mod fast_decode;
pub mod mmap_read;
mod policy;
mod staging;

pub use fast_decode::{FastDecoder, ImageFormat};
pub use mmap_read::{read_file_bytes, FileBytes};
pub use policy::{UploadPolicy, ALLOWED_EXTENSIONS, MAX_PIXELS, MAX_UPLOAD_BYTES};
pub use staging::StagedUpload;

/// An uploaded file as received by the request layer
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name, used only for type validation
    pub file_name: String,
    /// Raw file bytes
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Create a new upload
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        let upload = Upload::new("Photo.JPG", vec![]);
        assert_eq!(upload.extension().as_deref(), Some("jpg"));
    }

    #[test]
    fn extension_uses_last_dot() {
        let upload = Upload::new("archive.tar.png", vec![]);
        assert_eq!(upload.extension().as_deref(), Some("png"));
    }

    #[test]
    fn no_dot_means_no_extension() {
        let upload = Upload::new("README", vec![]);
        assert!(upload.extension().is_none());
    }
}
