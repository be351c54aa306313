//! Upload validation limits.

use super::Upload;
use crate::error::InputError;
use std::collections::BTreeSet;

/// Extensions accepted by default
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Largest accepted upload (32 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;

/// Largest accepted decoded image (2048x2048)
pub const MAX_PIXELS: u64 = 2048 * 2048;

/// Limits enforced before an upload reaches the cache or pipeline
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    extensions: BTreeSet<String>,
    max_bytes: u64,
    max_pixels: u64,
}

impl UploadPolicy {
    /// Create a policy with the default limits
    pub fn new() -> Self {
        Self {
            extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_bytes: MAX_UPLOAD_BYTES,
            max_pixels: MAX_PIXELS,
        }
    }

    /// Override the maximum upload size in bytes
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Override the maximum decoded pixel count
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Override the list of extensions to accept
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Maximum decoded pixel count
    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Check file name, type and byte size.
    ///
    /// Runs before hashing, so a rejected upload never touches the cache.
    pub fn check_upload(&self, upload: &Upload) -> Result<(), InputError> {
        if upload.file_name.is_empty() {
            return Err(InputError::EmptyFileName);
        }

        let extension = upload.extension().unwrap_or_default();
        if !self.extensions.contains(&extension) {
            return Err(InputError::DisallowedType {
                extension,
                allowed: self
                    .extensions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let size = upload.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(InputError::FileTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        Ok(())
    }

    /// Check decoded dimensions against the pixel limit
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), InputError> {
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(InputError::ImageTooLarge {
                width,
                height,
                max_pixels: self.max_pixels,
            });
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, len: usize) -> Upload {
        Upload::new(name, vec![0; len])
    }

    #[test]
    fn accepts_allowed_extensions_any_case() {
        let policy = UploadPolicy::new();
        for name in ["a.png", "b.JPG", "c.jpeg", "d.Gif"] {
            assert!(policy.check_upload(&upload(name, 10)).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_other_extensions() {
        let policy = UploadPolicy::new();
        for name in ["a.bmp", "b.webp", "c.txt", "noext"] {
            assert!(
                matches!(
                    policy.check_upload(&upload(name, 10)),
                    Err(InputError::DisallowedType { .. })
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn rejects_empty_file_name() {
        let policy = UploadPolicy::new();
        assert!(matches!(
            policy.check_upload(&upload("", 10)),
            Err(InputError::EmptyFileName)
        ));
    }

    #[test]
    fn rejects_oversized_upload() {
        let policy = UploadPolicy::new().with_max_bytes(100);
        assert!(policy.check_upload(&upload("a.png", 100)).is_ok());
        assert!(matches!(
            policy.check_upload(&upload("a.png", 101)),
            Err(InputError::FileTooLarge { size: 101, max: 100 })
        ));
    }

    #[test]
    fn pixel_limit_is_inclusive() {
        let policy = UploadPolicy::new();
        assert!(policy.check_dimensions(2048, 2048).is_ok());
        assert!(policy.check_dimensions(4096, 1024).is_ok());
        assert!(matches!(
            policy.check_dimensions(3000, 3000),
            Err(InputError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn custom_extensions_replace_defaults() {
        let policy = UploadPolicy::new().with_extensions(vec!["PNG".to_string()]);
        assert!(policy.check_upload(&upload("a.png", 1)).is_ok());
        assert!(policy.check_upload(&upload("a.jpg", 1)).is_err());
    }
}
