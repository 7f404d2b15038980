//! Upload validation: size limit and extension allow-list.
//!
//! Checks are pure and run before anything is written to storage. The size check always runs
//! first, so an oversized upload is reported as too large whatever its extension.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::FilesConfig;

/// Default upload limit: 100 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Extensions served inline with an `image/*` content type.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "ico", "svg", "bmp", "webp", "tiff", "psd"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("content length {length} exceeds the limit of {limit} bytes")]
    TooLarge { length: u64, limit: u64 },

    #[error("extension '{extension}' is not in the allow-list")]
    DisallowedExtension { extension: String },
}

/// Returns the substring after the final `.`, or the whole name when there is none.
pub fn extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => filename,
    }
}

/// Size limit and case-insensitive extension allow-list applied to uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_extensions: BTreeSet<String>,
}

impl UploadPolicy {
    pub fn new<I, S>(max_file_size: u64, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions.into_iter().map(|e| e.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(config.max_file_size, &config.allowed_extensions)
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn check_size(&self, content_length: u64) -> Result<(), ValidationError> {
        if content_length > self.max_file_size {
            return Err(ValidationError::TooLarge {
                length: content_length,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    pub fn check_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let ext = extension(filename).to_ascii_lowercase();
        if !self.allowed_extensions.contains(&ext) {
            return Err(ValidationError::DisallowedExtension { extension: ext });
        }
        Ok(())
    }

    /// Full upload check: size first, then extension.
    pub fn validate(&self, filename: &str, content_length: u64) -> Result<(), ValidationError> {
        self.check_size(content_length)?;
        self.check_extension(filename)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE, IMAGE_EXTENSIONS)
    }
}

/// Whether a name's extension is one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_image(filename: &str) -> bool {
    let ext = extension(filename);
    IMAGE_EXTENSIONS.iter().any(|image| image.eq_ignore_ascii_case(ext))
}
