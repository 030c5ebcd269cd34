//! Path validation and identifier derivation.
//!
//! Validation is advisory: it inspects the filesystem at call time and holds
//! nothing open afterwards. A file that passes may still disappear or change
//! before it is read; `ImageSource` absorbs that at poll time.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{
    IDENTIFIER_LEN, JPEG_SOI, MAX_REFRESH_INTERVAL_SECS, MIN_REFRESH_INTERVAL_SECS,
    VALID_IMAGE_EXTENSIONS,
};

/// Reason a candidate path was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationError {
    DirectoryTraversal,
    NotAbsolutePath,
    FileNotFound,
    NotAFile,
    FileNotReadable,
    InvalidImageFormat,
    InvalidImageFile,
}

impl ValidationError {
    pub const ALL: [ValidationError; 7] = [
        ValidationError::DirectoryTraversal,
        ValidationError::NotAbsolutePath,
        ValidationError::FileNotFound,
        ValidationError::NotAFile,
        ValidationError::FileNotReadable,
        ValidationError::InvalidImageFormat,
        ValidationError::InvalidImageFile,
    ];

    /// Error key reported back to the configuration form.
    pub fn key(self) -> &'static str {
        match self {
            ValidationError::DirectoryTraversal => "directory_traversal",
            ValidationError::NotAbsolutePath => "not_absolute_path",
            ValidationError::FileNotFound => "file_not_found",
            ValidationError::NotAFile => "not_a_file",
            ValidationError::FileNotReadable => "file_not_readable",
            ValidationError::InvalidImageFormat => "invalid_image_format",
            ValidationError::InvalidImageFile => "invalid_image_file",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.key() == key)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub failure_reason: Option<ValidationError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            failure_reason: None,
        }
    }

    pub fn failed(reason: ValidationError) -> Self {
        Self {
            valid: false,
            failure_reason: Some(reason),
        }
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.failure_reason {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

/// Decide whether `path` may be used as an image source.
///
/// Checks run in a fixed order and the first failure wins:
/// traversal token, absolute form, existence, regular file, read permission,
/// extension, and for JPEG files the start-of-image marker.
pub fn validate_file_path(path: &str) -> ValidationResult {
    match check_file_path(path) {
        Ok(()) => ValidationResult::ok(),
        Err(reason) => ValidationResult::failed(reason),
    }
}

fn check_file_path(path: &str) -> Result<(), ValidationError> {
    if path.contains("..") {
        return Err(ValidationError::DirectoryTraversal);
    }

    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        return Err(ValidationError::NotAbsolutePath);
    }

    let metadata = std::fs::metadata(candidate).map_err(|_| ValidationError::FileNotFound)?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile);
    }

    if !is_readable(candidate) {
        return Err(ValidationError::FileNotReadable);
    }

    let ext = extension_of(candidate).ok_or(ValidationError::InvalidImageFormat)?;
    if !VALID_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::InvalidImageFormat);
    }

    if ext == ".jpg" || ext == ".jpeg" {
        let header = read_header(candidate).map_err(|_| ValidationError::FileNotReadable)?;
        if header != JPEG_SOI {
            return Err(ValidationError::InvalidImageFile);
        }
    }

    Ok(())
}

/// Lowercased extension including the leading dot, e.g. `".jpg"`.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(JPEG_SOI.len());
    File::open(path)?
        .take(JPEG_SOI.len() as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Whether the current process may read `path`.
#[cfg(unix)]
pub(crate) fn is_readable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
pub(crate) fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

/// Stable identifier for a path: the first 16 hex characters of its SHA-256.
///
/// Used for deduplication and naming only, never as a credential.
pub fn derive_identifier(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(IDENTIFIER_LEN);
    id
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshIntervalError {
    TooShort(i64),
    TooLong(i64),
}

impl RefreshIntervalError {
    pub fn key(self) -> &'static str {
        "out_of_range"
    }
}

impl fmt::Display for RefreshIntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshIntervalError::TooShort(value) => write!(
                f,
                "refresh interval {}s is below the minimum of {}s",
                value, MIN_REFRESH_INTERVAL_SECS
            ),
            RefreshIntervalError::TooLong(value) => write!(
                f,
                "refresh interval {}s exceeds the maximum of {}s",
                value, MAX_REFRESH_INTERVAL_SECS
            ),
        }
    }
}

impl std::error::Error for RefreshIntervalError {}

/// Bounds-check a refresh interval in seconds against [5, 3600].
pub fn validate_refresh_interval(value: i64) -> Result<u32, RefreshIntervalError> {
    if value < i64::from(MIN_REFRESH_INTERVAL_SECS) {
        return Err(RefreshIntervalError::TooShort(value));
    }
    if value > i64::from(MAX_REFRESH_INTERVAL_SECS) {
        return Err(RefreshIntervalError::TooLong(value));
    }
    Ok(value as u32)
}
