//! File-backed camera source.
//!
//! `ImageSource` is responsible for:
//! - Recomputing availability (exists, regular file, readable) on each poll
//! - Returning the file's current bytes on demand
//!
//! `ImageSource` MUST NOT:
//! - Propagate I/O errors to its caller (failures become "unavailable")
//! - Cache bytes between reads
//! - Retry or back off; the next poll is the retry
//!
//! Format and magic bytes are only checked at configuration time. A file
//! replaced in place with a non-image keeps being served.

use std::path::{Path, PathBuf};

use crate::entry::SourceConfig;
use crate::validate::{extension_of, is_readable};

#[derive(Clone, Debug)]
pub struct ImageSource {
    path: PathBuf,
    name: String,
    available: bool,
    reads: u64,
    failed_reads: u64,
}

/// Statistics for an image source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub reads: u64,
    pub failed_reads: u64,
    pub available: bool,
    pub path: String,
}

impl ImageSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            path: PathBuf::from(&config.file_path),
            name: config.display_name.clone(),
            available: true,
            reads: 0,
            failed_reads: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Availability as of the last poll or read.
    pub fn available(&self) -> bool {
        self.available
    }

    pub(crate) fn mark_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Recompute availability from the filesystem.
    pub fn is_available(&mut self) -> bool {
        self.available = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata.is_file() && is_readable(&self.path),
            Err(_) => false,
        };
        self.available
    }

    /// Read the whole file. `None` means unavailable.
    pub fn current_bytes(&mut self) -> Option<Vec<u8>> {
        self.reads += 1;
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                self.available = true;
                Some(bytes)
            }
            Err(err) => {
                log::debug!("{}: read of {} failed: {}", self.name, self.path.display(), err);
                self.failed_reads += 1;
                self.available = false;
                None
            }
        }
    }

    /// MIME type implied by the file extension.
    pub fn content_type(&self) -> &'static str {
        match extension_of(&self.path).as_deref() {
            Some(".jpg") | Some(".jpeg") => "image/jpeg",
            Some(".png") => "image/png",
            Some(".gif") => "image/gif",
            Some(".bmp") => "image/bmp",
            _ => "application/octet-stream",
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            reads: self.reads,
            failed_reads: self.failed_reads,
            available: self.available,
            path: self.path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: &str) -> SourceConfig {
        SourceConfig {
            file_path: path.to_string(),
            display_name: "Test".to_string(),
            identifier: crate::derive_identifier(path),
            refresh_interval_secs: 30,
        }
    }

    #[test]
    fn starts_available() {
        let source = ImageSource::new(&config("/nonexistent/cam.jpg"));
        assert!(source.available());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(ImageSource::new(&config("/a/b.JPEG")).content_type(), "image/jpeg");
        assert_eq!(ImageSource::new(&config("/a/b.png")).content_type(), "image/png");
        assert_eq!(ImageSource::new(&config("/a/b.gif")).content_type(), "image/gif");
        assert_eq!(ImageSource::new(&config("/a/b.bmp")).content_type(), "image/bmp");
        assert_eq!(
            ImageSource::new(&config("/a/b")).content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn failed_read_counts_and_marks_unavailable() {
        let mut source = ImageSource::new(&config("/nonexistent/cam.jpg"));
        assert_eq!(source.current_bytes(), None);
        let stats = source.stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.failed_reads, 1);
        assert!(!stats.available);
    }
}
