//! Local File Camera
//!
//! This crate exposes a single image file on local disk as a pollable camera
//! source.
//!
//! # Architecture
//!
//! A camera is configured once and re-read on an interval:
//!
//! 1. **Configuration**: `config_flow` collects a path, a display name and a
//!    refresh interval, validates the path and derives a stable identifier.
//! 2. **Persistence**: the accepted record is written to an `EntryStore`
//!    keyed by `"{DOMAIN}_{identifier}"`.
//! 3. **Polling**: an `ImageSource` built from the record is polled by a
//!    `Scheduler`; availability is recomputed on every poll and read failures
//!    degrade the camera to "unavailable" instead of surfacing errors.
//!
//! # Module Structure
//!
//! - `validate`: path validation and identifier derivation
//! - `entry`: persisted record shapes (`SourceConfig`, `ConfigEntry`)
//! - `store`: key-value persistence for config entries (in-memory, SQLite)
//! - `config_flow`: user and options steps
//! - `source`: `ImageSource`, the file-backed camera
//! - `host`: `Registrar` / `Scheduler` capabilities and in-process versions
//! - `api`: local snapshot server
//! - `config`: daemon configuration

pub mod api;
pub mod config;
pub mod config_flow;
pub mod entry;
pub mod host;
pub mod source;
pub mod store;
pub mod validate;

pub use config_flow::{ConfigFlow, FlowResult, OptionsFlow, OptionsInput, UserInput};
pub use entry::{ConfigEntry, DeviceInfo, EntryOptions, SourceConfig};
pub use host::{
    setup_entry, unload_entry, CameraStatus, DeviceRegistry, EntityHandle, EntrySync, PollReport,
    PollScheduler, Registrar, Scheduler, SharedScheduler, SyncSummary,
};
pub use source::{ImageSource, SourceStats};
pub use store::{EntryStore, InMemoryEntryStore, SqliteEntryStore};
pub use validate::{
    derive_identifier, validate_file_path, validate_refresh_interval, RefreshIntervalError,
    ValidationError, ValidationResult,
};

/// Integration domain; prefixes every unique id.
pub const DOMAIN: &str = "local_file_camera";

pub const CONF_FILE_PATH: &str = "file_path";
pub const CONF_NAME: &str = "name";
pub const CONF_DEVICE_ID: &str = "device_id";
pub const CONF_REFRESH_INTERVAL: &str = "refresh_interval";

pub const DEFAULT_REFRESH_INTERVAL_SECS: u32 = 30;
pub const MIN_REFRESH_INTERVAL_SECS: u32 = 5;
pub const MAX_REFRESH_INTERVAL_SECS: u32 = 3600;

/// Accepted image extensions (lowercase, with leading dot).
pub const VALID_IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp"];

/// JPEG start-of-image marker.
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Length of a derived identifier, in hex characters.
pub const IDENTIFIER_LEN: usize = 16;

/// Composite key under which an entry is persisted.
pub fn unique_id_for(identifier: &str) -> String {
    format!("{}_{}", DOMAIN, identifier)
}

pub(crate) fn now_s() -> anyhow::Result<u64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_is_prefixed_with_domain() {
        assert_eq!(
            unique_id_for("0123456789abcdef"),
            "local_file_camera_0123456789abcdef"
        );
    }

    #[test]
    fn refresh_bounds_contain_default() {
        assert!(MIN_REFRESH_INTERVAL_SECS <= DEFAULT_REFRESH_INTERVAL_SECS);
        assert!(DEFAULT_REFRESH_INTERVAL_SECS <= MAX_REFRESH_INTERVAL_SECS);
    }
}
