//! Persisted record shapes.
//!
//! Field names on the wire match the keys the platform stores:
//! `file_path`, `name`, `device_id`, `refresh_interval`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{unique_id_for, DEFAULT_REFRESH_INTERVAL_SECS, DOMAIN};

/// Accepted configuration for one camera. Path and name are fixed once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub file_path: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "device_id")]
    pub identifier: String,
    #[serde(rename = "refresh_interval", default = "default_refresh_interval")]
    pub refresh_interval_secs: u32,
}

fn default_refresh_interval() -> u32 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl SourceConfig {
    pub fn unique_id(&self) -> String {
        unique_id_for(&self.identifier)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_interval_secs))
    }
}

/// Options editable after creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u32>,
}

/// A stored configuration entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub unique_id: String,
    pub title: String,
    pub data: SourceConfig,
    #[serde(default)]
    pub options: EntryOptions,
}

impl ConfigEntry {
    pub fn new(data: SourceConfig) -> Self {
        Self {
            unique_id: data.unique_id(),
            title: data.display_name.clone(),
            data,
            options: EntryOptions::default(),
        }
    }

    /// Refresh interval in seconds, preferring the options override.
    pub fn refresh_interval_secs(&self) -> u32 {
        self.options
            .refresh_interval
            .unwrap_or(self.data.refresh_interval_secs)
    }

    /// Source configuration with options applied.
    pub fn effective_config(&self) -> SourceConfig {
        SourceConfig {
            refresh_interval_secs: self.refresh_interval_secs(),
            ..self.data.clone()
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo::for_source(&self.data)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEntryType {
    Service,
}

/// Device registry record for a camera.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub entry_type: DeviceEntryType,
}

impl DeviceInfo {
    pub fn for_source(config: &SourceConfig) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), config.identifier.clone())],
            name: config.display_name.clone(),
            manufacturer: "Local File".to_string(),
            model: "Static Image Camera".to_string(),
            entry_type: DeviceEntryType::Service,
        }
    }
}
