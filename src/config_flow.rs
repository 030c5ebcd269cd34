//! Configuration and options steps.
//!
//! Validation problems never fail the flow: they come back as field-level
//! errors on a re-shown form. Only storage failures propagate as `Err`.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::entry::{ConfigEntry, EntryOptions, SourceConfig};
use crate::store::EntryStore;
use crate::validate::{derive_identifier, validate_file_path, validate_refresh_interval};
use crate::{unique_id_for, CONF_FILE_PATH, CONF_REFRESH_INTERVAL, DEFAULT_REFRESH_INTERVAL_SECS};

pub const STEP_USER: &str = "user";
pub const STEP_INIT: &str = "init";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
pub const ABORT_UNKNOWN_ENTRY: &str = "unknown_entry";

/// Values submitted on the user step.
#[derive(Clone, Debug)]
pub struct UserInput {
    pub file_path: String,
    pub name: String,
    pub refresh_interval: Option<i64>,
}

/// Values submitted on the options step.
#[derive(Clone, Debug, Default)]
pub struct OptionsInput {
    pub refresh_interval: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowResult {
    ShowForm {
        step_id: &'static str,
        errors: BTreeMap<String, String>,
        /// Suggested refresh interval for the form.
        default_refresh_interval: u32,
    },
    CreateEntry {
        title: String,
        entry: ConfigEntry,
    },
    Abort {
        reason: &'static str,
    },
}

impl FlowResult {
    fn form(step_id: &'static str, errors: BTreeMap<String, String>, default: u32) -> Self {
        FlowResult::ShowForm {
            step_id,
            errors,
            default_refresh_interval: default,
        }
    }

    /// Field errors if this is a form, otherwise empty.
    pub fn errors(&self) -> BTreeMap<String, String> {
        match self {
            FlowResult::ShowForm { errors, .. } => errors.clone(),
            _ => BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigFlow;

impl ConfigFlow {
    pub fn new() -> Self {
        Self
    }

    /// Initial step: show the form, or validate and persist a submission.
    pub fn step_user(
        &self,
        store: &mut dyn EntryStore,
        input: Option<UserInput>,
    ) -> Result<FlowResult> {
        let Some(input) = input else {
            return Ok(FlowResult::form(
                STEP_USER,
                BTreeMap::new(),
                DEFAULT_REFRESH_INTERVAL_SECS,
            ));
        };

        let mut errors = BTreeMap::new();
        let refresh_interval = match input.refresh_interval {
            None => Some(DEFAULT_REFRESH_INTERVAL_SECS),
            Some(value) => match validate_refresh_interval(value) {
                Ok(secs) => Some(secs),
                Err(err) => {
                    errors.insert(CONF_REFRESH_INTERVAL.to_string(), err.key().to_string());
                    None
                }
            },
        };

        if let Err(reason) = validate_file_path(&input.file_path).into_result() {
            log::debug!("rejected camera path {}: {}", input.file_path, reason);
            errors.insert(CONF_FILE_PATH.to_string(), reason.key().to_string());
        }

        let Some(refresh_interval_secs) = refresh_interval.filter(|_| errors.is_empty()) else {
            return Ok(FlowResult::form(
                STEP_USER,
                errors,
                DEFAULT_REFRESH_INTERVAL_SECS,
            ));
        };

        let identifier = derive_identifier(&input.file_path);
        if store.contains(&unique_id_for(&identifier))? {
            return Ok(FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            });
        }

        let entry = ConfigEntry::new(SourceConfig {
            file_path: input.file_path,
            display_name: input.name,
            identifier,
            refresh_interval_secs,
        });
        store.insert(&entry)?;
        log::info!(
            "created camera entry {} for {}",
            entry.unique_id,
            entry.data.file_path
        );

        Ok(FlowResult::CreateEntry {
            title: entry.title.clone(),
            entry,
        })
    }
}

/// Post-creation options. Only the refresh interval is editable.
#[derive(Debug)]
pub struct OptionsFlow {
    unique_id: String,
}

impl OptionsFlow {
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
        }
    }

    pub fn step_init(
        &self,
        store: &mut dyn EntryStore,
        input: Option<OptionsInput>,
    ) -> Result<FlowResult> {
        let Some(entry) = store.get(&self.unique_id)? else {
            return Ok(FlowResult::Abort {
                reason: ABORT_UNKNOWN_ENTRY,
            });
        };
        let current = entry.refresh_interval_secs();

        let Some(input) = input else {
            return Ok(FlowResult::form(STEP_INIT, BTreeMap::new(), current));
        };

        let refresh_interval = match input.refresh_interval {
            None => current,
            Some(value) => match validate_refresh_interval(value) {
                Ok(secs) => secs,
                Err(err) => {
                    let mut errors = BTreeMap::new();
                    errors.insert(CONF_REFRESH_INTERVAL.to_string(), err.key().to_string());
                    return Ok(FlowResult::form(STEP_INIT, errors, current));
                }
            },
        };

        let options = EntryOptions {
            refresh_interval: Some(refresh_interval),
        };
        store.update_options(&self.unique_id, &options)?;
        log::info!(
            "camera entry {} refresh interval set to {}s",
            self.unique_id,
            refresh_interval
        );

        let mut updated = entry;
        updated.options = options;
        Ok(FlowResult::CreateEntry {
            title: String::new(),
            entry: updated,
        })
    }
}
