//! User and options steps against the in-memory and SQLite stores.

use anyhow::Result;
use std::fs;
use std::path::Path;

use tempfile::tempdir;

use local_file_camera::config_flow::{ABORT_ALREADY_CONFIGURED, ABORT_UNKNOWN_ENTRY};
use local_file_camera::{
    derive_identifier, ConfigFlow, EntryStore, FlowResult, InMemoryEntryStore, OptionsFlow,
    OptionsInput, SqliteEntryStore, UserInput, DEFAULT_REFRESH_INTERVAL_SECS,
};

fn write_jpeg(path: &Path) {
    fs::write(path, [0xFF, 0xD8, 0xFF, 0xDB]).expect("write jpeg");
}

fn input(path: &Path, refresh_interval: Option<i64>) -> UserInput {
    UserInput {
        file_path: path.to_string_lossy().to_string(),
        name: "Garage".to_string(),
        refresh_interval,
    }
}

#[test]
fn empty_submission_shows_form() -> Result<()> {
    let mut store = InMemoryEntryStore::new();
    let result = ConfigFlow::new().step_user(&mut store, None)?;
    assert_eq!(
        result,
        FlowResult::ShowForm {
            step_id: "user",
            errors: Default::default(),
            default_refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    );
    Ok(())
}

#[test]
fn valid_submission_creates_entry() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("garage.jpg");
    write_jpeg(&path);
    let mut store = InMemoryEntryStore::new();

    let result = ConfigFlow::new().step_user(&mut store, Some(input(&path, None)))?;
    let FlowResult::CreateEntry { title, entry } = result else {
        panic!("expected entry, got {result:?}");
    };
    let path_str = path.to_string_lossy().to_string();
    let identifier = derive_identifier(&path_str);
    assert_eq!(title, "Garage");
    assert_eq!(entry.data.file_path, path_str);
    assert_eq!(entry.data.identifier, identifier);
    assert_eq!(entry.data.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
    assert_eq!(entry.unique_id, format!("local_file_camera_{identifier}"));
    assert_eq!(store.get(&entry.unique_id)?, Some(entry));
    Ok(())
}

#[test]
fn path_errors_are_reported_on_the_form() -> Result<()> {
    let dir = tempdir()?;
    let mut store = InMemoryEntryStore::new();
    let flow = ConfigFlow::new();

    let missing = flow.step_user(&mut store, Some(input(&dir.path().join("nope.jpg"), None)))?;
    assert_eq!(
        missing.errors().get("file_path").map(String::as_str),
        Some("file_not_found")
    );

    let relative = flow.step_user(
        &mut store,
        Some(UserInput {
            file_path: "cam.jpg".to_string(),
            name: "Rel".to_string(),
            refresh_interval: None,
        }),
    )?;
    assert_eq!(
        relative.errors().get("file_path").map(String::as_str),
        Some("not_absolute_path")
    );
    assert!(store.entries()?.is_empty());
    Ok(())
}

#[test]
fn refresh_interval_bounds_are_enforced() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("garage.jpg");
    write_jpeg(&path);
    let flow = ConfigFlow::new();

    for rejected in [3601, 4, 0, -30] {
        let mut store = InMemoryEntryStore::new();
        let result = flow.step_user(&mut store, Some(input(&path, Some(rejected))))?;
        assert_eq!(
            result.errors().get("refresh_interval").map(String::as_str),
            Some("out_of_range"),
            "interval {rejected}"
        );
        assert!(store.entries()?.is_empty());
    }

    let mut store = InMemoryEntryStore::new();
    let result = flow.step_user(&mut store, Some(input(&path, Some(30))))?;
    let FlowResult::CreateEntry { entry, .. } = result else {
        panic!("expected entry, got {result:?}");
    };
    assert_eq!(entry.data.refresh_interval_secs, 30);
    Ok(())
}

#[test]
fn same_path_aborts_as_already_configured() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("garage.jpg");
    write_jpeg(&path);
    let mut store = InMemoryEntryStore::new();
    let flow = ConfigFlow::new();

    assert!(matches!(
        flow.step_user(&mut store, Some(input(&path, None)))?,
        FlowResult::CreateEntry { .. }
    ));
    assert_eq!(
        flow.step_user(&mut store, Some(input(&path, Some(60))))?,
        FlowResult::Abort {
            reason: ABORT_ALREADY_CONFIGURED
        }
    );
    assert_eq!(store.entries()?.len(), 1);
    Ok(())
}

#[test]
fn options_update_interval_without_revalidating_path() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("garage.jpg");
    write_jpeg(&path);
    let mut store = SqliteEntryStore::open_in_memory()?;

    let FlowResult::CreateEntry { entry, .. } =
        ConfigFlow::new().step_user(&mut store, Some(input(&path, Some(45))))?
    else {
        panic!("expected entry");
    };

    // The file going away does not block the options step.
    fs::remove_file(&path)?;

    let options = OptionsFlow::new(entry.unique_id.clone());
    let form = options.step_init(&mut store, None)?;
    assert_eq!(
        form,
        FlowResult::ShowForm {
            step_id: "init",
            errors: Default::default(),
            default_refresh_interval: 45,
        }
    );

    let too_long = options.step_init(
        &mut store,
        Some(OptionsInput {
            refresh_interval: Some(3601),
        }),
    )?;
    assert_eq!(
        too_long.errors().get("refresh_interval").map(String::as_str),
        Some("out_of_range")
    );

    let updated = options.step_init(
        &mut store,
        Some(OptionsInput {
            refresh_interval: Some(300),
        }),
    )?;
    assert!(matches!(updated, FlowResult::CreateEntry { .. }));

    let stored = store.get(&entry.unique_id)?.expect("entry");
    assert_eq!(stored.refresh_interval_secs(), 300);
    assert_eq!(stored.data.refresh_interval_secs, 45);
    assert_eq!(stored.data.file_path, entry.data.file_path);
    Ok(())
}

#[test]
fn options_for_unknown_entry_abort() -> Result<()> {
    let mut store = InMemoryEntryStore::new();
    let result = OptionsFlow::new("local_file_camera_ffffffffffffffff").step_init(
        &mut store,
        Some(OptionsInput {
            refresh_interval: Some(60),
        }),
    )?;
    assert_eq!(
        result,
        FlowResult::Abort {
            reason: ABORT_UNKNOWN_ENTRY
        }
    );
    Ok(())
}
