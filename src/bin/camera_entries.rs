//! camera_entries - manage Local File Camera config entries
//!
//! Drives the user and options steps against the SQLite entry store, so a
//! running `camerad` picks changes up on its next reload.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use local_file_camera::{
    derive_identifier, unique_id_for, validate_file_path, ConfigFlow, EntryStore, FlowResult,
    ImageSource, OptionsFlow, OptionsInput, SqliteEntryStore, UserInput,
};

#[derive(Parser, Debug)]
#[command(name = "camera_entries", about = "Manage local file camera entries")]
struct Args {
    /// Path to the entry database.
    #[arg(long, env = "LOCAL_FILE_CAMERA_DB_PATH", default_value = "local_file_camera.db")]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a file and create a camera entry for it
    Add {
        #[arg(long)]
        path: String,
        #[arg(long)]
        name: String,
        /// Seconds between polls (5-3600).
        #[arg(long)]
        refresh_interval: Option<i64>,
    },

    /// Change the refresh interval of an existing camera
    SetInterval {
        /// Camera identifier (16 hex characters).
        identifier: String,
        seconds: i64,
    },

    /// Remove a camera entry
    Remove { identifier: String },

    /// List configured cameras
    List {
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check a path without creating an entry
    Validate { path: String },

    /// Write a camera's current image to a file
    Snapshot {
        identifier: String,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Command::Validate { path } = &args.command {
        return validate(path);
    }

    let mut store = SqliteEntryStore::open(&args.db)?;
    run(&mut store, args.command)
}

fn run(store: &mut SqliteEntryStore, command: Command) -> Result<()> {
    match command {
        Command::Add {
            path,
            name,
            refresh_interval,
        } => {
            let input = UserInput {
                file_path: path,
                name,
                refresh_interval,
            };
            let result = ConfigFlow::new().step_user(store, Some(input))?;
            report(result)
        }
        Command::SetInterval {
            identifier,
            seconds,
        } => {
            let flow = OptionsFlow::new(unique_id_for(&identifier));
            let input = OptionsInput {
                refresh_interval: Some(seconds),
            };
            let result = flow.step_init(store, Some(input))?;
            report(result)
        }
        Command::Remove { identifier } => {
            if store.remove(&unique_id_for(&identifier))? {
                println!("removed {}", identifier);
                Ok(())
            } else {
                Err(anyhow!("no camera with identifier {}", identifier))
            }
        }
        Command::List { verbose } => {
            let entries = store.entries()?;
            if entries.is_empty() {
                println!("no cameras configured");
            }
            for entry in entries {
                println!(
                    "{}  {}  every {}s",
                    entry.data.identifier,
                    entry.title,
                    entry.refresh_interval_secs()
                );
                if verbose {
                    println!("  path: {}", entry.data.file_path);
                    println!("  unique_id: {}", entry.unique_id);
                }
            }
            Ok(())
        }
        Command::Snapshot { identifier, output } => {
            let entry = store
                .get(&unique_id_for(&identifier))?
                .ok_or_else(|| anyhow!("no camera with identifier {}", identifier))?;
            let mut source = ImageSource::new(&entry.data);
            let bytes = source
                .current_bytes()
                .ok_or_else(|| anyhow!("camera {} is unavailable", identifier))?;
            std::fs::write(&output, &bytes)?;
            println!(
                "wrote {} bytes ({}) to {}",
                bytes.len(),
                source.content_type(),
                output.display()
            );
            Ok(())
        }
        Command::Validate { path } => validate(&path),
    }
}

fn validate(path: &str) -> Result<()> {
    match validate_file_path(path).into_result() {
        Ok(()) => {
            println!("valid (identifier {})", derive_identifier(path));
            Ok(())
        }
        Err(reason) => Err(anyhow!("invalid: {}", reason)),
    }
}

fn report(result: FlowResult) -> Result<()> {
    match result {
        FlowResult::CreateEntry { entry, .. } => {
            println!(
                "{}  {}  every {}s",
                entry.data.identifier,
                entry.title,
                entry.refresh_interval_secs()
            );
            Ok(())
        }
        FlowResult::ShowForm { errors, .. } => {
            let details = errors
                .iter()
                .map(|(field, reason)| format!("{}: {}", field, reason))
                .collect::<Vec<_>>()
                .join(", ");
            Err(anyhow!("rejected ({})", details))
        }
        FlowResult::Abort { reason } => Err(anyhow!("aborted: {}", reason)),
    }
}
