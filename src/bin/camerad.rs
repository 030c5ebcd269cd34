//! camerad - Local File Camera daemon
//!
//! This daemon:
//! 1. Loads camera entries from the entry store
//! 2. Registers each entry and polls its file on the entry's refresh interval
//! 3. Serves current images over the loopback snapshot API
//! 4. Picks up added, removed and re-timed entries while running

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use local_file_camera::{
    api::{ApiConfig, ApiServer},
    config::CameradConfig,
    DeviceRegistry, EntrySync, PollScheduler, SharedScheduler, SqliteEntryStore, SyncSummary,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = CameradConfig::load()?;
    let store = SqliteEntryStore::open(&config.db_path)?;

    let mut registry = DeviceRegistry::new();
    let mut scheduler: SharedScheduler = PollScheduler::new().shared();
    let mut cameras = EntrySync::new();

    let summary = cameras.sync(&store, &mut registry, &mut scheduler)?;
    log_sync(&summary);

    let api_handle = if config.api_enabled {
        let api_config = ApiConfig {
            addr: config.api_addr.clone(),
            token_path: config.api_token_path.clone(),
        };
        let handle = ApiServer::new(api_config, scheduler.clone()).spawn()?;
        log::info!("snapshot api listening on {}", handle.addr);
        if let Some(path) = &handle.token_path {
            log::info!("snapshot api token written to {}", path.display());
        } else {
            log::warn!("snapshot api token (handle securely): {}", handle.token);
        }
        Some(handle)
    } else {
        None
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "camerad running. {} camera(s) from {}",
        cameras.len(),
        config.db_path
    );

    let mut last_health_log = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        {
            let mut polls = scheduler
                .lock()
                .map_err(|_| anyhow!("poll scheduler lock poisoned"))?;
            for report in polls.tick(Instant::now()) {
                log::debug!(
                    "poll {} available={} changed={}",
                    report.handle,
                    report.available,
                    report.changed
                );
            }
        }

        if last_health_log.elapsed() >= config.health_log {
            match cameras.sync(&store, &mut registry, &mut scheduler) {
                Ok(summary) => log_sync(&summary),
                Err(err) => log::error!("entry reload failed: {}", err),
            }
            let polls = scheduler
                .lock()
                .map_err(|_| anyhow!("poll scheduler lock poisoned"))?;
            for status in polls.status() {
                log::info!(
                    "camera {} name={} available={} interval={}s",
                    status.handle,
                    status.name,
                    status.available,
                    status.interval.as_secs()
                );
            }
            last_health_log = Instant::now();
        }

        std::thread::sleep(config.tick);
    }

    log::info!("shutdown signal received, stopping...");
    if let Some(handle) = api_handle {
        handle.stop()?;
    }
    cameras.shutdown(&mut registry, &mut scheduler)?;
    Ok(())
}

fn log_sync(summary: &SyncSummary) {
    if summary == &SyncSummary::default() {
        return;
    }
    log::info!(
        "entries synced: {} added, {} removed, {} re-timed, {} failed",
        summary.added.len(),
        summary.removed.len(),
        summary.rescheduled.len(),
        summary.failed
    );
}
