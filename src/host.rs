//! Host capabilities: entity registration and poll scheduling.
//!
//! Both are traits so an embedding platform can supply its own. The
//! in-process versions here back the `camerad` daemon and the tests.

use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::entry::{ConfigEntry, DeviceInfo, SourceConfig};
use crate::source::ImageSource;
use crate::store::EntryStore;

/// Opaque handle for a registered camera entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(String);

impl EntityHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait Registrar {
    fn register(&mut self, config: &SourceConfig) -> Result<EntityHandle>;

    fn unregister(&mut self, handle: &EntityHandle) -> Result<()>;
}

pub trait Scheduler {
    /// Start polling `source` every `interval`. The first poll is due immediately.
    fn schedule(
        &mut self,
        handle: EntityHandle,
        source: ImageSource,
        interval: Duration,
    ) -> Result<()>;

    fn reschedule(&mut self, handle: &EntityHandle, interval: Duration) -> Result<()>;

    /// Stop polling. Returns whether the handle was scheduled.
    fn cancel(&mut self, handle: &EntityHandle) -> Result<bool>;
}

/// In-process device registry.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<EntityHandle, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, handle: &EntityHandle) -> Option<&DeviceInfo> {
        self.devices.get(handle)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Registrar for DeviceRegistry {
    fn register(&mut self, config: &SourceConfig) -> Result<EntityHandle> {
        let handle = EntityHandle(config.unique_id());
        if self.devices.contains_key(&handle) {
            return Err(anyhow!("entity {} is already registered", handle));
        }
        self.devices
            .insert(handle.clone(), DeviceInfo::for_source(config));
        Ok(handle)
    }

    fn unregister(&mut self, handle: &EntityHandle) -> Result<()> {
        self.devices
            .remove(handle)
            .map(|_| ())
            .ok_or_else(|| anyhow!("entity {} is not registered", handle))
    }
}

/// Outcome of polling one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReport {
    pub handle: EntityHandle,
    pub available: bool,
    /// Availability differs from the previous poll.
    pub changed: bool,
}

/// Current state of a scheduled camera.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraStatus {
    pub handle: EntityHandle,
    pub name: String,
    pub available: bool,
    pub interval: Duration,
}

struct Scheduled {
    source: ImageSource,
    interval: Duration,
    next_due: Option<Instant>,
}

/// Deterministic scheduler driven by explicit `tick` calls.
#[derive(Default)]
pub struct PollScheduler {
    jobs: BTreeMap<EntityHandle, Scheduled>,
}

pub type SharedScheduler = Arc<Mutex<PollScheduler>>;

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedScheduler {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Recompute availability of every source due at `now`.
    ///
    /// Polls never read image bytes; those are read on demand.
    pub fn tick(&mut self, now: Instant) -> Vec<PollReport> {
        let mut reports = Vec::new();
        for (handle, job) in self.jobs.iter_mut() {
            if job.next_due.is_some_and(|due| due > now) {
                continue;
            }
            job.next_due = Some(now + job.interval);

            let previous = job.source.available();
            let available = job.source.is_available();
            let changed = previous != available;
            if changed {
                if available {
                    log::info!("camera {} available again: {}", handle, job.source.path().display());
                } else {
                    log::warn!("camera {} unavailable: {}", handle, job.source.path().display());
                }
            }

            reports.push(PollReport {
                handle: handle.clone(),
                available,
                changed,
            });
        }
        reports
    }

    /// Earliest instant at which some source is due.
    pub fn next_due(&self) -> Option<Instant> {
        self.jobs.values().filter_map(|job| job.next_due).min()
    }

    /// Detached copy of the source for `handle`, for reads done without
    /// holding the scheduler.
    pub fn reader(&self, handle: &EntityHandle) -> Option<ImageSource> {
        self.jobs.get(handle).map(|job| job.source.clone())
    }

    /// Fold the outcome of a detached read back into the scheduled source.
    pub fn record_read(&mut self, handle: &EntityHandle, available: bool) {
        if let Some(job) = self.jobs.get_mut(handle) {
            job.source.mark_available(available);
        }
    }

    pub fn find(&self, identifier: &str) -> Option<EntityHandle> {
        let unique_id = crate::unique_id_for(identifier);
        self.jobs
            .keys()
            .find(|handle| handle.as_str() == unique_id)
            .cloned()
    }

    pub fn status(&self) -> Vec<CameraStatus> {
        self.jobs
            .iter()
            .map(|(handle, job)| CameraStatus {
                handle: handle.clone(),
                name: job.source.name().to_string(),
                available: job.source.available(),
                interval: job.interval,
            })
            .collect()
    }
}

impl Scheduler for PollScheduler {
    fn schedule(
        &mut self,
        handle: EntityHandle,
        source: ImageSource,
        interval: Duration,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.jobs.contains_key(&handle) {
            return Err(anyhow!("camera {} is already scheduled", handle));
        }
        self.jobs.insert(
            handle,
            Scheduled {
                source,
                interval,
                next_due: None,
            },
        );
        Ok(())
    }

    fn reschedule(&mut self, handle: &EntityHandle, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        let job = self
            .jobs
            .get_mut(handle)
            .ok_or_else(|| anyhow!("camera {} is not scheduled", handle))?;
        job.interval = interval;
        job.next_due = None;
        Ok(())
    }

    fn cancel(&mut self, handle: &EntityHandle) -> Result<bool> {
        Ok(self.jobs.remove(handle).is_some())
    }
}

pub(crate) fn lock(shared: &SharedScheduler) -> Result<MutexGuard<'_, PollScheduler>> {
    shared
        .lock()
        .map_err(|_| anyhow!("poll scheduler lock poisoned"))
}

impl Scheduler for SharedScheduler {
    fn schedule(
        &mut self,
        handle: EntityHandle,
        source: ImageSource,
        interval: Duration,
    ) -> Result<()> {
        lock(self)?.schedule(handle, source, interval)
    }

    fn reschedule(&mut self, handle: &EntityHandle, interval: Duration) -> Result<()> {
        lock(self)?.reschedule(handle, interval)
    }

    fn cancel(&mut self, handle: &EntityHandle) -> Result<bool> {
        lock(self)?.cancel(handle)
    }
}

/// Register a stored entry and start polling it.
pub fn setup_entry(
    entry: &ConfigEntry,
    registrar: &mut dyn Registrar,
    scheduler: &mut dyn Scheduler,
) -> Result<EntityHandle> {
    let config = entry.effective_config();
    let handle = registrar.register(&config)?;
    if let Err(err) = scheduler.schedule(
        handle.clone(),
        ImageSource::new(&config),
        config.refresh_interval(),
    ) {
        registrar.unregister(&handle)?;
        return Err(err);
    }
    log::info!(
        "camera {} ({}) polling {} every {}s",
        handle,
        config.display_name,
        config.file_path,
        config.refresh_interval_secs
    );
    Ok(handle)
}

/// Stop polling and unregister an entity.
pub fn unload_entry(
    handle: &EntityHandle,
    registrar: &mut dyn Registrar,
    scheduler: &mut dyn Scheduler,
) -> Result<()> {
    scheduler.cancel(handle)?;
    registrar.unregister(handle)?;
    Ok(())
}

/// What one `EntrySync::sync` pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: Vec<EntityHandle>,
    pub removed: Vec<EntityHandle>,
    pub rescheduled: Vec<EntityHandle>,
    pub failed: usize,
}

/// Keeps the set of running cameras in line with an entry store.
///
/// A failure on one entry is logged and counted; the rest of the pass still runs.
#[derive(Debug, Default)]
pub struct EntrySync {
    /// unique id -> (handle, scheduled refresh interval in seconds)
    running: BTreeMap<String, (EntityHandle, u32)>,
}

impl EntrySync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn handle_of(&self, unique_id: &str) -> Option<&EntityHandle> {
        self.running.get(unique_id).map(|(handle, _)| handle)
    }

    /// Refresh interval in seconds a running camera was scheduled with.
    pub fn interval_of(&self, unique_id: &str) -> Option<u32> {
        self.running.get(unique_id).map(|(_, secs)| *secs)
    }

    pub fn sync(
        &mut self,
        store: &dyn EntryStore,
        registrar: &mut dyn Registrar,
        scheduler: &mut dyn Scheduler,
    ) -> Result<SyncSummary> {
        let entries = store.entries()?;
        let mut summary = SyncSummary::default();

        let stale: Vec<String> = self
            .running
            .keys()
            .filter(|unique_id| !entries.iter().any(|entry| &entry.unique_id == *unique_id))
            .cloned()
            .collect();
        for unique_id in stale {
            let Some((handle, _)) = self.running.remove(&unique_id) else {
                continue;
            };
            match unload_entry(&handle, registrar, scheduler) {
                Ok(()) => {
                    log::info!("camera {} removed", handle);
                    summary.removed.push(handle);
                }
                Err(err) => {
                    log::error!("camera {} unload failed: {}", handle, err);
                    summary.failed += 1;
                }
            }
        }

        for entry in entries {
            let interval = entry.refresh_interval_secs();
            match self.running.get_mut(&entry.unique_id) {
                Some((_, current)) if *current == interval => {}
                Some((handle, current)) => {
                    let period = Duration::from_secs(u64::from(interval));
                    match scheduler.reschedule(handle, period) {
                        Ok(()) => {
                            log::info!("camera {} refresh interval now {}s", handle, interval);
                            *current = interval;
                            summary.rescheduled.push(handle.clone());
                        }
                        Err(err) => {
                            log::error!("camera {} reschedule failed: {}", handle, err);
                            summary.failed += 1;
                        }
                    }
                }
                None => match setup_entry(&entry, registrar, scheduler) {
                    Ok(handle) => {
                        self.running
                            .insert(entry.unique_id.clone(), (handle.clone(), interval));
                        summary.added.push(handle);
                    }
                    Err(err) => {
                        log::error!("camera {} setup failed: {}", entry.unique_id, err);
                        summary.failed += 1;
                    }
                },
            }
        }
        Ok(summary)
    }

    /// Unload every running camera.
    pub fn shutdown(
        &mut self,
        registrar: &mut dyn Registrar,
        scheduler: &mut dyn Scheduler,
    ) -> Result<()> {
        for (handle, _) in std::mem::take(&mut self.running).into_values() {
            unload_entry(&handle, registrar, scheduler)?;
        }
        Ok(())
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
            refresh_interval_secs: 10,
        }
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = DeviceRegistry::new();
        let cfg = config("/srv/a.jpg");
        let handle = registry.register(&cfg).expect("register");
        assert_eq!(handle.as_str(), cfg.unique_id());
        assert!(registry.register(&cfg).is_err());
        registry.unregister(&handle).expect("unregister");
        assert!(registry.is_empty());
        assert!(registry.unregister(&handle).is_err());
    }

    #[test]
    fn tick_respects_interval() {
        let mut scheduler = PollScheduler::new();
        let cfg = config("/nonexistent/a.jpg");
        let handle = EntityHandle(cfg.unique_id());
        scheduler
            .schedule(handle.clone(), ImageSource::new(&cfg), cfg.refresh_interval())
            .expect("schedule");

        let start = Instant::now();
        let first = scheduler.tick(start);
        assert_eq!(first.len(), 1);
        assert!(!first[0].available);
        assert!(first[0].changed);

        assert!(scheduler.tick(start + Duration::from_secs(5)).is_empty());

        let again = scheduler.tick(start + Duration::from_secs(10));
        assert_eq!(again.len(), 1);
        assert!(!again[0].changed);
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_secs(20)));
    }

    #[test]
    fn schedule_rejects_zero_interval() {
        let mut scheduler = PollScheduler::new();
        let cfg = config("/srv/a.jpg");
        assert!(scheduler
            .schedule(EntityHandle(cfg.unique_id()), ImageSource::new(&cfg), Duration::ZERO)
            .is_err());
    }
}
