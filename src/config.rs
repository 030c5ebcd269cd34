use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "local_file_camera.db";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8791";
const DEFAULT_TICK_MS: u64 = 500;
const DEFAULT_HEALTH_LOG_SECS: u64 = 60;

#[derive(Debug, Deserialize, Default)]
struct CameradConfigFile {
    db_path: Option<String>,
    api: Option<ApiConfigFile>,
    poll: Option<PollConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PollConfigFile {
    tick_ms: Option<u64>,
    health_log_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CameradConfig {
    pub db_path: String,
    pub api_enabled: bool,
    pub api_addr: String,
    pub api_token_path: Option<PathBuf>,
    /// How often the daemon wakes to check for due sources.
    pub tick: Duration,
    pub health_log: Duration,
}

impl CameradConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOCAL_FILE_CAMERA_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CameradConfigFile) -> Self {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let api = file.api.unwrap_or_default();
        let poll = file.poll.unwrap_or_default();
        Self {
            db_path,
            api_enabled: api.enabled.unwrap_or(true),
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            api_token_path: api.token_path,
            tick: Duration::from_millis(poll.tick_ms.unwrap_or(DEFAULT_TICK_MS)),
            health_log: Duration::from_secs(
                poll.health_log_secs.unwrap_or(DEFAULT_HEALTH_LOG_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LOCAL_FILE_CAMERA_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(addr) = std::env::var("LOCAL_FILE_CAMERA_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(path) = std::env::var("LOCAL_FILE_CAMERA_API_TOKEN_PATH") {
            if !path.trim().is_empty() {
                self.api_token_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(tick) = std::env::var("LOCAL_FILE_CAMERA_TICK_MS") {
            let ms: u64 = tick.parse().map_err(|_| {
                anyhow!("LOCAL_FILE_CAMERA_TICK_MS must be an integer number of milliseconds")
            })?;
            self.tick = Duration::from_millis(ms);
        }
        if let Ok(secs) = std::env::var("LOCAL_FILE_CAMERA_HEALTH_LOG_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("LOCAL_FILE_CAMERA_HEALTH_LOG_SECS must be an integer number of seconds")
            })?;
            self.health_log = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.tick.is_zero() {
            return Err(anyhow!("poll tick must be greater than zero"));
        }
        if self.health_log.is_zero() {
            return Err(anyhow!("health log interval must be greater than zero"));
        }
        if self.api_enabled {
            self.api_addr
                .parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow!("invalid api addr {}: {}", self.api_addr, e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CameradConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
