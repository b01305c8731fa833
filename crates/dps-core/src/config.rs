use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Cleanup sweep parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// How long a terminal session is kept before the sweep removes it (seconds).
    pub retention_secs: u64,
    /// Interval between sweep passes (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_secs: 1800,
            sweep_interval_secs: 180,
        }
    }
}

/// Scheduler configuration loaded from `~/.config/dps/config.toml`.
///
/// A session may be created with its own copy of this config; that copy
/// drives task sizing and adaptive worker allocation only. The process-wide
/// concurrency gate is sized once from the manager's default config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrent task executions (gate capacity for the default config).
    pub max_workers: usize,
    /// Contiguous work units per task.
    pub units_per_task: u64,
    /// Optional per-task wall-clock timeout in seconds. When set, a task whose
    /// processor call outlives it is marked Failed.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    /// Adaptive worker sizing from CPU/memory signals (on by default).
    pub adaptive_workers: bool,
    /// Monitor loop tick in milliseconds (progress recompute + emit).
    pub monitor_interval_ms: u64,
    /// Optional cleanup sweep settings; built-in defaults are used if missing.
    #[serde(default)]
    pub cleanup: Option<CleanupConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            units_per_task: 5,
            task_timeout_secs: None,
            adaptive_workers: true,
            monitor_interval_ms: 500,
            cleanup: None,
        }
    }
}

impl SchedulerConfig {
    /// Cleanup settings with defaults applied when the section is absent.
    pub fn cleanup_or_default(&self) -> CleanupConfig {
        self.cleanup.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dps")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SchedulerConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SchedulerConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SchedulerConfig = toml::from_str(&data)?;
    Ok(cfg)
}
