use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::{default_rules, ClassifyRule};

/// Configuration problems detected before any job is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no devices given")]
    NoDevices,
    #[error("duplicate device id: {0}")]
    DuplicateDevice(String),
    #[error("{devices} devices but {capacities} capacities given")]
    CapacityMismatch { devices: usize, capacities: usize },
    #[error("device {0} has capacity 0")]
    ZeroCapacity(String),
    #[error("invalid capacity value: {0:?}")]
    InvalidCapacity(String),
    #[error("polling interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),
}

/// Resubmission of jobs that failed with a transient (`mem_err`) classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResubmitConfig {
    /// Push `mem_err` pairs back onto the pending list under a new uid.
    pub enabled: bool,
    /// Maximum attempts per pair, including the first (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ResubmitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
        }
    }
}

/// Ordered stderr classification rules; the first rule whose marker occurs wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    pub rules: Vec<ClassifyRule>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

/// Global configuration loaded from `~/.config/migrun/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrunConfig {
    /// Seconds to sleep between polls when no device has a free slot.
    pub refresh_secs: f64,
    /// Seconds a cleanly exited worker may take to show its completion marker
    /// before the job is counted as failed.
    pub marker_grace_secs: f64,
    /// Prefix of completion marker file names.
    pub uid_prefix: String,
    /// Live worker processes tracked before finished ones are reaped eagerly.
    pub max_tracked_processes: usize,
    pub resubmit: ResubmitConfig,
    pub classify: ClassifyConfig,
}

impl Default for MigrunConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 0.2,
            marker_grace_secs: 5.0,
            uid_prefix: "UID_".to_string(),
            max_tracked_processes: 256,
            resubmit: ResubmitConfig::default(),
            classify: ClassifyConfig::default(),
        }
    }
}

impl MigrunConfig {
    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        secs_to_duration(self.refresh_secs)
    }

    pub fn marker_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.marker_grace_secs).unwrap_or(Duration::ZERO)
    }
}

fn secs_to_duration(secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidInterval(secs));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidInterval(secs))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("migrun")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MigrunConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MigrunConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path (`--config`).
pub fn load_from(path: &Path) -> Result<MigrunConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: MigrunConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::ErrorClass;

    #[test]
    fn default_config_values() {
        let cfg = MigrunConfig::default();
        assert!((cfg.refresh_secs - 0.2).abs() < 1e-9);
        assert_eq!(cfg.uid_prefix, "UID_");
        assert_eq!(cfg.max_tracked_processes, 256);
        assert!(cfg.resubmit.enabled);
        assert_eq!(cfg.resubmit.max_attempts, 5);
        assert_eq!(cfg.classify.rules[0].class, ErrorClass::Memory);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = MigrunConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MigrunConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.uid_prefix, cfg.uid_prefix);
        assert_eq!(parsed.classify.rules.len(), cfg.classify.rules.len());
        assert_eq!(parsed.resubmit.max_attempts, cfg.resubmit.max_attempts);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
            refresh_secs = 1.5

            [resubmit]
            enabled = false
            max_attempts = 2
        "#;
        let cfg: MigrunConfig = toml::from_str(toml).unwrap();
        assert!((cfg.refresh_secs - 1.5).abs() < 1e-9);
        assert!(!cfg.resubmit.enabled);
        assert_eq!(cfg.resubmit.max_attempts, 2);
        assert_eq!(cfg.uid_prefix, "UID_");
        assert_eq!(cfg.classify.rules.len(), default_rules().len());
    }

    #[test]
    fn custom_classify_rules() {
        let toml = r#"
            [[classify.rules]]
            marker = "out of memory"
            class = "mem_err"

            [[classify.rules]]
            marker = "Segmentation fault"
            class = "other_err"
        "#;
        let cfg: MigrunConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.classify.rules.len(), 2);
        assert_eq!(cfg.classify.rules[0].marker, "out of memory");
        assert_eq!(cfg.classify.rules[0].class, ErrorClass::Memory);
        assert_eq!(cfg.classify.rules[1].class, ErrorClass::Other);
    }

    #[test]
    fn refresh_interval_rejects_non_positive() {
        let mut cfg = MigrunConfig::default();
        assert_eq!(cfg.refresh_interval().unwrap(), Duration::from_millis(200));
        cfg.refresh_secs = 0.0;
        assert!(matches!(
            cfg.refresh_interval(),
            Err(ConfigError::InvalidInterval(_))
        ));
        cfg.refresh_secs = f64::NAN;
        assert!(cfg.refresh_interval().is_err());
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "uid_prefix = \"DONE_\"\n").unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.uid_prefix, "DONE_");
        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }
}
