//! Configuration loading and typed config structures for the kernel.
//!
//! The configuration lives in a YAML file (by convention `lockstep.yaml`).
//! Every field has a default, so an empty document is a valid config.
//! Environment variables override a few values after parsing:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `LOCKSTEP_SEED` | `simulation.root_seed` |
//! | `LOCKSTEP_WORKERS` | `scheduler.worker_threads` |
//! | `LOCKSTEP_SNAPSHOT_DIR` | `persistence.snapshot_dir` |

use std::path::{Path, PathBuf};

use serde::Deserialize;

use lockstep_types::PhaseName;
use lockstep_world::SpatialConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KernelConfig {
    /// Seed, timing and bounds.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Plugin evaluation settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Scheduling phases.
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseConfig>,

    /// Spatial index settings.
    #[serde(default)]
    pub spatial: SpatialConfig,

    /// Snapshot and replay settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(seed) = env_parse::<u64>("LOCKSTEP_SEED") {
            self.simulation.root_seed = seed;
        }
        if let Some(workers) = env_parse::<usize>("LOCKSTEP_WORKERS") {
            self.scheduler.worker_threads = workers;
        }
        if let Ok(dir) = std::env::var("LOCKSTEP_SNAPSHOT_DIR") {
            self.persistence.snapshot_dir = PathBuf::from(dir);
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSection::default(),
            scheduler: SchedulerConfig::default(),
            phases: default_phases(),
            spatial: SpatialConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Seed, timing and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationSection {
    /// Root seed of every random stream.
    #[serde(default = "default_root_seed")]
    pub root_seed: u64,

    /// Simulated milliseconds per tick.
    #[serde(default = "default_tick_duration_ms")]
    pub tick_duration_ms: u64,

    /// Tick limit (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Wall-clock pause between frames (0 = free-running).
    #[serde(default)]
    pub tick_interval_ms: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            root_seed: default_root_seed(),
            tick_duration_ms: default_tick_duration_ms(),
            max_ticks: 0,
            tick_interval_ms: 0,
        }
    }
}

/// Plugin evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Evaluate (entity, plugin) pairs on a worker pool.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Worker threads (0 = one per core).
    #[serde(default)]
    pub worker_threads: usize,

    /// Per-invocation budget in milliseconds (0 = no timeout).
    ///
    /// Checked after the invocation returns: an overrun is discarded like
    /// a failed invocation, but a plugin that never returns is not
    /// interrupted. The check uses wall-clock time, so enabling it gives
    /// up strict reproducibility.
    #[serde(default)]
    pub plugin_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            worker_threads: 0,
            plugin_timeout_ms: 0,
        }
    }
}

/// One scheduling phase: active on ticks where
/// `tick % every_n_ticks == offset`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhaseConfig {
    /// Phase name referenced by plugin declarations.
    pub name: PhaseName,

    /// Period in ticks.
    #[serde(default = "default_every_n_ticks")]
    pub every_n_ticks: u64,

    /// Offset within the period.
    #[serde(default)]
    pub offset: u64,
}

/// Snapshot and replay settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for save files.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Save every N ticks (0 = only at the end).
    #[serde(default)]
    pub snapshot_every_n_ticks: u64,

    /// Replay log path.
    #[serde(default = "default_replay_log")]
    pub replay_log: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            snapshot_every_n_ticks: 0,
            replay_log: default_replay_log(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_root_seed() -> u64 {
    42
}

const fn default_tick_duration_ms() -> u64 {
    100
}

const fn default_true() -> bool {
    true
}

const fn default_every_n_ticks() -> u64 {
    1
}

fn default_phases() -> Vec<PhaseConfig> {
    vec![PhaseConfig {
        name: PhaseName::from("default"),
        every_n_ticks: 1,
        offset: 0,
    }]
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("saves")
}

fn default_replay_log() -> PathBuf {
    PathBuf::from("replay.jsonl")
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KernelConfig::default();
        assert_eq!(config.simulation.root_seed, 42);
        assert_eq!(config.simulation.tick_duration_ms, 100);
        assert!(config.scheduler.parallel);
        assert_eq!(config.phases.len(), 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
simulation:
  root_seed: 123
  tick_duration_ms: 50
  max_ticks: 600
scheduler:
  parallel: false
  worker_threads: 3
  plugin_timeout_ms: 20
phases:
  - name: default
  - name: sensors
    every_n_ticks: 5
    offset: 2
spatial:
  cell_size: 250.0
  position_component: Transform
persistence:
  snapshot_dir: "out/saves"
  snapshot_every_n_ticks: 100
logging:
  level: "debug"
  json: true
"#;
        let config = KernelConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();
        assert_eq!(config.simulation.max_ticks, 600);
        assert!(!config.scheduler.parallel);
        assert_eq!(config.scheduler.plugin_timeout_ms, 20);
        assert_eq!(config.phases.len(), 2);
        let sensors = config.phases.get(1).cloned();
        assert_eq!(sensors.map(|p| (p.every_n_ticks, p.offset)), Some((5, 2)));
        assert!(config.logging.json);
        assert_eq!(config.persistence.snapshot_every_n_ticks, 100);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = KernelConfig::parse("simulation:\n  tick_duration_ms: 7\n");
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();
        assert_eq!(config.simulation.tick_duration_ms, 7);
        assert_eq!(config.phases.len(), 1);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(KernelConfig::parse("").is_ok());
    }

    #[test]
    fn phase_period_defaults_to_every_tick() {
        let config = KernelConfig::parse("phases:\n  - name: only\n").ok().unwrap_or_default();
        assert_eq!(config.phases.first().map(|p| p.every_n_ticks), Some(1));
    }
}
