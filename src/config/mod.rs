//! Configuration management for Svarog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{HyperbolicState, Name, RoutingAlgorithm};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Link probing and RTT cost configuration.
    #[serde(default)]
    pub link_cost: LinkCostConfig,

    /// Online model configuration.
    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    /// Routing decision configuration.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.link_cost.validate()?;
        self.adaptive.validate()?;

        if self.routing.calculation_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "routing.calculation_interval must be non-zero".into(),
            ));
        }

        Ok(())
    }
}

/// Link probing and RTT-derived cost configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCostConfig {
    /// Base interval between probes to one neighbor.
    #[serde(default = "default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,

    /// Upper bound (exclusive) of the random jitter added to each probe interval.
    #[serde(default = "default_probe_jitter", with = "humantime_serde")]
    pub probe_jitter: Duration,

    /// Lifetime of an outstanding probe before it counts as timed out.
    #[serde(default = "default_probe_lifetime", with = "humantime_serde")]
    pub probe_lifetime: Duration,

    /// Delay between `start` and the first probe round.
    #[serde(default = "default_warm_up", with = "humantime_serde")]
    pub warm_up: Duration,

    /// Interval of the periodic status report.
    #[serde(default = "default_status_report_interval", with = "humantime_serde")]
    pub status_report_interval: Duration,

    /// Hello timeouts after which a neighbor is considered INACTIVE.
    #[serde(default = "default_retry_threshold")]
    pub retry_threshold: u32,

    /// Maximum cost as a multiple of the configured cost.
    #[serde(default = "default_max_cost_multiplier")]
    pub max_cost_multiplier: f64,

    /// Minimum relative change before an RTT-derived cost is applied.
    #[serde(default = "default_cost_change_threshold")]
    pub cost_change_threshold: f64,

    /// Minimum relative change of the final (post-hook) cost.
    #[serde(default = "default_fine_change_threshold")]
    pub fine_change_threshold: f64,

    /// Minimum spacing of rebuild requests triggered by one neighbor.
    #[serde(default = "default_trigger_interval", with = "humantime_serde")]
    pub trigger_interval: Duration,

    /// Samples required before performance feedback is emitted.
    #[serde(default = "default_min_feedback_samples")]
    pub min_feedback_samples: usize,

    /// Samples required before a new cost is computed.
    #[serde(default = "default_min_cost_samples")]
    pub min_cost_samples: usize,

    /// Maximum RTT samples kept per neighbor.
    #[serde(default = "default_rtt_history_capacity")]
    pub rtt_history_capacity: usize,

    /// RTTs below this are clamped up to it.
    #[serde(default = "default_rtt_floor", with = "humantime_serde")]
    pub rtt_floor: Duration,

    /// RTTs above this are discarded as outliers.
    #[serde(default = "default_rtt_ceiling", with = "humantime_serde")]
    pub rtt_ceiling: Duration,
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_probe_jitter() -> Duration {
    Duration::from_millis(5000)
}
fn default_probe_lifetime() -> Duration {
    Duration::from_secs(4)
}
fn default_warm_up() -> Duration {
    Duration::from_secs(30)
}
fn default_status_report_interval() -> Duration {
    Duration::from_secs(600)
}
fn default_retry_threshold() -> u32 {
    3
}
fn default_max_cost_multiplier() -> f64 {
    5.0
}
fn default_cost_change_threshold() -> f64 {
    0.1
}
fn default_fine_change_threshold() -> f64 {
    0.05
}
fn default_trigger_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_min_feedback_samples() -> usize {
    5
}
fn default_min_cost_samples() -> usize {
    3
}
fn default_rtt_history_capacity() -> usize {
    50
}
fn default_rtt_floor() -> Duration {
    Duration::from_millis(1)
}
fn default_rtt_ceiling() -> Duration {
    Duration::from_millis(5000)
}

impl Default for LinkCostConfig {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            probe_jitter: default_probe_jitter(),
            probe_lifetime: default_probe_lifetime(),
            warm_up: default_warm_up(),
            status_report_interval: default_status_report_interval(),
            retry_threshold: default_retry_threshold(),
            max_cost_multiplier: default_max_cost_multiplier(),
            cost_change_threshold: default_cost_change_threshold(),
            fine_change_threshold: default_fine_change_threshold(),
            trigger_interval: default_trigger_interval(),
            min_feedback_samples: default_min_feedback_samples(),
            min_cost_samples: default_min_cost_samples(),
            rtt_history_capacity: default_rtt_history_capacity(),
            rtt_floor: default_rtt_floor(),
            rtt_ceiling: default_rtt_ceiling(),
        }
    }
}

impl LinkCostConfig {
    fn validate(&self) -> Result<()> {
        if !(self.max_cost_multiplier >= 1.0) {
            return Err(Error::InvalidConfig(
                "link_cost.max_cost_multiplier must be at least 1".into(),
            ));
        }
        for (field, value) in [
            ("cost_change_threshold", self.cost_change_threshold),
            ("fine_change_threshold", self.fine_change_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "link_cost.{field} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.probe_interval.is_zero() || self.probe_lifetime.is_zero() {
            return Err(Error::InvalidConfig(
                "link_cost probe interval and lifetime must be non-zero".into(),
            ));
        }
        if self.rtt_history_capacity < self.min_cost_samples.max(6) {
            return Err(Error::InvalidConfig(format!(
                "link_cost.rtt_history_capacity must hold at least {} samples",
                self.min_cost_samples.max(6)
            )));
        }
        if self.rtt_floor >= self.rtt_ceiling {
            return Err(Error::InvalidConfig(
                "link_cost.rtt_floor must be below rtt_ceiling".into(),
            ));
        }
        Ok(())
    }
}

/// Online cost model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Starting learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Lower learning-rate bound.
    #[serde(default = "default_min_learning_rate")]
    pub min_learning_rate: f64,

    /// Upper learning-rate bound.
    #[serde(default = "default_max_learning_rate")]
    pub max_learning_rate: f64,

    /// Prediction error above which the model is updated immediately.
    #[serde(default = "default_adaptation_threshold")]
    pub adaptation_threshold: f64,

    /// Maximum time without a model update while feedback keeps arriving.
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// RTT (milliseconds) below which a sample counts as a success.
    #[serde(default = "default_success_rtt_ms")]
    pub success_rtt_ms: f64,

    /// Smoothing factor of the per-time-slot performance average.
    #[serde(default = "default_temporal_alpha")]
    pub temporal_alpha: f64,

    /// RTT samples mirrored per neighbor for feature extraction.
    #[serde(default = "default_rtt_mirror_capacity")]
    pub rtt_mirror_capacity: usize,

    /// Performance records kept per neighbor.
    #[serde(default = "default_performance_history_capacity")]
    pub performance_history_capacity: usize,

    /// Prediction errors averaged to steer the learning rate.
    #[serde(default = "default_error_window")]
    pub error_window: usize,
}

fn default_learning_rate() -> f64 {
    0.01
}
fn default_min_learning_rate() -> f64 {
    0.001
}
fn default_max_learning_rate() -> f64 {
    0.05
}
fn default_adaptation_threshold() -> f64 {
    0.2
}
fn default_refresh_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_success_rtt_ms() -> f64 {
    500.0
}
fn default_temporal_alpha() -> f64 {
    0.1
}
fn default_rtt_mirror_capacity() -> usize {
    20
}
fn default_performance_history_capacity() -> usize {
    100
}
fn default_error_window() -> usize {
    20
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            min_learning_rate: default_min_learning_rate(),
            max_learning_rate: default_max_learning_rate(),
            adaptation_threshold: default_adaptation_threshold(),
            refresh_interval: default_refresh_interval(),
            success_rtt_ms: default_success_rtt_ms(),
            temporal_alpha: default_temporal_alpha(),
            rtt_mirror_capacity: default_rtt_mirror_capacity(),
            performance_history_capacity: default_performance_history_capacity(),
            error_window: default_error_window(),
        }
    }
}

impl AdaptiveConfig {
    fn validate(&self) -> Result<()> {
        if !(self.min_learning_rate > 0.0 && self.min_learning_rate <= self.max_learning_rate) {
            return Err(Error::InvalidConfig(
                "adaptive learning-rate bounds must satisfy 0 < min <= max".into(),
            ));
        }
        if self.learning_rate < self.min_learning_rate || self.learning_rate > self.max_learning_rate
        {
            return Err(Error::InvalidConfig(
                "adaptive.learning_rate must lie within its bounds".into(),
            ));
        }
        if !(self.temporal_alpha > 0.0 && self.temporal_alpha <= 1.0) {
            return Err(Error::InvalidConfig(
                "adaptive.temporal_alpha must be in (0, 1]".into(),
            ));
        }
        if self.rtt_mirror_capacity < 10 || self.error_window == 0 {
            return Err(Error::InvalidConfig(
                "adaptive histories are too small for feature extraction".into(),
            ));
        }
        Ok(())
    }
}

/// Routing decision configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// This router's name.
    #[serde(default = "default_router_name")]
    pub router_name: Name,

    /// Cost-aware algorithm selection.
    #[serde(default)]
    pub algorithm: RoutingAlgorithm,

    /// Hyperbolic routing mode.
    #[serde(default)]
    pub hyperbolic: HyperbolicState,

    /// Delay between a recalculation trigger and the calculation.
    #[serde(default = "default_calculation_interval", with = "humantime_serde")]
    pub calculation_interval: Duration,
}

fn default_router_name() -> Name {
    Name::from("/localhost/router")
}
fn default_calculation_interval() -> Duration {
    Duration::from_secs(15)
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            router_name: default_router_name(),
            algorithm: RoutingAlgorithm::default(),
            hyperbolic: HyperbolicState::default(),
            calculation_interval: default_calculation_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log file path.
    pub file: Option<PathBuf>,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if let Some(path) = &config.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Config(format!("Failed to open log file: {e}")))?;
        let writer = std::sync::Mutex::new(file);
        return if config.format == "json" {
            subscriber
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))
        } else {
            subscriber
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))
        };
    }

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.link_cost.retry_threshold, 3);
        assert_eq!(config.link_cost.probe_interval, Duration::from_secs(30));
        assert_eq!(config.adaptive.rtt_mirror_capacity, 20);
        assert_eq!(config.routing.algorithm, RoutingAlgorithm::LinkState);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [link_cost]
            probe_interval = "10s"
            max_cost_multiplier = 3.0

            [routing]
            router_name = "/ndn/edu/site/router"
            algorithm = "load_aware"
            hyperbolic = "dry_run"
            calculation_interval = "500ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.link_cost.probe_interval, Duration::from_secs(10));
        assert!((config.link_cost.max_cost_multiplier - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.link_cost.warm_up, Duration::from_secs(30));
        assert_eq!(config.routing.router_name.as_str(), "/ndn/edu/site/router");
        assert_eq!(config.routing.algorithm, RoutingAlgorithm::LoadAware);
        assert_eq!(config.routing.hyperbolic, HyperbolicState::DryRun);
        assert_eq!(config.routing.calculation_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = Config::from_toml_str("[link_cost]\nmax_cost_multiplier = 0.5").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_toml_str("[link_cost]\ncost_change_threshold = 0.0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_toml_str(
            "[adaptive]\nmin_learning_rate = 0.1\nmax_learning_rate = 0.01",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = Config::from_toml_str("[link_cost]\nrtt_floor = \"6s\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let path = dir.path().join("svarog.toml");

        let mut config = Config::default();
        config.routing.algorithm = RoutingAlgorithm::MlAdaptive;
        config.link_cost.retry_threshold = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.routing.algorithm, RoutingAlgorithm::MlAdaptive);
        assert_eq!(loaded.link_cost.retry_threshold, 5);
    }
}
