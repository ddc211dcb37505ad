//! Scheduler and GPU budget configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{BudgetSettings, LogIsolation, DEFAULT_OVERHEAD_FRACTION, DEFAULT_QUANTUM_SIZE};

/// Prefix of environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "TILE_SCHEDULER_";

/// Scheduling section of the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Workers per session. `None` uses every available core.
    pub max_processes: Option<usize>,
    /// Workers for the stereo matching stage. `None` falls back to `max_processes`.
    pub max_processes_stereo_matching: Option<usize>,
    /// GPU memory this pipeline may use, in megabytes. `None` disables admission control.
    pub gpu_total_memory: Option<f64>,
    /// Size of one admission quantum, in megabytes.
    pub gpu_quantum_mb: f64,
    /// Overhead added to every GPU memory request.
    pub gpu_overhead_fraction: f64,
    /// Longest wait between two admission attempts, in milliseconds.
    pub gpu_poll_interval_ms: u64,
    /// Seconds the session waits for each item.
    pub timeout_secs: u64,
    /// Mirror every per-item log line to stderr.
    pub debug: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_processes_stereo_matching: None,
            gpu_total_memory: None,
            gpu_quantum_mb: DEFAULT_QUANTUM_SIZE,
            gpu_overhead_fraction: DEFAULT_OVERHEAD_FRACTION,
            gpu_poll_interval_ms: 100,
            timeout_secs: 600,
            debug: false,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// A message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_processes == Some(0) {
            return Err("max_processes must be greater than 0".into());
        }
        if self.max_processes_stereo_matching == Some(0) {
            return Err("max_processes_stereo_matching must be greater than 0".into());
        }
        if let Some(total) = self.gpu_total_memory {
            if !total.is_finite() || total < 0.0 {
                return Err(format!("gpu_total_memory must be a non-negative number, got {total}"));
            }
        }
        if !self.gpu_quantum_mb.is_finite() || self.gpu_quantum_mb <= 0.0 {
            return Err("gpu_quantum_mb must be greater than 0".into());
        }
        if !self.gpu_overhead_fraction.is_finite() || self.gpu_overhead_fraction < 0.0 {
            return Err("gpu_overhead_fraction must not be negative".into());
        }
        if self.gpu_poll_interval_ms == 0 {
            return Err("gpu_poll_interval_ms must be greater than 0".into());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `TILE_SCHEDULER_*` variables from the process
    /// environment, after loading a `.env` file if one is present.
    ///
    /// # Errors
    ///
    /// Unparsable variable or validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        cfg.apply_overrides(std::env::vars())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `TILE_SCHEDULER_*` overrides from `vars`; other keys are ignored.
    ///
    /// Optional fields accept `none` (or an empty value) to unset them.
    ///
    /// # Errors
    ///
    /// A message naming the variable that failed to parse.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "MAX_PROCESSES" => self.max_processes = parse_optional(name, value)?,
                "MAX_PROCESSES_STEREO_MATCHING" => {
                    self.max_processes_stereo_matching = parse_optional(name, value)?;
                }
                "GPU_TOTAL_MEMORY" => self.gpu_total_memory = parse_optional(name, value)?,
                "GPU_QUANTUM_MB" => self.gpu_quantum_mb = parse(name, value)?,
                "GPU_OVERHEAD_FRACTION" => self.gpu_overhead_fraction = parse(name, value)?,
                "GPU_POLL_INTERVAL_MS" => self.gpu_poll_interval_ms = parse(name, value)?,
                "TIMEOUT_SECS" => self.timeout_secs = parse(name, value)?,
                "DEBUG" => self.debug = parse_flag(name, value)?,
                _ => tracing::debug!(variable = name, "ignoring unknown scheduler variable"),
            }
        }
        Ok(())
    }

    /// Workers for general stages.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.max_processes.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Workers for the stereo matching stage.
    #[must_use]
    pub fn stereo_matching_worker_count(&self) -> usize {
        self.max_processes_stereo_matching
            .unwrap_or_else(|| self.worker_count())
            .max(1)
    }

    /// Per-item timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Admission budget settings.
    #[must_use]
    pub const fn budget_settings(&self) -> BudgetSettings {
        BudgetSettings {
            quantum_size: self.gpu_quantum_mb,
            overhead_fraction: self.gpu_overhead_fraction,
            poll_interval: Duration::from_millis(self.gpu_poll_interval_ms),
        }
    }

    /// Per-item log mirroring.
    #[must_use]
    pub const fn log_isolation(&self) -> LogIsolation {
        LogIsolation::new(self.debug)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: cannot parse `{value}`: {e}"))
}

fn parse_optional<T: std::str::FromStr>(name: &str, value: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse(name, value).map(Some)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!("{ENV_PREFIX}{name}: expected a boolean, got `{value}`")),
    }
}
