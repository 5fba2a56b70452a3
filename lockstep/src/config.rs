//!
//! Scheduler Configuration
//!
//! Pool sizing and wait-mode tuning for the engine:
//!
//! - `num_threads` - worker count, defaulting to the machine's available
//!   parallelism (fallback 4)
//! - `wait_mode` - how idle threads wait: `Sleep` (condvar, the default) or
//!   `Spin` (yield-polling, for latency experiments)
//!
//! Configuration can also be read from the environment:
//! `LOCKSTEP_THREADS` and `LOCKSTEP_WAIT_MODE` ("sleep" | "spin").
//!

use std::env;
use std::str::FromStr;
use std::thread;

use thiserror::Error;

/// How idle threads wait for state changes.
///
/// `Sleep` parks workers on a condvar and is the canonical mode. `Spin`
/// yield-polls instead, trading CPU for wakeup latency; it exists as a
/// tunable only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    #[default]
    Sleep,
    Spin,
}

impl FromStr for WaitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "sleep" => Ok(WaitMode::Sleep),
            "spin" => Ok(WaitMode::Spin),
            _ => Err(ConfigError::InvalidWaitMode {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid wait mode '{value}': expected 'sleep' or 'spin'")]
    InvalidWaitMode { value: String },

    #[error("invalid worker count '{value}': expected a positive integer")]
    InvalidWorkerCount { value: String },
}

/// Construction parameters for a `TaskScheduler`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads. Must be positive.
    pub num_threads: usize,
    /// Wait strategy for workers and `sync`.
    pub wait_mode: WaitMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_threads: default_worker_count(),
            wait_mode: WaitMode::Sleep,
        }
    }
}

impl SchedulerConfig {
    /// Default configuration overridden from the environment.
    ///
    /// Unset variables keep their defaults; set-but-unparseable values are
    /// errors rather than silent fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = env::var("LOCKSTEP_THREADS") {
            config.num_threads = parse_worker_count(&value)?;
        }
        if let Ok(value) = env::var("LOCKSTEP_WAIT_MODE") {
            config.wait_mode = value.parse()?;
        }
        Ok(config)
    }
}

fn parse_worker_count(value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidWorkerCount {
            value: value.to_string(),
        }),
    }
}

fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
