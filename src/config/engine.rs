//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "ENGINE_";

const DEFAULT_DRAIN_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_THROTTLE_BACKOFF_MS: u64 = 0;

/// Configuration of a run: parallelism bounds, source window and timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard ceiling for the degree of parallelism; also sizes the batch queue.
    pub max_degree_of_parallelism: usize,
    /// Degree of parallelism used when a run starts.
    pub degree_of_parallelism: usize,
    /// Leading source items to skip.
    pub skip: u64,
    /// Total item count of the source, including skipped items, if known.
    pub total_items: Option<u64>,
    /// Interval of the drain-wait polls, in milliseconds.
    pub drain_poll_interval_ms: u64,
    /// Pause after a throttled admission attempt, in milliseconds; 0 retries
    /// after a yield.
    pub throttle_backoff_ms: u64,
    /// Dispatch limit per sliding minute; `None` disables throttling.
    pub checks_per_minute: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            max_degree_of_parallelism: cpus * 2,
            degree_of_parallelism: cpus,
            skip: 0,
            total_items: None,
            drain_poll_interval_ms: DEFAULT_DRAIN_POLL_INTERVAL_MS,
            throttle_backoff_ms: DEFAULT_THROTTLE_BACKOFF_MS,
            checks_per_minute: None,
        }
    }
}

impl EngineConfig {
    /// Defaults sized from the CPU count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parallelism ceiling.
    #[must_use]
    pub const fn with_max_degree_of_parallelism(mut self, max: usize) -> Self {
        self.max_degree_of_parallelism = max;
        self
    }

    /// Set the starting parallelism.
    #[must_use]
    pub const fn with_degree_of_parallelism(mut self, dop: usize) -> Self {
        self.degree_of_parallelism = dop;
        self
    }

    /// Skip `skip` leading items.
    #[must_use]
    pub const fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Declare the source length.
    #[must_use]
    pub const fn with_total_items(mut self, total: u64) -> Self {
        self.total_items = Some(total);
        self
    }

    /// Set the drain poll interval.
    #[must_use]
    pub const fn with_drain_poll_interval_ms(mut self, ms: u64) -> Self {
        self.drain_poll_interval_ms = ms;
        self
    }

    /// Set the throttle back-off.
    #[must_use]
    pub const fn with_throttle_backoff_ms(mut self, ms: u64) -> Self {
        self.throttle_backoff_ms = ms;
        self
    }

    /// Limit dispatches per minute.
    #[must_use]
    pub const fn with_checks_per_minute(mut self, limit: u32) -> Self {
        self.checks_per_minute = Some(limit);
        self
    }

    /// Batch queue target size: twice the ceiling.
    #[must_use]
    pub const fn batch_target(&self) -> usize {
        self.max_degree_of_parallelism.saturating_mul(2)
    }

    /// Drain poll interval as a duration.
    #[must_use]
    pub const fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    /// Throttle back-off as a duration.
    #[must_use]
    pub const fn throttle_backoff(&self) -> Duration {
        Duration::from_millis(self.throttle_backoff_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_degree_of_parallelism == 0 {
            return Err("max_degree_of_parallelism must be greater than 0".into());
        }
        if self.degree_of_parallelism > self.max_degree_of_parallelism {
            return Err(format!(
                "degree_of_parallelism {} exceeds max_degree_of_parallelism {}",
                self.degree_of_parallelism, self.max_degree_of_parallelism
            ));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err("drain_poll_interval_ms must be greater than 0".into());
        }
        if self.checks_per_minute == Some(0) {
            return Err("checks_per_minute must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `ENGINE_*` environment variables over the
    /// defaults, loading a `.env` file first if one exists.
    ///
    /// Recognised keys: `ENGINE_MAX_DEGREE_OF_PARALLELISM`,
    /// `ENGINE_DEGREE_OF_PARALLELISM`, `ENGINE_SKIP`, `ENGINE_TOTAL_ITEMS`,
    /// `ENGINE_DRAIN_POLL_INTERVAL_MS`, `ENGINE_THROTTLE_BACKOFF_MS`,
    /// `ENGINE_CHECKS_PER_MINUTE`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            name: &str,
        ) -> Result<Option<T>, String>
        where
            T::Err: std::fmt::Display,
        {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .map(|raw| raw.trim().parse::<T>().map_err(|e| format!("{key}: {e}")))
                .transpose()
        }

        let mut cfg = Self::default();
        if let Some(v) = parse(&lookup, "MAX_DEGREE_OF_PARALLELISM")? {
            cfg.max_degree_of_parallelism = v;
        }
        if let Some(v) = parse(&lookup, "DEGREE_OF_PARALLELISM")? {
            cfg.degree_of_parallelism = v;
        }
        if let Some(v) = parse(&lookup, "SKIP")? {
            cfg.skip = v;
        }
        if let Some(v) = parse(&lookup, "TOTAL_ITEMS")? {
            cfg.total_items = Some(v);
        }
        if let Some(v) = parse(&lookup, "DRAIN_POLL_INTERVAL_MS")? {
            cfg.drain_poll_interval_ms = v;
        }
        if let Some(v) = parse(&lookup, "THROTTLE_BACKOFF_MS")? {
            cfg.throttle_backoff_ms = v;
        }
        if let Some(v) = parse(&lookup, "CHECKS_PER_MINUTE")? {
            cfg.checks_per_minute = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
