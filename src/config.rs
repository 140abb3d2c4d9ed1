//! Engine and transfer configuration.
//!
//! Configuration is an explicit value handed to [`CleansingEngine::new`](crate::CleansingEngine::new);
//! nothing here is process-global. Values can be built in code with the
//! `with_*` setters or overlaid from environment variables with [`EngineConfig::from_env`].

use crate::error::{CleanseError, CleanseResult};
use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;

/// How completed batch results are admitted into the partition sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingPolicy {
    /// Results are ingested strictly by batch sequence number. Outputs keep
    /// the relative input order and are byte-identical across runs.
    #[default]
    InputOrder,
    /// Results are ingested as tasks finish. Output order may differ between
    /// runs and worker counts; the multiset of lines does not.
    CompletionOrder,
}

impl FromStr for OrderingPolicy {
    type Err = CleanseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "input-order" | "ordered" => Ok(Self::InputOrder),
            "completion" | "completion-order" | "unordered" => Ok(Self::CompletionOrder),
            other => Err(CleanseError::Config(format!(
                "unknown ordering policy '{other}' (expected 'input' or 'completion')"
            ))),
        }
    }
}

/// Knobs for a single engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of concurrently running validation tasks.
    pub workers: usize,
    /// Maximum records per batch.
    pub batch_size: usize,
    /// Maximum batches submitted but not yet ingested by the sink.
    /// `None` means twice the worker count.
    pub in_flight: Option<usize>,
    pub ordering: OrderingPolicy,
    /// Emit a progress log line every this many ingested records (0 disables).
    pub progress_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            in_flight: None,
            ordering: OrderingPolicy::default(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl EngineConfig {
    /// Defaults, but with one worker per available CPU.
    #[must_use]
    pub fn auto() -> Self {
        Self::default().with_workers(num_cpus::get().max(1))
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_in_flight(mut self, in_flight: usize) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: OrderingPolicy) -> Self {
        self.ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    /// The effective in-flight window.
    #[must_use]
    pub fn in_flight_window(&self) -> usize {
        self.in_flight
            .unwrap_or_else(|| self.workers.saturating_mul(2))
    }

    /// Check that the configuration can drive a run.
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`] for a zero worker count, a zero batch
    /// size, or an in-flight window smaller than the worker count.
    pub fn validate(&self) -> CleanseResult<()> {
        if self.workers == 0 {
            return Err(CleanseError::Config("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(CleanseError::Config("batch_size must be at least 1".into()));
        }
        let window = self.in_flight_window();
        if window < self.workers {
            return Err(CleanseError::Config(format!(
                "in-flight window ({window}) must be at least the worker count ({})",
                self.workers
            )));
        }
        Ok(())
    }

    /// Overlay `<PREFIX>WORKERS`, `<PREFIX>BATCH_SIZE`, `<PREFIX>IN_FLIGHT`
    /// `<PREFIX>ORDERING` and `<PREFIX>PROGRESS_EVERY` from the process
    /// environment onto the defaults.
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`] if a present variable does not parse.
    pub fn from_env(prefix: &str) -> CleanseResult<Self> {
        Self::from_map(&config_from_env(prefix))
    }

    /// Same as [`from_env`](Self::from_env) over an explicit lowercase key map.
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`] if a present value does not parse.
    pub fn from_map(vars: &HashMap<String, String>) -> CleanseResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = vars.get("workers") {
            cfg.workers = parse_number("workers", v)?;
        }
        if let Some(v) = vars.get("batch_size") {
            cfg.batch_size = parse_number("batch_size", v)?;
        }
        if let Some(v) = vars.get("in_flight") {
            cfg.in_flight = Some(parse_number("in_flight", v)?);
        }
        if let Some(v) = vars.get("ordering") {
            cfg.ordering = v.parse()?;
        }
        if let Some(v) = vars.get("progress_every") {
            cfg.progress_every = parse_number("progress_every", v)?;
        }
        Ok(cfg)
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> CleanseResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| CleanseError::Config(format!("{name}: '{raw}' is not a valid number")))
}

/// Collect environment variables starting with `prefix`, keyed by the
/// lowercased remainder.
#[must_use]
pub fn config_from_env(prefix: &str) -> HashMap<String, String> {
    let mut config = HashMap::new();

    for (key, value) in std::env::vars() {
        if let Some(name) = key.strip_prefix(prefix) {
            config.insert(name.to_lowercase(), value);
        }
    }

    config
}

/// Parameters for moving output streams into the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Streams larger than this are uploaded in parts.
    pub multipart_threshold: u64,
    pub part_size: u64,
    pub retry: RetryConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: 50 * 1024 * 1024,
            part_size: 10 * 1024 * 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}
