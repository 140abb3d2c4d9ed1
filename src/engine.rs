//! The cleansing engine: framer, batcher, worker pool and partition sink
//! wired into a single run.

use crate::batcher::Batcher;
use crate::config::EngineConfig;
use crate::error::CleanseResult;
use crate::framer::LineFramer;
use crate::scheduler::{SchedulerStats, WorkerPool};
use crate::sink::{PartitionCounts, PartitionSink, RejectCounts};
use crate::validation::{FieldRules, RecordValidator};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_records: u64,
    pub accepted_records: u64,
    pub rejected_records: u64,
    pub rejected_by_reason: RejectCounts,
    pub header_present: bool,
    pub batches: u64,
    pub peak_in_flight: usize,
    pub workers: usize,
    pub batch_size: usize,
    pub elapsed_ms: u64,
}

/// Summary plus the two completed outputs.
#[derive(Debug)]
pub struct EngineOutput<W> {
    pub summary: RunSummary,
    pub accepted: W,
    pub rejected: W,
}

/// Splits a delimited text stream into accepted and rejected outputs.
///
/// An engine owns its worker pool and can be reused for any number of
/// sequential runs.
///
/// # Example
///
/// ```
/// use ironsieve::{CleansingEngine, EngineConfig};
///
/// # fn main() -> anyhow::Result<()> {
/// let input = "no,name,created_date\n1,alice,2024/02/29\n,bob,2024/01/01\n";
/// let engine = CleansingEngine::new(EngineConfig::default().with_batch_size(1))?;
/// let out = engine.run(input.as_bytes(), Vec::new(), Vec::new())?;
///
/// assert_eq!(out.summary.accepted_records, 1);
/// assert_eq!(String::from_utf8(out.rejected)?, "no,name,created_date\n,bob,2024/01/01\n");
/// # Ok(())
/// # }
/// ```
pub struct CleansingEngine {
    config: EngineConfig,
    pool: WorkerPool,
    validator: Arc<dyn RecordValidator>,
}

impl CleansingEngine {
    /// Engine with the built-in [`FieldRules`].
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`](crate::CleanseError::Config) for an invalid configuration.
    pub fn new(config: EngineConfig) -> CleanseResult<Self> {
        Self::with_validator(config, Arc::new(FieldRules::default()))
    }

    /// Engine with a custom validation backend.
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`](crate::CleanseError::Config) for an invalid configuration.
    pub fn with_validator(
        config: EngineConfig,
        validator: Arc<dyn RecordValidator>,
    ) -> CleanseResult<Self> {
        let pool = WorkerPool::new(&config)?;
        Ok(Self {
            config,
            pool,
            validator,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the engine over `input`, writing into `accepted` and `rejected`.
    ///
    /// The header (first non-empty line) is written verbatim to both
    /// outputs and is not counted. The outputs are only handed back on
    /// success; on failure they are dropped and must be treated as incomplete.
    ///
    /// # Errors
    /// Returns the first framing, I/O or task fault.
    pub fn run<R, W>(&self, input: R, accepted: W, rejected: W) -> CleanseResult<EngineOutput<W>>
    where
        R: BufRead,
        W: Write,
    {
        let started = Instant::now();
        let mut framer = LineFramer::new(input);
        let mut sink = PartitionSink::new(accepted, rejected);

        let header_present = match framer.header()? {
            Some(header) => {
                sink.write_header(header)?;
                true
            }
            None => false,
        };

        info!(
            workers = self.pool.workers(),
            batch_size = self.config.batch_size,
            in_flight = self.pool.window(),
            ordering = ?self.config.ordering,
            "starting validation"
        );

        let progress_every = self.config.progress_every;
        let mut next_progress = progress_every;
        let batches = Batcher::new(framer, self.config.batch_size);
        let stats = self
            .pool
            .run(batches, Arc::clone(&self.validator), |result| {
                sink.ingest(result)?;
                let counts = sink.counts();
                if progress_every > 0 && counts.total >= next_progress {
                    info!(
                        records = counts.total,
                        accepted = counts.accepted,
                        rejected = counts.rejected,
                        "progress"
                    );
                    next_progress = (counts.total / progress_every + 1) * progress_every;
                }
                Ok(())
            })?;

        let done = sink.finalize()?;
        let summary = self.summarize(&done.counts, header_present, stats, started);
        info!(
            records = summary.total_records,
            accepted = summary.accepted_records,
            rejected = summary.rejected_records,
            batches = summary.batches,
            elapsed_ms = summary.elapsed_ms,
            "validation complete"
        );
        Ok(EngineOutput {
            summary,
            accepted: done.accepted,
            rejected: done.rejected,
        })
    }

    fn summarize(
        &self,
        counts: &PartitionCounts,
        header_present: bool,
        stats: SchedulerStats,
        started: Instant,
    ) -> RunSummary {
        RunSummary {
            total_records: counts.total,
            accepted_records: counts.accepted,
            rejected_records: counts.rejected,
            rejected_by_reason: counts.rejected_by_reason.clone(),
            header_present,
            batches: stats.batches,
            peak_in_flight: stats.peak_in_flight,
            workers: self.pool.workers(),
            batch_size: self.config.batch_size,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
