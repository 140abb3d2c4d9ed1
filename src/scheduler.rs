//! Bounded parallel validation of batches.
//!
//! [`WorkerPool::run`] drives three roles from the calling thread:
//!
//! - **producer**: pulls batches from the source while fewer than
//!   `in_flight` batches are outstanding, and otherwise waits;
//! - **workers**: a dedicated rayon pool of `workers` threads, each task
//!   validating every line of one batch;
//! - **consumer**: receives finished batches and hands them to the caller's
//!   sink callback, which is the point where a batch stops counting as
//!   in flight.
//!
//! With [`OrderingPolicy::InputOrder`], results that finish ahead of an
//! earlier batch are parked in a reorder buffer keyed by sequence number.
//! Parked results still count as in flight, so the buffer can never hold
//! more than the window.
//!
//! A fault inside a task (a panic, or an error from the consumer) stops
//! admission, flags every queued and running task for cancellation, waits
//! for all outstanding tasks to report back, and returns the first fault.

use crate::batcher::Batch;
use crate::config::{EngineConfig, OrderingPolicy};
use crate::error::{CleanseError, CleanseResult};
use crate::sink::BatchResult;
use crate::validation::RecordValidator;
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Running tasks poll the cancel flag once per this many records.
const CANCEL_CHECK_INTERVAL: usize = 256;

type TaskOutcome = CleanseResult<BatchResult>;

/// Scheduling statistics for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub batches: u64,
    /// Highest number of batches in flight at any point.
    pub peak_in_flight: usize,
    /// Highest number of results parked waiting for an earlier batch.
    pub peak_parked: usize,
}

/// A fixed-size pool of validation workers with a bounded in-flight window.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    window: usize,
    ordering: OrderingPolicy,
}

impl WorkerPool {
    /// Build a pool sized from `config`.
    ///
    /// # Errors
    /// Returns [`CleanseError::Config`] if the configuration is invalid or
    /// the thread pool cannot be created.
    pub fn new(config: &EngineConfig) -> CleanseResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("ironsieve-worker-{i}"))
            .build()
            .map_err(|e| CleanseError::Config(format!("build worker pool: {e}")))?;
        Ok(Self {
            pool,
            window: config.in_flight_window(),
            ordering: config.ordering,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Validate every batch from `batches` and feed the results to `consume`.
    ///
    /// `consume` runs on the calling thread only. Under
    /// [`OrderingPolicy::InputOrder`] it sees results in ascending `seq`
    /// order; under [`OrderingPolicy::CompletionOrder`] in finishing order.
    ///
    /// # Errors
    /// Returns the first error from the batch source, a task, or `consume`.
    /// No further results are consumed after an error, and every task has
    /// finished by the time this returns.
    pub fn run<B, F>(
        &self,
        batches: B,
        validator: Arc<dyn RecordValidator>,
        consume: F,
    ) -> CleanseResult<SchedulerStats>
    where
        B: IntoIterator<Item = CleanseResult<Batch>>,
        F: FnMut(BatchResult) -> CleanseResult<()>,
    {
        let (tx, rx) = crossbeam_channel::bounded(self.window);
        let mut run = Dispatch {
            pool: &self.pool,
            window: self.window,
            ordering: self.ordering,
            validator,
            tx,
            rx,
            cancel: Arc::new(AtomicBool::new(false)),
            outstanding: 0,
            in_flight: 0,
            parked: ReorderBuffer::default(),
            stats: SchedulerStats::default(),
        };
        match run.drive(batches.into_iter(), consume) {
            Ok(()) => Ok(run.stats),
            Err(e) => {
                error!(error = %e, outstanding = run.outstanding, "aborting run");
                run.abort();
                Err(e)
            }
        }
    }
}

/// Results waiting for an earlier sequence number.
#[derive(Default)]
struct ReorderBuffer {
    next_seq: u64,
    waiting: BTreeMap<u64, BatchResult>,
}

impl ReorderBuffer {
    fn push(&mut self, result: BatchResult) {
        self.waiting.insert(result.seq, result);
    }

    fn pop_ready(&mut self) -> Option<BatchResult> {
        let ready = self.waiting.remove(&self.next_seq)?;
        self.next_seq += 1;
        Some(ready)
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }
}

struct Dispatch<'p> {
    pool: &'p rayon::ThreadPool,
    window: usize,
    ordering: OrderingPolicy,
    validator: Arc<dyn RecordValidator>,
    tx: Sender<TaskOutcome>,
    rx: Receiver<TaskOutcome>,
    cancel: Arc<AtomicBool>,
    /// Submitted tasks that have not reported back yet.
    outstanding: usize,
    /// Submitted batches not yet handed to the consumer.
    in_flight: usize,
    parked: ReorderBuffer,
    stats: SchedulerStats,
}

impl Dispatch<'_> {
    fn drive<I, F>(&mut self, mut batches: I, mut consume: F) -> CleanseResult<()>
    where
        I: Iterator<Item = CleanseResult<Batch>>,
        F: FnMut(BatchResult) -> CleanseResult<()>,
    {
        let mut source_done = false;
        loop {
            while !source_done && self.in_flight < self.window {
                match batches.next() {
                    Some(batch) => self.submit(batch?),
                    None => source_done = true,
                }
            }
            if self.in_flight == 0 {
                return Ok(());
            }

            let result = self.recv()??;
            match self.ordering {
                OrderingPolicy::CompletionOrder => {
                    self.in_flight -= 1;
                    consume(result)?;
                }
                OrderingPolicy::InputOrder => {
                    self.parked.push(result);
                    self.stats.peak_parked = self.stats.peak_parked.max(self.parked.len());
                    while let Some(ready) = self.parked.pop_ready() {
                        self.in_flight -= 1;
                        consume(ready)?;
                    }
                }
            }
        }
    }

    fn submit(&mut self, batch: Batch) {
        let seq = batch.seq;
        let validator = Arc::clone(&self.validator);
        let cancel = Arc::clone(&self.cancel);
        let tx = self.tx.clone();
        debug!(batch = seq, records = batch.len(), "dispatch");

        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                validate_batch(batch, validator.as_ref(), &cancel)
            }))
            .unwrap_or_else(|payload| {
                Err(CleanseError::TaskFault {
                    batch: seq,
                    message: panic_message(payload.as_ref()),
                })
            });
            // The receiver outlives every task, see `Dispatch::abort`.
            let _ = tx.send(outcome);
        });

        self.outstanding += 1;
        self.in_flight += 1;
        self.stats.batches += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight);
    }

    fn recv(&mut self) -> CleanseResult<TaskOutcome> {
        let outcome = self.rx.recv().map_err(|_| CleanseError::TaskFault {
            batch: self.parked.next_seq,
            message: "worker result channel closed".into(),
        })?;
        self.outstanding -= 1;
        Ok(outcome)
    }

    /// Cancel queued and running tasks, then wait for each to report back.
    fn abort(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        while self.outstanding > 0 {
            if self.recv().is_err() {
                break;
            }
        }
        self.parked.waiting.clear();
    }
}

fn validate_batch(
    batch: Batch,
    validator: &dyn RecordValidator,
    cancel: &AtomicBool,
) -> CleanseResult<BatchResult> {
    let mut verdicts = Vec::with_capacity(batch.len());
    for (i, line) in batch.lines.iter().enumerate() {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(CleanseError::Cancelled);
        }
        verdicts.push(validator.validate(&line.text));
    }
    Ok(BatchResult::new(batch, verdicts))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
