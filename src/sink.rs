//! The partition sink: two append-only outputs plus running counts.
//!
//! Workers never touch the sink. They return a [`BatchResult`] and the thread
//! that owns result consumption calls [`PartitionSink::ingest`]; `&mut self`
//! makes concurrent ingestion impossible without an outer lock, which is the
//! only mutual-exclusion discipline the counters and writers need.
//!
//! Both outputs sit behind [`BufWriter`]s with a fixed capacity and are
//! flushed incrementally, so sink memory does not grow with the input.

use crate::batcher::Batch;
use crate::framer::FramedLine;
use crate::validation::{RejectReason, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};

/// Default capacity of each output buffer.
pub const OUTPUT_BUFFER_BYTES: usize = 256 * 1024;

/// A validated batch: the original lines with one verdict per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub seq: u64,
    pub lines: Vec<FramedLine>,
    pub verdicts: Vec<Verdict>,
}

impl BatchResult {
    /// Pair a batch with its verdicts. `verdicts` must be index-aligned with
    /// `batch.lines`.
    #[must_use]
    pub fn new(batch: Batch, verdicts: Vec<Verdict>) -> Self {
        debug_assert_eq!(batch.lines.len(), verdicts.len());
        Self {
            seq: batch.seq,
            lines: batch.lines,
            verdicts,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Rejections broken down by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectCounts(BTreeMap<RejectReason, u64>);

impl RejectCounts {
    pub fn add(&mut self, reason: RejectReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    #[must_use]
    pub fn get(&self, reason: RejectReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RejectReason, u64)> + '_ {
        self.0.iter().map(|(r, n)| (*r, *n))
    }
}

/// Record counters. The header is never counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCounts {
    pub total: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub rejected_by_reason: RejectCounts,
}

/// Completed outputs handed back by [`PartitionSink::finalize`].
#[derive(Debug)]
pub struct Partitioned<W> {
    pub counts: PartitionCounts,
    pub accepted: W,
    pub rejected: W,
}

/// Routes validated lines to the accepted or rejected output.
pub struct PartitionSink<W: Write> {
    accepted: BufWriter<W>,
    rejected: BufWriter<W>,
    counts: PartitionCounts,
    header_written: bool,
}

impl<W: Write> PartitionSink<W> {
    pub fn new(accepted: W, rejected: W) -> Self {
        Self::with_capacity(OUTPUT_BUFFER_BYTES, accepted, rejected)
    }

    pub fn with_capacity(capacity: usize, accepted: W, rejected: W) -> Self {
        Self {
            accepted: BufWriter::with_capacity(capacity, accepted),
            rejected: BufWriter::with_capacity(capacity, rejected),
            counts: PartitionCounts::default(),
            header_written: false,
        }
    }

    /// Forward the header verbatim to both outputs. Only the first call
    /// writes; later calls are ignored.
    ///
    /// # Errors
    /// Propagates write failures.
    pub fn write_header(&mut self, header: &str) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        write_line(&mut self.accepted, header)?;
        write_line(&mut self.rejected, header)
    }

    /// Append every line of `result` to the output its verdict selects.
    ///
    /// # Errors
    /// Propagates write failures.
    pub fn ingest(&mut self, result: BatchResult) -> io::Result<()> {
        for (line, verdict) in result.lines.iter().zip(result.verdicts) {
            match verdict {
                Verdict::Accepted => {
                    write_line(&mut self.accepted, &line.text)?;
                    self.counts.accepted += 1;
                }
                Verdict::Rejected(reason) => {
                    write_line(&mut self.rejected, &line.text)?;
                    self.counts.rejected += 1;
                    self.counts.rejected_by_reason.add(reason);
                }
            }
            self.counts.total += 1;
        }
        Ok(())
    }

    #[must_use]
    pub fn counts(&self) -> &PartitionCounts {
        &self.counts
    }

    /// Flush both outputs and hand them back with the final counts.
    ///
    /// # Errors
    /// Propagates flush failures.
    pub fn finalize(self) -> io::Result<Partitioned<W>> {
        let accepted = self.accepted.into_inner().map_err(io::IntoInnerError::into_error)?;
        let rejected = self.rejected.into_inner().map_err(io::IntoInnerError::into_error)?;
        Ok(Partitioned {
            counts: self.counts,
            accepted,
            rejected,
        })
    }
}

fn write_line<W: Write>(w: &mut W, text: &str) -> io::Result<()> {
    w.write_all(text.as_bytes())?;
    w.write_all(b"\n")
}
