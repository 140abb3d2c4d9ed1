//! Grouping framed lines into numbered work units.
//!
//! Dispatching one task per record would drown the validation work in
//! scheduling overhead, so the [`Batcher`] hands the worker pool slices of up
//! to `batch_size` lines. Each [`Batch`] carries a sequence number assigned
//! at creation, starting at zero; the scheduler uses it to restore input
//! order when [`OrderingPolicy::InputOrder`](crate::config::OrderingPolicy) is in effect.

use crate::error::CleanseResult;
use crate::framer::FramedLine;

/// An ordered, bounded group of framed lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub seq: u64,
    pub lines: Vec<FramedLine>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Pulls up to `batch_size` lines at a time from a framed line source.
pub struct Batcher<I> {
    source: I,
    batch_size: usize,
    next_seq: u64,
    exhausted: bool,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = CleanseResult<FramedLine>>,
{
    /// `batch_size` is clamped to at least 1.
    pub fn new(source: I, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            next_seq: 0,
            exhausted: false,
        }
    }

    /// Next batch, or `Ok(None)` once the source is exhausted.
    ///
    /// The final batch may be shorter than `batch_size`; an empty batch is
    /// never produced.
    ///
    /// # Errors
    /// Propagates the first framing or I/O error from the source. The lines
    /// already pulled into the partial batch are discarded with it.
    pub fn next_batch(&mut self) -> CleanseResult<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut lines = Vec::with_capacity(self.batch_size);
        while lines.len() < self.batch_size {
            match self.source.next() {
                Some(Ok(line)) => lines.push(line),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e);
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        if lines.is_empty() {
            return Ok(None);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(Batch { seq, lines }))
    }

    /// Number of batches handed out so far.
    #[must_use]
    pub fn batches_emitted(&self) -> u64 {
        self.next_seq
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = CleanseResult<FramedLine>>,
{
    type Item = CleanseResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}
