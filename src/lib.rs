//! # Ironsieve
//!
//! A **concurrent, memory-bounded cleansing engine** for large delimited text
//! files. Ironsieve reads a CSV stream once, validates every record in
//! parallel, and splits the input into an *accepted* and a *rejected* output,
//! each starting with the original header.
//!
//! ## Key Features
//!
//! - **Streaming** - memory is bounded by the in-flight window, never by input size
//! - **Parallel validation** - a fixed pool of workers validates batches of records
//! - **Backpressure** - the reader stalls while too many batches are outstanding
//! - **Deterministic output** - input order is preserved by default
//! - **Pluggable rules** - any [`RecordValidator`] can replace the built-in [`FieldRules`]
//! - **Object-store shell** - fetch, cleanse and upload with retry and multipart uploads
//!
//! ## Quick Start
//!
//! ```
//! use ironsieve::{CleansingEngine, EngineConfig, RejectReason};
//!
//! # fn main() -> anyhow::Result<()> {
//! let input = "\
//! no,name,created_date
//! 1,alice,2024/01/31
//! x,bob,2024/01/31
//! 3,carol,2024-01-31
//! ";
//! let engine = CleansingEngine::new(EngineConfig::default().with_workers(2))?;
//! let out = engine.run(input.as_bytes(), Vec::new(), Vec::new())?;
//!
//! assert_eq!(out.summary.total_records, 3);
//! assert_eq!(out.summary.accepted_records, 1);
//! assert_eq!(out.summary.rejected_by_reason.get(RejectReason::DateFormat), 1);
//! assert_eq!(
//!     String::from_utf8(out.accepted)?,
//!     "no,name,created_date\n1,alice,2024/01/31\n"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. The [`framer`] turns bytes into lines and splits off the header.
//! 2. The [`batcher`] groups lines into numbered [`Batch`]es.
//! 3. The [`scheduler`] validates batches on a worker pool with a bounded
//!    in-flight window and, by default, restores input order.
//! 4. The [`sink`] appends each line to the output its verdict selects.
//!
//! A run either completes with both outputs flushed, or fails with the first
//! [`CleanseError`]; outputs of a failed run are never handed back.
//!
//! ## Module Overview
//!
//! - [`validation`] - record rules and the [`RecordValidator`] trait
//! - [`engine`] - [`CleansingEngine`], wiring the stages into a run
//! - [`config`] - engine and transfer configuration
//! - [`io`] - decompression, object storage and transfers
//! - [`handler`] - the fetch, cleanse, upload invocation
//! - [`fixtures`] - synthetic input generation

pub mod batcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod framer;
pub mod handler;
pub mod io;
pub mod scheduler;
pub mod sink;
pub mod spool;
pub mod validation;

pub use batcher::{Batch, Batcher};
pub use config::{EngineConfig, OrderingPolicy, RetryConfig, TransferConfig};
pub use engine::{CleansingEngine, EngineOutput, RunSummary};
pub use error::{CleanseError, CleanseResult, StorageError, StorageErrorKind};
pub use framer::{FramedLine, LineFramer};
pub use handler::{handle, CleanseSummary, InvocationEvent};
pub use sink::{BatchResult, PartitionSink, RejectCounts};
pub use validation::{validate_line, FieldRules, RecordValidator, RejectReason, Verdict};
