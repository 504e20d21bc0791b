//! Sample-based profile annotation for compiler control-flow graphs.
//!
//! Given a binary file of execution samples collected by hardware event
//! sampling on a previously built program, this crate attributes an
//! execution count to every basic block of every function being compiled,
//! then smooths the counts to flow consistency so downstream optimizations
//! can treat them like instrumented profile counts.
//!
//! The pieces, leaves first:
//!
//! - [`format`] and [`reader`]: the on-disk sample format and its parser.
//! - [`index`]: the two-level sample index, keyed by `(file, line,
//!   function)` with a second dimension for inline stacks.
//! - [`annotate`]: the inline-stack extractor and the per-block annotator.
//! - [`flow`]: edge-count seeding and flow-consistency smoothing.
//! - [`session`]: per-compilation-unit lifecycle and the pass entry point.
//! - [`writer`]: the collector-side encoder, also used to build fixtures.

pub mod annotate;
pub mod cfg;
pub mod dump;
pub mod error;
pub mod flow;
pub mod format;
pub mod index;
pub mod reader;
pub mod session;
pub mod writer;

pub use error::{Error, ErrorSink, Result};
pub use index::{FlatSample, InlineSample, SampleIndex, SourceFrame};
pub use reader::read_samples;
pub use session::{ProfileSession, SampleData, SessionOptions, DEFAULT_SAMPLE_DATA_NAME};
pub use writer::{CallsiteSamples, FunctionSamples, SampleWriter};
