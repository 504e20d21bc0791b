//! Error types and the [`ErrorSink`] used for lenient profile loading.

use thiserror::Error;

/// An error raised while loading or using a sample profile.
///
/// Most of these are *diagnostics*: the reader raises them through an
/// [`ErrorSink`] and keeps going with whatever it has already loaded. None of
/// them abort a compilation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The buffer is too small to contain a file header.
    #[error("Error reading file header of the sample file.")]
    FileHeader,
    /// The string-table region lies outside the buffer.
    #[error("Error reading string table of the sample file.")]
    StringTable,
    /// A function header lies outside the function-header table.
    #[error("Error reading function header {0} of the sample file.")]
    FunctionHeader(u32),
    /// A per-line frequency record of a top-level function is out of bounds.
    #[error("Error reading frequency records of function header {0}.")]
    FreqRecords(u32),
    /// An inline-callsite header is out of bounds.
    #[error("read_inline_function(): inline header out of bounds.")]
    InlineHeader,
    /// An inline-stack run is out of bounds.
    #[error("read_inline_function(): inline stack out of bounds.")]
    InlineStack,
    /// A per-line frequency record of an inlined body is out of bounds.
    #[error("read_inline_function(): frequency record out of bounds.")]
    InlineFreqRecord,
    /// A string offset points past the end of the string table.
    #[error("string offset {0} out of bounds of the string table")]
    InvalidStringOffset(u64),
    /// A string is missing its NUL terminator.
    #[error("unterminated string at offset {0}")]
    UnterminatedString(u64),
    /// A string is not valid UTF-8.
    #[error("string at offset {0} contains invalid UTF-8")]
    InvalidStringData(u64),
    /// A frequency record carries a negative sample count.
    #[error("negative frequency {freq} at {file}:{line}")]
    NegativeFrequency { file: String, line: u32, freq: i64 },
    /// A `(file, line, function)` key was inserted twice; the first wins.
    #[error("Duplicate entry: {file}:{line} func_name:{func}")]
    DuplicateEntry { file: String, line: u32, func: String },
    /// An inline key (stack plus `(file, line, function)`) was inserted twice.
    #[error("Duplicate entry of callstack: {file}:{line}")]
    DuplicateCallstack { file: String, line: u32 },
    /// Instrumented branch probabilities and sample profiling are mutually
    /// exclusive; the former takes precedence.
    #[error(
        "Cannot set both branch-probabilities and sample-profile. \
         Disable sample-profile now."
    )]
    FlagConflict,
    /// Loading produced zero usable records.
    #[error("No available data in the sample file {path}. Disable sample-profile now.")]
    NoData { path: String },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The [`ErrorSink`] is used to raise errors that happen during processing.
///
/// The processing steps themselves are infallible; errors that happen along
/// the way are pushed out to the sink, and it is the responsibility of the
/// caller to decide what to do with them. A sample file might still contain
/// usable data even if parts of it are damaged, so a bad record never fails
/// the whole load.
pub trait ErrorSink<E> {
    /// Raises an intermediate processing error with the sink.
    fn raise_error(&mut self, error: E);
}

impl<E, F: FnMut(E)> ErrorSink<E> for F {
    fn raise_error(&mut self, error: E) {
        self(error)
    }
}
